//! Current local date and time

use super::{Arguments, Function, FunctionError};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct GetCurrentTime;

#[async_trait]
impl Function for GetCurrentTime {
    fn name(&self) -> &'static str {
        "get_current_time"
    }

    fn description(&self) -> String {
        "Get the current date and time".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn accepted_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    async fn call(&self, _args: Arguments) -> Result<String, FunctionError> {
        Ok(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
    }
}
