//! Random integer in an inclusive range

use super::{parse_args, Arguments, Function, FunctionError};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct GetRandomNumber;

#[derive(Debug, Deserialize)]
struct RandomInput {
    min: f64,
    max: f64,
}

#[async_trait]
impl Function for GetRandomNumber {
    fn name(&self) -> &'static str {
        "get_random_number"
    }

    fn description(&self) -> String {
        "Get a random number between a minimum and maximum value".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "min": {"type": "number", "description": "The minimum value"},
                "max": {"type": "number", "description": "The maximum value"}
            },
            "required": ["min", "max"]
        })
    }

    fn accepted_parameters(&self) -> &'static [&'static str] {
        &["min", "max"]
    }

    #[allow(clippy::cast_possible_truncation)] // bounds are rounded model-supplied numbers
    async fn call(&self, args: Arguments) -> Result<String, FunctionError> {
        let input: RandomInput = parse_args(args)?;
        if !input.min.is_finite() || !input.max.is_finite() {
            return Err(FunctionError::InvalidArguments(
                "min and max must be finite".to_string(),
            ));
        }

        // Whole numbers inside the requested bounds
        let min = input.min.ceil() as i64;
        let max = input.max.floor() as i64;
        if min > max {
            return Err(FunctionError::InvalidArguments(format!(
                "min ({}) is greater than max ({})",
                input.min, input.max
            )));
        }

        let value = rand::thread_rng().gen_range(min..=max);
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_value_in_range() {
        for _ in 0..50 {
            let out = GetRandomNumber
                .call(args(json!({"min": 1, "max": 6})))
                .await
                .unwrap();
            let n: i64 = out.parse().unwrap();
            assert!((1..=6).contains(&n));
        }
    }

    #[tokio::test]
    async fn test_degenerate_range() {
        let out = GetRandomNumber
            .call(args(json!({"min": 7, "max": 7})))
            .await
            .unwrap();
        assert_eq!(out, "7");
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let err = GetRandomNumber
            .call(args(json!({"min": 10, "max": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_missing_bound_rejected() {
        let err = GetRandomNumber
            .call(args(json!({"min": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionError::InvalidArguments(_)));
    }
}
