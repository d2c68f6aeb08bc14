//! Brave web search

use super::{parse_args, Arguments, Function, FunctionError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const MAX_RESULTS: usize = 5;

pub struct BraveSearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl BraveSearch {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, SEARCH_ENDPOINT.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Default, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize, Serialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Keep the top hits only; the raw response is far too large to replay upstream
fn summarize(response: SearchResponse) -> Value {
    let results: Vec<WebResult> = response
        .web
        .map(|w| w.results)
        .unwrap_or_default()
        .into_iter()
        .take(MAX_RESULTS)
        .collect();
    json!({ "results": results })
}

#[async_trait]
impl Function for BraveSearch {
    fn name(&self) -> &'static str {
        "brave_search"
    }

    fn description(&self) -> String {
        "Perform a web search for recent information".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"}
            },
            "required": ["query"]
        })
    }

    fn accepted_parameters(&self) -> &'static [&'static str] {
        &["query"]
    }

    async fn call(&self, args: Arguments) -> Result<String, FunctionError> {
        let input: SearchInput = parse_args(args)?;
        if input.query.trim().is_empty() {
            return Err(FunctionError::InvalidArguments("query is empty".to_string()));
        }

        tracing::info!(query = %input.query, "Performing web search");

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", input.query.as_str())])
            .send()
            .await
            .map_err(|e| FunctionError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FunctionError::Upstream(format!("{status} - {body}")));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| FunctionError::Upstream(format!("Unreadable search response: {e}")))?;

        Ok(summarize(parsed).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_keeps_top_results() {
        let raw = json!({
            "web": {
                "results": (0..8).map(|i| json!({
                    "title": format!("t{i}"),
                    "url": format!("https://example.com/{i}"),
                    "description": "d",
                    "extra": {"ignored": true}
                })).collect::<Vec<_>>()
            }
        });
        let parsed: SearchResponse = serde_json::from_value(raw).unwrap();
        let summary = summarize(parsed);

        let results = summary["results"].as_array().unwrap();
        assert_eq!(results.len(), MAX_RESULTS);
        assert_eq!(results[0]["title"], "t0");
        assert!(results[0].get("extra").is_none());
    }

    #[test]
    fn test_summarize_without_web_section() {
        let parsed: SearchResponse = serde_json::from_value(json!({"type": "search"})).unwrap();
        assert_eq!(summarize(parsed), json!({"results": []}));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let search = BraveSearch::with_endpoint("k".into(), "http://127.0.0.1:9".into());
        let args = json!({"query": "  "}).as_object().cloned().unwrap();
        assert!(matches!(
            search.call(args).await,
            Err(FunctionError::InvalidArguments(_))
        ));
    }
}
