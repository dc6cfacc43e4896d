//! cache_get tool implementation.
//!
//! Reads the active generation's entry for a request without touching the
//! network.

use chrono::{DateTime, Utc};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_core::Error;

use crate::state::AppState;
use crate::tools::{body_text, default_method, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheGetOutput {
    pub url: String,
    pub method: String,
    pub generation: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub body_bytes: usize,
    pub stored_at: DateTime<Utc>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(state: &AppState, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let identity = state.identity(&params.method, &params.url)?;

    let lease = state
        .store
        .lease()
        .await
        .ok_or_else(|| Error::CacheMiss(format!("{identity}: no active generation")))?;

    let stored = lease
        .get(&identity)
        .await?
        .ok_or_else(|| Error::CacheMiss(identity.to_string()))?;

    let output = CacheGetOutput {
        url: identity.url().to_string(),
        method: identity.method().to_string(),
        generation: lease.generation().to_string(),
        status: stored.status,
        body: body_text(&stored.body),
        body_bytes: stored.body.len(),
        headers: stored.headers,
        stored_at: stored.stored_at,
    };

    Ok(json_result(&output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{shop_config, state_with};
    use crate::tools::result_json;

    fn params(url: &str) -> CacheGetParams {
        CacheGetParams { url: url.to_string(), method: default_method() }
    }

    #[tokio::test]
    async fn test_get_impl_no_active_generation() {
        let (state, _fetcher) = state_with(shop_config()).await;
        let err = get_impl(&state, params("/")).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let (state, fetcher) = state_with(shop_config()).await;
        fetcher.page("https://shop.test/", 200, "index");
        fetcher.page("https://shop.test/app.css", 200, "body { }");
        state.bootstrap().await.unwrap();

        let result = get_impl(&state, params("/app.css")).await.unwrap();
        let output = result_json(&result);
        assert_eq!(output["generation"], "shop-v1");
        assert_eq!(output["status"], 200);
        assert_eq!(output["body"], "body { }");
    }

    #[tokio::test]
    async fn test_get_impl_missing() {
        let (state, fetcher) = state_with(shop_config()).await;
        fetcher.page("https://shop.test/", 200, "index");
        fetcher.page("https://shop.test/app.css", 200, "css");
        state.bootstrap().await.unwrap();

        let err = get_impl(&state, params("/checkout")).await.unwrap_err();
        assert_eq!(err.code.0, -32001);
        assert!(err.message.contains("https://shop.test/checkout"));
    }
}
