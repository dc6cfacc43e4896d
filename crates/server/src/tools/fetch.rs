//! fetch tool implementation.
//!
//! Routes one request through the interceptor and reports where the answer
//! came from. A non-2xx origin answer is a response like any other and is
//! rendered with its status rather than as a tool error.

use chrono::{DateTime, Utc};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::{Intercepted, ResponseSource};
use offcache_core::{Error, HttpResponse, RequestIdentity, RouteClass};

use super::{body_text, default_method, json_result};
use crate::error::ToolError;
use crate::state::AppState;

/// Parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

/// Output from the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutput {
    pub url: String,
    pub method: String,
    pub route: RouteClass,
    pub source: ResponseSource,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub body_bytes: usize,
    /// Set when the response was served from the store.
    pub stored_at: Option<DateTime<Utc>>,
}

impl FetchOutput {
    fn new(
        identity: &RequestIdentity, route: RouteClass, source: ResponseSource, response: HttpResponse,
        stored_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            url: identity.url().to_string(),
            method: identity.method().to_string(),
            route,
            source,
            status: response.status,
            body: body_text(&response.body),
            body_bytes: response.body.len(),
            headers: response.headers,
            stored_at,
        }
    }
}

/// Implementation of the fetch tool.
pub async fn fetch_impl(state: &AppState, params: FetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url must not be empty".into()).into());
    }

    let identity = state.identity(&params.method, &params.url)?;

    let output = match state.interceptor.intercept(&identity).await {
        Ok(Intercepted { route, source, response, stored_at }) => {
            FetchOutput::new(&identity, route, source, response, stored_at)
        }
        Err(Error::OriginError(response)) => {
            let route = state.interceptor.policy().classify(&identity);
            FetchOutput::new(&identity, route, ResponseSource::Network, *response, None)
        }
        Err(e) => {
            tracing::info!(request = %identity, error = %e, "fetch failed");
            return Err(e.into());
        }
    };

    Ok(json_result(&output)?)
}
