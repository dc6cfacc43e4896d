//! Generation lifecycle tools: install, activate, list.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_core::Generation;

use crate::state::AppState;
use crate::tools::json_result;

/// Parameters for the generation_install tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InstallParams {
    /// Generation name (default: the configured generation).
    #[serde(default)]
    pub name: Option<String>,

    /// Activate immediately after a successful install.
    #[serde(default)]
    pub activate: bool,
}

/// Parameters for the generation_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivateParams {
    /// Name of a waiting generation.
    pub name: String,
}

/// Output from generation_install and generation_activate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleOutput {
    pub generation: Generation,
    /// Generation that stopped serving as a result of this call.
    pub superseded: Option<String>,
}

/// Output from generation_list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOutput {
    pub active: Option<String>,
    pub generations: Vec<Generation>,
}

pub async fn install_impl(state: &AppState, params: InstallParams) -> Result<CallToolResult, McpError> {
    let name = params.name.unwrap_or_else(|| state.config.generation.clone());

    let mut generation = state.lifecycle.install(&name).await?;
    let mut superseded = None;
    if params.activate {
        superseded = state.lifecycle.activate(&name).await?;
        generation = current(state, &name).await?;
    }

    Ok(json_result(&LifecycleOutput { generation, superseded })?)
}

pub async fn activate_impl(state: &AppState, params: ActivateParams) -> Result<CallToolResult, McpError> {
    let superseded = state.lifecycle.activate(&params.name).await?;
    let generation = current(state, &params.name).await?;
    Ok(json_result(&LifecycleOutput { generation, superseded })?)
}

pub async fn list_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let output = ListOutput {
        active: state.store.active_generation().await,
        generations: state.lifecycle.generations().await?,
    };
    Ok(json_result(&output)?)
}

async fn current(state: &AppState, name: &str) -> Result<Generation, offcache_core::Error> {
    state
        .store
        .db()
        .get_generation(name)
        .await?
        .ok_or_else(|| offcache_core::Error::GenerationNotFound(name.to_string()))
}
