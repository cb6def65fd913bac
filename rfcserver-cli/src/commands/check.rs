//! Check command implementation.

use anyhow::Result;
use rfcserver_core::{FunctionName, ServerConfig, ServerParameters};
use serde::Serialize;

#[derive(Serialize)]
pub struct CheckResponse<'a> {
    pub system_id: String,
    pub parameters: &'a ServerParameters,
    pub stop_timeout_ms: u32,
    pub functions: &'a [FunctionName],
}

/// Print the resolved configuration as JSON
pub fn check_config(config: &ServerConfig, compact: bool) -> Result<()> {
    let payload = CheckResponse {
        system_id: config.system_id()?.to_string(),
        parameters: &config.parameters,
        stop_timeout_ms: config.stop_timeout_ms,
        functions: &config.functions,
    };

    let json = if compact {
        serde_json::to_string(&payload)?
    } else {
        serde_json::to_string_pretty(&payload)?
    };
    println!("{}", json);
    Ok(())
}
