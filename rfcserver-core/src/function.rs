//! Inbound function handlers
//!
//! Parameter marshalling belongs to the backend runtime; a handler only sees
//! the connection the call arrived on and the descriptor it was registered
//! with.

use rfcserver_types::{ConnectionHandle, FunctionName, RfcErrorInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of a function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterDirection {
    Importing,
    Exporting,
    Changing,
    Tables,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub direction: ParameterDirection,
    #[serde(default)]
    pub optional: bool,
}

/// Metadata of a function offered to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: FunctionName,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<FunctionName>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, direction: ParameterDirection) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            direction,
            optional: false,
        });
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Business logic invoked when the backend calls a registered function
pub trait FunctionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        connection: ConnectionHandle,
        function: &FunctionDescriptor,
    ) -> Result<(), RfcErrorInfo>;
}

impl<F> FunctionHandler for F
where
    F: Fn(ConnectionHandle, &FunctionDescriptor) -> Result<(), RfcErrorInfo> + Send + Sync + 'static,
{
    fn handle(
        &self,
        connection: ConnectionHandle,
        function: &FunctionDescriptor,
    ) -> Result<(), RfcErrorInfo> {
        self(connection, function)
    }
}

/// Shared handler reference as passed to the backend
pub type SharedFunctionHandler = Arc<dyn FunctionHandler>;
