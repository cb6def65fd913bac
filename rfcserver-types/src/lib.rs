//! Shared types for rfcserver
//!
//! This crate provides the value types shared between the server core and
//! its callers: logical system and function identifiers, transaction ids,
//! backend return codes and the structured error record the backend runtime
//! hands back from every primitive.

use serde::{Deserialize, Serialize};
use std::fmt;

mod bapi;
mod error;

pub use bapi::{ReturnMessage, ReturnMessageType};
pub use error::{RfcErrorGroup, RfcErrorInfo, RfcRc};

/// Logical identifier of a configured backend system (`SYSID`)
///
/// Used as the namespace for function and transaction-handler registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub String);

impl SystemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a remote-callable function module
///
/// ABAP function names are case-insensitive; names are stored upper-case so
/// `z_ping` and `Z_PING` address the same registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct FunctionName(String);

impl FunctionName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FunctionName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FunctionName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction identifier assigned by the remote peer (TID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh upper-case hex TID for transactions started on this side
    pub fn generate() -> Self {
        let mut buf = uuid::Uuid::encode_buffer();
        Self(uuid::Uuid::new_v4().simple().encode_upper(&mut buf).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of the inbound connection a callback is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Phase of the distributed-transaction protocol driven by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionPhase {
    Check,
    Commit,
    Rollback,
    Confirm,
}

impl TransactionPhase {
    pub const ALL: [TransactionPhase; 4] = [
        TransactionPhase::Check,
        TransactionPhase::Commit,
        TransactionPhase::Rollback,
        TransactionPhase::Confirm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionPhase::Check => "check",
            TransactionPhase::Commit => "commit",
            TransactionPhase::Rollback => "rollback",
            TransactionPhase::Confirm => "confirm",
        }
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome a phase callback hands back to the backend runtime
pub type TransactionPhaseResult = Result<(), RfcErrorInfo>;
