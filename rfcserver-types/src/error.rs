//! Backend return codes and the structured error record

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! rfc_codes {
    ($(#[$meta:meta])* $vis:vis enum $ty:ident { $($variant:ident = ($code:literal, $name:literal),)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        $vis enum $ty {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
        }

        impl $ty {
            /// Numeric value as reported by the backend runtime
            pub fn code(&self) -> i32 {
                match self {
                    $($ty::$variant => $code,)+
                }
            }

            /// Stable symbolic name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }

            /// Look up a value by its numeric code
            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

rfc_codes! {
    /// Return code of a backend runtime call
    pub enum RfcRc {
        Ok = (0, "RFC_OK"),
        CommunicationFailure = (1, "RFC_COMMUNICATION_FAILURE"),
        LogonFailure = (2, "RFC_LOGON_FAILURE"),
        AbapRuntimeFailure = (3, "RFC_ABAP_RUNTIME_FAILURE"),
        AbapMessage = (4, "RFC_ABAP_MESSAGE"),
        AbapException = (5, "RFC_ABAP_EXCEPTION"),
        Closed = (6, "RFC_CLOSED"),
        Canceled = (7, "RFC_CANCELED"),
        Timeout = (8, "RFC_TIMEOUT"),
        MemoryInsufficient = (9, "RFC_MEMORY_INSUFFICIENT"),
        VersionMismatch = (10, "RFC_VERSION_MISMATCH"),
        InvalidProtocol = (11, "RFC_INVALID_PROTOCOL"),
        SerializationFailure = (12, "RFC_SERIALIZATION_FAILURE"),
        InvalidHandle = (13, "RFC_INVALID_HANDLE"),
        Retry = (14, "RFC_RETRY"),
        ExternalFailure = (15, "RFC_EXTERNAL_FAILURE"),
        Executed = (16, "RFC_EXECUTED"),
        NotFound = (17, "RFC_NOT_FOUND"),
        NotSupported = (18, "RFC_NOT_SUPPORTED"),
        IllegalState = (19, "RFC_ILLEGAL_STATE"),
        InvalidParameter = (20, "RFC_INVALID_PARAMETER"),
        CodepageConversionFailure = (21, "RFC_CODEPAGE_CONVERSION_FAILURE"),
        ConversionFailure = (22, "RFC_CONVERSION_FAILURE"),
        BufferTooSmall = (23, "RFC_BUFFER_TOO_SMALL"),
        TableMoveBof = (24, "RFC_TABLE_MOVE_BOF"),
        TableMoveEof = (25, "RFC_TABLE_MOVE_EOF"),
        StartSapguiFailure = (26, "RFC_START_SAPGUI_FAILURE"),
        AbapClassException = (27, "RFC_ABAP_CLASS_EXCEPTION"),
        UnknownError = (28, "RFC_UNKNOWN_ERROR"),
        AuthorizationFailure = (29, "RFC_AUTHORIZATION_FAILURE"),
    }
}

rfc_codes! {
    /// Error group classifying where a failure originated
    pub enum RfcErrorGroup {
        Ok = (0, "OK"),
        AbapApplicationFailure = (1, "ABAP_APPLICATION_FAILURE"),
        AbapRuntimeFailure = (2, "ABAP_RUNTIME_FAILURE"),
        LogonFailure = (3, "LOGON_FAILURE"),
        CommunicationFailure = (4, "COMMUNICATION_FAILURE"),
        ExternalRuntimeFailure = (5, "EXTERNAL_RUNTIME_FAILURE"),
        ExternalApplicationFailure = (6, "EXTERNAL_APPLICATION_FAILURE"),
        ExternalAuthorizationFailure = (7, "EXTERNAL_AUTHORIZATION_FAILURE"),
        ExternalAuthenticationFailure = (8, "EXTERNAL_AUTHENTICATION_FAILURE"),
        CryptolibFailure = (9, "CRYPTOLIB_FAILURE"),
        LockingFailure = (10, "LOCKING_FAILURE"),
    }
}

impl RfcRc {
    /// Error group the backend reports alongside this code when it has none of
    /// its own to offer
    pub fn default_group(&self) -> RfcErrorGroup {
        match self {
            RfcRc::Ok => RfcErrorGroup::Ok,
            RfcRc::CommunicationFailure | RfcRc::Closed | RfcRc::Timeout | RfcRc::Canceled => {
                RfcErrorGroup::CommunicationFailure
            }
            RfcRc::LogonFailure => RfcErrorGroup::LogonFailure,
            RfcRc::AbapRuntimeFailure => RfcErrorGroup::AbapRuntimeFailure,
            RfcRc::AbapMessage | RfcRc::AbapException | RfcRc::AbapClassException => {
                RfcErrorGroup::AbapApplicationFailure
            }
            RfcRc::AuthorizationFailure => RfcErrorGroup::ExternalAuthorizationFailure,
            _ => RfcErrorGroup::ExternalRuntimeFailure,
        }
    }
}

/// Structured error returned by every backend runtime primitive
///
/// Besides the code, group and free-text message, ABAP-originated failures
/// carry the message class, type, number and up to four message variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfcErrorInfo {
    pub code: RfcRc,
    pub group: RfcErrorGroup,
    #[serde(default)]
    pub key: String,
    pub message: String,
    #[serde(default)]
    pub abap_msg_class: String,
    #[serde(default)]
    pub abap_msg_type: String,
    #[serde(default)]
    pub abap_msg_number: String,
    #[serde(default)]
    pub abap_msg_v1: String,
    #[serde(default)]
    pub abap_msg_v2: String,
    #[serde(default)]
    pub abap_msg_v3: String,
    #[serde(default)]
    pub abap_msg_v4: String,
}

impl RfcErrorInfo {
    /// Create an error for `code` with its default group and the code name as key
    pub fn new(code: RfcRc, message: impl Into<String>) -> Self {
        Self {
            code,
            group: code.default_group(),
            key: code.as_str().to_string(),
            message: message.into(),
            abap_msg_class: String::new(),
            abap_msg_type: String::new(),
            abap_msg_number: String::new(),
            abap_msg_v1: String::new(),
            abap_msg_v2: String::new(),
            abap_msg_v3: String::new(),
            abap_msg_v4: String::new(),
        }
    }

    /// Attach an ABAP message (class, type, number and variables)
    pub fn with_abap_message(
        mut self,
        class: impl Into<String>,
        msg_type: impl Into<String>,
        number: impl Into<String>,
        vars: [&str; 4],
    ) -> Self {
        self.abap_msg_class = class.into();
        self.abap_msg_type = msg_type.into();
        self.abap_msg_number = number.into();
        let [v1, v2, v3, v4] = vars;
        self.abap_msg_v1 = v1.to_string();
        self.abap_msg_v2 = v2.to_string();
        self.abap_msg_v3 = v3.to_string();
        self.abap_msg_v4 = v4.to_string();
        self
    }

    pub fn has_abap_message(&self) -> bool {
        !self.abap_msg_class.is_empty() || !self.abap_msg_number.is_empty()
    }
}

impl fmt::Display for RfcErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.group, self.message)?;
        if self.has_abap_message() {
            write!(
                f,
                " [{}{} {}]",
                self.abap_msg_class, self.abap_msg_type, self.abap_msg_number
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for RfcErrorInfo {}
