//! Error handling for the bridge

use std::fmt;
use thiserror::Error;

use crate::registry::DocumentHandle;

/// Categorical diagnostic reported by the PDF library when a load fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryErrorCode {
    Unknown,
    File,
    Format,
    Password,
    Security,
    Page,
}

impl LibraryErrorCode {
    /// Human-readable reason for the code.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown error",
            Self::File => "File not found or could not be opened",
            Self::Format => "Invalid or corrupted PDF format",
            Self::Password => "Password required or incorrect password",
            Self::Security => "Unsupported security scheme",
            Self::Page => "Page not found or content error",
        }
    }
}

impl fmt::Display for LibraryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Coarse classification hosts use to pick an exception class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Range,
    State,
    Library,
}

/// The main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Wrong argument count or type. A caller bug, never retried.
    #[error("{0}")]
    Validation(String),
    #[error("Invalid document handle: {0}")]
    NotFound(DocumentHandle),
    /// Index or size outside its valid bounds. The message states the bounds.
    #[error("{0}")]
    Range(String),
    /// Operation applied to the wrong kind of object, or an unsupported format.
    #[error("{0}")]
    State(String),
    #[error("{message}")]
    Library {
        code: Option<LibraryErrorCode>,
        message: String,
    },
}

impl BridgeError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn range<S: Into<String>>(msg: S) -> Self {
        Self::Range(msg.into())
    }
    pub fn state<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }
    pub fn library<S: Into<String>>(msg: S) -> Self {
        Self::Library {
            code: None,
            message: msg.into(),
        }
    }

    /// Library failure carrying a diagnostic code; the message is its reason.
    pub fn library_code(code: LibraryErrorCode) -> Self {
        Self::Library {
            code: Some(code),
            message: code.reason().to_string(),
        }
    }

    /// `what` `value` out of range `[0, len-1]`.
    pub fn out_of_range(what: &str, value: i64, len: usize) -> Self {
        let last = i64::try_from(len).map_or(i64::MAX, |len| len - 1);
        Self::Range(format!("{what} {value} out of range [0, {last}]"))
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Range(_) => ErrorKind::Range,
            Self::State(_) => ErrorKind::State,
            Self::Library { .. } => ErrorKind::Library,
        }
    }

    pub const fn library_error_code(&self) -> Option<LibraryErrorCode> {
        match self {
            Self::Library { code, .. } => *code,
            _ => None,
        }
    }

    /// Prefix the message with the operation name, keeping the variant.
    #[must_use]
    pub fn context(self, operation: &str) -> Self {
        match self {
            Self::Validation(msg) => Self::Validation(format!("{operation}: {msg}")),
            Self::Range(msg) => Self::Range(format!("{operation}: {msg}")),
            Self::State(msg) => Self::State(format!("{operation}: {msg}")),
            Self::Library { code, message } => Self::Library {
                code,
                message: format!("{operation}: {message}"),
            },
            not_found @ Self::NotFound(_) => not_found,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
