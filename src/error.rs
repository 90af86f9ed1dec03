//! Error types for notecard-link.
//!
//! Every variant renders with the bracketed tag the Notecard itself uses
//! (`{io}`, `{mem}`, ...), so `err.to_string()` can be dropped straight into
//! the `err` field of a synthesized response document.

use thiserror::Error;

use crate::transport::I2cError;

/// Main error type for all transaction operations.
#[derive(Debug, Error)]
pub enum NotecardError {
    /// No transport registered, or the transport was explicitly disabled.
    #[error("notecard transport is not configured {{not-supported}}")]
    Disabled,

    /// The caller handed the engine no request at all.
    #[error("no request was supplied {{bad-request}}")]
    NoRequest,

    /// Nothing arrived from the device before the transaction deadline.
    #[error("transaction timeout {{io}}")]
    Timeout,

    /// A reply started arriving but its terminator never did.
    #[error("transaction incomplete {{io}}")]
    Incomplete,

    /// I2C: the device never reported a complete reply.
    #[error("request or response was lost {{io}}")]
    Lost,

    /// The I2C port reported a failed read or write.
    #[error(transparent)]
    I2c(#[from] I2cError),

    /// The reply outgrew the configured memory ceiling.
    #[error("response exceeds {limit} bytes: insufficient memory {{mem}}")]
    ResponseTooLarge {
        /// Configured `max_response_len`.
        limit: usize,
    },

    /// The resynchronization handshake did not succeed.
    #[error("failed to reset Notecard {{io}}")]
    ResetFailed,

    /// The reply was not a well-formed JSON object.
    #[error("unrecognized response from card {{io}}")]
    Parse(#[source] serde_json::Error),

    /// The reply contained bytes that are not UTF-8.
    #[error("response was not valid UTF-8 {{io}}")]
    Garbled,

    /// The request could not be serialized.
    #[error("request could not be encoded {{bad-format}}")]
    Encode(#[from] serde_json::Error),
}

impl NotecardError {
    /// True for failures that leave the link out of sync with the device.
    ///
    /// These set the reset-required flag and qualify for the single retry.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            NotecardError::Timeout
                | NotecardError::Incomplete
                | NotecardError::Lost
                | NotecardError::I2c(_)
                | NotecardError::ResponseTooLarge { .. }
                | NotecardError::ResetFailed
                | NotecardError::Parse(_)
                | NotecardError::Garbled
        )
    }

    /// True when the bytes arrived but did not decode.
    pub fn is_parse(&self) -> bool {
        matches!(self, NotecardError::Parse(_) | NotecardError::Garbled)
    }

    /// True when the failure happened before any I/O was attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(self, NotecardError::Disabled)
    }
}

/// Result type alias using NotecardError.
pub type Result<T> = std::result::Result<T, NotecardError>;
