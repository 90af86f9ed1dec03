//! Request and response documents.
//!
//! A [`Document`] is an ordered-key JSON object (`serde_json` is built with
//! `preserve_order`, so keys go out in insertion order). Requests carry their
//! method in `req`, or in `cmd` when the device must not reply. Responses
//! report device-side failure through a non-empty `err` string.
//!
//! # Example
//!
//! ```
//! use notecard_link::Document;
//!
//! let req = Document::new_request("hub.set").with("product", "com.example:sensor");
//! assert_eq!(req.request_name(), Some("hub.set"));
//!
//! let rsp: Document = serde_json::from_str(r#"{"err":"{io} busy"}"#).unwrap();
//! assert!(rsp.has_error());
//! assert!(rsp.error_contains("io"));
//! ```

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::tags;

/// Field naming the method of a request that expects a reply.
pub const REQ_FIELD: &str = "req";
/// Field naming the method of a command (no reply).
pub const CMD_FIELD: &str = "cmd";
/// Field carrying a device-reported error.
pub const ERR_FIELD: &str = "err";
/// Field marking who produced a synthesized error.
pub const SRC_FIELD: &str = "src";
/// Value of `src` on error documents synthesized by this library.
pub const LOCAL_ERROR_SOURCE: &str = "notecard-link";

/// An ordered JSON object exchanged with the Notecard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document (a request body, or an empty reply).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request whose reply the caller wants.
    pub fn new_request(name: &str) -> Self {
        Self::new().with(REQ_FIELD, name)
    }

    /// Create a command; the device sends no reply.
    pub fn new_command(name: &str) -> Self {
        Self::new().with(CMD_FIELD, name)
    }

    /// Build an error document the way the device would report it.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new()
            .with(ERR_FIELD, message.into())
            .with(SRC_FIELD, LOCAL_ERROR_SOURCE)
    }

    /// Insert a field, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// The `req` or `cmd` name, whichever is present.
    pub fn request_name(&self) -> Option<&str> {
        self.get_str(REQ_FIELD).or_else(|| self.get_str(CMD_FIELD))
    }

    /// True if this document is a command (no reply expected).
    pub fn is_command(&self) -> bool {
        self.get_str(CMD_FIELD).is_some()
    }

    /// Get a string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// The device-reported error, if `err` is a non-empty string.
    pub fn error_message(&self) -> Option<&str> {
        self.get_str(ERR_FIELD).filter(|e| !e.is_empty())
    }

    /// True iff `err` is present and a non-empty string.
    #[inline]
    pub fn has_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// True iff `err` contains `needle` (a bare token or a `{tag}`).
    pub fn error_contains(&self, needle: &str) -> bool {
        self.error_message()
            .is_some_and(|e| tags::error_contains(e, needle))
    }

    /// True iff this document was synthesized locally rather than sent by the device.
    pub fn is_local_error(&self) -> bool {
        self.has_error() && self.get_str(SRC_FIELD) == Some(LOCAL_ERROR_SOURCE)
    }

    /// Unwrap into the underlying map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// True iff the response carries a non-empty `err` string.
///
/// This is the only device-reported error signal; transport failures are
/// reported separately by the engine.
#[inline]
pub fn response_has_error(rsp: &Document) -> bool {
    rsp.has_error()
}

impl Deref for Document {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = Value;

    /// Accepts only JSON objects; anything else is handed back.
    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.0)
    }
}
