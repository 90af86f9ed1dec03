//! JSON codec using `serde_json`.
//!
//! Requests always go out as compact, single-line JSON: `serde_json` escapes
//! control characters inside strings, so the encoded form never contains a
//! raw `\n` and the terminator stays unambiguous.
//!
//! # Example
//!
//! ```
//! use notecard_link::codec::JsonCodec;
//! use notecard_link::Document;
//!
//! let req = Document::new_request("card.version");
//! let encoded = JsonCodec::encode(&req).unwrap();
//! assert_eq!(encoded, br#"{"req":"card.version"}"#);
//!
//! let rsp = JsonCodec::decode(b"{\"version\":\"8.1.3\"}\r\n").unwrap();
//! assert_eq!(rsp.get_str("version"), Some("8.1.3"));
//! ```

use crate::document::Document;
use crate::error::{NotecardError, Result};
use crate::protocol::trim_line_ending;

/// JSON codec for request and response documents.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a document to compact JSON bytes (no terminator).
    ///
    /// # Errors
    ///
    /// Returns `Encode` if the document cannot be serialized.
    #[inline]
    pub fn encode(doc: &Document) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(doc)?)
    }

    /// Decode one received line into a document.
    ///
    /// The trailing `\r\n` is ignored. Anything other than a JSON object is
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the bytes are not a well-formed JSON object.
    #[inline]
    pub fn decode(line: &[u8]) -> Result<Document> {
        serde_json::from_slice(trim_line_ending(line)).map_err(NotecardError::Parse)
    }

    /// Decode one received line as text, without parsing it.
    ///
    /// # Errors
    ///
    /// Returns `Garbled` if the bytes are not UTF-8.
    pub fn decode_text(line: &[u8]) -> Result<String> {
        std::str::from_utf8(trim_line_ending(line))
            .map(str::to_string)
            .map_err(|_| NotecardError::Garbled)
    }
}
