//! Error tags embedded in Notecard error strings.
//!
//! The device (and this library) classify errors by embedding a bracketed
//! token in an otherwise human-readable message, e.g.
//! `"note-c: request or response was lost {io}"`. Consumers test membership by
//! substring containment, so the spellings below must match device firmware
//! exactly.
//!
//! # Example
//!
//! ```
//! use notecard_link::protocol::tags;
//!
//! let err = "{io} card busy";
//! assert!(tags::has_tag(err, tags::IO));
//! assert_eq!(tags::clean_error(err), "card busy");
//! ```

/// I/O failure or lost synchronization.
pub const IO: &str = "io";
/// Host or device ran out of memory.
pub const MEM: &str = "mem";
/// A request or response was malformed.
pub const BAD_FORMAT: &str = "bad-format";
/// The request itself was missing or unusable.
pub const BAD_REQUEST: &str = "bad-request";
/// The operation is not available in the current configuration.
pub const NOT_SUPPORTED: &str = "not-supported";
/// The device has not yet obtained network time.
pub const TIME: &str = "time";
/// The requested note or file does not exist.
pub const NOTE_NOEXIST: &str = "note-noexist";

/// Check whether `err` contains `needle` anywhere.
///
/// Equivalent to the device library's `NoteErrorContains`: pass either a bare
/// token (`"io"`) or a bracketed one (`"{io}"`).
#[inline]
pub fn error_contains(err: &str, needle: &str) -> bool {
    err.contains(needle)
}

/// Check whether `err` carries the bracketed tag `{token}`.
///
/// An empty token never matches.
pub fn has_tag(err: &str, token: &str) -> bool {
    !token.is_empty() && err.contains(&format!("{{{token}}}"))
}

/// Strip every `{tag}` (and the single space before it) from an error string.
///
/// Mirrors `NoteErrorClean`, but returns a trimmed copy instead of rewriting
/// a buffer in place. An unterminated brace is left as is.
pub fn clean_error(err: &str) -> String {
    let mut out = String::with_capacity(err.len());
    let mut rest = err;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let before = &rest[..open];
        out.push_str(before.strip_suffix(' ').unwrap_or(before));
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out.trim().to_string()
}
