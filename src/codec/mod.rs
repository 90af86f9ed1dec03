//! Codec module - serialization of request and response documents.
//!
//! - [`JsonCodec`] - compact single-line JSON via `serde_json`
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects.
//! The framers only ever see bytes; encoding happens once, before the
//! transaction locks are taken, so a document is never mutated mid-transmit.

mod json;

pub use json::JsonCodec;
