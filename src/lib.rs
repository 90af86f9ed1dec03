//! # notecard-link
//!
//! Host-side transaction engine for the Blues Notecard.
//!
//! The Notecard speaks newline-terminated JSON: the host sends one request
//! object per line and reads back one response object per line. This crate
//! carries those exchanges over either of the device's two links and keeps
//! them strictly one-at-a-time.
//!
//! ## Architecture
//!
//! - **Engine** ([`Notecard`]): serializes exchanges, detects a desynced link
//!   and resynchronizes it with a reset handshake before the next exchange
//! - **Serial** ([`transport::SerialPort`]): byte stream, newline framed
//! - **I2C** ([`transport::I2cPort`]): addressed chunks, polled for data;
//!   raw bus access is guarded by a shareable [`IoLock`]
//!
//! ## Example
//!
//! ```ignore
//! use notecard_link::{Document, Notecard};
//! use notecard_link::transport::SystemSerial;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let card = Notecard::builder()
//!         .serial(SystemSerial::open("/dev/ttyACM0", 9600)?, 9600)
//!         .build();
//!
//!     let rsp = card
//!         .transaction(Document::new_request("card.version"))
//!         .await?;
//!     println!("{}", rsp.get_str("version").unwrap_or("unknown"));
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

mod debug;
mod document;
mod lock;
mod notecard;

pub use config::TransactionConfig;
pub use debug::DebugSink;
pub use document::{response_has_error, Document};
pub use error::{NotecardError, Result};
pub use lock::{IoGuard, IoLock, OwnedIoGuard};
pub use notecard::{Notecard, NotecardBuilder};
pub use transport::TransportKind;
