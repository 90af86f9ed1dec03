//! The transaction engine.
//!
//! A [`Notecard`] serializes request/response exchanges over whichever
//! transport is registered. One exchange is in flight at a time: the
//! transaction lock (`noteLock`) is held from the first transmitted byte
//! until the reply has been decoded, and it also guards the transport
//! registry so re-registration cannot race an exchange.
//!
//! Lifecycle of one exchange:
//! 1. Take the transaction lock
//! 2. If the link is flagged out of sync, run the reset handshake
//! 3. Transmit the request line
//! 4. Receive the reply line (skipped for commands)
//! 5. Decode; on a desync, flag the link and retry once
//!
//! # Example
//!
//! ```ignore
//! use notecard_link::{Document, Notecard};
//!
//! let card = Notecard::builder()
//!     .serial(port, 9600)
//!     .build();
//!
//! let rsp = card.transaction(Document::new_request("card.version")).await?;
//! println!("{}", rsp.get_str("version").unwrap_or("?"));
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::clock::{Clock, TokioClock};
use crate::codec::JsonCodec;
use crate::config::TransactionConfig;
use crate::debug::{DebugChannel, DebugSink, Direction};
use crate::document::Document;
use crate::error::{NotecardError, Result};
use crate::lock::IoLock;
use crate::protocol::tags;
use crate::transport::{
    I2cFramer, I2cPort, LinkContext, SerialFramer, SerialPort, Transport, TransportKind,
};

/// Transaction attempts for a request: the first try plus one retry.
const REQUEST_ATTEMPTS: u32 = 2;

/// State owned by the transaction lock.
struct Session {
    transport: Transport,
    reset_required: bool,
}

impl Session {
    fn register(&mut self, transport: Transport) {
        self.transport = transport;
        // Whatever the new link was doing before, we were not part of it.
        self.reset_required = true;
    }
}

/// A decoded reply, as produced by one of the request entry points.
trait Reply: Sized {
    fn from_line(line: Option<Bytes>) -> Result<Self>;

    /// True if the device itself reports the link out of sync.
    fn desynced(&self) -> bool {
        false
    }
}

impl Reply for Document {
    fn from_line(line: Option<Bytes>) -> Result<Self> {
        match line {
            Some(line) => JsonCodec::decode(&line),
            None => Ok(Document::new()),
        }
    }

    fn desynced(&self) -> bool {
        self.error_message()
            .is_some_and(|err| tags::has_tag(err, tags::IO))
    }
}

impl Reply for String {
    fn from_line(line: Option<Bytes>) -> Result<Self> {
        match line {
            Some(line) => JsonCodec::decode_text(&line),
            None => Ok(String::new()),
        }
    }
}

/// Builder for a [`Notecard`].
///
/// Everything is optional; an engine built with no transport answers every
/// request with `Disabled` until one is registered.
pub struct NotecardBuilder {
    config: TransactionConfig,
    clock: Arc<dyn Clock>,
    io: IoLock,
    debug: Option<Box<dyn DebugSink>>,
    transport: Transport,
}

impl NotecardBuilder {
    /// Create a builder with default timing and a real-time clock.
    pub fn new() -> Self {
        Self {
            config: TransactionConfig::default(),
            clock: Arc::new(TokioClock::new()),
            io: IoLock::new(),
            debug: None,
            transport: Transport::Disabled,
        }
    }

    /// Replace the timing and sizing configuration.
    pub fn config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the receive deadline for one exchange.
    ///
    /// Default: 30 seconds
    pub fn transaction_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.transaction_timeout = timeout;
        self
    }

    /// Set the memory ceiling for one response.
    ///
    /// Default: 64 KiB
    pub fn max_response_len(mut self, limit: usize) -> Self {
        self.config.max_response_len = limit;
        self
    }

    /// Use a custom time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing I2C bus lock with other peripherals.
    pub fn io_lock(mut self, io: IoLock) -> Self {
        self.io = io;
        self
    }

    /// Mirror frames and log lines to `sink`.
    pub fn debug_sink(mut self, sink: impl DebugSink + 'static) -> Self {
        self.debug = Some(Box::new(sink));
        self
    }

    /// Start with a serial transport.
    pub fn serial(mut self, port: impl SerialPort + 'static, speed: u32) -> Self {
        self.transport = Transport::Serial(SerialFramer::new(Box::new(port), speed));
        self
    }

    /// Start with an I2C transport; `0` selects the default address or
    /// chunk size.
    pub fn i2c(mut self, port: impl I2cPort + 'static, address: u16, max_chunk: usize) -> Self {
        self.transport = Transport::I2c(I2cFramer::new(Box::new(port), address, max_chunk));
        self
    }

    /// Build the engine. No I/O happens until the first transaction.
    pub fn build(self) -> Notecard {
        let debug = DebugChannel::default();
        if let Some(sink) = self.debug {
            debug.set_sink(sink);
        }

        Notecard {
            session: Mutex::new(Session {
                transport: self.transport,
                reset_required: true,
            }),
            io: self.io,
            clock: self.clock,
            config: self.config,
            debug,
        }
    }
}

impl Default for NotecardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction engine for one Notecard.
///
/// All methods take `&self`; share the engine between tasks with an `Arc`.
pub struct Notecard {
    /// The transaction lock.
    session: Mutex<Session>,
    io: IoLock,
    clock: Arc<dyn Clock>,
    config: TransactionConfig,
    debug: DebugChannel,
}

impl Notecard {
    /// Create a new engine builder.
    pub fn builder() -> NotecardBuilder {
        NotecardBuilder::new()
    }

    /// A blank request document for `name`.
    pub fn new_request(&self, name: &str) -> Document {
        Document::new_request(name)
    }

    /// A blank command document for `name`; commands get no reply.
    pub fn new_command(&self, name: &str) -> Document {
        Document::new_command(name)
    }

    /// Handle to the I2C bus lock, for other users of the same bus.
    pub fn io_lock(&self) -> IoLock {
        self.io.clone()
    }

    /// The timing and sizing in effect.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    // ---- Registry -------------------------------------------------------

    /// Make serial the active transport.
    pub async fn set_serial(&self, port: impl SerialPort + 'static, speed: u32) {
        let transport = Transport::Serial(SerialFramer::new(Box::new(port), speed));
        self.session.lock().await.register(transport);
        tracing::debug!("Registered serial transport at {} baud", speed);
    }

    /// Make I2C the active transport; `0` selects the default address or
    /// chunk size.
    pub async fn set_i2c(&self, port: impl I2cPort + 'static, address: u16, max_chunk: usize) {
        let framer = I2cFramer::new(Box::new(port), address, max_chunk);
        tracing::debug!(
            "Registered I2C transport at {:#04x}, {} byte chunks",
            framer.address(),
            framer.max_chunk()
        );
        self.session.lock().await.register(Transport::I2c(framer));
    }

    /// Change the device address of the active I2C transport.
    ///
    /// Returns `false` if I2C is not the active transport.
    pub async fn set_i2c_address(&self, address: u16) -> bool {
        let mut session = self.session.lock().await;
        let Transport::I2c(framer) = &mut session.transport else {
            return false;
        };
        framer.set_address(address);
        session.reset_required = true;
        true
    }

    /// Deactivate the transport; every transaction fails until a new one
    /// is registered.
    pub async fn set_disabled(&self) {
        self.session.lock().await.register(Transport::Disabled);
    }

    /// Which transport is active.
    pub async fn transport(&self) -> TransportKind {
        self.session.lock().await.transport.kind()
    }

    // ---- Debug channel --------------------------------------------------

    /// Mirror frames and log lines to `sink`, replacing any previous sink.
    pub fn set_debug_sink(&self, sink: impl DebugSink + 'static) {
        self.debug.set_sink(Box::new(sink));
    }

    /// Write an application log line to the debug output.
    ///
    /// The line goes to the installed sink (if any) and to `tracing`; frame
    /// suspension does not affect it.
    pub fn log_debug(&self, message: &str) {
        self.debug.log(message);
    }

    /// Stop mirroring.
    pub fn clear_debug_sink(&self) {
        self.debug.clear_sink();
    }

    /// Stop mirroring request/response frames; log lines still go out.
    pub fn suspend_transaction_debug(&self) {
        self.debug.suspend();
    }

    /// Resume mirroring request/response frames.
    pub fn resume_transaction_debug(&self) {
        self.debug.resume();
    }

    // ---- Reset state ----------------------------------------------------

    /// Force a reset handshake before the next transaction.
    pub async fn set_reset_required(&self) {
        self.session.lock().await.reset_required = true;
    }

    /// True if the next transaction will start with a reset handshake.
    pub async fn is_reset_required(&self) -> bool {
        self.session.lock().await.reset_required
    }

    /// Run the reset handshake now.
    ///
    /// # Errors
    ///
    /// `Disabled` without a transport, `ResetFailed` if the device never
    /// came back in sync. The reset-required flag stays set on failure.
    pub async fn reset(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let cx = self.link();
        match session.transport.reset(&cx).await {
            Ok(()) => {
                session.reset_required = false;
                Ok(())
            }
            Err(e) => {
                session.reset_required = true;
                Err(e)
            }
        }
    }

    // ---- Transactions ---------------------------------------------------

    /// Perform one exchange and return the device's reply.
    ///
    /// Commands (`cmd` instead of `req`) are transmitted without waiting and
    /// yield an empty document. A device reply carrying an `err` field is
    /// still `Ok`; use [`response_has_error`](crate::response_has_error).
    ///
    /// # Errors
    ///
    /// `Disabled` without a transport; a transport or decode error after the
    /// retry is exhausted (the link is then flagged for reset).
    pub async fn transaction(&self, req: Document) -> Result<Document> {
        let payload = JsonCodec::encode(&req)?;
        let is_command = req.is_command();
        drop(req);
        self.transact(&payload, is_command).await
    }

    /// Perform one exchange, converting every outcome to a document.
    ///
    /// - `None` in: an error document tagged `{bad-request}`, no I/O
    /// - reply decoded: `Some(reply)`
    /// - reply unparseable: an error document tagged `{io}`
    /// - no transport or transport failure: `None`
    pub async fn request_response(&self, req: Option<Document>) -> Option<Document> {
        let Some(req) = req else {
            return Some(Document::error(NotecardError::NoRequest.to_string()));
        };

        match self.transaction(req).await {
            Ok(rsp) => Some(rsp),
            Err(
                e @ (NotecardError::Parse(_) | NotecardError::Garbled | NotecardError::Encode(_)),
            ) => Some(Document::error(e.to_string())),
            Err(e) => {
                tracing::warn!("Transaction failed: {}", e);
                None
            }
        }
    }

    /// Perform one exchange and report only whether the transport succeeded.
    ///
    /// The reply is discarded, including any `err` it carried.
    pub async fn request(&self, req: Document) -> bool {
        match self.transaction(req).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Request failed: {}", e);
                false
            }
        }
    }

    /// Perform one exchange with pre-serialized JSON.
    ///
    /// The request is sent as given (with its line ending normalized) and
    /// the reply is returned as text, without parsing.
    ///
    /// # Errors
    ///
    /// Same as [`transaction`](Self::transaction), plus `Garbled` if the reply
    /// is not UTF-8.
    pub async fn request_response_json(&self, req: &str) -> Result<String> {
        let is_command = serde_json::from_str::<Document>(req).is_ok_and(|doc| doc.is_command());
        self.transact(req.as_bytes(), is_command).await
    }

    // ---- Internals ------------------------------------------------------

    fn link(&self) -> LinkContext<'_> {
        LinkContext {
            config: &self.config,
            clock: self.clock.as_ref(),
            debug: &self.debug,
            io: &self.io,
        }
    }

    async fn transact<T: Reply>(&self, payload: &[u8], is_command: bool) -> Result<T> {
        let mut session = self.session.lock().await;
        // Commands are not idempotent on the device; never repeat them.
        let attempts = if is_command { 1 } else { REQUEST_ATTEMPTS };

        for attempt in 1..=attempts {
            let retry = attempt < attempts;
            let outcome = self
                .attempt(&mut session, payload, !is_command)
                .await
                .and_then(T::from_line);

            match outcome {
                Ok(rsp) if rsp.desynced() => {
                    session.reset_required = true;
                    if retry {
                        self.debug.log("notecard reported i/o error; retrying");
                        continue;
                    }
                    return Ok(rsp);
                }
                Ok(rsp) => return Ok(rsp),
                Err(e) if e.requires_reset() => {
                    session.reset_required = true;
                    if retry {
                        tracing::debug!("Transaction attempt {} failed: {}; retrying", attempt, e);
                        continue;
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        // Only reachable with zero attempts.
        Err(NotecardError::Disabled)
    }

    /// One exchange: optional handshake, transmit, optional receive.
    async fn attempt(
        &self,
        session: &mut Session,
        payload: &[u8],
        expect_reply: bool,
    ) -> Result<Option<Bytes>> {
        if matches!(session.transport, Transport::Disabled) {
            return Err(NotecardError::Disabled);
        }

        let cx = self.link();
        if session.reset_required {
            session.transport.reset(&cx).await?;
            session.reset_required = false;
        }

        self.debug.frame(Direction::Outbound, payload);
        session.transport.transmit(payload, &cx).await?;
        if !expect_reply {
            return Ok(None);
        }

        let line = session.transport.receive(&cx).await?;
        self.debug.frame(Direction::Inbound, &line);
        Ok(Some(line))
    }
}
