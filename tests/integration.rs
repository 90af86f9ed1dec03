//! Integration tests for notecard-link.
//!
//! These drive the public engine against simulated devices on both
//! transports, using virtual time.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notecard_link::clock::ManualClock;
use notecard_link::transport::{I2cError, I2cPort, SerialPort};
use notecard_link::{
    response_has_error, Document, Notecard, NotecardError, TransactionConfig, TransportKind,
};

type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// A simulated Notecard: reassembles request lines and queues replies.
struct Device {
    partial: Vec<u8>,
    outbound: VecDeque<u8>,
    events: Vec<&'static str>,
    lines: Vec<String>,
    answer_blank: bool,
    terminate: bool,
    /// A request line has started and its reply has not been fully read.
    in_flight: bool,
    /// Request lines that started while another was still in flight.
    overlaps: usize,
    responder: Responder,
}

impl Device {
    fn new() -> Self {
        Self {
            partial: Vec::new(),
            outbound: VecDeque::new(),
            events: Vec::new(),
            lines: Vec::new(),
            answer_blank: true,
            terminate: true,
            in_flight: false,
            overlaps: 0,
            // Echo every request back.
            responder: Box::new(|line: &str| Some(line.to_string())),
        }
    }

    fn accept(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.handle_line(&line);
            } else {
                if self.partial.is_empty() {
                    if self.in_flight {
                        self.overlaps += 1;
                    }
                    self.in_flight = true;
                }
                self.partial.push(byte);
            }
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line).trim().to_string();
        if text.is_empty() {
            self.events.push("blank");
            if self.answer_blank {
                self.outbound.extend(b"\r\n");
            }
            return;
        }

        self.events.push("request");
        self.lines.push(text.clone());
        if text.contains("\"cmd\"") {
            self.in_flight = false;
            return;
        }
        match (self.responder)(&text) {
            Some(reply) => {
                self.outbound.extend(reply.bytes());
                if self.terminate {
                    self.outbound.extend(b"\r\n");
                }
            }
            None => self.in_flight = false,
        }
    }

    /// Hand one queued byte to the host; the exchange ends with the last one.
    fn pop(&mut self) -> Option<u8> {
        let byte = self.outbound.pop_front()?;
        if byte == b'\n' && self.outbound.is_empty() {
            self.in_flight = false;
        }
        Some(byte)
    }
}

#[derive(Clone)]
struct SharedDevice(Arc<Mutex<Device>>);

impl SharedDevice {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Device::new())))
    }

    fn with_responder(responder: impl FnMut(&str) -> Option<String> + Send + 'static) -> Self {
        let device = Self::new();
        device.0.lock().unwrap().responder = Box::new(responder);
        device
    }

    fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().events.clone()
    }

    fn clear_events(&self) {
        self.0.lock().unwrap().events.clear();
    }

    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().lines.clone()
    }
}

/// The device behind a UART.
struct FakeSerial(SharedDevice);

impl SerialPort for FakeSerial {
    fn reset(&mut self) -> bool {
        self.0 .0.lock().unwrap().events.push("reset");
        true
    }

    fn transmit(&mut self, data: &[u8], _flush: bool) {
        self.0 .0.lock().unwrap().accept(data);
    }

    fn available(&mut self) -> bool {
        !self.0 .0.lock().unwrap().outbound.is_empty()
    }

    fn receive(&mut self) -> u8 {
        self.0 .0.lock().unwrap().pop().unwrap_or(0)
    }
}

#[derive(Default)]
struct BusLog {
    addresses: Vec<u16>,
    largest_write: usize,
    /// Chunks the device accepted, in order.
    writes: Vec<Vec<u8>>,
    transmits: usize,
    /// 1-based transmit call that is refused.
    nack_on: Option<usize>,
}

/// The device behind an I2C bus with a limited transfer size.
struct FakeI2c {
    device: SharedDevice,
    log: Arc<Mutex<BusLog>>,
    max_read: usize,
    burst: usize,
}

impl FakeI2c {
    fn new(device: SharedDevice, max_read: usize, burst: usize) -> (Self, Arc<Mutex<BusLog>>) {
        let log = Arc::new(Mutex::new(BusLog::default()));
        let port = Self {
            device,
            log: log.clone(),
            max_read,
            burst,
        };
        (port, log)
    }
}

impl I2cPort for FakeI2c {
    fn reset(&mut self, _address: u16) -> bool {
        self.device.0.lock().unwrap().events.push("reset");
        true
    }

    fn transmit(&mut self, address: u16, data: &[u8]) -> Result<(), I2cError> {
        {
            let mut log = self.log.lock().unwrap();
            log.addresses.push(address);
            log.largest_write = log.largest_write.max(data.len());
            log.transmits += 1;
            if log.nack_on == Some(log.transmits) {
                return Err(I2cError::new("i2c: nack"));
            }
            log.writes.push(data.to_vec());
        }
        self.device.0.lock().unwrap().accept(data);
        Ok(())
    }

    fn receive(&mut self, address: u16, buf: &mut [u8]) -> Result<u32, I2cError> {
        if buf.len() > self.max_read {
            return Err(I2cError::new("i2c: read larger than device buffer"));
        }
        self.log.lock().unwrap().addresses.push(address);

        let mut device = self.device.0.lock().unwrap();
        for slot in buf.iter_mut() {
            *slot = device.pop().unwrap_or(0);
        }
        Ok(device.outbound.len().min(self.burst) as u32)
    }
}

/// Sink that records into shared memory.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn quick_config() -> TransactionConfig {
    TransactionConfig {
        transaction_timeout: Duration::from_secs(2),
        ..TransactionConfig::default()
    }
}

fn engine() -> Notecard {
    Notecard::builder()
        .config(quick_config())
        .clock(Arc::new(ManualClock::new()))
        .build()
}

/// Serial round trip; the first exchange starts with the handshake.
#[tokio::test]
async fn test_serial_round_trip() {
    let device = SharedDevice::new();
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let req = Document::new_request("card.version").with("id", 1);
    let rsp = card.transaction(req.clone()).await.unwrap();
    assert_eq!(rsp, req);
    assert_eq!(device.events(), vec!["reset", "blank", "request"]);
    assert!(!card.is_reset_required().await);

    device.clear_events();
    card.transaction(req).await.unwrap();
    assert_eq!(device.events(), vec!["request"]);
}

/// Large replies reassemble intact for every chunk size and burst pattern.
#[tokio::test]
async fn test_i2c_round_trip_across_chunk_sizes() {
    let body = "x".repeat(600);

    // Bursts above max_chunk must be clamped by the framer.
    for (max_chunk, burst) in [(1, 1), (7, 3), (7, 8), (30, 30), (30, 31), (255, 64)] {
        let device = SharedDevice::new();
        let (port, log) = FakeI2c::new(device.clone(), max_chunk, burst);
        let card = engine();
        card.set_i2c(port, 0, max_chunk).await;

        let req = Document::new_request("note.add").with("body", body.as_str());
        let rsp = card.transaction(req.clone()).await.unwrap();

        assert_eq!(rsp, req, "max_chunk={max_chunk} burst={burst}");
        let log = log.lock().unwrap();
        assert!(log.largest_write <= max_chunk);
        assert!(log.addresses.iter().all(|a| *a == 0x17));
    }
}

/// A device that never reports data ends in a timeout, not a hang.
#[tokio::test]
async fn test_i2c_silent_device_times_out() {
    let device = SharedDevice::with_responder(|_| None);
    let (port, _log) = FakeI2c::new(device.clone(), 30, 30);
    let card = engine();
    card.set_i2c(port, 0, 0).await;

    let err = card
        .transaction(Document::new_request("card.status"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotecardError::Lost));
    assert!(card.is_reset_required().await);
    // One handshake up front, one before the retry.
    assert_eq!(
        device.events(),
        vec!["reset", "blank", "request", "reset", "blank", "request"]
    );
}

/// Concurrent callers never interleave on the wire.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_are_serialized() {
    let device = SharedDevice::new();
    let card = Arc::new(engine());
    card.set_serial(FakeSerial(device.clone()), 115_200).await;

    let mut tasks = Vec::new();
    for task in 0..8u64 {
        let card = card.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10u64 {
                let id = task * 100 + i;
                let req = Document::new_request("test.echo").with("id", id);
                let rsp = card.transaction(req).await.unwrap();
                assert_eq!(rsp.get("id").and_then(|v| v.as_u64()), Some(id));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(device.0.lock().unwrap().overlaps, 0);
    let lines = device.lines();
    assert_eq!(lines.len(), 80);
    for line in lines {
        let doc: Document = serde_json::from_str(&line).unwrap();
        assert_eq!(doc.request_name(), Some("test.echo"));
    }
}

/// A refused chunk fails the transmit; the retry resynchronizes and resends
/// the whole line from its first chunk.
#[tokio::test]
async fn test_i2c_nack_resends_whole_message() {
    let device = SharedDevice::new();
    let (port, log) = FakeI2c::new(device.clone(), 8, 8);
    log.lock().unwrap().nack_on = Some(3);
    let card = engine();
    card.set_i2c(port, 0, 8).await;

    let req = Document::new_request("card.version");
    let rsp = card.transaction(req.clone()).await.unwrap();
    assert_eq!(rsp, req);

    let writes = log.lock().unwrap().writes.clone();
    // Handshake newline, then the first chunk before the refused write.
    assert_eq!(writes[0], b"\n");
    assert_eq!(writes[1], br#"{"req":""#);

    let resend = writes
        .iter()
        .rposition(|w| w.as_slice() == br#"{"req":""#)
        .unwrap();
    assert!(resend > 1);
    assert_eq!(writes[resend - 1], b"\n");
    let resent: Vec<u8> = writes[resend..].concat();
    assert_eq!(resent, b"{\"req\":\"card.version\"}\n");

    // Initial handshake, bus reset on the refusal, handshake before the retry.
    let events = device.events();
    assert!(events.iter().filter(|e| **e == "reset").count() >= 3);
    assert_eq!(events.last(), Some(&"request"));
    assert!(!card.is_reset_required().await);
}

/// Device-reported errors are responses, not transport failures.
#[tokio::test]
async fn test_device_error_classification() {
    let device = SharedDevice::with_responder(|_| {
        Some(r#"{"err":"note not found {note-noexist}"}"#.to_string())
    });
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let rsp = card
        .transaction(Document::new_request("note.get"))
        .await
        .unwrap();
    assert!(response_has_error(&rsp));
    assert!(rsp.error_contains("{note-noexist}"));
    assert!(!card.is_reset_required().await);
    assert_eq!(device.lines().len(), 1);
    // The transport succeeded even though the device refused.
    assert!(card.request(Document::new_request("note.get")).await);
}

/// An `{io}` error from the device flags the link and earns one retry.
#[tokio::test]
async fn test_device_io_error_is_retried_once() {
    let device = SharedDevice::with_responder(|_| Some(r#"{"err":"{io} busy"}"#.to_string()));
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let rsp = card
        .transaction(Document::new_request("card.status"))
        .await
        .unwrap();
    assert!(response_has_error(&rsp));
    assert_eq!(device.lines().len(), 2);
    assert!(card.is_reset_required().await);
}

/// A garbled reply triggers a handshake before the retry.
#[tokio::test]
async fn test_reset_precedes_retry_after_desync() {
    let mut garble = true;
    let device = SharedDevice::with_responder(move |line| {
        if std::mem::take(&mut garble) {
            Some("}{ not json".to_string())
        } else {
            Some(line.to_string())
        }
    });
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let req = Document::new_request("card.time");
    let rsp = card.transaction(req.clone()).await.unwrap();

    assert_eq!(rsp, req);
    assert_eq!(
        device.events(),
        vec!["reset", "blank", "request", "reset", "blank", "request"]
    );
    assert!(!card.is_reset_required().await);
}

/// A reply that never parses surfaces as an `{io}` error document.
#[tokio::test]
async fn test_unparseable_reply_becomes_error_document() {
    let device = SharedDevice::with_responder(|_| Some("garbage".to_string()));
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let rsp = card
        .request_response(Some(Document::new_request("card.version")))
        .await
        .unwrap();

    assert!(rsp.is_local_error());
    assert!(rsp.error_contains("{io}"));
    assert_eq!(device.lines().len(), 2);
    assert!(card.is_reset_required().await);
}

/// A reply without its terminator flags the link; the next exchange
/// resynchronizes before transmitting.
#[tokio::test]
async fn test_missing_terminator_forces_reset() {
    let device = SharedDevice::new();
    device.0.lock().unwrap().terminate = false;
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let err = card
        .transaction(Document::new_request("card.version"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotecardError::Incomplete));
    assert!(card.is_reset_required().await);

    device.0.lock().unwrap().terminate = true;
    device.clear_events();
    card.transaction(Document::new_request("card.version"))
        .await
        .unwrap();
    assert_eq!(device.events(), vec!["reset", "blank", "request"]);
}

/// Re-registering I2C replaces the address and forces a handshake.
#[tokio::test]
async fn test_i2c_reregistration_uses_new_address() {
    let device = SharedDevice::new();
    let card = engine();

    let (port, log) = FakeI2c::new(device.clone(), 30, 30);
    card.set_i2c(port, 0, 0).await;
    card.transaction(Document::new_request("card.version"))
        .await
        .unwrap();
    assert!(log.lock().unwrap().addresses.iter().all(|a| *a == 0x17));

    let (port, log) = FakeI2c::new(device.clone(), 30, 30);
    card.set_i2c(port, 0x42, 16).await;
    assert_eq!(
        card.transport().await,
        TransportKind::I2c {
            address: 0x42,
            max_chunk: 16
        }
    );
    assert!(card.is_reset_required().await);

    device.clear_events();
    card.transaction(Document::new_request("card.version"))
        .await
        .unwrap();
    assert_eq!(device.events(), vec!["reset", "blank", "request"]);
    assert!(log.lock().unwrap().addresses.iter().all(|a| *a == 0x42));

    assert!(card.set_i2c_address(0x43).await);
    card.transaction(Document::new_request("card.version"))
        .await
        .unwrap();
    assert_eq!(log.lock().unwrap().addresses.last(), Some(&0x43));
}

/// Commands are fire-and-forget and never repeated.
#[tokio::test]
async fn test_command_is_sent_without_reply() {
    let device = SharedDevice::new();
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let rsp = card
        .transaction(Document::new_command("hub.sync"))
        .await
        .unwrap();

    assert!(rsp.is_empty());
    assert_eq!(device.lines(), vec![r#"{"cmd":"hub.sync"}"#.to_string()]);
}

/// A device that never answers the handshake leaves the link flagged.
#[tokio::test]
async fn test_failed_handshake_keeps_reset_required() {
    let device = SharedDevice::new();
    device.0.lock().unwrap().answer_blank = false;
    let card = Notecard::builder()
        .config(TransactionConfig {
            reset_attempts: 2,
            ..quick_config()
        })
        .clock(Arc::new(ManualClock::new()))
        .serial(FakeSerial(device.clone()), 9600)
        .build();

    let err = card
        .transaction(Document::new_request("card.version"))
        .await
        .unwrap_err();

    assert!(matches!(err, NotecardError::ResetFailed));
    assert!(card.is_reset_required().await);
    assert!(device.lines().is_empty());

    device.0.lock().unwrap().answer_blank = true;
    card.reset().await.unwrap();
    assert!(!card.is_reset_required().await);
}

/// A disabled engine fails fast and touches no hardware.
#[tokio::test]
async fn test_disabled_transport_does_no_io() {
    let device = SharedDevice::new();
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;
    card.set_disabled().await;

    assert_eq!(card.transport().await, TransportKind::Disabled);
    let err = card
        .transaction(Document::new_request("card.version"))
        .await
        .unwrap_err();
    assert!(matches!(err, NotecardError::Disabled));
    assert!(device.events().is_empty());
}

/// Raw JSON passes through untouched in both directions.
#[tokio::test]
async fn test_request_response_json() {
    let device = SharedDevice::with_responder(|_| Some(r#"{"time":1700000000}"#.to_string()));
    let card = engine();
    card.set_serial(FakeSerial(device.clone()), 9600).await;

    let rsp = card
        .request_response_json("{\"req\":\"card.time\"}\n")
        .await
        .unwrap();

    assert_eq!(rsp, r#"{"time":1700000000}"#);
    assert_eq!(device.lines(), vec![r#"{"req":"card.time"}"#.to_string()]);
}

/// The debug sink sees both directions, and can be muted per transaction.
#[tokio::test]
async fn test_debug_sink_mirrors_frames() {
    let device = SharedDevice::new();
    let capture = Capture::default();
    let card = Notecard::builder()
        .config(quick_config())
        .clock(Arc::new(ManualClock::new()))
        .debug_sink(capture.clone())
        .serial(FakeSerial(device), 9600)
        .build();

    card.transaction(Document::new_request("card.version"))
        .await
        .unwrap();
    let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("> {\"req\":\"card.version\"}\n"));
    assert!(text.contains("< {\"req\":\"card.version\"}\n"));

    capture.0.lock().unwrap().clear();
    card.suspend_transaction_debug();
    card.transaction(Document::new_request("card.status"))
        .await
        .unwrap();
    assert!(capture.0.lock().unwrap().is_empty());
}

/// Application log lines reach the sink even while frames are muted.
#[tokio::test]
async fn test_log_debug_reaches_sink() {
    let capture = Capture::default();
    let card = engine();
    card.log_debug("sensor warm-up complete");

    card.set_debug_sink(capture.clone());
    card.suspend_transaction_debug();
    card.log_debug("sensor warm-up complete");

    let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert_eq!(text, "sensor warm-up complete\n");

    card.clear_debug_sink();
    card.log_debug("dropped");
    assert_eq!(capture.0.lock().unwrap().len(), text.len());
}
