//! Card Version - one request over a host serial port.
//!
//! This example demonstrates:
//! - Opening a serial port and building an engine around it
//! - Mirroring the exchange to stderr through the debug sink
//! - Telling transport failures apart from device-reported errors
//!
//! # Running
//!
//! ```text
//! cargo run --example card_version --features serialport -- /dev/ttyACM0 9600
//! ```

use notecard_link::transport::SystemSerial;
use notecard_link::{response_has_error, Document, Notecard};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let speed: u32 = match args.next() {
        Some(speed) => speed.parse()?,
        None => 9600,
    };

    let card = Notecard::builder()
        .serial(SystemSerial::open(&path, speed)?, speed)
        .debug_sink(std::io::stderr())
        .build();

    let rsp = card
        .transaction(Document::new_request("card.version"))
        .await?;

    if response_has_error(&rsp) {
        eprintln!("Notecard refused: {}", rsp.error_message().unwrap_or(""));
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&rsp)?);
    Ok(())
}
