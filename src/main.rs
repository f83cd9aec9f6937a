//! gsmd — GSM modem daemon entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SerialTransport   JsonLineSink + LogEventSink   ProcessDataCall│
//! │  (Transport)       (EventSink)                   (DataCallPort) │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            ModemService (no I/O of its own)            │    │
//! │  │  Channels · CallHandler · SMS codec                    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  io_task (read · timeout · control) · stdin reader thread      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `gsmd [config.json]`, or set `GSMD_CONFIG`.  Requests are read
//! as JSON lines on stdin; events and responses go to stdout as JSON
//! lines; logs go to stderr (`RUST_LOG`).

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use log::info;

use gsmd::adapters::data_call::ProcessDataCall;
use gsmd::adapters::json_sink::JsonLineSink;
use gsmd::adapters::log_sink::LogEventSink;
use gsmd::adapters::serial::SerialTransport;
use gsmd::app::ports::{SharedDataCall, SharedSink};
use gsmd::app::service::ModemService;
use gsmd::config::ModemConfig;
use gsmd::io_task::{self, Link};

fn load_config() -> Result<ModemConfig> {
    let path = std::env::args().nth(1).or_else(|| std::env::var("GSMD_CONFIG").ok());
    let Some(path) = path else {
        info!("no configuration given, using defaults");
        return Ok(ModemConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = ModemConfig::from_json(&text).with_context(|| format!("loading {path}"))?;
    info!("configuration loaded from {}", path);
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    info!("gsmd {} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let sink: SharedSink = Rc::new(RefCell::new((JsonLineSink::stdout(), LogEventSink::new())));
    let service = ModemService::new(config.clone(), sink)?;

    let data_call: SharedDataCall = Rc::new(RefCell::new(ProcessDataCall::new(config.data_call.clone())));
    service.set_data_port(data_call);

    let mut links = Vec::new();
    for channel in service.channels() {
        let path = channel.name();
        let transport = SerialTransport::open(&path, config.baud_rate, config.rts_cts)
            .with_context(|| format!("opening {path}"))?;
        links.push(Link::new(channel.clone(), transport));
    }

    io_task::spawn_stdin_reader().context("spawning stdin reader")?;

    let responses = RefCell::new(JsonLineSink::stdout());
    io_task::run(service, links, move |response| responses.borrow_mut().write_line(&response));

    info!("gsmd stopped");
    Ok(())
}
