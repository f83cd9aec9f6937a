//! Async I/O loop — drives every channel against its transport.
//!
//! Runs on the daemon's main thread using `edge-executor` for cooperative
//! scheduling and `async-io-mini` timers (no busy-spinning).  Three
//! futures share the links:
//!
//! 1. **Read**: drains each transport every 1ms, feeds the channel and
//!    services its writable edge
//! 2. **Timeout**: polls command deadlines every 100ms
//! 3. **Control**: truly async via `CONTROL.receive().await`; wakes on
//!    stdin requests and data-call helper events from other threads
//!
//! ```text
//!  ┌──────────────┐  ControlMsg   ┌────────────────────────────────┐
//!  │ stdin thread │──────────────▶│  LocalExecutor                  │
//!  └──────────────┘               │  ┌──────┐ ┌─────────┐ ┌───────┐ │
//!  ┌──────────────┐  ControlMsg   │  │ Read │ │ Timeout │ │Control│ │
//!  │ helper waiter│──────────────▶│  │ 1ms  │ │ 100ms   │ │ async │ │
//!  └──────────────┘               │  └──────┘ └─────────┘ └───────┘ │
//!                                 └────────────────────────────────┘
//! ```

use core::cell::RefCell;
use core::time::Duration;
use std::io::BufRead;
use std::rc::Rc;
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel as Mailbox;
use log::{debug, error, info, warn};

use crate::app::commands::{Request, Response};
use crate::app::service::ModemService;
use crate::at::channel::Channel;
use crate::at::transport::Transport;

const READ_BUF_SIZE: usize = 1024;

/// Depth of the control mailbox.
const CONTROL_DEPTH: usize = 16;

/// Messages from other threads into the I/O loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMsg {
    /// One JSON request line.
    Request(String),
    /// A helper took over `device`; stop reading it.
    DataCallStarted { device: String },
    /// The helper for `call` exited and released `device`.
    DataCallEnded { call: u8, device: String },
    /// Input closed; leave the loop.
    Shutdown,
}

/// Inbound control mailbox: stdin / helper threads → I/O loop.
pub static CONTROL: Mailbox<CriticalSectionRawMutex, ControlMsg, CONTROL_DEPTH> = Mailbox::new();

/// Post from a foreign thread, waiting for room.
pub fn send_blocking(msg: ControlMsg) {
    futures_lite::future::block_on(CONTROL.send(msg));
}

// ── Links ────────────────────────────────────────────────────

/// A channel paired with the transport it talks over.
pub struct Link<T> {
    pub channel: Channel,
    pub transport: T,
    /// Handed to a data-call helper.
    suspended: bool,
    /// Transport failed; the channel has been hung up.
    dead: bool,
}

impl<T: Transport> Link<T> {
    pub fn new(channel: Channel, transport: T) -> Self {
        Self {
            channel,
            transport,
            suspended: false,
            dead: false,
        }
    }

    /// One read-and-write pass.  Returns `true` when bytes were read.
    pub fn service(&mut self, buf: &mut [u8], now: Instant) -> bool {
        if self.suspended || self.dead {
            return false;
        }
        let mut got = false;
        match self.transport.read(buf) {
            Ok(0) => {}
            Ok(n) => {
                self.channel.feed(&buf[..n], now);
                got = true;
            }
            Err(e) => {
                error!("IO: {}: read failed: {:?}", self.channel.name(), e);
                self.dead = true;
                self.channel.hangup();
                return false;
            }
        }
        if self.channel.wants_write() {
            self.channel.on_writable(&mut self.transport, now);
        }
        got
    }
}

type SharedLinks<T> = Rc<RefCell<Vec<Link<T>>>>;

fn set_suspended<T>(links: &SharedLinks<T>, device: &str, suspended: bool) {
    for link in links.borrow_mut().iter_mut() {
        if link.channel.name() == device {
            link.suspended = suspended;
        }
    }
}

// ── Async loops ──────────────────────────────────────────────

/// Read task, polls every transport at 1ms intervals.
async fn read_loop<T: Transport>(links: SharedLinks<T>) {
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        {
            let mut links = links.borrow_mut();
            for link in links.iter_mut() {
                // drain whatever is buffered before yielding
                while link.service(&mut buf, Instant::now()) {}
            }
        }
        async_io_mini::Timer::after(Duration::from_millis(1)).await;
    }
}

/// Fires expired command deadlines.
async fn timeout_loop<T: Transport>(links: SharedLinks<T>) {
    loop {
        {
            let mut links = links.borrow_mut();
            for link in links.iter_mut().filter(|l| !l.dead) {
                if link.channel.poll_timeout(&mut link.transport, Instant::now()) {
                    warn!("IO: {}: command timed out", link.channel.name());
                }
            }
        }
        async_io_mini::Timer::after(Duration::from_millis(100)).await;
    }
}

/// Runs requests and data-call bookkeeping until
/// [`ControlMsg::Shutdown`].
async fn control_loop<T: Transport>(
    service: Rc<ModemService>,
    links: SharedLinks<T>,
    respond: Rc<dyn Fn(Response)>,
) {
    loop {
        match CONTROL.receive().await {
            ControlMsg::Request(line) => {
                debug!("IO: request {}", line);
                match serde_json::from_str::<Request>(&line) {
                    Ok(request) => {
                        let respond = respond.clone();
                        service.execute(request, move |response| respond(response));
                    }
                    Err(e) => respond(Response::err(None, format!("bad request: {e}"))),
                }
            }
            ControlMsg::DataCallStarted { device } => {
                info!("IO: {} handed to data-call helper", device);
                set_suspended(&links, &device, true);
            }
            ControlMsg::DataCallEnded { call, device } => {
                set_suspended(&links, &device, false);
                service.data_call_ended(call);
            }
            ControlMsg::Shutdown => {
                info!("IO: shutdown requested");
                return;
            }
        }
    }
}

/// Drive `service` over `links` until shutdown.  `respond` receives the
/// answer to every request line.
pub fn run<T: Transport + 'static>(
    service: ModemService,
    links: Vec<Link<T>>,
    respond: impl Fn(Response) + 'static,
) {
    let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();

    let service = Rc::new(service);
    let links: SharedLinks<T> = Rc::new(RefCell::new(links));
    let respond: Rc<dyn Fn(Response)> = Rc::new(respond);

    executor.spawn(read_loop(links.clone())).detach();
    executor.spawn(timeout_loop(links.clone())).detach();

    info!("IO task started ({} link(s))", links.borrow().len());
    service.start();

    futures_lite::future::block_on(executor.run(control_loop(service, links, respond)));
}

// ── Stdin reader ─────────────────────────────────────────────

/// Forward stdin lines into the control mailbox; EOF requests shutdown.
pub fn spawn_stdin_reader() -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new().name("stdin".into()).spawn(|| {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => send_blocking(ControlMsg::Request(line)),
                Err(e) => {
                    warn!("stdin: {}", e);
                    break;
                }
            }
        }
        send_blocking(ControlMsg::Shutdown);
    })
}
