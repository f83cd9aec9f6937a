//! Fuzz target: channel line parser and unsolicited routing.
//!
//! Feeds arbitrary modem output into a channel with one command in
//! flight.  Must never panic, and the continuation fires at most once.

#![no_main]

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use libfuzzer_sys::fuzz_target;

use gsmd::at::channel::Channel;
use gsmd::at::transport::MemoryTransport;

fuzz_target!(|data: &[u8]| {
    let ch = Channel::new("fuzz", Duration::from_secs(1));
    let mut t = MemoryTransport::new();
    let fired = Rc::new(Cell::new(0u32));
    let f = fired.clone();
    ch.enqueue("+CMGS=10\rABCD", move |_, _| f.set(f.get() + 1));
    ch.on_writable(&mut t, Instant::now());

    for chunk in data.chunks(7) {
        ch.feed(chunk, Instant::now());
        ch.on_writable(&mut t, Instant::now());
    }
    assert!(fired.get() <= 1);
});
