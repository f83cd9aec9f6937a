//! AT command protocol layer.
//!
//! ```text
//!  ┌───────────┐ bytes ┌────────────┐ lines ┌────────────┐ outcome ┌──────────┐
//!  │ Transport │──────▶│ LineParser │──────▶│  Channel   │────────▶│ Sequence │
//!  │ (serial)  │◀──────│            │       │ FIFO + 1   │◀────────│  Task    │
//!  └───────────┘ write └────────────┘       │ in flight  │ enqueue └──────────┘
//!                                           └─────┬──────┘
//!                                                 │ unsolicited
//!                                                 ▼
//!                                        UnsolicitedRegistry
//! ```
//!
//! Nothing in this module knows about calls or SMS; those sit on top.

pub mod channel;
pub mod codes;
pub mod parser;
pub mod prefix;
pub mod sequence;
pub mod transport;
pub mod unsolicited;

pub use channel::{Channel, Command, Reply, DEFAULT_TIMEOUT};
pub use sequence::{Outcome, Sequence, Step, Task};
pub use transport::{MemoryTransport, Transport};
