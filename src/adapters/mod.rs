//! Adapters — concrete implementations of the port traits.
//!
//! | Adapter      | Implements    | Connects to                     |
//! |--------------|---------------|---------------------------------|
//! | `log_sink`   | EventSink     | `log` facade                    |
//! | `json_sink`  | EventSink     | JSON lines on stdout            |
//! | `data_call`  | DataCallPort  | helper process on the TTY       |
//! | `serial`     | Transport     | serial device (daemon feature)  |

pub mod data_call;
pub mod json_sink;
pub mod log_sink;
#[cfg(feature = "daemon")]
pub mod serial;
