//! Background relay between the UI controller and the image module.
//!
//! ```text
//! Controller ──Request──▶ [image-relay thread] ──malloc/write/call/read/free──▶ ImageModule
//!            ◀─Response──
//! ```
//!
//! The relay thread is the only owner of the module. Requests and responses
//! travel over `std::sync::mpsc` channels and are correlated by
//! [`RequestId`] alone.

pub mod invoke;
pub mod protocol;
pub mod worker;

pub use invoke::{FilterParams, RelayError, process};
pub use protocol::{Payload, Request, RequestId, Response};
pub use worker::{Relay, RelayGone};
