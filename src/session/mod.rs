//! Recording sessions
//!
//! A session turns raw touch bitmaps into a debounced, timestamped event log:
//!
//! ```text
//! Trigger ──► SessionController ──► TouchArray ──► classify ──► EventLog
//!             (Idle → Initializing → Polling)                   (file + mirror)
//! ```
//!
//! - [`pad`] - pad identity, per-pad state and the event record
//! - [`debounce`] - the per-pad touch/release classifier
//! - [`sink`] - append-only session log with open-per-write storage
//! - [`trigger`] - operator start signal
//! - [`controller`] - the session state machine and polling loop
//!
//! Everything runs on one thread; a cycle including its storage writes
//! completes before the next one starts.

pub mod controller;
pub mod debounce;
pub mod pad;
pub mod sink;
pub mod trigger;

pub use sink::{DirectoryStorage, EventLog, LogStorage};
pub use trigger::{GpioTrigger, Trigger};
