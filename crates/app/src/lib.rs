//! Process wiring for the `hotelpos` daemon.

pub mod daemon;

pub use daemon::{Daemon, LedgerBus};
