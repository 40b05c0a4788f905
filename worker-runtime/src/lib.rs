//! The Worker contract and the AppRunner harness that every Sonicat
//! worker process embeds, plus the nine concrete Workers themselves.
//!
//! # Architecture
//!
//! ```text
//!        sonicat.<role>.command / inbound
//!                 |
//!        +-----------------+
//!        |    AppRunner     |   Idle -> Dequeued -> Processing -> Routed -> Idle
//!        |  (poll, run,     |
//!        |   route, repeat) |
//!        +-----------------+
//!                 |
//!         route_target() -> sonicat.<next-role>.inbound
//! ```
//!
//! Each binary in `src/bin/` wires one concrete [`Worker`] impl into an
//! [`AppRunner`] and runs it to completion (or until asked to shut down).

pub mod runner;
pub mod worker;
pub mod workers;

pub use runner::AppRunner;
pub use worker::Worker;
