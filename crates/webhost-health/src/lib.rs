//! `webhost-health` – Process Tree Liveness
//!
//! Decides whether the rendering engine's process tree is healthy enough to
//! be considered operational. Independent of the rest of the supervisor: any
//! caller may poll it at any time.
//!
//! # Modules
//!
//! - [`process_table`] – [`ProcessTable`][process_table::ProcessTable]:
//!   a source of fresh [`ProcessRecord`][webhost_types::ProcessRecord]
//!   snapshots. [`SysinfoProcessTable`][process_table::SysinfoProcessTable]
//!   reads the host's process list through `sysinfo`.
//! - [`monitor`] – [`ProcessHealthMonitor`][monitor::ProcessHealthMonitor]:
//!   aggregates memory metrics over a root process and its descendants and
//!   computes the operational verdict from a mandatory-process bitmask.

pub mod monitor;
pub mod process_table;

pub use monitor::{
    DEFAULT_GRACE_PERIOD, HealthVerdict, MandatoryProcessSet, ProcessHealthMonitor,
};
pub use process_table::{ProcessTable, SysinfoProcessTable};
