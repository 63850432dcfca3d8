//! [`ProcessTable`] – where process records come from.
//!
//! The health monitor never caches process data between queries; it asks the
//! table for a fresh snapshot every time. Tests substitute an in-memory table.

use std::sync::{Mutex, PoisonError};

use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use webhost_types::ProcessRecord;

/// A source of process snapshots.
pub trait ProcessTable: Send + Sync {
    /// Return every process currently known to the host.
    fn snapshot(&self) -> Vec<ProcessRecord>;
}

impl<T: ProcessTable + ?Sized> ProcessTable for std::sync::Arc<T> {
    fn snapshot(&self) -> Vec<ProcessRecord> {
        (**self).snapshot()
    }
}

/// [`ProcessTable`] backed by the `sysinfo` crate.
pub struct SysinfoProcessTable {
    system: Mutex<System>,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&self) -> Vec<ProcessRecord> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_exe(UpdateKind::OnlyIfNotSet),
        );

        system
            .processes()
            .iter()
            // On Linux sysinfo also lists every thread as a child of its
            // process; only real processes belong in the tree.
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, process)| {
                // The kernel truncates `comm` to 15 bytes, so prefer the
                // executable's file name when it is readable.
                let name = process
                    .exe()
                    .and_then(|exe| exe.file_name())
                    .unwrap_or_else(|| process.name())
                    .to_string_lossy()
                    .into_owned();
                ProcessRecord {
                    pid: pid.as_u32(),
                    parent: process.parent().map(|p| p.as_u32()),
                    name,
                    resident: process.memory(),
                    allocated: process.virtual_memory(),
                    shared: shared_bytes(pid.as_u32()),
                    active: !matches!(
                        process.status(),
                        ProcessStatus::Zombie | ProcessStatus::Dead
                    ),
                }
            })
            .collect()
    }
}

/// Shared resident memory (`RssFile + RssShmem`) in bytes.
#[cfg(target_os = "linux")]
fn shared_bytes(pid: u32) -> u64 {
    let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) else {
        return 0;
    };
    parse_shared_kib(&status) * 1024
}

#[cfg(not(target_os = "linux"))]
fn shared_bytes(_pid: u32) -> u64 {
    0
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_shared_kib(status: &str) -> u64 {
    status
        .lines()
        .filter_map(|line| {
            let rest = line
                .strip_prefix("RssFile:")
                .or_else(|| line.strip_prefix("RssShmem:"))?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
        .sum()
}
