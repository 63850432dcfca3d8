//! [`ProcessHealthMonitor`] – liveness of the engine's process tree.
//!
//! The engine runs as a root process plus a fixed set of helper processes
//! (network, web content, ...). [`ProcessHealthMonitor::observe`] starts
//! monitoring a root pid; afterwards every query enumerates the root's
//! descendants afresh.
//!
//! # Algorithm
//!
//! Every mandatory helper name owns one bit of a `u32`. After the startup
//! grace window, all bits start set and each *active* descendant whose name
//! matches a mandatory name clears its bit. The tree is operational when the
//! root is active and the bitmask ends at zero.
//!
//! # Example
//!
//! ```
//! use webhost_health::monitor::{MandatoryProcessSet, ProcessHealthMonitor};
//!
//! let mandatory = MandatoryProcessSet::new(["WPENetworkProcess", "WPEWebProcess"]).unwrap();
//! let monitor = ProcessHealthMonitor::new(mandatory);
//!
//! // Nothing observed yet: nothing to supervise.
//! assert!(monitor.is_operational());
//! assert_eq!(monitor.resident(), 0);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use webhost_types::{ProcessRecord, WebhostError};

use crate::process_table::{ProcessTable, SysinfoProcessTable};

// ────────────────────────────────────────────────────────────────────────────
// Constants
// ────────────────────────────────────────────────────────────────────────────

/// How long a freshly observed tree is assumed to still be starting up.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// One bit per mandatory name in a `u32`.
const MAX_MANDATORY_PROCESSES: usize = 32;

// ────────────────────────────────────────────────────────────────────────────
// Mandatory process set
// ────────────────────────────────────────────────────────────────────────────

/// Ordered list of helper-process names that must be alive, each owning one
/// bit position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MandatoryProcessSet {
    names: Vec<String>,
}

impl MandatoryProcessSet {
    /// Build a set from `names`. Repeated names are collapsed onto the first
    /// occurrence's bit.
    ///
    /// # Errors
    ///
    /// [`WebhostError::TooManyMandatoryProcesses`] when more than 32 distinct
    /// names are given.
    pub fn new<I, S>(names: I) -> Result<Self, WebhostError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        if unique.len() > MAX_MANDATORY_PROCESSES {
            return Err(WebhostError::TooManyMandatoryProcesses(unique.len()));
        }
        Ok(Self { names: unique })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Bitmask with one set bit per mandatory name.
    pub fn full_mask(&self) -> u32 {
        match self.names.len() {
            0 => 0,
            n => u32::MAX >> (MAX_MANDATORY_PROCESSES - n),
        }
    }

    /// The bit owned by `name`, if it is mandatory.
    pub fn bit(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|index| 1u32 << index)
    }

    /// Names whose bit is still set in `mask`.
    pub fn missing(&self, mask: u32) -> Vec<String> {
        self.names
            .iter()
            .enumerate()
            .filter(|(index, _)| mask & (1u32 << index) != 0)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Verdict
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one health assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Monitoring is disabled; there is nothing to supervise.
    Unmonitored,
    /// The root is alive and the grace window has not elapsed yet.
    Starting,
    /// The root and every mandatory helper are active.
    Operational,
    /// The root process is gone or no longer active.
    RootInactive,
    /// The grace window has elapsed and some mandatory helpers are missing.
    Degraded { missing: Vec<String> },
}

impl HealthVerdict {
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            HealthVerdict::Unmonitored | HealthVerdict::Starting | HealthVerdict::Operational
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Monitor
// ────────────────────────────────────────────────────────────────────────────

struct HealthState {
    root_pid: u32,
    started: Instant,
    last_bitmask: u32,
}

/// Root process plus its current descendants, taken from one snapshot.
struct ProcessTree {
    root: Option<ProcessRecord>,
    descendants: Vec<ProcessRecord>,
}

impl ProcessTree {
    fn sum(&self, metric: impl Fn(&ProcessRecord) -> u64) -> u64 {
        self.root.iter().chain(self.descendants.iter()).map(metric).sum()
    }

    fn root_active(&self) -> bool {
        self.root.as_ref().is_some_and(|r| r.active)
    }
}

/// Aggregates metrics and liveness over a monitored process tree.
///
/// All methods take `&self`; the monitor can be shared between threads and
/// polled from any of them.
pub struct ProcessHealthMonitor<T: ProcessTable = SysinfoProcessTable> {
    table: T,
    mandatory: MandatoryProcessSet,
    grace_period: Duration,
    state: Mutex<Option<HealthState>>,
}

impl ProcessHealthMonitor<SysinfoProcessTable> {
    /// Monitor host processes through `sysinfo`.
    pub fn new(mandatory: MandatoryProcessSet) -> Self {
        Self::with_table(SysinfoProcessTable::new(), mandatory)
    }
}

impl<T: ProcessTable> ProcessHealthMonitor<T> {
    /// Monitor processes reported by `table`.
    pub fn with_table(table: T, mandatory: MandatoryProcessSet) -> Self {
        Self {
            table,
            mandatory,
            grace_period: DEFAULT_GRACE_PERIOD,
            state: Mutex::new(None),
        }
    }

    /// Override the startup grace window.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn mandatory(&self) -> &MandatoryProcessSet {
        &self.mandatory
    }

    /// Start monitoring `pid`, or stop monitoring when `pid == 0`.
    ///
    /// Observing a new pid restarts the grace window.
    pub fn observe(&self, pid: u32) {
        let mut state = self.lock_state();
        if pid == 0 {
            info!("process health monitoring disabled");
            *state = None;
        } else {
            info!(pid, grace_ms = self.grace_period.as_millis() as u64, "monitoring process tree");
            *state = Some(HealthState {
                root_pid: pid,
                started: Instant::now(),
                last_bitmask: self.mandatory.full_mask(),
            });
        }
    }

    /// The observed root pid, if monitoring.
    pub fn root_pid(&self) -> Option<u32> {
        self.lock_state().as_ref().map(|s| s.root_pid)
    }

    /// Resident bytes summed over the root and its current descendants.
    pub fn resident(&self) -> u64 {
        self.tree().map_or(0, |tree| tree.sum(|r| r.resident))
    }

    /// Allocated bytes summed over the root and its current descendants.
    pub fn allocated(&self) -> u64 {
        self.tree().map_or(0, |tree| tree.sum(|r| r.allocated))
    }

    /// Shared bytes summed over the root and its current descendants.
    pub fn shared(&self) -> u64 {
        self.tree().map_or(0, |tree| tree.sum(|r| r.shared))
    }

    /// Root (when active) plus the number of current descendants.
    pub fn processes(&self) -> usize {
        self.tree().map_or(0, |tree| {
            usize::from(tree.root_active()) + tree.descendants.len()
        })
    }

    /// Fresh records for the root and its descendants, root first.
    pub fn processes_snapshot(&self) -> Vec<ProcessRecord> {
        self.tree().map_or_else(Vec::new, |tree| {
            tree.root.into_iter().chain(tree.descendants).collect()
        })
    }

    /// Bitmask computed by the last full assessment, if monitoring.
    pub fn last_bitmask(&self) -> Option<u32> {
        self.lock_state().as_ref().map(|s| s.last_bitmask)
    }

    /// `true` unless the tree is known to be unhealthy.
    pub fn is_operational(&self) -> bool {
        self.verdict().is_operational()
    }

    /// Assess the process tree.
    pub fn verdict(&self) -> HealthVerdict {
        let Some((root_pid, started)) = self
            .lock_state()
            .as_ref()
            .map(|s| (s.root_pid, s.started))
        else {
            return HealthVerdict::Unmonitored;
        };

        let tree = self.build_tree(root_pid);
        if !tree.root_active() {
            return HealthVerdict::RootInactive;
        }
        if started.elapsed() < self.grace_period {
            return HealthVerdict::Starting;
        }

        let mut mask = self.mandatory.full_mask();
        if tree.descendants.len() >= self.mandatory.len() {
            for child in &tree.descendants {
                if mask == 0 {
                    break;
                }
                if !child.active {
                    continue;
                }
                if let Some(bit) = self.mandatory.bit(&child.name) {
                    mask &= !bit;
                }
            }
        }

        if let Some(state) = self.lock_state().as_mut() {
            if state.root_pid == root_pid {
                state.last_bitmask = mask;
            }
        }

        if mask == 0 {
            HealthVerdict::Operational
        } else {
            let missing = self.mandatory.missing(mask);
            debug!(root_pid, bitmask = mask, ?missing, "mandatory processes missing");
            HealthVerdict::Degraded { missing }
        }
    }

    // ------------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------------

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Option<HealthState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tree(&self) -> Option<ProcessTree> {
        let root_pid = self.root_pid()?;
        Some(self.build_tree(root_pid))
    }

    fn build_tree(&self, root_pid: u32) -> ProcessTree {
        let records = self.table.snapshot();

        let mut children: HashMap<u32, Vec<usize>> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if let Some(parent) = record.parent {
                children.entry(parent).or_default().push(index);
            }
        }

        let root = records.iter().find(|r| r.pid == root_pid).cloned();

        let mut descendants = Vec::new();
        let mut seen = HashSet::from([root_pid]);
        let mut queue = VecDeque::from([root_pid]);
        while let Some(pid) = queue.pop_front() {
            for &index in children.get(&pid).map(Vec::as_slice).unwrap_or_default() {
                let child = &records[index];
                if seen.insert(child.pid) {
                    queue.push_back(child.pid);
                    descendants.push(child.clone());
                }
            }
        }

        ProcessTree { root, descendants }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct FakeTable {
        records: Mutex<Vec<ProcessRecord>>,
    }

    impl FakeTable {
        fn add(&self, pid: u32, parent: Option<u32>, name: &str, active: bool) {
            self.records.lock().unwrap().push(ProcessRecord {
                pid,
                parent,
                name: name.to_string(),
                resident: u64::from(pid) * 100,
                allocated: u64::from(pid) * 1000,
                shared: u64::from(pid) * 10,
                active,
            });
        }

        fn remove(&self, pid: u32) {
            self.records.lock().unwrap().retain(|r| r.pid != pid);
        }
    }

    impl ProcessTable for FakeTable {
        fn snapshot(&self) -> Vec<ProcessRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    fn monitor(
        table: &Arc<FakeTable>,
        names: &[&str],
        grace: Duration,
    ) -> ProcessHealthMonitor<Arc<FakeTable>> {
        let mandatory = MandatoryProcessSet::new(names.iter().copied()).unwrap();
        ProcessHealthMonitor::with_table(Arc::clone(table), mandatory).with_grace_period(grace)
    }

    #[test]
    fn full_mask_has_one_bit_per_name() {
        let set = MandatoryProcessSet::new(["A", "B", "C"]).unwrap();
        assert_eq!(set.full_mask(), 0b111);
        assert_eq!(set.bit("B"), Some(0b010));
        assert_eq!(set.bit("Z"), None);
        assert_eq!(set.missing(0b101), vec!["A".to_string(), "C".to_string()]);
        assert_eq!(MandatoryProcessSet::default().full_mask(), 0);
    }

    #[test]
    fn thirty_two_names_fill_the_mask() {
        let names: Vec<String> = (0..32).map(|i| format!("helper{i}")).collect();
        let set = MandatoryProcessSet::new(names).unwrap();
        assert_eq!(set.full_mask(), u32::MAX);
    }

    #[test]
    fn more_than_thirty_two_names_are_rejected() {
        let names: Vec<String> = (0..33).map(|i| format!("helper{i}")).collect();
        assert_eq!(
            MandatoryProcessSet::new(names),
            Err(WebhostError::TooManyMandatoryProcesses(33))
        );
    }

    #[test]
    fn repeated_names_share_a_bit() {
        let set = MandatoryProcessSet::new(["A", "B", "A"]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.full_mask(), 0b11);
    }

    #[test]
    fn unobserved_monitor_has_no_opinion() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        let mon = monitor(&table, &["A"], Duration::ZERO);

        assert_eq!(mon.verdict(), HealthVerdict::Unmonitored);
        assert!(mon.is_operational());
        assert_eq!(mon.resident(), 0);
        assert_eq!(mon.allocated(), 0);
        assert_eq!(mon.shared(), 0);
        assert_eq!(mon.processes(), 0);
    }

    #[test]
    fn observe_zero_disables_monitoring() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        let mon = monitor(&table, &["A"], Duration::ZERO);

        mon.observe(10);
        assert!(!mon.is_operational());
        assert!(mon.resident() > 0);

        mon.observe(0);
        assert_eq!(mon.verdict(), HealthVerdict::Unmonitored);
        assert_eq!(mon.resident(), 0);
        assert_eq!(mon.root_pid(), None);
        assert_eq!(mon.last_bitmask(), None);
    }

    #[test]
    fn within_grace_window_only_root_matters() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        let mon = monitor(&table, &["A", "B"], Duration::from_secs(60));

        mon.observe(10);
        assert_eq!(mon.verdict(), HealthVerdict::Starting);
        assert!(mon.is_operational());
    }

    #[test]
    fn inactive_root_is_never_operational() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", false);
        table.add(11, Some(10), "A", true);
        let mon = monitor(&table, &["A"], Duration::from_secs(60));

        mon.observe(10);
        assert_eq!(mon.verdict(), HealthVerdict::RootInactive);
    }

    #[test]
    fn vanished_root_is_not_operational() {
        let table = Arc::new(FakeTable::default());
        let mon = monitor(&table, &[], Duration::ZERO);
        mon.observe(4242);
        assert_eq!(mon.verdict(), HealthVerdict::RootInactive);
    }

    #[test]
    fn missing_mandatory_process_after_grace() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(11, Some(10), "A", true);
        table.add(12, Some(10), "renderer", true);
        let mon = monitor(&table, &["A", "B"], Duration::ZERO);

        mon.observe(10);
        assert_eq!(
            mon.verdict(),
            HealthVerdict::Degraded {
                missing: vec!["B".to_string()]
            }
        );
        assert_eq!(mon.last_bitmask(), Some(0b10));

        table.add(13, Some(10), "B", true);
        assert_eq!(mon.verdict(), HealthVerdict::Operational);
        assert!(mon.is_operational());
        assert_eq!(mon.last_bitmask(), Some(0));
    }

    #[test]
    fn too_few_descendants_fail_the_precheck() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(11, Some(10), "A", true);
        let mon = monitor(&table, &["A", "B"], Duration::ZERO);

        mon.observe(10);
        assert_eq!(mon.last_bitmask(), Some(0b11));
        assert!(!mon.is_operational());
        assert_eq!(mon.last_bitmask(), Some(0b11));
    }

    #[test]
    fn inactive_mandatory_process_keeps_its_bit() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(11, Some(10), "A", true);
        table.add(12, Some(10), "B", false);
        let mon = monitor(&table, &["A", "B"], Duration::ZERO);

        mon.observe(10);
        assert!(!mon.is_operational());
    }

    #[test]
    fn duplicate_mandatory_processes_are_harmless() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(11, Some(10), "A", true);
        table.add(12, Some(10), "A", true);
        table.add(13, Some(10), "B", true);
        let mon = monitor(&table, &["A", "B"], Duration::ZERO);

        mon.observe(10);
        assert_eq!(mon.verdict(), HealthVerdict::Operational);
    }

    #[test]
    fn grandchildren_count_as_descendants() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(11, Some(10), "launcher", true);
        table.add(12, Some(11), "A", true);
        table.add(13, Some(11), "B", true);
        let mon = monitor(&table, &["A", "B"], Duration::ZERO);

        mon.observe(10);
        assert!(mon.is_operational());
        assert_eq!(mon.processes(), 4);
    }

    #[test]
    fn unrelated_processes_are_ignored() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(20, None, "A", true);
        table.add(21, None, "B", true);
        let mon = monitor(&table, &["A", "B"], Duration::ZERO);

        mon.observe(10);
        assert!(!mon.is_operational());
        assert_eq!(mon.processes(), 1);
    }

    #[test]
    fn metrics_sum_root_and_descendants_and_track_exits() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        table.add(11, Some(10), "A", true);
        table.add(12, Some(10), "B", true);
        table.add(99, None, "other", true);
        let mon = monitor(&table, &[], Duration::ZERO);

        mon.observe(10);
        assert_eq!(mon.resident(), (10 + 11 + 12) * 100);
        assert_eq!(mon.allocated(), (10 + 11 + 12) * 1000);
        assert_eq!(mon.shared(), (10 + 11 + 12) * 10);
        assert_eq!(mon.processes(), 3);

        table.remove(12);
        assert_eq!(mon.resident(), (10 + 11) * 100);
        assert_eq!(mon.processes(), 2);
        assert_eq!(mon.processes_snapshot().len(), 2);
    }

    #[test]
    fn inactive_root_is_not_counted_as_a_process() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", false);
        table.add(11, Some(10), "A", true);
        let mon = monitor(&table, &[], Duration::ZERO);

        mon.observe(10);
        assert_eq!(mon.processes(), 1);
    }

    #[test]
    fn grace_window_expires() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        let mon = monitor(&table, &["A"], Duration::from_millis(20));

        mon.observe(10);
        assert!(mon.is_operational());
        thread::sleep(Duration::from_millis(30));
        assert!(!mon.is_operational());
    }

    #[test]
    fn reobserving_restarts_the_grace_window() {
        let table = Arc::new(FakeTable::default());
        table.add(10, None, "root", true);
        let mon = monitor(&table, &["A"], Duration::from_millis(20));

        mon.observe(10);
        thread::sleep(Duration::from_millis(30));
        assert!(!mon.is_operational());

        mon.observe(10);
        assert_eq!(mon.verdict(), HealthVerdict::Starting);
    }

    #[test]
    fn own_process_is_observable_through_sysinfo() {
        let mon = ProcessHealthMonitor::new(MandatoryProcessSet::default());
        mon.observe(std::process::id());
        assert!(mon.resident() > 0);
        assert!(mon.processes() >= 1);
    }

    // The only test in this crate that spawns a child, so the tree under our
    // pid is exactly what it builds.
    #[cfg(target_os = "linux")]
    #[test]
    fn worker_threads_do_not_count_as_processes() {
        let (release, parked) = std::sync::mpsc::channel::<()>();
        let parked = Arc::new(Mutex::new(parked));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let parked = Arc::clone(&parked);
                thread::spawn(move || {
                    let _ = parked.lock().unwrap().recv();
                })
            })
            .collect();
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");

        let me = std::process::id();
        let mon = ProcessHealthMonitor::new(MandatoryProcessSet::default());
        mon.observe(me);
        let pids: Vec<u32> = mon.processes_snapshot().iter().map(|r| r.pid).collect();
        let count = mon.processes();
        let resident = mon.resident();

        child.kill().ok();
        child.wait().ok();
        drop(release);
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(count, 2, "tree was {pids:?}");
        assert!(pids.contains(&me));
        assert!(pids.contains(&child.id()));
        assert!(resident > 0);
    }
}
