//! Process-tree discovery and termination.
//!
//! The device monitor is a Python wrapper that itself spawns a serial
//! reader, so killing the direct child alone leaves the reader holding the
//! port. Termination therefore walks the whole descendant tree.
//!
//! On unix the monitor is also started as the leader of its own process
//! group, and the group is signalled as well; this catches descendants
//! that were re-parented away from the tree before the snapshot was taken.

use std::collections::{HashMap, HashSet, VecDeque};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// Summary of one [`kill_process_tree`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    /// Root process id the kill was aimed at.
    pub root: u32,
    /// Descendant pids found in the snapshot, in breadth-first order.
    pub descendants: Vec<u32>,
    /// Pids that accepted the kill signal.
    pub signalled: Vec<u32>,
}

/// Snapshot the process table and return every transitive child of `root`.
///
/// The root itself is not included. Order is breadth-first.
#[must_use]
pub fn descendants(root: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children
                .entry(parent.as_u32())
                .or_default()
                .push(pid.as_u32());
        }
    }

    let mut seen = HashSet::from([root]);
    let mut order = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        for &child in children.get(&pid).map_or(&[][..], Vec::as_slice) {
            if seen.insert(child) {
                order.push(child);
                queue.push_back(child);
            }
        }
    }
    order
}

/// Whether `pid` names a live (non-zombie) process.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        ProcessRefreshKind::new(),
    );
    system
        .process(target)
        .is_some_and(|process| process.status() != sysinfo::ProcessStatus::Zombie)
}

/// Forcibly terminate `root` and every process it transitively spawned.
///
/// Best-effort: processes that have already exited are skipped silently
/// and no error is ever returned. Descendants are signalled before the
/// root so none of them is re-parented mid-walk.
pub fn kill_process_tree(root: u32) -> KillReport {
    let tree = descendants(root);
    let mut report = KillReport {
        root,
        descendants: tree.clone(),
        signalled: Vec::new(),
    };

    #[cfg(unix)]
    signal_group(root);

    for pid in tree.iter().rev().copied().chain(std::iter::once(root)) {
        if force_kill(pid) {
            report.signalled.push(pid);
        }
    }

    debug!(
        root,
        descendants = report.descendants.len(),
        signalled = report.signalled.len(),
        "process tree terminated"
    );
    report
}

#[cfg(unix)]
fn signal_group(leader: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(leader) else {
        return;
    };
    match killpg(NixPid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH | Errno::EPERM) => {}
        Err(err) => warn!(pgid = leader, %err, "failed to signal process group"),
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(NixPid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(err) => {
            warn!(pid, %err, "failed to kill process");
            false
        }
    }
}

#[cfg(not(unix))]
fn force_kill(pid: u32) -> bool {
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        ProcessRefreshKind::new(),
    );
    system.process(target).is_some_and(sysinfo::Process::kill)
}
