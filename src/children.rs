//! Bookkeeping of live worker pids.
use nix::unistd::Pid;

/// Ordered set of workers forked by this supervisor and not yet reaped.
///
/// Iteration order is fork order, which is also the order stop signals are
/// forwarded in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChildSet {
    pids: Vec<Pid>,
}

impl ChildSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly forked worker. Duplicates are ignored.
    pub fn insert(&mut self, pid: Pid) {
        if !self.contains(pid) {
            self.pids.push(pid);
        }
    }

    /// Forgets a reaped worker. Returns `false` for pids this set never tracked.
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.pids.iter().position(|tracked| *tracked == pid) {
            Some(index) => {
                self.pids.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.pids.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Iterates in fork order.
    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.pids.iter().copied()
    }

    /// Workers still needed to reach `target`.
    pub fn deficit(&self, target: usize) -> usize {
        target.saturating_sub(self.len())
    }
}
