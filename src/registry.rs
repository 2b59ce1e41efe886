//! Client Registry (C2): a fixed-capacity table of client slots (§3.2, §4.2).
//!
//! Unlike a node table shared across worker tasks, which would need an
//! `RwLock` to guard concurrent reads and writes, this table is only ever
//! touched from the single dispatcher loop (§5) and needs no synchronization.

/// One client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Running { pid: Option<i64> },
    Sleeping { pid: Option<i64>, wakeup_at: i64 },
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn pid(&self) -> Option<i64> {
        match self {
            Slot::Empty => None,
            Slot::Running { pid } | Slot::Sleeping { pid, .. } => *pid,
        }
    }
}

/// The client table. Capacity is [`crate::wire::MAXCLIENTS`].
pub struct Registry {
    slots: Vec<Slot>,
    num_clients: usize,
    num_sleeping: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; capacity],
            num_clients: 0,
            num_sleeping: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn num_clients(&self) -> usize {
        self.num_clients
    }

    pub fn num_sleeping(&self) -> usize {
        self.num_sleeping
    }

    pub fn slot(&self, client: i64) -> Option<Slot> {
        self.slots.get(client as usize).copied()
    }

    /// Allocate the lowest-index empty slot. Returns `None` if the table is
    /// full (§3.2 lifecycle step 1: the caller turns this into a fatal
    /// condition, it is not backpressure).
    pub fn register(&mut self) -> Option<i64> {
        let idx = self.slots.iter().position(Slot::is_empty)?;
        self.slots[idx] = Slot::Running { pid: None };
        self.num_clients += 1;
        Some(idx as i64)
    }

    pub fn unregister(&mut self, client: i64) {
        if let Some(slot) = self.slots.get_mut(client as usize) {
            if matches!(slot, Slot::Sleeping { .. }) {
                self.num_sleeping -= 1;
            }
            if !slot.is_empty() {
                self.num_clients -= 1;
            }
            *slot = Slot::Empty;
        }
    }

    pub fn record_pid(&mut self, client: i64, pid: i64) {
        if let Some(slot) = self.slots.get_mut(client as usize) {
            match slot {
                Slot::Running { pid: p } | Slot::Sleeping { pid: p, .. } => *p = Some(pid),
                Slot::Empty => {}
            }
        }
    }

    /// SLEEP(d) transition: Running -> Sleeping, `wakeup_at = now + d - 1`
    /// (§3.2 step 3 — preserve the off-by-one exactly, see DESIGN.md).
    pub fn sleep(&mut self, client: i64, now: i64, duration: i64) {
        if let Some(slot) = self.slots.get_mut(client as usize) {
            let pid = slot.pid();
            *slot = Slot::Sleeping { pid, wakeup_at: now + duration - 1 };
            self.num_sleeping += 1;
        }
    }

    /// CANCEL transition: Sleeping -> Running, always (idempotent — §5).
    /// Returns whether the slot actually was Sleeping beforehand.
    pub fn cancel(&mut self, client: i64) -> bool {
        if let Some(slot) = self.slots.get_mut(client as usize) {
            let was_sleeping = matches!(slot, Slot::Sleeping { .. });
            let pid = slot.pid();
            *slot = Slot::Running { pid };
            if was_sleeping {
                self.num_sleeping -= 1;
            }
            was_sleeping
        } else {
            false
        }
    }

    /// Authority-driven wake transition used by the scheduler (C3).
    pub fn wake(&mut self, client: i64) {
        if let Some(slot) = self.slots.get_mut(client as usize) {
            let pid = slot.pid();
            *slot = Slot::Running { pid };
            self.num_sleeping -= 1;
        }
    }

    /// All sleeping slots in ascending index order, paired with their wakeup
    /// time — the fixed scan order the wakeup scheduler (C3) relies on for
    /// deterministic tie-breaking.
    pub fn sleeping(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Sleeping { wakeup_at, .. } => Some((i as i64, *wakeup_at)),
            _ => None,
        })
    }

    /// The earliest wakeup time among sleeping clients, if any (§4.4).
    pub fn earliest_wakeup(&self) -> Option<i64> {
        self.sleeping().map(|(_, w)| w).min()
    }

    /// Evict every non-empty slot whose PID is known and no longer alive.
    /// `is_alive` probes liveness (signal-0 test in production, a fake in
    /// tests); `on_evict` lets the caller drain pending wake replies for the
    /// evicted client before the slot is reused (§4.2).
    pub fn check_dead(&mut self, mut is_alive: impl FnMut(i64) -> bool, mut on_evict: impl FnMut(i64)) {
        for idx in 0..self.slots.len() {
            let (pid, was_sleeping) = match self.slots[idx] {
                Slot::Empty => continue,
                Slot::Running { pid } => (pid, false),
                Slot::Sleeping { pid, .. } => (pid, true),
            };
            let Some(pid) = pid else { continue };
            if is_alive(pid) {
                continue;
            }
            on_evict(idx as i64);
            self.slots[idx] = Slot::Empty;
            if was_sleeping {
                self.num_sleeping -= 1;
            }
            self.num_clients -= 1;
        }
    }

    /// Invariant check used by tests: counters must match the table.
    #[cfg(test)]
    fn assert_counters_consistent(&self) {
        let clients = self.slots.iter().filter(|s| !s.is_empty()).count();
        let sleeping = self.slots.iter().filter(|s| matches!(s, Slot::Sleeping { .. })).count();
        assert_eq!(clients, self.num_clients);
        assert_eq!(sleeping, self.num_sleeping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_allocates_lowest_free_index() {
        let mut reg = Registry::new(4);
        assert_eq!(reg.register(), Some(0));
        assert_eq!(reg.register(), Some(1));
        reg.unregister(0);
        assert_eq!(reg.register(), Some(0));
        reg.assert_counters_consistent();
    }

    #[test]
    fn register_fails_when_full() {
        let mut reg = Registry::new(2);
        assert_eq!(reg.register(), Some(0));
        assert_eq!(reg.register(), Some(1));
        assert_eq!(reg.register(), None);
    }

    #[test]
    fn sleep_wakeup_at_is_off_by_one_as_specified() {
        // SLEEP(5) at now=0 must wake exactly when now reaches 5, matching
        // the wake condition `wakeup_at < now` (strict).
        let mut reg = Registry::new(4);
        let c = reg.register().unwrap();
        reg.sleep(c, 0, 5);
        let (_, wakeup_at) = reg.sleeping().next().unwrap();
        assert_eq!(wakeup_at, 4);
        assert!(!(wakeup_at < 4)); // not woken yet at now=4
        assert!(wakeup_at < 5); // woken at now=5
        reg.assert_counters_consistent();
    }

    #[test]
    fn cancel_is_idempotent_from_either_state() {
        let mut reg = Registry::new(4);
        let c = reg.register().unwrap();
        assert!(!reg.cancel(c)); // running -> cancel: no-op transition, still valid
        reg.sleep(c, 0, 10);
        assert!(reg.cancel(c));
        reg.assert_counters_consistent();
    }

    #[test]
    fn check_dead_drains_and_frees_slot() {
        let mut reg = Registry::new(4);
        let c = reg.register().unwrap();
        reg.record_pid(c, 999);
        reg.sleep(c, 0, 10);
        let mut evicted = Vec::new();
        reg.check_dead(|_pid| false, |client| evicted.push(client));
        assert_eq!(evicted, vec![c]);
        assert!(reg.slot(c).unwrap().is_empty());
        assert_eq!(reg.num_clients(), 0);
        assert_eq!(reg.num_sleeping(), 0);
    }

    #[test]
    fn check_dead_ignores_clients_without_a_known_pid() {
        let mut reg = Registry::new(4);
        let c = reg.register().unwrap();
        reg.check_dead(|_| panic!("is_alive should not be called without a pid"), |_| {});
        assert!(!reg.slot(c).unwrap().is_empty());
    }
}
