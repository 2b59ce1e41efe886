//! Time Engine (C4): owns `now`/`end`, interprets RUN commands, and
//! implements the idle-advance and busy-wait-nudge policies (§4.4).

use rand::Rng;

use crate::wire::{NEXTSLEEP, NEXTWAKE};

/// Simulated clock state. `now` and `end` are whole simulated seconds;
/// `origin` is the wall-clock offset added to every client-visible timestamp.
pub struct Clock {
    pub origin: i64,
    pub now: i64,
    pub end: i64,
    idle_jump: Option<i64>,
    busy_wait: u32,
    no_fork: bool,
}

impl Clock {
    pub fn new(origin: i64, idle_jump: Option<i64>, busy_wait: u32, no_fork: bool) -> Self {
        Self { origin, now: 0, end: 0, idle_jump, busy_wait, no_fork }
    }

    /// The timestamp the authority hands to clients: `origin + now`.
    pub fn visible_now(&self) -> i64 {
        self.origin + self.now
    }

    pub fn no_fork(&self) -> bool {
        self.no_fork
    }

    /// Is a run currently active? (`now < end`, or `end` is an event sentinel.)
    pub fn run_active(&self) -> bool {
        !(self.now >= self.end && self.end >= 0)
    }

    /// RUN command handling (§4.4).
    pub fn apply_run(&mut self, payload: i64) {
        self.end = if payload < 0 { payload } else { self.end + payload };
    }

    /// SLEEP/UNREGISTER ending a `RUN(NEXTSLEEP)` run (§4.5 dispatch table).
    pub fn end_run_if_nextsleep(&mut self) {
        if self.end == NEXTSLEEP {
            self.end = self.now;
        }
    }

    /// A wake dispatched by C3 ending a `RUN(NEXTWAKE)` run (§4.3).
    pub fn end_run_if_nextwake(&mut self) {
        if self.end == NEXTWAKE {
            self.end = self.now + 1;
        }
    }

    /// QUERY handling: probabilistic `now++` with probability `1/busy_wait`
    /// (§4.4). `busy_wait == 0` disables the nudge entirely.
    pub fn maybe_nudge(&mut self, rng: &mut impl Rng) {
        if self.busy_wait != 0 && rng.gen_range(0..self.busy_wait) == 0 {
            self.now += 1;
        }
    }

    /// Idle-advance policy (§4.4), run on TIMEOUT. `earliest_wakeup` is the
    /// lowest `wakeup_at` among sleeping clients, if any.
    pub fn idle_advance(&mut self, earliest_wakeup: Option<i64>) {
        match self.idle_jump {
            Some(jump) => {
                self.now += jump;
                if self.now >= self.end && self.end >= 0 {
                    self.now = self.end;
                }
                if let Some(w) = earliest_wakeup {
                    self.now = self.now.min(w + 1);
                }
            }
            None => {
                if let Some(w) = earliest_wakeup {
                    if w < self.end || self.end < 0 {
                        self.now = w + 1;
                        return;
                    }
                }
                if self.end >= 0 {
                    self.now = self.end;
                } else if self.no_fork {
                    self.end = self.now;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn run_additivity() {
        let mut a = Clock::new(0, None, 0, false);
        a.apply_run(10);
        a.apply_run(20);

        let mut b = Clock::new(0, None, 0, false);
        b.apply_run(30);

        assert_eq!(a.end, b.end);
    }

    #[test]
    fn idle_jump_never_overshoots_end_or_earliest_wakeup() {
        let mut c = Clock::new(0, Some(100), 0, false);
        c.apply_run(10); // end = 10
        c.idle_advance(Some(50)); // would jump to 100 but end=10 clamps it
        assert_eq!(c.now, 10);

        let mut c2 = Clock::new(0, Some(100), 0, false);
        c2.apply_run(1000);
        c2.idle_advance(Some(3)); // wakeup at 3 -> clamp to 4
        assert_eq!(c2.now, 4);
    }

    #[test]
    fn idle_jump_unset_goes_straight_to_next_wakeup() {
        let mut c = Clock::new(0, None, 0, false);
        c.apply_run(1000);
        c.idle_advance(Some(4));
        assert_eq!(c.now, 5);
    }

    #[test]
    fn idle_jump_unset_with_no_sleepers_goes_to_end() {
        let mut c = Clock::new(0, None, 0, false);
        c.apply_run(42);
        c.idle_advance(None);
        assert_eq!(c.now, 42);
    }

    #[test]
    fn idle_jump_unset_no_fork_and_no_end_terminates_run() {
        let mut c = Clock::new(0, None, 0, true);
        c.end = -1; // event-defined run target, no sleepers left to wait on
        c.idle_advance(None);
        assert_eq!(c.end, c.now);
    }

    #[test]
    fn busy_wait_zero_disables_nudge() {
        let mut c = Clock::new(0, None, 0, false);
        let mut rng = StepRng::new(0, 1);
        c.maybe_nudge(&mut rng);
        assert_eq!(c.now, 0);
    }

    #[test]
    fn busy_wait_nudges_with_expected_frequency() {
        let mut c = Clock::new(0, None, 2, false);
        let mut rng = rand::rngs::mock::StepRng::new(0, u64::MAX / 4);
        let mut nudges = 0;
        for _ in 0..10_000 {
            let before = c.now;
            c.maybe_nudge(&mut rng);
            if c.now != before {
                nudges += 1;
            }
        }
        // deterministic stepping RNG alternates in/out of range 0..2, so this
        // is just a sanity bound, not a statistical assertion.
        assert!(nudges > 0);
    }
}
