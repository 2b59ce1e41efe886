//! Request Dispatcher (C5): the authority's main loop (§4.5).
//!
//! `Authority` aggregates the message bus (C1), client registry (C2), time
//! engine (C4) and signal gate (C6) behind a single owner, matching the
//! "exactly one mutable state owner per process" invariant (§5) — there is no
//! `RwLock` anywhere in it, because nothing outside this loop ever touches
//! this state concurrently.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bus::MessageBus;
use crate::clock::Clock;
use crate::error::{AuthorityError, BusError};
use crate::registry::Registry;
use crate::scheduler;
use crate::signals::TimeoutSource;
use crate::trace;
use crate::wire::{self, Message, Selector};

enum Event {
    Message(Message),
    None,
    Stop,
}

pub struct Authority<T: TimeoutSource> {
    bus: MessageBus,
    registry: Registry,
    clock: Clock,
    gate: T,
    rng: StdRng,
    idle_time_us: u64,
}

impl<T: TimeoutSource> Authority<T> {
    pub fn new(bus: MessageBus, capacity: usize, clock: Clock, gate: T, idle_time_us: u64) -> Self {
        Self {
            bus,
            registry: Registry::new(capacity),
            clock,
            gate,
            rng: StdRng::from_entropy(),
            idle_time_us,
        }
    }

    /// Counters as of right now, for the final summary line (§10.5).
    pub fn counts(&self) -> (usize, usize) {
        (self.registry.num_clients(), self.registry.num_sleeping())
    }

    /// Reclaim the bus handle so the caller can destroy it after the loop
    /// exits (only the authority ever calls `destroy`, per §4.1).
    pub fn into_bus(self) -> MessageBus {
        self.bus
    }

    /// Run until terminated (§4.6) or a fatal condition occurs (§7 policy 1-2).
    pub fn run(&mut self) -> Result<(), AuthorityError> {
        loop {
            if self.gate.terminated() {
                return Ok(());
            }
            match self.next_event() {
                Event::Stop => return Ok(()),
                Event::None => {}
                Event::Message(msg) => self.dispatch(msg)?,
            }
            scheduler::run(&mut self.registry, &mut self.clock, &self.bus);
        }
    }

    /// Select a receive strategy and interpret the result (§4.5 steps 1-2).
    fn next_event(&mut self) -> Event {
        let run_active = !(self.clock.now >= self.clock.end && self.clock.end >= 0);

        if !run_active {
            return match self.bus.recv(Selector::NotRunning) {
                Ok(msg) => Event::Message(msg),
                Err(BusError::Interrupted) => Event::None,
                Err(e) => {
                    log::error!("recv failed, stopping: {}", e);
                    Event::Stop
                }
            };
        }

        if self.clock.no_fork() && self.registry.num_clients() == self.registry.num_sleeping() {
            return Event::Message(Message::new(wire::TIMEOUT, 0, 0));
        }

        self.gate.arm(self.idle_time_us);
        let result = self.bus.recv(Selector::ToServer);
        self.gate.disarm();
        match result {
            Ok(msg) => Event::Message(msg),
            Err(BusError::Interrupted) => {
                if self.gate.timed_out() {
                    Event::Message(Message::new(wire::TIMEOUT, 0, 0))
                } else {
                    Event::None
                }
            }
            Err(e) => {
                log::error!("recv failed, stopping: {}", e);
                Event::Stop
            }
        }
    }

    fn dispatch(&mut self, msg: Message) -> Result<(), AuthorityError> {
        let client = msg.client;
        match msg.tag {
            wire::NONE => {}

            wire::REGISTER => {
                self.evict_dead();
                match self.registry.register() {
                    Some(new_client) => {
                        let time = self.clock.visible_now();
                        self.send(Message::new(wire::CLIENTID, new_client, time));
                        trace::log_event(&self.clock, new_client, "REGISTER", "ok");
                    }
                    None => {
                        self.send(Message::new(wire::CLIENTID, -1, 0));
                        trace::log_event(&self.clock, client, "REGISTER", "full");
                        return Err(AuthorityError::RegistryExhausted(self.registry.capacity() as i64));
                    }
                }
            }

            wire::UNREGISTER => {
                self.registry.unregister(client);
                self.clock.end_run_if_nextsleep();
                trace::log_event(&self.clock, client, "UNREGISTER", "");
            }

            wire::PID => {
                self.registry.record_pid(client, msg.time);
                trace::log_event(&self.clock, client, "PID", "");
            }

            wire::TIMEOUT => {
                self.evict_dead();
                let wakeup = self.registry.earliest_wakeup();
                self.clock.idle_advance(wakeup);
                trace::log_event(&self.clock, client, "TIMEOUT", "");
            }

            wire::RUN => {
                self.clock.apply_run(msg.time);
                trace::log_event(&self.clock, client, "RUN", "");
            }

            wire::QUERY => {
                let time = self.clock.visible_now();
                self.send(Message::new(wire::TIME, client, time));
                self.clock.maybe_nudge(&mut self.rng);
                trace::log_event(&self.clock, client, "QUERY", "");
            }

            wire::SLEEP => {
                self.registry.sleep(client, self.clock.now, msg.time);
                self.clock.end_run_if_nextsleep();
                trace::log_event(&self.clock, client, "SLEEP", "");
            }

            wire::CANCEL => {
                self.registry.cancel(client);
                let time = self.clock.visible_now();
                self.send(Message::new(wire::wake(client), client, time));
                trace::log_event(&self.clock, client, "CANCEL", "");
            }

            other => {
                log::warn!("client {}: ignoring unknown tag {}", client, other);
                trace::log_event(&self.clock, client, "UNKNOWN", "ignored");
            }
        }
        Ok(())
    }

    /// Send a reply, absorbing failure per §7 policy 3.
    fn send(&self, msg: Message) {
        if let Err(e) = self.bus.send(msg) {
            log::warn!("send failed, dropping reply: {}", e);
        }
    }

    /// `check_dead` (§4.2), wired to a real signal-0 liveness probe and to
    /// draining stale wake replies for whatever gets evicted.
    fn evict_dead(&mut self) {
        let bus = &self.bus;
        self.registry.check_dead(
            |pid| unsafe { libc::kill(pid as libc::pid_t, 0) == 0 },
            |client| {
                if let Err(e) = scheduler::drain_wake_replies(bus, client) {
                    log::warn!("client {}: failed draining wake replies on eviction: {}", client, e);
                } else {
                    log::info!("evicted dead client {}", client);
                }
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::ManualTimeoutSource;
    use std::path::PathBuf;

    fn test_authority(capacity: usize) -> (Authority<ManualTimeoutSource>, PathBuf) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.into_temp_path().keep().unwrap();
        let bus = MessageBus::create(&path, 1, 0o600).unwrap();
        let clock = Clock::new(0, None, 0, false);
        let gate = ManualTimeoutSource::new();
        (Authority::new(bus, capacity, clock, gate, 1000), path)
    }

    fn cleanup(authority: Authority<ManualTimeoutSource>, path: &std::path::Path) {
        let _ = authority.into_bus().destroy();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn register_allocates_and_replies_clientid() {
        let (mut a, path) = test_authority(4);
        a.bus.send(Message::new(wire::REGISTER, 0, 0)).unwrap();
        let ev = a.next_event();
        match ev {
            Event::Message(msg) => a.dispatch(msg).unwrap(),
            _ => panic!("expected a message"),
        }
        let reply = a.bus.try_recv(Selector::Exact(wire::CLIENTID)).unwrap().unwrap();
        assert_eq!(reply.client, 0);
        cleanup(a, &path);
    }

    #[test]
    fn register_overflow_is_fatal_and_replies_minus_one() {
        let (mut a, path) = test_authority(1);
        a.registry.register().unwrap(); // fill the only slot
        let msg = Message::new(wire::REGISTER, 0, 0);
        let result = a.dispatch(msg);
        assert!(matches!(result, Err(AuthorityError::RegistryExhausted(1))));
        let reply = a.bus.try_recv(Selector::Exact(wire::CLIENTID)).unwrap().unwrap();
        assert_eq!(reply.client, -1);
        cleanup(a, &path);
    }

    #[test]
    fn cancel_always_sends_exactly_one_wake() {
        let (mut a, path) = test_authority(4);
        let c = a.registry.register().unwrap();
        a.dispatch(Message::new(wire::CANCEL, c, 0)).unwrap();
        let w = a.bus.try_recv(Selector::Exact(wire::wake(c))).unwrap();
        assert!(w.is_some());
        assert!(a.bus.try_recv(Selector::Exact(wire::wake(c))).unwrap().is_none());
        cleanup(a, &path);
    }

    #[test]
    fn sleep_then_run_ending_on_nextsleep_freezes_end() {
        let (mut a, path) = test_authority(4);
        let c = a.registry.register().unwrap();
        a.clock.apply_run(wire::NEXTSLEEP);
        a.dispatch(Message::new(wire::SLEEP, c, 5)).unwrap();
        assert_eq!(a.clock.end, a.clock.now);
        cleanup(a, &path);
    }
}
