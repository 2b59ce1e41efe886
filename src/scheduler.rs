//! Wakeup Scheduler (C3): scans the registry for clients whose wakeup time
//! has elapsed and dispatches wake replies (§4.3).

use crate::bus::MessageBus;
use crate::clock::Clock;
use crate::error::BusError;
use crate::registry::Registry;
use crate::wire::{self, Message};

/// Run after every event the dispatcher handles (§4.5 step 4). Scans
/// sleeping slots in ascending index order — the fixed order ties between
/// simultaneous wakeups are broken by (§4.3 determinism).
///
/// Send failures are logged and absorbed (§7 policy 3): one lost wake reply
/// does not corrupt registry invariants, since the slot has already
/// transitioned to Running.
pub fn run(registry: &mut Registry, clock: &mut Clock, bus: &MessageBus) {
    let due: Vec<i64> = registry
        .sleeping()
        .filter(|&(_, wakeup_at)| wakeup_at < clock.now)
        .map(|(client, _)| client)
        .collect();

    for client in due {
        registry.wake(client);
        let msg = Message::new(wire::wake(client), client, clock.visible_now());
        if let Err(e) = bus.send(msg) {
            log::warn!("wake({}): send failed, dropping reply: {}", client, e);
        }
        clock.end_run_if_nextwake();
    }
}

/// Drain any pending `WAKE(c)` replies left on the bus for an evicted client
/// (§4.2 eviction cleanliness).
pub fn drain_wake_replies(bus: &MessageBus, client: i64) -> Result<(), BusError> {
    while bus
        .try_recv(crate::wire::Selector::Exact(wire::wake(client)))?
        .is_some()
    {}
    Ok(())
}
