//! Human-readable per-event trace (§6.5). Printed directly to stdout, not
//! through the `log` facade — it is operator output, matching the reference
//! platform's split between formatted CLI output and ambient diagnostics.

use chrono::{Local, LocalResult, TimeZone};

use crate::clock::Clock;

/// One trace line for a dispatched event. Includes a local-date column only
/// when `origin != 0`, i.e. when the simulation is anchored to a real epoch.
pub fn log_event(clock: &Clock, client: i64, command: &str, result: &str) {
    if clock.origin != 0 {
        if let LocalResult::Single(dt) = Local.timestamp_opt(clock.origin + clock.now, 0) {
            println!(
                "{} {:>8} client={:<4} {:<10} {}",
                dt.format("%Y-%m-%d %H:%M:%S"),
                clock.now,
                client,
                command,
                result
            );
            return;
        }
    }
    println!("{:>8} client={:<4} {:<10} {}", clock.now, client, command, result);
}

/// Final summary line printed once the bus has been destroyed, preserved
/// from the original program's `quit()` (§10.5).
pub fn log_quit(num_clients: usize, num_sleeping: usize) {
    println!("quit() registered={} sleeping={}", num_clients, num_sleeping);
}
