//! Signal & Timeout Gate (C6): translates host-level interruptions into
//! loop-level events (§4.6).
//!
//! The production gate installs real `SIGALRM`/`SIGINT`/`SIGTERM` handlers via
//! `sigaction(2)` and an interval timer via `setitimer(2)`, exactly as
//! `timeserver.c` does. Handlers touch nothing but two process-wide atomic
//! flags — the only async-signal-safe state in the program.
//!
//! The dispatcher (C5) is written against the [`TimeoutSource`] trait so its
//! own unit tests can use [`ManualTimeoutSource`] instead of real signals.

use std::sync::atomic::{AtomicBool, Ordering};

/// What C5 needs from the gate: arm/disarm the idle-timeout window, and read
/// back whether it fired or whether the process was asked to terminate.
pub trait TimeoutSource {
    /// Arm the idle timer for `micros` microseconds. A real implementation
    /// resets the `timeout` flag and starts an interval timer; a test double
    /// can simply record the call.
    fn arm(&self, micros: u64);
    /// Disarm the idle timer (called right after a `recv` returns, whether
    /// or not it timed out).
    fn disarm(&self);
    /// Has the idle timer fired since the last `arm`?
    fn timed_out(&self) -> bool;
    /// Has a terminate signal (SIGINT/SIGTERM) been received?
    fn terminated(&self) -> bool;
}

static TIMEOUT: AtomicBool = AtomicBool::new(false);
static TERMINATED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(sig: libc::c_int) {
    if sig == libc::SIGALRM {
        if !TERMINATED.load(Ordering::Relaxed) {
            TIMEOUT.store(true, Ordering::Relaxed);
        }
    } else {
        TERMINATED.store(true, Ordering::Relaxed);
    }
}

/// Real gate: process-wide signal handlers plus `setitimer(2)` (§4.6).
///
/// There can only be one of these per process — `SIGALRM`/the interval timer
/// are process-global host resources, matching the "at most one authority per
/// host" non-goal (§1).
pub struct SignalGate;

impl SignalGate {
    /// Install the handlers. Must be called exactly once, before the main
    /// loop starts.
    pub fn install() -> Self {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = handle_signal as usize;
            libc::sigemptyset(&mut sa.sa_mask);
            sa.sa_flags = 0; // no SA_RESTART: msgrcv must return EINTR
            for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGALRM] {
                libc::sigaction(sig, &sa, std::ptr::null_mut());
            }
        }
        SignalGate
    }
}

impl TimeoutSource for SignalGate {
    fn arm(&self, micros: u64) {
        TIMEOUT.store(false, Ordering::Relaxed);
        let timer = libc::itimerval {
            it_interval: libc::timeval { tv_sec: 0, tv_usec: 0 },
            it_value: libc::timeval {
                tv_sec: (micros / 1_000_000) as libc::time_t,
                tv_usec: (micros % 1_000_000) as libc::suseconds_t,
            },
        };
        unsafe {
            libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut());
        }
    }

    fn disarm(&self) {
        let zero = libc::itimerval {
            it_interval: libc::timeval { tv_sec: 0, tv_usec: 0 },
            it_value: libc::timeval { tv_sec: 0, tv_usec: 0 },
        };
        unsafe {
            libc::setitimer(libc::ITIMER_REAL, &zero, std::ptr::null_mut());
        }
    }

    fn timed_out(&self) -> bool {
        TIMEOUT.load(Ordering::Relaxed)
    }

    fn terminated(&self) -> bool {
        TERMINATED.load(Ordering::Relaxed)
    }
}

/// Lets a [`TimeoutSource`] be shared between the thread running the
/// dispatcher loop and a controlling thread in integration tests.
impl<T: TimeoutSource> TimeoutSource for std::sync::Arc<T> {
    fn arm(&self, micros: u64) {
        (**self).arm(micros)
    }

    fn disarm(&self) {
        (**self).disarm()
    }

    fn timed_out(&self) -> bool {
        (**self).timed_out()
    }

    fn terminated(&self) -> bool {
        (**self).terminated()
    }
}

/// Deterministic test double: no real signals, no real timer. Tests flip the
/// flags directly to simulate TIMEOUT/TERMINATE without sleeping.
#[derive(Default)]
pub struct ManualTimeoutSource {
    timeout: AtomicBool,
    terminated: AtomicBool,
}

impl ManualTimeoutSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire_timeout(&self) {
        self.timeout.store(true, Ordering::Relaxed);
    }

    pub fn fire_terminate(&self) {
        self.terminated.store(true, Ordering::Relaxed);
    }
}

impl TimeoutSource for ManualTimeoutSource {
    fn arm(&self, _micros: u64) {
        self.timeout.store(false, Ordering::Relaxed);
    }

    fn disarm(&self) {}

    fn timed_out(&self) -> bool {
        self.timeout.load(Ordering::Relaxed)
    }

    fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }
}
