//! Domain errors, split into transport-layer failures (`BusError`) versus the
//! handful of conditions that legitimately stop the process (`AuthorityError`),
//! per §7.

use thiserror::Error;

/// Failures from the message bus adapter (C1).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("cannot create message queue: {0}")]
    Create(#[source] std::io::Error),

    #[error("msgsnd failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("msgrcv failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("msgrcv interrupted by signal")]
    Interrupted,

    #[error("msgctl(IPC_RMID) failed: {0}")]
    Destroy(#[source] std::io::Error),
}

/// Conditions that stop the authority outright (§7 propagation policy: only
/// these ever reach `main()`).
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("message bus unavailable: {0}")]
    BusUnavailable(#[source] BusError),

    #[error("client registry exhausted (more than {0} concurrent clients)")]
    RegistryExhausted(i64),
}
