//! Wire format shared by the authority and its clients: message tags and the
//! three-field record that carries them over the message bus (§6.1).

/// Maximum number of registered clients (build-time constant, §3.2).
pub const MAXCLIENTS: i64 = 200;

pub const NONE: i64 = 0;
pub const REGISTER: i64 = 1;
pub const UNREGISTER: i64 = 2;
pub const PID: i64 = 3;
pub const TIMEOUT: i64 = 4;
pub const RUN: i64 = 5;
pub const NOTRUNNING: i64 = 1000;

pub const QUERY: i64 = 1001;
pub const SLEEP: i64 = 1002;
pub const CANCEL: i64 = 1003;
pub const TOSERVER: i64 = 2000;

pub const CLIENTID: i64 = 2001;
pub const TIME: i64 = 2002;

/// Payload sentinels for `RUN.time`.
pub const NEXTSLEEP: i64 = -1;
pub const NEXTWAKE: i64 = -2;

/// Tag of the wake reply for a given client.
pub fn wake(client: i64) -> i64 {
    3000 + client
}

/// A single bus record: `{tag, client, time}`. `client` and `time` are opaque
/// payload outside of bus selection, which only ever looks at `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub tag: i64,
    pub client: i64,
    pub time: i64,
}

impl Message {
    pub fn new(tag: i64, client: i64, time: i64) -> Self {
        Self { tag, client, time }
    }
}

/// What a `recv`/`try_recv` call is willing to accept.
///
/// The partition `[<=NOTRUNNING] subset-of [<=TOSERVER] subset-of [replies above
/// TOSERVER]` is load-bearing (§6.1): a client message is always strictly below
/// `TOSERVER`, and the out-of-band subset used while no run is active is always
/// strictly below `NOTRUNNING`.
#[derive(Debug, Clone, Copy)]
pub enum Selector {
    /// Any tag strictly less than `NOTRUNNING`.
    NotRunning,
    /// Any tag strictly less than `TOSERVER`.
    ToServer,
    /// Exactly this tag.
    Exact(i64),
}

impl Selector {
    /// The `msgtyp` value to hand to `msgrcv(2)`: negative means "lowest tag
    /// less than or equal to the absolute value", which is exactly SysV's
    /// native support for our range selectors.
    pub fn msgtyp(self) -> i64 {
        match self {
            Selector::NotRunning => -(NOTRUNNING - 1),
            Selector::ToServer => -(TOSERVER - 1),
            Selector::Exact(tag) => tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_tags_are_disjoint_from_everything_else() {
        for c in 0..MAXCLIENTS {
            assert!(wake(c) > TOSERVER);
        }
    }

    #[test]
    fn selector_partition_is_load_bearing() {
        // every out-of-band tag is below NOTRUNNING
        for tag in [NONE, REGISTER, UNREGISTER, PID, TIMEOUT, RUN] {
            assert!(tag < NOTRUNNING);
        }
        // every client-originated tag is below TOSERVER
        for tag in [NONE, REGISTER, UNREGISTER, PID, TIMEOUT, RUN, QUERY, SLEEP, CANCEL] {
            assert!(tag < TOSERVER);
        }
        // replies live strictly above TOSERVER
        assert!(CLIENTID > TOSERVER);
        assert!(TIME > TOSERVER);
        assert!(wake(0) > TOSERVER);
    }
}
