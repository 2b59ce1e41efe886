//! Message Bus Adapter (C1): a host-local System V message queue, addressed
//! by a `ftok(3)`-style (path, project id) pair, with selective receive by
//! tag range (§4.1, §6.1, §6.2).
//!
//! The original `timeserver.c` hardcodes the path/id pair as a pair of C
//! macros (`KEYFILE`, `TIMESERVER`); here they are constructor parameters so
//! more than one queue can exist inside a single test binary. Production code
//! always goes through [`MessageBus::create_default`] / [`MessageBus::attach_default`].

use std::ffi::CString;
use std::io;
use std::mem;
use std::path::Path;

use crate::error::BusError;
use crate::wire::{Message, Selector};

/// Default key file, matching the reference implementation's `KEYFILE`.
pub const DEFAULT_KEYFILE: &str = "/dev/null";
/// Default project id, matching the reference implementation's `TIMESERVER`.
pub const DEFAULT_PROJ_ID: i32 = 45631;

/// Permission bits used when the authority creates the queue: rw for owner,
/// group and others, so unprivileged clients can attach (§6.2).
pub const DEFAULT_MODE: i32 = 0o666;

#[repr(C)]
struct RawMessage {
    mtype: libc::c_long,
    client: libc::c_long,
    time: libc::c_long,
}

const PAYLOAD_SIZE: usize = 2 * mem::size_of::<libc::c_long>();

fn ftok(path: &Path, proj_id: i32) -> io::Result<libc::key_t> {
    let c_path = CString::new(path.as_os_str().to_string_lossy().into_owned())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let key = unsafe { libc::ftok(c_path.as_ptr(), proj_id) };
    if key == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(key)
    }
}

/// A handle to a System V message queue.
pub struct MessageBus {
    id: libc::c_int,
}

impl MessageBus {
    /// Create (or re-create) the queue the authority owns, using the default
    /// host binding.
    pub fn create_default() -> Result<Self, BusError> {
        Self::create(Path::new(DEFAULT_KEYFILE), DEFAULT_PROJ_ID, DEFAULT_MODE)
    }

    /// Create a queue at an explicit (path, project id) pair. Used directly
    /// only by tests, which need collision-free keys to run concurrently.
    pub fn create(path: &Path, proj_id: i32, mode: i32) -> Result<Self, BusError> {
        let key = ftok(path, proj_id).map_err(BusError::Create)?;
        let id = unsafe { libc::msgget(key, libc::IPC_CREAT | mode) };
        if id == -1 {
            return Err(BusError::Create(io::Error::last_os_error()));
        }
        Ok(Self { id })
    }

    /// Attach to a queue the authority already created, using the default
    /// host binding. Used by clients (the run driver, test fake clients).
    pub fn attach_default() -> Result<Self, BusError> {
        Self::attach(Path::new(DEFAULT_KEYFILE), DEFAULT_PROJ_ID)
    }

    /// Attach to an existing queue at an explicit (path, project id) pair.
    pub fn attach(path: &Path, proj_id: i32) -> Result<Self, BusError> {
        let key = ftok(path, proj_id).map_err(BusError::Create)?;
        let id = unsafe { libc::msgget(key, 0o600) };
        if id == -1 {
            return Err(BusError::Create(io::Error::last_os_error()));
        }
        Ok(Self { id })
    }

    /// Non-blocking enqueue (§4.1: `send` never blocks the authority).
    pub fn send(&self, msg: Message) -> Result<(), BusError> {
        let raw = RawMessage {
            mtype: msg.tag as libc::c_long,
            client: msg.client as libc::c_long,
            time: msg.time as libc::c_long,
        };
        let res = unsafe {
            libc::msgsnd(
                self.id,
                &raw as *const RawMessage as *const libc::c_void,
                PAYLOAD_SIZE,
                libc::IPC_NOWAIT,
            )
        };
        if res == -1 {
            return Err(BusError::Send(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Blocking dequeue restricted to `selector`, interruptible by signals.
    /// Returns [`BusError::Interrupted`] on `EINTR` so the caller can decide
    /// whether that means TIMEOUT or loop-exit (§4.6).
    pub fn recv(&self, selector: Selector) -> Result<Message, BusError> {
        self.recv_with_flags(selector, 0)
    }

    /// Non-blocking variant, used while draining an evicted client's pending
    /// wake replies (§4.2). Returns `Ok(None)` when the queue has nothing
    /// matching `selector` right now.
    pub fn try_recv(&self, selector: Selector) -> Result<Option<Message>, BusError> {
        match self.recv_with_flags(selector, libc::IPC_NOWAIT) {
            Ok(msg) => Ok(Some(msg)),
            Err(BusError::Receive(e)) if e.raw_os_error() == Some(libc::ENOMSG) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn recv_with_flags(&self, selector: Selector, flags: libc::c_int) -> Result<Message, BusError> {
        let mut raw = RawMessage { mtype: 0, client: 0, time: 0 };
        let res = unsafe {
            libc::msgrcv(
                self.id,
                &mut raw as *mut RawMessage as *mut libc::c_void,
                PAYLOAD_SIZE,
                selector.msgtyp() as libc::c_long,
                flags,
            )
        };
        if res == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Err(BusError::Interrupted);
            }
            return Err(BusError::Receive(err));
        }
        Ok(Message::new(raw.mtype as i64, raw.client as i64, raw.time as i64))
    }

    /// Remove the queue from the host. Only the authority calls this.
    pub fn destroy(self) -> Result<(), BusError> {
        let res = unsafe { libc::msgctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if res == -1 {
            return Err(BusError::Destroy(io::Error::last_os_error()));
        }
        Ok(())
    }
}
