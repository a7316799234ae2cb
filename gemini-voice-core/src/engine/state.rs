//! Session state and the shared shutdown signal.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// Lifecycle of one session.
///
/// ```text
/// Disconnected → Connecting → AwaitingSetupAck → Active → Closing → Closed
///                     └──────────────┴───────────────┴──► Closing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    AwaitingSetupAck = 2,
    Active = 3,
    Closing = 4,
    Closed = 5,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::AwaitingSetupAck,
            3 => Self::Active,
            4 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// `Closing` or `Closed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Lock-free cell holding the authoritative [`SessionState`].
#[derive(Debug)]
pub struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from → to` only if the state is still `from`. Returns whether the
    /// transition happened.
    pub fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Closing` from any non-terminal state. Returns `true` only for
    /// the caller that performed the transition.
    pub fn begin_closing(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if SessionState::from_u8(current).is_terminal() {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// The single cancellation primitive: a flag every loop checks at the top of
/// each iteration, plus a condvar so the controller can block on it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug, Default)]
struct ShutdownInner {
    flag: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.cond.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Block until triggered.
    pub fn wait(&self) {
        let mut guard = self.inner.lock.lock();
        while !self.is_triggered() {
            self.inner.cond.wait(&mut guard);
        }
    }

    /// Block until triggered or `timeout` elapses. Returns whether triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if !self.is_triggered() {
            self.inner.cond.wait_for(&mut guard, timeout);
        }
        self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn begin_closing_wins_once_and_never_goes_back() {
        let cell = SessionStateCell::new(SessionState::Active);
        assert!(cell.begin_closing());
        assert!(!cell.begin_closing());
        assert_eq!(cell.load(), SessionState::Closing);

        cell.store(SessionState::Closed);
        assert!(!cell.begin_closing());
        assert_eq!(cell.load(), SessionState::Closed);
    }

    #[test]
    fn advance_refuses_after_closing() {
        let cell = SessionStateCell::new(SessionState::AwaitingSetupAck);
        cell.begin_closing();
        assert!(!cell.advance(SessionState::AwaitingSetupAck, SessionState::Active));
        assert_eq!(cell.load(), SessionState::Closing);
    }

    #[test]
    fn closing_is_reachable_from_every_live_state() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::AwaitingSetupAck,
            SessionState::Active,
        ] {
            let cell = SessionStateCell::new(state);
            assert!(cell.begin_closing(), "{state:?}");
        }
    }

    #[test]
    fn shutdown_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait())
        };
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.trigger();
        waiter.join().unwrap();
        assert!(signal.wait_timeout(Duration::from_millis(1)));
    }
}
