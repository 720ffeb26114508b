//! Connection lifecycle as a pure state machine.
//!
//! No I/O and no timers live here. The channel feeds transport outcomes in
//! and acts on what comes back, which keeps backoff behavior testable
//! without a socket.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open ok──▶ Connected
//!      ▲                        │                       │
//!      │ give up          open failed              link lost
//!      │                        ▼                       │
//!      └──────────────── ReconnectScheduled ◀───────────┘
//!                               │ timer fires
//!                               ▼
//!                           Connecting
//! ```

use std::fmt;
use std::time::Duration;

use doclink_core::ReconnectConfig;

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and nothing scheduled.
    Disconnected,
    /// An open is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// A backoff timer is armed.
    ReconnectScheduled,
}

impl ConnectionState {
    /// Lower-case label used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectScheduled => "reconnect_scheduled",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOrigin {
    /// A caller invoked `connect()`.
    Explicit,
    /// The first subscriber woke the channel up.
    Lazy,
    /// A reconnect timer fired.
    Timer,
}

impl ConnectOrigin {
    /// Caller-initiated connects start a fresh backoff history.
    pub fn resets_attempts(self) -> bool {
        !matches!(self, Self::Timer)
    }
}

/// What to do after the link was lost or an open failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterLoss {
    /// Arm a timer and try again.
    Retry {
        /// 1-indexed attempt number about to be scheduled.
        attempt: u32,
        /// How long to wait before it.
        delay: Duration,
    },
    /// Stop retrying.
    GiveUp {
        /// Reconnect attempts made before giving up.
        attempts: u32,
    },
}

/// Connection state plus reconnect bookkeeping.
#[derive(Clone, Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectConfig,
}

impl ConnectionMachine {
    /// Start disconnected with no attempts recorded.
    pub fn new(policy: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Move to `Connecting`.
    ///
    /// Returns `false` when a connection is already open or opening, in which
    /// case nothing changes.
    pub fn begin_connect(&mut self, origin: ConnectOrigin) -> bool {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => false,
            ConnectionState::ReconnectScheduled if origin == ConnectOrigin::Lazy => false,
            ConnectionState::Disconnected | ConnectionState::ReconnectScheduled => {
                if origin.resets_attempts() {
                    self.attempts = 0;
                }
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// The transport acknowledged the open.
    pub fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// The open failed or an established link went away.
    pub fn on_lost(&mut self) -> AfterLoss {
        if self.attempts >= self.policy.max_attempts {
            self.state = ConnectionState::Disconnected;
            return AfterLoss::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        self.state = ConnectionState::ReconnectScheduled;
        AfterLoss::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        }
    }

    /// Back to a clean `Disconnected`.
    pub fn teardown(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.attempts = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn machine(max_attempts: u32) -> ConnectionMachine {
        ConnectionMachine::new(ReconnectConfig {
            max_attempts,
            base_delay_ms: 1000,
        })
    }

    #[test]
    fn starts_disconnected() {
        let m = machine(5);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn connect_is_noop_while_open_or_opening() {
        let mut m = machine(5);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        assert!(!m.begin_connect(ConnectOrigin::Explicit));
        m.on_open();
        assert!(!m.begin_connect(ConnectOrigin::Explicit));
        assert!(!m.begin_connect(ConnectOrigin::Lazy));
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn consecutive_losses_double_the_delay() {
        let mut m = machine(5);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        m.on_open();

        let mut delays = Vec::new();
        for _ in 0..4 {
            match m.on_lost() {
                AfterLoss::Retry { delay, .. } => delays.push(delay.as_secs()),
                AfterLoss::GiveUp { .. } => panic!("gave up early"),
            }
            assert_eq!(m.state(), ConnectionState::ReconnectScheduled);
            assert!(m.begin_connect(ConnectOrigin::Timer));
        }
        assert_eq!(delays, vec![1, 2, 4, 8]);
        assert_eq!(m.attempts(), 4);
    }

    #[test]
    fn successful_open_resets_backoff() {
        let mut m = machine(5);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        m.on_open();
        let _ = m.on_lost();
        assert!(m.begin_connect(ConnectOrigin::Timer));
        let _ = m.on_lost();
        assert!(m.begin_connect(ConnectOrigin::Timer));
        m.on_open();

        assert_matches!(m.on_lost(), AfterLoss::Retry { attempt: 1, delay } if delay == Duration::from_secs(1));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut m = machine(3);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        m.on_open();
        for attempt in 1..=3 {
            assert_matches!(m.on_lost(), AfterLoss::Retry { attempt: a, .. } if a == attempt);
            assert!(m.begin_connect(ConnectOrigin::Timer));
        }
        assert_eq!(m.on_lost(), AfterLoss::GiveUp { attempts: 3 });
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn explicit_connect_resets_exhausted_counter() {
        let mut m = machine(1);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        let _ = m.on_lost();
        assert!(m.begin_connect(ConnectOrigin::Timer));
        assert_eq!(m.on_lost(), AfterLoss::GiveUp { attempts: 1 });

        assert!(m.begin_connect(ConnectOrigin::Explicit));
        assert_eq!(m.attempts(), 0);
        assert_matches!(m.on_lost(), AfterLoss::Retry { attempt: 1, .. });
    }

    #[test]
    fn zero_max_attempts_never_retries() {
        let mut m = machine(0);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        m.on_open();
        assert_eq!(m.on_lost(), AfterLoss::GiveUp { attempts: 0 });
    }

    #[test]
    fn lazy_connect_waits_for_scheduled_reconnect() {
        let mut m = machine(5);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        let _ = m.on_lost();
        assert!(!m.begin_connect(ConnectOrigin::Lazy));
        assert_eq!(m.state(), ConnectionState::ReconnectScheduled);
        assert_eq!(m.attempts(), 1);
    }

    #[test]
    fn explicit_connect_preempts_scheduled_reconnect() {
        let mut m = machine(5);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        let _ = m.on_lost();
        let _ = m.on_lost();
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn teardown_clears_everything() {
        let mut m = machine(5);
        assert!(m.begin_connect(ConnectOrigin::Explicit));
        let _ = m.on_lost();
        m.teardown();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn state_labels() {
        assert_eq!(ConnectionState::ReconnectScheduled.to_string(), "reconnect_scheduled");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
    }
}
