//! Keep-alive supervision.
//!
//! One-shot timer scheme: every successful outbound frame (and every
//! PINGRESP) re-arms the timer. When it fires with traffic seen during the
//! window a PINGREQ goes straight to the transport and the timer re-arms;
//! when it fires with none, the peer has gone quiet past the deadline.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Traffic occurred during the window: transmit PINGREQ and re-arm.
    SendPing,
    /// Nothing arrived since the PINGREQ went out: the connection is dead.
    Timeout,
    /// Keep-alive is disabled (interval zero).
    Disabled,
}

#[derive(Debug)]
pub struct Pinger {
    interval: Duration,
    is_reset: bool,
}

impl Pinger {
    #[must_use]
    pub fn new(interval_secs: u16) -> Self {
        Self {
            interval: Duration::from_secs(u64::from(interval_secs)),
            is_reset: false,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Records traffic inside the current window. Returns whether the
    /// caller should (re)arm the one-shot timer.
    pub fn reset(&mut self) -> bool {
        self.is_reset = true;
        self.enabled()
    }

    /// The one-shot timer fired.
    pub fn fire(&mut self) -> PingOutcome {
        if !self.enabled() {
            return PingOutcome::Disabled;
        }
        if self.is_reset {
            self.is_reset = false;
            PingOutcome::SendPing
        } else {
            PingOutcome::Timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_window_sends_ping_then_times_out() {
        let mut pinger = Pinger::new(2);
        assert!(pinger.reset());

        // First expiry: traffic was seen at connect, so ping and re-arm.
        assert_eq!(pinger.fire(), PingOutcome::SendPing);
        // Second expiry with no PINGRESP in between: give up.
        assert_eq!(pinger.fire(), PingOutcome::Timeout);
    }

    #[test]
    fn test_pingresp_keeps_the_link_alive() {
        let mut pinger = Pinger::new(2);
        pinger.reset();
        assert_eq!(pinger.fire(), PingOutcome::SendPing);

        // PINGRESP arrives inside the window.
        pinger.reset();
        assert_eq!(pinger.fire(), PingOutcome::SendPing);
    }

    #[test]
    fn test_zero_interval_disables_pinging() {
        let mut pinger = Pinger::new(0);
        assert!(!pinger.enabled());
        assert!(!pinger.reset());
        assert_eq!(pinger.fire(), PingOutcome::Disabled);
    }

    #[test]
    fn test_interval_in_milliseconds() {
        let pinger = Pinger::new(60);
        assert_eq!(pinger.interval(), Duration::from_secs(60));
    }
}
