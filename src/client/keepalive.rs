//! Keepalive monitor
//!
//! Runs only while connected with a non-zero negotiated ping interval. A ping
//! goes out once `interval` has elapsed since the previous one and no pong is
//! outstanding. A ping left unanswered past `timeout` counts as missed; once
//! the missed count exceeds `threshold` the connection is declared dead. Any
//! pong clears the outstanding ping and the missed count.

use std::time::{Duration, Instant};

use crate::utils::clock;

/// Ping parameters negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingParams {
    pub interval: Duration,
    pub timeout: Duration,
    pub threshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    Idle,
    SendPing,
    Expired { missed: u32 },
}

#[derive(Debug, Default)]
pub struct Keepalive {
    params: Option<PingParams>,
    last_ping_sent: Option<Instant>,
    last_pong_received: Option<Instant>,
    waiting_for_pong: bool,
    missed: u32,
}

impl Keepalive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the monitor; the first ping is due one interval after `now`.
    pub fn start(&mut self, params: PingParams, now: Instant) {
        self.stop();
        if params.interval.is_zero() {
            return;
        }
        self.params = Some(params);
        self.last_ping_sent = Some(now);
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.params.is_some()
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_for_pong
    }

    pub fn last_pong_received(&self) -> Option<Instant> {
        self.last_pong_received
    }

    pub fn poll(&mut self, now: Instant) -> KeepaliveAction {
        let (Some(params), Some(sent)) = (self.params, self.last_ping_sent) else {
            return KeepaliveAction::Idle;
        };
        if self.waiting_for_pong && clock::reached(sent + params.timeout, now) {
            self.waiting_for_pong = false;
            self.missed += 1;
        }
        if self.missed > params.threshold {
            return KeepaliveAction::Expired {
                missed: self.missed,
            };
        }
        if !self.waiting_for_pong && clock::reached(sent + params.interval, now) {
            self.last_ping_sent = Some(now);
            self.waiting_for_pong = true;
            return KeepaliveAction::SendPing;
        }
        KeepaliveAction::Idle
    }

    pub fn pong_received(&mut self, now: Instant) {
        self.waiting_for_pong = false;
        self.missed = 0;
        self.last_pong_received = Some(now);
    }

    /// Next instant at which `poll` may have something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let params = self.params?;
        let sent = self.last_ping_sent?;
        if self.waiting_for_pong {
            Some(sent + params.timeout)
        } else {
            Some(sent + params.interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(interval: u64, timeout: u64, threshold: u32) -> PingParams {
        PingParams {
            interval: Duration::from_millis(interval),
            timeout: Duration::from_millis(timeout),
            threshold,
        }
    }

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn test_inactive_without_interval() {
        let mut keepalive = Keepalive::new();
        let now = clock::now();
        keepalive.start(params(0, 50, 1), now);
        assert!(!keepalive.is_active());
        assert_eq!(keepalive.poll(ms(now, 1_000)), KeepaliveAction::Idle);
        assert!(keepalive.next_deadline().is_none());
    }

    #[test]
    fn test_first_ping_after_one_interval() {
        let mut keepalive = Keepalive::new();
        let t0 = clock::now();
        keepalive.start(params(100, 50, 1), t0);
        assert_eq!(keepalive.poll(ms(t0, 99)), KeepaliveAction::Idle);
        assert_eq!(keepalive.next_deadline(), Some(ms(t0, 100)));
        assert_eq!(keepalive.poll(ms(t0, 100)), KeepaliveAction::SendPing);
        assert!(keepalive.is_waiting());
        assert_eq!(keepalive.next_deadline(), Some(ms(t0, 150)));
    }

    #[test]
    fn test_two_silent_cycles_exceed_threshold_one() {
        let mut keepalive = Keepalive::new();
        let t0 = clock::now();
        keepalive.start(params(100, 50, 1), t0);

        assert_eq!(keepalive.poll(ms(t0, 100)), KeepaliveAction::SendPing);
        assert_eq!(keepalive.poll(ms(t0, 150)), KeepaliveAction::Idle);
        assert_eq!(keepalive.missed(), 1);
        assert_eq!(keepalive.poll(ms(t0, 200)), KeepaliveAction::SendPing);
        assert_eq!(
            keepalive.poll(ms(t0, 250)),
            KeepaliveAction::Expired { missed: 2 }
        );
    }

    #[test]
    fn test_pong_resets_missed_count() {
        let mut keepalive = Keepalive::new();
        let t0 = clock::now();
        keepalive.start(params(100, 50, 1), t0);

        assert_eq!(keepalive.poll(ms(t0, 100)), KeepaliveAction::SendPing);
        assert_eq!(keepalive.poll(ms(t0, 150)), KeepaliveAction::Idle);
        assert_eq!(keepalive.poll(ms(t0, 200)), KeepaliveAction::SendPing);
        keepalive.pong_received(ms(t0, 210));
        assert_eq!(keepalive.missed(), 0);
        assert!(!keepalive.is_waiting());
        assert_eq!(keepalive.last_pong_received(), Some(ms(t0, 210)));
        assert_eq!(keepalive.poll(ms(t0, 250)), KeepaliveAction::Idle);
        assert_eq!(keepalive.poll(ms(t0, 300)), KeepaliveAction::SendPing);
    }

    #[test]
    fn test_no_second_ping_while_waiting() {
        let mut keepalive = Keepalive::new();
        let t0 = clock::now();
        keepalive.start(params(100, 500, 3), t0);
        assert_eq!(keepalive.poll(ms(t0, 100)), KeepaliveAction::SendPing);
        assert_eq!(keepalive.poll(ms(t0, 250)), KeepaliveAction::Idle);
        assert_eq!(keepalive.poll(ms(t0, 599)), KeepaliveAction::Idle);
        // timeout reached: miss counted and the overdue ping goes out
        assert_eq!(keepalive.poll(ms(t0, 600)), KeepaliveAction::SendPing);
        assert_eq!(keepalive.missed(), 1);
    }

    #[test]
    fn test_stop_clears_state() {
        let mut keepalive = Keepalive::new();
        let t0 = clock::now();
        keepalive.start(params(100, 50, 1), t0);
        keepalive.poll(ms(t0, 100));
        keepalive.stop();
        assert!(!keepalive.is_active());
        assert_eq!(keepalive.missed(), 0);
        assert!(!keepalive.is_waiting());
    }
}
