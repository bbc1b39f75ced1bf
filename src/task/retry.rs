//! Fixed-interval retry policy.
//!
//! Every backoff is a constant interval; growth is bounded by independent
//! counters. Login and per-message counters reset when their operation
//! class succeeds (or the message is abandoned). The restart counter is a
//! lifetime budget and never resets.

use crate::config::RetryConfig;
use std::time::Duration;

/// Length of destination identifiers that need the alternate send encoding.
pub const SPECIAL_DESTINATION_LEN: usize = 15;

/// Returns `true` for a 15-digit all-numeric destination.
#[must_use]
pub fn is_special_destination(destination: &str) -> bool {
    destination.len() == SPECIAL_DESTINATION_LEN && destination.bytes().all(|b| b.is_ascii_digit())
}

/// Which delivery path an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRoute {
    /// Default encoding to a string destination.
    General,
    /// First attempt of a special-destination round (structured body).
    SpecialPrimary,
    /// Second attempt of a special-destination round (numeric destination).
    SpecialNumeric,
}

/// Outcome of consulting the policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given backoff.
    Retry { after: Duration },
    /// Budget spent.
    GiveUp,
}

/// Retry counters owned by one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    /// Login retries since the last successful login.
    pub login: u32,
    /// Retries of the current message.
    pub send: u32,
    /// Lifetime restarts.
    pub restarts: u32,
}

/// Backoff intervals and caps shared by all tasks of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub login_backoff: Duration,
    pub send_retries: u32,
    pub send_backoff: Duration,
    pub special_send_retries: u32,
    pub special_send_backoff: Duration,
    pub restart_cooldown: Duration,
}

impl RetryPolicy {
    /// Decide whether another login attempt is allowed, bumping the counter if so.
    pub fn next_login(&self, counters: &mut RetryCounters, max_retries: u32) -> RetryDecision {
        Self::consume(&mut counters.login, max_retries, self.login_backoff)
    }

    /// Decide whether the current message gets another round on `route`.
    ///
    /// Both special-destination attempts share one round, so only the
    /// numeric variant consults the special cap.
    pub fn next_send(&self, counters: &mut RetryCounters, route: SendRoute) -> RetryDecision {
        match route {
            SendRoute::General => {
                Self::consume(&mut counters.send, self.send_retries, self.send_backoff)
            }
            SendRoute::SpecialPrimary => RetryDecision::Retry {
                after: Duration::ZERO,
            },
            SendRoute::SpecialNumeric => Self::consume(
                &mut counters.send,
                self.special_send_retries,
                self.special_send_backoff,
            ),
        }
    }

    /// Count one restart; returns `false` once the lifetime cap is exceeded.
    pub fn admit_restart(&self, counters: &mut RetryCounters, max_restarts: u32) -> bool {
        counters.restarts = counters.restarts.saturating_add(1);
        counters.restarts <= max_restarts
    }

    fn consume(counter: &mut u32, cap: u32, backoff: Duration) -> RetryDecision {
        if *counter < cap {
            *counter += 1;
            RetryDecision::Retry { after: backoff }
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            login_backoff: config.login_backoff(),
            send_retries: config.send_retries,
            send_backoff: config.send_backoff(),
            special_send_retries: config.special_send_retries,
            special_send_backoff: config.special_send_backoff(),
            restart_cooldown: config.restart_cooldown(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
