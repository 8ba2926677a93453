//! Retry/backoff policy.
//!
//! Pure and I/O-free by design: the state machine owns one `Backoff` per
//! track and asks it for the next delay, the same way `pingclair-tls`'s
//! `Certificate::needs_renewal` is a pure function kept separate from the
//! I/O-heavy `CertStore`/`AutoHttps` types.

/// Fixed progression for the cert track: `{1, 5, 15, 30, 45, 60, 60, ...}`
/// seconds, resetting whenever a cert-track success occurs.
const CERT_BACKOFF_SECS: &[i64] = &[1, 5, 15, 30, 45, 60];

/// Flat retry delay for the unprepare track (no progression).
pub const UNPREPARE_BACKOFF_SECS: i64 = 600;

/// Fixed poll interval while `IDLE_UNCONFIGURED`.
pub const UNCONFIGURED_POLL_SECS: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct Backoff {
    failures: usize,
}

impl Backoff {
    pub fn new() -> Self {
        Self { failures: 0 }
    }

    /// Resets the progression; called on any cert-track success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Seconds to wait before the next retry, and advances the counter.
    pub fn next_delay_secs(&mut self) -> i64 {
        let idx = self.failures.min(CERT_BACKOFF_SECS.len() - 1);
        self.failures += 1;
        CERT_BACKOFF_SECS[idx]
    }
}
