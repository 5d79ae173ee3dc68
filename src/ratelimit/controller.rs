//! Core admission controller.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use super::settings::{ConfigUpdate, RateConfig, UpdateReport};
use super::window::{ReservationWindow, WINDOW};

/// Who sits out the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Return the delay; the caller waits before acting
    Client,
    /// Wait inside the gate and report zero
    Server,
}

impl WaitMode {
    /// Map a "defer the wait to the gate" flag onto a mode.
    pub fn from_defer_wait(defer_wait: bool) -> Self {
        if defer_wait {
            WaitMode::Server
        } else {
            WaitMode::Client
        }
    }
}

/// Which decision path produced an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionKind {
    /// Capacity was available; only the base delay applies
    Immediate,
    /// The window was full; the delay runs until the oldest slot ages out
    Deferred,
}

/// A committed admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub kind: AdmissionKind,
    /// How long the caller must wait before acting
    pub delay: Duration,
    /// The slot recorded in the window
    pub reserved_at: Instant,
}

impl Admission {
    /// The delay in whole milliseconds, rounded up.
    pub fn delay_ms(&self) -> u64 {
        ceil_millis(self.delay)
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Window and config, guarded together.
#[derive(Debug)]
struct GateState {
    window: ReservationWindow,
    config: RateConfig,
}

/// The shared sliding-window admission gate.
///
/// Every call is admitted; a full window only lengthens the delay. This
/// struct is thread-safe and is meant to be shared behind an `Arc`.
///
/// Reservations record scheduled slots, not arrivals. While the window stays
/// full, deferred callers all measure from the same oldest slot, so a burst
/// can place more than `limit_per_window` reservations inside one 60-second
/// span.
#[derive(Debug)]
pub struct AdmissionController {
    state: Mutex<GateState>,
}

impl AdmissionController {
    /// Create a controller with an empty window.
    pub fn new(config: RateConfig) -> Self {
        Self {
            state: Mutex::new(GateState {
                window: ReservationWindow::new(),
                config,
            }),
        }
    }

    /// Decide and record one admission at `now`.
    ///
    /// Prune, capacity check, delay computation and append happen under a
    /// single lock acquisition.
    pub fn reserve(&self, now: Instant) -> Admission {
        let mut state = self.state.lock();
        let GateState { window, config } = &mut *state;

        let pruned = window.prune(now);
        let base = config.base_delay();
        let limit = config.limit_per_window() as usize;

        let (kind, delay) = match window.front() {
            Some(oldest) if window.len() >= limit => {
                let until_free = (oldest + WINDOW).saturating_duration_since(now);
                // Zero or negative spacing falls back to the base delay
                let delay = until_free
                    .checked_sub(base)
                    .filter(|d| !d.is_zero())
                    .unwrap_or(base);
                (AdmissionKind::Deferred, delay)
            }
            _ => (AdmissionKind::Immediate, base),
        };

        let reserved_at = now + delay;
        window.push(reserved_at);

        trace!(
            kind = ?kind,
            delay_ms = ceil_millis(delay),
            pruned = pruned,
            reservations = window.len(),
            limit = limit,
            "Admission decided"
        );

        if kind == AdmissionKind::Deferred {
            debug!(
                delay_ms = ceil_millis(delay),
                reservations = window.len(),
                "Window full, admission deferred"
            );
        }

        Admission {
            kind,
            delay,
            reserved_at,
        }
    }

    /// Admit a caller at `now`, returning the delay in milliseconds it must still wait.
    ///
    /// In [`WaitMode::Server`] the wait happens here, after the lock is
    /// released, and the result is always zero.
    pub async fn try_admit_at(&self, now: Instant, mode: WaitMode) -> u64 {
        let admission = self.reserve(now);

        match mode {
            WaitMode::Client => admission.delay_ms(),
            WaitMode::Server => {
                sleep(admission.delay).await;
                0
            }
        }
    }

    /// Admit a caller at the current time.
    pub async fn try_admit(&self, mode: WaitMode) -> u64 {
        self.try_admit_at(Instant::now(), mode).await
    }

    /// Snapshot of the configuration in force.
    pub fn config(&self) -> RateConfig {
        self.state.lock().config
    }

    /// Apply a reconfiguration.
    ///
    /// Each requested field is validated on its own. Valid fields are applied
    /// together in one critical section; rejected fields keep their value.
    pub fn update_config(&self, update: &ConfigUpdate) -> UpdateReport {
        if update.is_empty() {
            debug!("Empty configuration update, nothing to apply");
            return UpdateReport {
                limit_per_window: None,
                base_delay_ms: None,
                config: self.config(),
            };
        }

        let limit = update.parse_limit_per_window();
        let base_delay = update.parse_base_delay_ms();

        let (previous, config) = {
            let mut state = self.state.lock();
            let previous = state.config;
            state.config.apply(
                limit.as_ref().and_then(|r| r.as_ref().ok().copied()),
                base_delay.as_ref().and_then(|r| r.as_ref().ok().copied()),
            );
            (previous, state.config)
        };

        let report = UpdateReport {
            limit_per_window: limit,
            base_delay_ms: base_delay,
            config,
        };

        for error in report.errors() {
            warn!(field = error.field().wire_name(), error = %error, "Rejected configuration field");
        }

        if config != previous {
            info!(
                limit_per_window = config.limit_per_window(),
                base_delay_ms = config.base_delay_ms(),
                previous_limit = previous.limit_per_window(),
                previous_base_delay_ms = previous.base_delay_ms(),
                "Rate configuration updated"
            );
        }

        report
    }

    /// Number of reservations currently held, without pruning.
    pub fn reservation_count(&self) -> usize {
        self.state.lock().window.len()
    }

    /// Reservations currently held, oldest first.
    pub fn reservations(&self) -> Vec<Instant> {
        self.state.lock().window.iter().copied().collect()
    }
}
