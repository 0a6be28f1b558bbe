//! Health state machine backing the liveness, readiness and startup probes.
//!
//! ```text
//! starting ──sync ok──▶ ready
//!     │
//!     └──any failure──▶ degraded (terminal)
//! ```
//!
//! The phase never moves backwards. Losing the index while `ready` only
//! affects the readiness answer, not the phase.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use semroute_core::metrics::HEALTH_PHASE;
use semroute_core::{RouterError, RouterResult, VectorIndex};
use serde::Serialize;
use tracing::{info, warn};

/// Lifecycle phase of the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthPhase {
    Starting,
    Ready,
    Degraded,
}

impl HealthPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        }
    }

    fn gauge_value(self) -> i64 {
        match self {
            Self::Starting => 0,
            Self::Ready => 1,
            Self::Degraded => 2,
        }
    }
}

/// Outcome of the most recent index connectivity check
#[derive(Debug, Clone, Copy)]
pub struct ConnectivityCheck {
    pub checked_at: Instant,
    pub reachable: bool,
    /// Stored vectors counted during the same check
    pub vectors: Option<usize>,
}

/// Answer to a readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Starting,
    Degraded(String),
    IndexUnreachable,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Short status string used in probe bodies.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Starting => "starting",
            Self::Degraded(_) => "degraded",
            Self::IndexUnreachable => "unavailable",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Ready | Self::Starting => None,
            Self::Degraded(reason) => Some(reason.clone()),
            Self::IndexUnreachable => Some("vector index unreachable".to_string()),
        }
    }
}

struct HealthInner {
    phase: HealthPhase,
    changed_at: DateTime<Utc>,
    degraded_reason: Option<String>,
    last_check: Option<ConnectivityCheck>,
}

/// Single guarded holder for the health phase.
pub struct HealthState {
    inner: RwLock<HealthInner>,
    recheck_interval: Duration,
}

impl HealthState {
    /// New holder in `starting`. Connectivity results are reused for
    /// `recheck_interval` (zero checks on every probe).
    pub fn new(recheck_interval: Duration) -> Self {
        HEALTH_PHASE.set(HealthPhase::Starting.gauge_value());
        Self {
            inner: RwLock::new(HealthInner {
                phase: HealthPhase::Starting,
                changed_at: Utc::now(),
                degraded_reason: None,
                last_check: None,
            }),
            recheck_interval,
        }
    }

    pub fn phase(&self) -> HealthPhase {
        self.inner.read().phase
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.inner.read().changed_at
    }

    pub fn degraded_reason(&self) -> Option<String> {
        self.inner.read().degraded_reason.clone()
    }

    pub fn last_check(&self) -> Option<ConnectivityCheck> {
        self.inner.read().last_check
    }

    /// Time spent serving since the router became ready; zero in any other
    /// phase.
    pub fn uptime(&self) -> Duration {
        let inner = self.inner.read();
        match inner.phase {
            HealthPhase::Ready => (Utc::now() - inner.changed_at)
                .to_std()
                .unwrap_or_default(),
            HealthPhase::Starting | HealthPhase::Degraded => Duration::ZERO,
        }
    }

    /// `starting → ready`
    pub fn mark_ready(&self) -> RouterResult<()> {
        self.transition(HealthPhase::Ready, None)
    }

    /// `starting → degraded`, recording why startup failed.
    pub fn mark_degraded(&self, reason: impl Into<String>) -> RouterResult<()> {
        self.transition(HealthPhase::Degraded, Some(reason.into()))
    }

    fn transition(&self, target: HealthPhase, reason: Option<String>) -> RouterResult<()> {
        let mut inner = self.inner.write();
        if inner.phase != HealthPhase::Starting {
            return Err(RouterError::invalid_state(format!(
                "cannot move from {:?} to {:?}",
                inner.phase, target
            )));
        }

        inner.phase = target;
        inner.changed_at = Utc::now();
        inner.degraded_reason = reason;
        HEALTH_PHASE.set(target.gauge_value());

        match &inner.degraded_reason {
            Some(reason) => warn!(phase = ?target, reason = %reason, "Health phase changed"),
            None => info!(phase = ?target, "Health phase changed"),
        }
        Ok(())
    }

    /// Startup has concluded, successfully or not.
    pub fn is_startup_complete(&self) -> bool {
        self.phase() != HealthPhase::Starting
    }

    /// Ready only in `ready` and only while the index answers.
    pub async fn check_readiness(&self, index: &dyn VectorIndex) -> Readiness {
        {
            let inner = self.inner.read();
            match inner.phase {
                HealthPhase::Starting => return Readiness::Starting,
                HealthPhase::Degraded => {
                    return Readiness::Degraded(inner.degraded_reason.clone().unwrap_or_default())
                }
                HealthPhase::Ready => {}
            }
            if let Some(check) = inner.last_check {
                if check.checked_at.elapsed() < self.recheck_interval {
                    return Self::from_reachable(check.reachable);
                }
            }
        }

        let (reachable, vectors) = match index.health().await {
            Ok(()) => match index.count().await {
                Ok(count) => (true, Some(count)),
                Err(e) => {
                    warn!(index = index.kind(), error = %e, "Index vector count failed");
                    (!e.is_connectivity(), None)
                }
            },
            Err(e) => {
                warn!(index = index.kind(), error = %e, "Index connectivity check failed");
                (false, None)
            }
        };

        self.inner.write().last_check = Some(ConnectivityCheck {
            checked_at: Instant::now(),
            reachable,
            vectors,
        });
        Self::from_reachable(reachable)
    }

    fn from_reachable(reachable: bool) -> Readiness {
        if reachable {
            Readiness::Ready
        } else {
            Readiness::IndexUnreachable
        }
    }
}
