use std::{future::Future, pin::Pin, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::time::{timeout, Duration};

use crate::db::{Phase, TracePoint};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// High-accuracy fix acquisition budget.
const ACQUISITION_TIMEOUT_SECS: u64 = 10;
/// A cached fix older than this is treated as a failed acquisition.
const MAX_FIX_AGE_SECS: i64 = 60;

// Synthetic fallback: Tokyo Station, jittered sub-kilometer.
const FALLBACK_LATITUDE: f64 = 35.6812;
const FALLBACK_LONGITUDE: f64 = 139.7671;
const MAX_JITTER_DEGREES: f64 = 0.005;

/// A raw platform fix: coordinates plus the instant they were acquired.
#[derive(Debug, Clone)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub acquired_at: DateTime<Utc>,
}

pub type FixFuture<'a> = Pin<Box<dyn Future<Output = Result<GeoFix>> + Send + 'a>>;

/// Boundary to the platform location capability. Implementations may deny,
/// time out, or hand back a cached fix; the sampler absorbs all of it.
pub trait LocationProvider: Send + Sync {
    fn current_fix(&self) -> FixFuture<'_>;
}

/// Stand-in where no location capability exists. Every sample degrades to
/// the synthetic fallback.
pub struct NoLocationProvider;

impl LocationProvider for NoLocationProvider {
    fn current_fix(&self) -> FixFuture<'_> {
        Box::pin(async { Err(anyhow!("no location capability available")) })
    }
}

/// Samples the current position for a session. `sample` never fails: denial,
/// timeout and staleness all degrade to a synthetic point so the trace never
/// develops a gap the walk would stall on.
#[derive(Clone)]
pub struct GeoSampler {
    provider: Arc<dyn LocationProvider>,
    acquisition_timeout: Duration,
}

impl GeoSampler {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self {
            provider,
            acquisition_timeout: Duration::from_secs(ACQUISITION_TIMEOUT_SECS),
        }
    }

    pub async fn sample(&self, session_id: i64, phase: Phase) -> TracePoint {
        match timeout(self.acquisition_timeout, self.provider.current_fix()).await {
            Ok(Ok(fix)) => {
                let age = Utc::now() - fix.acquired_at;
                if age.num_seconds() > MAX_FIX_AGE_SECS {
                    log_warn!(
                        "location fix for session {session_id} is {}s stale, substituting synthetic point",
                        age.num_seconds()
                    );
                    synthetic_point(session_id, phase)
                } else {
                    TracePoint {
                        id: None,
                        session_id,
                        latitude: fix.latitude,
                        longitude: fix.longitude,
                        timestamp_ms: fix.acquired_at.timestamp_millis(),
                        phase,
                        created_at: Utc::now(),
                    }
                }
            }
            Ok(Err(err)) => {
                log_warn!("location sample failed for session {session_id}: {err:#}");
                synthetic_point(session_id, phase)
            }
            Err(_) => {
                log_warn!(
                    "location sample timed out (> {ACQUISITION_TIMEOUT_SECS}s) for session {session_id}"
                );
                synthetic_point(session_id, phase)
            }
        }
    }
}

fn synthetic_point(session_id: i64, phase: Phase) -> TracePoint {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    TracePoint {
        id: None,
        session_id,
        latitude: FALLBACK_LATITUDE + rng.gen_range(-MAX_JITTER_DEGREES..=MAX_JITTER_DEGREES),
        longitude: FALLBACK_LONGITUDE + rng.gen_range(-MAX_JITTER_DEGREES..=MAX_JITTER_DEGREES),
        timestamp_ms: now.timestamp_millis(),
        phase,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        latitude: f64,
        longitude: f64,
    }

    impl LocationProvider for FixedProvider {
        fn current_fix(&self) -> FixFuture<'_> {
            let fix = GeoFix {
                latitude: self.latitude,
                longitude: self.longitude,
                acquired_at: Utc::now(),
            };
            Box::pin(async move { Ok(fix) })
        }
    }

    struct StaleProvider;

    impl LocationProvider for StaleProvider {
        fn current_fix(&self) -> FixFuture<'_> {
            Box::pin(async {
                Ok(GeoFix {
                    latitude: 10.0,
                    longitude: 20.0,
                    acquired_at: Utc::now() - chrono::Duration::seconds(120),
                })
            })
        }
    }

    struct HangingProvider;

    impl LocationProvider for HangingProvider {
        fn current_fix(&self) -> FixFuture<'_> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn real_fix_is_passed_through() {
        let sampler = GeoSampler::new(Arc::new(FixedProvider {
            latitude: 51.5072,
            longitude: -0.1276,
        }));

        let point = sampler.sample(7, Phase::Fast).await;
        assert_eq!(point.session_id, 7);
        assert_eq!(point.phase, Phase::Fast);
        assert_eq!(point.latitude, 51.5072);
        assert_eq!(point.longitude, -0.1276);
    }

    #[tokio::test]
    async fn failure_yields_synthetic_point_near_fallback() {
        let sampler = GeoSampler::new(Arc::new(NoLocationProvider));

        let point = sampler.sample(1, Phase::Slow).await;
        assert_eq!(point.phase, Phase::Slow);
        assert!((point.latitude - FALLBACK_LATITUDE).abs() <= MAX_JITTER_DEGREES);
        assert!((point.longitude - FALLBACK_LONGITUDE).abs() <= MAX_JITTER_DEGREES);
    }

    #[tokio::test]
    async fn stale_fix_is_replaced() {
        let sampler = GeoSampler::new(Arc::new(StaleProvider));

        let point = sampler.sample(1, Phase::Fast).await;
        assert!((point.latitude - FALLBACK_LATITUDE).abs() <= MAX_JITTER_DEGREES);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_provider_times_out_to_synthetic() {
        let sampler = GeoSampler::new(Arc::new(HangingProvider));

        let point = sampler.sample(1, Phase::Fast).await;
        assert!((point.latitude - FALLBACK_LATITUDE).abs() <= MAX_JITTER_DEGREES);
        assert!((point.longitude - FALLBACK_LONGITUDE).abs() <= MAX_JITTER_DEGREES);
    }
}
