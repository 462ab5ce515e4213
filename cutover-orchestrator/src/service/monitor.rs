//! Rollback monitor
//!
//! Watches the candidate pool during the observation window and produces a
//! single verdict. The loop is bounded by the window: it never waits past
//! the deadline.
//!
//! Rules:
//! - `failure_threshold` consecutive failed samples: unhealthy
//! - a sample that errors before the deadline: no data, streak unchanged
//! - a sample still outstanding at the deadline: `ObservationTimeout`,
//!   whatever it would have said
//! - window elapsed between samples with at least one pass: healthy
//! - window elapsed with no passing sample: `ObservationTimeout`
//! - cancellation: unhealthy immediately

use cutover_core::domain::health::HealthVerdict;
use cutover_core::domain::spec::HealthCheckSpec;
use cutover_core::domain::traffic::PoolHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapters::HealthSource;

pub const CANCELLED_REASON: &str = "observation cancelled";

pub struct RollbackMonitor {
    health: Arc<dyn HealthSource>,
}

impl RollbackMonitor {
    pub fn new(health: Arc<dyn HealthSource>) -> Self {
        Self { health }
    }

    /// Observes `pool` for at most `window`
    pub async fn observe(
        &self,
        deployment_id: Uuid,
        service: &str,
        pool: &PoolHandle,
        check: &HealthCheckSpec,
        window: Duration,
        cancel: &CancellationToken,
    ) -> HealthVerdict {
        info!(
            "Deployment {}: observing {} for {:?} (every {}s, threshold {})",
            deployment_id, pool, window, check.interval_seconds, check.failure_threshold
        );

        let deadline = Instant::now() + window;
        let mut ticker = time::interval(Duration::from_secs(check.interval_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut streak = 0u32;
        let mut passes = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Deployment {}: observation cancelled", deployment_id);
                    return HealthVerdict::unhealthy(CANCELLED_REASON);
                }
                _ = time::sleep_until(deadline) => break,
                _ = ticker.tick() => {}
            }

            let sample = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Deployment {}: observation cancelled", deployment_id);
                    return HealthVerdict::unhealthy(CANCELLED_REASON);
                }
                result = time::timeout_at(deadline, self.health.sample(service, pool, check)) => result,
            };

            let sample = match sample {
                Ok(sample) if Instant::now() < deadline => sample,
                _ => {
                    warn!(
                        "Deployment {}: sample outstanding at the deadline ({} passing before it)",
                        deployment_id, passes
                    );
                    return HealthVerdict::timed_out();
                }
            };

            match sample {
                Ok(sample) if sample.passed => {
                    streak = 0;
                    passes += 1;
                    debug!("Deployment {}: probe passed ({})", deployment_id, sample.detail);
                }
                Ok(sample) => {
                    streak += 1;
                    warn!(
                        "Deployment {}: probe failed ({}/{}): {}",
                        deployment_id, streak, check.failure_threshold, sample.detail
                    );
                    if streak >= check.failure_threshold {
                        return HealthVerdict::unhealthy(format!(
                            "{} consecutive failed health checks: {}",
                            streak, sample.detail
                        ));
                    }
                }
                Err(e) => {
                    warn!("Deployment {}: no health data: {}", deployment_id, e);
                }
            }
        }

        if passes > 0 {
            info!(
                "Deployment {}: window elapsed healthy ({} passing samples)",
                deployment_id, passes
            );
            HealthVerdict::healthy(format!(
                "no sustained failure in {:?} ({} passing samples)",
                window, passes
            ))
        } else {
            warn!("Deployment {}: window elapsed without health data", deployment_id);
            HealthVerdict::timed_out()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::health::{ScriptedHealthSource, ScriptedProbe};

    fn check() -> HealthCheckSpec {
        check_with_threshold(3)
    }

    fn check_with_threshold(failure_threshold: u32) -> HealthCheckSpec {
        HealthCheckSpec {
            path: "/".to_string(),
            interval_seconds: 10,
            failure_threshold,
        }
    }

    async fn observe(source: Arc<ScriptedHealthSource>, window: Duration) -> HealthVerdict {
        observe_with(source, &check(), window).await
    }

    async fn observe_with(
        source: Arc<ScriptedHealthSource>,
        check: &HealthCheckSpec,
        window: Duration,
    ) -> HealthVerdict {
        RollbackMonitor::new(source)
            .observe(
                Uuid::new_v4(),
                "web",
                &PoolHandle::new("web-green-1"),
                check,
                window,
                &CancellationToken::new(),
            )
            .await
    }

    fn slow(secs: u64, passed: bool) -> ScriptedProbe {
        ScriptedProbe::Slow {
            after: Duration::from_secs(secs),
            passed,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_window() {
        let source = Arc::new(ScriptedHealthSource::passing());
        let start = Instant::now();
        let verdict = observe(source.clone(), Duration::from_secs(60)).await;

        assert!(verdict.healthy);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        // Ticks at 0, 10, ..., 50; the tick at 60 loses to the deadline
        assert_eq!(source.sampled(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_failure_is_unhealthy() {
        let source = Arc::new(ScriptedHealthSource::new([
            ScriptedProbe::Pass,
            ScriptedProbe::Fail,
            ScriptedProbe::Pass,
            ScriptedProbe::Fail,
            ScriptedProbe::Fail,
            ScriptedProbe::Fail,
        ]));
        let start = Instant::now();
        let verdict = observe(source, Duration::from_secs(300)).await;

        assert!(!verdict.healthy);
        assert!(verdict.reason.starts_with("3 consecutive failed health checks"));
        assert_eq!(start.elapsed(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_no_data() {
        let source = Arc::new(ScriptedHealthSource::erroring());
        let verdict = observe(source, Duration::from_secs(30)).await;
        assert!(verdict.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_failures() {
        let source = Arc::new(ScriptedHealthSource::new([
            ScriptedProbe::Fail,
            ScriptedProbe::Error,
            ScriptedProbe::Fail,
            ScriptedProbe::Error,
            ScriptedProbe::Pass,
        ]));
        let verdict = observe(source, Duration::from_secs(100)).await;
        assert!(verdict.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_resolves_immediately() {
        let source = Arc::new(ScriptedHealthSource::passing());
        let monitor = RollbackMonitor::new(source);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let verdict = monitor
            .observe(
                Uuid::new_v4(),
                "web",
                &PoolHandle::new("p"),
                &check(),
                Duration::from_secs(300),
                &cancel,
            )
            .await;

        assert!(!verdict.healthy);
        assert_eq!(verdict.reason, CANCELLED_REASON);
        assert_eq!(start.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_landing_on_deadline_times_out() {
        // Pass at 0, fail at 10, then a failure started at 20 lands at 30
        let source = Arc::new(ScriptedHealthSource::new([
            ScriptedProbe::Pass,
            ScriptedProbe::Fail,
            slow(10, false),
        ]));
        let start = Instant::now();
        let verdict =
            observe_with(source.clone(), &check_with_threshold(2), Duration::from_secs(30)).await;

        assert!(!verdict.healthy);
        assert!(verdict.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(source.sampled(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_landing_on_deadline_times_out() {
        let source = Arc::new(ScriptedHealthSource::new([
            ScriptedProbe::Pass,
            ScriptedProbe::Pass,
            slow(10, true),
        ]));
        let verdict = observe(source, Duration::from_secs(30)).await;

        assert!(!verdict.healthy);
        assert!(verdict.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_sample_is_cut_off_at_deadline() {
        let source = Arc::new(ScriptedHealthSource::new([ScriptedProbe::Pass, slow(600, true)]));
        let start = Instant::now();
        let verdict = observe(source.clone(), Duration::from_secs(30)).await;

        assert!(verdict.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(source.sampled(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_samples_inside_window_count() {
        // Each sample takes 5s; they land at 5, 15 and 25
        let source = Arc::new(ScriptedHealthSource::new([slow(5, true)]));
        let verdict = observe(source.clone(), Duration::from_secs(30)).await;

        assert!(verdict.healthy);
        assert_eq!(source.sampled(), 3);
    }
}
