//! Traffic router collaborator
//!
//! Owns a service's listener: which pools sit behind the blue and green
//! slots and how requests are split between them. Weights are always set as
//! a pair, so the listener never serves a split that does not sum to 100.

use async_trait::async_trait;
use cutover_core::domain::spec::HealthCheckSpec;
use cutover_core::domain::traffic::{PoolColor, PoolHandle, TrafficWeights};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info};

/// Errors from the traffic router
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    #[error("traffic router unavailable: {0}")]
    Unavailable(String),

    #[error("invalid weight {0}, must be between 0 and 100")]
    InvalidWeight(u8),

    #[error("no listener for service '{0}'")]
    UnknownService(String),
}

/// Traffic router collaborator
#[async_trait]
pub trait TrafficRouter: Send + Sync {
    /// Puts `pool` behind the `color` slot of the service's listener
    async fn attach(
        &self,
        service: &str,
        color: PoolColor,
        pool: &PoolHandle,
    ) -> Result<(), RouterError>;

    /// Removes whatever pool sits behind the `color` slot
    async fn detach(&self, service: &str, color: PoolColor) -> Result<(), RouterError>;

    /// Sends `weight` percent to `color` and the remainder to the other slot
    async fn shift_traffic(
        &self,
        service: &str,
        color: PoolColor,
        weight: u8,
    ) -> Result<TrafficWeights, RouterError>;

    async fn current_weights(&self, service: &str) -> Result<TrafficWeights, RouterError>;

    /// Configures the listener's liveness probe for the `color` slot
    async fn register_health_check(
        &self,
        service: &str,
        color: PoolColor,
        check: &HealthCheckSpec,
    ) -> Result<(), RouterError>;
}

#[derive(Debug, Clone, Default)]
struct Listener {
    pools: HashMap<PoolColor, PoolHandle>,
    checks: HashMap<PoolColor, HealthCheckSpec>,
    weights: TrafficWeights,
    history: Vec<TrafficWeights>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShiftFaults {
    None,
    Next(u32),
    Always,
}

/// Listener bookkeeping held in memory
///
/// Every applied split is recorded so callers can audit the sequence of
/// weights a rollout went through.
pub struct InMemoryTrafficRouter {
    listeners: Mutex<HashMap<String, Listener>>,
    shift_faults: Mutex<ShiftFaults>,
    caps: Mutex<HashMap<PoolColor, u8>>,
}

impl InMemoryTrafficRouter {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            shift_faults: Mutex::new(ShiftFaults::None),
            caps: Mutex::new(HashMap::new()),
        }
    }

    /// Lets at most `max` percent reach `color`, whatever weight is asked for
    pub fn cap_weight(&self, color: PoolColor, max: u8) {
        self.caps.lock().insert(color, max);
    }

    /// Makes the next `count` shifts fail as unavailable
    pub fn fail_shifts(&self, count: u32) {
        *self.shift_faults.lock() = ShiftFaults::Next(count);
    }

    /// Makes every shift fail until `heal` is called
    pub fn fail_shifts_always(&self) {
        *self.shift_faults.lock() = ShiftFaults::Always;
    }

    pub fn heal(&self) {
        *self.shift_faults.lock() = ShiftFaults::None;
    }

    /// Every split applied to the service, oldest first
    pub fn history(&self, service: &str) -> Vec<TrafficWeights> {
        self.listeners
            .lock()
            .get(service)
            .map(|l| l.history.clone())
            .unwrap_or_default()
    }

    pub fn attached(&self, service: &str, color: PoolColor) -> Option<PoolHandle> {
        self.listeners
            .lock()
            .get(service)
            .and_then(|l| l.pools.get(&color).cloned())
    }

    pub fn health_check(&self, service: &str, color: PoolColor) -> Option<HealthCheckSpec> {
        self.listeners
            .lock()
            .get(service)
            .and_then(|l| l.checks.get(&color).cloned())
    }

    fn take_shift_fault(&self) -> bool {
        let mut faults = self.shift_faults.lock();
        match *faults {
            ShiftFaults::None => false,
            ShiftFaults::Always => true,
            ShiftFaults::Next(n) => {
                *faults = if n <= 1 {
                    ShiftFaults::None
                } else {
                    ShiftFaults::Next(n - 1)
                };
                n > 0
            }
        }
    }
}

impl Default for InMemoryTrafficRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrafficRouter for InMemoryTrafficRouter {
    async fn attach(
        &self,
        service: &str,
        color: PoolColor,
        pool: &PoolHandle,
    ) -> Result<(), RouterError> {
        let mut listeners = self.listeners.lock();
        let listener = listeners.entry(service.to_string()).or_default();
        listener.pools.insert(color, pool.clone());
        info!("Attached {} to {} slot of {}", pool, color, service);
        Ok(())
    }

    async fn detach(&self, service: &str, color: PoolColor) -> Result<(), RouterError> {
        let mut listeners = self.listeners.lock();
        let listener = listeners
            .get_mut(service)
            .ok_or_else(|| RouterError::UnknownService(service.to_string()))?;

        if let Some(pool) = listener.pools.remove(&color) {
            info!("Detached {} from {} slot of {}", pool, color, service);
        }
        listener.checks.remove(&color);
        Ok(())
    }

    async fn shift_traffic(
        &self,
        service: &str,
        color: PoolColor,
        weight: u8,
    ) -> Result<TrafficWeights, RouterError> {
        if weight > 100 {
            return Err(RouterError::InvalidWeight(weight));
        }
        if self.take_shift_fault() {
            return Err(RouterError::Unavailable(
                "simulated listener outage".to_string(),
            ));
        }

        let mut listeners = self.listeners.lock();
        let listener = listeners
            .get_mut(service)
            .ok_or_else(|| RouterError::UnknownService(service.to_string()))?;

        let weight = self
            .caps
            .lock()
            .get(&color)
            .map_or(weight, |max| weight.min(*max));
        let weights = TrafficWeights::with(color, weight);
        listener.weights = weights;
        listener.history.push(weights);
        debug!("Listener for {} now at {}", service, weights);
        Ok(weights)
    }

    async fn current_weights(&self, service: &str) -> Result<TrafficWeights, RouterError> {
        self.listeners
            .lock()
            .get(service)
            .map(|l| l.weights)
            .ok_or_else(|| RouterError::UnknownService(service.to_string()))
    }

    async fn register_health_check(
        &self,
        service: &str,
        color: PoolColor,
        check: &HealthCheckSpec,
    ) -> Result<(), RouterError> {
        let mut listeners = self.listeners.lock();
        let listener = listeners.entry(service.to_string()).or_default();
        listener.checks.insert(color, check.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shift_records_history() {
        let router = InMemoryTrafficRouter::new();
        router
            .attach("web", PoolColor::Blue, &PoolHandle::new("web-blue-1"))
            .await
            .unwrap();
        router
            .attach("web", PoolColor::Green, &PoolHandle::new("web-green-2"))
            .await
            .unwrap();

        for w in [30, 60, 100] {
            router.shift_traffic("web", PoolColor::Green, w).await.unwrap();
        }

        let history = router.history("web");
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|w| w.is_complementary()));
        assert_eq!(
            router.current_weights("web").await.unwrap(),
            TrafficWeights::all_on(PoolColor::Green)
        );
    }

    #[tokio::test]
    async fn test_invalid_weight_and_unknown_service() {
        let router = InMemoryTrafficRouter::new();
        assert!(matches!(
            router.shift_traffic("web", PoolColor::Green, 101).await,
            Err(RouterError::InvalidWeight(101))
        ));
        assert!(matches!(
            router.current_weights("web").await,
            Err(RouterError::UnknownService(_))
        ));
    }

    #[tokio::test]
    async fn test_shift_faults() {
        let router = InMemoryTrafficRouter::new();
        router
            .attach("web", PoolColor::Blue, &PoolHandle::new("p"))
            .await
            .unwrap();

        router.fail_shifts(2);
        assert!(router.shift_traffic("web", PoolColor::Blue, 100).await.is_err());
        assert!(router.shift_traffic("web", PoolColor::Blue, 100).await.is_err());
        assert!(router.shift_traffic("web", PoolColor::Blue, 100).await.is_ok());

        router.fail_shifts_always();
        assert!(router.shift_traffic("web", PoolColor::Blue, 100).await.is_err());
        router.heal();
        assert!(router.shift_traffic("web", PoolColor::Blue, 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_detach_clears_slot() {
        let router = InMemoryTrafficRouter::new();
        router
            .attach("web", PoolColor::Green, &PoolHandle::new("p"))
            .await
            .unwrap();
        router
            .register_health_check("web", PoolColor::Green, &HealthCheckSpec::default())
            .await
            .unwrap();
        router.detach("web", PoolColor::Green).await.unwrap();
        assert!(router.attached("web", PoolColor::Green).is_none());
        assert!(router.health_check("web", PoolColor::Green).is_none());
    }

    #[tokio::test]
    async fn test_capped_weight() {
        let router = InMemoryTrafficRouter::new();
        router
            .attach("web", PoolColor::Green, &PoolHandle::new("p"))
            .await
            .unwrap();
        router.cap_weight(PoolColor::Green, 90);

        let weights = router.shift_traffic("web", PoolColor::Green, 100).await.unwrap();
        assert_eq!(weights.green, 90);
        assert!(weights.is_complementary());

        // The other slot is unaffected
        let weights = router.shift_traffic("web", PoolColor::Blue, 100).await.unwrap();
        assert_eq!(weights, TrafficWeights::all_on(PoolColor::Blue));
    }
}
