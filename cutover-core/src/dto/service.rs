//! Service status DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::traffic::{PoolColor, PoolHandle, TrafficWeights};

/// Live routing view of a deployment target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    /// Slot currently holding the serving pool
    pub incumbent_color: PoolColor,
    pub incumbent_pool: Option<PoolHandle>,
    pub weights: TrafficWeights,
    /// Deployment holding the service lease, if any
    pub in_flight_deployment: Option<Uuid>,
}
