//! Connection health monitor. An unhealthy chat port raises the
//! recent-error arousal factor so the scheduler lowers its selection
//! threshold under degraded conditions.

use std::sync::Arc;

use crate::arousal::Arousal;
use crate::ports::ChatPort;

pub struct HealthMonitor {
    port: Arc<dyn ChatPort>,
    arousal: Arc<Arousal>,
}

impl HealthMonitor {
    pub fn new(port: Arc<dyn ChatPort>, arousal: Arc<Arousal>) -> Self {
        Self { port, arousal }
    }

    pub fn tick(&self) -> bool {
        let healthy = self.port.healthy();
        if !healthy {
            tracing::warn!("Chat connection unhealthy");
            self.arousal.record_error();
        }
        healthy
    }
}
