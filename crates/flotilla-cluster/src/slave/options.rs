use std::sync::Arc;
use std::time::Duration;

use flotilla_common::config::AppConfig;

use crate::detector::MasterDetector;
use crate::error::ClusterResult;
use crate::info::SlaveInfo;
use crate::launcher::ExecutorLauncher;
use crate::resources::Resources;

pub struct SlaveOptions {
    pub info: SlaveInfo,
    pub detector: MasterDetector,
    /// The isolation seam: launches and kills executors on behalf of the
    /// slave.
    pub launcher: Arc<dyn ExecutorLauncher>,
    pub executor_directory: String,
    pub executor_shutdown_timeout: Duration,
    /// How often non-acknowledged status updates are retransmitted.
    pub status_update_retry_interval: Duration,
}

impl SlaveOptions {
    pub fn try_new(
        config: &AppConfig,
        detector: MasterDetector,
        launcher: Arc<dyn ExecutorLauncher>,
    ) -> ClusterResult<Self> {
        let slave = &config.slave;
        Ok(Self {
            info: SlaveInfo {
                hostname: slave.hostname.clone(),
                resources: Resources::parse(&slave.resources)?,
                attributes: Resources::new(),
            },
            detector,
            launcher,
            executor_directory: slave.executor_directory.clone(),
            executor_shutdown_timeout: Duration::from_secs_f64(
                slave.executor_shutdown_timeout_seconds.max(0.0),
            ),
            status_update_retry_interval: Duration::from_secs_f64(
                slave.status_update_retry_interval_seconds.max(0.1),
            ),
        })
    }
}
