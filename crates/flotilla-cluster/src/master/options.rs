use std::collections::HashSet;
use std::time::Duration;

use flotilla_common::config::AppConfig;
use uuid::Uuid;

use crate::error::{ClusterError, ClusterResult};
use crate::info::MasterInfo;
use crate::state::State;

pub struct MasterOptions {
    pub info: MasterInfo,
    /// The interval between periodic allocation rounds.
    pub batch: Duration,
    pub default_refuse_seconds: f64,
    pub min_cpus: f64,
    pub min_mem: f64,
    /// Outstanding offers are rescinded after this interval, when set.
    pub offer_timeout: Option<Duration>,
    pub whitelist: Option<HashSet<String>>,
    /// The state store used to persist the slave roster; no persistence
    /// when absent.
    pub registry: Option<State>,
    /// How many version races a registry write may lose before the master
    /// treats recovery as broken.
    pub registry_retry_count: usize,
    pub registry_retry_delay: Duration,
}

impl MasterOptions {
    pub fn try_new(config: &AppConfig) -> ClusterResult<Self> {
        let master = &config.master;
        if master.batch_seconds <= 0.0 {
            return Err(ClusterError::InvalidArgument(
                "master.batch_seconds must be positive".to_string(),
            ));
        }
        let whitelist = if master.whitelist.trim().is_empty() {
            None
        } else {
            Some(
                master
                    .whitelist
                    .split(',')
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect(),
            )
        };
        Ok(Self {
            info: MasterInfo {
                id: Uuid::new_v4().simple().to_string(),
                hostname: master.hostname.clone(),
                port: master.port,
            },
            batch: Duration::from_secs_f64(master.batch_seconds),
            default_refuse_seconds: master.default_refuse_seconds,
            min_cpus: master.min_cpus,
            min_mem: master.min_mem,
            offer_timeout: if master.offer_timeout_seconds > 0.0 {
                Some(Duration::from_secs_f64(master.offer_timeout_seconds))
            } else {
                None
            },
            whitelist,
            registry: None,
            registry_retry_count: master.registry_retry_count,
            registry_retry_delay: Duration::from_secs_f64(
                master.registry_retry_delay_seconds.max(0.0),
            ),
        })
    }

    pub fn with_registry(mut self, registry: State) -> Self {
        self.registry = Some(registry);
        self
    }
}
