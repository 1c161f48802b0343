use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::exec::{Executor, ExecutorDriver, ExecutorDriverClient, ExecutorEnvironment};
use crate::id::{ExecutorId, FrameworkId};
use crate::launcher::{ExecutorLaunch, ExecutorLauncher};

type ExecutorFactory = Arc<dyn Fn() -> Arc<dyn Executor> + Send + Sync>;

/// An in-process launcher: executors run as actors inside the slave's
/// process, driven by executor instances produced by a factory.
/// This is the launcher behind local clusters and the test suites.
pub struct LocalLauncher {
    factory: ExecutorFactory,
    drivers: Mutex<HashMap<(FrameworkId, ExecutorId), ExecutorDriverClient>>,
}

impl LocalLauncher {
    pub fn new(factory: impl Fn() -> Arc<dyn Executor> + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            drivers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl ExecutorLauncher for LocalLauncher {
    async fn launch_executor(&self, launch: ExecutorLaunch) -> ClusterResult<()> {
        debug!(
            "launching in-process executor {} for framework {}",
            launch.executor.executor_id, launch.framework_id
        );
        let environment = ExecutorEnvironment {
            slave_pid: launch.slave_pid.clone(),
            framework_id: launch.framework_id.clone(),
            executor_id: launch.executor.executor_id.clone(),
            directory: launch.directory.clone(),
            local: true,
            shutdown_timeout: launch.shutdown_timeout,
        };
        let mut driver = ExecutorDriver::new((self.factory)());
        driver.start_with(environment, launch.slave.clone());
        let client = driver
            .client()
            .cloned()
            .ok_or_else(|| ClusterError::InternalError("executor driver did not start".to_string()))?;
        let mut drivers = self
            .drivers
            .lock()
            .map_err(|e| ClusterError::InternalError(e.to_string()))?;
        drivers.insert(
            (launch.framework_id, launch.executor.executor_id.clone()),
            client,
        );
        Ok(())
    }

    async fn kill_executor(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
    ) -> ClusterResult<()> {
        let client = {
            let mut drivers = self
                .drivers
                .lock()
                .map_err(|e| ClusterError::InternalError(e.to_string()))?;
            drivers.remove(&(framework_id.clone(), executor_id.clone()))
        };
        if let Some(client) = client {
            debug!("stopping in-process executor {executor_id} of framework {framework_id}");
            client.stop();
        }
        Ok(())
    }
}
