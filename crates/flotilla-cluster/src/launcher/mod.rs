mod local;

use std::time::Duration;

use flotilla_server::actor::ActorHandle;

use crate::error::{ClusterError, ClusterResult};
use crate::id::{ExecutorId, FrameworkId};
use crate::info::{ExecutorInfo, FrameworkInfo};
use crate::slave::SlaveActor;

pub use local::LocalLauncher;

/// Everything a launcher needs to bring an executor up for a slave.
pub struct ExecutorLaunch {
    pub slave: ActorHandle<SlaveActor>,
    /// The pid string under which the slave is discoverable, handed to the
    /// executor through the environment.
    pub slave_pid: String,
    pub framework_id: FrameworkId,
    pub framework: FrameworkInfo,
    pub executor: ExecutorInfo,
    pub directory: String,
    pub shutdown_timeout: Duration,
}

/// The isolation seam of the slave.
///
/// Container-based isolation (cgroups and friends) lives behind this trait
/// and is provided by the embedding; the slave only asks for executors to
/// be launched and killed.
#[async_trait::async_trait]
pub trait ExecutorLauncher: Send + Sync + 'static {
    async fn launch_executor(&self, launch: ExecutorLaunch) -> ClusterResult<()>;

    async fn kill_executor(
        &self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
    ) -> ClusterResult<()>;
}

/// A launcher for deployments without an isolation module: every launch
/// fails and the affected tasks are reported lost.
pub struct NullLauncher;

#[async_trait::async_trait]
impl ExecutorLauncher for NullLauncher {
    async fn launch_executor(&self, launch: ExecutorLaunch) -> ClusterResult<()> {
        Err(ClusterError::InternalError(format!(
            "no isolation module configured to launch executor {}",
            launch.executor.executor_id
        )))
    }

    async fn kill_executor(
        &self,
        _framework_id: &FrameworkId,
        _executor_id: &ExecutorId,
    ) -> ClusterResult<()> {
        Ok(())
    }
}
