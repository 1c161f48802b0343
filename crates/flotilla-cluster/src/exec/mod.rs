mod actor;
mod driver;
mod event;

pub use actor::ExecutorActor;
pub use driver::{ExecutorDriver, ExecutorDriverClient, ExecutorEnvironment};
pub use event::ExecutorEvent;

use crate::id::TaskId;
use crate::info::{ExecutorInfo, FrameworkInfo, SlaveInfo};
use crate::task::TaskInfo;

/// The environment variables an executor driver bootstraps from.
pub const ENV_SLAVE_PID: &str = "FLOTILLA_SLAVE_PID";
pub const ENV_FRAMEWORK_ID: &str = "FLOTILLA_FRAMEWORK_ID";
pub const ENV_EXECUTOR_ID: &str = "FLOTILLA_EXECUTOR_ID";
pub const ENV_DIRECTORY: &str = "FLOTILLA_DIRECTORY";
/// Presence-is-true: set when the executor runs inside the slave's process.
pub const ENV_LOCAL: &str = "FLOTILLA_LOCAL";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "FLOTILLA_EXECUTOR_SHUTDOWN_TIMEOUT_SECONDS";

/// Executor-side callbacks, invoked serially on the driver's actor.
pub trait Executor: Send + Sync + 'static {
    fn registered(
        &self,
        _driver: &ExecutorDriverClient,
        _executor: &ExecutorInfo,
        _framework: &FrameworkInfo,
        _slave: &SlaveInfo,
    ) {
    }

    fn launch_task(&self, _driver: &ExecutorDriverClient, _task: TaskInfo) {}

    fn kill_task(&self, _driver: &ExecutorDriverClient, _task_id: &TaskId) {}

    fn framework_message(&self, _driver: &ExecutorDriverClient, _data: Vec<u8>) {}

    fn shutdown(&self, _driver: &ExecutorDriverClient) {}

    /// The slave asked for a progress report.
    fn progress(&self, _driver: &ExecutorDriverClient) {}

    fn error(&self, _driver: &ExecutorDriverClient, _message: &str) {}
}
