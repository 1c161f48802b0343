use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::id::{ExecutorId, FrameworkId, SlaveId, TaskId};
use crate::info::{CommandInfo, ExecutorInfo};
use crate::resources::Resources;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Staging => "TASK_STAGING",
            TaskState::Starting => "TASK_STARTING",
            TaskState::Running => "TASK_RUNNING",
            TaskState::Finished => "TASK_FINISHED",
            TaskState::Failed => "TASK_FAILED",
            TaskState::Killed => "TASK_KILLED",
            TaskState::Lost => "TASK_LOST",
        };
        write!(f, "{name}")
    }
}

/// A task description submitted by a framework when accepting an offer.
/// Exactly one of `executor` and `command` must be set.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub slave_id: SlaveId,
    pub resources: Resources,
    /// A floor below `resources` that the master commits to reserving.
    pub min_resources: Resources,
    pub executor: Option<ExecutorInfo>,
    pub command: Option<CommandInfo>,
    pub data: Vec<u8>,
}

impl TaskInfo {
    /// A task is well-formed when it names either an executor or a command,
    /// but not both and not neither.
    pub fn has_valid_executor(&self) -> bool {
        self.executor.is_some() != self.command.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub message: Option<String>,
    pub data: Vec<u8>,
}

impl TaskStatus {
    pub fn new(task_id: TaskId, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            message: None,
            data: vec![],
        }
    }

    pub fn with_message(task_id: TaskId, state: TaskState, message: impl Into<String>) -> Self {
        Self {
            task_id,
            state,
            message: Some(message.into()),
            data: vec![],
        }
    }
}

/// A status update that must reach the framework at least once.
/// The unique identifier is echoed back in the acknowledgement and used by
/// the slave to stop retransmission.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub framework_id: FrameworkId,
    pub slave_id: Option<SlaveId>,
    pub executor_id: Option<ExecutorId>,
    pub status: TaskStatus,
    pub timestamp: f64,
    pub uuid: Uuid,
}

impl StatusUpdate {
    pub fn new(framework_id: FrameworkId, status: TaskStatus) -> Self {
        Self {
            framework_id,
            slave_id: None,
            executor_id: None,
            status,
            timestamp: now_secs(),
            uuid: Uuid::new_v4(),
        }
    }

    pub fn with_slave(mut self, slave_id: SlaveId) -> Self {
        self.slave_id = Some(slave_id);
        self
    }

    pub fn with_executor(mut self, executor_id: ExecutorId) -> Self {
        self.executor_id = Some(executor_id);
        self
    }
}

/// Options attached to a decline (or partial accept) of an offer.
#[derive(Debug, Clone)]
pub struct Filters {
    /// How long the refused resources are withheld from this framework on
    /// the same slave. Zero disables the filter.
    pub refuse_seconds: f64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            refuse_seconds: 5.0,
        }
    }
}

/// A resource request, surfaced to the allocator as advisory input.
#[derive(Debug, Clone)]
pub struct Request {
    pub slave_id: Option<SlaveId>,
    pub resources: Resources,
}

/// Wall-clock seconds since the Unix epoch, as used for status update
/// timestamps.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
