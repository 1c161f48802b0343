use crate::id::{FrameworkId, SlaveId, TaskId};
use crate::info::{ExecutorInfo, FrameworkInfo, SlaveInfo};
use crate::task::{TaskInfo, TaskStatus};

pub enum ExecutorEvent {
    // Protocol messages from the slave.
    Registered {
        executor: ExecutorInfo,
        framework_id: FrameworkId,
        framework: FrameworkInfo,
        slave_id: SlaveId,
        slave: SlaveInfo,
    },
    RunTask {
        task: TaskInfo,
    },
    KillTask {
        task_id: TaskId,
    },
    FrameworkMessage {
        data: Vec<u8>,
    },
    Shutdown,
    ProgressRequest,

    // Internal bookkeeping.
    SlaveExited,

    // Commands enqueued by the driver facade.
    SendStatusUpdate {
        status: TaskStatus,
    },
    SendFrameworkMessage {
        data: Vec<u8>,
    },
    Abort,
    Stop,
}
