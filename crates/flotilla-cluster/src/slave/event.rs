use flotilla_server::actor::ActorHandle;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::detector::MasterRef;
use crate::exec::ExecutorActor;
use crate::id::{ExecutorId, FrameworkId, SlaveId, TaskId};
use crate::info::FrameworkInfo;
use crate::task::{StatusUpdate, TaskInfo};

pub enum SlaveEvent {
    // Detector and master lifecycle.
    NewMasterDetected {
        master: MasterRef,
    },
    NoMasterDetected,
    MasterExited {
        epoch: u64,
    },
    DoReliableRegistration {
        epoch: u64,
    },
    Registered {
        slave_id: SlaveId,
    },
    Reregistered {
        slave_id: SlaveId,
    },

    // Protocol messages from the master.
    RunTask {
        framework_id: FrameworkId,
        framework: FrameworkInfo,
        task: TaskInfo,
    },
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    FrameworkToExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    ShutdownFramework {
        framework_id: FrameworkId,
    },
    StatusUpdateAcknowledged {
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: Uuid,
    },

    // Messages from executor drivers on this slave.
    RegisterExecutor {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        from: ActorHandle<ExecutorActor>,
    },
    StatusUpdate {
        update: StatusUpdate,
    },
    ExecutorToFramework {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },

    // Internal bookkeeping.
    ExecutorExited {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    },
    ExecutorLaunchFailed {
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        message: String,
    },
    StatusUpdateRetry {
        uuid: Uuid,
    },
    Inspect {
        reply: oneshot::Sender<SlaveSnapshot>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SlaveSnapshot {
    pub slave_id: Option<SlaveId>,
    pub connected: bool,
    pub executors: usize,
    pub queued_tasks: usize,
    pub active_tasks: usize,
    pub pending_updates: usize,
}
