use std::collections::{HashMap, HashSet};

use flotilla_server::actor::ActorHandle;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::allocator::FilterId;
use crate::id::{ExecutorId, FrameworkId, OfferId, SlaveId, TaskId};
use crate::info::{FrameworkInfo, SlaveInfo};
use crate::resources::Resources;
use crate::sched::SchedulerActor;
use crate::slave::SlaveActor;
use crate::task::{Filters, Request, StatusUpdate, TaskInfo, TaskState};

/// A task snapshot reported by a slave when re-registering with a new
/// master incarnation.
#[derive(Debug, Clone)]
pub struct RunningTask {
    pub framework_id: FrameworkId,
    pub task_id: TaskId,
    pub executor_id: ExecutorId,
    pub name: String,
    pub resources: Resources,
    pub min_resources: Resources,
    pub state: TaskState,
}

pub enum MasterEvent {
    RegisterFramework {
        info: FrameworkInfo,
        from: ActorHandle<SchedulerActor>,
    },
    ReregisterFramework {
        framework_id: FrameworkId,
        info: FrameworkInfo,
        failover: bool,
        from: ActorHandle<SchedulerActor>,
    },
    UnregisterFramework {
        framework_id: FrameworkId,
        from: ActorHandle<SchedulerActor>,
    },
    DeactivateFramework {
        framework_id: FrameworkId,
        from: ActorHandle<SchedulerActor>,
    },
    ResourceRequest {
        framework_id: FrameworkId,
        requests: Vec<Request>,
    },
    LaunchTasks {
        framework_id: FrameworkId,
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        filters: Filters,
    },
    ReviveOffers {
        framework_id: FrameworkId,
    },
    KillTask {
        framework_id: FrameworkId,
        task_id: TaskId,
    },
    FrameworkToExecutor {
        framework_id: FrameworkId,
        slave_id: SlaveId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    RegisterSlave {
        info: SlaveInfo,
        from: ActorHandle<SlaveActor>,
    },
    ReregisterSlave {
        slave_id: SlaveId,
        info: SlaveInfo,
        tasks: Vec<RunningTask>,
        from: ActorHandle<SlaveActor>,
    },
    StatusUpdate {
        update: StatusUpdate,
        /// Whether the update came from a slave, in which case the
        /// framework acknowledges it through the master.
        from_slave: bool,
    },
    StatusUpdateAck {
        framework_id: FrameworkId,
        slave_id: SlaveId,
        task_id: TaskId,
        uuid: Uuid,
    },
    ExecutorToFramework {
        framework_id: FrameworkId,
        slave_id: SlaveId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    /// A linked framework driver terminated. Stale notifications carry an
    /// older epoch and are ignored.
    FrameworkExited {
        framework_id: FrameworkId,
        epoch: u64,
    },
    /// A linked slave terminated.
    SlaveExited {
        slave_id: SlaveId,
    },
    FrameworkFailoverTimeout {
        framework_id: FrameworkId,
        epoch: u64,
    },
    OfferExpired {
        offer_id: OfferId,
    },
    FilterExpired {
        framework_id: FrameworkId,
        filter_id: FilterId,
    },
    UpdateWhitelist {
        whitelist: Option<HashSet<String>>,
    },
    Batch,
    RegistryFailed,
    Inspect {
        reply: oneshot::Sender<MasterSnapshot>,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct MasterSnapshot {
    pub frameworks: HashMap<FrameworkId, FrameworkSnapshot>,
    pub slaves: HashMap<SlaveId, SlaveSnapshot>,
    pub offers: Vec<OfferId>,
}

#[derive(Debug, Clone)]
pub struct FrameworkSnapshot {
    pub active: bool,
    pub offers: Vec<OfferId>,
    pub tasks: HashMap<TaskId, TaskState>,
}

#[derive(Debug, Clone)]
pub struct SlaveSnapshot {
    pub hostname: String,
    /// Resources neither offered nor in use by tasks.
    pub available: Resources,
    pub in_use: Resources,
    pub observed: Resources,
}
