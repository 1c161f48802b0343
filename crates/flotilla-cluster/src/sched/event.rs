use flotilla_server::actor::ActorHandle;

use crate::detector::MasterRef;
use crate::id::{ExecutorId, FrameworkId, OfferId, SlaveId, TaskId};
use crate::info::{MasterInfo, Offer};
use crate::slave::SlaveActor;
use crate::task::{Filters, Request, StatusUpdate, TaskInfo};

pub enum SchedulerEvent {
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

    // Inbound protocol messages from the master.
    Registered {
        framework_id: FrameworkId,
        master: MasterInfo,
    },
    Reregistered {
        framework_id: FrameworkId,
        master: MasterInfo,
    },
    ResourceOffers {
        /// Each offer is paired with the handle of its slave so that
        /// framework messages can later bypass the master.
        offers: Vec<(Offer, ActorHandle<SlaveActor>)>,
    },
    RescindOffer {
        offer_id: OfferId,
    },
    StatusUpdate {
        update: StatusUpdate,
        /// Whether the update must be acknowledged through the master so
        /// that the slave stops retransmitting it.
        needs_ack: bool,
    },
    LostSlave {
        slave_id: SlaveId,
    },
    FrameworkMessage {
        slave_id: SlaveId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    },
    Error {
        message: String,
    },

    // Commands enqueued by the driver facade.
    LaunchTasks {
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        filters: Filters,
    },
    KillTask {
        task_id: TaskId,
    },
    ReviveOffers,
    RequestResources {
        requests: Vec<Request>,
    },
    SendFrameworkMessage {
        executor_id: ExecutorId,
        slave_id: SlaveId,
        data: Vec<u8>,
    },
    Abort,
    Stop {
        failover: bool,
    },
}
