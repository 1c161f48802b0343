mod core;
mod handler;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flotilla_server::actor::ActorHandle;
use tokio::sync::watch;

use crate::detector::{MasterDetector, MasterRef};
use crate::id::{FrameworkId, OfferId, SlaveId};
use crate::sched::{DriverStatus, Scheduler, SchedulerDriverClient};
use crate::slave::SlaveActor;

pub(super) const REGISTRATION_RETRY_INTERVAL: Duration = Duration::from_secs(1);

pub struct SchedulerOptions {
    pub scheduler: Arc<dyn Scheduler>,
    pub framework: crate::info::FrameworkInfo,
    pub detector: MasterDetector,
    pub status: Arc<watch::Sender<DriverStatus>>,
}

/// The framework-side actor: owns all master communication and invokes the
/// scheduler callbacks serially.
pub struct SchedulerActor {
    pub(super) scheduler: Arc<dyn Scheduler>,
    pub(super) framework: crate::info::FrameworkInfo,
    pub(super) detector: MasterDetector,
    pub(super) status: Arc<watch::Sender<DriverStatus>>,
    pub(super) client: Option<SchedulerDriverClient>,
    pub(super) framework_id: Option<FrameworkId>,
    pub(super) master: Option<MasterRef>,
    pub(super) connected: bool,
    /// Whether the next registration fails over to an existing framework
    /// identifier.
    pub(super) failover: bool,
    pub(super) aborted: bool,
    /// Bumped on every master change; stale registration retries and exit
    /// notifications carry an older value and are ignored.
    pub(super) epoch: u64,
    /// Slave handles per offer, saved so that framework messages can reach
    /// slaves directly once tasks are launched.
    pub(super) saved_offers: HashMap<OfferId, HashMap<SlaveId, ActorHandle<SlaveActor>>>,
    pub(super) saved_slave_pids: HashMap<SlaveId, ActorHandle<SlaveActor>>,
}
