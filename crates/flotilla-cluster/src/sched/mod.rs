mod actor;
mod driver;
mod event;

pub use actor::SchedulerActor;
pub use driver::{DriverStatus, SchedulerDriver, SchedulerDriverClient};
pub use event::SchedulerEvent;

use crate::id::{ExecutorId, FrameworkId, OfferId, SlaveId};
use crate::info::{MasterInfo, Offer};
use crate::task::TaskStatus;

/// Framework-side callbacks, invoked serially on the driver's actor.
///
/// Implementations may call back into the driver through the provided
/// client, e.g. launching tasks from within [Scheduler::resource_offers].
pub trait Scheduler: Send + Sync + 'static {
    fn registered(
        &self,
        _driver: &SchedulerDriverClient,
        _framework_id: &FrameworkId,
        _master: &MasterInfo,
    ) {
    }

    fn reregistered(&self, _driver: &SchedulerDriverClient, _master: &MasterInfo) {}

    fn disconnected(&self, _driver: &SchedulerDriverClient) {}

    fn resource_offers(&self, _driver: &SchedulerDriverClient, _offers: Vec<Offer>) {}

    fn offer_rescinded(&self, _driver: &SchedulerDriverClient, _offer_id: &OfferId) {}

    fn status_update(&self, _driver: &SchedulerDriverClient, _status: TaskStatus) {}

    fn framework_message(
        &self,
        _driver: &SchedulerDriverClient,
        _slave_id: &SlaveId,
        _executor_id: &ExecutorId,
        _data: Vec<u8>,
    ) {
    }

    fn slave_lost(&self, _driver: &SchedulerDriverClient, _slave_id: &SlaveId) {}

    fn error(&self, _driver: &SchedulerDriverClient, _message: &str) {}
}
