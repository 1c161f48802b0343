mod core;
mod handler;

use uuid::Uuid;

use crate::detector::MasterRef;
use crate::slave::state::SlaveState;
use crate::slave::SlaveOptions;

/// The worker-node actor: registers with the master, hosts executors via
/// the launcher seam, tracks their tasks, and retransmits status updates
/// until they are acknowledged.
pub struct SlaveActor {
    pub(super) options: SlaveOptions,
    pub(super) state: SlaveState,
    pub(super) master: Option<MasterRef>,
    pub(super) connected: bool,
    /// Bumped on every master change; stale registration retries and exit
    /// notifications carry an older value and are ignored.
    pub(super) epoch: u64,
    /// The pid string under which this slave is discoverable by executor
    /// drivers in the same process.
    pub(super) pid_name: String,
}

impl SlaveActor {
    pub(super) fn make_pid_name(hostname: &str) -> String {
        format!("slave({})@{hostname}", Uuid::new_v4().simple())
    }
}
