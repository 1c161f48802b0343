mod core;
mod handler;

use std::collections::HashMap;

use crate::allocator::Allocator;
use crate::id::{FrameworkId, SlaveId};
use crate::master::state::MasterState;
use crate::master::MasterOptions;

/// The central actor of the cluster: it owns the authoritative framework,
/// slave, offer, and task tables, enforces the no-over-allocation invariant,
/// routes protocol messages, and hosts the allocator.
pub struct MasterActor {
    pub(super) options: MasterOptions,
    pub(super) state: MasterState,
    pub(super) allocator: Allocator,
    /// Actor identities of registered scheduler drivers, for idempotent
    /// handling of re-sent registrations.
    pub(super) framework_pids: HashMap<u64, FrameworkId>,
    /// Actor identities of registered slaves.
    pub(super) slave_pids: HashMap<u64, SlaveId>,
}
