use serde::{Deserialize, Serialize};

use crate::id::{ExecutorId, FrameworkId, OfferId, SlaveId};
use crate::resources::{ResourceHints, Resources};

/// Description of a framework, provided by the scheduler driver at
/// registration time.
#[derive(Debug, Clone, Default)]
pub struct FrameworkInfo {
    /// The framework identifier, set when failing over to an existing
    /// registration; empty on first registration.
    pub id: Option<FrameworkId>,
    pub name: String,
    pub user: String,
    /// How long the master keeps the framework's tasks and reservations
    /// after a disconnect, in seconds.
    pub failover_timeout: f64,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveInfo {
    pub hostname: String,
    /// Total resources; immutable for the lifetime of a slave record.
    pub resources: Resources,
    pub attributes: Resources,
}

#[derive(Debug, Clone)]
pub struct MasterInfo {
    /// The master incarnation; identifiers generated by this master carry
    /// it as a prefix.
    pub id: String,
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CommandInfo {
    pub value: String,
    pub environment: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    pub command: CommandInfo,
    pub resources: Resources,
    pub data: Vec<u8>,
}

/// A time-bounded grant of a specific slave's free resources to one
/// framework.
#[derive(Debug, Clone)]
pub struct Offer {
    pub offer_id: OfferId,
    pub framework_id: FrameworkId,
    pub slave_id: SlaveId,
    pub hostname: String,
    pub resources: ResourceHints,
    pub attributes: Resources,
}
