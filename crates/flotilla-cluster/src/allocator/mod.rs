mod core;
mod filter;
mod options;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

pub use filter::FilterId;
pub use options::AllocatorOptions;

use crate::id::{FrameworkId, SlaveId};
use crate::info::{FrameworkInfo, SlaveInfo};
use crate::resources::{ResourceHints, Resources};

use filter::FilterArena;

/// The Dominant Resource Fairness allocator.
///
/// The allocator tracks which resources are allocated to which framework and
/// which are still free on each slave, and decides which slave's free
/// resources to offer to which framework. It is owned by the master actor
/// and runs entirely within the master's execution context; decisions are
/// returned to the caller for dispatch.
///
/// The allocator never fails: illegal inputs are logged and ignored.
pub struct Allocator {
    options: AllocatorOptions,
    /// Frameworks eligible for offers. Deactivated frameworks are removed
    /// from this table but keep their `allocated` entry.
    frameworks: HashMap<FrameworkId, FrameworkInfo>,
    allocated: HashMap<FrameworkId, Resources>,
    slaves: HashMap<SlaveId, SlaveInfo>,
    allocatable: BTreeMap<SlaveId, Resources>,
    total: Resources,
    whitelist: Option<HashSet<String>>,
    /// Active refusal filters per framework. Entries reference the arena;
    /// a reference removed here leaves the arena entry to its scheduled
    /// expiry, which avoids reuse hazards.
    filters: HashMap<FrameworkId, Vec<FilterId>>,
    arena: FilterArena,
}

/// A single allocation decision: offer these per-slave resource bundles to
/// this framework.
#[derive(Debug)]
pub struct OfferDecision {
    pub framework_id: FrameworkId,
    pub offers: Vec<(SlaveId, ResourceHints)>,
}

/// A refusal filter that the caller must expire after `timeout` by invoking
/// [Allocator::expire_filter].
#[derive(Debug)]
pub struct FilterExpiry {
    pub framework_id: FrameworkId,
    pub filter_id: FilterId,
    pub timeout: Duration,
}
