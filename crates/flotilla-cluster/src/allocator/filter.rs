use std::collections::HashMap;

use crate::id::SlaveId;
use crate::resources::Resources;

/// A refusal memo: suppress re-offering of `resources` (or less) on
/// `slave_id` to the framework that declined them.
pub(crate) struct RefusedFilter {
    pub slave_id: SlaveId,
    pub resources: Resources,
}

impl RefusedFilter {
    pub fn matches(&self, slave_id: &SlaveId, resources: &Resources) -> bool {
        self.slave_id == *slave_id && self.resources.contains(resources)
    }
}

/// An identifier into the filter arena.
///
/// Expiry handlers hold an id rather than a reference; looking up an id that
/// was already removed is a no-op, so a filter dropped early (on revival or
/// framework removal) cannot be confused with a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

#[derive(Default)]
pub(crate) struct FilterArena {
    next_value: u64,
    entries: HashMap<u64, RefusedFilter>,
}

impl FilterArena {
    pub fn insert(&mut self, filter: RefusedFilter) -> FilterId {
        let id = FilterId(self.next_value);
        self.next_value += 1;
        self.entries.insert(id.0, filter);
        id
    }

    pub fn get(&self, id: FilterId) -> Option<&RefusedFilter> {
        self.entries.get(&id.0)
    }

    pub fn remove(&mut self, id: FilterId) -> Option<RefusedFilter> {
        self.entries.remove(&id.0)
    }
}
