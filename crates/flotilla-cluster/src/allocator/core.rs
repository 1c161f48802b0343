use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use log::{debug, info, warn};

use crate::allocator::filter::{FilterArena, RefusedFilter};
use crate::allocator::{Allocator, AllocatorOptions, FilterExpiry, FilterId, OfferDecision};
use crate::id::{FrameworkId, SlaveId};
use crate::info::{FrameworkInfo, SlaveInfo};
use crate::resources::{ResourceHints, Resources, Value};
use crate::task::{Filters, Request};

impl Allocator {
    pub fn new(options: AllocatorOptions) -> Self {
        Self {
            options,
            frameworks: HashMap::new(),
            allocated: HashMap::new(),
            slaves: HashMap::new(),
            allocatable: BTreeMap::new(),
            total: Resources::new(),
            whitelist: None,
            filters: HashMap::new(),
            arena: FilterArena::default(),
        }
    }

    pub fn framework_added(
        &mut self,
        framework_id: FrameworkId,
        info: FrameworkInfo,
        used: Resources,
    ) -> Vec<OfferDecision> {
        info!("added framework {framework_id}");
        self.frameworks.insert(framework_id.clone(), info);
        if !used.is_empty() {
            *self.allocated.entry(framework_id).or_default() += &used;
        }
        self.allocate_all()
    }

    /// Re-activate a framework that failed over within its failover window.
    /// Its allocation survived deactivation, so only eligibility changes.
    pub fn framework_activated(
        &mut self,
        framework_id: FrameworkId,
        info: FrameworkInfo,
    ) -> Vec<OfferDecision> {
        info!("activated framework {framework_id}");
        self.frameworks.insert(framework_id, info);
        self.allocate_all()
    }

    pub fn framework_deactivated(&mut self, framework_id: &FrameworkId) {
        info!("deactivated framework {framework_id}");
        self.frameworks.remove(framework_id);
    }

    pub fn framework_removed(&mut self, framework_id: &FrameworkId) -> Vec<OfferDecision> {
        // Might not be in 'frameworks' because it was previously
        // deactivated and never re-added.
        self.frameworks.remove(framework_id);
        self.allocated.remove(framework_id);
        // Drop the filter references; the arena entries are left to their
        // scheduled expiries.
        self.filters.remove(framework_id);
        info!("removed framework {framework_id}");
        self.allocate_all()
    }

    pub fn slave_added(
        &mut self,
        slave_id: SlaveId,
        info: SlaveInfo,
        used: HashMap<FrameworkId, Resources>,
    ) -> Vec<OfferDecision> {
        if self.slaves.contains_key(&slave_id) {
            warn!("slave {slave_id} already added");
            return vec![];
        }
        self.total += &info.resources;
        let mut unused = info.resources.clone();
        for (framework_id, resources) in used {
            if !self.frameworks.contains_key(&framework_id) {
                warn!("slave {slave_id} reports resources used by unknown framework {framework_id}");
            }
            *self.allocated.entry(framework_id).or_default() += &resources;
            unused -= &resources;
        }
        info!(
            "added slave {slave_id} ({}) with {} (and {} available)",
            info.hostname, info.resources, unused
        );
        self.slaves.insert(slave_id.clone(), info);
        self.allocatable.insert(slave_id.clone(), unused);
        self.allocate(std::iter::once(slave_id))
    }

    pub fn slave_removed(&mut self, slave_id: &SlaveId) {
        let Some(info) = self.slaves.remove(slave_id) else {
            warn!("slave {slave_id} not found");
            return;
        };
        self.total -= &info.resources;
        self.allocatable.remove(slave_id);
        // Filters referencing this slave are left in place; they can no
        // longer match and their scheduled expiries clean them up.
        info!("removed slave {slave_id}");
    }

    pub fn update_whitelist(&mut self, whitelist: Option<HashSet<String>>) -> Vec<OfferDecision> {
        self.whitelist = whitelist;
        if let Some(whitelist) = &self.whitelist {
            info!("updated slave whitelist with {} hostnames", whitelist.len());
        } else {
            info!("cleared slave whitelist; offering to all slaves");
        }
        self.allocate_all()
    }

    pub fn resources_requested(&mut self, framework_id: &FrameworkId, requests: &[Request]) {
        info!(
            "received {} resource requests from framework {framework_id}",
            requests.len()
        );
    }

    /// A framework declined part of an offer. The resources go back to the
    /// slave's pool, and a refusal filter suppresses re-offering them to the
    /// same framework until the caller expires it.
    pub fn resources_unused(
        &mut self,
        framework_id: &FrameworkId,
        slave_id: &SlaveId,
        hints: &ResourceHints,
        filters: Option<&Filters>,
    ) -> (Vec<OfferDecision>, Option<FilterExpiry>) {
        let resources = &hints.expected;
        if resources.allocatable().is_empty() {
            return (vec![], None);
        }
        debug!("framework {framework_id} left {resources} unused on slave {slave_id}");

        match self.allocated.get_mut(framework_id) {
            Some(allocated) => *allocated -= resources,
            None => warn!("framework {framework_id} has no allocation to return"),
        }
        match self.allocatable.get_mut(slave_id) {
            Some(allocatable) => *allocatable += resources,
            None => warn!("slave {slave_id} not found"),
        }

        let refuse_seconds = match filters {
            Some(filters) => filters.refuse_seconds,
            None => self.options.default_refuse_seconds,
        };
        let expiry = if refuse_seconds > 0.0 {
            info!("framework {framework_id} filtered slave {slave_id} for {refuse_seconds} seconds");
            let filter_id = self.arena.insert(RefusedFilter {
                slave_id: slave_id.clone(),
                resources: resources.clone(),
            });
            self.filters
                .entry(framework_id.clone())
                .or_default()
                .push(filter_id);
            Some(FilterExpiry {
                framework_id: framework_id.clone(),
                filter_id,
                timeout: Duration::from_secs_f64(refuse_seconds),
            })
        } else {
            None
        };

        let decisions = self.allocate(std::iter::once(slave_id.clone()));
        (decisions, expiry)
    }

    /// A task or offer released its resources. No filter is installed.
    /// The framework or the slave may already be gone; each side is updated
    /// independently.
    pub fn resources_recovered(
        &mut self,
        framework_id: &FrameworkId,
        slave_id: &SlaveId,
        hints: &ResourceHints,
    ) -> Vec<OfferDecision> {
        let resources = &hints.expected;
        if resources.allocatable().is_empty() {
            return vec![];
        }
        if let Some(allocated) = self.allocated.get_mut(framework_id) {
            *allocated -= resources;
        }
        if let Some(allocatable) = self.allocatable.get_mut(slave_id) {
            *allocatable += resources;
            debug!("recovered {resources} on slave {slave_id} from framework {framework_id}");
            return self.allocate(std::iter::once(slave_id.clone()));
        }
        vec![]
    }

    /// Clear the refusal filters of a framework.
    /// Only the references are dropped here; the arena entries are deleted
    /// by their scheduled expiries.
    pub fn offers_revived(&mut self, framework_id: &FrameworkId) -> Vec<OfferDecision> {
        self.filters.remove(framework_id);
        info!("removed filters for framework {framework_id}");
        self.allocate_all()
    }

    /// The scheduled end of a refusal filter's life.
    pub fn expire_filter(
        &mut self,
        framework_id: &FrameworkId,
        filter_id: FilterId,
    ) -> Vec<OfferDecision> {
        // The framework might have been removed, in which case its filter
        // references are already gone.
        let referenced = self
            .filters
            .get_mut(framework_id)
            .map(|ids| {
                let len = ids.len();
                ids.retain(|id| *id != filter_id);
                ids.len() < len
            })
            .unwrap_or(false);
        if self.arena.remove(filter_id).is_some() && referenced {
            return self.allocate_all();
        }
        vec![]
    }

    /// The periodic allocation round, for frameworks that hoard offers.
    pub fn batch(&mut self) -> Vec<OfferDecision> {
        self.allocate_all()
    }

    pub fn allocated(&self, framework_id: &FrameworkId) -> Resources {
        self.allocated
            .get(framework_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total(&self) -> &Resources {
        &self.total
    }

    pub fn allocated_total(&self) -> Resources {
        let mut out = Resources::new();
        for resources in self.allocated.values() {
            out += resources;
        }
        out
    }

    pub fn allocatable_total(&self) -> Resources {
        let mut out = Resources::new();
        for resources in self.allocatable.values() {
            out += resources;
        }
        out
    }

    fn allocate_all(&mut self) -> Vec<OfferDecision> {
        let slave_ids = self.allocatable.keys().cloned().collect::<Vec<_>>();
        self.allocate(slave_ids)
    }

    /// One round of Dominant Resource Fairness over the given slaves.
    ///
    /// Frameworks are visited in ascending order of dominant share with a
    /// deterministic identifier tiebreak; each framework is offered every
    /// available, unfiltered slave bundle, and slaves taken by one framework
    /// are not offered to the next one in the same round.
    fn allocate(&mut self, slave_ids: impl IntoIterator<Item = SlaveId>) -> Vec<OfferDecision> {
        if self.frameworks.is_empty() {
            debug!("no frameworks to allocate resources to");
            return vec![];
        }

        let mut framework_ids = self.frameworks.keys().cloned().collect::<Vec<_>>();
        framework_ids.sort_by(|a, b| {
            let share_a = self.dominant_share(a);
            let share_b = self.dominant_share(b);
            share_a
                .partial_cmp(&share_b)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(b))
        });

        let mut available = BTreeMap::new();
        for slave_id in slave_ids {
            if !self.is_whitelisted(&slave_id) {
                continue;
            }
            let Some(resources) = self.allocatable.get(&slave_id) else {
                continue;
            };
            let resources = resources.allocatable();
            if resources.scalar("cpus") >= self.options.min_cpus
                && resources.scalar("mem") >= self.options.min_mem
            {
                available.insert(slave_id, resources);
            }
        }
        if available.is_empty() {
            debug!("no resources available to allocate");
            return vec![];
        }

        let mut decisions = vec![];
        for framework_id in framework_ids {
            let mut offerable = vec![];
            for (slave_id, resources) in &available {
                if self.filtered(&framework_id, slave_id, resources) {
                    debug!("filtered {resources} on slave {slave_id} for framework {framework_id}");
                    continue;
                }
                offerable.push((slave_id.clone(), ResourceHints::expected_only(resources.clone())));
            }
            if offerable.is_empty() {
                continue;
            }
            for (slave_id, hints) in &offerable {
                debug!(
                    "offering {} on slave {slave_id} to framework {framework_id}",
                    hints.expected
                );
                *self.allocated.entry(framework_id.clone()).or_default() += &hints.expected;
                if let Some(allocatable) = self.allocatable.get_mut(slave_id) {
                    *allocatable -= &hints.expected;
                }
                available.remove(slave_id);
            }
            decisions.push(OfferDecision {
                framework_id,
                offers: offerable,
            });
        }
        decisions
    }

    /// The dominant share of a framework: the maximum, over all scalar
    /// resources in the cluster total, of the framework's allocated fraction.
    fn dominant_share(&self, framework_id: &FrameworkId) -> f64 {
        let mut share: f64 = 0.0;
        let Some(allocated) = self.allocated.get(framework_id) else {
            return share;
        };
        for resource in self.total.iter() {
            if let Value::Scalar(total) = &resource.value {
                if *total > 0.0 {
                    share = share.max(allocated.scalar(&resource.name) / total);
                }
            }
        }
        share
    }

    fn filtered(
        &self,
        framework_id: &FrameworkId,
        slave_id: &SlaveId,
        resources: &Resources,
    ) -> bool {
        let Some(filter_ids) = self.filters.get(framework_id) else {
            return false;
        };
        filter_ids
            .iter()
            .filter_map(|id| self.arena.get(*id))
            .any(|filter| filter.matches(slave_id, resources))
    }

    fn is_whitelisted(&self, slave_id: &SlaveId) -> bool {
        let Some(whitelist) = &self.whitelist else {
            return true;
        };
        self.slaves
            .get(slave_id)
            .is_some_and(|info| whitelist.contains(&info.hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slave_info(hostname: &str, resources: &str) -> SlaveInfo {
        SlaveInfo {
            hostname: hostname.to_string(),
            resources: Resources::parse(resources).unwrap(),
            attributes: Resources::new(),
        }
    }

    fn framework_info(name: &str) -> FrameworkInfo {
        FrameworkInfo {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn hints(resources: &str) -> ResourceHints {
        ResourceHints::expected_only(Resources::parse(resources).unwrap())
    }

    #[test]
    fn test_drf_prefers_the_lower_dominant_share() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        // Framework A uses cpus=6, mem=100 (share 0.6) and framework B uses
        // cpus=0, mem=800 (share 0.8) out of cpus=10, mem=1000 in total.
        allocator.framework_added(
            FrameworkId::from("fA"),
            framework_info("a"),
            Resources::new(),
        );
        allocator.framework_added(
            FrameworkId::from("fB"),
            framework_info("b"),
            Resources::new(),
        );
        let used = HashMap::from([
            (
                FrameworkId::from("fA"),
                Resources::parse("cpus:6;mem:100").unwrap(),
            ),
            (
                FrameworkId::from("fB"),
                Resources::parse("cpus:0;mem:800").unwrap(),
            ),
        ]);
        let decisions =
            allocator.slave_added(SlaveId::from("s1"), slave_info("host1", "cpus:10;mem:1000"), used);

        // The free cpus=4, mem=100 must go to A (0.6 < 0.8), not B.
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].framework_id, FrameworkId::from("fA"));
        assert_eq!(decisions[0].offers.len(), 1);
        assert_eq!(
            decisions[0].offers[0].1.expected,
            Resources::parse("cpus:4;mem:100").unwrap()
        );
    }

    #[test]
    fn test_drf_tiebreak_is_lexicographic() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f2"),
            framework_info("second"),
            Resources::new(),
        );
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        let decisions = allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:4;mem:1024"),
            HashMap::new(),
        );
        // Both frameworks have share zero; the identifier breaks the tie.
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].framework_id, FrameworkId::from("f1"));
    }

    #[test]
    fn test_whole_slave_is_offered_to_one_framework() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.framework_added(
            FrameworkId::from("f2"),
            framework_info("second"),
            Resources::new(),
        );
        let decisions = allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:4;mem:1024"),
            HashMap::new(),
        );
        // A slave taken by the first framework is not offered to the second
        // in the same round.
        assert_eq!(decisions.len(), 1);
        assert_eq!(
            allocator.allocated(&FrameworkId::from("f1")),
            Resources::parse("cpus:4;mem:1024").unwrap()
        );
        assert!(allocator.allocated(&FrameworkId::from("f2")).is_empty());
    }

    #[test]
    fn test_refusal_filter_suppresses_and_expires() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        let decisions = allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:2;mem:100"),
            HashMap::new(),
        );
        assert_eq!(decisions.len(), 1);

        // Decline the whole offer with a five second refusal.
        let (decisions, expiry) = allocator.resources_unused(
            &FrameworkId::from("f1"),
            &SlaveId::from("s1"),
            &hints("cpus:2;mem:100"),
            Some(&Filters {
                refuse_seconds: 5.0,
            }),
        );
        assert!(decisions.is_empty());
        let expiry = expiry.expect("a refusal filter should be installed");
        assert_eq!(expiry.timeout, Duration::from_secs(5));

        // Batch rounds within the window keep the slave filtered.
        assert!(allocator.batch().is_empty());

        // At expiry the resources are offered again.
        let decisions = allocator.expire_filter(&expiry.framework_id, expiry.filter_id);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].framework_id, FrameworkId::from("f1"));
    }

    #[test]
    fn test_refuse_seconds_zero_installs_no_filter() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:2;mem:100"),
            HashMap::new(),
        );
        let (decisions, expiry) = allocator.resources_unused(
            &FrameworkId::from("f1"),
            &SlaveId::from("s1"),
            &hints("cpus:2;mem:100"),
            Some(&Filters {
                refuse_seconds: 0.0,
            }),
        );
        assert!(expiry.is_none());
        // Without a filter the same resources are offered right back.
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn test_smaller_bundle_is_also_filtered() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:2;mem:100"),
            HashMap::new(),
        );
        let (_, expiry) = allocator.resources_unused(
            &FrameworkId::from("f1"),
            &SlaveId::from("s1"),
            &hints("cpus:2;mem:100"),
            None,
        );
        assert!(expiry.is_some());

        // A second framework takes part of the slave, leaving a smaller
        // bundle; the filter covers it because it is contained in the
        // refused resources.
        let taken = Resources::parse("cpus:1;mem:50").unwrap();
        if let Some(allocatable) = allocator.allocatable.get_mut(&SlaveId::from("s1")) {
            *allocatable -= &taken;
        }
        assert!(allocator.batch().is_empty());
    }

    #[test]
    fn test_offers_revived_clears_filters() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:2;mem:100"),
            HashMap::new(),
        );
        let (_, expiry) = allocator.resources_unused(
            &FrameworkId::from("f1"),
            &SlaveId::from("s1"),
            &hints("cpus:2;mem:100"),
            None,
        );
        let expiry = expiry.unwrap();

        let decisions = allocator.offers_revived(&FrameworkId::from("f1"));
        assert_eq!(decisions.len(), 1);

        // The scheduled expiry still fires but is a no-op: the reference
        // was already dropped on revival.
        let (_, expiry2) = allocator.resources_unused(
            &FrameworkId::from("f1"),
            &SlaveId::from("s1"),
            &hints("cpus:2;mem:100"),
            None,
        );
        assert!(expiry2.is_some());
        assert!(allocator
            .expire_filter(&expiry.framework_id, expiry.filter_id)
            .is_empty());
        // The newer filter keeps the slave suppressed.
        assert!(allocator.batch().is_empty());
    }

    #[test]
    fn test_whitelist_gates_offers() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.update_whitelist(Some(HashSet::from(["host2".to_string()])));
        let decisions = allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:2;mem:100"),
            HashMap::new(),
        );
        assert!(decisions.is_empty());

        // Whitelisting the hostname releases the offer.
        let decisions =
            allocator.update_whitelist(Some(HashSet::from(["host1".to_string(), "host2".to_string()])));
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn test_slaves_below_the_offer_floor_are_skipped() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        let decisions = allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:0.005;mem:1000"),
            HashMap::new(),
        );
        assert!(decisions.is_empty());
        let decisions = allocator.slave_added(
            SlaveId::from("s2"),
            slave_info("host2", "cpus:4;mem:8"),
            HashMap::new(),
        );
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_framework_removed_releases_allocation() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:2;mem:100"),
            HashMap::new(),
        );
        assert!(!allocator.allocated(&FrameworkId::from("f1")).is_empty());
        allocator.framework_removed(&FrameworkId::from("f1"));
        assert!(allocator.allocated(&FrameworkId::from("f1")).is_empty());
    }

    #[test]
    fn test_conservation_across_allocation() {
        let mut allocator = Allocator::new(AllocatorOptions::default());
        allocator.framework_added(
            FrameworkId::from("f1"),
            framework_info("first"),
            Resources::new(),
        );
        allocator.slave_added(
            SlaveId::from("s1"),
            slave_info("host1", "cpus:8;mem:2048"),
            HashMap::new(),
        );
        allocator.slave_added(
            SlaveId::from("s2"),
            slave_info("host2", "cpus:2;mem:512"),
            HashMap::new(),
        );
        let sum = allocator.allocated_total() + &allocator.allocatable_total();
        assert_eq!(&sum, allocator.total());
    }
}
