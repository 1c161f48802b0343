use std::collections::{HashMap, HashSet};

use flotilla_server::actor::ActorHandle;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::id::{ExecutorId, FrameworkId, IdGenerator, OfferId, SlaveId, TaskId};
use crate::info::{FrameworkInfo, SlaveInfo};
use crate::resources::{ResourceHints, Resources};
use crate::sched::SchedulerActor;
use crate::slave::SlaveActor;
use crate::task::TaskState;

/// The master's authoritative tables, keyed by identifier.
/// Cross references between frameworks, slaves, offers, and tasks are by
/// identifier; each record owns only its own state.
pub struct MasterState {
    frameworks: HashMap<FrameworkId, Framework>,
    slaves: HashMap<SlaveId, Slave>,
    offers: HashMap<OfferId, OfferRecord>,
    tasks: HashMap<(FrameworkId, TaskId), Task>,
    framework_ids: IdGenerator<FrameworkId>,
    slave_ids: IdGenerator<SlaveId>,
    offer_ids: IdGenerator<OfferId>,
}

pub struct Framework {
    pub info: FrameworkInfo,
    pub pid: ActorHandle<SchedulerActor>,
    pub active: bool,
    pub offers: HashSet<OfferId>,
    pub tasks: HashSet<TaskId>,
    /// Bumped on every connection state change; stale failover timeouts
    /// and exit notifications carry an older value and are ignored.
    pub epoch: u64,
}

pub struct Slave {
    pub info: SlaveInfo,
    pub pid: ActorHandle<SlaveActor>,
    pub offers: HashSet<OfferId>,
    pub tasks: HashSet<(FrameworkId, TaskId)>,
    pub resources_offered: ResourceHints,
    pub resources_in_use: ResourceHints,
    pub resources_observed: Resources,
}

impl Slave {
    /// Resources neither offered nor in use by tasks.
    pub fn available(&self) -> Resources {
        self.info.resources.clone() - &self.resources_offered.expected
            - &self.resources_in_use.expected
    }
}

pub struct OfferRecord {
    pub framework_id: FrameworkId,
    pub slave_id: SlaveId,
    pub resources: ResourceHints,
    pub created_at: Instant,
}

pub struct Task {
    pub task_id: TaskId,
    pub framework_id: FrameworkId,
    pub slave_id: SlaveId,
    pub executor_id: ExecutorId,
    pub name: String,
    pub resources: Resources,
    pub min_resources: Resources,
    pub state: TaskState,
}

/// The slave roster persisted in the `"slaves"` state variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlaveRoster {
    pub slaves: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub slave_id: SlaveId,
    pub info: SlaveInfo,
}

impl MasterState {
    pub fn new(master_id: &str) -> Self {
        Self {
            frameworks: HashMap::new(),
            slaves: HashMap::new(),
            offers: HashMap::new(),
            tasks: HashMap::new(),
            framework_ids: IdGenerator::new(format!("{master_id}-F")),
            slave_ids: IdGenerator::new(format!("{master_id}-S")),
            offer_ids: IdGenerator::new(format!("{master_id}-O")),
        }
    }

    pub fn next_framework_id(&mut self) -> FrameworkId {
        self.framework_ids.next()
    }

    pub fn next_slave_id(&mut self) -> SlaveId {
        self.slave_ids.next()
    }

    pub fn add_framework(
        &mut self,
        framework_id: FrameworkId,
        info: FrameworkInfo,
        pid: ActorHandle<SchedulerActor>,
    ) {
        self.frameworks.insert(
            framework_id,
            Framework {
                info,
                pid,
                active: true,
                offers: HashSet::new(),
                tasks: HashSet::new(),
                epoch: 0,
            },
        );
    }

    pub fn framework(&self, framework_id: &FrameworkId) -> Option<&Framework> {
        self.frameworks.get(framework_id)
    }

    pub fn framework_mut(&mut self, framework_id: &FrameworkId) -> Option<&mut Framework> {
        self.frameworks.get_mut(framework_id)
    }

    pub fn remove_framework(&mut self, framework_id: &FrameworkId) -> Option<Framework> {
        self.frameworks.remove(framework_id)
    }

    pub fn add_slave(&mut self, slave_id: SlaveId, info: SlaveInfo, pid: ActorHandle<SlaveActor>) {
        self.slaves.insert(
            slave_id,
            Slave {
                info,
                pid,
                offers: HashSet::new(),
                tasks: HashSet::new(),
                resources_offered: ResourceHints::default(),
                resources_in_use: ResourceHints::default(),
                resources_observed: Resources::new(),
            },
        );
    }

    pub fn slave(&self, slave_id: &SlaveId) -> Option<&Slave> {
        self.slaves.get(slave_id)
    }

    pub fn slave_mut(&mut self, slave_id: &SlaveId) -> Option<&mut Slave> {
        self.slaves.get_mut(slave_id)
    }

    pub fn remove_slave(&mut self, slave_id: &SlaveId) -> Option<Slave> {
        self.slaves.remove(slave_id)
    }

    pub fn slave_ids(&self) -> impl Iterator<Item = &SlaveId> {
        self.slaves.keys()
    }

    pub fn slaves(&self) -> impl Iterator<Item = (&SlaveId, &Slave)> {
        self.slaves.iter()
    }

    pub fn frameworks(&self) -> impl Iterator<Item = (&FrameworkId, &Framework)> {
        self.frameworks.iter()
    }

    pub fn offer_ids(&self) -> impl Iterator<Item = &OfferId> {
        self.offers.keys()
    }

    /// Record an offer and reserve its resources on the slave.
    /// Both the framework and the slave must exist.
    pub fn add_offer(
        &mut self,
        framework_id: FrameworkId,
        slave_id: SlaveId,
        resources: ResourceHints,
    ) -> Option<OfferId> {
        let offer_id = self.offer_ids.next();
        let Some(framework) = self.frameworks.get_mut(&framework_id) else {
            warn!("cannot offer to unknown framework {framework_id}");
            return None;
        };
        let Some(slave) = self.slaves.get_mut(&slave_id) else {
            warn!("cannot offer resources of unknown slave {slave_id}");
            return None;
        };
        if !slave.available().contains(&resources.expected) {
            // Over-allocation means the bookkeeping is corrupt; crash early
            // rather than run with it.
            error!(
                "offer of {} exceeds the free resources of slave {slave_id}",
                resources.expected
            );
            panic!("over-allocation on slave {slave_id}");
        }
        framework.offers.insert(offer_id.clone());
        slave.offers.insert(offer_id.clone());
        slave.resources_offered += &resources;
        self.offers.insert(
            offer_id.clone(),
            OfferRecord {
                framework_id,
                slave_id,
                resources,
                created_at: Instant::now(),
            },
        );
        Some(offer_id)
    }

    pub fn offer(&self, offer_id: &OfferId) -> Option<&OfferRecord> {
        self.offers.get(offer_id)
    }

    /// Drop an offer and release its reservation, atomically across the
    /// framework and slave records.
    pub fn remove_offer(&mut self, offer_id: &OfferId) -> Option<OfferRecord> {
        let record = self.offers.remove(offer_id)?;
        if let Some(framework) = self.frameworks.get_mut(&record.framework_id) {
            framework.offers.remove(offer_id);
        }
        if let Some(slave) = self.slaves.get_mut(&record.slave_id) {
            slave.offers.remove(offer_id);
            slave.resources_offered -= &record.resources;
        }
        Some(record)
    }

    pub fn add_task(&mut self, task: Task) {
        if let Some(framework) = self.frameworks.get_mut(&task.framework_id) {
            framework.tasks.insert(task.task_id.clone());
        }
        if let Some(slave) = self.slaves.get_mut(&task.slave_id) {
            slave
                .tasks
                .insert((task.framework_id.clone(), task.task_id.clone()));
            slave.resources_in_use += &ResourceHints::new(
                task.resources.clone(),
                task.min_resources.clone(),
            );
        }
        self.tasks
            .insert((task.framework_id.clone(), task.task_id.clone()), task);
    }

    pub fn task(&self, framework_id: &FrameworkId, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(&(framework_id.clone(), task_id.clone()))
    }

    pub fn task_mut(
        &mut self,
        framework_id: &FrameworkId,
        task_id: &TaskId,
    ) -> Option<&mut Task> {
        self.tasks.get_mut(&(framework_id.clone(), task_id.clone()))
    }

    pub fn remove_task(&mut self, framework_id: &FrameworkId, task_id: &TaskId) -> Option<Task> {
        let task = self
            .tasks
            .remove(&(framework_id.clone(), task_id.clone()))?;
        if let Some(framework) = self.frameworks.get_mut(framework_id) {
            framework.tasks.remove(task_id);
        }
        if let Some(slave) = self.slaves.get_mut(&task.slave_id) {
            slave
                .tasks
                .remove(&(framework_id.clone(), task_id.clone()));
            slave.resources_in_use -= &ResourceHints::new(
                task.resources.clone(),
                task.min_resources.clone(),
            );
        }
        Some(task)
    }

    pub fn roster(&self) -> SlaveRoster {
        SlaveRoster {
            slaves: self
                .slaves
                .iter()
                .map(|(slave_id, slave)| RosterEntry {
                    slave_id: slave_id.clone(),
                    info: slave.info.clone(),
                })
                .collect(),
        }
    }
}
