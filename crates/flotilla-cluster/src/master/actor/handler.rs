use std::collections::{HashMap, HashSet};
use std::time::Duration;

use flotilla_server::actor::{ActorAction, ActorContext, ActorHandle};
use log::{error, info, warn};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::allocator::{FilterExpiry, FilterId, OfferDecision};
use crate::id::{ExecutorId, FrameworkId, OfferId, SlaveId, TaskId};
use crate::info::{FrameworkInfo, Offer, SlaveInfo};
use crate::master::actor::MasterActor;
use crate::master::event::{FrameworkSnapshot, MasterSnapshot, RunningTask, SlaveSnapshot};
use crate::master::state::{SlaveRoster, Task};
use crate::master::MasterEvent;
use crate::resources::{ResourceHints, Resources};
use crate::sched::{SchedulerActor, SchedulerEvent};
use crate::slave::{SlaveActor, SlaveEvent};
use crate::task::{Filters, Request, StatusUpdate, TaskInfo, TaskState, TaskStatus};

impl MasterActor {
    pub(super) fn handle_register_framework(
        &mut self,
        ctx: &mut ActorContext<Self>,
        info: FrameworkInfo,
        from: ActorHandle<SchedulerActor>,
    ) -> ActorAction {
        if let Some(framework_id) = self.framework_pids.get(&from.id()).cloned() {
            // A re-sent registration from a driver that is still retrying.
            let _ = from.send(SchedulerEvent::Registered {
                framework_id,
                master: self.options.info.clone(),
            });
            return ActorAction::Continue;
        }
        let framework_id = self.state.next_framework_id();
        info!("registering framework {framework_id} ({})", info.name);
        self.state
            .add_framework(framework_id.clone(), info.clone(), from.clone());
        self.framework_pids.insert(from.id(), framework_id.clone());
        ctx.watch(
            &from,
            MasterEvent::FrameworkExited {
                framework_id: framework_id.clone(),
                epoch: 0,
            },
        );
        let _ = from.send(SchedulerEvent::Registered {
            framework_id: framework_id.clone(),
            master: self.options.info.clone(),
        });
        let decisions =
            self.allocator
                .framework_added(framework_id, info, Resources::new());
        self.dispatch_decisions(ctx, decisions);
        ActorAction::Continue
    }

    pub(super) fn handle_reregister_framework(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        info: FrameworkInfo,
        failover: bool,
        from: ActorHandle<SchedulerActor>,
    ) -> ActorAction {
        if self
            .framework_pids
            .get(&from.id())
            .is_some_and(|id| *id == framework_id)
            && self
                .state
                .framework(&framework_id)
                .is_some_and(|f| f.active && f.pid.id() == from.id())
        {
            // A re-sent re-registration from the already connected driver.
            let _ = from.send(SchedulerEvent::Reregistered {
                framework_id,
                master: self.options.info.clone(),
            });
            return ActorAction::Continue;
        }
        info!("re-registering framework {framework_id} (failover: {failover})");
        if let Some(framework) = self.state.framework_mut(&framework_id) {
            // Take over from the previous driver, cancelling any pending
            // failover timeout by bumping the epoch.
            let old_pid = framework.pid.clone();
            framework.epoch += 1;
            let epoch = framework.epoch;
            framework.pid = from.clone();
            framework.active = true;
            framework.info = info.clone();
            if old_pid.id() != from.id() {
                let _ = old_pid.send(SchedulerEvent::Error {
                    message: "Framework failed over".to_string(),
                });
            }
            self.framework_pids.insert(from.id(), framework_id.clone());
            ctx.watch(
                &from,
                MasterEvent::FrameworkExited {
                    framework_id: framework_id.clone(),
                    epoch,
                },
            );
            let _ = from.send(SchedulerEvent::Reregistered {
                framework_id: framework_id.clone(),
                master: self.options.info.clone(),
            });
            let decisions = self.allocator.framework_activated(framework_id, info);
            self.dispatch_decisions(ctx, decisions);
        } else {
            // The framework is unknown to this master incarnation (master
            // failover); adopt it under its existing identifier.
            self.state
                .add_framework(framework_id.clone(), info.clone(), from.clone());
            self.framework_pids.insert(from.id(), framework_id.clone());
            ctx.watch(
                &from,
                MasterEvent::FrameworkExited {
                    framework_id: framework_id.clone(),
                    epoch: 0,
                },
            );
            let _ = from.send(SchedulerEvent::Reregistered {
                framework_id: framework_id.clone(),
                master: self.options.info.clone(),
            });
            let decisions = self.allocator.framework_added(
                framework_id,
                info,
                Resources::new(),
            );
            self.dispatch_decisions(ctx, decisions);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_unregister_framework(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        from: ActorHandle<SchedulerActor>,
    ) -> ActorAction {
        // Only the currently registered driver may tear the framework
        // down; a failed-over predecessor must not.
        if !self.is_current_pid(&framework_id, &from) {
            warn!("ignoring unregistration of framework {framework_id} from a stale driver");
            return ActorAction::Continue;
        }
        info!("unregistering framework {framework_id}");
        self.remove_framework(ctx, &framework_id);
        ActorAction::Continue
    }

    pub(super) fn handle_deactivate_framework(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        from: ActorHandle<SchedulerActor>,
    ) -> ActorAction {
        if !self.is_current_pid(&framework_id, &from) {
            warn!("ignoring deactivation of framework {framework_id} from a stale driver");
            return ActorAction::Continue;
        }
        self.deactivate_framework(ctx, &framework_id);
        ActorAction::Continue
    }

    fn is_current_pid(&self, framework_id: &FrameworkId, from: &ActorHandle<SchedulerActor>) -> bool {
        self.state
            .framework(framework_id)
            .is_some_and(|f| f.pid.id() == from.id())
    }

    pub(super) fn handle_framework_exited(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        epoch: u64,
    ) -> ActorAction {
        let current = self.state.framework(&framework_id).map(|f| f.epoch);
        if current == Some(epoch) {
            info!("framework {framework_id} disconnected");
            self.deactivate_framework(ctx, &framework_id);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_framework_failover_timeout(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        epoch: u64,
    ) -> ActorAction {
        let expired = self
            .state
            .framework(&framework_id)
            .is_some_and(|f| !f.active && f.epoch == epoch);
        if expired {
            info!("framework {framework_id} failover timeout elapsed");
            self.remove_framework(ctx, &framework_id);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_resource_request(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        requests: Vec<Request>,
    ) -> ActorAction {
        self.allocator.resources_requested(&framework_id, &requests);
        ActorAction::Continue
    }

    pub(super) fn handle_launch_tasks(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        filters: Filters,
    ) -> ActorAction {
        if self.state.framework(&framework_id).is_none() {
            warn!("launch from unknown framework {framework_id}");
            return ActorAction::Continue;
        }
        let valid = self
            .state
            .offer(&offer_id)
            .is_some_and(|offer| offer.framework_id == framework_id);
        if !valid {
            // The offer may have been rescinded, already used, or lost to a
            // concurrent launch; every task in it is reported lost.
            warn!("framework {framework_id} used unknown offer {offer_id}");
            for task in tasks {
                self.send_lost(&framework_id, &task.task_id, None, "Offer is no longer valid");
            }
            return ActorAction::Continue;
        }
        let Some(offer) = self.state.remove_offer(&offer_id) else {
            return ActorAction::Continue;
        };
        let Some(slave) = self.state.slave(&offer.slave_id) else {
            warn!("offer {offer_id} refers to unknown slave {}", offer.slave_id);
            for task in tasks {
                self.send_lost(&framework_id, &task.task_id, None, "Slave is no longer valid");
            }
            return ActorAction::Continue;
        };
        let slave_pid = slave.pid.clone();
        let framework_info = self
            .state
            .framework(&framework_id)
            .map(|f| f.info.clone())
            .unwrap_or_default();

        let mut used = ResourceHints::default();
        for task in tasks {
            let message = if task.slave_id != offer.slave_id {
                Some("Task uses an invalid slave")
            } else if !task.has_valid_executor() {
                Some("TaskInfo must have either an 'executor' or a 'command'")
            } else if !task.resources.contains(&task.min_resources) {
                Some("Task min_resources exceed its resources")
            } else if self.state.task(&framework_id, &task.task_id).is_some() {
                Some("Task has duplicate ID")
            } else if !offer
                .resources
                .expected
                .contains(&(used.expected.clone() + &task.resources))
            {
                Some("Task uses more resources than offered")
            } else {
                None
            };
            if let Some(message) = message {
                warn!(
                    "refusing task {} of framework {framework_id}: {message}",
                    task.task_id
                );
                self.send_lost(&framework_id, &task.task_id, Some(offer.slave_id.clone()), message);
                continue;
            }

            let executor_id = task
                .executor
                .as_ref()
                .map(|e| e.executor_id.clone())
                .unwrap_or_else(|| ExecutorId::from(task.task_id.as_str()));
            info!(
                "launching task {} of framework {framework_id} on slave {}",
                task.task_id, offer.slave_id
            );
            used += &ResourceHints::new(task.resources.clone(), task.min_resources.clone());
            self.state.add_task(Task {
                task_id: task.task_id.clone(),
                framework_id: framework_id.clone(),
                slave_id: offer.slave_id.clone(),
                executor_id,
                name: task.name.clone(),
                resources: task.resources.clone(),
                min_resources: task.min_resources.clone(),
                state: TaskState::Staging,
            });
            let _ = slave_pid.send(SlaveEvent::RunTask {
                framework_id: framework_id.clone(),
                framework: framework_info.clone(),
                task,
            });
        }

        let mut remainder = offer.resources.clone();
        remainder -= &used;
        let (decisions, expiry) = self.allocator.resources_unused(
            &framework_id,
            &offer.slave_id,
            &remainder,
            Some(&filters),
        );
        self.schedule_filter_expiry(ctx, expiry);
        self.dispatch_decisions(ctx, decisions);
        ActorAction::Continue
    }

    pub(super) fn handle_revive_offers(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
    ) -> ActorAction {
        let decisions = self.allocator.offers_revived(&framework_id);
        self.dispatch_decisions(ctx, decisions);
        ActorAction::Continue
    }

    pub(super) fn handle_kill_task(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        task_id: TaskId,
    ) -> ActorAction {
        let Some(task) = self.state.task(&framework_id, &task_id) else {
            warn!("cannot kill unknown task {task_id} of framework {framework_id}");
            self.send_lost(&framework_id, &task_id, None, "Task is unknown");
            return ActorAction::Continue;
        };
        let slave_id = task.slave_id.clone();
        match self.state.slave(&slave_id) {
            Some(slave) => {
                let _ = slave.pid.send(SlaveEvent::KillTask {
                    framework_id,
                    task_id,
                });
            }
            None => {
                self.send_lost(&framework_id, &task_id, Some(slave_id), "Slave is unknown");
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_framework_to_executor(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        slave_id: SlaveId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        match self.state.slave(&slave_id) {
            Some(slave) => {
                let _ = slave.pid.send(SlaveEvent::FrameworkToExecutor {
                    framework_id,
                    executor_id,
                    data,
                });
            }
            None => warn!("dropping framework message for unknown slave {slave_id}"),
        }
        ActorAction::Continue
    }

    pub(super) fn handle_executor_to_framework(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        slave_id: SlaveId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        match self.state.framework(&framework_id) {
            Some(framework) => {
                let _ = framework.pid.send(SchedulerEvent::FrameworkMessage {
                    slave_id,
                    executor_id,
                    data,
                });
            }
            None => warn!("dropping executor message for unknown framework {framework_id}"),
        }
        ActorAction::Continue
    }

    pub(super) fn handle_register_slave(
        &mut self,
        ctx: &mut ActorContext<Self>,
        info: SlaveInfo,
        from: ActorHandle<SlaveActor>,
    ) -> ActorAction {
        if let Some(slave_id) = self.slave_pids.get(&from.id()).cloned() {
            let _ = from.send(SlaveEvent::Registered { slave_id });
            return ActorAction::Continue;
        }
        let slave_id = self.state.next_slave_id();
        info!("registering slave {slave_id} at {}", info.hostname);
        self.state.add_slave(slave_id.clone(), info.clone(), from.clone());
        self.slave_pids.insert(from.id(), slave_id.clone());
        ctx.watch(
            &from,
            MasterEvent::SlaveExited {
                slave_id: slave_id.clone(),
            },
        );
        let _ = from.send(SlaveEvent::Registered {
            slave_id: slave_id.clone(),
        });
        let decisions = self
            .allocator
            .slave_added(slave_id, info, HashMap::new());
        self.dispatch_decisions(ctx, decisions);
        self.persist_registry(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_reregister_slave(
        &mut self,
        ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
        info: SlaveInfo,
        tasks: Vec<RunningTask>,
        from: ActorHandle<SlaveActor>,
    ) -> ActorAction {
        if self.state.slave(&slave_id).is_some() {
            // A re-sent re-registration; refresh the pid and reply.
            if let Some(slave) = self.state.slave_mut(&slave_id) {
                slave.pid = from.clone();
            }
            self.slave_pids.insert(from.id(), slave_id.clone());
            let _ = from.send(SlaveEvent::Reregistered { slave_id });
            return ActorAction::Continue;
        }
        info!(
            "re-registering slave {slave_id} at {} with {} tasks",
            info.hostname,
            tasks.len()
        );
        self.state.add_slave(slave_id.clone(), info.clone(), from.clone());
        self.slave_pids.insert(from.id(), slave_id.clone());
        ctx.watch(
            &from,
            MasterEvent::SlaveExited {
                slave_id: slave_id.clone(),
            },
        );

        // Reconcile: adopt tasks of known frameworks and tell the slave to
        // shut down the frameworks this master has never heard of.
        let mut used: HashMap<FrameworkId, Resources> = HashMap::new();
        let mut unknown: HashSet<FrameworkId> = HashSet::new();
        for task in tasks {
            if self.state.framework(&task.framework_id).is_none() {
                unknown.insert(task.framework_id);
                continue;
            }
            *used.entry(task.framework_id.clone()).or_default() += &task.resources;
            self.state.add_task(Task {
                task_id: task.task_id,
                framework_id: task.framework_id,
                slave_id: slave_id.clone(),
                executor_id: task.executor_id,
                name: task.name,
                resources: task.resources,
                min_resources: task.min_resources,
                state: task.state,
            });
        }
        for framework_id in unknown {
            warn!("slave {slave_id} reports tasks of unknown framework {framework_id}");
            let _ = from.send(SlaveEvent::ShutdownFramework { framework_id });
        }
        let _ = from.send(SlaveEvent::Reregistered {
            slave_id: slave_id.clone(),
        });
        let decisions = self.allocator.slave_added(slave_id, info, used);
        self.dispatch_decisions(ctx, decisions);
        self.persist_registry(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_slave_exited(
        &mut self,
        ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
    ) -> ActorAction {
        let Some(slave) = self.state.slave(&slave_id) else {
            return ActorAction::Continue;
        };
        info!("slave {slave_id} disconnected; removing it");
        let offer_ids = slave.offers.iter().cloned().collect::<Vec<_>>();
        let task_keys = slave.tasks.iter().cloned().collect::<Vec<_>>();

        // Remove the slave from the allocator first so that recovered
        // resources are not immediately re-offered on the dead slave.
        self.allocator.slave_removed(&slave_id);

        for offer_id in offer_ids {
            if let Some(offer) = self.state.remove_offer(&offer_id) {
                if let Some(framework) = self.state.framework(&offer.framework_id) {
                    let _ = framework.pid.send(SchedulerEvent::RescindOffer {
                        offer_id: offer_id.clone(),
                    });
                }
                self.allocator.resources_recovered(
                    &offer.framework_id,
                    &slave_id,
                    &offer.resources,
                );
            }
        }
        for (framework_id, task_id) in task_keys {
            if let Some(task) = self.state.remove_task(&framework_id, &task_id) {
                self.allocator.resources_recovered(
                    &framework_id,
                    &slave_id,
                    &ResourceHints::new(task.resources, task.min_resources),
                );
                self.send_lost(
                    &framework_id,
                    &task_id,
                    Some(slave_id.clone()),
                    "Slave was lost",
                );
            }
        }
        self.state.remove_slave(&slave_id);
        for (_, framework) in self.state.frameworks() {
            if framework.active {
                let _ = framework.pid.send(SchedulerEvent::LostSlave {
                    slave_id: slave_id.clone(),
                });
            }
        }
        self.persist_registry(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_status_update(
        &mut self,
        ctx: &mut ActorContext<Self>,
        update: StatusUpdate,
        from_slave: bool,
    ) -> ActorAction {
        let framework_id = update.framework_id.clone();
        let task_id = update.status.task_id.clone();
        info!(
            "status update: task {task_id} of framework {framework_id} is now in state {}",
            update.status.state
        );
        if self.state.task(&framework_id, &task_id).is_some() {
            if update.status.state.is_terminal() {
                if let Some(task) = self.state.remove_task(&framework_id, &task_id) {
                    let decisions = self.allocator.resources_recovered(
                        &framework_id,
                        &task.slave_id,
                        &ResourceHints::new(task.resources, task.min_resources),
                    );
                    self.dispatch_decisions(ctx, decisions);
                }
            } else if let Some(task) = self.state.task_mut(&framework_id, &task_id) {
                task.state = update.status.state;
            }
        }
        match self.state.framework(&framework_id) {
            Some(framework) if framework.active => {
                let _ = framework.pid.send(SchedulerEvent::StatusUpdate {
                    update,
                    needs_ack: from_slave,
                });
            }
            _ => warn!("dropping status update for inactive framework {framework_id}"),
        }
        ActorAction::Continue
    }

    pub(super) fn handle_status_update_ack(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        slave_id: SlaveId,
        task_id: TaskId,
        uuid: Uuid,
    ) -> ActorAction {
        match self.state.slave(&slave_id) {
            Some(slave) => {
                let _ = slave.pid.send(SlaveEvent::StatusUpdateAcknowledged {
                    framework_id,
                    task_id,
                    uuid,
                });
            }
            None => warn!("dropping status update acknowledgement for unknown slave {slave_id}"),
        }
        ActorAction::Continue
    }

    pub(super) fn handle_offer_expired(
        &mut self,
        ctx: &mut ActorContext<Self>,
        offer_id: OfferId,
    ) -> ActorAction {
        let Some(offer) = self.state.remove_offer(&offer_id) else {
            return ActorAction::Continue;
        };
        info!(
            "rescinding offer {offer_id} that expired after {:?}",
            offer.created_at.elapsed()
        );
        if let Some(framework) = self.state.framework(&offer.framework_id) {
            let _ = framework.pid.send(SchedulerEvent::RescindOffer {
                offer_id: offer_id.clone(),
            });
        }
        let decisions = self.allocator.resources_recovered(
            &offer.framework_id,
            &offer.slave_id,
            &offer.resources,
        );
        self.dispatch_decisions(ctx, decisions);
        ActorAction::Continue
    }

    pub(super) fn handle_filter_expired(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        filter_id: FilterId,
    ) -> ActorAction {
        let decisions = self.allocator.expire_filter(&framework_id, filter_id);
        self.dispatch_decisions(ctx, decisions);
        ActorAction::Continue
    }

    pub(super) fn handle_update_whitelist(
        &mut self,
        ctx: &mut ActorContext<Self>,
        whitelist: Option<HashSet<String>>,
    ) -> ActorAction {
        let decisions = self.allocator.update_whitelist(whitelist);
        self.dispatch_decisions(ctx, decisions);
        ActorAction::Continue
    }

    pub(super) fn handle_batch(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        let decisions = self.allocator.batch();
        self.dispatch_decisions(ctx, decisions);
        ctx.send_with_delay(MasterEvent::Batch, self.options.batch);
        ActorAction::Continue
    }

    pub(super) fn handle_inspect(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        reply: oneshot::Sender<MasterSnapshot>,
    ) -> ActorAction {
        let mut frameworks = HashMap::new();
        for (framework_id, framework) in self.state.frameworks() {
            let mut tasks = HashMap::new();
            for task_id in &framework.tasks {
                if let Some(task) = self.state.task(framework_id, task_id) {
                    tasks.insert(task_id.clone(), task.state);
                }
            }
            frameworks.insert(
                framework_id.clone(),
                FrameworkSnapshot {
                    active: framework.active,
                    offers: framework.offers.iter().cloned().collect(),
                    tasks,
                },
            );
        }
        let slaves = self
            .state
            .slaves()
            .map(|(slave_id, slave)| {
                (
                    slave_id.clone(),
                    SlaveSnapshot {
                        hostname: slave.info.hostname.clone(),
                        available: slave.available(),
                        in_use: slave.resources_in_use.expected.clone(),
                        observed: slave.resources_observed.clone(),
                    },
                )
            })
            .collect();
        let snapshot = MasterSnapshot {
            frameworks,
            slaves,
            offers: self.state.offer_ids().cloned().collect(),
        };
        let _ = reply.send(snapshot);
        ActorAction::Continue
    }

    /// Turn allocator decisions into offer records and `ResourceOffers`
    /// messages to the frameworks.
    fn dispatch_decisions(&mut self, ctx: &mut ActorContext<Self>, decisions: Vec<OfferDecision>) {
        for decision in decisions {
            let Some(framework) = self.state.framework(&decision.framework_id) else {
                warn!(
                    "dropping offer decision for unknown framework {}",
                    decision.framework_id
                );
                continue;
            };
            let pid = framework.pid.clone();
            let mut offers = vec![];
            for (slave_id, resources) in decision.offers {
                let Some(slave) = self.state.slave(&slave_id) else {
                    warn!("dropping offer on unknown slave {slave_id}");
                    continue;
                };
                let hostname = slave.info.hostname.clone();
                let attributes = slave.info.attributes.clone();
                let slave_pid = slave.pid.clone();
                let Some(offer_id) = self.state.add_offer(
                    decision.framework_id.clone(),
                    slave_id.clone(),
                    resources.clone(),
                ) else {
                    continue;
                };
                if let Some(timeout) = self.options.offer_timeout {
                    ctx.send_with_delay(
                        MasterEvent::OfferExpired {
                            offer_id: offer_id.clone(),
                        },
                        timeout,
                    );
                }
                offers.push((
                    Offer {
                        offer_id,
                        framework_id: decision.framework_id.clone(),
                        slave_id,
                        hostname,
                        resources,
                        attributes,
                    },
                    slave_pid,
                ));
            }
            if !offers.is_empty() {
                let _ = pid.send(SchedulerEvent::ResourceOffers { offers });
            }
        }
    }

    fn schedule_filter_expiry(&mut self, ctx: &mut ActorContext<Self>, expiry: Option<FilterExpiry>) {
        if let Some(expiry) = expiry {
            ctx.send_with_delay(
                MasterEvent::FilterExpired {
                    framework_id: expiry.framework_id,
                    filter_id: expiry.filter_id,
                },
                expiry.timeout,
            );
        }
    }

    /// Deliver a master-generated `TASK_LOST` update to the framework.
    /// These updates are not retransmitted and need no acknowledgement.
    fn send_lost(
        &mut self,
        framework_id: &FrameworkId,
        task_id: &TaskId,
        slave_id: Option<SlaveId>,
        message: &str,
    ) {
        let Some(framework) = self.state.framework(framework_id) else {
            return;
        };
        let mut update = StatusUpdate::new(
            framework_id.clone(),
            TaskStatus::with_message(task_id.clone(), TaskState::Lost, message),
        );
        update.slave_id = slave_id;
        let _ = framework.pid.send(SchedulerEvent::StatusUpdate {
            update,
            needs_ack: false,
        });
    }

    /// Mark a framework inactive, rescind its offers, and start the
    /// failover timer. Resources in use by its tasks stay reserved until
    /// the timer elapses.
    fn deactivate_framework(&mut self, ctx: &mut ActorContext<Self>, framework_id: &FrameworkId) {
        let Some(framework) = self.state.framework_mut(framework_id) else {
            warn!("cannot deactivate unknown framework {framework_id}");
            return;
        };
        if !framework.active {
            return;
        }
        framework.active = false;
        framework.epoch += 1;
        let epoch = framework.epoch;
        let pid = framework.pid.clone();
        let offer_ids = framework.offers.iter().cloned().collect::<Vec<_>>();
        let failover_timeout = framework.info.failover_timeout.max(0.0);
        info!(
            "deactivating framework {framework_id} (failover timeout: {failover_timeout} seconds)"
        );
        for offer_id in offer_ids {
            if let Some(offer) = self.state.remove_offer(&offer_id) {
                let _ = pid.send(SchedulerEvent::RescindOffer { offer_id });
                let decisions = self.allocator.resources_recovered(
                    framework_id,
                    &offer.slave_id,
                    &offer.resources,
                );
                self.dispatch_decisions(ctx, decisions);
            }
        }
        self.allocator.framework_deactivated(framework_id);
        ctx.send_with_delay(
            MasterEvent::FrameworkFailoverTimeout {
                framework_id: framework_id.clone(),
                epoch,
            },
            Duration::from_secs_f64(failover_timeout),
        );
    }

    /// Remove a framework entirely: rescind offers, shut its executors
    /// down on every slave, and recover all of its resources.
    fn remove_framework(&mut self, ctx: &mut ActorContext<Self>, framework_id: &FrameworkId) {
        let Some(framework) = self.state.framework(framework_id) else {
            warn!("cannot remove unknown framework {framework_id}");
            return;
        };
        let pid = framework.pid.clone();
        let offer_ids = framework.offers.iter().cloned().collect::<Vec<_>>();
        let task_ids = framework.tasks.iter().cloned().collect::<Vec<_>>();

        for offer_id in offer_ids {
            if let Some(offer) = self.state.remove_offer(&offer_id) {
                let _ = pid.send(SchedulerEvent::RescindOffer { offer_id });
                self.allocator.resources_recovered(
                    framework_id,
                    &offer.slave_id,
                    &offer.resources,
                );
            }
        }
        let mut slaves_to_notify = HashSet::new();
        for task_id in task_ids {
            if let Some(task) = self.state.remove_task(framework_id, &task_id) {
                slaves_to_notify.insert(task.slave_id.clone());
                self.allocator.resources_recovered(
                    framework_id,
                    &task.slave_id,
                    &ResourceHints::new(task.resources, task.min_resources),
                );
            }
        }
        for slave_id in slaves_to_notify {
            if let Some(slave) = self.state.slave(&slave_id) {
                let _ = slave.pid.send(SlaveEvent::ShutdownFramework {
                    framework_id: framework_id.clone(),
                });
            }
        }
        self.state.remove_framework(framework_id);
        let decisions = self.allocator.framework_removed(framework_id);
        self.dispatch_decisions(ctx, decisions);
    }

    /// Persist the slave roster in the registry. A write that loses its
    /// version race re-reads and retries a bounded number of times; losing
    /// every retry means another writer owns the registry, which the master
    /// treats as fatal.
    fn persist_registry(&mut self, ctx: &mut ActorContext<Self>) {
        let Some(registry) = self.options.registry.clone() else {
            return;
        };
        let roster = self.state.roster();
        let attempts = self.options.registry_retry_count;
        let delay = self.options.registry_retry_delay;
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            let result = registry
                .mutate::<SlaveRoster, _>("slaves", attempts, delay, |stored| {
                    *stored = roster.clone();
                })
                .await;
            if let Err(e) = result {
                error!("failed to persist the slave registry: {e}");
                let _ = handle.send(MasterEvent::RegistryFailed);
            }
        });
    }
}
