use flotilla_server::actor::{ActorAction, ActorContext, ActorHandle};
use log::{debug, info, warn};

use crate::detector::MasterRef;
use crate::id::{ExecutorId, FrameworkId, OfferId, SlaveId, TaskId};
use crate::info::{MasterInfo, Offer};
use crate::master::MasterEvent;
use crate::sched::actor::{SchedulerActor, REGISTRATION_RETRY_INTERVAL};
use crate::sched::{DriverStatus, SchedulerEvent};
use crate::slave::{SlaveActor, SlaveEvent};
use crate::task::{Filters, Request, StatusUpdate, TaskInfo, TaskState, TaskStatus};

impl SchedulerActor {
    pub(super) fn handle_new_master_detected(
        &mut self,
        ctx: &mut ActorContext<Self>,
        master: MasterRef,
    ) -> ActorAction {
        debug!("new master detected at {}:{}", master.info.hostname, master.info.port);
        self.connected = false;
        self.epoch += 1;
        ctx.watch(
            &master.handle,
            SchedulerEvent::MasterExited { epoch: self.epoch },
        );
        self.master = Some(master);
        self.do_reliable_registration(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_no_master_detected(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> ActorAction {
        if self.master.is_none() {
            return ActorAction::Continue;
        }
        debug!("no master detected, waiting for another master");
        self.master = None;
        self.connected = false;
        self.epoch += 1;
        self.with_client(|scheduler, client| scheduler.disconnected(client));
        ActorAction::Continue
    }

    pub(super) fn handle_master_exited(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        epoch: u64,
    ) -> ActorAction {
        if epoch != self.epoch {
            return ActorAction::Continue;
        }
        debug!("master exited; waiting for a new master to be detected");
        self.connected = false;
        self.with_client(|scheduler, client| scheduler.disconnected(client));
        ActorAction::Continue
    }

    /// Send a (re-)registration and re-arm the retry until `Registered` is
    /// received or the master changes.
    fn do_reliable_registration(&mut self, ctx: &mut ActorContext<Self>) {
        if self.connected || self.aborted {
            return;
        }
        let Some(master) = &self.master else {
            return;
        };
        let mut info = self.framework.clone();
        info.id = self.framework_id.clone();
        let result = match &self.framework_id {
            None => {
                debug!("sending framework registration");
                master.handle.send(MasterEvent::RegisterFramework {
                    info,
                    from: ctx.handle().clone(),
                })
            }
            Some(framework_id) => {
                debug!("sending framework re-registration for {framework_id}");
                master.handle.send(MasterEvent::ReregisterFramework {
                    framework_id: framework_id.clone(),
                    info,
                    failover: self.failover,
                    from: ctx.handle().clone(),
                })
            }
        };
        if result.is_err() {
            debug!("master is gone; awaiting detection of a new master");
            return;
        }
        ctx.send_with_delay(
            SchedulerEvent::DoReliableRegistration { epoch: self.epoch },
            REGISTRATION_RETRY_INTERVAL,
        );
    }

    pub(super) fn handle_do_reliable_registration(
        &mut self,
        ctx: &mut ActorContext<Self>,
        epoch: u64,
    ) -> ActorAction {
        if epoch == self.epoch {
            self.do_reliable_registration(ctx);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_registered(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        master: MasterInfo,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring framework registered message because the driver is aborted");
            return ActorAction::Continue;
        }
        if self.connected {
            debug!("ignoring framework registered message because the driver is already connected");
            return ActorAction::Continue;
        }
        info!("framework registered with {framework_id}");
        self.framework_id = Some(framework_id.clone());
        self.connected = true;
        self.failover = false;
        self.with_client(|scheduler, client| scheduler.registered(client, &framework_id, &master));
        ActorAction::Continue
    }

    pub(super) fn handle_reregistered(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        master: MasterInfo,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring framework re-registered message because the driver is aborted");
            return ActorAction::Continue;
        }
        if self.connected {
            debug!(
                "ignoring framework re-registered message because the driver is already connected"
            );
            return ActorAction::Continue;
        }
        info!("framework re-registered with {framework_id}");
        self.framework_id = Some(framework_id);
        self.connected = true;
        self.failover = false;
        self.with_client(|scheduler, client| scheduler.reregistered(client, &master));
        ActorAction::Continue
    }

    pub(super) fn handle_resource_offers(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        offers: Vec<(Offer, ActorHandle<SlaveActor>)>,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring resource offers message because the driver is aborted");
            return ActorAction::Continue;
        }
        debug!("received {} offers", offers.len());
        // Save the slave handle associated with each offer so framework
        // messages can later be sent to the slave directly.
        let mut delivered = Vec::with_capacity(offers.len());
        for (offer, slave) in offers {
            self.saved_offers
                .entry(offer.offer_id.clone())
                .or_default()
                .insert(offer.slave_id.clone(), slave);
            delivered.push(offer);
        }
        self.with_client(|scheduler, client| scheduler.resource_offers(client, delivered));
        ActorAction::Continue
    }

    pub(super) fn handle_rescind_offer(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        offer_id: OfferId,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring rescind offer message because the driver is aborted");
            return ActorAction::Continue;
        }
        debug!("rescinded offer {offer_id}");
        self.saved_offers.remove(&offer_id);
        self.with_client(|scheduler, client| scheduler.offer_rescinded(client, &offer_id));
        ActorAction::Continue
    }

    pub(super) fn handle_status_update(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        update: StatusUpdate,
        needs_ack: bool,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring status update message because the driver is aborted");
            return ActorAction::Continue;
        }
        debug!(
            "status update: task {} is in state {}",
            update.status.task_id, update.status.state
        );
        self.with_client(|scheduler, client| {
            scheduler.status_update(client, update.status.clone())
        });
        // Acknowledge after the callback ran, so a crashing scheduler sees
        // the update again after it comes back.
        if needs_ack && !self.aborted {
            if let (Some(master), Some(framework_id), Some(slave_id)) =
                (&self.master, &self.framework_id, &update.slave_id)
            {
                let _ = master.handle.send(MasterEvent::StatusUpdateAck {
                    framework_id: framework_id.clone(),
                    slave_id: slave_id.clone(),
                    task_id: update.status.task_id.clone(),
                    uuid: update.uuid,
                });
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_lost_slave(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring lost slave message because the driver is aborted");
            return ActorAction::Continue;
        }
        debug!("lost slave {slave_id}");
        self.saved_slave_pids.remove(&slave_id);
        self.with_client(|scheduler, client| scheduler.slave_lost(client, &slave_id));
        ActorAction::Continue
    }

    pub(super) fn handle_framework_message(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring framework message because the driver is aborted");
            return ActorAction::Continue;
        }
        self.with_client(|scheduler, client| {
            scheduler.framework_message(client, &slave_id, &executor_id, data.clone())
        });
        ActorAction::Continue
    }

    pub(super) fn handle_error(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: String,
    ) -> ActorAction {
        if self.aborted {
            debug!("ignoring error message because the driver is aborted");
            return ActorAction::Continue;
        }
        warn!("framework error: {message}");
        self.abort_driver(ctx);
        self.with_client(|scheduler, client| scheduler.error(client, &message));
        ActorAction::Continue
    }

    pub(super) fn handle_launch_tasks(
        &mut self,
        ctx: &mut ActorContext<Self>,
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        filters: Filters,
    ) -> ActorAction {
        if !self.connected {
            debug!("asked to launch tasks while disconnected from the master");
            // Reply with TASK_LOST so the scheduler does not believe the
            // tasks are pending forever.
            for task in tasks {
                self.synthesize_lost(ctx, task.task_id, "Master disconnected");
            }
            return ActorAction::Continue;
        }
        let mut launchable = vec![];
        for task in tasks {
            if !task.has_valid_executor() {
                self.synthesize_lost(
                    ctx,
                    task.task_id,
                    "TaskInfo must have either an 'executor' or a 'command'",
                );
                continue;
            }
            // Keep only the slave handles where tasks run, so framework
            // messages can bypass the master.
            match self.saved_offers.get(&offer_id) {
                Some(slaves) => match slaves.get(&task.slave_id) {
                    Some(pid) => {
                        self.saved_slave_pids
                            .insert(task.slave_id.clone(), pid.clone());
                    }
                    None => debug!("attempting to launch a task with the wrong slave id"),
                },
                None => debug!("attempting to launch a task with an unknown offer"),
            }
            launchable.push(task);
        }
        self.saved_offers.remove(&offer_id);
        if let (Some(master), Some(framework_id)) = (&self.master, &self.framework_id) {
            let _ = master.handle.send(MasterEvent::LaunchTasks {
                framework_id: framework_id.clone(),
                offer_id,
                tasks: launchable,
                filters,
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_kill_task(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        task_id: TaskId,
    ) -> ActorAction {
        if !self.connected {
            debug!("ignoring kill task message as the master is disconnected");
            return ActorAction::Continue;
        }
        if let (Some(master), Some(framework_id)) = (&self.master, &self.framework_id) {
            let _ = master.handle.send(MasterEvent::KillTask {
                framework_id: framework_id.clone(),
                task_id,
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_revive_offers(&mut self, _ctx: &mut ActorContext<Self>) -> ActorAction {
        if !self.connected {
            debug!("ignoring revive offers message as the master is disconnected");
            return ActorAction::Continue;
        }
        if let (Some(master), Some(framework_id)) = (&self.master, &self.framework_id) {
            let _ = master.handle.send(MasterEvent::ReviveOffers {
                framework_id: framework_id.clone(),
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_request_resources(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        requests: Vec<Request>,
    ) -> ActorAction {
        if !self.connected {
            debug!("ignoring resource request message as the master is disconnected");
            return ActorAction::Continue;
        }
        if let (Some(master), Some(framework_id)) = (&self.master, &self.framework_id) {
            let _ = master.handle.send(MasterEvent::ResourceRequest {
                framework_id: framework_id.clone(),
                requests,
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_send_framework_message(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        executor_id: ExecutorId,
        slave_id: SlaveId,
        data: Vec<u8>,
    ) -> ActorAction {
        if !self.connected {
            debug!("ignoring framework message as the master is disconnected");
            return ActorAction::Continue;
        }
        let Some(framework_id) = &self.framework_id else {
            return ActorAction::Continue;
        };
        // Send directly to the slave when its handle is known, bypassing
        // the master; otherwise route through the master.
        if let Some(slave) = self.saved_slave_pids.get(&slave_id) {
            let _ = slave.send(SlaveEvent::FrameworkToExecutor {
                framework_id: framework_id.clone(),
                executor_id,
                data,
            });
        } else if let Some(master) = &self.master {
            debug!("cannot send directly to slave {slave_id}; sending through the master");
            let _ = master.handle.send(MasterEvent::FrameworkToExecutor {
                framework_id: framework_id.clone(),
                slave_id,
                executor_id,
                data,
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_abort(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        self.abort_driver(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_stop(
        &mut self,
        ctx: &mut ActorContext<Self>,
        failover: bool,
    ) -> ActorAction {
        debug!("stopping the framework (failover: {failover})");
        if self.connected {
            if let (Some(master), Some(framework_id)) = (&self.master, &self.framework_id) {
                let event = if failover {
                    // Keep the framework's tasks and reservations alive for
                    // the failover window.
                    MasterEvent::DeactivateFramework {
                        framework_id: framework_id.clone(),
                        from: ctx.handle().clone(),
                    }
                } else {
                    MasterEvent::UnregisterFramework {
                        framework_id: framework_id.clone(),
                        from: ctx.handle().clone(),
                    }
                };
                let _ = master.handle.send(event);
            }
        }
        if *self.status.borrow() != DriverStatus::Aborted {
            self.status.send_replace(DriverStatus::Stopped);
        }
        ActorAction::Stop
    }

    /// Mark the driver aborted and tell the master to stop sending to it.
    fn abort_driver(&mut self, ctx: &mut ActorContext<Self>) {
        if self.aborted {
            return;
        }
        info!("aborting the framework");
        self.aborted = true;
        self.status.send_replace(DriverStatus::Aborted);
        if !self.connected {
            debug!("not sending a deactivate message as the master is disconnected");
            return;
        }
        if let (Some(master), Some(framework_id)) = (&self.master, &self.framework_id) {
            let _ = master.handle.send(MasterEvent::DeactivateFramework {
                framework_id: framework_id.clone(),
                from: ctx.handle().clone(),
            });
        }
    }

    /// Deliver a locally synthesized `TASK_LOST` update through the normal
    /// status update path so the scheduler's view stays consistent.
    fn synthesize_lost(&mut self, ctx: &mut ActorContext<Self>, task_id: TaskId, message: &str) {
        let framework_id = self.framework_id.clone().unwrap_or_else(|| {
            FrameworkId::from("")
        });
        let update = StatusUpdate::new(
            framework_id,
            TaskStatus::with_message(task_id, TaskState::Lost, message),
        );
        ctx.send(SchedulerEvent::StatusUpdate {
            update,
            needs_ack: false,
        });
    }

    fn with_client(&self, f: impl FnOnce(&dyn crate::sched::Scheduler, &crate::sched::SchedulerDriverClient)) {
        if let Some(client) = &self.client {
            f(self.scheduler.as_ref(), client);
        }
    }
}
