use std::collections::HashMap;

use flotilla_server::actor::{Actor, ActorAction, ActorContext};
use log::{info, warn};

use crate::allocator::{Allocator, AllocatorOptions};
use crate::master::actor::MasterActor;
use crate::master::state::MasterState;
use crate::master::{MasterEvent, MasterOptions, SlaveRoster};

#[async_trait::async_trait]
impl Actor for MasterActor {
    type Message = MasterEvent;
    type Options = MasterOptions;

    fn name() -> &'static str {
        "MasterActor"
    }

    fn new(options: MasterOptions) -> Self {
        let allocator = Allocator::new(AllocatorOptions::new(&options));
        let state = MasterState::new(&options.info.id);
        Self {
            options,
            state,
            allocator,
            framework_pids: HashMap::new(),
            slave_pids: HashMap::new(),
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        info!(
            "master {} started on {}:{}",
            self.options.info.id, self.options.info.hostname, self.options.info.port
        );
        if let Some(whitelist) = self.options.whitelist.clone() {
            self.allocator.update_whitelist(Some(whitelist));
        }
        if let Some(registry) = &self.options.registry {
            match registry.get::<SlaveRoster>("slaves").await {
                Ok(roster) => {
                    if !roster.slaves.is_empty() {
                        info!(
                            "recovered {} slaves from the registry; awaiting re-registration",
                            roster.slaves.len()
                        );
                    }
                }
                Err(e) => warn!("failed to recover the slave registry: {e}"),
            }
        }
        ctx.send_with_delay(MasterEvent::Batch, self.options.batch);
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: MasterEvent) -> ActorAction {
        match message {
            MasterEvent::RegisterFramework { info, from } => {
                self.handle_register_framework(ctx, info, from)
            }
            MasterEvent::ReregisterFramework {
                framework_id,
                info,
                failover,
                from,
            } => self.handle_reregister_framework(ctx, framework_id, info, failover, from),
            MasterEvent::UnregisterFramework { framework_id, from } => {
                self.handle_unregister_framework(ctx, framework_id, from)
            }
            MasterEvent::DeactivateFramework { framework_id, from } => {
                self.handle_deactivate_framework(ctx, framework_id, from)
            }
            MasterEvent::ResourceRequest {
                framework_id,
                requests,
            } => self.handle_resource_request(ctx, framework_id, requests),
            MasterEvent::LaunchTasks {
                framework_id,
                offer_id,
                tasks,
                filters,
            } => self.handle_launch_tasks(ctx, framework_id, offer_id, tasks, filters),
            MasterEvent::ReviveOffers { framework_id } => {
                self.handle_revive_offers(ctx, framework_id)
            }
            MasterEvent::KillTask {
                framework_id,
                task_id,
            } => self.handle_kill_task(ctx, framework_id, task_id),
            MasterEvent::FrameworkToExecutor {
                framework_id,
                slave_id,
                executor_id,
                data,
            } => self.handle_framework_to_executor(ctx, framework_id, slave_id, executor_id, data),
            MasterEvent::RegisterSlave { info, from } => {
                self.handle_register_slave(ctx, info, from)
            }
            MasterEvent::ReregisterSlave {
                slave_id,
                info,
                tasks,
                from,
            } => self.handle_reregister_slave(ctx, slave_id, info, tasks, from),
            MasterEvent::StatusUpdate { update, from_slave } => {
                self.handle_status_update(ctx, update, from_slave)
            }
            MasterEvent::StatusUpdateAck {
                framework_id,
                slave_id,
                task_id,
                uuid,
            } => self.handle_status_update_ack(ctx, framework_id, slave_id, task_id, uuid),
            MasterEvent::ExecutorToFramework {
                framework_id,
                slave_id,
                executor_id,
                data,
            } => self.handle_executor_to_framework(ctx, framework_id, slave_id, executor_id, data),
            MasterEvent::FrameworkExited {
                framework_id,
                epoch,
            } => self.handle_framework_exited(ctx, framework_id, epoch),
            MasterEvent::SlaveExited { slave_id } => self.handle_slave_exited(ctx, slave_id),
            MasterEvent::FrameworkFailoverTimeout {
                framework_id,
                epoch,
            } => self.handle_framework_failover_timeout(ctx, framework_id, epoch),
            MasterEvent::OfferExpired { offer_id } => self.handle_offer_expired(ctx, offer_id),
            MasterEvent::FilterExpired {
                framework_id,
                filter_id,
            } => self.handle_filter_expired(ctx, framework_id, filter_id),
            MasterEvent::UpdateWhitelist { whitelist } => {
                self.handle_update_whitelist(ctx, whitelist)
            }
            MasterEvent::Batch => self.handle_batch(ctx),
            MasterEvent::RegistryFailed => {
                log::error!("giving up on registry persistence; aborting the master");
                ActorAction::Stop
            }
            MasterEvent::Inspect { reply } => self.handle_inspect(ctx, reply),
            MasterEvent::Shutdown => ActorAction::Stop,
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        info!("master {} stopped", self.options.info.id);
    }
}
