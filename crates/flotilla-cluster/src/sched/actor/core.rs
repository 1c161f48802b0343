use std::collections::HashMap;

use flotilla_server::actor::{Actor, ActorAction, ActorContext};
use log::debug;

use crate::sched::actor::{SchedulerActor, SchedulerOptions};
use crate::sched::{SchedulerDriverClient, SchedulerEvent};

#[async_trait::async_trait]
impl Actor for SchedulerActor {
    type Message = SchedulerEvent;
    type Options = SchedulerOptions;

    fn name() -> &'static str {
        "SchedulerActor"
    }

    fn new(options: SchedulerOptions) -> Self {
        let failover = options.framework.id.is_some();
        let framework_id = options.framework.id.clone();
        Self {
            scheduler: options.scheduler,
            framework: options.framework,
            detector: options.detector,
            status: options.status,
            client: None,
            framework_id,
            master: None,
            connected: false,
            failover,
            aborted: false,
            epoch: 0,
            saved_offers: HashMap::new(),
            saved_slave_pids: HashMap::new(),
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        self.client = Some(SchedulerDriverClient::new(
            ctx.handle().clone(),
            self.status.clone(),
        ));
        let mut watch = self.detector.subscribe();
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            loop {
                let master = watch.borrow_and_update().clone();
                let event = match master {
                    Some(master) => SchedulerEvent::NewMasterDetected { master },
                    None => SchedulerEvent::NoMasterDetected,
                };
                if handle.send(event).is_err() {
                    break;
                }
                if watch.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: SchedulerEvent) -> ActorAction {
        match message {
            SchedulerEvent::NewMasterDetected { master } => {
                self.handle_new_master_detected(ctx, master)
            }
            SchedulerEvent::NoMasterDetected => self.handle_no_master_detected(ctx),
            SchedulerEvent::MasterExited { epoch } => self.handle_master_exited(ctx, epoch),
            SchedulerEvent::DoReliableRegistration { epoch } => {
                self.handle_do_reliable_registration(ctx, epoch)
            }
            SchedulerEvent::Registered {
                framework_id,
                master,
            } => self.handle_registered(ctx, framework_id, master),
            SchedulerEvent::Reregistered {
                framework_id,
                master,
            } => self.handle_reregistered(ctx, framework_id, master),
            SchedulerEvent::ResourceOffers { offers } => self.handle_resource_offers(ctx, offers),
            SchedulerEvent::RescindOffer { offer_id } => self.handle_rescind_offer(ctx, offer_id),
            SchedulerEvent::StatusUpdate { update, needs_ack } => {
                self.handle_status_update(ctx, update, needs_ack)
            }
            SchedulerEvent::LostSlave { slave_id } => self.handle_lost_slave(ctx, slave_id),
            SchedulerEvent::FrameworkMessage {
                slave_id,
                executor_id,
                data,
            } => self.handle_framework_message(ctx, slave_id, executor_id, data),
            SchedulerEvent::Error { message } => self.handle_error(ctx, message),
            SchedulerEvent::LaunchTasks {
                offer_id,
                tasks,
                filters,
            } => self.handle_launch_tasks(ctx, offer_id, tasks, filters),
            SchedulerEvent::KillTask { task_id } => self.handle_kill_task(ctx, task_id),
            SchedulerEvent::ReviveOffers => self.handle_revive_offers(ctx),
            SchedulerEvent::RequestResources { requests } => {
                self.handle_request_resources(ctx, requests)
            }
            SchedulerEvent::SendFrameworkMessage {
                executor_id,
                slave_id,
                data,
            } => self.handle_send_framework_message(ctx, executor_id, slave_id, data),
            SchedulerEvent::Abort => self.handle_abort(ctx),
            SchedulerEvent::Stop { failover } => self.handle_stop(ctx, failover),
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        debug!("scheduler driver actor stopped");
    }
}
