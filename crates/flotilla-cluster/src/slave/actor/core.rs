use flotilla_server::actor::{Actor, ActorAction, ActorContext};
use log::info;

use crate::slave::actor::SlaveActor;
use crate::slave::state::SlaveState;
use crate::slave::{register_slave_pid, unregister_slave_pid, SlaveEvent, SlaveOptions};

#[async_trait::async_trait]
impl Actor for SlaveActor {
    type Message = SlaveEvent;
    type Options = SlaveOptions;

    fn name() -> &'static str {
        "SlaveActor"
    }

    fn new(options: SlaveOptions) -> Self {
        let pid_name = Self::make_pid_name(&options.info.hostname);
        Self {
            options,
            state: SlaveState::default(),
            master: None,
            connected: false,
            epoch: 0,
            pid_name,
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        info!(
            "slave {} started with {}",
            self.pid_name, self.options.info.resources
        );
        register_slave_pid(&self.pid_name, ctx.handle().clone());
        let mut watch = self.options.detector.subscribe();
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            loop {
                let master = watch.borrow_and_update().clone();
                let event = match master {
                    Some(master) => SlaveEvent::NewMasterDetected { master },
                    None => SlaveEvent::NoMasterDetected,
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

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: SlaveEvent) -> ActorAction {
        match message {
            SlaveEvent::NewMasterDetected { master } => {
                self.handle_new_master_detected(ctx, master)
            }
            SlaveEvent::NoMasterDetected => self.handle_no_master_detected(ctx),
            SlaveEvent::MasterExited { epoch } => self.handle_master_exited(ctx, epoch),
            SlaveEvent::DoReliableRegistration { epoch } => {
                self.handle_do_reliable_registration(ctx, epoch)
            }
            SlaveEvent::Registered { slave_id } => self.handle_registered(ctx, slave_id),
            SlaveEvent::Reregistered { slave_id } => self.handle_reregistered(ctx, slave_id),
            SlaveEvent::RunTask {
                framework_id,
                framework,
                task,
            } => self.handle_run_task(ctx, framework_id, framework, task),
            SlaveEvent::KillTask {
                framework_id,
                task_id,
            } => self.handle_kill_task(ctx, framework_id, task_id),
            SlaveEvent::FrameworkToExecutor {
                framework_id,
                executor_id,
                data,
            } => self.handle_framework_to_executor(ctx, framework_id, executor_id, data),
            SlaveEvent::ShutdownFramework { framework_id } => {
                self.handle_shutdown_framework(ctx, framework_id)
            }
            SlaveEvent::StatusUpdateAcknowledged {
                framework_id,
                task_id,
                uuid,
            } => self.handle_status_update_acknowledged(ctx, framework_id, task_id, uuid),
            SlaveEvent::RegisterExecutor {
                framework_id,
                executor_id,
                from,
            } => self.handle_register_executor(ctx, framework_id, executor_id, from),
            SlaveEvent::StatusUpdate { update } => self.handle_status_update(ctx, update),
            SlaveEvent::ExecutorToFramework {
                framework_id,
                executor_id,
                data,
            } => self.handle_executor_to_framework(ctx, framework_id, executor_id, data),
            SlaveEvent::ExecutorExited {
                framework_id,
                executor_id,
            } => self.handle_executor_exited(ctx, framework_id, executor_id),
            SlaveEvent::ExecutorLaunchFailed {
                framework_id,
                executor_id,
                message,
            } => self.handle_executor_launch_failed(ctx, framework_id, executor_id, message),
            SlaveEvent::StatusUpdateRetry { uuid } => self.handle_status_update_retry(ctx, uuid),
            SlaveEvent::Inspect { reply } => self.handle_inspect(ctx, reply),
            SlaveEvent::Shutdown => self.handle_shutdown(ctx),
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        unregister_slave_pid(&self.pid_name);
        info!("slave {} stopped", self.pid_name);
    }
}
