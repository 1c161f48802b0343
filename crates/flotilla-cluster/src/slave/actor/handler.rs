use std::collections::HashMap;
use std::time::Duration;

use flotilla_server::actor::{ActorAction, ActorContext, ActorHandle};
use log::{debug, info, warn};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::detector::MasterRef;
use crate::exec::{ExecutorActor, ExecutorEvent};
use crate::id::{ExecutorId, FrameworkId, SlaveId, TaskId};
use crate::info::{CommandInfo, ExecutorInfo, FrameworkInfo};
use crate::launcher::ExecutorLaunch;
use crate::master::MasterEvent;
use crate::resources::Resources;
use crate::slave::actor::SlaveActor;
use crate::slave::state::{SlaveExecutor, SlaveExecutorState, TaskRecord};
use crate::slave::{SlaveEvent, SlaveSnapshot};
use crate::task::{StatusUpdate, TaskInfo, TaskState, TaskStatus};

const REGISTRATION_RETRY_INTERVAL: Duration = Duration::from_secs(1);

impl SlaveActor {
    pub(super) fn handle_new_master_detected(
        &mut self,
        ctx: &mut ActorContext<Self>,
        master: MasterRef,
    ) -> ActorAction {
        debug!(
            "slave {} detected master at {}:{}",
            self.pid_name, master.info.hostname, master.info.port
        );
        self.connected = false;
        self.epoch += 1;
        ctx.watch(
            &master.handle,
            SlaveEvent::MasterExited { epoch: self.epoch },
        );
        self.master = Some(master);
        self.do_reliable_registration(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_no_master_detected(
        &mut self,
        _ctx: &mut ActorContext<Self>,
    ) -> ActorAction {
        if self.master.is_some() {
            debug!("slave {} lost sight of the master", self.pid_name);
            self.master = None;
            self.connected = false;
            self.epoch += 1;
        }
        ActorAction::Continue
    }

    pub(super) fn handle_master_exited(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        epoch: u64,
    ) -> ActorAction {
        if epoch == self.epoch {
            info!("slave {} disconnected from the master", self.pid_name);
            self.connected = false;
        }
        ActorAction::Continue
    }

    fn do_reliable_registration(&mut self, ctx: &mut ActorContext<Self>) {
        if self.connected {
            return;
        }
        let Some(master) = &self.master else {
            return;
        };
        let result = match &self.state.slave_id {
            None => master.handle.send(MasterEvent::RegisterSlave {
                info: self.options.info.clone(),
                from: ctx.handle().clone(),
            }),
            Some(slave_id) => master.handle.send(MasterEvent::ReregisterSlave {
                slave_id: slave_id.clone(),
                info: self.options.info.clone(),
                tasks: self.state.running_tasks(),
                from: ctx.handle().clone(),
            }),
        };
        if result.is_err() {
            debug!("master is gone; awaiting detection of a new master");
            return;
        }
        ctx.send_with_delay(
            SlaveEvent::DoReliableRegistration { epoch: self.epoch },
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
        ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
    ) -> ActorAction {
        if self.connected {
            return ActorAction::Continue;
        }
        info!("slave registered with {slave_id}");
        self.state.slave_id = Some(slave_id);
        self.connected = true;
        self.resend_pending_updates(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_reregistered(
        &mut self,
        ctx: &mut ActorContext<Self>,
        slave_id: SlaveId,
    ) -> ActorAction {
        if self.connected {
            return ActorAction::Continue;
        }
        info!("slave re-registered with {slave_id}");
        self.state.slave_id = Some(slave_id);
        self.connected = true;
        self.resend_pending_updates(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_run_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        framework: FrameworkInfo,
        task: TaskInfo,
    ) -> ActorAction {
        info!("asked to run task {} of framework {framework_id}", task.task_id);
        let executor_info = executor_info_for(&task);
        let executor_id = executor_info.executor_id.clone();
        let launch = self.executor_launch(ctx, &framework_id, &framework, &executor_info);

        let entry = self
            .state
            .framework_or_insert(framework_id.clone(), framework)
            .executors
            .entry(executor_id.clone());
        let executor = entry.or_insert_with(|| SlaveExecutor {
            info: executor_info,
            state: SlaveExecutorState::Registering { queued: vec![] },
            tasks: HashMap::new(),
        });

        let mut failed: Option<(TaskId, TaskState, &str)> = None;
        let mut launch_needed = false;
        match &mut executor.state {
            SlaveExecutorState::Registering { queued } => {
                launch_needed = queued.is_empty() && executor.tasks.is_empty();
                executor.tasks.insert(
                    task.task_id.clone(),
                    TaskRecord {
                        info: task.clone(),
                        state: TaskState::Staging,
                    },
                );
                queued.push(task);
            }
            SlaveExecutorState::Running { pid } => {
                executor.tasks.insert(
                    task.task_id.clone(),
                    TaskRecord {
                        info: task.clone(),
                        state: TaskState::Staging,
                    },
                );
                let _ = pid.send(ExecutorEvent::RunTask { task });
            }
            SlaveExecutorState::Terminated => {
                failed = Some((
                    task.task_id.clone(),
                    TaskState::Lost,
                    "Executor has terminated",
                ));
            }
        }
        if let Some((task_id, state, message)) = failed {
            self.synthesize_update(ctx, framework_id, Some(executor_id), task_id, state, message);
            return ActorAction::Continue;
        }
        if launch_needed {
            let launcher = self.options.launcher.clone();
            let handle = ctx.handle().clone();
            ctx.spawn(async move {
                let framework_id = launch.framework_id.clone();
                let executor_id = launch.executor.executor_id.clone();
                if let Err(e) = launcher.launch_executor(launch).await {
                    warn!("failed to launch executor {executor_id}: {e}");
                    let _ = handle.send(SlaveEvent::ExecutorLaunchFailed {
                        framework_id,
                        executor_id,
                        message: e.to_string(),
                    });
                }
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_register_executor(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        from: ActorHandle<ExecutorActor>,
    ) -> ActorAction {
        let Some(slave_id) = self.state.slave_id.clone() else {
            warn!("executor {executor_id} registered before the slave; shutting it down");
            let _ = from.send(ExecutorEvent::Shutdown);
            return ActorAction::Continue;
        };
        let slave_info = self.options.info.clone();
        let framework_info = match self.state.framework(&framework_id) {
            Some(framework) => framework.info.clone(),
            None => {
                warn!("shutting down executor {executor_id} of unknown framework {framework_id}");
                let _ = from.send(ExecutorEvent::Shutdown);
                return ActorAction::Continue;
            }
        };
        let Some(executor) = self.state.executor_mut(&framework_id, &executor_id) else {
            warn!("shutting down unexpected executor {executor_id} of framework {framework_id}");
            let _ = from.send(ExecutorEvent::Shutdown);
            return ActorAction::Continue;
        };
        info!("executor {executor_id} of framework {framework_id} registered");
        let queued = match &mut executor.state {
            SlaveExecutorState::Registering { queued } => std::mem::take(queued),
            _ => {
                warn!("executor {executor_id} of framework {framework_id} already registered");
                vec![]
            }
        };
        executor.state = SlaveExecutorState::Running { pid: from.clone() };
        let executor_info = executor.info.clone();
        ctx.watch(
            &from,
            SlaveEvent::ExecutorExited {
                framework_id: framework_id.clone(),
                executor_id: executor_id.clone(),
            },
        );
        let _ = from.send(ExecutorEvent::Registered {
            executor: executor_info,
            framework_id,
            framework: framework_info,
            slave_id,
            slave: slave_info,
        });
        for task in queued {
            let _ = from.send(ExecutorEvent::RunTask { task });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_kill_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        task_id: TaskId,
    ) -> ActorAction {
        enum Outcome {
            Forwarded,
            Synthesize(Option<ExecutorId>, TaskState, &'static str),
        }
        let outcome = match self.state.executor_for_task(&framework_id, &task_id) {
            Some(executor) => {
                let executor_id = executor.info.executor_id.clone();
                match &mut executor.state {
                    SlaveExecutorState::Running { pid } => {
                        let _ = pid.send(ExecutorEvent::KillTask {
                            task_id: task_id.clone(),
                        });
                        Outcome::Forwarded
                    }
                    SlaveExecutorState::Registering { queued } => {
                        queued.retain(|t| t.task_id != task_id);
                        executor.tasks.remove(&task_id);
                        Outcome::Synthesize(
                            Some(executor_id),
                            TaskState::Killed,
                            "Task killed before it reached the executor",
                        )
                    }
                    SlaveExecutorState::Terminated => Outcome::Synthesize(
                        Some(executor_id),
                        TaskState::Lost,
                        "Executor has terminated",
                    ),
                }
            }
            None => {
                warn!("asked to kill unknown task {task_id} of framework {framework_id}");
                Outcome::Synthesize(None, TaskState::Lost, "Task is unknown to the slave")
            }
        };
        if let Outcome::Synthesize(executor_id, state, message) = outcome {
            self.synthesize_update(ctx, framework_id, executor_id, task_id, state, message);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_framework_to_executor(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        match self.state.executor_mut(&framework_id, &executor_id) {
            Some(SlaveExecutor {
                state: SlaveExecutorState::Running { pid },
                ..
            }) => {
                let _ = pid.send(ExecutorEvent::FrameworkMessage { data });
            }
            _ => debug!(
                "dropping framework message for executor {executor_id} of framework {framework_id}"
            ),
        }
        ActorAction::Continue
    }

    pub(super) fn handle_shutdown_framework(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
    ) -> ActorAction {
        let Some(framework) = self.state.remove_framework(&framework_id) else {
            debug!("asked to shut down unknown framework {framework_id}");
            return ActorAction::Continue;
        };
        info!("shutting down framework {framework_id}");
        for (executor_id, executor) in framework.executors {
            self.shutdown_executor(ctx, &framework_id, &executor_id, &executor.state);
        }
        ActorAction::Continue
    }

    pub(super) fn handle_status_update_acknowledged(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: Uuid,
    ) -> ActorAction {
        if self.state.remove_pending_update(&uuid).is_some() {
            debug!("status update for task {task_id} of framework {framework_id} acknowledged");
        }
        ActorAction::Continue
    }

    pub(super) fn handle_status_update(
        &mut self,
        ctx: &mut ActorContext<Self>,
        update: StatusUpdate,
    ) -> ActorAction {
        let framework_id = update.framework_id.clone();
        let task_id = update.status.task_id.clone();
        debug!(
            "forwarding status update: task {task_id} of framework {framework_id} is in state {}",
            update.status.state
        );
        if let Some(executor) = self.state.executor_for_task(&framework_id, &task_id) {
            if update.status.state.is_terminal() {
                executor.tasks.remove(&task_id);
            } else if let Some(record) = executor.tasks.get_mut(&task_id) {
                record.state = update.status.state;
            }
        }
        let mut update = update;
        if update.slave_id.is_none() {
            update.slave_id = self.state.slave_id.clone();
        }
        self.state.add_pending_update(update.clone());
        if self.connected {
            if let Some(master) = &self.master {
                let _ = master.handle.send(MasterEvent::StatusUpdate {
                    update: update.clone(),
                    from_slave: true,
                });
            }
        }
        ctx.send_with_delay(
            SlaveEvent::StatusUpdateRetry { uuid: update.uuid },
            self.options.status_update_retry_interval,
        );
        ActorAction::Continue
    }

    pub(super) fn handle_status_update_retry(
        &mut self,
        ctx: &mut ActorContext<Self>,
        uuid: Uuid,
    ) -> ActorAction {
        let Some(update) = self.state.pending_update(&uuid).cloned() else {
            return ActorAction::Continue;
        };
        debug!(
            "retransmitting status update for task {} of framework {}",
            update.status.task_id, update.framework_id
        );
        if self.connected {
            if let Some(master) = &self.master {
                let _ = master.handle.send(MasterEvent::StatusUpdate {
                    update,
                    from_slave: true,
                });
            }
        }
        ctx.send_with_delay(
            SlaveEvent::StatusUpdateRetry { uuid },
            self.options.status_update_retry_interval,
        );
        ActorAction::Continue
    }

    pub(super) fn handle_executor_to_framework(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        data: Vec<u8>,
    ) -> ActorAction {
        let Some(slave_id) = self.state.slave_id.clone() else {
            debug!("dropping executor message while the slave is unregistered");
            return ActorAction::Continue;
        };
        if let Some(master) = &self.master {
            let _ = master.handle.send(MasterEvent::ExecutorToFramework {
                framework_id,
                slave_id,
                executor_id,
                data,
            });
        }
        ActorAction::Continue
    }

    pub(super) fn handle_executor_exited(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
    ) -> ActorAction {
        let task_ids = {
            let Some(executor) = self.state.executor_mut(&framework_id, &executor_id) else {
                return ActorAction::Continue;
            };
            info!("executor {executor_id} of framework {framework_id} exited");
            executor.state = SlaveExecutorState::Terminated;
            executor.tasks.keys().cloned().collect::<Vec<_>>()
        };
        for task_id in task_ids {
            self.synthesize_update(
                ctx,
                framework_id.clone(),
                Some(executor_id.clone()),
                task_id,
                TaskState::Lost,
                "Executor exited",
            );
        }
        ActorAction::Continue
    }

    pub(super) fn handle_executor_launch_failed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: ExecutorId,
        message: String,
    ) -> ActorAction {
        let task_ids = {
            let Some(executor) = self.state.executor_mut(&framework_id, &executor_id) else {
                return ActorAction::Continue;
            };
            warn!("executor {executor_id} of framework {framework_id} failed to launch: {message}");
            executor.state = SlaveExecutorState::Terminated;
            executor.tasks.keys().cloned().collect::<Vec<_>>()
        };
        for task_id in task_ids {
            self.synthesize_update(
                ctx,
                framework_id.clone(),
                Some(executor_id.clone()),
                task_id,
                TaskState::Lost,
                "Failed to launch the executor",
            );
        }
        ActorAction::Continue
    }

    pub(super) fn handle_inspect(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        reply: oneshot::Sender<SlaveSnapshot>,
    ) -> ActorAction {
        let snapshot = SlaveSnapshot {
            slave_id: self.state.slave_id.clone(),
            connected: self.connected,
            executors: self.state.executor_count(),
            queued_tasks: self.state.queued_task_count(),
            active_tasks: self.state.active_task_count(),
            pending_updates: self.state.pending_update_count(),
        };
        let _ = reply.send(snapshot);
        ActorAction::Continue
    }

    pub(super) fn handle_shutdown(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        info!("slave {} shutting down", self.pid_name);
        let frameworks = self
            .state
            .frameworks()
            .map(|(framework_id, framework)| {
                (
                    framework_id.clone(),
                    framework
                        .executors
                        .iter()
                        .map(|(executor_id, executor)| {
                            (executor_id.clone(), match &executor.state {
                                SlaveExecutorState::Running { pid } => Some(pid.clone()),
                                _ => None,
                            })
                        })
                        .collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();
        for (framework_id, executors) in frameworks {
            for (executor_id, pid) in executors {
                match pid {
                    Some(pid) => {
                        let _ = pid.send(ExecutorEvent::Shutdown);
                    }
                    None => {
                        let launcher = self.options.launcher.clone();
                        let framework_id = framework_id.clone();
                        ctx.spawn(async move {
                            let _ = launcher.kill_executor(&framework_id, &executor_id).await;
                        });
                    }
                }
            }
        }
        ActorAction::Stop
    }

    fn shutdown_executor(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
        state: &SlaveExecutorState,
    ) {
        match state {
            SlaveExecutorState::Running { pid } => {
                let _ = pid.send(ExecutorEvent::Shutdown);
            }
            SlaveExecutorState::Registering { .. } => {
                let launcher = self.options.launcher.clone();
                let framework_id = framework_id.clone();
                let executor_id = executor_id.clone();
                ctx.spawn(async move {
                    let _ = launcher.kill_executor(&framework_id, &executor_id).await;
                });
            }
            SlaveExecutorState::Terminated => {}
        }
    }

    fn resend_pending_updates(&mut self, _ctx: &mut ActorContext<Self>) {
        let Some(master) = &self.master else {
            return;
        };
        for update in self.state.pending_updates() {
            let _ = master.handle.send(MasterEvent::StatusUpdate {
                update: update.clone(),
                from_slave: true,
            });
        }
    }

    /// Build a slave-originated status update and feed it through the
    /// regular forwarding and retransmission path.
    fn synthesize_update(
        &mut self,
        ctx: &mut ActorContext<Self>,
        framework_id: FrameworkId,
        executor_id: Option<ExecutorId>,
        task_id: TaskId,
        state: TaskState,
        message: &str,
    ) {
        let mut update = StatusUpdate::new(
            framework_id,
            TaskStatus::with_message(task_id, state, message),
        );
        update.slave_id = self.state.slave_id.clone();
        update.executor_id = executor_id;
        ctx.send(SlaveEvent::StatusUpdate { update });
    }

    fn executor_launch(
        &self,
        ctx: &ActorContext<Self>,
        framework_id: &FrameworkId,
        framework: &FrameworkInfo,
        executor: &ExecutorInfo,
    ) -> ExecutorLaunch {
        ExecutorLaunch {
            slave: ctx.handle().clone(),
            slave_pid: self.pid_name.clone(),
            framework_id: framework_id.clone(),
            framework: framework.clone(),
            executor: executor.clone(),
            directory: format!(
                "{}/{}/{}",
                self.options.executor_directory, framework_id, executor.executor_id
            ),
            shutdown_timeout: self.options.executor_shutdown_timeout,
        }
    }
}

/// The executor description for a task: either the one the framework
/// provided, or a command executor synthesized from the task's command with
/// the task identifier as the executor identifier.
fn executor_info_for(task: &TaskInfo) -> ExecutorInfo {
    match &task.executor {
        Some(executor) => executor.clone(),
        None => ExecutorInfo {
            executor_id: ExecutorId::from(task.task_id.as_str()),
            command: task.command.clone().unwrap_or_else(|| CommandInfo {
                value: String::new(),
                environment: vec![],
            }),
            resources: Resources::new(),
            data: vec![],
        },
    }
}
