use std::sync::Arc;

use flotilla_server::actor::{Actor, ActorAction, ActorContext, ActorHandle};
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::exec::{Executor, ExecutorDriverClient, ExecutorEnvironment, ExecutorEvent};
use crate::id::SlaveId;
use crate::sched::DriverStatus;
use crate::slave::{SlaveActor, SlaveEvent};
use crate::task::{StatusUpdate, TaskState, TaskStatus};

pub struct ExecutorOptions {
    pub executor: Arc<dyn Executor>,
    pub environment: ExecutorEnvironment,
    pub slave: ActorHandle<SlaveActor>,
    pub status: Arc<watch::Sender<DriverStatus>>,
    /// The last-resort kill fired by the shutdown safety net.
    pub hard_kill: Arc<dyn Fn() + Send + Sync>,
}

/// The executor-side actor: registers with its slave, surfaces task
/// callbacks, and stamps outgoing status updates with fresh identifiers.
pub struct ExecutorActor {
    executor: Arc<dyn Executor>,
    environment: ExecutorEnvironment,
    slave: ActorHandle<SlaveActor>,
    status: Arc<watch::Sender<DriverStatus>>,
    client: Option<ExecutorDriverClient>,
    slave_id: Option<SlaveId>,
    aborted: bool,
    hard_kill: Arc<dyn Fn() + Send + Sync>,
}

#[async_trait::async_trait]
impl Actor for ExecutorActor {
    type Message = ExecutorEvent;
    type Options = ExecutorOptions;

    fn name() -> &'static str {
        "ExecutorActor"
    }

    fn new(options: ExecutorOptions) -> Self {
        Self {
            executor: options.executor,
            environment: options.environment,
            slave: options.slave,
            status: options.status,
            client: None,
            slave_id: None,
            aborted: false,
            hard_kill: options.hard_kill,
        }
    }

    async fn start(&mut self, ctx: &mut ActorContext<Self>) {
        debug!(
            "executor {} of framework {} starting in {}",
            self.environment.executor_id, self.environment.framework_id, self.environment.directory
        );
        self.client = Some(ExecutorDriverClient::new(
            ctx.handle().clone(),
            self.status.clone(),
        ));
        ctx.watch(&self.slave, ExecutorEvent::SlaveExited);
        let _ = self.slave.send(SlaveEvent::RegisterExecutor {
            framework_id: self.environment.framework_id.clone(),
            executor_id: self.environment.executor_id.clone(),
            from: ctx.handle().clone(),
        });
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: ExecutorEvent) -> ActorAction {
        match message {
            ExecutorEvent::Registered {
                executor,
                framework_id,
                framework,
                slave_id,
                slave,
            } => {
                if self.aborted {
                    debug!("ignoring registered message because the driver is aborted");
                    return ActorAction::Continue;
                }
                info!("executor registered on slave {slave_id}");
                self.slave_id = Some(slave_id);
                debug_assert_eq!(framework_id, self.environment.framework_id);
                self.with_client(|e, client| e.registered(client, &executor, &framework, &slave));
                ActorAction::Continue
            }
            ExecutorEvent::RunTask { task } => {
                if self.aborted {
                    debug!("ignoring run task message because the driver is aborted");
                    return ActorAction::Continue;
                }
                debug!("asked to run task {}", task.task_id);
                self.with_client(|e, client| e.launch_task(client, task.clone()));
                ActorAction::Continue
            }
            ExecutorEvent::KillTask { task_id } => {
                if self.aborted {
                    debug!("ignoring kill task message because the driver is aborted");
                    return ActorAction::Continue;
                }
                debug!("asked to kill task {task_id}");
                self.with_client(|e, client| e.kill_task(client, &task_id));
                ActorAction::Continue
            }
            ExecutorEvent::FrameworkMessage { data } => {
                if self.aborted {
                    debug!("ignoring framework message because the driver is aborted");
                    return ActorAction::Continue;
                }
                self.with_client(|e, client| e.framework_message(client, data.clone()));
                ActorAction::Continue
            }
            ExecutorEvent::ProgressRequest => {
                self.with_client(|e, client| e.progress(client));
                ActorAction::Continue
            }
            ExecutorEvent::Shutdown => {
                if self.aborted {
                    debug!("ignoring shutdown message because the driver is aborted");
                    return ActorAction::Continue;
                }
                debug!("executor asked to shut down");
                self.arm_shutdown_safety_net();
                self.with_client(|e, client| e.shutdown(client));
                self.status.send_replace(DriverStatus::Stopped);
                ActorAction::Stop
            }
            ExecutorEvent::SlaveExited => {
                if self.aborted {
                    debug!("ignoring slave exit because the driver is aborted");
                    return ActorAction::Continue;
                }
                warn!("slave exited; shutting down the executor");
                self.arm_shutdown_safety_net();
                self.with_client(|e, client| e.shutdown(client));
                self.status.send_replace(DriverStatus::Stopped);
                ActorAction::Stop
            }
            ExecutorEvent::SendStatusUpdate { status } => {
                self.handle_send_status_update(ctx, status)
            }
            ExecutorEvent::SendFrameworkMessage { data } => {
                let _ = self.slave.send(SlaveEvent::ExecutorToFramework {
                    framework_id: self.environment.framework_id.clone(),
                    executor_id: self.environment.executor_id.clone(),
                    data,
                });
                ActorAction::Continue
            }
            ExecutorEvent::Abort => {
                debug!("deactivating the executor driver");
                self.aborted = true;
                ActorAction::Continue
            }
            ExecutorEvent::Stop => {
                self.status.send_replace(DriverStatus::Stopped);
                ActorAction::Stop
            }
        }
    }

    async fn stop(self, _ctx: &mut ActorContext<Self>) {
        debug!(
            "executor {} of framework {} stopped",
            self.environment.executor_id, self.environment.framework_id
        );
    }
}

impl ExecutorActor {
    fn handle_send_status_update(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        status: TaskStatus,
    ) -> ActorAction {
        debug!(
            "executor sending status update for task {} in state {}",
            status.task_id, status.state
        );
        if status.state == TaskState::Staging {
            // That state is owned by the slave; an executor claiming it is
            // a protocol violation.
            warn!("executor is not allowed to send TASK_STAGING status updates; aborting");
            self.aborted = true;
            self.status.send_replace(DriverStatus::Aborted);
            self.with_client(|e, client| {
                e.error(client, "Attempted to send a TASK_STAGING status update")
            });
            return ActorAction::Continue;
        }
        let mut update = StatusUpdate::new(self.environment.framework_id.clone(), status);
        update.slave_id = self.slave_id.clone();
        update.executor_id = Some(self.environment.executor_id.clone());
        let _ = self.slave.send(SlaveEvent::StatusUpdate { update });
        ActorAction::Continue
    }

    /// Bound the lifetime of a non-cooperating executor process: unless the
    /// process exits cleanly first, its whole process group is killed after
    /// the shutdown timeout, so nothing the executor spawned survives.
    /// Skipped for executors sharing the slave's process.
    fn arm_shutdown_safety_net(&self) {
        if self.environment.local {
            return;
        }
        let timeout = self.environment.shutdown_timeout;
        let hard_kill = self.hard_kill.clone();
        info!("scheduling a hard kill of the executor in {timeout:?}");
        // Detached on purpose: the net must outlive this actor.
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("executor shutdown timeout elapsed; killing the process group");
            hard_kill();
        });
    }

    fn with_client(&self, f: impl FnOnce(&dyn Executor, &ExecutorDriverClient)) {
        if let Some(client) = &self.client {
            f(self.executor.as_ref(), client);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::detector::MasterDetector;
    use crate::id::{ExecutorId, FrameworkId};
    use crate::info::SlaveInfo;
    use crate::launcher::NullLauncher;
    use crate::resources::Resources;
    use crate::slave::SlaveOptions;

    struct NoopExecutor;

    impl Executor for NoopExecutor {}

    fn spawn_executor(local: bool, hard_kill: Arc<dyn Fn() + Send + Sync>) -> ActorHandle<ExecutorActor> {
        let slave = ActorHandle::<SlaveActor>::new(SlaveOptions {
            info: SlaveInfo {
                hostname: "host1".to_string(),
                resources: Resources::new(),
                attributes: Resources::new(),
            },
            detector: MasterDetector::new(),
            launcher: Arc::new(NullLauncher),
            executor_directory: "/tmp/flotilla".to_string(),
            executor_shutdown_timeout: Duration::from_secs(5),
            status_update_retry_interval: Duration::from_secs(10),
        });
        let (status, _) = watch::channel(DriverStatus::Running);
        ActorHandle::<ExecutorActor>::new(ExecutorOptions {
            executor: Arc::new(NoopExecutor),
            environment: ExecutorEnvironment {
                slave_pid: "slave(test)@host1".to_string(),
                framework_id: FrameworkId::from("f1"),
                executor_id: ExecutorId::from("executor-1"),
                directory: "/tmp/flotilla/f1/executor-1".to_string(),
                local,
                shutdown_timeout: Duration::from_secs(5),
            },
            slave,
            status: Arc::new(status),
            hard_kill,
        })
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_net_kills_the_process_group_after_the_timeout() {
        let killed = Arc::new(AtomicBool::new(false));
        let recorder = Arc::clone(&killed);
        let handle = spawn_executor(false, Arc::new(move || recorder.store(true, Ordering::SeqCst)));
        settle().await;
        let _ = handle.send(ExecutorEvent::Shutdown);
        settle().await;
        assert!(!killed.load(Ordering::SeqCst));

        // Before the shutdown timeout elapses the process lives on.
        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert!(!killed.load(Ordering::SeqCst));

        // The executor did not exit cleanly; the net fires.
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(killed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_net_is_skipped_for_local_executors() {
        let killed = Arc::new(AtomicBool::new(false));
        let recorder = Arc::clone(&killed);
        let handle = spawn_executor(true, Arc::new(move || recorder.store(true, Ordering::SeqCst)));
        settle().await;
        let _ = handle.send(ExecutorEvent::Shutdown);
        settle().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(!killed.load(Ordering::SeqCst));
        handle.wait_for_stop().await;
    }
}
