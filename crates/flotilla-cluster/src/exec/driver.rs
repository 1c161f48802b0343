use std::sync::Arc;
use std::time::Duration;

use flotilla_server::actor::ActorHandle;
use tokio::sync::watch;

use crate::error::{ClusterError, ClusterResult};
use crate::exec::actor::ExecutorOptions;
use crate::exec::{
    Executor, ExecutorActor, ExecutorEvent, ENV_DIRECTORY, ENV_EXECUTOR_ID, ENV_FRAMEWORK_ID,
    ENV_LOCAL, ENV_SHUTDOWN_TIMEOUT, ENV_SLAVE_PID,
};
use crate::id::{ExecutorId, FrameworkId};
use crate::sched::DriverStatus;
use crate::slave::{lookup_slave_pid, SlaveActor};
use crate::task::TaskStatus;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The identity and working directory of an executor, as handed down by the
/// slave through the environment.
#[derive(Debug, Clone)]
pub struct ExecutorEnvironment {
    pub slave_pid: String,
    pub framework_id: FrameworkId,
    pub executor_id: ExecutorId,
    pub directory: String,
    /// Whether the executor shares the slave's process; the hard-kill
    /// safety net is skipped in that case.
    pub local: bool,
    pub shutdown_timeout: Duration,
}

impl ExecutorEnvironment {
    pub fn from_env() -> ClusterResult<Self> {
        Ok(Self {
            slave_pid: require_env(ENV_SLAVE_PID)?,
            framework_id: FrameworkId::from(require_env(ENV_FRAMEWORK_ID)?),
            executor_id: ExecutorId::from(require_env(ENV_EXECUTOR_ID)?),
            directory: require_env(ENV_DIRECTORY)?,
            local: std::env::var_os(ENV_LOCAL).is_some(),
            shutdown_timeout: std::env::var(ENV_SHUTDOWN_TIMEOUT)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        })
    }
}

fn require_env(variable: &str) -> ClusterResult<String> {
    std::env::var(variable)
        .map_err(|_| ClusterError::InvalidArgument(format!("expecting {variable} in environment")))
}

/// A cheaply clonable handle to a running executor driver.
#[derive(Clone)]
pub struct ExecutorDriverClient {
    handle: ActorHandle<ExecutorActor>,
    status: Arc<watch::Sender<DriverStatus>>,
}

impl ExecutorDriverClient {
    pub(crate) fn new(
        handle: ActorHandle<ExecutorActor>,
        status: Arc<watch::Sender<DriverStatus>>,
    ) -> Self {
        Self { handle, status }
    }

    pub fn status(&self) -> DriverStatus {
        *self.status.borrow()
    }

    pub fn send_status_update(&self, status: TaskStatus) -> DriverStatus {
        self.command(ExecutorEvent::SendStatusUpdate { status })
    }

    pub fn send_framework_message(&self, data: Vec<u8>) -> DriverStatus {
        self.command(ExecutorEvent::SendFrameworkMessage { data })
    }

    pub fn abort(&self) -> DriverStatus {
        let status = self.status();
        if status != DriverStatus::Running {
            return status;
        }
        let _ = self.handle.send(ExecutorEvent::Abort);
        self.status.send_replace(DriverStatus::Aborted);
        DriverStatus::Aborted
    }

    pub fn stop(&self) -> DriverStatus {
        let status = self.status();
        if status != DriverStatus::Running && status != DriverStatus::Aborted {
            return status;
        }
        let _ = self.handle.send(ExecutorEvent::Stop);
        self.status.send_replace(DriverStatus::Stopped);
        if status == DriverStatus::Aborted {
            DriverStatus::Aborted
        } else {
            DriverStatus::Stopped
        }
    }

    fn command(&self, event: ExecutorEvent) -> DriverStatus {
        let status = self.status();
        if status != DriverStatus::Running {
            return status;
        }
        let _ = self.handle.send(event);
        status
    }
}

/// The per-executor driver installed inside slave-launched processes.
pub struct ExecutorDriver {
    executor: Arc<dyn Executor>,
    status: Arc<watch::Sender<DriverStatus>>,
    client: Option<ExecutorDriverClient>,
}

impl ExecutorDriver {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let (status, _) = watch::channel(DriverStatus::NotStarted);
        Self {
            executor,
            status: Arc::new(status),
            client: None,
        }
    }

    pub fn status(&self) -> DriverStatus {
        *self.status.borrow()
    }

    pub fn client(&self) -> Option<&ExecutorDriverClient> {
        self.client.as_ref()
    }

    /// Bootstrap from the environment. The slave handle is resolved from
    /// the pid registry of this process.
    pub fn start(&mut self) -> ClusterResult<DriverStatus> {
        let environment = ExecutorEnvironment::from_env()?;
        let Some(slave) = lookup_slave_pid(&environment.slave_pid) else {
            return Err(ClusterError::InvalidArgument(format!(
                "cannot resolve slave pid '{}'",
                environment.slave_pid
            )));
        };
        Ok(self.start_with(environment, slave))
    }

    /// Start with an explicit environment and slave handle, as done by
    /// in-process executor launchers.
    pub fn start_with(
        &mut self,
        environment: ExecutorEnvironment,
        slave: ActorHandle<SlaveActor>,
    ) -> DriverStatus {
        if self.status() != DriverStatus::NotStarted {
            return self.status();
        }
        let handle = ActorHandle::<ExecutorActor>::new(ExecutorOptions {
            executor: Arc::clone(&self.executor),
            environment,
            slave,
            status: Arc::clone(&self.status),
            hard_kill: Arc::new(kill_process_group),
        });
        self.client = Some(ExecutorDriverClient::new(handle, Arc::clone(&self.status)));
        self.status.send_replace(DriverStatus::Running);
        DriverStatus::Running
    }

    pub async fn join(&self) -> DriverStatus {
        let mut status = self.status.subscribe();
        let result = status
            .wait_for(|s| *s == DriverStatus::Aborted || *s == DriverStatus::Stopped)
            .await;
        match result {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    pub async fn run(&mut self) -> ClusterResult<DriverStatus> {
        let status = self.start()?;
        if status != DriverStatus::Running {
            return Ok(status);
        }
        Ok(self.join().await)
    }

    pub fn send_status_update(&self, status: TaskStatus) -> DriverStatus {
        match &self.client {
            Some(client) => client.send_status_update(status),
            None => self.status(),
        }
    }

    pub fn send_framework_message(&self, data: Vec<u8>) -> DriverStatus {
        match &self.client {
            Some(client) => client.send_framework_message(data),
            None => self.status(),
        }
    }

    pub fn abort(&self) -> DriverStatus {
        match &self.client {
            Some(client) => client.abort(),
            None => self.status(),
        }
    }

    pub fn stop(&self) -> DriverStatus {
        match &self.client {
            Some(client) => client.stop(),
            None => self.status(),
        }
    }
}

/// Kill the executor's whole process group, the executor itself included,
/// so that child processes it spawned die with it.
#[cfg(target_family = "unix")]
fn kill_process_group() {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    let _ = killpg(Pid::from_raw(0), Signal::SIGKILL);
    // The signal might not be delivered immediately; exit abnormally if we
    // are somehow still alive.
    std::thread::sleep(Duration::from_secs(5));
    std::process::exit(1);
}

#[cfg(not(target_family = "unix"))]
fn kill_process_group() {
    std::process::exit(1);
}
