use std::sync::Arc;

use flotilla_server::actor::ActorHandle;
use tokio::sync::watch;

use crate::detector::MasterDetector;
use crate::id::{ExecutorId, OfferId, SlaveId, TaskId};
use crate::info::FrameworkInfo;
use crate::sched::actor::SchedulerOptions;
use crate::sched::{Scheduler, SchedulerActor, SchedulerEvent};
use crate::task::{Filters, Request, TaskInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    NotStarted,
    Running,
    Aborted,
    Stopped,
}

/// A cheaply clonable handle to a running scheduler driver.
/// Commands enqueue a message to the driver's actor and synchronously
/// return the driver status observed at call time.
#[derive(Clone)]
pub struct SchedulerDriverClient {
    handle: ActorHandle<SchedulerActor>,
    status: Arc<watch::Sender<DriverStatus>>,
}

impl SchedulerDriverClient {
    pub(crate) fn new(
        handle: ActorHandle<SchedulerActor>,
        status: Arc<watch::Sender<DriverStatus>>,
    ) -> Self {
        Self { handle, status }
    }

    pub fn status(&self) -> DriverStatus {
        *self.status.borrow()
    }

    pub fn launch_tasks(
        &self,
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        filters: Filters,
    ) -> DriverStatus {
        self.command(SchedulerEvent::LaunchTasks {
            offer_id,
            tasks,
            filters,
        })
    }

    /// Decline an offer entirely: a launch with no tasks.
    pub fn decline_offer(&self, offer_id: OfferId, filters: Filters) -> DriverStatus {
        self.launch_tasks(offer_id, vec![], filters)
    }

    pub fn kill_task(&self, task_id: TaskId) -> DriverStatus {
        self.command(SchedulerEvent::KillTask { task_id })
    }

    pub fn revive_offers(&self) -> DriverStatus {
        self.command(SchedulerEvent::ReviveOffers)
    }

    pub fn request_resources(&self, requests: Vec<Request>) -> DriverStatus {
        self.command(SchedulerEvent::RequestResources { requests })
    }

    pub fn send_framework_message(
        &self,
        executor_id: ExecutorId,
        slave_id: SlaveId,
        data: Vec<u8>,
    ) -> DriverStatus {
        self.command(SchedulerEvent::SendFrameworkMessage {
            executor_id,
            slave_id,
            data,
        })
    }

    /// Abort the driver: subsequent inbound messages are dropped, but the
    /// master keeps the framework's resources for the failover window.
    pub fn abort(&self) -> DriverStatus {
        let status = self.status();
        if status != DriverStatus::Running {
            return status;
        }
        let _ = self.handle.send(SchedulerEvent::Abort);
        self.status.send_replace(DriverStatus::Aborted);
        DriverStatus::Aborted
    }

    /// Stop the driver. With `failover` the framework stays registered at
    /// the master until its failover timeout elapses; without it the
    /// framework is unregistered immediately.
    pub fn stop(&self, failover: bool) -> DriverStatus {
        let status = self.status();
        if status != DriverStatus::Running && status != DriverStatus::Aborted {
            return status;
        }
        let _ = self.handle.send(SchedulerEvent::Stop { failover });
        self.status.send_replace(DriverStatus::Stopped);
        if status == DriverStatus::Aborted {
            DriverStatus::Aborted
        } else {
            DriverStatus::Stopped
        }
    }

    fn command(&self, event: SchedulerEvent) -> DriverStatus {
        let status = self.status();
        if status != DriverStatus::Running {
            return status;
        }
        let _ = self.handle.send(event);
        status
    }
}

/// The per-framework driver: owns the internal actor and surfaces the
/// synchronous API. Callbacks into the [Scheduler] happen on the actor.
pub struct SchedulerDriver {
    scheduler: Arc<dyn Scheduler>,
    framework: FrameworkInfo,
    detector: MasterDetector,
    status: Arc<watch::Sender<DriverStatus>>,
    client: Option<SchedulerDriverClient>,
}

impl SchedulerDriver {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        framework: FrameworkInfo,
        detector: MasterDetector,
    ) -> Self {
        let (status, _) = watch::channel(DriverStatus::NotStarted);
        Self {
            scheduler,
            framework,
            detector,
            status: Arc::new(status),
            client: None,
        }
    }

    pub fn status(&self) -> DriverStatus {
        *self.status.borrow()
    }

    /// The client handle for this driver, available once started.
    pub fn client(&self) -> Option<&SchedulerDriverClient> {
        self.client.as_ref()
    }

    pub fn start(&mut self) -> DriverStatus {
        if self.status() != DriverStatus::NotStarted {
            return self.status();
        }
        let handle = ActorHandle::<SchedulerActor>::new(SchedulerOptions {
            scheduler: Arc::clone(&self.scheduler),
            framework: self.framework.clone(),
            detector: self.detector.clone(),
            status: Arc::clone(&self.status),
        });
        self.client = Some(SchedulerDriverClient::new(handle, Arc::clone(&self.status)));
        self.status.send_replace(DriverStatus::Running);
        DriverStatus::Running
    }

    /// Block the caller until the driver reaches a terminal status.
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

    pub async fn run(&mut self) -> DriverStatus {
        let status = self.start();
        if status != DriverStatus::Running {
            return status;
        }
        self.join().await
    }

    pub fn abort(&self) -> DriverStatus {
        match &self.client {
            Some(client) => client.abort(),
            None => self.status(),
        }
    }

    pub fn stop(&self, failover: bool) -> DriverStatus {
        match &self.client {
            Some(client) => client.stop(failover),
            None => self.status(),
        }
    }
}
