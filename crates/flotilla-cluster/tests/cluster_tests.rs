//! End-to-end scenarios over an in-process cluster: registration, offers,
//! task launches, status update delivery, framework failover, and slave
//! loss. The virtual clock is driven by the paused tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flotilla_cluster::exec::{Executor, ExecutorDriverClient};
use flotilla_cluster::id::{FrameworkId, OfferId, SlaveId, TaskId};
use flotilla_cluster::info::{
    CommandInfo, ExecutorInfo, FrameworkInfo, MasterInfo, Offer, SlaveInfo,
};
use flotilla_cluster::launcher::LocalLauncher;
use flotilla_cluster::local::LocalCluster;
use flotilla_cluster::master::{MasterActor, MasterEvent, MasterSnapshot};
use flotilla_cluster::resources::Resources;
use flotilla_cluster::sched::{
    DriverStatus, Scheduler, SchedulerDriver, SchedulerDriverClient,
};
use flotilla_cluster::slave::{SlaveActor, SlaveEvent, SlaveSnapshot};
use flotilla_cluster::task::{Filters, TaskInfo, TaskState, TaskStatus};
use flotilla_common::config::{AppConfig, ConfigLoadOptions};
use flotilla_server::actor::{ActorHandle, ActorSystem};
use tokio::sync::oneshot;

#[derive(Default)]
struct TestScheduler {
    registered: Mutex<Option<FrameworkId>>,
    reregistered: AtomicBool,
    offers: Mutex<Vec<Offer>>,
    rescinded: Mutex<Vec<OfferId>>,
    statuses: Mutex<Vec<TaskStatus>>,
    messages: Mutex<Vec<Vec<u8>>>,
    lost_slaves: Mutex<Vec<SlaveId>>,
    errors: Mutex<Vec<String>>,
}

impl TestScheduler {
    fn framework_id(&self) -> Option<FrameworkId> {
        self.registered.lock().unwrap().clone()
    }

    fn offer_count(&self) -> usize {
        self.offers.lock().unwrap().len()
    }

    fn offer(&self, index: usize) -> Option<Offer> {
        self.offers.lock().unwrap().get(index).cloned()
    }

    fn state_of(&self, task_id: &TaskId) -> Vec<TaskState> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.task_id == *task_id)
            .map(|s| s.state)
            .collect()
    }
}

impl Scheduler for TestScheduler {
    fn registered(
        &self,
        _driver: &SchedulerDriverClient,
        framework_id: &FrameworkId,
        _master: &MasterInfo,
    ) {
        *self.registered.lock().unwrap() = Some(framework_id.clone());
    }

    fn reregistered(&self, _driver: &SchedulerDriverClient, _master: &MasterInfo) {
        self.reregistered.store(true, Ordering::SeqCst);
    }

    fn resource_offers(&self, _driver: &SchedulerDriverClient, offers: Vec<Offer>) {
        self.offers.lock().unwrap().extend(offers);
    }

    fn offer_rescinded(&self, _driver: &SchedulerDriverClient, offer_id: &OfferId) {
        self.rescinded.lock().unwrap().push(offer_id.clone());
    }

    fn status_update(&self, _driver: &SchedulerDriverClient, status: TaskStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn framework_message(
        &self,
        _driver: &SchedulerDriverClient,
        _slave_id: &SlaveId,
        _executor_id: &flotilla_cluster::id::ExecutorId,
        data: Vec<u8>,
    ) {
        self.messages.lock().unwrap().push(data);
    }

    fn slave_lost(&self, _driver: &SchedulerDriverClient, slave_id: &SlaveId) {
        self.lost_slaves.lock().unwrap().push(slave_id.clone());
    }

    fn error(&self, _driver: &SchedulerDriverClient, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ExecutorMode {
    /// Report every launched task as running and then finished.
    AutoFinish,
    /// Report running and keep the task alive.
    RunningOnly,
    /// Report nothing; the test drives updates through the stored client.
    Manual,
    /// Violate the protocol by claiming `TASK_STAGING`.
    SendStaging,
}

struct TestExecutor {
    mode: ExecutorMode,
    client: Mutex<Option<ExecutorDriverClient>>,
    launched: Mutex<Vec<TaskId>>,
    killed: Mutex<Vec<TaskId>>,
    messages: Mutex<Vec<Vec<u8>>>,
    shutdown: AtomicBool,
    errors: Mutex<Vec<String>>,
}

impl TestExecutor {
    fn new(mode: ExecutorMode) -> Self {
        Self {
            mode,
            client: Mutex::new(None),
            launched: Mutex::new(vec![]),
            killed: Mutex::new(vec![]),
            messages: Mutex::new(vec![]),
            shutdown: AtomicBool::new(false),
            errors: Mutex::new(vec![]),
        }
    }

    fn client(&self) -> Option<ExecutorDriverClient> {
        self.client.lock().unwrap().clone()
    }
}

impl Executor for TestExecutor {
    fn registered(
        &self,
        driver: &ExecutorDriverClient,
        _executor: &ExecutorInfo,
        _framework: &FrameworkInfo,
        _slave: &SlaveInfo,
    ) {
        *self.client.lock().unwrap() = Some(driver.clone());
    }

    fn launch_task(&self, driver: &ExecutorDriverClient, task: TaskInfo) {
        self.launched.lock().unwrap().push(task.task_id.clone());
        match self.mode {
            ExecutorMode::AutoFinish => {
                driver.send_status_update(TaskStatus::new(task.task_id.clone(), TaskState::Running));
                driver.send_status_update(TaskStatus::new(task.task_id, TaskState::Finished));
            }
            ExecutorMode::RunningOnly => {
                driver.send_status_update(TaskStatus::new(task.task_id, TaskState::Running));
            }
            ExecutorMode::Manual => {}
            ExecutorMode::SendStaging => {
                driver.send_status_update(TaskStatus::new(task.task_id, TaskState::Staging));
            }
        }
    }

    fn kill_task(&self, driver: &ExecutorDriverClient, task_id: &TaskId) {
        self.killed.lock().unwrap().push(task_id.clone());
        driver.send_status_update(TaskStatus::new(task_id.clone(), TaskState::Killed));
    }

    fn framework_message(&self, driver: &ExecutorDriverClient, data: Vec<u8>) {
        self.messages.lock().unwrap().push(data.clone());
        driver.send_framework_message(data);
    }

    fn shutdown(&self, _driver: &ExecutorDriverClient) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn error(&self, _driver: &ExecutorDriverClient, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

struct TestCluster {
    cluster: LocalCluster,
    scheduler: Arc<TestScheduler>,
    executors: Arc<Mutex<Vec<Arc<TestExecutor>>>>,
    driver: SchedulerDriver,
    client: SchedulerDriverClient,
}

impl TestCluster {
    fn executor(&self, index: usize) -> Arc<TestExecutor> {
        self.executors.lock().unwrap()[index].clone()
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::load(ConfigLoadOptions::default()).unwrap();
    config.slave.resources = "cpus:2;mem:1024".to_string();
    config.slave.status_update_retry_interval_seconds = 2.0;
    config
}

fn framework_info(id: Option<FrameworkId>) -> FrameworkInfo {
    FrameworkInfo {
        id,
        name: "test framework".to_string(),
        user: "tester".to_string(),
        failover_timeout: 1000.0,
        capabilities: vec![],
    }
}

fn task_info(offer: &Offer, task_id: &str, resources: &str) -> TaskInfo {
    let resources = Resources::parse(resources).unwrap();
    TaskInfo {
        task_id: TaskId::from(task_id),
        name: task_id.to_string(),
        slave_id: offer.slave_id.clone(),
        min_resources: resources.clone(),
        resources,
        executor: Some(ExecutorInfo {
            executor_id: flotilla_cluster::id::ExecutorId::from("executor-1"),
            command: CommandInfo {
                value: "./executor".to_string(),
                environment: vec![],
            },
            resources: Resources::new(),
            data: vec![],
        }),
        command: None,
        data: vec![],
    }
}

fn no_filters() -> Filters {
    Filters {
        refuse_seconds: 0.0,
    }
}

async fn start_cluster(num_slaves: usize, mode: ExecutorMode) -> (ActorSystem, TestCluster) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut system = ActorSystem::new();
    let executors: Arc<Mutex<Vec<Arc<TestExecutor>>>> = Arc::new(Mutex::new(vec![]));
    let registry = Arc::clone(&executors);
    let launcher = Arc::new(LocalLauncher::new(move || {
        let executor = Arc::new(TestExecutor::new(mode));
        registry.lock().unwrap().push(Arc::clone(&executor));
        executor as Arc<dyn Executor>
    }));
    let cluster = LocalCluster::launch(&mut system, &test_config(), num_slaves, launcher).unwrap();
    let scheduler = Arc::new(TestScheduler::default());
    let mut driver = SchedulerDriver::new(
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        framework_info(None),
        cluster.detector.clone(),
    );
    assert_eq!(driver.start(), DriverStatus::Running);
    let client = driver.client().unwrap().clone();
    let harness = TestCluster {
        cluster,
        scheduler,
        executors,
        driver,
        client,
    };
    (system, harness)
}

/// Let in-flight messages drain without advancing the clock.
async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Poll until the condition yields a value, letting the paused clock
/// auto-advance over any pending timers.
async fn eventually<T>(mut condition: impl FnMut() -> Option<T>) -> T {
    for _ in 0..600 {
        if let Some(value) = condition() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition was not met in time");
}

async fn master_snapshot(master: &ActorHandle<MasterActor>) -> MasterSnapshot {
    let (tx, rx) = oneshot::channel();
    master.send(MasterEvent::Inspect { reply: tx }).unwrap();
    rx.await.unwrap()
}

async fn slave_snapshot(slave: &ActorHandle<SlaveActor>) -> SlaveSnapshot {
    let (tx, rx) = oneshot::channel();
    slave.send(SlaveEvent::Inspect { reply: tx }).unwrap();
    rx.await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_framework_registers_and_receives_offers() {
    let (_system, harness) = start_cluster(1, ExecutorMode::Manual).await;
    let framework_id = eventually(|| harness.scheduler.framework_id()).await;
    assert!(!framework_id.as_str().is_empty());

    let offer = eventually(|| harness.scheduler.offer(0)).await;
    assert_eq!(offer.framework_id, framework_id);
    assert_eq!(
        offer.resources.expected,
        Resources::parse("cpus:2;mem:1024").unwrap()
    );

    let snapshot = master_snapshot(&harness.cluster.master).await;
    assert_eq!(snapshot.offers.len(), 1);
    assert_eq!(snapshot.slaves.len(), 1);
    let slave = snapshot.slaves.values().next().unwrap();
    assert_eq!(slave.available, Resources::new());
}

#[tokio::test(start_paused = true)]
async fn test_task_runs_to_completion_and_resources_recover() {
    let (_system, harness) = start_cluster(1, ExecutorMode::AutoFinish).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let task = task_info(&offer, "task-1", "cpus:1;mem:512");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());

    let states = eventually(|| {
        let states = harness.scheduler.state_of(&TaskId::from("task-1"));
        states.contains(&TaskState::Finished).then_some(states)
    })
    .await;
    assert!(states.contains(&TaskState::Running));

    // Acknowledgements flow back to the slave and stop retransmission.
    let slave = eventually_slave_drained(&harness).await;
    assert_eq!(slave.pending_updates, 0);

    // The task's resources return to the pool and are offered again.
    eventually(|| {
        let offers = harness.scheduler.offers.lock().unwrap();
        offers
            .iter()
            .skip(1)
            .any(|o| o.resources.expected.contains(&Resources::parse("cpus:1;mem:512").unwrap()))
            .then_some(())
    })
    .await;

    let snapshot = master_snapshot(&harness.cluster.master).await;
    let framework = snapshot.frameworks.values().next().unwrap();
    assert!(framework.tasks.is_empty());
}

async fn eventually_slave_drained(harness: &TestCluster) -> SlaveSnapshot {
    let slave = harness.cluster.slaves[0].clone();
    for _ in 0..600 {
        let snapshot = slave_snapshot(&slave).await;
        if snapshot.pending_updates == 0 && snapshot.slave_id.is_some() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("slave still has pending status updates");
}

#[tokio::test(start_paused = true)]
async fn test_refused_resources_are_filtered_until_expiry() {
    let (_system, harness) = start_cluster(1, ExecutorMode::Manual).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    harness.client.decline_offer(
        offer.offer_id.clone(),
        Filters {
            refuse_seconds: 5.0,
        },
    );
    settle().await;
    assert_eq!(harness.scheduler.offer_count(), 1);

    // Within the refusal window the slave stays filtered through several
    // allocation rounds.
    tokio::time::advance(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(harness.scheduler.offer_count(), 1);

    // Once the filter expires the resources come back.
    tokio::time::advance(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(harness.scheduler.offer_count(), 2);
    let offer = harness.scheduler.offer(1).unwrap();
    assert_eq!(
        offer.resources.expected,
        Resources::parse("cpus:2;mem:1024").unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_revive_offers_clears_filters() {
    let (_system, harness) = start_cluster(1, ExecutorMode::Manual).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    harness.client.decline_offer(
        offer.offer_id.clone(),
        Filters {
            refuse_seconds: 1000.0,
        },
    );
    settle().await;
    assert_eq!(harness.scheduler.offer_count(), 1);

    harness.client.revive_offers();
    eventually(|| (harness.scheduler.offer_count() >= 2).then_some(())).await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_tasks_are_reported_lost() {
    let (_system, harness) = start_cluster(1, ExecutorMode::Manual).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    // A task with both an executor and a command is refused by the driver
    // before it ever reaches the master.
    let mut both = task_info(&offer, "task-both", "cpus:1;mem:256");
    both.command = Some(CommandInfo {
        value: "./task".to_string(),
        environment: vec![],
    });
    // A task that does not fit the offer is refused by the master.
    let oversized = task_info(&offer, "task-oversized", "cpus:100;mem:256");

    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![both, oversized], no_filters());

    let states = eventually(|| {
        let states = harness.scheduler.state_of(&TaskId::from("task-both"));
        (!states.is_empty()).then_some(states)
    })
    .await;
    assert_eq!(states, vec![TaskState::Lost]);

    let states = eventually(|| {
        let states = harness.scheduler.state_of(&TaskId::from("task-oversized"));
        (!states.is_empty()).then_some(states)
    })
    .await;
    assert_eq!(states, vec![TaskState::Lost]);

    let snapshot = master_snapshot(&harness.cluster.master).await;
    let framework = snapshot.frameworks.values().next().unwrap();
    assert!(framework.tasks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_launch_on_the_same_offer_loses() {
    let (_system, harness) = start_cluster(1, ExecutorMode::RunningOnly).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let first = task_info(&offer, "task-1", "cpus:1;mem:256");
    let second = task_info(&offer, "task-2", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![first], no_filters());
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![second], no_filters());

    let states = eventually(|| {
        let states = harness.scheduler.state_of(&TaskId::from("task-1"));
        states.contains(&TaskState::Running).then_some(states)
    })
    .await;
    assert!(!states.contains(&TaskState::Lost));

    let states = eventually(|| {
        let states = harness.scheduler.state_of(&TaskId::from("task-2"));
        (!states.is_empty()).then_some(states)
    })
    .await;
    assert_eq!(states, vec![TaskState::Lost]);
}

#[tokio::test(start_paused = true)]
async fn test_kill_task_round_trip() {
    let (_system, harness) = start_cluster(1, ExecutorMode::RunningOnly).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());
    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Running)
            .then_some(())
    })
    .await;

    harness.client.kill_task(TaskId::from("task-1"));
    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Killed)
            .then_some(())
    })
    .await;
    let killed = harness.executor(0).killed.lock().unwrap().clone();
    assert_eq!(killed, vec![TaskId::from("task-1")]);
}

#[tokio::test(start_paused = true)]
async fn test_framework_message_round_trip() {
    let (_system, harness) = start_cluster(1, ExecutorMode::RunningOnly).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;
    let slave_id = offer.slave_id.clone();

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());
    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Running)
            .then_some(())
    })
    .await;

    // The test executor echoes every framework message back.
    harness.client.send_framework_message(
        flotilla_cluster::id::ExecutorId::from("executor-1"),
        slave_id,
        b"ping".to_vec(),
    );
    let echoed = eventually(|| harness.scheduler.messages.lock().unwrap().first().cloned()).await;
    assert_eq!(echoed, b"ping".to_vec());
    let received = harness.executor(0).messages.lock().unwrap().clone();
    assert_eq!(received, vec![b"ping".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_failover_keeps_tasks_within_the_window() {
    let (_system, harness) = start_cluster(1, ExecutorMode::RunningOnly).await;
    let framework_id = eventually(|| harness.scheduler.framework_id()).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());
    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Running)
            .then_some(())
    })
    .await;

    // The first driver stops with failover; the master keeps the task.
    harness.driver.stop(true);
    eventually_inactive(&harness, &framework_id).await;
    let snapshot = master_snapshot(&harness.cluster.master).await;
    assert_eq!(
        snapshot.frameworks[&framework_id].tasks.len(),
        1,
        "tasks must survive the failover window"
    );

    // A second scheduler takes over the same framework identifier.
    let scheduler2 = Arc::new(TestScheduler::default());
    let mut driver2 = SchedulerDriver::new(
        Arc::clone(&scheduler2) as Arc<dyn Scheduler>,
        framework_info(Some(framework_id.clone())),
        harness.cluster.detector.clone(),
    );
    driver2.start();
    eventually(|| scheduler2.reregistered.load(Ordering::SeqCst).then_some(())).await;

    // The running task can still report to the new scheduler.
    let executor = harness.executor(0);
    let client = executor.client().unwrap();
    client.send_status_update(TaskStatus::new(TaskId::from("task-1"), TaskState::Finished));
    eventually(|| {
        scheduler2
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Finished)
            .then_some(())
    })
    .await;
    driver2.stop(false);
}

async fn eventually_inactive(harness: &TestCluster, framework_id: &FrameworkId) {
    let master = harness.cluster.master.clone();
    for _ in 0..600 {
        let snapshot = master_snapshot(&master).await;
        if snapshot
            .frameworks
            .get(framework_id)
            .is_some_and(|f| !f.active)
        {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("framework did not become inactive");
}

#[tokio::test(start_paused = true)]
async fn test_failover_timeout_removes_the_framework() {
    let (_system, harness) = start_cluster(1, ExecutorMode::RunningOnly).await;
    let framework_id = eventually(|| harness.scheduler.framework_id()).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());
    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Running)
            .then_some(())
    })
    .await;

    harness.driver.stop(true);
    eventually_inactive(&harness, &framework_id).await;

    // Let the failover timeout elapse without a reconnect.
    tokio::time::advance(Duration::from_secs(1001)).await;
    settle().await;

    let snapshot = master_snapshot(&harness.cluster.master).await;
    assert!(snapshot.frameworks.is_empty());
    let slave = snapshot.slaves.values().next().unwrap();
    assert_eq!(slave.in_use, Resources::new());
    // The executor was told to shut down.
    eventually(|| {
        harness
            .executor(0)
            .shutdown
            .load(Ordering::SeqCst)
            .then_some(())
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_slave_loss_marks_tasks_lost_and_rescinds_offers() {
    let (_system, harness) = start_cluster(2, ExecutorMode::RunningOnly).await;
    // Wait for both slaves to be offered.
    eventually(|| (harness.scheduler.offer_count() >= 2).then_some(())).await;
    let offer = harness.scheduler.offer(0).unwrap();

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());
    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Running)
            .then_some(())
    })
    .await;

    // Kill the slave that runs the task, identified through its snapshot.
    let lost_slave = offer.slave_id.clone();
    let mut target = None;
    for (i, slave) in harness.cluster.slaves.iter().enumerate() {
        let snapshot = slave_snapshot(slave).await;
        if snapshot.slave_id.as_ref() == Some(&lost_slave) {
            target = Some(i);
        }
    }
    let target = target.expect("the offered slave must be part of the cluster");
    harness.cluster.slaves[target]
        .send(SlaveEvent::Shutdown)
        .unwrap();

    eventually(|| {
        harness
            .scheduler
            .state_of(&TaskId::from("task-1"))
            .contains(&TaskState::Lost)
            .then_some(())
    })
    .await;
    eventually(|| {
        harness
            .scheduler
            .lost_slaves
            .lock()
            .unwrap()
            .contains(&lost_slave)
            .then_some(())
    })
    .await;

    let snapshot = master_snapshot(&harness.cluster.master).await;
    assert_eq!(snapshot.slaves.len(), 1);
    assert!(!snapshot.slaves.contains_key(&lost_slave));
    let framework = snapshot.frameworks.values().next().unwrap();
    assert!(framework.tasks.is_empty());
    // The outstanding offer on the lost slave was rescinded.
    assert!(!harness.scheduler.rescinded.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_executor_may_not_send_staging_updates() {
    let (_system, harness) = start_cluster(1, ExecutorMode::SendStaging).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());

    let errors = eventually(|| {
        let executors = harness.executors.lock().unwrap();
        let executor = executors.first()?.clone();
        drop(executors);
        let errors = executor.errors.lock().unwrap().clone();
        (!errors.is_empty()).then_some(errors)
    })
    .await;
    assert!(errors[0].contains("TASK_STAGING"));

    // The offending update never reaches the scheduler, and the error stays
    // on the executor side of the protocol.
    assert!(harness
        .scheduler
        .state_of(&TaskId::from("task-1"))
        .is_empty());
    assert!(harness.scheduler.errors.lock().unwrap().is_empty());
    let executor = harness.executor(0);
    assert_eq!(executor.client().unwrap().status(), DriverStatus::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_updates_stay_pending() {
    let (_system, harness) = start_cluster(1, ExecutorMode::Manual).await;
    let offer = eventually(|| harness.scheduler.offer(0)).await;

    let task = task_info(&offer, "task-1", "cpus:1;mem:256");
    harness
        .client
        .launch_tasks(offer.offer_id.clone(), vec![task], no_filters());
    eventually(|| {
        let executors = harness.executors.lock().unwrap();
        let launched = executors.first()?.launched.lock().unwrap().clone();
        (!launched.is_empty()).then_some(())
    })
    .await;

    // The aborted driver drops inbound messages, so nothing acknowledges
    // the update below.
    harness.driver.abort();
    settle().await;
    let executor = harness.executor(0);
    let client = eventually(|| executor.client()).await;
    client.send_status_update(TaskStatus::new(TaskId::from("task-1"), TaskState::Finished));
    settle().await;

    let slave = &harness.cluster.slaves[0];
    assert_eq!(slave_snapshot(slave).await.pending_updates, 1);

    // The update is retransmitted on the retry interval and stays pending
    // for as long as no acknowledgement arrives.
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(slave_snapshot(slave).await.pending_updates, 1);
}
