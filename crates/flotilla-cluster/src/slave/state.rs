use std::collections::HashMap;

use flotilla_server::actor::ActorHandle;
use uuid::Uuid;

use crate::exec::ExecutorActor;
use crate::id::{ExecutorId, FrameworkId, SlaveId, TaskId};
use crate::info::{ExecutorInfo, FrameworkInfo};
use crate::master::RunningTask;
use crate::task::{StatusUpdate, TaskInfo, TaskState};

/// Slave-side bookkeeping of frameworks, executors, tasks, and the pending
/// status updates awaiting acknowledgement.
#[derive(Default)]
pub struct SlaveState {
    pub slave_id: Option<SlaveId>,
    frameworks: HashMap<FrameworkId, SlaveFramework>,
    pending_updates: HashMap<Uuid, StatusUpdate>,
}

pub struct SlaveFramework {
    pub info: FrameworkInfo,
    pub executors: HashMap<ExecutorId, SlaveExecutor>,
}

pub struct SlaveExecutor {
    pub info: ExecutorInfo,
    pub state: SlaveExecutorState,
    pub tasks: HashMap<TaskId, TaskRecord>,
}

pub enum SlaveExecutorState {
    /// The executor is being launched; tasks queue until it registers.
    Registering { queued: Vec<TaskInfo> },
    Running { pid: ActorHandle<ExecutorActor> },
    Terminated,
}

pub struct TaskRecord {
    pub info: TaskInfo,
    pub state: TaskState,
}

impl SlaveState {
    pub fn framework(&self, framework_id: &FrameworkId) -> Option<&SlaveFramework> {
        self.frameworks.get(framework_id)
    }

    pub fn framework_mut(&mut self, framework_id: &FrameworkId) -> Option<&mut SlaveFramework> {
        self.frameworks.get_mut(framework_id)
    }

    pub fn framework_or_insert(
        &mut self,
        framework_id: FrameworkId,
        info: FrameworkInfo,
    ) -> &mut SlaveFramework {
        self.frameworks.entry(framework_id).or_insert_with(|| SlaveFramework {
            info,
            executors: HashMap::new(),
        })
    }

    pub fn remove_framework(&mut self, framework_id: &FrameworkId) -> Option<SlaveFramework> {
        self.pending_updates
            .retain(|_, update| update.framework_id != *framework_id);
        self.frameworks.remove(framework_id)
    }

    pub fn frameworks(&self) -> impl Iterator<Item = (&FrameworkId, &SlaveFramework)> {
        self.frameworks.iter()
    }

    pub fn executor_mut(
        &mut self,
        framework_id: &FrameworkId,
        executor_id: &ExecutorId,
    ) -> Option<&mut SlaveExecutor> {
        self.frameworks
            .get_mut(framework_id)?
            .executors
            .get_mut(executor_id)
    }

    /// The executor owning the given task.
    pub fn executor_for_task(
        &mut self,
        framework_id: &FrameworkId,
        task_id: &TaskId,
    ) -> Option<&mut SlaveExecutor> {
        self.frameworks
            .get_mut(framework_id)?
            .executors
            .values_mut()
            .find(|executor| {
                executor.tasks.contains_key(task_id)
                    || matches!(
                        &executor.state,
                        SlaveExecutorState::Registering { queued }
                            if queued.iter().any(|t| t.task_id == *task_id)
                    )
            })
    }

    pub fn add_pending_update(&mut self, update: StatusUpdate) {
        self.pending_updates.insert(update.uuid, update);
    }

    pub fn pending_update(&self, uuid: &Uuid) -> Option<&StatusUpdate> {
        self.pending_updates.get(uuid)
    }

    pub fn remove_pending_update(&mut self, uuid: &Uuid) -> Option<StatusUpdate> {
        self.pending_updates.remove(uuid)
    }

    pub fn pending_updates(&self) -> impl Iterator<Item = &StatusUpdate> {
        self.pending_updates.values()
    }

    pub fn pending_update_count(&self) -> usize {
        self.pending_updates.len()
    }

    /// Snapshot every known task for master re-registration.
    pub fn running_tasks(&self) -> Vec<RunningTask> {
        let mut out = vec![];
        for (framework_id, framework) in &self.frameworks {
            for (executor_id, executor) in &framework.executors {
                for (task_id, record) in &executor.tasks {
                    out.push(RunningTask {
                        framework_id: framework_id.clone(),
                        task_id: task_id.clone(),
                        executor_id: executor_id.clone(),
                        name: record.info.name.clone(),
                        resources: record.info.resources.clone(),
                        min_resources: record.info.min_resources.clone(),
                        state: record.state,
                    });
                }
            }
        }
        out
    }

    pub fn executor_count(&self) -> usize {
        self.frameworks.values().map(|f| f.executors.len()).sum()
    }

    pub fn queued_task_count(&self) -> usize {
        self.frameworks
            .values()
            .flat_map(|f| f.executors.values())
            .map(|e| match &e.state {
                SlaveExecutorState::Registering { queued } => queued.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn active_task_count(&self) -> usize {
        self.frameworks
            .values()
            .flat_map(|f| f.executors.values())
            .map(|e| e.tasks.len())
            .sum()
    }
}
