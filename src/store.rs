//! Held task list, active filter and notices; every read and write goes through here.
//!
//! Concurrent refreshes are not serialised: the held list reflects whichever
//! response resolves last, unless [`StoreOptions::discard_stale_refreshes`] is set,
//! in which case a response older than the last applied one is dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::error::GatewayError;
use crate::gateway::TaskGateway;
use crate::models::{Task, TaskExecution, TaskPayload};

/// Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

/// Whether a submit creates a task or replaces one, as the caller intends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Create,
    Update,
}

impl SaveKind {
    fn past_tense(self) -> &'static str {
        match self {
            SaveKind::Create => "created",
            SaveKind::Update => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    pub discard_stale_refreshes: bool,
}

#[derive(Default)]
struct StoreState {
    tasks: Vec<Task>,
    filter: String,
    in_flight: usize,
    notices: Vec<Notice>,
    issued: u64,
    applied: u64,
}

pub struct TaskStore {
    gateway: Arc<dyn TaskGateway>,
    options: StoreOptions,
    state: Mutex<StoreState>,
}

/// Marks one refresh as in flight until dropped, so an abandoned call still clears loading.
struct LoadingGuard<'a> {
    store: &'a TaskStore,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.store.state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn TaskGateway>, options: StoreOptions) -> Self {
        Self {
            gateway,
            options,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, notice: Notice) {
        debug!("notice [{:?}] {}", notice.level, notice.text);
        self.state().notices.push(notice);
    }

    /// Snapshot of the last successful list or search response.
    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn find(&self, id: &str) -> Option<Task> {
        self.state().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn active_filter(&self) -> String {
        self.state().filter.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().in_flight > 0
    }

    /// Drains the notices emitted since the last call, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.state().notices)
    }

    /// Re-fetches the list (search when `fragment` is non-empty) and replaces the held snapshot.
    pub async fn refresh(&self, fragment: &str) -> Result<(), GatewayError> {
        let seq = {
            let mut state = self.state();
            state.filter = fragment.to_string();
            state.in_flight += 1;
            state.issued += 1;
            state.issued
        };
        let guard = LoadingGuard { store: self };

        let result = if fragment.is_empty() {
            self.gateway.list().await
        } else {
            self.gateway.search(fragment).await
        };
        drop(guard);

        match result {
            Ok(tasks) => {
                let mut state = self.state();
                if self.options.discard_stale_refreshes && seq < state.applied {
                    debug!("dropping refresh #{} older than applied #{}", seq, state.applied);
                    return Ok(());
                }
                state.applied = state.applied.max(seq);
                if !fragment.is_empty() && tasks.is_empty() {
                    state
                        .notices
                        .push(Notice::info(format!("No tasks found matching \"{}\".", fragment)));
                }
                debug!("refresh #{} applied {} tasks", seq, tasks.len());
                state.tasks = tasks;
                Ok(())
            }
            Err(err) => {
                self.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    async fn refresh_active(&self) {
        let filter = self.active_filter();
        if let Err(err) = self.refresh(&filter).await {
            warn!("refresh after mutation failed: {}", err);
        }
    }

    /// Creates or fully replaces a task, then refreshes with the active filter.
    pub async fn submit(&self, payload: &TaskPayload, kind: SaveKind) -> Result<Task, GatewayError> {
        match self.gateway.upsert(payload).await {
            Ok(task) => {
                let verb = kind.past_tense();
                info!("task {} {}", task.id, verb);
                self.notify(Notice::success(format!("Task {} {} successfully!", task.id, verb)));
                self.refresh_active().await;
                Ok(task)
            }
            Err(err) => {
                self.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn remove(&self, id: &str) -> Result<(), GatewayError> {
        match self.gateway.delete(id).await {
            Ok(()) => {
                info!("task {} deleted", id);
                self.notify(Notice::success(format!("Task {} deleted successfully.", id)));
                self.refresh_active().await;
                Ok(())
            }
            Err(err) => {
                self.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// Runs the task's command remotely; there is no per-task lock, so runs may overlap.
    pub async fn run(&self, id: &str) -> Result<TaskExecution, GatewayError> {
        match self.gateway.execute(id).await {
            Ok(execution) => {
                info!("task {} executed", id);
                self.notify(Notice::success("Task command executed successfully!"));
                self.refresh_active().await;
                Ok(execution)
            }
            Err(err) => {
                self.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory task service used by store, flow and console tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::error::{GatewayError, Operation};
    use crate::gateway::TaskGateway;
    use crate::models::{Task, TaskExecution, TaskPayload};

    #[derive(Default)]
    pub struct FakeGateway {
        pub tasks: Mutex<Vec<Task>>,
        pub fail: Mutex<HashMap<&'static str, GatewayError>>,
        /// Per-search-fragment artificial latency.
        pub delays: Mutex<HashMap<String, Duration>>,
        pub delete_calls: AtomicUsize,
        pub execute_calls: AtomicUsize,
        pub upsert_calls: AtomicUsize,
        clock: AtomicUsize,
    }

    pub fn task(id: &str, name: &str, owner: &str, command: &str) -> Task {
        Task {
            id: id.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            command: command.to_string(),
            task_executions: Vec::new(),
        }
    }

    pub fn execution(start: &str, end: &str, output: &str) -> TaskExecution {
        TaskExecution {
            start_time: start.to_string(),
            end_time: end.to_string(),
            output: output.to_string(),
        }
    }

    pub fn failed(operation: Operation, status: u16, message: Option<&str>) -> GatewayError {
        GatewayError::OperationFailed {
            operation,
            status,
            message: message.map(str::to_string),
        }
    }

    impl FakeGateway {
        pub fn with_tasks(tasks: Vec<Task>) -> Self {
            let gateway = FakeGateway::default();
            *gateway.tasks.lock().unwrap() = tasks;
            gateway
        }

        pub fn fail_on(&self, op: &'static str, err: GatewayError) {
            self.fail.lock().unwrap().insert(op, err);
        }

        pub fn delay_search(&self, fragment: &str, delay: Duration) {
            self.delays.lock().unwrap().insert(fragment.to_string(), delay);
        }

        pub fn ids(&self) -> Vec<String> {
            self.tasks.lock().unwrap().iter().map(|t| t.id.clone()).collect()
        }

        fn check(&self, op: &'static str) -> Result<(), GatewayError> {
            match self.fail.lock().unwrap().get(op) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl TaskGateway for FakeGateway {
        async fn list(&self) -> Result<Vec<Task>, GatewayError> {
            self.check("list")?;
            Ok(self.tasks.lock().unwrap().clone())
        }

        async fn search(&self, fragment: &str) -> Result<Vec<Task>, GatewayError> {
            let delay = self.delays.lock().unwrap().get(fragment).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check("search")?;
            let needle = fragment.to_lowercase();
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.name.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }

        async fn upsert(&self, payload: &TaskPayload) -> Result<Task, GatewayError> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            self.check("upsert")?;
            let mut tasks = self.tasks.lock().unwrap();
            if let Some(existing) = tasks.iter_mut().find(|t| t.id == payload.id) {
                existing.name = payload.name.clone();
                existing.owner = payload.owner.clone();
                existing.command = payload.command.clone();
                return Ok(existing.clone());
            }
            let created = Task {
                id: payload.id.clone(),
                name: payload.name.clone(),
                owner: payload.owner.clone(),
                command: payload.command.clone(),
                task_executions: Vec::new(),
            };
            tasks.push(created.clone());
            Ok(created)
        }

        async fn delete(&self, id: &str) -> Result<(), GatewayError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.check("delete")?;
            self.tasks.lock().unwrap().retain(|t| t.id != id);
            Ok(())
        }

        async fn execute(&self, id: &str) -> Result<TaskExecution, GatewayError> {
            self.execute_calls.fetch_add(1, Ordering::SeqCst);
            self.check("execute")?;
            let tick = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
            let start = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(tick);
            let end = start + chrono::Duration::milliseconds(1500);
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.iter_mut().find(|t| t.id == id).ok_or(GatewayError::OperationFailed {
                operation: Operation::Execute,
                status: 404,
                message: Some(format!("Task {} not found", id)),
            })?;
            let execution = TaskExecution {
                start_time: start.to_rfc3339(),
                end_time: end.to_rfc3339(),
                output: format!("ran {}", task.command),
            };
            // The service appends; order in the collection is not chronological.
            task.task_executions.insert(0, execution.clone());
            Ok(execution)
        }
    }
}
