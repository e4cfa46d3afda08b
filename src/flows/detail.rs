use std::cmp::Ordering;

use crate::error::GatewayError;
use crate::models::{Task, TaskExecution};
use crate::store::TaskStore;

/// One line of execution history as presented.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: Option<f64>,
    pub output: String,
}

impl From<&TaskExecution> for HistoryEntry {
    fn from(execution: &TaskExecution) -> Self {
        HistoryEntry {
            start_time: execution.start_time.clone(),
            end_time: execution.end_time.clone(),
            duration_secs: execution.duration_secs(),
            output: execution.output.clone(),
        }
    }
}

/// Newest first by start time. Unreadable timestamps sort last, ties keep service order.
pub fn history(task: &Task) -> Vec<HistoryEntry> {
    let mut executions: Vec<&TaskExecution> = task.task_executions.iter().collect();
    executions.sort_by(|a, b| match (a.started_at(), b.started_at()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    executions.into_iter().map(HistoryEntry::from).collect()
}

#[derive(Debug, Clone)]
pub struct DetailSession {
    pub task: Task,
    pub history: Vec<HistoryEntry>,
    pub error: Option<String>,
    pub running: bool,
    pub scroll: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RerunOutcome {
    /// The view closed; the parent shows the refreshed list.
    Completed(TaskExecution),
    Failed,
    Discarded,
}

#[derive(Debug, Clone, Default)]
pub enum DetailView {
    #[default]
    Closed,
    Open(DetailSession),
}

impl DetailView {
    pub fn open(&mut self, task: Task) {
        let history = history(&task);
        *self = DetailView::Open(DetailSession {
            task,
            history,
            error: None,
            running: false,
            scroll: 0,
        });
    }

    pub fn close(&mut self) {
        *self = DetailView::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self, DetailView::Open(_))
    }

    pub fn session(&self) -> Option<&DetailSession> {
        match self {
            DetailView::Open(session) => Some(session),
            DetailView::Closed => None,
        }
    }

    pub fn scroll_down(&mut self) {
        if let DetailView::Open(session) = self {
            if session.scroll + 1 < session.history.len() {
                session.scroll += 1;
            }
        }
    }

    pub fn scroll_up(&mut self) {
        if let DetailView::Open(session) = self {
            session.scroll = session.scroll.saturating_sub(1);
        }
    }

    /// Returns the id to run, or `None` when closed or a rerun is already pending.
    pub fn begin_rerun(&mut self) -> Option<String> {
        match self {
            DetailView::Open(session) if !session.running => {
                session.running = true;
                session.error = None;
                Some(session.task.id.clone())
            }
            _ => None,
        }
    }

    pub fn finish_rerun(&mut self, result: Result<TaskExecution, GatewayError>) -> RerunOutcome {
        let DetailView::Open(session) = &mut *self else {
            return RerunOutcome::Discarded;
        };
        session.running = false;
        match result {
            Ok(execution) => {
                self.close();
                RerunOutcome::Completed(execution)
            }
            Err(err) => {
                session.error = Some(match err.server_message() {
                    Some(message) => format!("Failed to run task: {}", message),
                    None => "Failed to run task command.".to_string(),
                });
                RerunOutcome::Failed
            }
        }
    }

    pub async fn rerun_with(&mut self, store: &TaskStore) -> RerunOutcome {
        let Some(id) = self.begin_rerun() else {
            return RerunOutcome::Discarded;
        };
        let result = store.run(&id).await;
        self.finish_rerun(result)
    }
}
