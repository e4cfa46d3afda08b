use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed run of a task's command, as recorded by the task service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub command: String,
    #[serde(default)]
    pub task_executions: Vec<TaskExecution>,
}

/// The client-writable part of a task. Executions are server-managed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub command: String,
}

impl Task {
    pub fn run_count(&self) -> usize {
        self.task_executions.len()
    }
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        TaskPayload {
            id: task.id.clone(),
            name: task.name.clone(),
            owner: task.owner.clone(),
            command: task.command.clone(),
        }
    }
}

impl TaskExecution {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.start_time)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.end_time)
    }

    /// Wall-clock duration in seconds, `None` when either timestamp is unreadable.
    pub fn duration_secs(&self) -> Option<f64> {
        let start = self.started_at()?;
        let end = self.ended_at()?;
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

/// Parses the ISO 8601 forms the task service emits.
///
/// Offset-qualified values are normalised to UTC; zone-less values
/// (`2024-05-01T10:00:00.123`) are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
