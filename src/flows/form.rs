use chrono::Utc;
use log::debug;
use thiserror::Error;

use crate::editor::TextField;
use crate::error::GatewayError;
use crate::models::{Task, TaskPayload};
use crate::store::{SaveKind, TaskStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Id,
    Name,
    Owner,
    Command,
}

impl FormField {
    pub const ALL: [FormField; 4] = [FormField::Id, FormField::Name, FormField::Owner, FormField::Command];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Id => "Task ID",
            FormField::Name => "Task Name",
            FormField::Owner => "Owner",
            FormField::Command => "Shell Command",
        }
    }

    fn required_message(self) -> &'static str {
        match self {
            FormField::Id => "Task ID is required for the API.",
            FormField::Name => "Please input the task name!",
            FormField::Owner => "Please input the task owner!",
            FormField::Command => "Please input the shell command!",
        }
    }

    fn next(self) -> Self {
        match self {
            FormField::Id => FormField::Name,
            FormField::Name => FormField::Owner,
            FormField::Owner => FormField::Command,
            FormField::Command => FormField::Id,
        }
    }

    fn previous(self) -> Self {
        match self {
            FormField::Id => FormField::Command,
            FormField::Name => FormField::Id,
            FormField::Owner => FormField::Name,
            FormField::Command => FormField::Owner,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .missing.iter().map(|f| f.required_message()).collect::<Vec<_>>().join(" "))]
pub struct ValidationError {
    pub missing: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    /// Editing the task with this id; the id field is locked to it.
    Edit { bound_id: String },
}

#[derive(Debug, Clone)]
pub struct FormSession {
    pub mode: FormMode,
    pub id: TextField,
    pub name: TextField,
    pub owner: TextField,
    pub command: TextField,
    pub focus: FormField,
    pub error: Option<String>,
    pub submitting: bool,
}

/// What the parent should do once a submit completes.
#[derive(Debug, Clone, PartialEq)]
pub enum FormOutcome {
    Saved(Task),
    /// The form stays open showing the error; fields are kept for retry.
    Failed,
    /// The form was closed before the request finished.
    Discarded,
}

#[derive(Debug, Clone, Default)]
pub enum TaskForm {
    #[default]
    Closed,
    Open(FormSession),
}

/// Seed for the required id field in create mode; the operator may overwrite it.
pub fn placeholder_id() -> String {
    format!("TEMP-{}", Utc::now().timestamp_millis())
}

impl FormSession {
    pub fn field(&self, field: FormField) -> &TextField {
        match field {
            FormField::Id => &self.id,
            FormField::Name => &self.name,
            FormField::Owner => &self.owner,
            FormField::Command => &self.command,
        }
    }

    pub fn field_mut(&mut self, field: FormField) -> &mut TextField {
        match field {
            FormField::Id => &mut self.id,
            FormField::Name => &mut self.name,
            FormField::Owner => &mut self.owner,
            FormField::Command => &mut self.command,
        }
    }

    pub fn focused_mut(&mut self) -> &mut TextField {
        let focus = self.focus;
        self.field_mut(focus)
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.mode, FormMode::Edit { .. })
    }

    pub fn save_kind(&self) -> SaveKind {
        match self.mode {
            FormMode::Create => SaveKind::Create,
            FormMode::Edit { .. } => SaveKind::Update,
        }
    }

    fn verb(&self) -> &'static str {
        if self.is_edit() {
            "update"
        } else {
            "create"
        }
    }

    /// Builds the payload; in edit mode the id always comes from the bound task.
    pub fn payload(&self) -> Result<TaskPayload, ValidationError> {
        let id = match &self.mode {
            FormMode::Edit { bound_id } => bound_id.clone(),
            FormMode::Create => self.id.value().trim().to_string(),
        };
        let payload = TaskPayload {
            id,
            name: self.name.value().trim().to_string(),
            owner: self.owner.value().trim().to_string(),
            command: self.command.value(),
        };

        let missing: Vec<FormField> = [
            (FormField::Id, payload.id.as_str()),
            (FormField::Name, payload.name.as_str()),
            (FormField::Owner, payload.owner.as_str()),
            (FormField::Command, payload.command.trim()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(payload)
        } else {
            Err(ValidationError { missing })
        }
    }
}

impl TaskForm {
    pub fn open_create(&mut self) {
        *self = TaskForm::Open(FormSession {
            mode: FormMode::Create,
            id: TextField::single_line(&placeholder_id()),
            name: TextField::single_line(""),
            owner: TextField::single_line(""),
            command: TextField::multi_line(""),
            focus: FormField::Id,
            error: None,
            submitting: false,
        });
    }

    pub fn open_edit(&mut self, task: &Task) {
        *self = TaskForm::Open(FormSession {
            mode: FormMode::Edit {
                bound_id: task.id.clone(),
            },
            id: TextField::single_line(&task.id).lock(),
            name: TextField::single_line(&task.name),
            owner: TextField::single_line(&task.owner),
            command: TextField::multi_line(&task.command),
            focus: FormField::Name,
            error: None,
            submitting: false,
        });
    }

    pub fn close(&mut self) {
        *self = TaskForm::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TaskForm::Open(_))
    }

    pub fn session(&self) -> Option<&FormSession> {
        match self {
            TaskForm::Open(session) => Some(session),
            TaskForm::Closed => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut FormSession> {
        match self {
            TaskForm::Open(session) => Some(session),
            TaskForm::Closed => None,
        }
    }

    /// Replaces a field's text. The id is ignored in edit mode.
    pub fn set(&mut self, field: FormField, value: &str) {
        if let Some(session) = self.session_mut() {
            let target = session.field_mut(field);
            if target.locked {
                return;
            }
            *target = if target.multiline {
                TextField::multi_line(value)
            } else {
                TextField::single_line(value)
            };
        }
    }

    pub fn focus_next(&mut self) {
        if let Some(session) = self.session_mut() {
            session.focus = session.focus.next();
        }
    }

    pub fn focus_previous(&mut self) {
        if let Some(session) = self.session_mut() {
            session.focus = session.focus.previous();
        }
    }

    /// Validates and marks the form as submitting. Returns the payload to upsert.
    pub fn begin_submit(&mut self) -> Option<(TaskPayload, SaveKind)> {
        let session = self.session_mut()?;
        if session.submitting {
            return None;
        }
        match session.payload() {
            Ok(payload) => {
                session.error = None;
                session.submitting = true;
                Some((payload, session.save_kind()))
            }
            Err(err) => {
                debug!("form validation failed: {:?}", err.missing);
                session.error = Some(err.to_string());
                None
            }
        }
    }

    pub fn finish_submit(&mut self, result: Result<Task, GatewayError>) -> FormOutcome {
        let Some(session) = self.session_mut() else {
            return FormOutcome::Discarded;
        };
        session.submitting = false;
        match result {
            Ok(task) => {
                self.close();
                FormOutcome::Saved(task)
            }
            Err(err) => {
                let verb = session.verb();
                session.error = Some(match err.server_message() {
                    Some(message) => format!("Failed to {} task: {}", verb, message),
                    None => format!("Failed to {} task. Check API status.", verb),
                });
                FormOutcome::Failed
            }
        }
    }

    /// Validates, submits through the store and applies the result.
    pub async fn submit_with(&mut self, store: &TaskStore) -> FormOutcome {
        let Some((payload, kind)) = self.begin_submit() else {
            return FormOutcome::Failed;
        };
        let result = store.submit(&payload, kind).await;
        self.finish_submit(result)
    }
}
