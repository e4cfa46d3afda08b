//! One-shot command-line handlers. Each goes through the same store and flows as the TUI.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, bail, Result};

use crate::error::GatewayError;
use crate::flows::detail::history;
use crate::flows::form::FormOutcome;
use crate::flows::{DeleteConfirm, FormField, TaskForm};
use crate::listing::{rows, NameSort, TaskRow};
use crate::store::{Notice, NoticeLevel, TaskStore};

/// Drains the store's notices. When the command is about to fail, its error
/// notice is dropped because `main` reports the returned error.
fn printable_notices(store: &TaskStore, failing: bool) -> Vec<Notice> {
    store
        .take_notices()
        .into_iter()
        .filter(|n| !(failing && n.level == NoticeLevel::Error))
        .collect()
}

fn print_notices(store: &TaskStore, failing: bool) {
    for Notice { level, text } in printable_notices(store, failing) {
        match level {
            NoticeLevel::Error => eprintln!("Error: {}", text),
            NoticeLevel::Info | NoticeLevel::Success => println!("{}", text),
        }
    }
}

fn gateway_failure(err: GatewayError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

fn print_rows(rows: &[TaskRow]) {
    if rows.is_empty() {
        println!("No tasks.");
        return;
    }
    println!("{:<20} {:<30} {:<20} {:>5}", "ID", "NAME", "OWNER", "RUNS");
    for row in rows {
        println!("{:<20} {:<30} {:<20} {:>5}", row.id, row.name, row.owner, row.runs);
    }
}

pub async fn list(store: &TaskStore, sort: NameSort) -> Result<()> {
    let outcome = store.refresh("").await;
    print_notices(store, outcome.is_err());
    outcome.map_err(gateway_failure)?;
    print_rows(&rows(&store.tasks(), sort));
    Ok(())
}

pub async fn search(store: &TaskStore, fragment: &str) -> Result<()> {
    let outcome = store.refresh(fragment).await;
    print_notices(store, outcome.is_err());
    outcome.map_err(gateway_failure)?;
    print_rows(&rows(&store.tasks(), NameSort::None));
    Ok(())
}

pub async fn create(
    store: &TaskStore,
    id: Option<&str>,
    name: &str,
    owner: &str,
    command: &str,
) -> Result<()> {
    let mut form = TaskForm::default();
    form.open_create();
    if let Some(id) = id {
        form.set(FormField::Id, id);
    }
    form.set(FormField::Name, name);
    form.set(FormField::Owner, owner);
    form.set(FormField::Command, command);
    submit_form(store, &mut form).await
}

pub async fn edit(
    store: &TaskStore,
    id: &str,
    name: Option<&str>,
    owner: Option<&str>,
    command: Option<&str>,
) -> Result<()> {
    let task = find_task(store, id).await?;
    let mut form = TaskForm::default();
    form.open_edit(&task);
    for (field, value) in [
        (FormField::Name, name),
        (FormField::Owner, owner),
        (FormField::Command, command),
    ] {
        if let Some(value) = value {
            form.set(field, value);
        }
    }
    submit_form(store, &mut form).await
}

async fn submit_form(store: &TaskStore, form: &mut TaskForm) -> Result<()> {
    let outcome = form.submit_with(store).await;
    print_notices(store, !matches!(outcome, FormOutcome::Saved(_)));
    match outcome {
        FormOutcome::Saved(task) => {
            println!("{} ({}) owned by {}", task.id, task.name, task.owner);
            Ok(())
        }
        _ => {
            let error = form
                .session()
                .and_then(|s| s.error.clone())
                .unwrap_or_else(|| "task was not saved".to_string());
            bail!(error)
        }
    }
}

/// Fetches the unfiltered list and picks `id` out of it; the service has no single-task read.
async fn find_task(store: &TaskStore, id: &str) -> Result<crate::models::Task> {
    let outcome = store.refresh("").await;
    print_notices(store, outcome.is_err());
    outcome.map_err(gateway_failure)?;
    store
        .find(id)
        .ok_or_else(|| anyhow!("Task '{}' not found.", id))
}

fn ask_confirmation(task_id: &str) -> Result<bool> {
    print!(
        "Are you sure you want to delete task ID: {}? This action cannot be undone. (y/n): ",
        task_id
    );
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

pub async fn delete(store: &TaskStore, id: &str, assume_yes: bool) -> Result<()> {
    let mut flow = DeleteConfirm::default();
    flow.request(id);
    if !(assume_yes || ask_confirmation(id)?) {
        flow.cancel();
        println!("Operation cancelled.");
        return Ok(());
    }
    let outcome = flow.confirm_with(store).await;
    let failing = matches!(outcome, Some(Err(_)));
    print_notices(store, failing);
    match outcome {
        Some(Err(err)) => Err(gateway_failure(err)),
        _ => Ok(()),
    }
}

pub async fn run(store: &TaskStore, id: &str) -> Result<()> {
    let outcome = store.run(id).await;
    print_notices(store, outcome.is_err());
    let execution = outcome.map_err(gateway_failure)?;
    println!("Start:  {}", execution.start_time);
    println!("End:    {}", execution.end_time);
    if let Some(secs) = execution.duration_secs() {
        println!("Took:   {}s", secs);
    }
    println!("Output:");
    println!(
        "{}",
        if execution.output.is_empty() {
            "No output recorded."
        } else {
            execution.output.as_str()
        }
    );
    Ok(())
}

pub async fn show(store: &TaskStore, id: &str) -> Result<()> {
    let task = find_task(store, id).await?;
    println!("ID:      {}", task.id);
    println!("Name:    {}", task.name);
    println!("Owner:   {}", task.owner);
    println!("Command: {}", task.command);
    println!();
    println!("Execution History ({} runs)", task.run_count());

    let entries = history(&task);
    if entries.is_empty() {
        println!("No executions found for this task.");
    }
    for entry in entries {
        let duration = entry
            .duration_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "n/a".to_string());
        println!("--- Start: {}  Duration: {}", entry.start_time, duration);
        if entry.output.is_empty() {
            println!("No output recorded.");
        } else {
            println!("{}", entry.output.trim_end());
        }
    }
    Ok(())
}
