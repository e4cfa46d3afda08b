use clap::{Parser, Subcommand, ValueEnum};

use crate::listing::NameSort;

#[derive(Parser)]
#[command(author, version, about = "Console for managing and running remote shell tasks", long_about = None)]
pub struct Cli {
    /// Task service base URL (overrides TASK_API_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Name,
    NameDesc,
}

impl From<SortArg> for NameSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Name => NameSort::Ascending,
            SortArg::NameDesc => NameSort::Descending,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all tasks
    List {
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
    },
    /// Search tasks by name (case-insensitive substring)
    Search {
        #[arg(value_name = "NAME")]
        fragment: String,
    },
    /// Create a new task
    Create {
        /// Task id; a TEMP-<millis> placeholder is used when omitted
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        command: String,
    },
    /// Edit an existing task (the id cannot change)
    Edit {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        command: Option<String>,
    },
    /// Delete a task and its execution history
    Delete {
        #[arg(value_name = "ID")]
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Run a task's command now and print the new execution
    Run {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Show a task with its execution history
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Launch TUI interface
    Tui,
    /// Print shell completions
    Completions {
        #[arg(value_name = "SHELL")]
        shell: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_and_global_base_url() {
        let cli = Cli::try_parse_from([
            "task-console",
            "create",
            "--name",
            "Backup",
            "--owner",
            "Bob",
            "--command",
            "tar -czf a.tgz .",
            "--base-url",
            "http://localhost:9090/api/tasks",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:9090/api/tasks"));
        match cli.command {
            Some(Commands::Create { id, name, .. }) => {
                assert!(id.is_none());
                assert_eq!(name, "Backup");
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_parse_list_sort() {
        let cli = Cli::try_parse_from(["task-console", "list", "--sort", "name-desc"]).unwrap();
        match cli.command {
            Some(Commands::List { sort: Some(sort) }) => {
                assert_eq!(NameSort::from(sort), NameSort::Descending)
            }
            _ => panic!("expected list"),
        }
    }
}
