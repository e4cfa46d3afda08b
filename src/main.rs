mod cli;
mod commands;
mod config;
mod editor;
mod error;
mod flows;
mod gateway;
mod listing;
mod models;
mod store;
mod ui;

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use config::Config;
use gateway::HttpGateway;
use listing::NameSort;
use store::TaskStore;
use ui::run_tui;

fn init_logging(config: &Config, tui: bool) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or(if tui { "info" } else { "warn" });
    let mut builder = env_logger::Builder::from_env(env);
    if tui {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        use clap_complete::{generate, Shell};
        let shell = shell.to_lowercase();
        let shell_enum = match shell.as_str() {
            "bash" => Shell::Bash,
            "zsh" => Shell::Zsh,
            "fish" => Shell::Fish,
            "elvish" => Shell::Elvish,
            "powershell" => Shell::PowerShell,
            _ => {
                println!("Unsupported shell: {}", shell);
                return Ok(());
            }
        };
        let mut cmd = Cli::command();
        generate(shell_enum, &mut cmd, "task-console", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::from_env()?.with_base_url(cli.base_url.as_deref())?;
    let tui = matches!(cli.command, None | Some(Commands::Tui));
    init_logging(&config, tui)?;

    let rt = tokio::runtime::Runtime::new()?;
    let gateway = Arc::new(HttpGateway::new(config.base_url.clone()));
    log::info!("using task service at {}", gateway.base_url());
    let store = Arc::new(TaskStore::new(gateway, config.store_options()));

    match cli.command {
        Some(Commands::List { sort }) => {
            let sort = sort.map(NameSort::from).unwrap_or_default();
            rt.block_on(commands::list(&store, sort))?;
        }
        Some(Commands::Search { fragment }) => {
            rt.block_on(commands::search(&store, &fragment))?;
        }
        Some(Commands::Create { id, name, owner, command }) => {
            rt.block_on(commands::create(&store, id.as_deref(), &name, &owner, &command))?;
        }
        Some(Commands::Edit { id, name, owner, command }) => {
            rt.block_on(commands::edit(
                &store,
                &id,
                name.as_deref(),
                owner.as_deref(),
                command.as_deref(),
            ))?;
        }
        Some(Commands::Delete { id, yes }) => {
            rt.block_on(commands::delete(&store, &id, yes))?;
        }
        Some(Commands::Run { id }) => {
            rt.block_on(commands::run(&store, &id))?;
        }
        Some(Commands::Show { id }) => {
            rt.block_on(commands::show(&store, &id))?;
        }
        Some(Commands::Completions { .. }) => {}
        Some(Commands::Tui) | None => {
            // Default behavior: launch TUI
            run_tui(store, rt.handle().clone(), config.page_size)?;
        }
    }

    Ok(())
}
