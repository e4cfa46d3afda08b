use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use reqwest::Url;

use crate::listing::{DEFAULT_PAGE_SIZE, PAGE_SIZES};
use crate::store::StoreOptions;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/tasks";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub page_size: usize,
    pub discard_stale_refreshes: bool,
    /// Where log output goes while the TUI owns the terminal.
    pub log_file: PathBuf,
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid task service URL '{}'", raw))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        bail!("task service URL must be an http(s) URL, got '{}'", raw);
    }
    Ok(url)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", key, other),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = parse_base_url(
            &lookup("TASK_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;

        let page_size = match lookup("TASK_CONSOLE_PAGE_SIZE") {
            Some(raw) => {
                let size: usize = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("TASK_CONSOLE_PAGE_SIZE is not a number: '{}'", raw))?;
                if !PAGE_SIZES.contains(&size) {
                    bail!("TASK_CONSOLE_PAGE_SIZE must be one of {:?}, got {}", PAGE_SIZES, size);
                }
                size
            }
            None => DEFAULT_PAGE_SIZE,
        };

        let discard_stale_refreshes = match lookup("TASK_CONSOLE_STRICT_REFRESH") {
            Some(raw) => parse_flag("TASK_CONSOLE_STRICT_REFRESH", &raw)?,
            None => false,
        };

        let log_file = lookup("TASK_CONSOLE_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("task-console.log"));

        Ok(Config {
            base_url,
            page_size,
            discard_stale_refreshes,
            log_file,
        })
    }

    /// Applies a `--base-url` flag over whatever the environment said.
    pub fn with_base_url(mut self, base_url: Option<&str>) -> Result<Self> {
        if let Some(raw) = base_url {
            self.base_url = parse_base_url(raw)?;
        }
        Ok(self)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            discard_stale_refreshes: self.discard_stale_refreshes,
        }
    }
}
