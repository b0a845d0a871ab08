use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, Context, anyhow};
use tracing::info;

use crate::database::repo::InsertPolicy;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub galleries_file: Option<PathBuf>,
    pub insert_policy: InsertPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("galleries.db"),
            interval: Duration::from_secs(60 * 60),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            galleries_file: None,
            insert_policy: InsertPolicy::Append,
        }
    }
}

/// Builds settings from defaults overlaid with the env file, if one exists.
pub fn load_settings(env_path: &Path) -> Result<Settings> {
    let mut settings = Settings::default();
    if env_path.exists() {
        load_from_env(env_path, &mut settings)?;
        info!("Loaded settings from {:?}", env_path);
    }
    Ok(settings)
}

fn load_from_env(path: &Path, settings: &mut Settings) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open env file: {:?}", path))?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "PULSE_DB_PATH" => settings.db_path = PathBuf::from(value),
            "PULSE_INTERVAL_SECS" => settings.interval = parse_secs(key, value)?,
            "PULSE_TIMEOUT_SECS" => settings.request_timeout = parse_secs(key, value)?,
            "PULSE_USER_AGENT" => settings.user_agent = value.to_string(),
            "PULSE_GALLERIES_FILE" => settings.galleries_file = Some(PathBuf::from(value)),
            "PULSE_DEDUP" => {
                settings.insert_policy = if parse_flag(key, value)? {
                    InsertPolicy::SkipExisting
                } else {
                    InsertPolicy::Append
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key.trim(), value))?;
    Ok(Duration::from_secs(secs))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean, got {:?}", key.trim(), value)),
    }
}
