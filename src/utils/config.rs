use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{HarvestError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.harvardartmuseums.org";
pub const DEFAULT_DB_PATH: &str = "harvard_artifacts.db";
/// The API refuses pages larger than this.
pub const MAX_PAGE_SIZE: u32 = 100;

const KEY_API_KEY: &str = "HARVARD_API_KEY";
const KEY_BASE_URL: &str = "HARVARD_BASE_URL";
const KEY_DB_PATH: &str = "ARTIFACT_DB_PATH";
const KEY_GOAL: &str = "ARTIFACT_GOAL";

/// Runtime settings for a harvest.
///
/// Resolved from defaults, then a `.env` file, then the process environment.
/// Command-line flags are applied last by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub db_path: PathBuf,
    pub page_size: u32,
    pub request_delay: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Collection size the stats view measures progress against.
    pub goal: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            page_size: MAX_PAGE_SIZE,
            request_delay: Duration::from_millis(500),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            goal: 2500,
        }
    }
}

impl HarvestConfig {
    /// Loads `.env` (if present) and the process environment over the defaults.
    pub fn load(env_path: &Path) -> Result<Self> {
        Self::load_with(env_path, std::env::vars())
    }

    fn load_with(env_path: &Path, vars: impl Iterator<Item = (String, String)>) -> Result<Self> {
        let mut config = Self::default();

        if env_path.exists() {
            for (key, value) in read_env_file(env_path)? {
                config.apply(&key, value);
            }
            info!(path = %env_path.display(), "Loaded settings from env file");
        }

        for (key, value) in vars {
            config.apply(&key, value);
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: String) {
        match key {
            KEY_API_KEY if !value.is_empty() => self.api_key = Some(value),
            KEY_BASE_URL if !value.is_empty() => {
                self.base_url = value.trim_end_matches('/').to_string()
            }
            KEY_DB_PATH if !value.is_empty() => self.db_path = PathBuf::from(value),
            KEY_GOAL => match value.trim().parse::<u64>() {
                Ok(goal) if goal > 0 => self.goal = goal,
                _ => warn!(value = %value, "Ignoring invalid {KEY_GOAL}"),
            },
            _ => {}
        }
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        let clamped = size.clamp(1, MAX_PAGE_SIZE);
        if clamped != size {
            warn!(requested = size, used = clamped, "Page size out of range");
        }
        self.page_size = clamped;
        self
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            HarvestError::Config(format!(
                "no API key; set {KEY_API_KEY} or run `configure <KEY>`"
            ))
        })
    }
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let file = File::open(path).map_err(|e| config_io(path, e))?;
    let reader = BufReader::new(file);

    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| config_io(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            pairs.push((key.trim().to_string(), unquote(value.trim()).to_string()));
        }
    }
    Ok(pairs)
}

/// Strips one pair of matching surrounding quotes, if present.
fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|&q| value.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(value)
}

/// Writes the API key into the env file, keeping any other lines as they were.
pub fn save_api_key(path: &Path, api_key: &str) -> Result<()> {
    let existing = if path.exists() {
        fs::read_to_string(path).map_err(|e| config_io(path, e))?
    } else {
        String::new()
    };

    let mut file = File::create(path).map_err(|e| config_io(path, e))?;
    for line in existing.lines() {
        let is_key_line = line
            .split_once('=')
            .map(|(k, _)| k.trim() == KEY_API_KEY)
            .unwrap_or(false);
        if !is_key_line {
            writeln!(file, "{line}").map_err(|e| config_io(path, e))?;
        }
    }
    writeln!(file, "{KEY_API_KEY}={api_key}").map_err(|e| config_io(path, e))?;
    Ok(())
}

fn config_io(path: &Path, err: std::io::Error) -> HarvestError {
    HarvestError::Config(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_save_and_load_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(&path, "# local\nARTIFACT_DB_PATH=/tmp/art.db\nHARVARD_API_KEY=old\n")?;

        save_api_key(&path, "new-key")?;

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("# local"));
        assert!(content.contains("HARVARD_API_KEY=new-key"));
        assert!(!content.contains("=old"));

        let loaded = HarvestConfig::load_with(&path, std::iter::empty())?;
        assert_eq!(loaded.api_key.as_deref(), Some("new-key"));
        assert_eq!(loaded.db_path, PathBuf::from("/tmp/art.db"));
        assert_eq!(loaded.base_url, DEFAULT_BASE_URL);
        Ok(())
    }

    #[test]
    fn test_environment_overrides_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(&path, "HARVARD_API_KEY=\"from-file\"\n")?;

        let vars = vec![
            ("HARVARD_API_KEY".to_string(), "from-env".to_string()),
            ("HARVARD_BASE_URL".to_string(), "http://localhost:9000/".to_string()),
        ];
        let loaded = HarvestConfig::load_with(&path, vars.into_iter())?;
        assert_eq!(loaded.api_key.as_deref(), Some("from-env"));
        assert_eq!(loaded.base_url, "http://localhost:9000");
        Ok(())
    }

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let loaded = HarvestConfig::load_with(&dir.path().join(".env"), std::iter::empty())?;
        assert_eq!(loaded, HarvestConfig::default());
        assert!(loaded.require_api_key().is_err());
        Ok(())
    }

    #[test]
    fn test_only_one_quote_pair_is_stripped() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("'abc'"), "abc");
        assert_eq!(unquote("\"abc"), "\"abc");
        assert_eq!(unquote("\"\"abc\"\""), "\"abc\"");
        assert_eq!(unquote("\"abc'"), "\"abc'");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("abc"), "abc");
    }

    #[test]
    fn test_goal_from_file_and_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(&path, "ARTIFACT_GOAL=5000\n")?;
        assert_eq!(HarvestConfig::load_with(&path, std::iter::empty())?.goal, 5000);

        let vars = vec![("ARTIFACT_GOAL".to_string(), "lots".to_string())];
        assert_eq!(HarvestConfig::load_with(&path, vars.into_iter())?.goal, 5000);

        let vars = vec![("ARTIFACT_GOAL".to_string(), "0".to_string())];
        let missing = dir.path().join("missing.env");
        assert_eq!(HarvestConfig::load_with(&missing, vars.into_iter())?.goal, 2500);
        Ok(())
    }

    #[test]
    fn test_page_size_clamped() {
        assert_eq!(HarvestConfig::default().with_page_size(500).page_size, 100);
        assert_eq!(HarvestConfig::default().with_page_size(0).page_size, 1);
        assert_eq!(HarvestConfig::default().with_page_size(25).page_size, 25);
    }
}
