use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{
    activity::ActivityLimits,
    clock::TimeZonePolicy,
    Result,
};

/// Typed configuration for the tracker host.
///
/// The core consumes these values but does not own them: `daily_limit` is
/// passed into every `submit`/`stats` call by the transport layer, and the
/// rest parameterize construction. Unparseable numeric values fall back to
/// their defaults; only an invalid timezone is a hard error.
#[derive(Clone, Debug)]
pub struct Config {
    pub data_file: PathBuf,
    pub daily_limit: u32,
    pub history_capacity: usize,
    pub max_prompt_len: usize,
    pub max_summary_len: usize,
    pub timezone: TimeZonePolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let data_file =
            env_path("DATA_FILE").unwrap_or_else(|| PathBuf::from("data/user-data.json"));

        // A zero limit is legal: it denies every request.
        let daily_limit = env_u32("DAILY_MESSAGE_LIMIT").unwrap_or(10);
        let history_capacity = env_usize("HISTORY_CAPACITY").unwrap_or(50);
        let max_prompt_len = env_usize("MAX_PROMPT_LENGTH").unwrap_or(2000);
        let max_summary_len = env_usize("MAX_SUMMARY_LENGTH").unwrap_or(500);

        let timezone = TimeZonePolicy::parse(&env_str("BOT_TIMEZONE").unwrap_or_default())?;

        // Ensure the data directory exists up front so the first save cannot
        // fail on a missing parent.
        if let Some(parent) = data_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            data_file,
            daily_limit,
            history_capacity,
            max_prompt_len,
            max_summary_len,
            timezone,
        })
    }

    pub fn activity_limits(&self) -> ActivityLimits {
        ActivityLimits {
            history_capacity: self.history_capacity,
            max_prompt_len: self.max_prompt_len,
            max_summary_len: self.max_summary_len,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
