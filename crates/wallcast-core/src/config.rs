use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::{Credential, Error},
    poller::PollerConfig,
    Result,
};

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub telegram_bot_token: String,
    pub vk_token: Option<String>,

    // Feed
    pub vk_api_version: String,
    pub vk_request_timeout: Duration,

    // Bot
    pub admin_users: Vec<i64>,

    // State files
    pub registry_file: PathBuf,
    pub seen_file: PathBuf,

    // Poll loop
    pub poll_interval: Duration,
    pub refresh_every_cycles: u32,
    pub posts_per_fetch: u32,
    pub refresh_delay: Duration,
    pub send_delay: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or(Error::MissingCredential(Credential::ChatToken))?;
        let vk_token = env_str("VK_TOKEN").and_then(non_empty);

        let vk_api_version = env_str("VK_API_VERSION")
            .and_then(non_empty)
            .unwrap_or_else(|| "5.199".to_string());
        let vk_request_timeout =
            Duration::from_secs(env_u64("VK_REQUEST_TIMEOUT_SECS").unwrap_or(10));

        let admin_users = parse_csv_i64(env_str("TELEGRAM_ADMIN_USERS"));

        let registry_file = env_path("REGISTRY_FILE").unwrap_or_else(|| "config.json".into());
        let seen_file = env_path("SEEN_FILE").unwrap_or_else(|| "seen_vk_posts.json".into());

        let poll_interval = Duration::from_secs(env_u64("POLL_INTERVAL_SECS").unwrap_or(60));
        if poll_interval.is_zero() {
            return Err(Error::Config(
                "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        let refresh_every_cycles = env_u32("REFRESH_EVERY_CYCLES").unwrap_or(60).max(1);
        let posts_per_fetch = env_u32("POSTS_PER_FETCH").unwrap_or(4).clamp(1, 100);
        let refresh_delay = Duration::from_millis(env_u64("REFRESH_DELAY_MS").unwrap_or(350));
        let send_delay = Duration::from_millis(env_u64("SEND_DELAY_MS").unwrap_or(2000));

        Ok(Self {
            telegram_bot_token,
            vk_token,
            vk_api_version,
            vk_request_timeout,
            admin_users,
            registry_file,
            seen_file,
            poll_interval,
            refresh_every_cycles,
            posts_per_fetch,
            refresh_delay,
            send_delay,
        })
    }

    /// The feed token, required before the poll loop may start.
    pub fn require_vk_token(&self) -> Result<&str> {
        self.vk_token
            .as_deref()
            .ok_or(Error::MissingCredential(Credential::FeedToken))
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: self.poll_interval,
            refresh_every_cycles: self.refresh_every_cycles,
            posts_per_fetch: self.posts_per_fetch,
            refresh_delay: self.refresh_delay,
            send_delay: self.send_delay,
        }
    }

    /// Empty admin list means every chat member may run admin commands.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_users.is_empty() || self.admin_users.contains(&user_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
