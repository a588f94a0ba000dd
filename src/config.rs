use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_INTERVAL_SECS: u64 = 300;
const DEFAULT_RETRY_DELAYS_SECS: &str = "5,30,60";
const DEFAULT_WARN_THRESHOLD: f64 = 90.0;
const DEFAULT_STATE_PATH: &str = "alert_state.json";
const DEFAULT_RETENTION_SWEEP_SECS: u64 = 3600;

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "Required environment variable {name} is not set"),
            Self::InvalidVar(name, value) => {
                write!(f, "Environment variable {name} has invalid value {value:?}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Monitoring knobs the reporting loop re-reads every tick, so they can be
/// swapped at runtime without restarting the agent.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub drives: Vec<String>,
    pub warn_threshold_percent: f64,
}

pub type SharedMonitorConfig = Arc<RwLock<MonitorConfig>>;

pub struct AgentConfig {
    pub agent_id: String,
    pub server_url: String,
    pub api_key: Option<String>,
    pub interval: Duration,
    pub retry_delays: Vec<Duration>,
    pub monitor: SharedMonitorConfig,
    pub state_path: PathBuf,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent_id = match env::var("DISKSENTRY_AGENT_ID") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .ok_or(ConfigError::MissingVar("DISKSENTRY_AGENT_ID"))?,
        };

        let server_url = env::var("DISKSENTRY_SERVER_URL")
            .map_err(|_| ConfigError::MissingVar("DISKSENTRY_SERVER_URL"))?;
        let server_url = server_url.trim_end_matches('/').to_string();

        let api_key = env::var("DISKSENTRY_API_KEY").ok().filter(|k| !k.is_empty());

        let interval = Duration::from_secs(parse_var(
            "DISKSENTRY_INTERVAL_SECS",
            DEFAULT_INTERVAL_SECS,
        )?);

        let raw_delays = env::var("DISKSENTRY_RETRY_DELAYS_SECS")
            .unwrap_or_else(|_| DEFAULT_RETRY_DELAYS_SECS.to_string());
        let retry_delays = parse_delay_list("DISKSENTRY_RETRY_DELAYS_SECS", &raw_delays)?;

        let drives_raw = env::var("DISKSENTRY_DRIVES")
            .map_err(|_| ConfigError::MissingVar("DISKSENTRY_DRIVES"))?;
        let drives: Vec<String> = drives_raw
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect();
        if drives.is_empty() {
            return Err(ConfigError::InvalidVar("DISKSENTRY_DRIVES", drives_raw));
        }

        let warn_threshold_percent =
            parse_var("DISKSENTRY_WARN_THRESHOLD", DEFAULT_WARN_THRESHOLD)?;
        if !(0.0..=100.0).contains(&warn_threshold_percent) {
            return Err(ConfigError::InvalidVar(
                "DISKSENTRY_WARN_THRESHOLD",
                warn_threshold_percent.to_string(),
            ));
        }

        let state_path = PathBuf::from(
            env::var("DISKSENTRY_STATE_PATH").unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string()),
        );

        Ok(Self {
            agent_id,
            server_url,
            api_key,
            interval,
            retry_delays,
            monitor: Arc::new(RwLock::new(MonitorConfig {
                drives,
                warn_threshold_percent,
            })),
            state_path,
        })
    }

    pub fn report_endpoint(&self) -> String {
        format!("{}/api/agent/report", self.server_url)
    }
}

pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub api_key: Option<String>,
    pub retention_max_age: Option<Duration>,
    pub retention_sweep_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        let bind_raw = env::var("DISKSENTRY_BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .parse()
            .map_err(|_| ConfigError::InvalidVar("DISKSENTRY_BIND_ADDR", bind_raw))?;

        let api_key = env::var("DISKSENTRY_API_KEY").ok().filter(|k| !k.is_empty());

        let retention_max_age = match env::var("DISKSENTRY_RETENTION_DAYS") {
            Ok(raw) => {
                let days: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidVar("DISKSENTRY_RETENTION_DAYS", raw))?;
                Some(Duration::from_secs(days * 24 * 3600))
            }
            Err(_) => None,
        };

        let retention_sweep_interval = Duration::from_secs(parse_var(
            "DISKSENTRY_RETENTION_SWEEP_SECS",
            DEFAULT_RETENTION_SWEEP_SECS,
        )?);

        Ok(Self {
            database_url,
            bind_addr,
            api_key,
            retention_max_age,
            retention_sweep_interval,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar(name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_delay_list(name: &'static str, raw: &str) -> Result<Vec<Duration>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidVar(name, raw.to_string()))
        })
        .collect()
}
