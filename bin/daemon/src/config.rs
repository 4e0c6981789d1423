//! Daemon configuration.
//!
//! Loaded via the `config` crate from `PASSBOOK_*` environment variables;
//! nested fields use `__`, e.g. `PASSBOOK_SCHEDULE__OPEN_HOUR=9`. Every field
//! has a default.

use serde::Deserialize;
use std::path::PathBuf;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Root of the job, log and secret files.
    pub data_dir: PathBuf,
    pub site: SiteConfig,
    pub schedule: ScheduleConfig,
    pub browser: BrowserConfig,
    pub session: SessionConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            site: SiteConfig::default(),
            schedule: ScheduleConfig::default(),
            browser: BrowserConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// The booking site.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rooms.kcls.org".to_string(),
        }
    }
}

/// When booking windows open.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub days_before: u64,
    /// Local hour, 0-23.
    pub open_hour: u32,
    /// IANA timezone name.
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            days_before: 14,
            open_hour: 14,
            timezone: "America/Los_Angeles".to_string(),
        }
    }
}

/// The browser the driver launches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub executable: PathBuf,
    pub headless: bool,
    pub launch_timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("chromium"),
            headless: true,
            launch_timeout_seconds: 30,
        }
    }
}

/// Authenticated browser sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in minutes.
    pub ttl_minutes: i64,
    /// Interval between expired-session sweeps, in seconds.
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 120,
            sweep_interval_seconds: 900,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but does not parse.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(environment())
    }

    fn load(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("PASSBOOK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> DaemonConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        DaemonConfig::load(environment().source(Some(vars))).expect("config loads")
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.site.base_url, "https://rooms.kcls.org");
        assert_eq!(config.schedule.days_before, 14);
        assert_eq!(config.schedule.open_hour, 14);
        assert_eq!(config.schedule.timezone, "America/Los_Angeles");
        assert_eq!(config.browser.executable, PathBuf::from("chromium"));
        assert!(config.browser.headless);
        assert_eq!(config.session.ttl_minutes, 120);
        assert_eq!(config.session.sweep_interval_seconds, 900);
    }

    #[test]
    fn nested_overrides() {
        let config = load(&[
            ("PASSBOOK_DATA_DIR", "/var/lib/passbook"),
            ("PASSBOOK_SCHEDULE__OPEN_HOUR", "9"),
            ("PASSBOOK_SCHEDULE__TIMEZONE", "Europe/London"),
            ("PASSBOOK_BROWSER__HEADLESS", "false"),
            ("PASSBOOK_SESSION__TTL_MINUTES", "30"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/passbook"));
        assert_eq!(config.schedule.open_hour, 9);
        assert_eq!(config.schedule.days_before, 14);
        assert_eq!(config.schedule.timezone, "Europe/London");
        assert!(!config.browser.headless);
        assert_eq!(config.session.ttl_minutes, 30);
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let config = load(&[("HOME", "/root"), ("OTHER_SITE__BASE_URL", "x")]);
        assert_eq!(config.site.base_url, "https://rooms.kcls.org");
    }

    #[test]
    fn bad_number_is_an_error() {
        let vars: HashMap<String, String> = [(
            "PASSBOOK_SCHEDULE__DAYS_BEFORE".to_string(),
            "soon".to_string(),
        )]
        .into_iter()
        .collect();
        assert!(DaemonConfig::load(environment().source(Some(vars))).is_err());
    }
}
