//! Engine configuration resolution
//!
//! Every setting resolves with priority ENV → TOML → compiled default. A
//! value present in more than one source is logged as a warning, and the
//! higher-priority source wins. Environment lookup is injectable so tests
//! never touch the process environment.

use chrono::NaiveTime;
use pulse_common::config::TomlConfig;
use pulse_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::temporal::DecisionLens;
use crate::resilience::BreakerConfig;
use crate::services::snapshot_orchestrator::TradingHours;

pub const ENV_BIND_ADDRESS: &str = "PULSE_BIND_ADDRESS";
pub const ENV_ADMIN_TOKEN: &str = "PULSE_ADMIN_TOKEN";
pub const ENV_WATCHLIST: &str = "PULSE_WATCHLIST";
pub const ENV_DECISION_LENS: &str = "PULSE_DECISION_LENS";
pub const ENV_QUOTES_URL: &str = "PULSE_QUOTES_URL";
pub const ENV_MESSAGES_URL: &str = "PULSE_MESSAGES_URL";
pub const ENV_EXTRACTION_URL: &str = "PULSE_EXTRACTION_URL";
pub const ENV_INTERPRETATION_URL: &str = "PULSE_INTERPRETATION_URL";
pub const ENV_SCHEDULER: &str = "PULSE_SCHEDULER";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";
const DEFAULT_RUN_BUDGET_SECS: u64 = 140;
const DEFAULT_INTER_SYMBOL_DELAY_MS: u64 = 2000;
const DEFAULT_INTER_DATE_DELAY_MS: u64 = 3000;
const DEFAULT_MESSAGES_PER_SECOND: u32 = 5;

/// Base URLs of the four collaborators; `None` leaves that upstream unavailable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamUrls {
    pub quotes: Option<String>,
    pub messages: Option<String>,
    pub extraction: Option<String>,
    pub interpretation: Option<String>,
}

/// Fully resolved engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_address: String,
    pub admin_token: Option<String>,
    pub watchlist: Vec<String>,
    pub decision_lens: DecisionLens,
    pub upstreams: UpstreamUrls,
    pub messages_per_second: u32,
    pub scheduler_enabled: bool,
    pub trading_hours: TradingHours,
    pub run_budget: Duration,
    pub inter_symbol_delay: Duration,
    pub inter_date_delay: Duration,
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            admin_token: None,
            watchlist: Vec::new(),
            decision_lens: DecisionLens::default(),
            upstreams: UpstreamUrls::default(),
            messages_per_second: DEFAULT_MESSAGES_PER_SECOND,
            scheduler_enabled: true,
            trading_hours: TradingHours::default(),
            run_budget: Duration::from_secs(DEFAULT_RUN_BUDGET_SECS),
            inter_symbol_delay: Duration::from_millis(DEFAULT_INTER_SYMBOL_DELAY_MS),
            inter_date_delay: Duration::from_millis(DEFAULT_INTER_DATE_DELAY_MS),
            breaker: BreakerConfig::default(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Pick ENV over TOML, warning when both are set
fn pick(name: &str, env_value: Option<String>, toml_value: Option<String>) -> Option<String> {
    let env_value = non_blank(env_value);
    let toml_value = non_blank(toml_value);
    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                "{} found in multiple sources: environment, TOML. Using environment (highest priority).",
                name
            );
            Some(env)
        }
        (Some(env), None) => Some(env),
        (None, toml) => toml,
    }
}

fn parse_watchlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_time(name: &str, raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| Error::Config(format!("{} must be HH:MM ({}): {}", name, raw, e)))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{} must be a boolean, got '{}'", name, other))),
    }
}

impl EngineConfig {
    /// Resolve against the process environment
    pub fn from_environment(toml: &TomlConfig) -> Result<Self> {
        Self::resolve(toml, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve<F>(toml: &TomlConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_address = pick("bind_address", env(ENV_BIND_ADDRESS), toml.bind_address.clone())
            .unwrap_or(defaults.bind_address);
        let admin_token = pick("admin_token", env(ENV_ADMIN_TOKEN), toml.admin_token.clone());

        let toml_watchlist = (!toml.watchlist.is_empty()).then(|| toml.watchlist.join(","));
        let watchlist = pick("watchlist", env(ENV_WATCHLIST), toml_watchlist)
            .map(|raw| parse_watchlist(&raw))
            .unwrap_or_default();

        let decision_lens = match pick("decision_lens", env(ENV_DECISION_LENS), toml.decision_lens.clone()) {
            Some(raw) => raw.parse::<DecisionLens>().map_err(Error::Config)?,
            None => defaults.decision_lens,
        };

        let upstreams = UpstreamUrls {
            quotes: pick("upstreams.quotes", env(ENV_QUOTES_URL), toml.upstreams.quotes.clone()),
            messages: pick("upstreams.messages", env(ENV_MESSAGES_URL), toml.upstreams.messages.clone()),
            extraction: pick(
                "upstreams.extraction",
                env(ENV_EXTRACTION_URL),
                toml.upstreams.extraction.clone(),
            ),
            interpretation: pick(
                "upstreams.interpretation",
                env(ENV_INTERPRETATION_URL),
                toml.upstreams.interpretation.clone(),
            ),
        };

        let schedule = &toml.schedule;
        let scheduler_enabled = match pick(
            "schedule.enabled",
            env(ENV_SCHEDULER),
            schedule.enabled.map(|b| b.to_string()),
        ) {
            Some(raw) => parse_bool(ENV_SCHEDULER, &raw)?,
            None => defaults.scheduler_enabled,
        };

        let mut trading_hours = defaults.trading_hours;
        if let Some(raw) = &schedule.trading_open_utc {
            trading_hours.open = parse_time("schedule.trading_open_utc", raw)?;
        }
        if let Some(raw) = &schedule.trading_close_utc {
            trading_hours.close = parse_time("schedule.trading_close_utc", raw)?;
        }
        if trading_hours.close <= trading_hours.open {
            return Err(Error::Config(
                "schedule.trading_close_utc must be after trading_open_utc".to_string(),
            ));
        }

        let breaker_defaults = BreakerConfig::default();
        let breaker = BreakerConfig {
            failure_threshold: toml
                .breaker
                .failure_threshold
                .unwrap_or(breaker_defaults.failure_threshold)
                .max(1),
            reset_timeout: toml
                .breaker
                .reset_timeout_secs
                .map(|s| chrono::Duration::seconds(s as i64))
                .unwrap_or(breaker_defaults.reset_timeout),
            half_open_success_threshold: toml
                .breaker
                .half_open_success_threshold
                .unwrap_or(breaker_defaults.half_open_success_threshold)
                .max(1),
        };

        let config = Self {
            bind_address,
            admin_token,
            watchlist,
            decision_lens,
            upstreams,
            messages_per_second: toml
                .upstreams
                .messages_per_second
                .unwrap_or(defaults.messages_per_second)
                .max(1),
            scheduler_enabled,
            trading_hours,
            run_budget: schedule
                .run_budget_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.run_budget),
            inter_symbol_delay: schedule
                .inter_symbol_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_symbol_delay),
            inter_date_delay: schedule
                .inter_date_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.inter_date_delay),
            breaker,
        };

        info!(
            bind_address = %config.bind_address,
            watchlist = config.watchlist.len(),
            decision_lens = %config.decision_lens,
            scheduler = config.scheduler_enabled,
            admin = config.admin_token.is_some(),
            "Engine configuration resolved"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = EngineConfig::resolve(&TomlConfig::default(), env_of(&[])).unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.run_budget, Duration::from_secs(140));
        assert_eq!(config.inter_symbol_delay, Duration::from_millis(2000));
        assert_eq!(config.inter_date_delay, Duration::from_millis(3000));
        assert_eq!(config.decision_lens, DecisionLens::Earnings);
        assert!(config.admin_token.is_none());
        assert!(config.scheduler_enabled);
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn test_environment_beats_toml() {
        let toml = TomlConfig {
            bind_address: Some("0.0.0.0:1".to_string()),
            watchlist: vec!["msft".to_string()],
            decision_lens: Some("earnings".to_string()),
            ..Default::default()
        };
        let env = env_of(&[
            (ENV_BIND_ADDRESS, "0.0.0.0:2"),
            (ENV_WATCHLIST, "aapl, tsla,,"),
            (ENV_DECISION_LENS, "MA"),
        ]);
        let config = EngineConfig::resolve(&toml, env).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:2");
        assert_eq!(config.watchlist, vec!["AAPL", "TSLA"]);
        assert_eq!(config.decision_lens, DecisionLens::MergersAcquisitions);
    }

    #[test]
    fn test_toml_used_when_env_blank() {
        let mut toml = TomlConfig::default();
        toml.upstreams.quotes = Some("http://quotes.local".to_string());
        toml.watchlist = vec!["nvda".to_string()];
        toml.schedule.trading_open_utc = Some("14:30".to_string());
        toml.schedule.enabled = Some(false);
        let config = EngineConfig::resolve(&toml, env_of(&[(ENV_QUOTES_URL, "  ")])).unwrap();
        assert_eq!(config.upstreams.quotes.as_deref(), Some("http://quotes.local"));
        assert_eq!(config.watchlist, vec!["NVDA"]);
        assert_eq!(config.trading_hours.open, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert!(!config.scheduler_enabled);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = EngineConfig::resolve(&TomlConfig::default(), env_of(&[(ENV_DECISION_LENS, "vibes")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut toml = TomlConfig::default();
        toml.schedule.trading_open_utc = Some("21:00".to_string());
        assert!(EngineConfig::resolve(&toml, env_of(&[])).is_err());

        assert!(EngineConfig::resolve(&TomlConfig::default(), env_of(&[(ENV_SCHEDULER, "maybe")])).is_err());
    }
}
