use crate::error::{ArmatureError, Result};
use crate::lifecycle::{ObserverOptions, ShutdownOptions, Signal};
use dashmap::DashMap;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Comma-separated signal names, e.g. `SIGTERM,SIGINT`
pub const SHUTDOWN_SIGNALS: &str = "SHUTDOWN_SIGNALS";
/// Grace period in milliseconds
pub const SHUTDOWN_GRACE_PERIOD_MS: &str = "SHUTDOWN_GRACE_PERIOD_MS";
/// Comma-separated observer groups started first
pub const LIFECYCLE_ORDERED_GROUPS: &str = "LIFECYCLE_ORDERED_GROUPS";
/// `true` to run the observers of a group concurrently
pub const LIFECYCLE_PARALLEL: &str = "LIFECYCLE_PARALLEL";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Create a service seeded from the process environment
    pub fn new() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Look up `key` and parse it, ignoring blank values
    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ArmatureError::invalid_config(format!("{key}={raw}: {e}"))),
            _ => Ok(None),
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        let raw = self.get(key)?;
        let items: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect();
        (!items.is_empty()).then_some(items)
    }
}

/// Lifecycle configuration of an application
///
/// ```
/// use armature::config::ApplicationConfig;
/// use armature::lifecycle::Signal;
/// use std::time::Duration;
///
/// let config = ApplicationConfig::from_json(
///     r#"{"shutdown": {"signals": ["SIGTERM", "SIGINT"], "gracePeriod": 5000}}"#,
/// ).unwrap();
/// assert_eq!(config.shutdown.signals, vec![Signal::Term, Signal::Int]);
/// assert_eq!(config.shutdown.grace_period, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationConfig {
    pub shutdown: ShutdownOptions,
    pub observers: ObserverOptions,
}

impl ApplicationConfig {
    /// Parse a JSON document
    ///
    /// # Errors
    /// Returns [`ArmatureError::InvalidConfig`] on malformed JSON or unknown signal names.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read the configuration from a [`ConfigService`], keeping defaults for unset keys
    ///
    /// # Errors
    /// Returns [`ArmatureError::InvalidConfig`] when a key is set but cannot be parsed.
    pub fn from_service(service: &ConfigService) -> Result<Self> {
        let mut config = Self::default();

        if let Some(names) = service.list(SHUTDOWN_SIGNALS) {
            config.shutdown.signals = names
                .iter()
                .map(|name| {
                    Signal::from_str(name).map_err(|_| {
                        ArmatureError::invalid_config(format!("unknown signal '{name}'"))
                    })
                })
                .collect::<Result<_>>()?;
        }
        if let Some(ms) = service.parse::<u64>(SHUTDOWN_GRACE_PERIOD_MS)? {
            config.shutdown.grace_period = Some(Duration::from_millis(ms));
        }
        if let Some(groups) = service.list(LIFECYCLE_ORDERED_GROUPS) {
            config.observers.ordered_groups = groups;
        }
        if let Some(parallel) = service.parse::<bool>(LIFECYCLE_PARALLEL)? {
            config.observers.parallel = parallel;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApplicationConfig::from_service(&ConfigService::default()).unwrap();
        assert_eq!(config.shutdown.signals, vec![Signal::Term]);
        assert_eq!(config.shutdown.grace_period, None);
        assert!(config.observers.ordered_groups.is_empty());
        assert_eq!(config, ApplicationConfig::from_json("{}").unwrap());
    }

    #[test]
    fn test_from_service() {
        let service = ConfigService::default();
        service.set(SHUTDOWN_SIGNALS, "SIGTERM, SIGINT");
        service.set(SHUTDOWN_GRACE_PERIOD_MS, "2500");
        service.set(LIFECYCLE_ORDERED_GROUPS, "datasource,server");
        service.set(LIFECYCLE_PARALLEL, "true");

        let config = ApplicationConfig::from_service(&service).unwrap();
        assert_eq!(config.shutdown.signals, vec![Signal::Term, Signal::Int]);
        assert_eq!(config.shutdown.grace_period, Some(Duration::from_millis(2500)));
        assert_eq!(config.observers.ordered_groups, vec!["datasource", "server"]);
        assert!(config.observers.parallel);
    }

    #[test]
    fn test_invalid_values() {
        let service = ConfigService::default();
        service.set(SHUTDOWN_SIGNALS, "SIGTERM,SIGNOPE");
        assert!(matches!(
            ApplicationConfig::from_service(&service),
            Err(ArmatureError::InvalidConfig { .. })
        ));

        let service = ConfigService::default();
        service.set(SHUTDOWN_GRACE_PERIOD_MS, "-5");
        assert!(ApplicationConfig::from_service(&service).is_err());
    }

    #[test]
    fn test_json_rejects_negative_grace_period() {
        let err = ApplicationConfig::from_json(r#"{"shutdown": {"gracePeriod": -1}}"#).unwrap_err();
        assert!(matches!(err, ArmatureError::InvalidConfig { .. }));
    }
}
