use cadavre_engine::game::{MAX_PLAYER_CAP, MIN_PLAYER_CAP};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Tunables for the session engine, loaded from the environment at startup.
///
/// Every accepted value is validated; a missing variable falls back to its
/// default, a malformed one is a startup error rather than a silent default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Idle time before a session becomes eligible for cleanup, in seconds
    pub session_ttl_secs: u64,
    /// Default player capacity for new sessions
    pub default_max_players: usize,
    /// Ceiling on one AI generation call, in seconds
    pub ai_timeout_secs: u64,
    /// Age past which an AI progress guard is considered stuck, in seconds
    pub ai_stale_ceiling_secs: u64,
    /// SSE heartbeat interval, in seconds
    pub heartbeat_secs: u64,
    /// Per-subscriber event channel capacity
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            session_ttl_secs: 30 * 60,
            default_max_players: 4,
            ai_timeout_secs: 30,
            ai_stale_ceiling_secs: 120,
            heartbeat_secs: 30,
            event_buffer: 256,
        }
    }
}

impl EngineSettings {
    /// Read settings from `CADAVRE_*` environment variables, falling back to
    /// defaults for unset values.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();
        let settings = Self {
            session_ttl_secs: read_env("CADAVRE_SESSION_TTL_SECS", defaults.session_ttl_secs)?,
            default_max_players: read_env("CADAVRE_MAX_PLAYERS", defaults.default_max_players)?,
            ai_timeout_secs: read_env("CADAVRE_AI_TIMEOUT_SECS", defaults.ai_timeout_secs)?,
            ai_stale_ceiling_secs: read_env(
                "CADAVRE_AI_STALE_CEILING_SECS",
                defaults.ai_stale_ceiling_secs,
            )?,
            heartbeat_secs: read_env("CADAVRE_HEARTBEAT_SECS", defaults.heartbeat_secs)?,
            event_buffer: read_env("CADAVRE_EVENT_BUFFER", defaults.event_buffer)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.session_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "session_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.default_max_players < MIN_PLAYER_CAP || self.default_max_players > MAX_PLAYER_CAP {
            return Err(SettingsError::InvalidValue(format!(
                "default_max_players must be between {MIN_PLAYER_CAP} and {MAX_PLAYER_CAP}"
            )));
        }
        if self.ai_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "ai_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.ai_stale_ceiling_secs < self.ai_timeout_secs {
            return Err(SettingsError::InvalidValue(
                "ai_stale_ceiling_secs must be at least ai_timeout_secs".to_string(),
            ));
        }
        if self.heartbeat_secs == 0 || self.event_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat_secs and event_buffer must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn ai_stale_ceiling(&self) -> Duration {
        Duration::from_secs(self.ai_stale_ceiling_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

fn read_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, SettingsError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| SettingsError::InvalidValue(format!("{name}: cannot parse `{raw}`"))),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid setting: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_ttl() {
        let settings = EngineSettings {
            session_ttl_secs: 0,
            ..EngineSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_player_cap() {
        for cap in [0, 1, 7] {
            let settings = EngineSettings {
                default_max_players: cap,
                ..EngineSettings::default()
            };
            assert!(settings.validate().is_err(), "cap {cap} should be rejected");
        }
    }

    #[test]
    fn stale_ceiling_must_cover_timeout() {
        let settings = EngineSettings {
            ai_timeout_secs: 60,
            ai_stale_ceiling_secs: 30,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn durations_convert_from_seconds() {
        let settings = EngineSettings::default();
        assert_eq!(settings.session_ttl(), Duration::from_secs(1800));
        assert_eq!(settings.heartbeat(), Duration::from_secs(30));
    }
}
