//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the generator throttle, in milliseconds.
pub const THROTTLE_ENV_VAR: &str = "RIPPLE_GENERATOR_THROTTLE_MS";

const DEFAULT_GENERATOR_THROTTLE: Duration = Duration::from_millis(100);

/// Configuration for a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Minimum wait before accepting a synchronously produced generator item.
    ///
    /// Items that are themselves deferred are awaited instead and do not
    /// pay this interval.
    #[serde(rename = "generator_throttle_ms", with = "millis")]
    pub generator_throttle: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            generator_throttle: DEFAULT_GENERATOR_THROTTLE,
        }
    }
}

impl RuntimeConfig {
    /// Config for interactive sessions (the default throttle).
    pub fn interactive() -> Self {
        Self::default()
    }

    /// Config without any generator throttle. Hot generators notify as fast
    /// as the scheduler can drive them.
    pub fn unthrottled() -> Self {
        Self {
            generator_throttle: Duration::ZERO,
        }
    }

    /// Replace the generator throttle.
    pub fn with_generator_throttle(mut self, throttle: Duration) -> Self {
        self.generator_throttle = throttle;
        self
    }

    /// Default config, with the throttle overridden from
    /// `RIPPLE_GENERATOR_THROTTLE_MS` when set.
    pub fn from_env() -> Result<Self> {
        match std::env::var(THROTTLE_ENV_VAR) {
            Ok(raw) => Self::default().with_throttle_str(&raw),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!("{}: {}", THROTTLE_ENV_VAR, e))),
        }
    }

    fn with_throttle_str(self, raw: &str) -> Result<Self> {
        let millis: u64 = raw.trim().parse().map_err(|e| {
            Error::Config(format!("{}={:?} is not a millisecond count: {}", THROTTLE_ENV_VAR, raw, e))
        })?;
        Ok(self.with_generator_throttle(Duration::from_millis(millis)))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
