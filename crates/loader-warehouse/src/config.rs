use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// The largest ttl a warehouse accepts: `i32::MAX` milliseconds, a bit under 25 days.
pub const MAX_TTL: Duration = Duration::from_millis(i32::MAX as u64);

/// The environment variable consulted for the default of
/// [`production_mode`](WarehouseConfig::production_mode).
pub const ENV_VAR: &str = "LOADER_WAREHOUSE_ENV";

/// Configuration for a [`Warehouse`](crate::Warehouse).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WarehouseConfig {
    /// How long a shared loader stays alive.
    ///
    /// Accepts an integer number of milliseconds (`ttl: 1000`) or a human readable duration
    /// (`ttl: 1s`). This is required, and must be positive and no greater than [`MAX_TTL`].
    #[serde(deserialize_with = "deserialize_ttl")]
    pub ttl: Option<Duration>,

    /// Degrade gracefully instead of raising errors when an entry is missing.
    ///
    /// Defaults to `true` if the `LOADER_WAREHOUSE_ENV` environment variable is set to
    /// `production`.
    pub production_mode: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        WarehouseConfig {
            ttl: None,
            production_mode: env::var(ENV_VAR).is_ok_and(|env| env == "production"),
        }
    }
}

impl WarehouseConfig {
    /// Creates a configuration with the given ttl, taking all other values from the defaults.
    pub fn new(ttl: Duration) -> Self {
        WarehouseConfig {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    /// Loads the configuration from the YAML file at `path`, or the default configuration if no
    /// path is given.
    ///
    /// Note that the default configuration has no ttl, which the warehouse rejects.
    pub fn get(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_reader(fs::File::open(path)?),
            None => Ok(WarehouseConfig::default()),
        }
    }

    /// Parses the configuration from YAML.
    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self, ConfigError> {
        let mut config = String::new();
        reader.read_to_string(&mut config)?;
        // serde_yaml happily turns an empty document into defaults
        if config.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(serde_yaml::from_str(&config)?)
    }

    /// Returns the configured ttl, making sure that it is in range.
    pub fn validated_ttl(&self) -> Result<Duration, ConfigError> {
        let ttl = self.ttl.ok_or(ConfigError::MissingTtl)?;
        validate_ttl(ttl).ok_or(ConfigError::InvalidTtl(ttl))
    }
}

/// Returns the `ttl` if it is positive and no greater than [`MAX_TTL`].
pub(crate) fn validate_ttl(ttl: Duration) -> Option<Duration> {
    (!ttl.is_zero() && ttl <= MAX_TTL).then_some(ttl)
}

#[derive(Debug)]
struct TtlVisitor;

impl<'de> Visitor<'de> for TtlVisitor {
    type Value = Option<Duration>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            "a non-negative number of milliseconds, or a duration like \"10s\""
        )
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(Duration::from_millis(v)))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::invalid_value(Unexpected::Signed(v), &self)),
        }
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if !v.is_finite() || v < 0.0 {
            return Err(E::invalid_value(Unexpected::Float(v), &self));
        }
        Duration::try_from_secs_f64(v / 1000.0)
            .map(Some)
            .map_err(|_| E::invalid_value(Unexpected::Float(v), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if let Ok(millis) = v.trim().parse::<u64>() {
            return self.visit_u64(millis);
        }
        humantime::parse_duration(v)
            .map(Some)
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }
}

fn deserialize_ttl<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(TtlVisitor)
}
