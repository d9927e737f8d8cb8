/// Immutable description of one load-generation run.
///
/// Built once from the CLI layer, validated, then shared by value with every
/// component. Nothing mutates it for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub measurement: String,
    pub retention_policy: String,
    /// Points per write request. Zero writes empty batches.
    pub batch_size: usize,
    /// Write attempts launched per one-second tick.
    pub rate: u32,
    /// Number of ticks before the scheduler stops launching.
    pub duration_secs: u32,
    /// Ceiling on simultaneously in-flight write attempts.
    pub concurrency: usize,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("concurrency ceiling must be greater than zero")]
    ZeroConcurrency,

    #[error("database name must not be empty")]
    EmptyDatabase,

    #[error("measurement name must not be empty")]
    EmptyMeasurement,
}

impl RunConfig {
    /// Checks the run invariants.
    ///
    /// `rate`, `duration_secs` and `batch_size` only need to be non-negative,
    /// which their types already guarantee.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.database.is_empty() {
            return Err(ConfigError::EmptyDatabase);
        }
        if self.measurement.is_empty() {
            return Err(ConfigError::EmptyMeasurement);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample() -> RunConfig {
        RunConfig {
            host: "localhost".to_owned(),
            port: 8086,
            database: "load_test".to_owned(),
            measurement: "load_test".to_owned(),
            retention_policy: "default".to_owned(),
            batch_size: 10,
            rate: 5,
            duration_secs: 3,
            concurrency: 50,
        }
    }

    #[test]
    fn sample_config_is_valid() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = RunConfig {
            concurrency: 0,
            ..sample()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn empty_names_are_rejected() {
        let config = RunConfig {
            database: String::new(),
            ..sample()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyDatabase));

        let config = RunConfig {
            measurement: String::new(),
            ..sample()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyMeasurement));
    }

    #[test]
    fn zero_rate_and_zero_duration_are_allowed() {
        let config = RunConfig {
            rate: 0,
            duration_secs: 0,
            batch_size: 0,
            ..sample()
        };
        assert_eq!(config.validate(), Ok(()));
    }
}
