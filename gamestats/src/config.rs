use aggregator::config::Config as AggregatorConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub aggregator: AggregatorConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;
        data.aggregator.validate()?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] aggregator::config::ConfigValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example.com/1
            aggregator:
                listener:
                    host: 0.0.0.0
                    port: 8080
                upstream:
                    api_key: secret
                rate_limits:
                    games:
                        max_requests: 10
                        window_secs: 60
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(
            config.common.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125,
            })
        );
        assert_eq!(
            config.common.logging.expect("logging config").sentry_dsn,
            "https://key@sentry.example.com/1"
        );
        assert_eq!(config.aggregator.listener.port, 8080);
        assert_eq!(config.aggregator.upstream.api_key, "secret");
        assert_eq!(config.aggregator.rate_limits.games.max_requests, 10);
        assert_eq!(config.aggregator.rate_limits.achievements.max_requests, 60);
    }

    #[test]
    fn common_sections_optional() {
        let tmp = write_tmp_file("aggregator:\n    upstream:\n        api_key: secret\n");
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.common.metrics, None);
        assert_eq!(config.common.logging, None);
        assert_eq!(config.aggregator.listener.port, 3000);
    }

    #[test]
    fn invalid_config_rejected() {
        let tmp = write_tmp_file("aggregator:\n    upstream:\n        api_key: \"\"\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));

        let tmp = write_tmp_file("metrics: {}\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/gamestats.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
