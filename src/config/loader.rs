//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Validation(vec![err])
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, ParseErrorPolicy};
    use std::io::Write;

    const SAMPLE: &str = r#"
[listener]
bind_address = "127.0.0.1:8088"

[upstream]
url = "http://127.0.0.1:4000"
max_attempts = 3

[filter]
on_parse_error = "forward"

[mutations]
delete = ["a"]

[mutations.set]
b = "y"
c = "z"

[mutations.append]
b = "w"
d = "q"

[observability]
log_format = "json"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(SAMPLE).unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:8088");
        assert_eq!(config.upstream.url, "http://127.0.0.1:4000");
        assert_eq!(config.upstream.max_attempts, 3);
        assert_eq!(config.upstream.request_timeout_secs, 30);
        assert_eq!(config.filter.on_parse_error, ParseErrorPolicy::Forward);
        assert_eq!(config.mutations.delete, vec!["a".to_string()]);
        assert_eq!(config.mutations.set["b"], "y");
        assert_eq!(config.mutations.append["d"], "q");
        assert_eq!(config.limits.max_multipart_bytes, 32 * 1024 * 1024);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_empty_config_rejected() {
        let err = parse_config("").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: at least one of set, append, or delete must be provided"
        );
    }

    #[test]
    fn test_syntax_error() {
        let err = parse_config("[mutations\ndelete = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let err = parse_config("[filter]\non_parse_error = \"ignore\"\n[mutations]\ndelete = [\"a\"]")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.upstream.max_attempts, 3);

        let missing = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
