//! Configuration file loading and parsing.

use std::path::Path;

use anyhow::{Context, Result};

use super::model::{FileConfig, NotificationConfig, KNOWN_KEYS};
use super::validation::{self, format_report, ValidationIssue, ValidationResult};
use crate::error::ConfigError;

/// Loads the configuration file from disk and parses it.
///
/// Returns the parsed file along with any warnings about unrecognized keys.
pub fn load_from_path(path: &Path) -> Result<(FileConfig, ValidationResult), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let parse_failed = |e: serde_yaml::Error| ConfigError::ParseFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let raw: serde_yaml::Value = serde_yaml::from_str(&content).map_err(parse_failed)?;
    let key_issues = check_unknown_keys(&raw);
    let config: FileConfig = serde_yaml::from_value(raw).map_err(parse_failed)?;

    Ok((config, key_issues))
}

/// Loads and fully validates the configuration file.
pub fn load_and_validate(path: &Path) -> Result<NotificationConfig> {
    let (config, mut result) = load_from_path(path).context("Failed to load configuration")?;
    result.extend(validation::validate(&config.slack, "slack"));

    for issue in result.warnings() {
        tracing::warn!(
            path = %issue.path,
            message = %issue.message,
            suggestion = ?issue.suggestion,
            "Config validation warning"
        );
    }

    if !result.is_valid() {
        tracing::error!("{}", format_report(&result));
        anyhow::bail!(ConfigError::ValidationFailed {
            error_count: result.error_count()
        });
    }

    Ok(config.slack)
}

/// Flags keys under `slack:` that no field accepts, suggesting the closest known key.
fn check_unknown_keys(raw: &serde_yaml::Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let Some(section) = raw.get("slack").and_then(|v| v.as_mapping()) else {
        return result;
    };

    for key in section.keys().filter_map(|k| k.as_str()) {
        if KNOWN_KEYS.contains(&key) {
            continue;
        }

        let mut issue = ValidationIssue::warning(format!("slack.{}", key), "Unknown key is ignored");
        let closest = KNOWN_KEYS
            .iter()
            .map(|known| (known, strsim::levenshtein(key, known)))
            .min_by_key(|(_, distance)| *distance);
        if let Some((known, distance)) = closest {
            if distance <= 3 {
                issue = issue.with_suggestion(format!("Did you mean '{}'?", known));
            }
        }
        result.add(issue);
    }

    result
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_a_valid_file() {
        let file = write_config(
            "slack:\n  webhook_url: https://hooks.example/T/B/C\n  channel: \"#ops\"\n",
        );
        let config = load_and_validate(file.path()).unwrap();
        assert_eq!(config.webhook_url, "https://hooks.example/T/B/C");
        assert_eq!(config.channel(), Some("#ops"));
    }

    #[test]
    fn missing_webhook_fails_to_parse() {
        let file = write_config("slack:\n  channel: \"#ops\"\n");
        let err = load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }

    #[test]
    fn empty_webhook_fails_validation() {
        let file = write_config("slack:\n  webhook_url: \"\"\n");
        let err = load_and_validate(file.path()).unwrap_err();
        let config_err = err.downcast_ref::<ConfigError>().unwrap();
        assert!(matches!(config_err, ConfigError::ValidationFailed { error_count: 1 }));
    }

    #[test]
    fn unknown_key_suggests_closest_match() {
        let file = write_config(
            "slack:\n  webhook_url: https://hooks.example/T/B/C\n  chanel: \"#ops\"\n",
        );
        let (_, issues) = load_from_path(file.path()).unwrap();
        let warning = issues.warnings().next().unwrap();
        assert_eq!(warning.path, "slack.chanel");
        assert_eq!(warning.suggestion.as_deref(), Some("Did you mean 'channel'?"));
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = load_from_path(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }
}
