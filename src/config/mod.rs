// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON), then apply environment overrides
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let mut config = parse_config(path, &contents)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse_config(path: &Path, contents: &str) -> Result<Config> {
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        }
        _ => serde_json::from_str(contents).context("Failed to parse JSON config")?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    const YAML: &str = r#"
server:
  listen: "127.0.0.1:8081"
health:
  probe_timeout_ms: 2000
  deadline_ms: 10000
logging:
  level: debug
  format: json
services:
  - name: Gateway
    url: http://gateway:8080/health
  - name: Party
    url: http://party:8080/health
    timeout_ms: 500
  - name: Vote
    url: http://vote:8080/health
"#;

    fn yaml() -> Config {
        parse_config(Path::new("config.yaml"), YAML).unwrap()
    }

    #[test]
    fn test_parse_yaml() {
        let config = yaml();
        assert_eq!(config.server.listen.port(), 8081);
        assert_eq!(config.health.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.health.deadline(), Some(Duration::from_secs(10)));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.metrics.enabled);

        let names: Vec<_> = config.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Gateway", "Party", "Vote"]);
        assert_eq!(config.services[1].timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.services[0].timeout(), None);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = parse_config(
            Path::new("config.json"),
            r#"{"services":[{"name":"User","url":"http://user/"}]}"#,
        )
        .unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.health.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.health.deadline(), None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.metrics.path, "/metrics");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = yaml();
        let mut duplicate = config.services[0].clone();
        duplicate.url = "http://other/".parse().unwrap();
        config.services.push(duplicate);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_scheme_and_timeouts() {
        let mut config = yaml();
        config.services[0].url = "ftp://gateway/".parse().unwrap();
        assert!(config.validate().is_err());

        let mut config = yaml();
        config.services[2].timeout_ms = Some(0);
        assert!(config.validate().is_err());

        let mut config = yaml();
        config.health.probe_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_metrics_port_clash() {
        let mut config = yaml();
        config.metrics.enabled = true;
        config.metrics.port = 8081;
        assert!(config.validate().is_err());

        config.metrics.port = 9100;
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_services_allowed() {
        let config = Config::default();
        assert!(config.services.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HEALTH_SERVICE_VOTE_URL", "http://vote.internal:9000/"),
            ("HEALTH_LISTEN", "0.0.0.0:9999"),
            ("HEALTH_SERVICE_UNKNOWN_URL", "http://ignored/"),
            ("RUST_LOG", "warn,composite_health=trace"),
        ]);

        let mut config = yaml();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.listen.port(), 9999);
        assert_eq!(config.services[2].url.as_str(), "http://vote.internal:9000/");
        assert_eq!(config.services[0].url.as_str(), "http://gateway:8080/health");
        assert_eq!(config.services.len(), 3);
        assert_eq!(config.logging.level, "warn,composite_health=trace");
    }

    #[test]
    fn test_level_kept_without_rust_log() {
        let mut config = yaml();
        config.apply_overrides(|_| None).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_override_invalid_url() {
        let mut config = yaml();
        let result = config.apply_overrides(|key| {
            (key == "HEALTH_SERVICE_GATEWAY_URL").then(|| "not a url".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_shipped_config_registration_order() {
        let config = parse_config(
            Path::new("config.yaml"),
            include_str!("../../config.yaml"),
        )
        .unwrap();
        config.validate().unwrap();

        let names: Vec<_> = config.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Candidate", "Election", "Gateway", "Party", "User", "Vote"]
        );
    }

    #[tokio::test]
    async fn test_load_config_missing_file() {
        assert!(load_config("does-not-exist.yaml").await.is_err());
    }
}
