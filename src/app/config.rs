use crate::app::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Http {
        api_url: String,
        api_token: Option<String>,
        timeout_ms: u64,
    },
    FixtureFile {
        path: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub poll_interval_ms: u64,
    pub db_path: String,
    pub http_bind: String,
}

impl AppConfig {
    /// Reads the process environment after loading `.env`, if one exists.
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(error) = dotenvy::dotenv()
            && !error.not_found()
        {
            return Err(AppError::config(format!("failed to read .env file: {error}")));
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match non_empty(&lookup, "BINS_FIXTURE_FILE") {
            Some(path) => SourceConfig::FixtureFile { path },
            None => SourceConfig::Http {
                api_url: non_empty(&lookup, "BINS_API_URL").ok_or_else(|| {
                    AppError::config("BINS_API_URL is required unless BINS_FIXTURE_FILE is set")
                })?,
                api_token: non_empty(&lookup, "BINS_API_TOKEN"),
                timeout_ms: parse_or_default(&lookup, "HTTP_TIMEOUT_MS", 10_000_u64)?,
            },
        };

        let poll_interval_ms = parse_or_default(&lookup, "POLL_INTERVAL_MS", 30_000_u64)?;
        if poll_interval_ms == 0 {
            return Err(AppError::config("POLL_INTERVAL_MS must be greater than zero"));
        }

        Ok(Self {
            source,
            poll_interval_ms,
            db_path: non_empty(&lookup, "DB_PATH")
                .unwrap_or_else(|| "/var/lib/bin-monitor/bins.db".to_string()),
            http_bind: non_empty(&lookup, "HTTP_BIND")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn source_label(&self) -> &'static str {
        match self.source {
            SourceConfig::Http { .. } => "http",
            SourceConfig::FixtureFile { .. } => "fixture_file",
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, SourceConfig};

    #[test]
    fn rejects_missing_api_url() {
        let result = AppConfig::from_lookup(|_| None);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: BINS_API_URL is required unless BINS_FIXTURE_FILE is set"
        );
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(|key| match key {
            "BINS_API_URL" => Some(" https://api.example/v1 ".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert_eq!(
            result.source,
            SourceConfig::Http {
                api_url: "https://api.example/v1".to_string(),
                api_token: None,
                timeout_ms: 10_000,
            }
        );
        assert_eq!(result.poll_interval_ms, 30_000);
        assert_eq!(result.db_path, "/var/lib/bin-monitor/bins.db");
        assert_eq!(result.http_bind, "0.0.0.0:8080");
        assert_eq!(result.source_label(), "http");
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let result = AppConfig::from_lookup(|key| match key {
            "BINS_API_URL" => Some("https://api.example/v1".to_string()),
            "BINS_API_TOKEN" => Some("   ".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert!(matches!(
            result.source,
            SourceConfig::Http { api_token: None, .. }
        ));
    }

    #[test]
    fn fixture_file_replaces_http_source() {
        let result = AppConfig::from_lookup(|key| match key {
            "BINS_FIXTURE_FILE" => Some("./testdata/fixtures/happy_loop.json".to_string()),
            "POLL_INTERVAL_MS" => Some("5000".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert_eq!(
            result.source,
            SourceConfig::FixtureFile {
                path: "./testdata/fixtures/happy_loop.json".to_string()
            }
        );
        assert_eq!(result.poll_interval_ms, 5000);
        assert_eq!(result.source_label(), "fixture_file");
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(|key| match key {
            "BINS_API_URL" => Some("https://api.example/v1".to_string()),
            "POLL_INTERVAL_MS" => Some("abc".to_string()),
            _ => None,
        });

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: POLL_INTERVAL_MS must be a valid number"
        );
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let result = AppConfig::from_lookup(|key| match key {
            "BINS_FIXTURE_FILE" => Some("bins.json".to_string()),
            "POLL_INTERVAL_MS" => Some("0".to_string()),
            _ => None,
        });

        assert!(result.is_err());
    }
}
