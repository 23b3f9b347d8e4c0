pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const API_URL_VAR: &str = "MINILABEL_API_URL";
const TIMEOUT_VAR: &str = "MINILABEL_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API URL must start with http:// or https://, got {0:?}")]
    InvalidUrl(String),

    #[error("MINILABEL_TIMEOUT_SECS must be a positive number of seconds, got {0:?}")]
    InvalidTimeout(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Base URL of the item API, without trailing slash.
    pub api_url: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// First positional argument, then `MINILABEL_API_URL`, then the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(
            std::env::args().nth(1),
            std::env::var(API_URL_VAR).ok(),
            std::env::var(TIMEOUT_VAR).ok(),
        )
    }

    fn resolve(
        arg_url: Option<String>,
        env_url: Option<String>,
        env_timeout: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(url) = arg_url.or(env_url).filter(|u| !u.trim().is_empty()) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url));
            }
            config.api_url = url;
        }

        if let Some(raw) = env_timeout {
            config.request_timeout_secs = match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_without_overrides() {
        assert_eq!(Config::resolve(None, None, None).unwrap(), Config::default());
    }

    #[test]
    fn argument_wins_over_environment() {
        let c = Config::resolve(
            Some("https://label.example.com/".into()),
            Some("http://other:9000".into()),
            None,
        )
        .unwrap();
        assert_eq!(c.api_url, "https://label.example.com");
    }

    #[test]
    fn environment_url_and_timeout() {
        let c = Config::resolve(None, Some("http://10.0.0.5:8000".into()), Some("5".into()))
            .unwrap();
        assert_eq!(c.api_url, "http://10.0.0.5:8000");
        assert_eq!(c.request_timeout_secs, 5);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert_matches!(
            Config::resolve(Some("localhost:8000".into()), None, None),
            Err(ConfigError::InvalidUrl(_))
        );
        assert_matches!(
            Config::resolve(None, None, Some("0".into())),
            Err(ConfigError::InvalidTimeout(_))
        );
        assert_matches!(
            Config::resolve(None, None, Some("soon".into())),
            Err(ConfigError::InvalidTimeout(_))
        );
    }
}
