//! Bridge configuration.
//!
//! Serverless hosts configure functions through environment variables, so
//! [`Config::from_env`] is the usual entry. Every field has a default and
//! every variable is optional:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `FNBRIDGE_RAISE_APP_EXCEPTIONS` | `raise_app_exceptions` | `true` |
//! | `FNBRIDGE_ROOT_PATH` | `root_path` | `""` |
//! | `FNBRIDGE_CLIENT_ADDR` | `client` | `127.0.0.1:123` |
//! | `FNBRIDGE_BASE_URL` | `base_url` | `http://server` |

use url::Url;

/// Configuration errors, reported before any request is served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Surface application failures even after the response was fully sent.
    pub raise_app_exceptions: bool,
    /// Reported to the application as the scope's root path.
    pub root_path: String,
    /// Synthetic peer address reported to the application.
    pub client: (String, u16),
    /// Base for request URLs that are not absolute.
    pub base_url: Url,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raise_app_exceptions: true,
            root_path: String::new(),
            client: ("127.0.0.1".to_owned(), 123),
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> Url {
    let Ok(url) = Url::parse("http://server") else {
        unreachable!("static base url parses");
    };
    url
}

impl Config {
    /// Defaults overridden by whichever `FNBRIDGE_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("FNBRIDGE_RAISE_APP_EXCEPTIONS") {
            config.raise_app_exceptions = parse_bool("FNBRIDGE_RAISE_APP_EXCEPTIONS", value)?;
        }
        if let Some(value) = lookup("FNBRIDGE_ROOT_PATH") {
            config.root_path = value;
        }
        if let Some(value) = lookup("FNBRIDGE_CLIENT_ADDR") {
            config.client = parse_addr("FNBRIDGE_CLIENT_ADDR", value)?;
        }
        if let Some(value) = lookup("FNBRIDGE_BASE_URL") {
            config.base_url = Url::parse(&value).map_err(|e| ConfigError::Invalid {
                key: "FNBRIDGE_BASE_URL",
                reason: e.to_string(),
                value,
            })?;
        }
        Ok(config)
    }

    pub fn with_raise_app_exceptions(mut self, raise: bool) -> Self {
        self.raise_app_exceptions = raise;
        self
    }

    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_client(mut self, host: impl Into<String>, port: u16) -> Self {
        self.client = (host.into(), port);
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value, reason: "expected a boolean".to_owned() }),
    }
}

fn parse_addr(key: &'static str, value: String) -> Result<(String, u16), ConfigError> {
    let parsed = value.rsplit_once(':')
        .and_then(|(host, port)| Some((host.to_owned(), port.parse().ok()?)))
        .filter(|(host, _)| !host.is_empty());
    parsed.ok_or_else(|| ConfigError::Invalid { key, value, reason: "expected host:port".to_owned() })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = from(&[]).unwrap();
        assert!(config.raise_app_exceptions);
        assert_eq!(config.root_path, "");
        assert_eq!(config.client, ("127.0.0.1".to_owned(), 123));
        assert_eq!(config.base_url.as_str(), "http://server/");
    }

    #[test]
    fn overrides() {
        let config = from(&[
            ("FNBRIDGE_RAISE_APP_EXCEPTIONS", "off"),
            ("FNBRIDGE_ROOT_PATH", "/fn"),
            ("FNBRIDGE_CLIENT_ADDR", "10.0.0.1:4000"),
            ("FNBRIDGE_BASE_URL", "https://fn.local"),
        ])
        .unwrap();
        assert!(!config.raise_app_exceptions);
        assert_eq!(config.root_path, "/fn");
        assert_eq!(config.client, ("10.0.0.1".to_owned(), 4000));
        assert_eq!(config.base_url.host_str(), Some("fn.local"));
    }

    #[rstest]
    #[case("FNBRIDGE_RAISE_APP_EXCEPTIONS", "maybe")]
    #[case("FNBRIDGE_CLIENT_ADDR", "nohost")]
    #[case("FNBRIDGE_CLIENT_ADDR", ":80")]
    #[case("FNBRIDGE_CLIENT_ADDR", "h:99999")]
    #[case("FNBRIDGE_BASE_URL", "not a url")]
    fn rejects(#[case] key: &str, #[case] value: &str) {
        let err = from(&[(key, value)]).unwrap_err();
        assert!(err.to_string().contains(key));
    }
}
