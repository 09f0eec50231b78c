//! Configuration loaded from environment variables and command-line flags.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use clap::Parser;
use rand::RngCore;
use tracing::warn;

use crate::form::CsrfSigner;
use crate::middleware::{BaseUrl, BasicAuth, FrameOptions, SecurityHeaders, basic_auth};

/// Command-line overrides for the environment.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Development mode: template reloading, generated CSRF secret, plain logs.
    #[arg(long)]
    pub dev: bool,

    /// Canonical base URL; requests for other hosts are redirected to it.
    #[arg(long)]
    pub base_url: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1).
    pub host: String,

    /// HTTP server port (default: 8000).
    pub port: u16,

    /// Development mode (default: false).
    pub dev: bool,

    /// Canonical base URL.
    pub base_url: Option<String>,

    /// CSRF secrets, newest first. Empty only in dev mode.
    pub csrf_secrets: Vec<String>,

    /// CSRF token lifetime (default: 30 minutes).
    pub csrf_max_age: Duration,

    /// Static asset directory (default: ./static).
    pub static_dir: PathBuf,

    /// Template directory (default: ./templates).
    pub templates_dir: PathBuf,

    /// How long to wait for in-flight requests on shutdown (default: 5s).
    pub shutdown_timeout: Duration,

    /// Security response headers.
    pub security: SecurityHeaders,

    /// Credentials guarding the event editor.
    pub basic_auth: Option<(String, String)>,

    /// Zone for datetime-local form fields (default: UTC).
    pub time_zone: Tz,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            dev: false,
            base_url: None,
            csrf_secrets: Vec::new(),
            csrf_max_age: Duration::from_secs(30 * 60),
            static_dir: PathBuf::from("./static"),
            templates_dir: PathBuf::from("./templates"),
            shutdown_timeout: Duration::from_secs(5),
            security: SecurityHeaders::default(),
            basic_auth: None,
            time_zone: Tz::UTC,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{name} must be a boolean, got `{other}`"),
    }
}

impl Config {
    /// Load configuration from environment variables, then apply flags.
    pub fn load(cli: Cli) -> Result<Self> {
        Self::read(|key| env::var(key).ok())?.with_cli(cli)
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self::read(get)?;
        config.check()?;
        Ok(config)
    }

    fn read(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let host = get("HOST").unwrap_or(defaults.host);

        let port = match get("PORT") {
            Some(v) => v.parse().context("PORT must be a valid u16")?,
            None => defaults.port,
        };

        let dev = match get("DEV") {
            Some(v) => parse_bool("DEV", &v)?,
            None => false,
        };

        let base_url = get("BASE_URL").filter(|v| !v.trim().is_empty());

        let csrf_secrets: Vec<String> = get("CSRF_SECRETS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let csrf_max_age = match get("CSRF_MAX_AGE_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .context("CSRF_MAX_AGE_SECS must be a number of seconds")?,
            ),
            None => defaults.csrf_max_age,
        };

        let static_dir = get("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let templates_dir = get("TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.templates_dir);

        let shutdown_timeout = match get("SHUTDOWN_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .context("SHUTDOWN_TIMEOUT_SECS must be a number of seconds")?,
            ),
            None => defaults.shutdown_timeout,
        };

        let frame_options = match get("SECURITY_X_FRAME_OPTIONS") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(FrameOptions::from_str(v.trim()).map_err(anyhow::Error::msg)?),
            None => defaults.security.frame_options,
        };
        let nosniff = match get("SECURITY_NOSNIFF") {
            Some(v) => parse_bool("SECURITY_NOSNIFF", &v)?,
            None => defaults.security.nosniff,
        };
        let content_security_policy = match get("SECURITY_CSP") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => defaults.security.content_security_policy,
        };
        let security = SecurityHeaders {
            frame_options,
            nosniff,
            content_security_policy,
        };

        let basic_auth = match (get("BASIC_AUTH_USERNAME"), get("BASIC_AUTH_PASSWORD")) {
            (Some(user), Some(password)) if !user.is_empty() => Some((user, password)),
            (Some(_), None) | (None, Some(_)) => {
                bail!("BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD must be set together")
            }
            _ => None,
        };

        let time_zone = match get("TIME_ZONE") {
            Some(v) => v
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("TIME_ZONE is not a known zone: {e}"))?,
            None => defaults.time_zone,
        };

        Ok(Self {
            host,
            port,
            dev,
            base_url,
            csrf_secrets,
            csrf_max_age,
            static_dir,
            templates_dir,
            shutdown_timeout,
            security,
            basic_auth,
            time_zone,
        })
    }

    /// Apply command-line overrides.
    pub fn with_cli(mut self, cli: Cli) -> Result<Self> {
        if let Some(host) = cli.host {
            self.host = host;
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if cli.dev {
            self.dev = true;
        }
        if let Some(base_url) = cli.base_url {
            self.base_url = Some(base_url);
        }
        self.check()?;
        Ok(self)
    }

    fn check(&self) -> Result<()> {
        if self.csrf_secrets.is_empty() && !self.dev {
            bail!("CSRF_SECRETS environment variable is required outside dev mode");
        }
        if let Some(base_url) = &self.base_url {
            BaseUrl::parse(base_url).context("BASE_URL must be an absolute URL")?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    /// Build the token signer. In dev mode without secrets, a random secret
    /// is generated, so tokens do not survive a restart.
    pub fn csrf_signer(&self) -> Result<CsrfSigner> {
        if self.csrf_secrets.is_empty() {
            if !self.dev {
                bail!("no CSRF secrets configured");
            }
            warn!("CSRF_SECRETS not set, using a random secret for this run");
            let mut secret = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            return CsrfSigner::new([hex::encode(secret)], self.csrf_max_age)
                .context("failed to create CSRF signer");
        }
        CsrfSigner::new(&self.csrf_secrets, self.csrf_max_age)
            .context("failed to create CSRF signer")
    }

    pub fn base_url(&self) -> Result<Option<BaseUrl>> {
        self.base_url
            .as_deref()
            .map(BaseUrl::parse)
            .transpose()
            .context("BASE_URL must be an absolute URL")
    }

    pub fn basic_auth(&self) -> Option<BasicAuth> {
        self.basic_auth
            .as_ref()
            .map(|(user, password)| basic_auth(user.clone(), password.clone()))
    }
}

// Tests are allowed to use unwrap/expect freely.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("CSRF_SECRETS", "a")]).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert!(!config.dev);
        assert_eq!(config.csrf_max_age, Duration::from_secs(1800));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.security, SecurityHeaders::default());
        assert_eq!(config.time_zone, Tz::UTC);
        assert!(config.basic_auth().is_none());
    }

    #[test]
    fn secrets_required_outside_dev() {
        assert!(load(&[]).is_err());
        let config = load(&[("DEV", "true")]).unwrap();
        assert!(config.dev);
        assert_eq!(config.csrf_signer().unwrap().secret_count(), 1);
    }

    #[test]
    fn secrets_are_split_and_trimmed() {
        let config = load(&[("CSRF_SECRETS", " new , old ,")]).unwrap();
        assert_eq!(config.csrf_secrets, ["new", "old"]);
        assert_eq!(config.csrf_signer().unwrap().secret_count(), 2);
    }

    #[test]
    fn security_headers_can_be_disabled() {
        let config = load(&[
            ("CSRF_SECRETS", "a"),
            ("SECURITY_X_FRAME_OPTIONS", ""),
            ("SECURITY_NOSNIFF", "false"),
            ("SECURITY_CSP", ""),
        ])
        .unwrap();
        assert_eq!(config.security, SecurityHeaders::disabled());

        let config = load(&[("CSRF_SECRETS", "a"), ("SECURITY_X_FRAME_OPTIONS", "sameorigin")])
            .unwrap();
        assert_eq!(config.security.frame_options, Some(FrameOptions::SameOrigin));
        assert!(load(&[("CSRF_SECRETS", "a"), ("SECURITY_X_FRAME_OPTIONS", "maybe")]).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("CSRF_SECRETS", "a"), ("PORT", "http")]).is_err());
        assert!(load(&[("CSRF_SECRETS", "a"), ("BASE_URL", "not a url")]).is_err());
        assert!(load(&[("CSRF_SECRETS", "a"), ("TIME_ZONE", "Mars/Olympus")]).is_err());
        assert!(load(&[("CSRF_SECRETS", "a"), ("BASIC_AUTH_USERNAME", "admin")]).is_err());
    }

    #[test]
    fn dev_flag_satisfies_secret_check() {
        let config = Config::read(|_| None)
            .unwrap()
            .with_cli(Cli {
                dev: true,
                ..Cli::default()
            })
            .unwrap();
        assert!(config.dev);
        assert!(Config::read(|_| None).unwrap().with_cli(Cli::default()).is_err());
    }

    #[test]
    fn cli_overrides_env() {
        let config = load(&[("CSRF_SECRETS", "a"), ("PORT", "9000")])
            .unwrap()
            .with_cli(Cli {
                host: Some("0.0.0.0".into()),
                port: Some(8080),
                dev: true,
                base_url: Some("https://example.com".into()),
            })
            .unwrap();
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:8080");
        assert!(config.dev);
        assert_eq!(
            config.base_url().unwrap().unwrap().authority(),
            "example.com"
        );
    }

    #[test]
    fn time_zone_and_auth() {
        let config = load(&[
            ("CSRF_SECRETS", "a"),
            ("TIME_ZONE", "Europe/Helsinki"),
            ("BASIC_AUTH_USERNAME", "admin"),
            ("BASIC_AUTH_PASSWORD", "secret"),
        ])
        .unwrap();
        assert_eq!(config.time_zone, chrono_tz::Europe::Helsinki);
        assert!(config.basic_auth().is_some());
    }
}
