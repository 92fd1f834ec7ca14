//! Configuration assembly: a TOML file merged with `HRPC_`-prefixed
//! environment variables, the environment winning.

use std::net::SocketAddr;

use camino::Utf8PathBuf;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().expect("valid default listen address")
}

fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}

fn default_prefix() -> String {
    "/app".to_owned()
}

fn default_discovery_ttl_ms() -> u64 {
    hrpc_core::DEFAULT_DISCOVERY_TTL_MS
}

fn default_retry_budget() -> u32 {
    hrpc_core::DEFAULT_MAX_RETRIES
}

fn default_log_filter() -> String {
    "info".to_owned()
}

/// Whether outbound requests to configured targets are made over TLS.
/// Certificate material itself is a caller concern; this only selects
/// `http` vs `https` when targets are given as bare `host:port` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    #[default]
    Plain,
    Tls,
}

/// Top-level configuration for the gateway binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conf {
    /// Targets this process dials as a naming/invocation client. Each entry
    /// is a bare `host:port` pair; `tls` selects the scheme applied to all
    /// of them uniformly.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Context path prefix shared by every target (`{prefix}/ejb/...`,
    /// `{prefix}/naming/...`).
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub tls: TlsMode,

    /// Discovery cache TTL in milliseconds.
    #[serde(default = "default_discovery_ttl_ms")]
    pub discovery_ttl_ms: u64,

    /// Naming retry budget for not-found responses.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Address the `serve` subcommand binds its component-invocation and
    /// naming routers to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// `tracing_subscriber::EnvFilter` directive string, overridden by
    /// `HRPC_LOG` at a higher precedence than the config file.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Folder (or file path) the rolling file log layer writes under.
    #[serde(default = "default_log_dir")]
    pub log_dir: Utf8PathBuf,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            prefix: default_prefix(),
            tls: TlsMode::default(),
            discovery_ttl_ms: default_discovery_ttl_ms(),
            retry_budget: default_retry_budget(),
            listen_addr: default_listen_addr(),
            log_filter: default_log_filter(),
            log_dir: default_log_dir(),
        }
    }
}

impl Conf {
    /// Loads from `config_path` (or `HRPC_CONFIG_PATH`, or a handful of
    /// well-known default locations) and overlays `HRPC_`-prefixed
    /// environment variables, e.g. `HRPC_LISTEN_ADDR`, `HRPC_TLS=tls`.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        let explicit_path = config_path.map(str::to_owned).or_else(|| std::env::var("HRPC_CONFIG_PATH").ok());
        if let Some(path) = explicit_path {
            figment = figment.merge(Toml::file(path));
        } else {
            for default_path in &["hrpc-gateway.toml", "/etc/hrpc-gateway/config.toml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Toml::file(default_path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("HRPC_").split("__"));

        let mut conf: Self = figment.extract().map_err(|err| anyhow::anyhow!("failed to load configuration: {err}"))?;

        // HRPC_LOG is documented as its own override, independent of the
        // `HRPC_LOG_FILTER` a plain `Env::prefixed` merge would expect.
        if let Ok(log_filter) = std::env::var("HRPC_LOG") {
            conf.log_filter = log_filter;
        }

        Ok(conf)
    }

    pub fn scheme(&self) -> &'static str {
        match self.tls {
            TlsMode::Plain => "http",
            TlsMode::Tls => "https",
        }
    }

    /// Parses every `host:port` entry in `targets` into a `url::Url` using
    /// the configured scheme, ready for `hrpc_core::TargetUri::parse`.
    pub fn target_urls(&self) -> anyhow::Result<Vec<url::Url>> {
        self.targets
            .iter()
            .map(|host_port| url::Url::parse(&format!("{}://{host_port}", self.scheme())).map_err(|err| anyhow::anyhow!("invalid target `{host_port}`: {err}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_any_config_file() {
        let conf = Conf::default();
        assert_eq!(conf.prefix, "/app");
        assert_eq!(conf.discovery_ttl_ms, hrpc_core::DEFAULT_DISCOVERY_TTL_MS);
        assert_eq!(conf.retry_budget, hrpc_core::DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn target_urls_applies_the_configured_scheme() {
        let conf = Conf {
            targets: vec!["host-a:8080".to_owned(), "host-b:8443".to_owned()],
            tls: TlsMode::Tls,
            ..Conf::default()
        };
        let urls = conf.target_urls().expect("valid host:port entries parse");
        assert_eq!(urls[0].as_str(), "https://host-a:8080/");
        assert_eq!(urls[1].as_str(), "https://host-b:8443/");
    }
}
