//! Outbound connection pooling for target contexts.
//!
//! One `reqwest::Client` per remote target, built with that target's TLS
//! material and the process proxy policy. Unlike a general-purpose client
//! cache, the pool is instance-owned (one per target registry, dropped
//! with it) and keyed by the target's connection identity: an invocation
//! client talks to a small, configuration-fixed target set, so entries
//! live as long as the registry and no eviction policy is needed.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use anyhow::Context as _;
use ipnet::IpNet;
use parking_lot::RwLock;
use tracing::warn;
use url::Url;

/// How outbound connections pick a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProxyConfig {
    /// Direct connections only; environment variables are ignored.
    Off,
    /// Resolve from the system: `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` on
    /// Unix, WinHTTP settings on Windows.
    System,
    /// Explicit per-protocol proxy URLs with a bypass list.
    Manual(ManualProxyConfig),
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::System
    }
}

/// Explicitly configured proxies. `exclude` follows `NO_PROXY` semantics:
/// exact hostnames, `.domain` suffixes, IP addresses, CIDR ranges, and `*`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct ManualProxyConfig {
    pub http: Option<Url>,
    pub https: Option<Url>,
    /// Fallback for every protocol without a dedicated entry.
    pub all: Option<Url>,
    pub exclude: Vec<String>,
}

impl ManualProxyConfig {
    /// Whether `target` matches the bypass list and should connect directly.
    pub fn should_bypass(&self, target: &Url) -> bool {
        self.exclude.iter().any(|pattern| pattern_matches(pattern, target))
    }

    /// The configured proxy for `target`'s scheme, falling back to `all`.
    pub fn select_proxy(&self, target: &Url) -> Option<&Url> {
        match target.scheme() {
            "http" => self.http.as_ref().or(self.all.as_ref()),
            "https" => self.https.as_ref().or(self.all.as_ref()),
            _ => self.all.as_ref(),
        }
    }
}

fn pattern_matches(pattern: &str, target: &Url) -> bool {
    if pattern == "*" {
        return true;
    }
    let Some(host) = target.host_str() else {
        return false;
    };
    if let Some(suffix) = pattern.strip_prefix('.') {
        return host == suffix || host.ends_with(suffix);
    }
    if pattern == host {
        return true;
    }
    match target_ip(target) {
        Some(ip) => ip_pattern_matches(pattern, ip),
        None => false,
    }
}

fn target_ip(target: &Url) -> Option<IpAddr> {
    match target.host() {
        Some(url::Host::Ipv4(ip)) => Some(IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => Some(IpAddr::V6(ip)),
        _ => None,
    }
}

fn ip_pattern_matches(pattern: &str, ip: IpAddr) -> bool {
    if let Ok(single) = IpAddr::from_str(pattern) {
        return ip == single;
    }
    IpNet::from_str(pattern).is_ok_and(|range| range.contains(&ip))
}

/// TLS inputs a caller-supplied context provider resolves per target.
/// The system trust store always applies; this only adds to it.
#[derive(Clone, Default)]
pub struct TlsMaterial {
    /// Root certificates trusted in addition to the system store.
    pub extra_root_certificates: Vec<reqwest::Certificate>,
    /// Skip certificate verification entirely. Test rigs only.
    pub accept_invalid_certs: bool,
}

/// The connection identity a pooled client is shared across: everything
/// that changes which socket pool or TLS session a request may reuse.
/// Paths and queries never do.
#[derive(PartialEq, Eq, Hash)]
struct PoolKey {
    scheme: String,
    host: String,
    port: Option<u16>,
    proxy: ProxyConfig,
}

impl PoolKey {
    fn for_target(target: &Url, proxy: &ProxyConfig) -> Self {
        Self {
            scheme: target.scheme().to_owned(),
            host: target.host_str().unwrap_or("").to_owned(),
            port: target.port(),
            proxy: proxy.clone(),
        }
    }
}

/// Pool of per-target clients. `reqwest::Client` is internally
/// reference-counted, so handing out clones shares one connection pool.
#[derive(Default)]
pub struct ClientPool {
    clients: RwLock<HashMap<PoolKey, reqwest::Client>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pooled client for `target`, building one on first use
    /// with `tls` applied. The same target identity always yields the same
    /// client, so its connections and TLS sessions are reused across
    /// every request the registry routes there.
    pub fn client_for(&self, target: &Url, proxy: &ProxyConfig, tls: &TlsMaterial) -> reqwest::Result<reqwest::Client> {
        let key = PoolKey::for_target(target, proxy);

        if let Some(client) = self.clients.read().get(&key) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write();
        // Double-checked: another thread may have built it while we waited.
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(target, proxy, tls)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(target: &Url, proxy: &ProxyConfig, tls: &TlsMaterial) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    for certificate in &tls.extra_root_certificates {
        builder = builder.add_root_certificate(certificate.clone());
    }
    if tls.accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(proxy_url) = resolve_proxy(target, proxy) {
        let proxy = reqwest::Proxy::all(proxy_url.clone()).inspect_err(|error| {
            warn!(%proxy_url, %error, "failed to configure proxy");
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build()
}

fn resolve_proxy(target: &Url, config: &ProxyConfig) -> Option<Url> {
    match config {
        ProxyConfig::Off => None,
        ProxyConfig::System => system_proxy_for(target).ok().flatten(),
        ProxyConfig::Manual(manual) if manual.should_bypass(target) => None,
        ProxyConfig::Manual(manual) => manual.select_proxy(target).cloned(),
    }
}

fn system_proxy_for(url: &Url) -> anyhow::Result<Option<Url>> {
    let Some(config) = proxy_cfg::get_proxy_config().map_err(|e| anyhow::anyhow!("proxy detection failed: {e}"))? else {
        return Ok(None);
    };
    // get_proxy_for_url already honors NO_PROXY exclusions.
    let Some(raw) = config.get_proxy_for_url(url) else {
        return Ok(None);
    };
    let proxy_url = Url::parse(&raw).context("system settings produced an invalid proxy URL")?;
    Ok(Some(proxy_url))
}
