#![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

use hrpc_http_proxy::{ClientPool, ManualProxyConfig, ProxyConfig, TlsMaterial};
use rstest::rstest;
use url::Url;

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

#[rstest]
#[case(ProxyConfig::Off)]
#[case(ProxyConfig::System)]
fn pool_builds_a_client_in_every_proxy_mode(#[case] proxy: ProxyConfig) {
    let pool = ClientPool::new();
    let result = pool.client_for(&url("http://target.example"), &proxy, &TlsMaterial::default());
    assert!(result.is_ok());
}

#[test]
fn pool_builds_a_client_with_a_manual_proxy() {
    let pool = ClientPool::new();
    let proxy = ProxyConfig::Manual(ManualProxyConfig {
        http: Some(url("http://proxy.internal:8080")),
        ..Default::default()
    });
    let result = pool.client_for(&url("http://target.example"), &proxy, &TlsMaterial::default());
    assert!(result.is_ok());
}

#[test]
fn pool_builds_a_client_when_the_target_is_excluded() {
    let pool = ClientPool::new();
    let proxy = ProxyConfig::Manual(ManualProxyConfig {
        http: Some(url("http://proxy.internal:8080")),
        exclude: vec!["localhost".to_owned()],
        ..Default::default()
    });
    let result = pool.client_for(&url("http://localhost"), &proxy, &TlsMaterial::default());
    assert!(result.is_ok());
}

#[test]
fn pool_applies_caller_supplied_tls_material() {
    let pool = ClientPool::new();
    let tls = TlsMaterial {
        accept_invalid_certs: true,
        ..Default::default()
    };
    let result = pool.client_for(&url("https://target.example"), &ProxyConfig::Off, &tls);
    assert!(result.is_ok());
}

#[test]
fn pool_reuses_the_client_across_paths_of_the_same_target() {
    // Different path, same connection identity: the second call is a pool
    // hit rather than a fresh client build.
    let pool = ClientPool::new();
    let first = url("http://pooled.example:8080/some/path");
    let second = url("http://pooled.example:8080/other");
    pool.client_for(&first, &ProxyConfig::Off, &TlsMaterial::default()).unwrap();
    pool.client_for(&second, &ProxyConfig::Off, &TlsMaterial::default()).unwrap();
}
