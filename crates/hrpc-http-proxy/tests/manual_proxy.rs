#![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

use hrpc_http_proxy::ManualProxyConfig;
use rstest::rstest;
use url::Url;

fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

#[rstest]
#[case("http://anything.example", true)]
#[case("https://10.1.2.3", true)]
fn wildcard_bypasses_everything(#[case] target: &str, #[case] expected: bool) {
    let config = ManualProxyConfig {
        exclude: vec!["*".to_owned()],
        ..Default::default()
    };
    assert_eq!(config.should_bypass(&url(target)), expected);
}

#[rstest]
#[case("http://localhost", true)]
#[case("http://target-a.example", true)]
#[case("http://target-b.example", false)]
fn exact_hostnames_bypass(#[case] target: &str, #[case] expected: bool) {
    let config = ManualProxyConfig {
        exclude: vec!["localhost".to_owned(), "target-a.example".to_owned()],
        ..Default::default()
    };
    assert_eq!(config.should_bypass(&url(target)), expected);
}

#[rstest]
#[case("http://node1.cluster.internal", true)]
#[case("http://cluster.internal", true)]
#[case("http://elsewhere.example", false)]
fn domain_suffixes_bypass(#[case] target: &str, #[case] expected: bool) {
    let config = ManualProxyConfig {
        exclude: vec![".cluster.internal".to_owned()],
        ..Default::default()
    };
    assert_eq!(config.should_bypass(&url(target)), expected);
}

#[rstest]
#[case("http://127.0.0.1", true)]
#[case("http://[::1]", true)]
#[case("http://10.0.0.7", true)]
#[case("http://172.16.0.1", false)]
fn addresses_and_cidr_ranges_bypass(#[case] target: &str, #[case] expected: bool) {
    let config = ManualProxyConfig {
        exclude: vec!["127.0.0.1".to_owned(), "::1".to_owned(), "10.0.0.0/8".to_owned()],
        ..Default::default()
    };
    assert_eq!(config.should_bypass(&url(target)), expected);
}

#[test]
fn scheme_specific_proxy_wins_over_fallback() {
    let http_proxy = url("http://proxy-plain:8080");
    let fallback = url("socks5://proxy-any:1080");
    let config = ManualProxyConfig {
        http: Some(http_proxy.clone()),
        all: Some(fallback.clone()),
        ..Default::default()
    };

    assert_eq!(config.select_proxy(&url("http://target.example")), Some(&http_proxy));
    assert_eq!(config.select_proxy(&url("https://target.example")), Some(&fallback));
}

#[test]
fn no_configured_proxy_selects_none() {
    let config = ManualProxyConfig::default();
    assert_eq!(config.select_proxy(&url("http://target.example")), None);
}
