//! Thin CLI wiring: load configuration, build a [`hrpc_client::TargetRegistry`],
//! then either run the invocation + naming servers (`serve`) or exercise a
//! one-shot client operation (`invoke`, `lookup`, `discover`) against the
//! configured targets, for smoke-testing a deployment.

#![allow(clippy::print_stdout, reason = "CLI output goes to stdout by design")]

#[macro_use]
extern crate tracing;

mod config;
mod demo;

use std::sync::Arc;

use anyhow::Context as _;
use config::Conf;
use hrpc_client::{ContextData, DiscoveryCache, EjbClient, InvokeCall, NamingClient, NamingProvider, TargetRegistry};
use hrpc_codec::{ClassFilter, WireValue};
use hrpc_core::{BeanId, BeanLocator, Name, TargetUri, TransactionInfo};
use hrpc_log::StaticLogConfig;

struct GatewayLogConfig;

impl StaticLogConfig for GatewayLogConfig {
    const MAX_LOG_FILES: usize = 10;
    const LOG_FILE_PREFIX: &'static str = "hrpc-gateway";
}

enum CliAction {
    ShowHelp,
    Serve,
    Invoke { target: String, bean: String, view: String, method: String, arg: String },
    Lookup { name: String },
    Discover,
}

fn parse_args() -> anyhow::Result<CliAction> {
    let mut args = std::env::args().skip(1);

    // --config-path is folded into the environment variable the config
    // loader reads, so both spellings configure the same thing.
    let mut remaining = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config-path" {
            let path = args.next().context("missing value for --config-path")?;
            // SAFETY: single-threaded at this point in startup.
            unsafe { std::env::set_var("HRPC_CONFIG_PATH", &path) };
        } else {
            remaining.push(arg);
        }
    }

    let mut rest = remaining.into_iter();
    match rest.next().as_deref() {
        Some("serve") => Ok(CliAction::Serve),
        Some("invoke") => {
            let target = rest.next().context("invoke: missing <target host:port>")?;
            let bean = rest.next().context("invoke: missing <app/module/distinct/bean>")?;
            let view = rest.next().context("invoke: missing <view>")?;
            let method = rest.next().context("invoke: missing <method>")?;
            let arg = rest.next().unwrap_or_default();
            Ok(CliAction::Invoke { target, bean, view, method, arg })
        }
        Some("lookup") => {
            let name = rest.next().context("lookup: missing <name>")?;
            Ok(CliAction::Lookup { name })
        }
        Some("discover") => Ok(CliAction::Discover),
        _ => Ok(CliAction::ShowHelp),
    }
}

fn print_help() {
    println!(
        r#"USAGE:
    hrpc-gateway serve
    hrpc-gateway invoke <host:port> <app/module/distinct/bean> <view> <method> [stringArg]
    hrpc-gateway lookup <name>
    hrpc-gateway discover

OPTIONS:
    --config-path <path>   Path to the TOML config file (also HRPC_CONFIG_PATH)

ENVIRONMENT:
    HRPC_LOG            tracing_subscriber EnvFilter directive
    HRPC_CONFIG_PATH    path to the TOML config file
"#
    );
}

fn parse_bean_id(raw: &str) -> anyhow::Result<BeanId> {
    let parts: Vec<&str> = raw.split('/').collect();
    anyhow::ensure!(parts.len() == 4, "expected app/module/distinct/bean, got `{raw}`");
    Ok(BeanId::new(parts[0], parts[1], parts[2], parts[3]))
}

fn configured_targets(conf: &Conf) -> anyhow::Result<Vec<TargetUri>> {
    conf.target_urls()?
        .iter()
        .map(|url| TargetUri::parse(url, &conf.prefix).map_err(|err| anyhow::anyhow!("invalid target: {err}")))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let action = parse_args()?;

    let conf = Conf::load(None).context("unable to load configuration")?;
    let _log_guard = hrpc_log::init::<GatewayLogConfig>(conf.log_dir.as_path(), &conf.log_filter, None).context("failed to initialize logging")?;

    match action {
        CliAction::ShowHelp => print_help(),
        CliAction::Serve => run_serve(conf).await?,
        CliAction::Invoke { target, bean, view, method, arg } => run_invoke(conf, &target, &bean, &view, &method, &arg).await?,
        CliAction::Lookup { name } => run_lookup(conf, &name).await?,
        CliAction::Discover => run_discover(conf).await?,
    }

    Ok(())
}

/// Runs the component-invocation and naming servers against an in-memory
/// demo backend. A real deployment supplies its own [`hrpc_server::EjbDispatcher`]
/// / [`hrpc_server::NamingDispatcher`] wired to the actual component
/// container; this binary's job ends at the HTTP boundary, so `serve`
/// exists to smoke-test that boundary end to end, not to host production
/// components.
async fn run_serve(conf: Conf) -> anyhow::Result<()> {
    let ejb_state = hrpc_server::EjbState::new(Arc::new(demo::DemoEjbDispatcher::default()), ClassFilter::allow_all());
    let naming_state = hrpc_server::NamingState::new(Arc::new(demo::DemoNamingDispatcher::default()), ClassFilter::allow_all());

    let router = axum::Router::new()
        .nest(&conf.prefix, hrpc_server::make_router(ejb_state, naming_state))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let mut tasks = hrpc_task::TaskSet::new();
    tasks.spawn(hrpc_log::LogRetentionTask::<GatewayLogConfig>::new(conf.log_dir.clone()));

    let listener = tokio::net::TcpListener::bind(conf.listen_addr).await.with_context(|| format!("failed to bind {}", conf.listen_addr))?;
    info!(addr = %conf.listen_addr, prefix = %conf.prefix, "hrpc-gateway listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server loop failed")?;

    tasks.shutdown().await;
    Ok(())
}

/// Fires one invocation against a command-line-given target and prints the
/// echoed result, for smoke-testing a running `serve`.
async fn run_invoke(conf: Conf, target: &str, bean: &str, view: &str, method: &str, arg: &str) -> anyhow::Result<()> {
    let registry = Arc::new(TargetRegistry::new(hrpc_http_proxy::ProxyConfig::default()));
    let client = EjbClient::new(Arc::clone(&registry), conf.prefix.clone(), ClassFilter::allow_all());

    let url: url::Url = format!("{}://{target}", conf.scheme()).parse().with_context(|| format!("invalid target `{target}`"))?;
    let target_uri = TargetUri::parse(&url, &conf.prefix).context("invalid target URI")?;

    let bean_id = parse_bean_id(bean)?;
    let mut context = ContextData::default();
    let call = InvokeCall {
        target: target_uri,
        locator: BeanLocator::stateless(bean_id),
        view: view.to_owned(),
        method: method.to_owned(),
        param_types: if arg.is_empty() { vec![] } else { vec!["java.lang.String".to_owned()] },
        args: if arg.is_empty() { vec![] } else { vec![WireValue::Str(arg.to_owned())] },
        tx: TransactionInfo::None,
        returns_future: false,
        returns_void: false,
        declared_async: false,
        compress: false,
    };

    let outcome = client.invoke(call, &mut context).await.context("invocation failed")?;
    match outcome.result {
        Some(value) => println!("{value:?}"),
        None => println!("(accepted asynchronously, no result)"),
    }
    Ok(())
}

/// Looks `name` up across every configured target, with block-listing and
/// the configured not-found budget deciding failover.
async fn run_lookup(conf: Conf, name: &str) -> anyhow::Result<()> {
    let targets = configured_targets(&conf)?;
    anyhow::ensure!(!targets.is_empty(), "no targets configured; add `targets = [\"host:port\"]` to the config file");

    let registry = Arc::new(TargetRegistry::new(hrpc_http_proxy::ProxyConfig::default()));
    let client = NamingClient::new(registry, conf.prefix.clone(), ClassFilter::allow_all()).with_retry_budget(conf.retry_budget);
    let provider = NamingProvider::new(targets);

    match client.lookup(&provider, Name::parse(name)).await.context("lookup failed")? {
        hrpc_client::LookupOutcome::Value(value) => println!("{value:?}"),
        hrpc_client::LookupOutcome::SubContext(name) => println!("(sub-context at `{name}`)"),
    }
    Ok(())
}

/// Refreshes the discovery cache once across every configured target and
/// prints the resulting module catalog.
async fn run_discover(conf: Conf) -> anyhow::Result<()> {
    let targets = configured_targets(&conf)?;
    anyhow::ensure!(!targets.is_empty(), "no targets configured; add `targets = [\"host:port\"]` to the config file");

    let registry = Arc::new(TargetRegistry::new(hrpc_http_proxy::ProxyConfig::default()));
    let client = EjbClient::new(registry, conf.prefix.clone(), ClassFilter::allow_all());
    let cache = DiscoveryCache::new(std::time::Duration::from_millis(conf.discovery_ttl_ms));

    cache.refresh(&client, &targets).await;
    let mut modules: Vec<String> = cache.snapshot().into_iter().map(|m| m.to_string()).collect();
    modules.sort();
    if modules.is_empty() {
        println!("(no modules published by any configured target)");
    }
    for module in modules {
        println!("{module}");
    }
    Ok(())
}
