//! Forgelink MCP server binary: stdio transport, env-driven configuration.
//!
//! stdout carries the protocol; all logging goes to stderr.

use anyhow::{Context as _, Result};
use clap::Parser;
use forgelink_auth::AuthValidator;
use forgelink_mcp::config::RuntimeConfig;
use forgelink_mcp::context::Services;
use forgelink_mcp::dispatch::{Dispatcher, DispatcherConfig};
use forgelink_mcp::http::RestClient;
use forgelink_mcp::tools::build_registry;
use forgelink_repo_context::{GitDirProbe, RepoContextResolver};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "forgelink-mcp", version, about = "Forge tool server over stdio")]
struct Cli {
    /// Print the tool manifest as JSON and exit
    #[arg(long)]
    manifest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging to stderr only: stdout is the protocol stream.
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("FORGELINK_LOG", "warn"),
    )
    .target(env_logger::Target::Stderr)
    .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();

    let registry = Arc::new(build_registry().context("build tool registry")?);
    if cli.manifest {
        let manifest = serde_json::to_string_pretty(&registry.list())?;
        println!("{manifest}");
        return Ok(());
    }

    log::info!(
        "starting forgelink-mcp (host={}, concurrency={}, token={})",
        config.host,
        config.max_concurrency,
        if config.token.is_some() { "configured" } else { "absent" }
    );

    let rest = Arc::new(
        RestClient::new(config.api_url.clone(), config.token.clone())
            .context("build forge API client")?,
    );
    let services = Arc::new(Services {
        repo_resolver: RepoContextResolver::new(
            Arc::new(GitDirProbe::default()),
            config.host.clone(),
            config.context_ttl,
        ),
        auth: AuthValidator::new(
            rest.clone(),
            config.token.clone(),
            config.auth_ttl,
            config.auth_call_timeout,
        ),
        api: rest,
        workdir: std::env::current_dir().context("determine working directory")?,
    });

    let dispatcher = Dispatcher::new(
        registry,
        services,
        DispatcherConfig {
            max_concurrency: config.max_concurrency,
            default_timeout: config.tool_timeout,
            ..DispatcherConfig::default()
        },
    );

    dispatcher
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("serve stdio connection")?;

    log::info!("forgelink-mcp stopped");
    Ok(())
}
