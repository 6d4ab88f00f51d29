//! proms-mcp - MCP server for PromQL over Prometheus datasources

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use proms_mcp::{
    auth::TrustConfig,
    cli::{Cli, Command},
    config::{AuthMode, Config},
    datasource::DatasourceRegistry,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(cli: &Cli) -> proms_mcp::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    Ok(config)
}

/// Validate everything `serve` would, without binding ports
fn check_config(config: &Config) -> ExitCode {
    let trust = match validate_for_check(config) {
        Ok(trust) => trust,
        Err(e) => {
            eprintln!("Configuration invalid: {e}");
            return ExitCode::FAILURE;
        }
    };

    let auth = &config.auth;
    println!("Configuration OK");
    println!("  listen:          {}:{}", config.server.host, config.server.port);
    match config.server.health_port {
        Some(port) => println!("  health port:     {port}"),
        None => println!("  health port:     disabled"),
    }
    match auth.mode {
        AuthMode::None => println!("  auth:            none (development only)"),
        AuthMode::Active => {
            println!("  auth:            active ({:?})", auth.method);
            println!("  api url:         {}", auth.api_url.as_deref().unwrap_or("-"));
            if let Some(trust) = trust {
                println!("  tls trust:       {:?}", trust.mode());
            }
        }
    }
    println!("  cache ttl:       {}s", auth.cache_ttl.as_secs());

    let registry = DatasourceRegistry::load(&config.prometheus.datasources_path);
    println!(
        "  datasources:     {} from {}",
        registry.len(),
        config.prometheus.datasources_path.display()
    );
    for ds in registry.iter() {
        let header = ds.auth_header().map_or("", |_| " (auth header set)");
        println!("    - {} -> {}{header}", ds.name, ds.url);
    }

    ExitCode::SUCCESS
}

fn validate_for_check(config: &Config) -> proms_mcp::Result<Option<TrustConfig>> {
    config.validate()?;
    if config.auth.mode == AuthMode::None {
        return Ok(None);
    }
    let trust = TrustConfig::resolve(
        config.auth.ca_cert_path.as_deref(),
        config.auth.insecure_skip_tls_verify,
    )?;
    trust.load_ca_bundle()?;
    Ok(Some(trust))
}

async fn run_server(config: Config) -> ExitCode {
    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting proms-mcp");

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
