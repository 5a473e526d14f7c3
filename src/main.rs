use std::{future::IntoFuture, net::SocketAddr, path::Path};

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use switchyard::{
    HttpHandler,
    adapters::config_providers::provider_for,
    config::{ServerConfigValidator, models::ServerConfig},
    metrics, router, tracing_setup,
    utils::GracefulShutdown,
};

const DEFAULT_CONFIG_PATH: &str = "switchyard.yaml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file path or http(s):// URL
    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file
    Validate,
    /// Write a starter configuration file
    Init,
    /// Start the gateway server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(&args.config).await,
        Commands::Init => init_config_command(&args.config).await,
        Commands::Serve => serve(&args.config).await,
    }
}

async fn load_config(config_path: &str) -> Result<ServerConfig> {
    let provider = provider_for(config_path).context("Failed to create config provider")?;
    provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load config from {}", provider.source()))
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path).await?;

    tracing_setup::init_tracing(&config.logging)?;
    metrics::init_metrics()?;

    ServerConfigValidator::validate(&config).context("Invalid configuration")?;
    tracing::info!("Loaded configuration from {config_path}");

    let handler = HttpHandler::from_config(&config)?;
    for rule in handler.engine().routes().iter() {
        tracing::info!(
            route = %rule.id(),
            path = %rule.path_pattern(),
            method = rule.method().map(|m| m.as_str()).unwrap_or("*"),
            target = %rule.target(),
            "Configured route"
        );
    }
    let app = router(handler);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("Switchyard listening on {}", addr);

    let shutdown = GracefulShutdown::new();
    let signals = shutdown.clone();
    tokio::spawn(async move { signals.run_signal_handler().await });

    let stop_accepting = shutdown.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        stop_accepting.wait_for_shutdown_signal().await;
    })
    .into_future();

    // In-flight requests get a bounded drain window after the signal
    let drain = shutdown.clone();
    let drain_deadline = async move {
        drain.wait_for_shutdown_signal().await;
        tokio::time::sleep(drain.drain_timeout()).await;
    };

    tokio::select! {
        result = server => result.context("Server error")?,
        _ = drain_deadline => {
            tracing::warn!("Drain timeout exceeded, abandoning in-flight requests");
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration: {config_path}");

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Routes: {}", config.routes.len());
            for route in &config.routes {
                println!("       {} {} -> {}", route.id, route.path, route.target);
            }
            println!(
                "   • Discovery registry: {}",
                if config.discovery.registry.is_some() { "configured" } else { "none" }
            );
            println!("   • Forward timeout: {}", config.forward.timeout);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

const STARTER_CONFIG: &str = r#"# Switchyard gateway configuration

listen_addr: "127.0.0.1:8080"

forward:
  timeout: "30s"
  connect_timeout: "5s"
  forwarded_headers: true

discovery:
  selection: round_robin
  timeout: "2s"
  registry:
    kind: static
    services:
      address-service:
        - host: "127.0.0.1"
          port: 8082

logging:
  level: info
  format: json

admin:
  enabled: true
  path_prefix: "/__switchyard"

# Evaluated top to bottom; the first matching route wins.
routes:
  - id: person
    path: /person/**
    rewrite:
      - pattern: "/person/(?<segment>.*)"
        replacement: "/${segment}"
    target: "http://127.0.0.1:8081"

  - id: address
    path: /address/**
    rewrite:
      - pattern: "/address/(?<segment>.*)"
        replacement: "/${segment}"
    target: "lb://address-service"
"#;

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, STARTER_CONFIG)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created starter configuration at: {config_path}");
    println!("   Run 'switchyard serve --config {config_path}' to start the server");
    Ok(())
}
