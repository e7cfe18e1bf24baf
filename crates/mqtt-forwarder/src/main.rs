// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT Forwarder CLI
//!
//! Forwards sensor telemetry from an MQTT broker to InfluxDB.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration file (/config/config.yaml)
//! mqtt-forwarder
//!
//! # Run with another configuration file
//! mqtt-forwarder --config forwarder.yaml
//!
//! # Generate an example configuration
//! mqtt-forwarder gen-config --output forwarder.yaml
//!
//! # Check how a topic would be routed
//! mqtt-forwarder resolve --config forwarder.yaml kitchen/temperature/room1 21.5
//! ```

use clap::{Parser, Subcommand};
use mqtt_forwarder::router::spawn_worker;
use mqtt_forwarder::{
    Dispatcher, ForwarderConfig, InfluxStore, MqttSource, PayloadNormalizer, Router,
    RouterStatsSnapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "/config/config.yaml";

/// MQTT to InfluxDB telemetry forwarder
#[derive(Parser, Debug)]
#[command(name = "mqtt-forwarder")]
#[command(about = "Forward MQTT sensor telemetry to InfluxDB")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); `verbose: true` in the
    /// configuration file turns the default into debug
    #[arg(long)]
    log_level: Option<String>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "60")]
    stats_interval: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Resolve and normalize a message without connecting anywhere
    Resolve {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,

        /// MQTT topic
        topic: String,

        /// Message payload
        #[arg(default_value = "")]
        payload: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_logging(args.log_level.as_deref(), false);
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
            Commands::Resolve {
                config,
                topic,
                payload,
            } => cmd_resolve(config, &topic, &payload),
        };
    }

    let config = ForwarderConfig::from_file(&args.config)?;
    init_logging(args.log_level.as_deref(), config.verbose);
    tracing::debug!("Loaded configuration from {}", args.config.display());

    // The blocking HTTP client must be created outside the async runtime.
    let store = InfluxStore::connect(&config.influx)?;
    let dispatcher = Dispatcher::builder().register(Arc::new(store)).build();
    let router = Arc::new(Router::from_config(&config, dispatcher)?);
    let stats = router.stats();

    let (tx, rx) = mpsc::channel(config.mqtt.queue_capacity);
    let worker = spawn_worker(Arc::clone(&router), rx)?;

    let source = MqttSource::new(&config.mqtt, router.resolver().subscriptions());
    tracing::info!(
        "Forwarding {} node(s) from {}:{} to {}",
        router.resolver().len(),
        config.mqtt.host,
        config.mqtt.port,
        config.influx.database
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let stats_interval = args.stats_interval;
    let periodic_stats = Arc::clone(&stats);
    runtime.block_on(async move {
        let cancel = CancellationToken::new();

        if stats_interval > 0 {
            let stats = periodic_stats;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => log_stats(&stats.snapshot()),
                    }
                }
            });
        }

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down...");
            }
            shutdown.cancel();
        });

        source.run(tx, cancel).await
    })?;

    // The source dropped its sender: the worker drains what is queued and exits.
    if worker.join().is_err() {
        tracing::error!("Router worker panicked");
    }
    log_stats(&stats.snapshot());

    Ok(())
}

fn init_logging(level: Option<&str>, verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_new(level.unwrap_or(default))
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn log_stats(stats: &RouterStatsSnapshot) {
    tracing::info!(
        "received={} forwarded={} suppressed={} unresolved={} empty={} sink_failures={} ({:.1} msg/s)",
        stats.received,
        stats.forwarded,
        stats.suppressed,
        stats.unresolved,
        stats.empty,
        stats.sink_failures,
        stats.messages_per_second()
    );
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let yaml = ForwarderConfig::example().to_yaml()?;
    std::fs::write(&output, yaml)?;
    println!("Generated example configuration: {}", output.display());
    Ok(())
}

fn cmd_validate(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = ForwarderConfig::from_file(&path)?;
    let resolver = config.resolver()?;

    println!("Configuration is valid: {}", path.display());
    println!();
    println!("MQTT:   {}:{}", config.mqtt.host, config.mqtt.port);
    println!(
        "Influx: {} (database {})",
        config.influx.base_url(),
        config.influx.database
    );
    println!();
    for name in resolver.node_names() {
        let tags = resolver
            .node(name)
            .map(|n| n.tag_groups().join(", "))
            .unwrap_or_default();
        println!("  Node {:<20} subscribe {}/#  tags [{}]", name, name, tags);
    }
    if !config.stringify_values_for_measurements.is_empty() {
        println!();
        println!(
            "  Text-only measurements: {}",
            config.stringify_values_for_measurements.join(", ")
        );
    }

    Ok(())
}

fn cmd_resolve(path: PathBuf, topic: &str, payload: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ForwarderConfig::from_file(&path)?;
    let resolver = config.resolver()?;
    let normalizer =
        PayloadNormalizer::new(config.stringify_values_for_measurements.iter().cloned());

    let resolved = resolver.resolve(topic)?;
    let record = normalizer.normalize(&resolved.measurement_name, payload.as_bytes());

    println!("Node:        {}", resolved.node_name);
    println!("Measurement: {}", resolved.measurement_name);
    for (key, value) in &resolved.tags {
        println!("  tag   {} = {}", key, value);
    }
    for (key, value) in &record.fields {
        println!("  field {} = {}", key, value);
    }

    Ok(())
}
