//! jf-notify: Jay's Frames notification tool
//!
//! Runs the notification endpoint, or submits a notification through the
//! dispatch client and reports what happened to it.
//!
//! Usage:
//!   jf-notify serve                                   # Endpoint on 127.0.0.1:3000
//!   jf-notify serve --port 0 --cors                   # OS-assigned port, permissive CORS
//!   jf-notify send "New Order" "8x10 standard frame"  # Deliver to http://127.0.0.1:3000
//!   jf-notify send "Low stock" "5 left" --type warning --field sku=BLK-1620

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use jf_client::{
    ClientConfig, HttpDelivery, HttpDeliveryConfig, NotificationClient, SendOutcome,
};
use jf_protocol::{DEFAULT_SOURCE, NotificationOptions, NotificationType};
use jf_server::{NotificationServer, ServerConfig};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jf-notify", about = "Jay's Frames notification endpoint and client")]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the notification endpoint
    Serve {
        /// Port to listen on (0 for OS-assigned)
        #[arg(long, default_value = "3000")]
        port: u16,

        /// Hostname to bind to
        #[arg(long, default_value = "127.0.0.1")]
        hostname: String,

        /// Enable permissive CORS
        #[arg(long)]
        cors: bool,

        /// Maximum concurrent socket connections
        #[arg(long, default_value = "64")]
        max_connections: usize,

        /// Number of notifications kept for GET /api/notifications
        #[arg(long, default_value = "100")]
        history: usize,

        /// Seconds between socket liveness pings
        #[arg(long, default_value = "30")]
        heartbeat_secs: u64,
    },

    /// Send one notification through the dispatch client
    Send {
        title: String,
        description: String,

        /// info | success | warning | error
        #[arg(long = "type", default_value = "info")]
        kind: NotificationType,

        /// Endpoint origin
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        endpoint: String,

        /// Producing application
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,

        #[arg(long)]
        source_id: Option<String>,

        #[arg(long)]
        link: Option<String>,

        #[arg(long)]
        actionable: bool,

        /// Extra field as key=value (value parsed as JSON when possible)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, serde_json::Value)>,

        /// API key sent as X-API-Key
        #[arg(long)]
        api_key: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Queue the notification before connecting, exercising the flush path
        #[arg(long)]
        queued: bool,
    },
}

fn parse_field(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(verbose: bool, log_file: Option<&PathBuf>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .unwrap_or_else(|e| panic!("Failed to open log file {}: {e}", log_path.display()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_file.as_ref());

    match cli.command {
        Command::Serve {
            port,
            hostname,
            cors,
            max_connections,
            history,
            heartbeat_secs,
        } => {
            let config = ServerConfig {
                port,
                hostname,
                enable_cors: cors,
                max_connections: Some(max_connections),
                history_capacity: history,
                heartbeat_interval: Duration::from_secs(heartbeat_secs.max(1)),
                ..ServerConfig::default()
            };
            serve(config).await;
        }
        Command::Send {
            title,
            description,
            kind,
            endpoint,
            source,
            source_id,
            link,
            actionable,
            fields,
            api_key,
            timeout_secs,
            queued,
        } => {
            let delivery_config = HttpDeliveryConfig {
                api_key,
                timeout: timeout_secs.map(Duration::from_secs),
                ..HttpDeliveryConfig::new(endpoint)
            };

            let mut options = NotificationOptions::new().actionable(actionable);
            if let Some(id) = source_id {
                options = options.source_id(id);
            }
            if let Some(link) = link {
                options = options.link(link);
            }
            for (key, value) in fields {
                options = options.field(key, value);
            }

            let client_config = ClientConfig {
                default_source: source,
                ..ClientConfig::default()
            };

            let ok = send(delivery_config, client_config, title, description, kind, options, queued).await;
            if !ok {
                std::process::exit(1);
            }
        }
    }
}

async fn serve(config: ServerConfig) {
    let mut server = match NotificationServer::start(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start notification server: {e}");
            std::process::exit(1);
        }
    };

    let base = format!("http://{}:{}", config.hostname, server.port());

    println!();
    println!("  Jay's Frames notification server running");
    println!();
    println!("  API endpoints:");
    println!("    POST {base}/api/notifications   create a notification");
    println!("    GET  {base}/api/notifications   recent notifications");
    println!("    GET  {base}/health");
    println!();
    println!("  WebSocket:");
    println!("    ws://{}:{}/ws", config.hostname, server.port());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {e}");
    }

    println!();
    println!("  Shutting down...");
    server.stop().await;
    println!("  Server stopped.");
}

/// Returns whether the endpoint accepted the notification.
async fn send(
    delivery_config: HttpDeliveryConfig,
    client_config: ClientConfig,
    title: String,
    description: String,
    kind: NotificationType,
    options: NotificationOptions,
    queued: bool,
) -> bool {
    let delivery = match HttpDelivery::with_config(delivery_config) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create HTTP delivery: {e}");
            return false;
        }
    };
    println!("  Endpoint:  {}", delivery.url());

    let client = NotificationClient::with_config(client_config, delivery);
    let _echo = client.on_notification(|n| {
        println!("  Dispatched: [{}] {}: {}", n.kind, n.title, n.description);
    });

    if !queued {
        client.init().await;
    }

    let outcome = match client.send_notification(title, description, kind, options).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e}");
            return false;
        }
    };

    let report = match outcome {
        SendOutcome::Queued => {
            println!("  Queued; connecting and flushing...");
            client.init().await.into_iter().next()
        }
        SendOutcome::Delivered(report) | SendOutcome::Failed(report) => Some(report),
    };

    match report {
        Some(report) => {
            for (i, outcome) in report.listeners.iter().enumerate() {
                if !outcome.is_delivered() {
                    println!("  Listener {i} failed: {outcome:?}");
                }
            }
            match &report.delivery {
                Ok(body) => {
                    println!("  Delivered: {body}");
                    true
                }
                Err(e) => {
                    println!("  Not delivered: {e}");
                    false
                }
            }
        }
        None => false,
    }
}
