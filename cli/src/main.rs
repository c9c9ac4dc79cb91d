// meshbridge: command-line front end for the mesh ⇄ chat bridge
//
// Manages the local bridge config, fetches access tokens, and runs the
// relay protocol between in-process nodes for demonstration.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use meshbridge_core::{
    AccessTokenProvider, BridgeDelegate, ChannelHandle, ChatServer, HttpTokenProvider,
    LoopbackMesh, MemoryChatBackend, MessageStatus, RelayCoordinator, RelayMessage,
    StaticTokenProvider, VendorIdentity,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

#[derive(Parser)]
#[command(name = "meshbridge")]
#[command(about = "MeshBridge: chat over the mesh for devices without network access", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show this device's identities
    Identity,
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Fetch an access token from the token service
    Token {
        /// Override the configured token URL
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Run the relay protocol between in-process nodes
    Simulate {
        /// Number of nodes on the mesh
        #[arg(short, long)]
        nodes: Option<usize>,
        /// Number of nodes without backend access
        #[arg(short, long)]
        offline: Option<usize>,
        /// Text each offline node sends
        #[arg(short, long, default_value = "hello from the mesh")]
        message: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    meshbridge_core::init_tracing(if cli.verbose { "debug" } else { "warn" });

    match cli.command {
        Commands::Identity => cmd_identity(),
        Commands::Config { action } => cmd_config(action),
        Commands::Token { url } => cmd_token(url).await,
        Commands::Simulate {
            nodes,
            offline,
            message,
        } => cmd_simulate(nodes, offline, message).await,
    }
}

fn cmd_identity() -> Result<()> {
    let config = config::Config::load()?;

    println!("{}", "Identity Information".bold());
    println!(
        "  Vendor identity:  {}",
        config.bridge.vendor_identity.to_string().bright_cyan()
    );
    println!(
        "  Display identity: {}",
        config.bridge.display_identity().bright_yellow()
    );
    println!(
        "  Backend access:   {}",
        if config.bridge.announce_backend_access {
            "announced".green()
        } else {
            "not announced".dimmed()
        }
    );

    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{}", value),
            None => println!("{}", "(not set)".dimmed()),
        },
        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            for (key, value) in config.list() {
                println!("  {:<26} {}", key.bright_cyan(), value);
            }
            println!();
            println!(
                "Config file: {}",
                config::Config::config_file()?
                    .display()
                    .to_string()
                    .dimmed()
            );
        }
    }

    Ok(())
}

async fn cmd_token(url: Option<String>) -> Result<()> {
    let config = config::Config::load()?;
    let url = url.unwrap_or_else(|| config.bridge.token_url.clone());

    let provider = HttpTokenProvider::new(url, config.bridge.display_identity());
    println!(
        "Requesting token for {} from {}",
        config.bridge.vendor_identity.to_string().bright_cyan(),
        provider.url()
    );

    let token = provider
        .fetch_token(&config.bridge.vendor_identity)
        .await
        .context("Failed to fetch access token")?;

    println!("{} Token: {}", "✓".green(), token.bright_yellow());
    Ok(())
}

// ============================================================================
// SIMULATOR
// ============================================================================

/// Prints every bridge notification, prefixed with the node's name
struct PrintingDelegate {
    node: String,
}

impl PrintingDelegate {
    fn new(node: &str) -> Self {
        Self {
            node: node.to_string(),
        }
    }

    fn tag(&self) -> ColoredString {
        format!("[{}]", self.node).bright_blue()
    }
}

impl BridgeDelegate for PrintingDelegate {
    fn on_peer_joined_channel(&self, channel: ChannelHandle, identity: String) {
        println!(
            "{} {} {} joined {}",
            self.tag(),
            "✓".green(),
            identity.bright_cyan(),
            channel
        );
    }

    fn on_message_sent(&self, status: MessageStatus) {
        let status = match status {
            MessageStatus::Success => status.as_str().green(),
            MessageStatus::Error => status.as_str().red(),
        };
        println!("{} Message sent: {}", self.tag(), status);
    }

    fn on_message_received(&self, message: RelayMessage) {
        println!(
            "{} {} {}",
            self.tag(),
            format!("<{}>", message.author).bright_yellow(),
            message.body
        );
    }

    fn on_joined_backend(&self, fields: BTreeMap<String, String>) {
        let identity = fields.get("identity").cloned().unwrap_or_default();
        println!(
            "{} {} Joined chat through a proxy as {}",
            self.tag(),
            "✓".green(),
            identity.bright_cyan()
        );
    }

    fn on_connection_failed(&self, reason: String) {
        println!(
            "{} {} Backend connection failed: {}",
            self.tag(),
            "✗".red(),
            reason.dimmed()
        );
    }

    fn on_lost_connectivity(&self, status: String) {
        println!("{} {} Connectivity {}", self.tag(), "⚠".yellow(), status);
    }
}

struct SimNode {
    name: String,
    online: bool,
    bridge: Arc<RelayCoordinator>,
    pump: tokio::task::JoinHandle<()>,
}

async fn cmd_simulate(nodes: Option<usize>, offline: Option<usize>, message: String) -> Result<()> {
    let config = config::Config::load()?;
    let nodes = nodes.unwrap_or(config.simulation.nodes);
    let offline = offline.unwrap_or(config.simulation.offline_nodes);
    let settle = Duration::from_millis(config.simulation.settle_ms);

    anyhow::ensure!(nodes >= 2, "A simulation needs at least two nodes");
    anyhow::ensure!(
        offline < nodes,
        "At least one node needs backend access ({} nodes, {} offline)",
        nodes,
        offline
    );

    println!("{}", "MeshBridge Simulation".bold());
    println!(
        "  {} nodes, {} with backend access, channel #{}",
        nodes,
        nodes - offline,
        config.bridge.channel_name
    );
    println!();

    let mesh = LoopbackMesh::new();
    let server = ChatServer::new();
    let tokens = Arc::new(StaticTokenProvider::new("simulated-token"));
    let mut sim = Vec::with_capacity(nodes);

    for i in 0..nodes {
        let name = format!("node-{}", i);
        let online = i < nodes - offline;

        // Node 0 is this device; the rest get fresh identities
        let mut bridge_config = config.bridge.clone();
        if i == 0 {
            server.register_user(
                bridge_config.vendor_identity.clone(),
                bridge_config.display_identity(),
            );
        } else {
            bridge_config.vendor_identity = VendorIdentity::generate();
            bridge_config.display_identity = Some(name.clone());
            server.register_user(bridge_config.vendor_identity.clone(), name.clone());
        }

        let (transport, mesh_rx) = mesh.join(&name);
        let (backend_tx, backend_rx) = unbounded_channel();
        let backend = if online {
            MemoryChatBackend::new(
                server.clone(),
                tokens.clone(),
                config.bridge.channel_name.clone(),
                backend_tx,
            )
        } else {
            MemoryChatBackend::offline(
                server.clone(),
                tokens.clone(),
                config.bridge.channel_name.clone(),
                backend_tx,
            )
        };

        let bridge = Arc::new(RelayCoordinator::new(
            bridge_config,
            Arc::new(transport),
            Arc::new(backend),
        ));
        bridge.set_delegate(Some(Arc::new(PrintingDelegate::new(&name))));
        bridge
            .start()
            .with_context(|| format!("Failed to start {}", name))?;

        let pump = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.run(mesh_rx, backend_rx).await })
        };

        println!(
            "{} Started {} ({})",
            "✓".green(),
            name.bright_cyan(),
            if online { "online" } else { "offline" }
        );
        sim.push(SimNode {
            name,
            online,
            bridge,
            pump,
        });
    }

    tokio::time::sleep(settle).await;
    println!();
    println!("{}", "Linking every node...".bold());
    for (i, a) in sim.iter().enumerate() {
        for b in sim.iter().skip(i + 1) {
            mesh.link(&a.name, &b.name);
        }
    }
    tokio::time::sleep(settle).await;

    println!();
    println!("{}", "Sending...".bold());
    for node in sim.iter().filter(|n| !n.online) {
        let text = format!("{} ({})", message, node.name);
        if let Err(e) = node.bridge.send_text(&text) {
            println!("{} {} could not send: {}", "✗".red(), node.name, e);
        }
    }
    tokio::time::sleep(settle).await;

    println!();
    let history = server.history();
    println!("{} ({} messages)", "Channel History".bold(), history.len());
    for message in &history {
        println!(
            "  {} {}",
            format!("<{}>", message.author).bright_yellow(),
            message.body
        );
    }

    for node in sim {
        node.bridge.stop();
        node.pump.abort();
    }

    Ok(())
}
