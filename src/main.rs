use clap::{Parser, Subcommand};
use fragnet::networking::NetworkEvents;
use fragnet::node::{Node, NodeConfig};
use fragnet::UploadError;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "fragnet")]
#[command(about = "Peer-to-peer file sharing over content-addressed fragments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node that serves stored fragments until interrupted
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "config/fragnet.yaml")]
        config: String,
    },
    /// Upload a file and keep serving its fragments
    Upload {
        /// Path to the file to upload
        #[arg(short, long)]
        file: PathBuf,
        /// Configuration file path
        #[arg(short, long, default_value = "config/fragnet.yaml")]
        config: String,
    },
    /// Download a published file by name
    Download {
        /// Published filename to resolve
        #[arg(short = 'n', long)]
        filename: String,
        /// Output path for the downloaded file
        #[arg(short, long)]
        output: PathBuf,
        /// Configuration file path
        #[arg(short, long, default_value = "config/fragnet.yaml")]
        config: String,
    },
    /// Show version information
    Version,
}

/// Load the configuration, creating and saving a default one if the file
/// does not exist yet.
fn load_or_create_config(path: &str) -> anyhow::Result<NodeConfig> {
    if std::path::Path::new(path).exists() {
        Ok(NodeConfig::from_file(path)?)
    } else {
        warn!("Configuration file not found, creating default configuration");
        let default_config = NodeConfig::default();

        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        default_config.save_to_file(path)?;
        info!("Default configuration saved to: {}", path);
        Ok(default_config)
    }
}

/// Start the node's network service and spawn its run loop.
async fn start_node(
    config: NodeConfig,
) -> anyhow::Result<(Node, JoinHandle<anyhow::Result<()>>, NetworkEvents)> {
    let (node, mut service, events) = Node::new(config)?;
    service.start().await?;
    let service_task = tokio::spawn(async move { service.run().await });
    Ok((node, service_task, events))
}

/// Drain network events so the channel never backs up, logging the
/// interesting ones.
fn spawn_event_logger(mut events: NetworkEvents) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            debug!("Network event: {:?}", event);
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            info!("Starting fragnet node with config: {}", config);
            let node_config = load_or_create_config(&config)?;
            let (node, service_task, events) = start_node(node_config).await?;
            spawn_event_logger(events);

            println!("Node running. Peer ID: {}", node.local_peer_id());
            println!("Press Ctrl+C to stop.");

            tokio::signal::ctrl_c().await?;
            info!("Shutting down node");
            node.network().shutdown()?;
            service_task.await??;

            Ok(())
        }
        Commands::Upload { file, config } => {
            info!("Uploading file: {:?}", file);
            let node_config = load_or_create_config(&config)?;
            let (node, service_task, events) = start_node(node_config).await?;
            spawn_event_logger(events);

            match node.upload(&file).await {
                Ok(receipt) => {
                    println!("File uploaded successfully!");
                    println!("Filename: {}", receipt.filename);
                    println!("Fragments: {}", receipt.total_fragments);
                    println!("Bytes: {}", receipt.total_bytes);
                }
                Err(UploadError::Publish {
                    filename,
                    total_fragments,
                    source,
                }) => {
                    // Partial success: locally stored and servable by hash,
                    // but peers cannot resolve the name.
                    println!("File stored locally but NOT published: {}", source);
                    println!("Filename: {}", filename);
                    println!("Fragments: {}", total_fragments);
                }
                Err(e) => return Err(e.into()),
            }

            println!(
                "Serving fragments as peer {}. Press Ctrl+C to stop.",
                node.local_peer_id()
            );
            tokio::signal::ctrl_c().await?;
            info!("Shutting down node");
            node.network().shutdown()?;
            service_task.await??;

            Ok(())
        }
        Commands::Download {
            filename,
            output,
            config,
        } => {
            info!("Downloading file: {} -> {:?}", filename, output);
            let node_config = load_or_create_config(&config)?;
            let (node, service_task, events) = start_node(node_config).await?;
            spawn_event_logger(events);

            let receipt = node.download(&filename, &output).await?;

            println!("File downloaded successfully!");
            println!("Filename: {}", receipt.filename);
            println!("Fragments: {}", receipt.total_fragments);
            println!("Bytes: {}", receipt.total_bytes);
            println!("Output file: {:?}", output);

            node.network().shutdown()?;
            service_task.await??;

            Ok(())
        }
        Commands::Version => {
            println!("fragnet {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
