use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::HttpClientBuilder;
use jsonrpsee::rpc_params;

use bitc_core::config::Config;
use bitc_rpc::types::StatusSnapshot;

mod context;
mod error;
mod node_runner;

use context::NodeContext;

#[derive(Parser)]
#[command(name = "bitc")]
#[command(about = "A bloom-filtered SPV Bitcoin client", version)]
struct Cli {
    /// Directory holding headers, address book and wallet state.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Address the node's JSON-RPC server listens on, or the client
    /// commands connect to.
    #[arg(long, global = true, default_value = "127.0.0.1:8332")]
    rpc_addr: SocketAddr,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node: dial peers, sync headers, serve JSON-RPC.
    Node {
        /// Passphrase used to unlock an existing wallet on startup, if
        /// any. Read from an environment variable, never the argv.
        #[arg(long)]
        unlock_env: Option<String>,
    },
    /// One-shot status query against a running node.
    Status,
    /// Wallet management.
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Creates a new encrypted wallet file in the state directory.
    New {
        #[arg(long)]
        passphrase: String,
    },
    /// Generates and prints a fresh receiving address. Operates
    /// directly on the on-disk wallet file; the node does not need to
    /// be running.
    NewAddress {
        #[arg(long)]
        passphrase: String,
    },
    /// Queries the live balance from a running node.
    Balance,
    /// Builds, signs and broadcasts a payment via a running node.
    Send {
        recipient: String,
        amount_sat: u64,
        #[arg(long, default_value_t = 1)]
        fee_rate: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let state_dir = cli.state_dir.clone().unwrap_or_else(bitc_core::config::default_state_dir);

    match cli.command {
        Commands::Node { unlock_env } => run_node(state_dir, cli.rpc_addr, unlock_env),
        Commands::Status => tokio_block_on(show_status(cli.rpc_addr)),
        Commands::Wallet { command } => run_wallet_command(state_dir, cli.rpc_addr, command),
    }
}

fn tokio_block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("failed to start tokio runtime").block_on(fut)
}

fn run_node(state_dir: PathBuf, rpc_addr: SocketAddr, unlock_env: Option<String>) -> anyhow::Result<()> {
    let config = Config::load_or_default(&state_dir)?;
    let mut context = NodeContext::open(state_dir, config)?;

    if let Some(var) = unlock_env {
        let passphrase = std::env::var(&var).map_err(|_| anyhow::anyhow!("environment variable {var} is not set"))?;
        context.unlock_wallet(&passphrase)?;
    }

    let shutdown = context.shutdown_flag();
    ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)).expect("failed to install Ctrl-C handler");

    let runner = node_runner::NodeRunner::spawn(context)?;

    tokio_block_on(async move {
        let events = Arc::new(bitc_rpc::EventChannels::new(256));
        let _server_handle = bitc_rpc::server::serve(rpc_addr, runner.clone(), events).await?;
        tracing::info!(%rpc_addr, "rpc server listening");

        // Block this async task until the node thread exits (Ctrl-C or
        // a fatal reactor error), then let the server handle drop.
        tokio::task::spawn_blocking(move || runner.join()).await?;
        anyhow::Ok(())
    })?;

    Ok(())
}

async fn show_status(rpc_addr: SocketAddr) -> anyhow::Result<()> {
    let client = HttpClientBuilder::default().build(format!("http://{rpc_addr}"))?;
    let snapshot: StatusSnapshot = client.request("status_snapshot", rpc_params![]).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn run_wallet_command(state_dir: PathBuf, rpc_addr: SocketAddr, command: WalletCommands) -> anyhow::Result<()> {
    match command {
        WalletCommands::New { passphrase } => {
            std::fs::create_dir_all(&state_dir)?;
            let mut wallet = bitc_wallet::keystore::Wallet::new_encrypted(&passphrase);
            wallet.unlock(&passphrase)?;
            wallet.save(&state_dir)?;
            println!("wallet created in {}", state_dir.display());
            Ok(())
        }
        WalletCommands::NewAddress { passphrase } => {
            let mut wallet = bitc_wallet::keystore::Wallet::load(&state_dir)?;
            wallet.unlock(&passphrase)?;
            let pubkey = wallet.generate_address(&passphrase)?;
            wallet.save(&state_dir)?;
            println!("{}", hex::encode(pubkey));
            Ok(())
        }
        WalletCommands::Balance => tokio_block_on(async move {
            let client = HttpClientBuilder::default().build(format!("http://{rpc_addr}"))?;
            let snapshot: StatusSnapshot = client.request("status_snapshot", rpc_params![]).await?;
            println!("{} sat", snapshot.balance_sat);
            Ok(())
        }),
        WalletCommands::Send { recipient, amount_sat, fee_rate } => tokio_block_on(async move {
            let client = HttpClientBuilder::default().build(format!("http://{rpc_addr}"))?;
            let txid: String = client.request("submit_tx", rpc_params![recipient, amount_sat, fee_rate]).await?;
            println!("{txid}");
            Ok(())
        }),
    }
}
