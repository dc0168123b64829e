use anyhow::{bail, Context, Result};
use bridge_config::{Config, ConfigLoader};
use bridge_core::{BridgeEngine, TransferError, TransferRequest};
use bridge_signer::{Signer, SignerSource, WalletSession};
use bridge_types::{BridgeEvent, Chain, ChainAddress, TransferState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod factories;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Cross-chain token transfers through a user wallet", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[arg(short, long, value_name = "FILE", default_value = "config/bridge.toml")]
	config: PathBuf,

	/// Overrides `bridge.log_level` (and `BRIDGE_LOG_LEVEL`)
	#[arg(long)]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Build and initiate a transfer, then wait for its attestation
	Start {
		/// Source chain, e.g. Sepolia
		#[arg(long)]
		from: String,
		/// Destination chain, e.g. Avalanche
		#[arg(long)]
		to: String,
		/// Receiving account; defaults to the sending account
		#[arg(long)]
		recipient: Option<String>,
		/// Token contract on the source chain; native token when omitted
		#[arg(long)]
		token: Option<String>,
		/// Decimal amount; the configured default when omitted
		#[arg(long)]
		amount: Option<String>,
		/// Attestation wait in milliseconds
		#[arg(long)]
		timeout_ms: Option<u64>,
	},
	/// Wait for attestation if needed and redeem a transfer on its destination
	Complete {
		transfer_id: String,
		#[arg(long)]
		timeout_ms: Option<u64>,
	},
	/// Show a stored transfer, or list all of them
	Status { transfer_id: Option<String> },
	/// Follow wallet and transfer events until interrupted
	Watch,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let loaded = ConfigLoader::from_file(&cli.config);

	// Initialize tracing
	setup_tracing(&log_level(cli.log_level.as_deref(), loaded.as_ref().ok()))?;

	let config = loaded.context("Failed to load configuration")?;
	info!("Configuration file: {:?}", cli.config);

	match &cli.command {
		Commands::Validate => validate_config(&config),
		command => {
			let engine = build_engine(config)?;
			match command {
				Commands::Start {
					from,
					to,
					recipient,
					token,
					amount,
					timeout_ms,
				} => {
					let mut request = TransferRequest::native(ChainAddress::new(
						Chain::new(to.as_str()),
						recipient.clone().unwrap_or_default(),
					));
					if let Some(token) = token {
						request = request.with_token(token.as_str());
					}
					if let Some(amount) = amount {
						request = request.with_amount(amount.as_str());
					}
					start_transfer(&engine, &Chain::new(from.as_str()), request, *timeout_ms).await
				}
				Commands::Complete {
					transfer_id,
					timeout_ms,
				} => complete_transfer(&engine, transfer_id, *timeout_ms).await,
				Commands::Status { transfer_id } => show_status(&engine, transfer_id.as_deref()).await,
				Commands::Watch => watch(&engine).await,
				Commands::Validate => Ok(()),
			}
		}
	}
}

/// Flag first, then the configured level, then `info`.
fn log_level(flag: Option<&str>, config: Option<&Config>) -> String {
	flag.map(str::to_string)
		.or_else(|| config.map(|c| c.bridge.log_level.clone()))
		.unwrap_or_else(|| "info".to_string())
}

fn build_engine(config: Config) -> Result<BridgeEngine> {
	info!(network = %config.bridge.network, "Configuration loaded");
	factories::builder(config)
		.build()
		.context("Failed to build bridge engine")
}

/// Connects the wallet that signs for `chain` and makes sure it sits on it.
async fn signer_on(engine: &BridgeEngine, chain: &Chain) -> Result<Arc<WalletSession>> {
	let session = engine.session_for(chain).map_err(explain)?;
	session.connect().await.context("Wallet connection failed")?;
	session.switch_to(chain).await.context("Wallet could not switch chains")?;
	Ok(session)
}

async fn start_transfer(
	engine: &BridgeEngine,
	from: &Chain,
	mut request: TransferRequest,
	timeout_ms: Option<u64>,
) -> Result<()> {
	let source = signer_on(engine, from).await?;
	if request.to.address.is_empty() {
		let Some(signer) = source.current_signer() else {
			bail!("wallet not connected");
		};
		request.to.address = signer.address().to_string();
	}

	let transfer = engine.new_transfer();
	let built = transfer
		.build_transfer(source.as_ref(), request)
		.await
		.map_err(explain)?;
	let Some(id) = built.transfer_id().map(str::to_string) else {
		bail!("transfer was not built");
	};
	info!(transfer_id = %id, "Transfer built");

	let txids = match transfer.initiate_transfer(source.as_ref()).await {
		Ok(txids) => txids,
		Err(e) => {
			for txid in e.submitted() {
				println!("source transaction already submitted: {}", txid);
			}
			return Err(explain(e));
		}
	};
	for txid in &txids {
		println!("source transaction: {}", txid);
	}

	match transfer
		.fetch_attestation(timeout_ms.map(Duration::from_millis))
		.await
	{
		Ok(attestations) => {
			for attestation in &attestations {
				println!("attestation: {}", attestation);
			}
			if transfer.state() == TransferState::Attested {
				println!("run `bridge-cli complete {}` to redeem", id);
			} else {
				println!("more attestations needed, run `bridge-cli complete {}` later", id);
			}
			Ok(())
		}
		Err(e @ TransferError::AttestationTimeout(_)) => {
			warn!(transfer_id = %id, "{}", e.kind());
			println!("still waiting, run `bridge-cli complete {}` to retry", id);
			Ok(())
		}
		Err(e) => Err(explain(e)),
	}
}

async fn complete_transfer(
	engine: &BridgeEngine,
	transfer_id: &str,
	timeout_ms: Option<u64>,
) -> Result<()> {
	let transfer = engine.resume(transfer_id).await.map_err(explain)?;
	let snapshot = transfer.snapshot();
	let Some(details) = snapshot.transfer.as_ref().map(|t| t.details.clone()) else {
		bail!("transfer {} has no details", transfer_id);
	};

	if matches!(
		snapshot.state,
		TransferState::Initiated | TransferState::AttestationPending
	) {
		transfer
			.fetch_attestation(timeout_ms.map(Duration::from_millis))
			.await
			.map_err(explain)?;
		if transfer.state() != TransferState::Attested {
			println!("more attestations needed, retry later");
			return Ok(());
		}
	}

	match transfer.state() {
		TransferState::Attested => {
			let destination = engine.session_for(&details.to.chain).map_err(explain)?;
			destination
				.connect()
				.await
				.context("Wallet connection failed")?;
			let txids = transfer
				.complete_transfer(destination.as_ref())
				.await
				.map_err(explain)?;
			for txid in &txids {
				println!("destination transaction: {}", txid);
			}
			Ok(())
		}
		TransferState::Completed => {
			println!("transfer {} is already completed", transfer_id);
			Ok(())
		}
		state => bail!("transfer {} cannot be completed from state {}", transfer_id, state),
	}
}

async fn show_status(engine: &BridgeEngine, transfer_id: Option<&str>) -> Result<()> {
	match transfer_id {
		Some(id) => {
			let snapshot = engine.snapshot(id).await.map_err(explain)?;
			println!("{}", serde_json::to_string_pretty(&snapshot)?);
		}
		None => {
			for id in engine.transfers().await? {
				let snapshot = engine.snapshot(&id).await.map_err(explain)?;
				println!("{} {}", id, snapshot.state);
			}
		}
	}
	Ok(())
}

async fn watch(engine: &BridgeEngine) -> Result<()> {
	let mut events = engine.event_bus().subscribe();
	for (family, result) in engine.connect().await {
		if let Err(e) = result {
			warn!(%family, error = %e, "Wallet not connected");
		}
	}
	let listeners = engine.spawn_listeners();
	info!("Watching wallet events, press Ctrl+C to stop");

	let shutdown = setup_shutdown_signal();
	tokio::pin!(shutdown);
	loop {
		tokio::select! {
			event = events.recv() => match event {
				Ok(BridgeEvent::Wallet(event)) => info!(?event, "Wallet event"),
				Ok(BridgeEvent::Transfer(event)) => info!(?event, "Transfer event"),
				Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed events"),
				Err(RecvError::Closed) => break,
			},
			_ = &mut shutdown => break,
		}
	}

	for listener in listeners {
		listener.abort();
	}
	Ok(())
}

fn validate_config(config: &Config) -> Result<()> {
	let registry = config.registry.build()?;

	info!("Configuration is valid");
	info!("Network: {}", config.bridge.network);
	info!(
		"Chains: {}",
		registry
			.chains(config.bridge.network)
			.map(|entry| entry.chain.to_string())
			.collect::<Vec<_>>()
			.join(", ")
	);
	for (family, wallet) in &config.wallets {
		info!("  Wallet: {} ({})", family, wallet.backend);
	}
	info!("  Platform: {}", config.platform.implementation);
	info!("  Storage: {}", config.storage.backend);
	Ok(())
}

/// Attaches the user-facing category to a transfer error.
fn explain(err: TransferError) -> anyhow::Error {
	let kind = err.kind();
	anyhow::Error::new(err).context(kind.to_string())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
