//! Teleburn engine CLI
//!
//! Three read-only operations: derive an off-curve address from an
//! inscription id, decode a base64 transaction, and run the full dry-run
//! flow against configured RPC endpoints. Nothing here signs or submits.

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use teleburn::decoder;
use teleburn::derive;
use teleburn::rpc_gateway::RpcGateway;
use teleburn::simulator::{DryRunSimulator, FlowParams};
use teleburn::types::{InscriptionRef, RetirementMethod};
use teleburn::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Teleburn transaction engine: dry-run NFT retirement with Ordinals links", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive the off-curve Solana address for an inscription id
    Derive {
        /// Inscription id: <64-hex-txid>i<index>
        inscription_id: String,
    },

    /// Decode a base64 bincode transaction into labeled instructions
    Decode {
        /// Base64-encoded transaction
        transaction: String,
    },

    /// Build and simulate the full SEAL + RETIRE flow, printing the receipt
    DryRun {
        /// Inscription id: <64-hex-txid>i<index>
        #[arg(long)]
        inscription_id: String,

        /// NFT mint address
        #[arg(long)]
        mint: String,

        /// Current token holder
        #[arg(long)]
        owner: String,

        /// Fee payer (defaults to the owner)
        #[arg(long)]
        fee_payer: Option<String>,

        /// Retirement method
        #[arg(long, value_enum, default_value_t = MethodArg::Burn)]
        method: MethodArg,

        /// Token amount to retire (base units)
        #[arg(long, default_value_t = 1)]
        amount: u64,

        /// SHA-256 of the inscription content, 64 hex chars
        #[arg(long)]
        content_sha256: String,

        /// Close the source token account after a send-to-void transfer
        #[arg(long)]
        close_source_account: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Burn,
    SendToVoid,
    SendToDerived,
}

impl From<MethodArg> for RetirementMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Burn => RetirementMethod::Burn,
            MethodArg::SendToVoid => RetirementMethod::SendToVoid,
            MethodArg::SendToDerived => RetirementMethod::SendToDerived,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Derive { inscription_id } => {
            let inscription: InscriptionRef = inscription_id
                .parse()
                .context("invalid inscription id")?;
            let derived = derive::derive(&inscription)?;
            println!("address:    {}", derived.point);
            println!("iterations: {}", derived.iterations);
            info!(
                inscription = %inscription,
                iterations = derived.iterations,
                "derived off-curve address"
            );
        }
        Command::Decode { transaction } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(transaction.trim())
                .context("transaction is not valid base64")?;
            let tx = bincode::deserialize(&bytes)
                .context("bytes are not a bincode-encoded transaction")?;
            let decoded = decoder::decode(&tx);
            print_decoded(&decoded);
        }
        Command::DryRun {
            inscription_id,
            mint,
            owner,
            fee_payer,
            method,
            amount,
            content_sha256,
            close_source_account,
        } => {
            let config = Config::from_file(&args.config)
                .with_context(|| format!("loading config {}", args.config))?;
            info!(
                endpoints = config.rpc.endpoints.len(),
                "starting dry run"
            );

            let gateway = Arc::new(RpcGateway::from_urls(
                config.rpc.endpoints.clone(),
                config.gateway_config(),
            ));
            let _health = gateway.spawn_health_loop();

            let owner = owner.parse().context("invalid owner address")?;
            let params = FlowParams {
                inscription_id,
                mint: mint.parse().context("invalid mint address")?,
                owner,
                fee_payer: match fee_payer {
                    Some(p) => p.parse().context("invalid fee payer address")?,
                    None => owner,
                },
                method: method.into(),
                amount,
                content_sha256,
                close_source_account,
                include_metadata_update: config.flow.include_metadata_update,
                min_payer_balance_lamports: config.flow.min_payer_balance_lamports,
            };

            let report = DryRunSimulator::new(gateway).run(&params).await?;
            let receipt = DryRunSimulator::receipt(&report);
            println!("{}", receipt.to_json()?);
            if !report.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_decoded(decoded: &decoder::DecodedTransaction) {
    match decoded.fee_payer {
        Some(payer) => println!("fee payer: {payer}"),
        None => println!("fee payer: (none)"),
    }
    for (i, ix) in decoded.instructions.iter().enumerate() {
        println!("[{i}] {} :: {}", ix.program_label, ix.instruction_label);
        for account in &ix.accounts {
            let mut roles = Vec::new();
            if account.signer {
                roles.push("signer");
            }
            if account.writable {
                roles.push("writable");
            }
            println!("      {} [{}]", account.pubkey, roles.join(", "));
        }
        if let Some(parsed) = &ix.parsed {
            println!("      parsed: {parsed:?}");
        }
    }
    for warning in &decoded.warnings {
        println!("warning: {warning}");
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "teleburn=debug,info"
    } else {
        "teleburn=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
