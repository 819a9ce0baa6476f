//! # CLI Interface
//!
//! `clap` derive definitions for the `sendflow` binary: `transfer`,
//! `stake`, `fees` and `version`. Every flow runs against an in-memory
//! simulated network.

use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

use sendflow::config::ApprovePolicy;
use sendflow::fee::FeeOption;

use crate::logging::LogFormat;

/// Drive wallet send and staking flows against a simulated chain.
#[derive(Parser, Debug)]
#[command(
    name = "sendflow",
    about = "Transaction preparation and dispatch pipeline driver",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Pipeline settings as JSON. Defaults apply when omitted.
    #[arg(long, short = 'c', env = "SENDFLOW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "SENDFLOW_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send coins from the simulated wallet.
    Transfer(TransferArgs),
    /// Stake a token, approving the staking contract first if needed.
    Stake(StakeArgs),
    /// Print the fee tiers currently quoted for an asset.
    Fees(FeesArgs),
    /// Print version information and exit.
    Version,
}

/// Assets the simulated network can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AssetArg {
    /// Bitcoin, per-byte fees.
    Btc,
    /// Ether, EIP-1559 gas fees.
    Eth,
    /// XRP, fixed fee, reserve and destination tag.
    Xrp,
}

/// Fee tier to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeeArg {
    Slow,
    Market,
    Fast,
    Custom,
}

impl From<FeeArg> for FeeOption {
    fn from(arg: FeeArg) -> Self {
        match arg {
            FeeArg::Slow => FeeOption::Slow,
            FeeArg::Market => FeeOption::Market,
            FeeArg::Fast => FeeOption::Fast,
            FeeArg::Custom => FeeOption::Custom,
        }
    }
}

/// Allowance to grant the staking contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApproveArg {
    Exact,
    Unlimited,
}

impl From<ApproveArg> for ApprovePolicy {
    fn from(arg: ApproveArg) -> Self {
        match arg {
            ApproveArg::Exact => ApprovePolicy::Exact,
            ApproveArg::Unlimited => ApprovePolicy::Unlimited,
        }
    }
}

/// Arguments for the `transfer` subcommand.
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Asset to send.
    #[arg(long, value_enum)]
    pub asset: AssetArg,

    /// Destination address or alias. A fresh simulated address when omitted.
    #[arg(long)]
    pub to: Option<String>,

    /// Amount in whole coins, or in fiat with `--fiat`.
    #[arg(long)]
    pub amount: Decimal,

    /// Interpret `--amount` as fiat.
    #[arg(long)]
    pub fiat: bool,

    /// Fee tier.
    #[arg(long, value_enum, default_value_t = FeeArg::Market)]
    pub fee: FeeArg,

    /// Total fee in smallest units, required with `--fee custom`.
    #[arg(long, required_if_eq("fee", "custom"))]
    pub custom_total: Option<u128>,

    /// Memo or destination tag, for assets that take one.
    #[arg(long)]
    pub memo: Option<String>,
}

/// Arguments for the `stake` subcommand.
#[derive(Args, Debug)]
pub struct StakeArgs {
    /// Amount in whole tokens.
    #[arg(long)]
    pub amount: Decimal,

    /// Validator address. The first validator on offer when omitted.
    #[arg(long)]
    pub validator: Option<String>,

    /// Approve policy. The configured default when omitted.
    #[arg(long, value_enum)]
    pub approve: Option<ApproveArg>,
}

/// Arguments for the `fees` subcommand.
#[derive(Args, Debug)]
pub struct FeesArgs {
    /// Asset to quote.
    #[arg(long, value_enum)]
    pub asset: AssetArg,
}
