// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SendFlow Driver
//!
//! Entry point for the `sendflow` binary. Parses arguments, initializes
//! logging, loads the pipeline config and runs one flow end to end against
//! a freshly funded simulated network.
//!
//! - `transfer` — destination, amount, fee, summary, send
//! - `stake`    — amount, validator, approve if needed, stake
//! - `fees`     — quote the fee tiers of an asset
//! - `version`  — print build version information
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use sendflow::fee::{Fee, FeeOption, FeeValue};
use sendflow::flow::{Advance, FlowContext, Step, StepFlowController};
use sendflow::session::{SendSession, StakingServices, StakingSession, TransferServices};
use sendflow::simulated::SimulatedNetwork;
use sendflow::staking::{StakingPreparedAction, StakingState, ValidatorInfo, Yield};
use sendflow::transaction::{
    AdditionalFieldType, AddressSource, Asset, AssetFamily, DispatchResult,
};
use sendflow::PipelineConfig;

use cli::{AssetArg, Cli, Commands, FeesArgs, StakeArgs, TransferArgs};

/// Contract of the simulated staking token.
const STAKE_TOKEN_CONTRACT: &str = "0x7d1afa7b718fb893db30a3abc0cfc608aacfebb0";

/// Staking contract the token must be approved for.
const STAKE_SPENDER: &str = "0x5e3ef299fddf15eaa0432e6e66473ace8c13d908";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Transfer(args) => run_transfer(args, config).await,
        Commands::Stake(args) => run_stake(args, config).await,
        Commands::Fees(args) => query_fees(args, config).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("invalid pipeline config in {}", path.display()))?;
    tracing::info!(path = %path.display(), "pipeline config loaded");
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{out}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Simulated Wallet
// ---------------------------------------------------------------------------

/// An asset together with the balance and fiat rate the wallet starts with.
struct Profile {
    asset: Asset,
    balance: u128,
    fiat_rate: Decimal,
}

fn profile(arg: AssetArg) -> Profile {
    match arg {
        AssetArg::Btc => Profile {
            asset: Asset::coin("BTC", 8, AssetFamily::Utxo),
            balance: 100_000_000,
            fiat_rate: Decimal::new(65_000, 0),
        },
        AssetArg::Eth => Profile {
            asset: Asset::coin("ETH", 18, AssetFamily::Evm),
            balance: 10 * 10u128.pow(18),
            fiat_rate: Decimal::new(3_200, 0),
        },
        AssetArg::Xrp => Profile {
            asset: Asset {
                reserve: 10_000_000,
                additional_field: Some(AdditionalFieldType::DestinationTag),
                ..Asset::coin("XRP", 6, AssetFamily::Account)
            },
            balance: 1_000_000_000,
            fiat_rate: Decimal::new(55, 2),
        },
    }
}

fn funded_network(asset: &Asset, balance: u128, config: &PipelineConfig) -> Result<Arc<SimulatedNetwork>> {
    let owner = SimulatedNetwork::address_for(asset.family, "wallet")
        .context("failed to derive wallet address")?;
    let network = SimulatedNetwork::new(asset.clone(), &owner)
        .with_recent_limit(config.recent_addresses_limit);
    network.set_balance(&owner, balance);
    tracing::info!(asset = %asset.symbol, owner = %owner, balance, "simulated wallet funded");
    Ok(Arc::new(network))
}

/// Moves the flow one step on, accepting any fee advisory on the way.
async fn advance<C: FlowContext + ?Sized>(flow: &StepFlowController<C>) -> Result<Step> {
    match flow.perform_next().await? {
        Advance::Moved(step) => Ok(step),
        Advance::Blocked(pending) => {
            tracing::warn!(
                from = %pending.from,
                to = %pending.to,
                advisory = ?pending.advisory,
                "custom fee accepted despite advisory"
            );
            Ok(flow.resume(pending).await?)
        }
    }
}

/// Advances until the flow stands on `target`.
async fn advance_to<C: FlowContext + ?Sized>(flow: &StepFlowController<C>, target: Step) -> Result<()> {
    while flow.current_step() != target {
        let from = flow.current_step();
        let step = advance(flow)
            .await
            .with_context(|| format!("cannot leave the {from} step"))?;
        tracing::debug!(%from, to = %step, "flow advanced");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TransferReport<'a> {
    session: String,
    asset: &'a str,
    destination: String,
    amount: u128,
    fee_option: FeeOption,
    fee: Fee,
    balance_after: u128,
    #[serde(flatten)]
    result: DispatchResult,
}

async fn run_transfer(args: TransferArgs, config: PipelineConfig) -> Result<()> {
    let Profile {
        asset,
        balance,
        fiat_rate,
    } = profile(args.asset);
    let network = funded_network(&asset, balance, &config)?;
    let session = SendSession::new(
        asset.clone(),
        network.owner(),
        Some(fiat_rate),
        TransferServices::from_provider(network.clone()),
        config,
    );
    session.refresh_balance().await.context("balance refresh failed")?;

    let to = match args.to {
        Some(to) => to,
        None => SimulatedNetwork::address_for(asset.family, "recipient")
            .context("failed to derive recipient address")?,
    };
    let destination = session
        .set_destination(&to, AddressSource::Typed)
        .await
        .with_context(|| format!("invalid destination {to}"))?;
    if let Some(memo) = &args.memo {
        session
            .set_additional_field(memo)
            .with_context(|| format!("invalid memo {memo}"))?;
    }
    advance_to(session.flow(), Step::Amount).await?;

    let amount = session
        .set_amount(args.amount, args.fiat)
        .context("amount rejected")?;
    advance_to(session.flow(), Step::Fee).await?;

    let option = FeeOption::from(args.fee);
    session.select_fee(option).context("fee tier unavailable")?;
    if let Some(total) = args.custom_total {
        session
            .set_custom_total(total)
            .context("custom fee rejected")?;
    }
    advance_to(session.flow(), Step::Summary).await?;

    let fee = session.selected_fee()?;
    let result = match session.send().await {
        Ok(result) => result,
        Err(sendflow::SendError::Dispatch(e)) if e.is_silent() => {
            bail!("signing was cancelled")
        }
        Err(e) => return Err(e).context("transfer failed"),
    };

    session.flow().perform_finish()?;
    print_json(&TransferReport {
        session: session.id().to_string(),
        asset: &asset.symbol,
        destination: destination.value,
        amount: amount.crypto().unwrap_or_default(),
        fee_option: session.selected_fee_option(),
        fee,
        balance_after: network.balance(network.owner()),
        result,
    })
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StakeReport {
    session: String,
    approve: Option<DispatchResult>,
    stake: DispatchResult,
    state: StakingState,
}

fn stake_yield() -> Yield {
    Yield {
        apr: Decimal::new(41, 1),
        minimum_stake: 10u128.pow(18),
        unbonding_period_secs: 3 * 86_400,
        validators: vec![
            ValidatorInfo {
                address: "0x9a27d1b4f1c4a3c2e8e9f0e7d6c5b4a392817161".to_string(),
                name: "Northstar".to_string(),
                apr: Decimal::new(41, 1),
            },
            ValidatorInfo {
                address: "0x2b6d4e8f0a1c3e5f7092b4d6f8a0c2e4f6a8b0c2".to_string(),
                name: "Harbor".to_string(),
                apr: Decimal::new(39, 1),
            },
        ],
        enabled: true,
        available: true,
        allowance_spender: Some(STAKE_SPENDER.to_string()),
    }
}

async fn run_stake(args: StakeArgs, config: PipelineConfig) -> Result<()> {
    let asset = Asset::token("POL", 18, STAKE_TOKEN_CONTRACT);
    let network = funded_network(&asset, 1_000 * 10u128.pow(18), &config)?;
    let yield_info = stake_yield();
    network.set_yield(Some(yield_info.clone()));

    let session = StakingSession::new(
        asset,
        network.owner(),
        Some(Decimal::new(45, 2)),
        StakingServices::from_provider(network.clone()),
        &config,
    );
    if let Some(policy) = args.approve {
        session.set_approve_policy(policy.into());
    }
    session.refresh().await.context("staking state refresh failed")?;

    session
        .set_amount(args.amount, false)
        .context("stake amount rejected")?;
    advance_to(session.flow(), Step::ValidatorSelection).await?;

    let validator = match args.validator {
        Some(address) => address,
        None => match yield_info.validators.first() {
            Some(v) => v.address.clone(),
            None => bail!("no validators on offer"),
        },
    };
    session
        .select_validator(&validator)
        .with_context(|| format!("unknown validator {validator}"))?;
    advance_to(session.flow(), Step::Summary).await?;

    let mut approve = None;
    let stake = loop {
        match session.settled_action().await {
            Some(Ok(StakingPreparedAction::ReadyToApprove { .. })) if approve.is_none() => {
                approve = Some(
                    session
                        .send_approve_transaction()
                        .await
                        .context("approve failed")?,
                );
            }
            Some(Ok(StakingPreparedAction::ReadyToApprove { .. })) => {
                bail!("allowance still too low after approval")
            }
            Some(Ok(StakingPreparedAction::ReadyToStake { .. })) => {
                break session.send_stake().await.context("stake failed")?;
            }
            Some(Err(e)) => return Err(e).context("stake preparation failed"),
            None => bail!("stake inputs are incomplete"),
        }
    };

    session.flow().perform_finish()?;
    print_json(&StakeReport {
        session: session.id().to_string(),
        approve,
        stake,
        state: session.staking_state(),
    })
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct FeeQuote {
    option: FeeOption,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee: Option<Fee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn query_fees(args: FeesArgs, config: PipelineConfig) -> Result<()> {
    let Profile {
        asset,
        balance,
        fiat_rate,
    } = profile(args.asset);
    let network = funded_network(&asset, balance, &config)?;
    let session = SendSession::new(
        asset,
        network.owner(),
        Some(fiat_rate),
        TransferServices::from_provider(network.clone()),
        config,
    );

    let options = session.update_fees().await.context("fee quote failed")?;
    let quotes: Vec<FeeQuote> = options
        .iter()
        .map(|(option, value)| FeeQuote {
            option: *option,
            fee: value.fee().copied(),
            error: match value {
                FeeValue::FailedToLoad(e) => Some(e.to_string()),
                _ => None,
            },
        })
        .collect();
    print_json(&quotes)
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

fn print_version() {
    println!("sendflow {}", env!("CARGO_PKG_VERSION"));
    println!("  pipeline: {}", sendflow::VERSION);
}
