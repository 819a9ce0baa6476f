//! End-to-end tests for the send and staking pipelines.
//!
//! Each test drives a full session against its own `SimulatedNetwork`:
//! destination and amount entry, fee quoting, the step flow, the relevance
//! guard, signing and submission. Ledger effects are checked on the
//! simulated chain afterwards.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use sendflow::fee::{Fee, FeeAdvisory, FeeOption, FeeParameters};
use sendflow::flow::{Advance, Step};
use sendflow::provider::ProviderError;
use sendflow::session::{SendError, SendSession, StakingServices, StakingSession, TransferServices};
use sendflow::simulated::SimulatedNetwork;
use sendflow::staking::{StakingError, StakingPreparedAction, StakingState, ValidatorInfo, Yield};
use sendflow::transaction::{
    AdditionalFieldType, AdditionalParams, AddressSource, Asset, AssetFamily, DispatchError,
};
use sendflow::validation::ValidationError;
use sendflow::PipelineConfig;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn address(family: AssetFamily, seed: &str) -> String {
    SimulatedNetwork::address_for(family, seed).unwrap()
}

/// Network plus a session with its balance already fetched.
async fn transfer_setup(
    asset: Asset,
    balance: u128,
) -> (Arc<SimulatedNetwork>, SendSession, String) {
    let owner = address(asset.family, "owner");
    let network = Arc::new(SimulatedNetwork::new(asset.clone(), &owner));
    network.set_balance(&owner, balance);
    let session = SendSession::new(
        asset,
        &owner,
        Some(Decimal::new(50_000, 0)),
        TransferServices::from_provider(network.clone()),
        PipelineConfig::default(),
    );
    session.refresh_balance().await.unwrap();
    (network, session, owner)
}

fn xrp() -> Asset {
    Asset {
        reserve: 10_000_000,
        additional_field: Some(AdditionalFieldType::DestinationTag),
        additional_field_required: true,
        ..Asset::coin("XRP", 6, AssetFamily::Account)
    }
}

async fn settle_background_tasks() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_btc_transfer_with_custom_rate() {
    let (network, session, owner) =
        transfer_setup(Asset::coin("BTC", 8, AssetFamily::Utxo), 10_000_000).await;
    let dest = address(AssetFamily::Utxo, "bob");

    // A scanned address moves straight to the amount step and quotes fees.
    session.set_destination(&dest, AddressSource::QrCode).await.unwrap();
    assert_eq!(session.flow().current_step(), Step::Amount);
    let options = session.fee_options_stream().current();
    assert_eq!(
        options.options(),
        vec![FeeOption::Slow, FeeOption::Market, FeeOption::Fast, FeeOption::Custom]
    );

    session.set_amount(Decimal::new(1, 3), false).unwrap();
    assert_eq!(
        session.flow().perform_next().await.unwrap(),
        Advance::Moved(Step::Fee)
    );

    session.select_fee(FeeOption::Custom).unwrap();
    let custom = session.set_custom_rate_per_byte(15).unwrap();
    assert_eq!(custom, Fee::utxo(15, 225));
    assert_eq!(session.custom_fee_advisory(), None);
    assert_eq!(
        session.flow().perform_next().await.unwrap(),
        Advance::Moved(Step::Summary)
    );

    let result = session.send().await.unwrap();
    assert_eq!(result.hash.len(), 64);
    assert_eq!(network.balance(&dest), 100_000);
    assert_eq!(network.balance(&owner), 10_000_000 - 100_000 - 15 * 225);

    settle_background_tasks().await;
    assert_eq!(network.recent_addresses()[0].value, dest);
    assert_eq!(session.flow().perform_finish(), Ok(Step::Finish));
}

#[tokio::test]
async fn test_xrp_transfer_requires_destination_tag() {
    let (network, session, owner) = transfer_setup(xrp(), 50_000_000).await;
    let dest = address(AssetFamily::Account, "carol");

    session.set_destination(&dest, AddressSource::Pasted).await.unwrap();
    assert!(session.flow().perform_next().await.is_err());

    assert!(matches!(
        session.set_additional_field("not-a-number"),
        Err(SendError::Validation(ValidationError::InvalidDestinationTag { .. }))
    ));
    session.set_additional_field("12345").unwrap();
    session.flow().perform_next().await.unwrap();

    // 45 XRP fits the balance but not the 10 XRP reserve.
    assert!(matches!(
        session.set_amount(Decimal::new(45, 0), false),
        Err(SendError::Validation(ValidationError::ReserveViolation { .. }))
    ));
    session.set_amount(Decimal::new(20, 0), false).unwrap();
    session.flow().perform_next().await.unwrap();

    // Account chains quote a single fixed fee and offer no custom fee.
    assert_eq!(session.fee_options_stream().current().options(), vec![FeeOption::Market]);
    session.flow().perform_next().await.unwrap();
    session.send().await.unwrap();

    let submitted = network.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0].draft.additional_field.params(),
        Some(&AdditionalParams::DestinationTag(12345))
    );
    assert_eq!(network.balance(&owner), 50_000_000 - 20_000_000 - 12);
}

#[tokio::test]
async fn test_token_transfer_with_low_custom_gas_needs_confirmation() {
    let token = Asset::token("USDT", 6, "0xdac17f958d2ee523a2206206994597c13d831ec7");
    let (network, session, owner) = transfer_setup(token, 500_000_000).await;
    let dest = address(AssetFamily::Evm, "dave");
    network.set_fees(vec![
        Fee::evm(21_000, 40, 1),
        Fee::evm(21_000, 50, 2),
        Fee::evm(21_000, 60, 3),
    ]);
    network.add_alias("dave.eth", &dest);

    let resolved = session
        .set_destination("Dave.eth", AddressSource::Typed)
        .await
        .unwrap();
    assert_eq!(resolved.value, dest);
    session.flow().perform_next().await.unwrap();
    session.set_amount(Decimal::new(125, 0), false).unwrap();
    session.flow().perform_next().await.unwrap();

    // Gas algebra: limit x max fee, and total / limit back again.
    session.select_fee(FeeOption::Custom).unwrap();
    assert_eq!(session.set_custom_max_fee_per_gas(50).unwrap().amount, 1_050_000);
    let edited = session.set_custom_total(2_100_000).unwrap();
    assert_eq!(
        edited.parameters,
        FeeParameters::Evm {
            gas_limit: 21_000,
            max_fee_per_gas: 100,
            priority_fee: 2,
        }
    );

    // Far below the slow tier: leaving the fee step needs confirmation.
    session.set_custom_max_fee_per_gas(10).unwrap();
    let pending = match session.flow().perform_next().await.unwrap() {
        Advance::Blocked(pending) => pending,
        other => panic!("expected confirmation, got {other:?}"),
    };
    assert_eq!(pending.advisory, FeeAdvisory::TooLow);
    assert_eq!(session.flow().resume(pending).await, Ok(Step::Summary));

    session.send().await.unwrap();
    assert_eq!(network.submitted()[0].draft.fee.amount, 210_000);
    // The fee is paid in ETH, so only the amount leaves the token balance.
    assert_eq!(network.balance(&owner), 500_000_000 - 125_000_000);
    assert_eq!(network.balance(&dest), 125_000_000);
}

#[tokio::test]
async fn test_cancelled_signing_is_silent_and_retryable() {
    let (network, session, _owner) =
        transfer_setup(Asset::coin("ETH", 18, AssetFamily::Evm), 10u128.pow(18)).await;
    let dest = address(AssetFamily::Evm, "erin");
    walk_eth_to_summary(&session, &dest).await;

    network.set_signer_cancels(true);
    match session.send().await {
        Err(SendError::Dispatch(e)) => {
            assert_eq!(e, DispatchError::UserCancelledSigning);
            assert!(e.is_silent());
        }
        other => panic!("expected cancelled signing, got {other:?}"),
    }
    assert!(!session.is_sending());
    assert_eq!(session.flow().current_step(), Step::Summary);

    network.set_signer_cancels(false);
    session.send().await.unwrap();
    assert_eq!(network.submitted().len(), 1);
}

#[tokio::test]
async fn test_submit_rejection_carries_code() {
    let (network, session, _owner) =
        transfer_setup(Asset::coin("ETH", 18, AssetFamily::Evm), 10u128.pow(18)).await;
    let dest = address(AssetFamily::Evm, "frank");
    walk_eth_to_summary(&session, &dest).await;

    network.fail_submit(Some(ProviderError::Rejected {
        code: 7,
        message: "nonce too low".into(),
    }));
    match session.send().await {
        Err(SendError::Dispatch(e)) => {
            assert!(!e.is_silent());
            assert!(e.code().is_some());
        }
        other => panic!("expected a send failure, got {other:?}"),
    }
}

async fn walk_eth_to_summary(session: &SendSession, dest: &str) {
    session.set_destination(dest, AddressSource::MyWallet).await.unwrap();
    session.set_amount(Decimal::new(1, 2), false).unwrap();
    session.flow().perform_next().await.unwrap();
    session.flow().perform_next().await.unwrap();
    assert_eq!(session.flow().current_step(), Step::Summary);
}

// ---------------------------------------------------------------------------
// Fee Relevance
// ---------------------------------------------------------------------------

async fn stale_eth_session() -> (Arc<SimulatedNetwork>, SendSession) {
    let (network, session, _owner) =
        transfer_setup(Asset::coin("ETH", 18, AssetFamily::Evm), 10u128.pow(18)).await;
    network.set_fees(vec![Fee::fixed(50), Fee::fixed(100), Fee::fixed(150)]);
    let dest = address(AssetFamily::Evm, "grace");
    walk_eth_to_summary(&session, &dest).await;
    assert_eq!(session.selected_fee(), Ok(Fee::fixed(100)));

    tokio::time::advance(Duration::from_secs(61)).await;
    (network, session)
}

#[tokio::test(start_paused = true)]
async fn test_stale_lower_fee_sends_with_selected_fee() {
    let (network, session) = stale_eth_session().await;
    network.set_fees(vec![Fee::fixed(40), Fee::fixed(90), Fee::fixed(140)]);

    session.send().await.unwrap();
    assert_eq!(network.fee_increase_prompts(), 0);
    assert_eq!(network.submitted()[0].draft.fee, Fee::fixed(100));
}

#[tokio::test(start_paused = true)]
async fn test_stale_higher_fee_sends_after_confirmation() {
    let (network, session) = stale_eth_session().await;
    network.set_fees(vec![Fee::fixed(100), Fee::fixed(150), Fee::fixed(200)]);
    network.set_confirms_fee_increase(true);

    // Confirmation releases the draft that was already built.
    session.send().await.unwrap();
    assert_eq!(network.fee_increase_prompts(), 1);
    assert_eq!(network.submitted()[0].draft.fee, Fee::fixed(100));
}

#[tokio::test(start_paused = true)]
async fn test_stale_requote_failure_blocks_dispatch() {
    let (network, session) = stale_eth_session().await;
    network.fail_fees(Some(ProviderError::Timeout { after_ms: 5_000 }));

    assert!(matches!(session.send().await, Err(SendError::Fee(_))));
    assert!(network.submitted().is_empty());
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

const TOKEN: &str = "0x00000000000000000000000000000000000000c0";
const SPENDER: &str = "0x00000000000000000000000000000000000000c1";
const VALIDATOR: &str = "0x00000000000000000000000000000000000000e1";

fn token_yield() -> Yield {
    Yield {
        apr: Decimal::new(38, 1),
        minimum_stake: 10u128.pow(18),
        unbonding_period_secs: 3 * 86_400,
        validators: vec![ValidatorInfo {
            address: VALIDATOR.into(),
            name: "Validator One".into(),
            apr: Decimal::new(38, 1),
        }],
        enabled: true,
        available: true,
        allowance_spender: Some(SPENDER.into()),
    }
}

#[tokio::test]
async fn test_token_stake_approves_then_stakes_and_stays_staked() {
    let owner = address(AssetFamily::Evm, "staker");
    let network = Arc::new(SimulatedNetwork::new(Asset::token("POL", 18, TOKEN), &owner));
    network.set_balance(&owner, 1_000 * 10u128.pow(18));
    network.set_yield(Some(token_yield()));
    let session = StakingSession::new(
        Asset::token("POL", 18, TOKEN),
        &owner,
        None,
        StakingServices::from_provider(network.clone()),
        &PipelineConfig::default(),
    );

    // Zero balances and an enabled yield: available to stake.
    let state = session.refresh().await.unwrap();
    assert!(matches!(state, StakingState::AvailableToStake { .. }));

    session.set_amount(Decimal::new(10, 0), false).unwrap();
    session.flow().perform_next().await.unwrap();
    session.select_validator(VALIDATOR).unwrap();
    session.flow().perform_next().await.unwrap();
    assert_eq!(session.flow().current_step(), Step::Summary);

    assert!(matches!(
        session.settled_action().await,
        Some(Ok(StakingPreparedAction::ReadyToApprove { .. }))
    ));
    assert_eq!(session.send_stake().await, Err(StakingError::ApprovalRequired));

    session.send_approve_transaction().await.unwrap();
    assert_eq!(network.allowance(&owner, SPENDER, TOKEN), u128::MAX);
    assert!(matches!(
        session.settled_action().await,
        Some(Ok(StakingPreparedAction::ReadyToStake { .. }))
    ));

    session.send_stake().await.unwrap();
    assert!(matches!(session.staking_state(), StakingState::Staked { .. }));
    assert_eq!(session.flow().perform_finish(), Ok(Step::Finish));

    // A failed refresh never drops the wallet out of `Staked`.
    network.fail_staking(Some(ProviderError::Network("rpc down".into())));
    assert!(session.refresh().await.is_err());
    assert!(matches!(session.staking_state(), StakingState::Staked { .. }));

    network.fail_staking(None);
    let state = session.refresh().await.unwrap();
    match state {
        StakingState::Staked { balances, .. } => {
            assert_eq!(balances.len(), 1);
            assert_eq!(balances[0].amount, 10 * 10u128.pow(18));
        }
        other => panic!("expected staked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disabled_staking_is_not_enabled() {
    let owner = address(AssetFamily::Evm, "staker");
    let network = Arc::new(SimulatedNetwork::new(
        Asset::coin("ETH", 18, AssetFamily::Evm),
        &owner,
    ));
    let session = StakingSession::new(
        Asset::coin("ETH", 18, AssetFamily::Evm),
        &owner,
        None,
        StakingServices::from_provider(network.clone()),
        &PipelineConfig::default(),
    );

    assert_eq!(session.refresh().await.unwrap(), StakingState::NotEnabled);
    assert_eq!(
        session.set_amount(Decimal::new(1, 0), false),
        Err(StakingError::NotAvailable)
    );
}
