//! # Simulated Network
//!
//! An in-memory chain implementing every capability trait in
//! [`crate::provider`]. It keeps a balance ledger, allowances and staking
//! positions, answers fee quotes from a script, and can inject latency and
//! failures at each call. Integration tests and the CLI run against it.
//!
//! Address syntax follows the asset family:
//!
//! | Family | Accepted form |
//! |--------|---------------|
//! | UTXO | segwit bech32 with `bc` or `tb` prefix |
//! | EVM | `0x` + 40 hex characters |
//! | Account | `r` + 24..=34 alphanumeric characters |

use async_trait::async_trait;
use bech32::Hrp;
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::{ERC20_APPROVE_SELECTOR, EVM_TRANSFER_GAS_LIMIT};
use crate::fee::Fee;
use crate::provider::{
    AddressValidationService, AliasResolver, DraftRequest, FeeIncreaseConfirmation,
    NetworkProvider, ProviderError, RecentAddressStore, Signer, SignerError, StakingProvider,
    TransactionBuilder,
};
use crate::staking::{decode_approve, StakingBalance, StakingBalanceKind, ValidatorInfo, Yield};
use crate::transaction::{
    Address, AddressSource, Asset, AssetFamily, ContractCall, SignedTransaction, TransactionDraft,
};

/// Marker the simulated chain recognizes as a stake-entry call.
pub const STAKE_CALL_MARKER: [u8; 4] = *b"stak";

/// Rejection code for overdrafts.
const REJECT_INSUFFICIENT_FUNDS: u32 = 2;

/// Rejection code for malformed contract calls.
const REJECT_MALFORMED_CALL: u32 = 3;

/// Gas a simulated stake consumes.
const STAKE_GAS_LIMIT: u64 = 150_000;

/// Default UTXO transaction size in bytes (one input, two outputs).
const DEFAULT_TRANSACTION_SIZE: u64 = 225;

/// Mutable knobs, read at the start of each call.
#[derive(Debug)]
struct Script {
    fees: Vec<Fee>,
    queued_fees: VecDeque<Vec<Fee>>,
    fee_failure: Option<ProviderError>,
    fee_latency: Duration,
    build_failure: Option<ProviderError>,
    submit_failure: Option<ProviderError>,
    submit_latency: Duration,
    staking_failure: Option<ProviderError>,
    signer_cancels: bool,
    signer_failure: Option<String>,
    recent_failure: bool,
    transaction_size: u64,
    yield_info: Option<Yield>,
    stake_fee: Fee,
    confirms_fee_increase: bool,
}

impl Script {
    fn for_family(family: AssetFamily) -> Self {
        const GWEI: u128 = 1_000_000_000;
        let (fees, stake_fee) = match family {
            AssetFamily::Utxo => (
                vec![
                    Fee::utxo(5, DEFAULT_TRANSACTION_SIZE),
                    Fee::utxo(10, DEFAULT_TRANSACTION_SIZE),
                    Fee::utxo(20, DEFAULT_TRANSACTION_SIZE),
                ],
                Fee::utxo(10, DEFAULT_TRANSACTION_SIZE),
            ),
            AssetFamily::Evm => (
                vec![
                    Fee::evm(EVM_TRANSFER_GAS_LIMIT, 30 * GWEI, GWEI),
                    Fee::evm(EVM_TRANSFER_GAS_LIMIT, 40 * GWEI, 2 * GWEI),
                    Fee::evm(EVM_TRANSFER_GAS_LIMIT, 60 * GWEI, 3 * GWEI),
                ],
                Fee::evm(STAKE_GAS_LIMIT, 40 * GWEI, 2 * GWEI),
            ),
            AssetFamily::Account => (vec![Fee::fixed(12)], Fee::fixed(12)),
        };
        Self {
            fees,
            queued_fees: VecDeque::new(),
            fee_failure: None,
            fee_latency: Duration::ZERO,
            build_failure: None,
            submit_failure: None,
            submit_latency: Duration::ZERO,
            staking_failure: None,
            signer_cancels: false,
            signer_failure: None,
            recent_failure: false,
            transaction_size: DEFAULT_TRANSACTION_SIZE,
            yield_info: None,
            stake_fee,
            confirms_fee_increase: true,
        }
    }
}

/// In-memory chain for one asset and one wallet.
pub struct SimulatedNetwork {
    asset: Asset,
    owner: String,
    balances: DashMap<String, u128>,
    allowances: DashMap<(String, String, String), u128>,
    positions: DashMap<String, Vec<StakingBalance>>,
    aliases: DashMap<String, String>,
    build_latency: DashMap<u128, Duration>,
    script: Mutex<Script>,
    submitted: Mutex<Vec<SignedTransaction>>,
    recent: Mutex<VecDeque<Address>>,
    recent_limit: usize,
    fee_requests: AtomicUsize,
    fee_prompts: AtomicUsize,
    nonce: AtomicU64,
}

impl SimulatedNetwork {
    /// Creates a network for `asset` where `owner` is the wallet address.
    pub fn new(asset: Asset, owner: &str) -> Self {
        let script = Script::for_family(asset.family);
        Self {
            asset,
            owner: owner.to_string(),
            balances: DashMap::new(),
            allowances: DashMap::new(),
            positions: DashMap::new(),
            aliases: DashMap::new(),
            build_latency: DashMap::new(),
            script: Mutex::new(script),
            submitted: Mutex::new(Vec::new()),
            recent: Mutex::new(VecDeque::new()),
            recent_limit: 10,
            fee_requests: AtomicUsize::new(0),
            fee_prompts: AtomicUsize::new(0),
            nonce: AtomicU64::new(0),
        }
    }

    /// Caps the recent-address list.
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// A deterministic, syntactically valid address for `family`.
    pub fn address_for(family: AssetFamily, seed: &str) -> Result<String, ProviderError> {
        let digest = Sha256::digest(seed.as_bytes());
        match family {
            AssetFamily::Utxo => {
                let hrp = Hrp::parse("bc").map_err(|e| ProviderError::Construction(e.to_string()))?;
                bech32::segwit::encode_v0(hrp, &digest[..20])
                    .map_err(|e| ProviderError::Construction(e.to_string()))
            }
            AssetFamily::Evm => Ok(format!("0x{}", hex::encode(&digest[..20]))),
            AssetFamily::Account => Ok(format!("r{}", &hex::encode(digest)[..33])),
        }
    }

    // -----------------------------------------------------------------------
    // Ledger
    // -----------------------------------------------------------------------

    /// The wallet address.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The simulated asset.
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&self, address: &str, amount: u128) {
        self.balances.insert(address.to_string(), amount);
    }

    /// Balance of `address`, zero if unknown.
    pub fn balance(&self, address: &str) -> u128 {
        self.balances.get(address).map(|b| *b).unwrap_or(0)
    }

    /// Sets an ERC-20 allowance.
    pub fn set_allowance(&self, owner: &str, spender: &str, contract: &str, amount: u128) {
        self.allowances.insert(allowance_key(owner, spender, contract), amount);
    }

    /// Current ERC-20 allowance.
    pub fn allowance(&self, owner: &str, spender: &str, contract: &str) -> u128 {
        self.allowances
            .get(&allowance_key(owner, spender, contract))
            .map(|a| *a)
            .unwrap_or(0)
    }

    /// Replaces the staking positions of `owner`.
    pub fn set_positions(&self, owner: &str, positions: Vec<StakingBalance>) {
        self.positions.insert(owner.to_string(), positions);
    }

    /// Staking positions of `owner`.
    pub fn positions(&self, owner: &str) -> Vec<StakingBalance> {
        self.positions
            .get(owner)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Registers a name-service alias.
    pub fn add_alias(&self, alias: &str, address: &str) {
        self.aliases
            .insert(alias.to_ascii_lowercase(), address.to_string());
    }

    /// Every transaction accepted so far.
    pub fn submitted(&self) -> Vec<SignedTransaction> {
        self.submitted.lock().clone()
    }

    /// Remembered destinations, most recent first.
    pub fn recent_addresses(&self) -> Vec<Address> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Number of fee quotes served.
    pub fn fee_requests(&self) -> usize {
        self.fee_requests.load(Ordering::SeqCst)
    }

    /// Number of fee-increase confirmations asked.
    pub fn fee_increase_prompts(&self) -> usize {
        self.fee_prompts.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Script
    // -----------------------------------------------------------------------

    /// Quotes returned by every fee request.
    pub fn set_fees(&self, fees: Vec<Fee>) {
        self.script.lock().fees = fees;
    }

    /// Quotes returned by the next fee request only, before falling back
    /// to [`Self::set_fees`].
    pub fn queue_fees(&self, fees: Vec<Fee>) {
        self.script.lock().queued_fees.push_back(fees);
    }

    /// Makes fee requests fail.
    pub fn fail_fees(&self, error: Option<ProviderError>) {
        self.script.lock().fee_failure = error;
    }

    /// Delay before each fee quote.
    pub fn set_fee_latency(&self, latency: Duration) {
        self.script.lock().fee_latency = latency;
    }

    /// Delay before building a draft for `amount`.
    pub fn set_build_latency(&self, amount: u128, latency: Duration) {
        self.build_latency.insert(amount, latency);
    }

    /// Makes draft building fail.
    pub fn fail_build(&self, error: Option<ProviderError>) {
        self.script.lock().build_failure = error;
    }

    /// Makes submission fail.
    pub fn fail_submit(&self, error: Option<ProviderError>) {
        self.script.lock().submit_failure = error;
    }

    /// Delay before each submission.
    pub fn set_submit_latency(&self, latency: Duration) {
        self.script.lock().submit_latency = latency;
    }

    /// Makes staking queries fail.
    pub fn fail_staking(&self, error: Option<ProviderError>) {
        self.script.lock().staking_failure = error;
    }

    /// Makes the signer report user cancellation.
    pub fn set_signer_cancels(&self, cancels: bool) {
        self.script.lock().signer_cancels = cancels;
    }

    /// Makes the signer fail with `message`.
    pub fn fail_signer(&self, message: Option<&str>) {
        self.script.lock().signer_failure = message.map(str::to_string);
    }

    /// Makes the recent-address store fail.
    pub fn fail_recent_store(&self, fails: bool) {
        self.script.lock().recent_failure = fails;
    }

    /// UTXO size estimate in bytes.
    pub fn set_transaction_size(&self, bytes: u64) {
        self.script.lock().transaction_size = bytes;
    }

    /// Staking program, `None` for no staking.
    pub fn set_yield(&self, yield_info: Option<Yield>) {
        self.script.lock().yield_info = yield_info;
    }

    /// Fee quoted for stakes.
    pub fn set_stake_fee(&self, fee: Fee) {
        self.script.lock().stake_fee = fee;
    }

    /// Answer given to fee-increase confirmations.
    pub fn set_confirms_fee_increase(&self, confirms: bool) {
        self.script.lock().confirms_fee_increase = confirms;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn staking_failure(&self) -> Result<(), ProviderError> {
        match self.script.lock().staking_failure.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn debit(&self, address: &str, amount: u128) -> Result<(), ProviderError> {
        let mut balance = self.balances.entry(address.to_string()).or_insert(0);
        if *balance < amount {
            return Err(ProviderError::Rejected {
                code: REJECT_INSUFFICIENT_FUNDS,
                message: format!("balance {} below {}", *balance, amount),
            });
        }
        let remaining = *balance - amount;
        if self.asset.reserve > 0 && remaining < self.asset.reserve {
            return Err(ProviderError::InsufficientReserve {
                required: self.asset.reserve,
            });
        }
        *balance = remaining;
        Ok(())
    }

    fn credit(&self, address: &str, amount: u128) {
        *self.balances.entry(address.to_string()).or_insert(0) += amount;
    }

    fn apply(&self, draft: &TransactionDraft) -> Result<(), ProviderError> {
        let fee = if self.asset.fee_in_same_asset() {
            draft.fee.amount
        } else {
            0
        };

        match &draft.contract_call {
            Some(ContractCall {
                contract,
                call_data,
            }) if call_data.starts_with(&ERC20_APPROVE_SELECTOR) => {
                let (spender, amount) =
                    decode_approve(call_data).ok_or_else(|| ProviderError::Rejected {
                        code: REJECT_MALFORMED_CALL,
                        message: "malformed approve call".to_string(),
                    })?;
                self.allowances
                    .insert(allowance_key(&self.owner, &spender, contract), amount);
            }
            Some(ContractCall { call_data, .. }) if call_data.starts_with(&STAKE_CALL_MARKER) => {
                self.debit(&self.owner, draft.amount.saturating_add(fee))?;
                self.positions
                    .entry(self.owner.clone())
                    .or_default()
                    .push(StakingBalance {
                        validator: draft.destination.value.clone(),
                        amount: draft.amount,
                        kind: StakingBalanceKind::Staked,
                    });
            }
            Some(_) => {
                return Err(ProviderError::Rejected {
                    code: REJECT_MALFORMED_CALL,
                    message: "unknown contract call".to_string(),
                })
            }
            None => {
                self.debit(&self.owner, draft.amount.saturating_add(fee))?;
                self.credit(&draft.destination.value, draft.amount);
            }
        }
        Ok(())
    }
}

fn allowance_key(owner: &str, spender: &str, contract: &str) -> (String, String, String) {
    (
        owner.to_ascii_lowercase(),
        spender.to_ascii_lowercase(),
        contract.to_ascii_lowercase(),
    )
}

// ---------------------------------------------------------------------------
// Capability Implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl NetworkProvider for SimulatedNetwork {
    async fn get_fee(&self, _amount: u128, _destination: &str) -> Result<Vec<Fee>, ProviderError> {
        self.fee_requests.fetch_add(1, Ordering::SeqCst);
        let (latency, reply) = {
            let mut script = self.script.lock();
            let reply = match &script.fee_failure {
                Some(e) => Err(e.clone()),
                None => Ok(script
                    .queued_fees
                    .pop_front()
                    .unwrap_or_else(|| script.fees.clone())),
            };
            (script.fee_latency, reply)
        };
        tokio::time::sleep(latency).await;
        reply
    }

    async fn get_allowance(
        &self,
        owner: &str,
        spender: &str,
        contract: &str,
    ) -> Result<u128, ProviderError> {
        Ok(self.allowance(owner, spender, contract))
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<String, ProviderError> {
        let (latency, failure) = {
            let script = self.script.lock();
            (script.submit_latency, script.submit_failure.clone())
        };
        tokio::time::sleep(latency).await;
        if let Some(e) = failure {
            return Err(e);
        }

        self.apply(&transaction.draft)?;
        let hash = hex::encode(Sha256::digest(&transaction.payload));
        self.submitted.lock().push(transaction.clone());
        debug!(hash = %hash, "simulated transaction accepted");
        Ok(hash)
    }

    async fn get_balance(&self, address: &str) -> Result<u128, ProviderError> {
        Ok(self.balance(address))
    }

    async fn estimate_transaction_size(
        &self,
        _amount: u128,
        _destination: &str,
    ) -> Result<u64, ProviderError> {
        Ok(self.script.lock().transaction_size)
    }

    fn explorer_url(&self, hash: &str) -> Option<String> {
        Some(format!(
            "https://explorer.invalid/{}/tx/{hash}",
            self.asset.symbol.to_ascii_lowercase()
        ))
    }
}

#[async_trait]
impl TransactionBuilder for SimulatedNetwork {
    async fn build(&self, request: DraftRequest) -> Result<TransactionDraft, ProviderError> {
        let latency = self
            .build_latency
            .get(&request.amount)
            .map(|d| *d)
            .unwrap_or_default();
        tokio::time::sleep(latency).await;

        if let Some(e) = self.script.lock().build_failure.clone() {
            return Err(e);
        }

        Ok(TransactionDraft {
            destination: request.destination,
            amount: request.amount,
            fee: request.fee,
            additional_field: request.additional_field,
            includes_fee: request.includes_fee,
            contract_call: None,
            revision: request.revision,
        })
    }
}

#[async_trait]
impl Signer for SimulatedNetwork {
    async fn sign(&self, draft: &TransactionDraft) -> Result<SignedTransaction, SignerError> {
        {
            let script = self.script.lock();
            if script.signer_cancels {
                return Err(SignerError::Cancelled);
            }
            if let Some(message) = &script.signer_failure {
                return Err(SignerError::Failed(message.clone()));
            }
        }

        let mut payload =
            serde_json::to_vec(draft).map_err(|e| SignerError::Failed(e.to_string()))?;
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        payload.extend_from_slice(&nonce.to_be_bytes());

        Ok(SignedTransaction {
            draft: draft.clone(),
            payload,
        })
    }
}

impl AddressValidationService for SimulatedNetwork {
    fn is_valid(&self, address: &str) -> bool {
        match self.asset.family {
            AssetFamily::Utxo => bech32::segwit::decode(address)
                .map(|(hrp, _, _)| {
                    matches!(hrp.to_string().to_ascii_lowercase().as_str(), "bc" | "tb")
                })
                .unwrap_or(false),
            AssetFamily::Evm => {
                address.len() == 42
                    && address.starts_with("0x")
                    && address[2..].chars().all(|c| c.is_ascii_hexdigit())
            }
            AssetFamily::Account => {
                address.starts_with('r')
                    && (25..=35).contains(&address.len())
                    && address.chars().all(|c| c.is_ascii_alphanumeric())
            }
        }
    }
}

#[async_trait]
impl AliasResolver for SimulatedNetwork {
    async fn resolve(&self, alias: &str) -> Result<Option<String>, ProviderError> {
        Ok(self
            .aliases
            .get(&alias.to_ascii_lowercase())
            .map(|a| a.clone()))
    }
}

#[async_trait]
impl RecentAddressStore for SimulatedNetwork {
    async fn remember(&self, _symbol: &str, address: &Address) -> Result<(), ProviderError> {
        if self.script.lock().recent_failure {
            return Err(ProviderError::Network("recent address store unavailable".to_string()));
        }
        let mut recent = self.recent.lock();
        recent.retain(|known| known.value != address.value);
        recent.push_front(Address::new(&address.value, AddressSource::RecentAddress));
        recent.truncate(self.recent_limit);
        Ok(())
    }
}

#[async_trait]
impl FeeIncreaseConfirmation for SimulatedNetwork {
    async fn confirm_fee_increase(&self, _previous: Fee, _current: Fee) -> bool {
        self.fee_prompts.fetch_add(1, Ordering::SeqCst);
        self.script.lock().confirms_fee_increase
    }
}

#[async_trait]
impl StakingProvider for SimulatedNetwork {
    async fn get_yield(&self) -> Result<Option<Yield>, ProviderError> {
        self.staking_failure()?;
        Ok(self.script.lock().yield_info.clone())
    }

    async fn get_staking_balances(&self, owner: &str) -> Result<Vec<StakingBalance>, ProviderError> {
        self.staking_failure()?;
        Ok(self.positions(owner))
    }

    async fn estimate_stake_fee(
        &self,
        _amount: u128,
        _validator: &ValidatorInfo,
    ) -> Result<Fee, ProviderError> {
        self.staking_failure()?;
        Ok(self.script.lock().stake_fee)
    }

    async fn build_stake_transaction(
        &self,
        amount: u128,
        validator: &ValidatorInfo,
        fee: Fee,
    ) -> Result<TransactionDraft, ProviderError> {
        self.staking_failure()?;
        let contract = self
            .script
            .lock()
            .yield_info
            .as_ref()
            .and_then(|y| y.allowance_spender.clone())
            .unwrap_or_else(|| validator.address.clone());

        Ok(TransactionDraft {
            destination: Address::new(&validator.address, AddressSource::MyWallet),
            amount,
            fee,
            additional_field: crate::transaction::AdditionalFieldState::NotSupported,
            includes_fee: false,
            contract_call: Some(ContractCall {
                contract,
                call_data: STAKE_CALL_MARKER.to_vec(),
            }),
            revision: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
