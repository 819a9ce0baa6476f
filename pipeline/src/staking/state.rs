//! Fetch-driven staking state.

use std::sync::Arc;
use tracing::{debug, warn};

use super::types::StakingState;
use super::StakingError;
use crate::observable::{Observable, Subscription};
use crate::provider::StakingProvider;

/// Publishes the wallet's [`StakingState`].
///
/// The state only changes when [`StakingStateManager::refresh`] completes.
/// A failed refresh leaves the previous state in place, so a staked wallet
/// never drops back to `Loading` or `AvailableToStake` on a network blip.
pub struct StakingStateManager {
    owner: String,
    provider: Arc<dyn StakingProvider>,
    state: Observable<StakingState>,
}

impl StakingStateManager {
    /// Creates a manager in the `Loading` state.
    pub fn new(owner: &str, provider: Arc<dyn StakingProvider>) -> Self {
        Self {
            owner: owner.to_string(),
            provider,
            state: Observable::new(StakingState::Loading),
        }
    }

    /// Fetches yield and balances concurrently and replaces the state.
    pub async fn refresh(&self) -> Result<StakingState, StakingError> {
        let fetched = tokio::try_join!(
            self.provider.get_yield(),
            self.provider.get_staking_balances(&self.owner),
        );
        let (yield_info, balances) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(owner = %self.owner, error = %e, "staking refresh failed");
                return Err(e.into());
            }
        };

        let state = StakingState::from_fetch(yield_info, balances);
        debug!(owner = %self.owner, state = ?state, "staking state refreshed");
        self.state.set(state.clone());
        Ok(state)
    }

    /// Current state.
    pub fn state(&self) -> StakingState {
        self.state.get()
    }

    /// Stream of states.
    pub fn subscribe(&self) -> Subscription<StakingState> {
        self.state.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::simulated::SimulatedNetwork;
    use crate::staking::{StakingBalance, StakingBalanceKind, ValidatorInfo, Yield};
    use crate::transaction::{Asset, AssetFamily};
    use rust_decimal::Decimal;

    const OWNER: &str = "0x00000000000000000000000000000000000000aa";

    fn network() -> Arc<SimulatedNetwork> {
        let network = Arc::new(SimulatedNetwork::new(
            Asset::coin("ETH", 18, AssetFamily::Evm),
            OWNER,
        ));
        network.set_yield(Some(Yield {
            apr: Decimal::new(4, 0),
            minimum_stake: 1,
            unbonding_period_secs: 0,
            validators: vec![ValidatorInfo {
                address: "0x00000000000000000000000000000000000000e1".into(),
                name: "one".into(),
                apr: Decimal::new(4, 0),
            }],
            enabled: true,
            available: true,
            allowance_spender: None,
        }));
        network
    }

    #[tokio::test]
    async fn starts_loading_and_refreshes() {
        let network = network();
        let manager = StakingStateManager::new(OWNER, network.clone());
        assert_eq!(manager.state(), StakingState::Loading);

        let state = manager.refresh().await.unwrap();
        assert!(matches!(state, StakingState::AvailableToStake { .. }));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_staked_state() {
        let network = network();
        network.set_positions(
            OWNER,
            vec![StakingBalance {
                validator: "0x00000000000000000000000000000000000000e1".into(),
                amount: 10,
                kind: StakingBalanceKind::Staked,
            }],
        );
        let manager = StakingStateManager::new(OWNER, network.clone());
        manager.refresh().await.unwrap();

        network.fail_staking(Some(ProviderError::Network("down".into())));
        assert!(manager.refresh().await.is_err());
        assert!(matches!(manager.state(), StakingState::Staked { .. }));
    }
}
