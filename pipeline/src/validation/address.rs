//! Destination address validation.
//!
//! The checks, in order:
//!
//! 1. **Normalization**: surrounding whitespace is stripped.
//! 2. **Syntax**: the chain's [`AddressValidationService`] must accept it.
//! 3. **Alias**: input that fails syntax but looks like a name
//!    (`vitalik.eth`) is resolved through the [`AliasResolver`], and the
//!    resolved address must pass syntax.
//! 4. **Self-send**: the wallet's own addresses are rejected unless the
//!    asset supports compound addresses.

use std::sync::Arc;

use tracing::debug;

use super::ValidationError;
use crate::provider::{AddressValidationService, AliasResolver};
use crate::transaction::{Address, AddressSource, Asset, AssetFamily};

/// Validates destinations for one asset and one wallet.
pub struct AddressValidator {
    asset: Asset,
    own_addresses: Vec<String>,
    service: Arc<dyn AddressValidationService>,
    resolver: Option<Arc<dyn AliasResolver>>,
}

impl AddressValidator {
    /// Creates a validator. `own_addresses` are the wallet's addresses on
    /// this chain.
    pub fn new(
        asset: Asset,
        own_addresses: Vec<String>,
        service: Arc<dyn AddressValidationService>,
    ) -> Self {
        Self {
            asset,
            own_addresses,
            service,
            resolver: None,
        }
    }

    /// Enables name-service resolution.
    pub fn with_resolver(mut self, resolver: Arc<dyn AliasResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Validates `raw` and returns the normalized [`Address`].
    pub async fn validate_destination(
        &self,
        raw: &str,
        source: AddressSource,
    ) -> Result<Address, ValidationError> {
        let input = raw.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyAddress);
        }

        let resolved = if self.service.is_valid(input) {
            input.to_string()
        } else {
            self.resolve_alias(input).await?
        };

        if !self.asset.supports_compound_address && self.is_own_address(&resolved) {
            return Err(ValidationError::SameAsWallet { address: resolved });
        }

        Ok(Address::new(&resolved, source))
    }

    async fn resolve_alias(&self, input: &str) -> Result<String, ValidationError> {
        let resolver = match &self.resolver {
            Some(resolver) if looks_like_alias(input) => resolver,
            _ => {
                return Err(ValidationError::InvalidAddress {
                    address: input.to_string(),
                })
            }
        };

        let resolved = resolver
            .resolve(input)
            .await
            .map_err(ValidationError::AliasResolution)?
            .ok_or_else(|| ValidationError::AliasNotFound {
                alias: input.to_string(),
            })?;

        if !self.service.is_valid(&resolved) {
            return Err(ValidationError::InvalidAddress { address: resolved });
        }

        debug!(alias = input, address = %resolved, "alias resolved");
        Ok(resolved)
    }

    fn is_own_address(&self, address: &str) -> bool {
        // EVM addresses are hex and only differ in checksum casing.
        let case_insensitive = self.asset.family == AssetFamily::Evm;
        self.own_addresses.iter().any(|own| {
            if case_insensitive {
                own.eq_ignore_ascii_case(address)
            } else {
                own == address
            }
        })
    }
}

/// A dotted name without whitespace, e.g. `alice.eth`.
fn looks_like_alias(input: &str) -> bool {
    input.contains('.')
        && !input.starts_with('.')
        && !input.ends_with('.')
        && !input.chars().any(char::is_whitespace)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
