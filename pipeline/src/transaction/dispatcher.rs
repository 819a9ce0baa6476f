//! Signing and submission of drafts.
//!
//! The dispatcher owns the `sending` flag: at most one send is in flight
//! per dispatcher, and the flag is cleared on every exit path. Provider
//! and signer failures are mapped into [`DispatchError`]; nothing here
//! panics on a failed send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::types::TransactionDraft;
use crate::config::{
    SEND_FAILURE_CODE_NETWORK, SEND_FAILURE_CODE_REJECTED, SEND_FAILURE_CODE_SIGNER,
    SEND_FAILURE_CODE_UNKNOWN,
};
use crate::observable::{Observable, Subscription};
use crate::provider::{NetworkProvider, ProviderError, RecentAddressStore, Signer, SignerError};

/// Underlying cause of a generic send failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailureCause {
    /// The signer failed.
    #[error(transparent)]
    Signer(SignerError),
    /// The network provider failed.
    #[error(transparent)]
    Provider(ProviderError),
}

/// Errors from [`TransactionDispatcher::send`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Another send is still in flight.
    #[error("a transaction is already being sent")]
    AlreadySending,

    /// The account would fall below its required reserve.
    #[error("insufficient reserve: {required} must remain on the account")]
    InsufficientReserve {
        /// Amount that must remain.
        required: u128,
    },

    /// The user cancelled signing. Not shown as an error.
    #[error("signing cancelled by user")]
    UserCancelledSigning,

    /// Any other failure, with a machine-readable code.
    #[error("send failed (code {code}): {message}")]
    GenericSendFailure {
        /// One of the `SEND_FAILURE_CODE_*` constants.
        code: u32,
        /// Human-readable description.
        message: String,
        /// Original error.
        #[source]
        source: SendFailureCause,
    },
}

impl DispatchError {
    /// `true` for errors the UI should swallow.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::UserCancelledSigning)
    }

    /// Machine-readable code of a generic failure.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::GenericSendFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<SignerError> for DispatchError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Cancelled => Self::UserCancelledSigning,
            SignerError::Failed(_) => Self::GenericSendFailure {
                code: SEND_FAILURE_CODE_SIGNER,
                message: e.to_string(),
                source: SendFailureCause::Signer(e),
            },
        }
    }
}

impl From<ProviderError> for DispatchError {
    fn from(e: ProviderError) -> Self {
        let code = match &e {
            ProviderError::InsufficientReserve { required } => {
                return Self::InsufficientReserve {
                    required: *required,
                }
            }
            ProviderError::Rejected { .. } => SEND_FAILURE_CODE_REJECTED,
            ProviderError::Network(_) | ProviderError::Timeout { .. } => SEND_FAILURE_CODE_NETWORK,
            ProviderError::Construction(_) | ProviderError::Unsupported(_) => {
                SEND_FAILURE_CODE_UNKNOWN
            }
        };
        Self::GenericSendFailure {
            code,
            message: e.to_string(),
            source: SendFailureCause::Provider(e),
        }
    }
}

/// A successfully submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Transaction hash.
    pub hash: String,
    /// Explorer link, if the provider knows one.
    pub explorer_url: Option<String>,
    /// When the provider accepted it.
    pub sent_at: DateTime<Utc>,
}

/// Signs and submits drafts.
pub struct TransactionDispatcher {
    symbol: String,
    provider: Arc<dyn NetworkProvider>,
    signer: Arc<dyn Signer>,
    recent: Option<Arc<dyn RecentAddressStore>>,
    sending: Observable<bool>,
}

/// Clears the `sending` flag when a send ends, however it ends.
struct SendingGuard<'a>(&'a Observable<bool>);

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl TransactionDispatcher {
    /// Creates a dispatcher for one asset.
    pub fn new(symbol: &str, provider: Arc<dyn NetworkProvider>, signer: Arc<dyn Signer>) -> Self {
        Self {
            symbol: symbol.to_string(),
            provider,
            signer,
            recent: None,
            sending: Observable::new(false),
        }
    }

    /// Remembers successful destinations in `store`.
    pub fn with_recent_addresses(mut self, store: Arc<dyn RecentAddressStore>) -> Self {
        self.recent = Some(store);
        self
    }

    /// `true` while a send is in flight.
    pub fn is_sending(&self) -> bool {
        self.sending.get()
    }

    /// Stream of the `sending` flag.
    pub fn subscribe_sending(&self) -> Subscription<bool> {
        self.sending.subscribe()
    }

    /// Signs and submits `draft`.
    pub async fn send(&self, draft: &TransactionDraft) -> Result<DispatchResult, DispatchError> {
        if !self.sending.set_if_changed(true) {
            return Err(DispatchError::AlreadySending);
        }
        let _guard = SendingGuard(&self.sending);

        let signed = self.signer.sign(draft).await.map_err(|e| {
            if e != SignerError::Cancelled {
                warn!(asset = %self.symbol, error = %e, "signing failed");
            }
            DispatchError::from(e)
        })?;

        let hash = self.provider.submit(&signed).await.map_err(|e| {
            warn!(asset = %self.symbol, error = %e, "submission failed");
            DispatchError::from(e)
        })?;

        info!(
            asset = %self.symbol,
            hash = %hash,
            amount = draft.amount,
            fee = draft.fee.amount,
            destination = %draft.destination,
            "transaction sent"
        );

        if let Some(store) = &self.recent {
            let store = Arc::clone(store);
            let symbol = self.symbol.clone();
            let destination = draft.destination.clone();
            tokio::spawn(async move {
                if let Err(e) = store.remember(&symbol, &destination).await {
                    warn!(asset = %symbol, error = %e, "failed to remember recent address");
                }
            });
        }

        Ok(DispatchResult {
            explorer_url: self.provider.explorer_url(&hash),
            hash,
            sent_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
