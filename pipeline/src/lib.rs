// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SendFlow — Transaction Preparation & Dispatch
//!
//! The part of a wallet between "I want to send this" and "it's on the
//! network": validate what the user typed, quote fees, build a draft that
//! matches the latest inputs exactly, make sure the fee is still current,
//! then sign and submit. Staking rides the same rails with an extra
//! allowance/approve phase in front.
//!
//! ## Architecture
//!
//! - **validation** — Address, amount and memo checks. Leaf of everything.
//! - **fee** — Tier quoting, custom fees per fee model, staleness guard.
//! - **transaction** — Drafts from live inputs, and their dispatch.
//! - **flow** — The step wizard that sequences a transfer or a stake.
//! - **staking** — Staking state and the approve/stake orchestrator.
//! - **session** — Façades wiring one transfer or one staking flow.
//! - **provider** — Traits for everything chain-specific we consume.
//! - **simulated** — An in-memory chain implementing those traits.
//! - **observable** — Single-writer values the UI subscribes to.
//! - **config** — Constants and the per-session `PipelineConfig`.
//!
//! ## Ground Rules
//!
//! 1. Amounts are `u128` smallest units. Decimals are for humans only.
//! 2. Only the latest computation may publish; superseded work is aborted.
//! 3. A draft exists only for inputs that passed validation.
//! 4. Failures are typed `Result`s. Dispatch never panics.

pub mod config;
pub mod fee;
pub mod flow;
pub mod observable;
pub mod provider;
pub mod session;
pub mod simulated;
pub mod staking;
pub mod transaction;
pub mod validation;

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::PipelineConfig;
pub use observable::{Observable, Subscription};
pub use session::{SendError, SendSession, StakingSession};
