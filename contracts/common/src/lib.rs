//! YieldVault Common Library
//!
//! Shared types, constants and utilities for the YieldVault settlement
//! kernel. Every other crate in the workspace builds on this one.
//!
//! ## Settlement model
//!
//! Users deposit an asset group into a smart vault. Deposits and
//! redemptions are batched per vault (a *flush*), settled per strategy by a
//! keeper (*do-hard-work*, DHW) and finally converted into vault shares or
//! withdrawable assets (*sync*). Each stage is a separate call and every
//! call is all-or-nothing.
//!
//! ## Modules
//!
//! - **Constants / Math**: fixed-point scales and 256-bit `mul_div`
//! - **Ledgers**: asset custody, share ledgers and receipt tokens
//! - **Vault**: smart vault state shared by the deposit and withdrawal flows
//! - **Collaborators**: price feed, guard engine, allocation provider and
//!   access control traits with in-memory implementations
//! - **Events**: borsh-encoded audit trail with SHA-256 digests
//! - **Config**: kernel configuration with CBOR persistence
//!
//! This crate is `no_std` compatible (with `alloc`) when built without the
//! default `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::collections::{BTreeMap, BTreeSet};
#[cfg(not(feature = "std"))]
pub use alloc::vec::Vec;
#[cfg(feature = "std")]
pub use std::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "std")]
pub use std::vec::Vec;

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod validation;
pub mod events;
pub mod config;
pub mod asset_group;
pub mod asset_ledger;
pub mod shares;
pub mod receipt;
pub mod vault;
pub mod oracle;
pub mod guard;
pub mod access_control;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use config::*;
pub use asset_group::*;
pub use asset_ledger::*;
pub use shares::*;
pub use receipt::*;
pub use vault::*;
pub use oracle::*;
pub use guard::*;
pub use access_control::*;
