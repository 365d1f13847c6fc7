//! Shared primitives for the cross-chain bridge.
//!
//! Chain-A is EVM-compatible; Chain-B is not. This crate carries the
//! address/hash plumbing both the core engine and the chain adapters
//! need, without pulling in either chain's full client stack.

#![allow(dead_code)]

pub mod address;
pub mod hash;
pub mod sig;

pub use address::{ChainBAddress, EvmAddress};
pub use hash::{canonical_hash, keccak256};
