//! Configuration, key material and storage node pool for the NeoFS S3 gateway.
//!
//! This crate holds everything the gateway needs before it can serve a
//! request: environment-driven configuration ([`GateConfig`]), the identity
//! and auth keys ([`IdentityKey`], [`load_auth_key`]) and the pool of storage
//! node connections ([`Pool`], [`PeerPool`]).

pub mod config;
pub mod error;
pub mod keys;
pub mod pool;

pub use config::{GateConfig, PeerConfig};
pub use error::{GateError, GateResult};
pub use keys::{IdentityKey, OwnerId, generate_auth_key, load_auth_key};
pub use pool::{Connection, PeerPool, Pool, run_rebalance_worker};
