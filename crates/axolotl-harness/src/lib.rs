//! Deterministic simulation harness for the axolotl session engine.
//!
//! Runs many devices against one seeded environment, pushes their traffic
//! through a lossy, reordering [`SimNetwork`] and optionally wraps their
//! stores in a [`ChaoticStore`]. The same seed replays the same run, keys,
//! faults and all, so a failing property test can be stepped through.
//!
//! # Oracles
//!
//! Tests built on the harness check the delivery guarantees of the engine:
//!
//! - every envelope that is not dropped decrypts exactly once, whatever the
//!   order it arrives in
//! - a second copy of a decrypted envelope fails with `DuplicateMessage`
//! - a failed store commit leaves the device able to retry the operation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chaotic;
pub mod network;
pub mod party;
pub mod sim_env;

pub use chaotic::ChaoticStore;
pub use network::{DeliveryPolicy, NetworkStats, SimNetwork};
pub use party::{Channel, Envelope, Party, Received, establish};
pub use sim_env::SimEnv;
