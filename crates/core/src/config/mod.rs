//! Configuration for the leveraged swap manager.
//!
//! This module provides:
//! - Engine configuration (fee and slippage parameters, profiles)
//! - Manager settings (identity, native token, fee recipient)
//! - Deployment configuration (RPC endpoint and protocol contracts)

mod deployment;
mod manager;
mod settings;

pub use deployment::{DeploymentConfig, DeploymentContracts};
pub use manager::{FeeConfig, LimitConfig, ManagerConfig};
pub use settings::ManagerSettings;
