//! Wallet client libraries for JoinMarket
//!
//! This crate provides the client-side building blocks for driving a
//! jmwalletd instance: typed wire structures for its REST API, value
//! types for time-locked fidelity bonds, and saga-style workflows that
//! coordinate several backend calls into one user-level operation.
//!
//! ## Modules
//!
//! - [`data_structures`]: UTXOs, lockdates, balances and the set helpers
//!   used by the freeze protocol
//! - [`api`]: the [`WalletApi`](api::WalletApi) trait and its HTTP
//!   implementation against the jmwalletd REST API
//! - [`saga`]: fidelity bond creation and move workflows, the freeze
//!   coordinator and the spend confirmation poller
//! - [`errors`]: the error taxonomy shared by all of the above
//!
//! ## Example
//!
//! ```no_run
//! use jm_wallet_libs::api::HttpWalletApi;
//! use jm_wallet_libs::saga::CreateBondSaga;
//!
//! # async fn run() -> Result<(), jm_wallet_libs::JmWalletError> {
//! let api = HttpWalletApi::new("https://localhost:28183", "funded.jmdat", "token")?;
//! let mut saga = CreateBondSaga::new(api);
//! saga.reload().await?;
//! saga.select_lockdate("2030-01".parse()?)?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod data_structures;
pub mod errors;
pub mod saga;

pub use errors::{ApiError, JmWalletError, JmWalletResult, LockdateError, SagaError};
