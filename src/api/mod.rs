//! Backend API collaborator
//!
//! The sagas never talk HTTP directly; they drive the [`WalletApi`] trait.
//! [`HttpWalletApi`] is the production implementation against a jmwalletd
//! instance, and `saga::mocks::MockWalletApi` is the deterministic test
//! double.

pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::data_structures::{Lockdate, Utxo, UtxoId};
use crate::errors::ApiError;

pub use http::HttpWalletApi;
pub use types::{
    AddressResponse, DirectSendRequest, DirectSendResponse, FreezeRequest, TxInfo, TxInput,
    TxOutput, UtxosResponse, WalletDisplayInfo, WalletDisplayResponse, WalletInfo,
};

/// The jar fidelity bonds are created in. jmwalletd only derives
/// time-locked addresses for this account.
pub const FIDELITY_BOND_JAR: u32 = 0;

/// Operations the wallet client core drives on the backend
///
/// Every call is a single asynchronous network round trip requiring a
/// valid session; none are retried automatically (the spend-and-confirm
/// poller retries reads, never mutating calls).
#[async_trait]
pub trait WalletApi: Send + Sync {
    /// Toggle the frozen flag of a single UTXO
    async fn freeze_utxo(&self, id: &UtxoId, freeze: bool) -> Result<(), ApiError>;

    /// Derive a fresh receive address in the given jar
    async fn new_address(&self, jar: u32) -> Result<String, ApiError>;

    /// Derive a fresh time-locked address for the given lockdate
    async fn new_timelocked_address(
        &self,
        jar: u32,
        lockdate: &Lockdate,
    ) -> Result<String, ApiError>;

    /// Spend from a jar to a destination address. An amount of zero sweeps
    /// the entire jar.
    async fn direct_send(
        &self,
        jar: u32,
        destination: &str,
        amount_sats: u64,
    ) -> Result<TxInfo, ApiError>;

    /// Fetch a fresh UTXO snapshot
    async fn reload_utxos(&self) -> Result<Vec<Utxo>, ApiError>;

    /// Fetch a combined wallet snapshot (UTXOs, balances, address statuses)
    async fn reload_wallet_info(&self) -> Result<WalletInfo, ApiError>;
}
