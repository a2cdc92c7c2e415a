//! Request and response types for the jmwalletd REST API
//!
//! Field names follow the wallet-rpc wire format, including the quirky
//! `utxo-string` freeze field. Responses are kept close to the wire and
//! flattened into crate types at the client boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data_structures::{Timestamp, Utxo, UtxoId, WalletBalanceSummary};

/// Address status reported by the wallet display endpoint for a
/// coinjoin-out output. Spending anything else into a fidelity bond is
/// flagged as unsafe by the creation saga.
pub const ADDRESS_STATUS_CJ_OUT: &str = "cj-out";

/// Body of a freeze/unfreeze request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeRequest {
    #[serde(rename = "utxo-string")]
    pub utxo: UtxoId,
    pub freeze: bool,
}

/// Body of a direct-send request. `amount_sats == 0` sweeps the jar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectSendRequest {
    pub mixdepth: u32,
    pub destination: String,
    pub amount_sats: u64,
}

/// Response envelope of the address derivation endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: String,
}

/// Response envelope of the utxo listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxosResponse {
    pub utxos: Vec<Utxo>,
}

/// Response envelope of the direct-send endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectSendResponse {
    pub txinfo: TxInfo,
}

/// An input of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: UtxoId,
    #[serde(default, rename = "scriptSig")]
    pub script_sig: String,
    #[serde(default, rename = "nSequence")]
    pub n_sequence: u32,
    #[serde(default)]
    pub witness: String,
}

/// An output of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value_sats: u64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    pub address: String,
}

/// Transaction info returned by a sweep/direct-send call
///
/// The `inputs` outpoints are what the spend-and-confirm poller watches
/// until the backend wallet no longer lists them as live UTXOs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub txid: String,
    pub hex: String,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(default, rename = "nLocktime")]
    pub n_locktime: u32,
    #[serde(default, rename = "nVersion")]
    pub n_version: u32,
}

impl TxInfo {
    /// The outpoints this transaction consumed
    pub fn input_ids(&self) -> Vec<UtxoId> {
        self.inputs.iter().map(|it| it.outpoint.clone()).collect()
    }
}

/// Wallet display response: nested account/branch/entry structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletDisplayResponse {
    pub walletinfo: WalletDisplayInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletDisplayInfo {
    pub wallet_name: String,
    pub total_balance: String,
    #[serde(default)]
    pub available_balance: Option<String>,
    pub accounts: Vec<DisplayAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayAccount {
    pub account: String,
    pub account_balance: String,
    pub branches: Vec<DisplayBranch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayBranch {
    pub branch: String,
    pub balance: String,
    pub entries: Vec<DisplayBranchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayBranchEntry {
    pub hd_path: String,
    pub address: String,
    pub amount: String,
    pub status: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub extradata: String,
}

/// Combined wallet snapshot: live UTXOs, derived balances and the address
/// status table used by the creation saga's safety check
#[derive(Debug, Clone, Default)]
pub struct WalletInfo {
    pub utxos: Vec<Utxo>,
    pub balance: WalletBalanceSummary,
    /// Address -> status (e.g. `new`, `used`, `cj-out`, `deposit`)
    pub address_statuses: HashMap<String, String>,
}

impl WalletInfo {
    /// Build the combined snapshot from its wire parts
    pub fn new(
        utxos: Vec<Utxo>,
        display: Option<&WalletDisplayResponse>,
        now_ms: Timestamp,
    ) -> Self {
        let balance = WalletBalanceSummary::from_utxos(&utxos, now_ms);
        let address_statuses = display
            .map(|it| it.walletinfo.address_statuses())
            .unwrap_or_default();
        Self {
            utxos,
            balance,
            address_statuses,
        }
    }

    /// True iff the address is known to hold a coinjoin output
    pub fn is_cj_out_address(&self, address: &str) -> bool {
        self.address_statuses
            .get(address)
            .map(|status| status.starts_with(ADDRESS_STATUS_CJ_OUT))
            .unwrap_or(false)
    }
}

impl WalletDisplayInfo {
    /// Flatten the account/branch/entry tree into an address status table
    pub fn address_statuses(&self) -> HashMap<String, String> {
        self.accounts
            .iter()
            .flat_map(|account| &account.branches)
            .flat_map(|branch| &branch.entries)
            .map(|entry| (entry.address.clone(), entry.status.clone()))
            .collect()
    }
}
