//! Core data structures for the wallet client
//!
//! All of these are value types: the authoritative wallet state lives in
//! the backend and is only ever observed as snapshots here.

pub mod balance;
pub mod lockdate;
pub mod utxo;

pub use balance::{utxos_by_jar, JarBalanceSummary, WalletBalanceSummary};
pub use lockdate::{
    Lockdate, SelectableMonth, Timestamp, YearsRange, DEFAULT_MAX_TIMELOCK_YEARS,
};
pub use utxo::{utxo_set, Utxo, UtxoId};
