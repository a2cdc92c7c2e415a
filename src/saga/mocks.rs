//! Mock backend implementation for deterministic saga testing
//!
//! [`MockWalletApi`] keeps the whole wallet state in memory behind an
//! `Arc<Mutex<..>>`, applies freeze calls to it, records every call it
//! receives, and can be armed with per-operation failure modes and
//! scripted snapshot sequences for poller tests, all without a real
//! backend or network connection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::api::{TxInfo, TxInput, WalletApi, WalletInfo};
use crate::data_structures::{Lockdate, Timestamp, Utxo, UtxoId, WalletBalanceSummary};
use crate::errors::ApiError;

/// One recorded backend call, for asserting exact network traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Freeze { utxo: UtxoId, freeze: bool },
    NewAddress { jar: u32 },
    NewTimelockedAddress { jar: u32, lockdate: Lockdate },
    DirectSend { jar: u32, destination: String, amount_sats: u64 },
    ReloadUtxos,
    ReloadWalletInfo,
}

/// Simulated failure modes for testing error conditions
#[derive(Debug, Clone, Default)]
pub struct MockFailureModes {
    /// Fail every freeze call for this utxo id
    pub fail_freeze_for: Option<UtxoId>,
    /// Fail every freeze/unfreeze call
    pub fail_freeze: bool,
    /// Fail the next direct-send call
    pub fail_direct_send: bool,
    /// Fail the next address derivation call
    pub fail_new_address: bool,
    /// Fail the next utxo reload
    pub fail_reload_utxos: bool,
}

#[derive(Debug, Default)]
struct MockState {
    utxos: Vec<Utxo>,
    /// Snapshots handed out by successive reload calls before falling back
    /// to the live `utxos` list
    scripted_reloads: VecDeque<Vec<Utxo>>,
    /// Address -> status entries for the wallet info snapshot
    address_statuses: Vec<(String, String)>,
    next_address: String,
    next_tx: Option<TxInfo>,
    calls: Vec<RecordedCall>,
    failure_modes: MockFailureModes,
    now_ms: Timestamp,
}

/// In-memory [`WalletApi`] double
#[derive(Debug, Clone, Default)]
pub struct MockWalletApi {
    state: Arc<Mutex<MockState>>,
}

impl MockWalletApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live UTXO set
    pub fn set_utxos(&self, utxos: Vec<Utxo>) {
        self.state.lock().unwrap().utxos = utxos;
    }

    /// Current live UTXO set (after any freeze calls applied)
    pub fn utxos(&self) -> Vec<Utxo> {
        self.state.lock().unwrap().utxos.clone()
    }

    /// Freeze flag of a single live UTXO
    pub fn frozen(&self, id: &str) -> Option<bool> {
        self.state
            .lock()
            .unwrap()
            .utxos
            .iter()
            .find(|it| it.id.as_str() == id)
            .map(|it| it.frozen)
    }

    /// Queue snapshots returned by successive `reload_utxos` calls
    pub fn script_reloads(&self, snapshots: Vec<Vec<Utxo>>) {
        self.state.lock().unwrap().scripted_reloads = snapshots.into();
    }

    /// Set the address returned by the next derivation calls
    pub fn set_next_address(&self, address: impl Into<String>) {
        self.state.lock().unwrap().next_address = address.into();
    }

    /// Set the transaction info returned by the next direct-send call
    pub fn set_next_tx(&self, tx: TxInfo) {
        self.state.lock().unwrap().next_tx = Some(tx);
    }

    /// Add an address status entry to the wallet info snapshot
    pub fn set_address_status(&self, address: impl Into<String>, status: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .address_statuses
            .push((address.into(), status.into()));
    }

    /// Reference time used for balance computation in wallet info
    pub fn set_now(&self, now_ms: Timestamp) {
        self.state.lock().unwrap().now_ms = now_ms;
    }

    /// Arm failure modes for testing error conditions
    pub fn set_failure_modes(&self, modes: MockFailureModes) {
        self.state.lock().unwrap().failure_modes = modes;
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Freeze/unfreeze calls received so far, in order
    pub fn freeze_calls(&self) -> Vec<(UtxoId, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Freeze { utxo, freeze } => Some((utxo, freeze)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls, keep wallet state
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: RecordedCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

/// Build a plain test UTXO
pub fn mock_utxo(id: &str, jar: u32, value: u64, frozen: bool) -> Utxo {
    Utxo {
        id: id.parse().expect("valid utxo id"),
        address: format!("bcrt1q_{}", id.replace(':', "_")),
        value,
        jar,
        confirmations: 3,
        frozen,
        locktime: None,
        label: None,
    }
}

/// Build a fidelity bond test UTXO
pub fn mock_bond(id: &str, jar: u32, value: u64, locktime: &str) -> Utxo {
    let mut utxo = mock_utxo(id, jar, value, false);
    utxo.locktime = Some(locktime.parse().expect("valid lockdate"));
    utxo
}

/// Build transaction info spending the given outpoints
pub fn mock_tx(txid: &str, input_ids: &[&str]) -> TxInfo {
    TxInfo {
        txid: txid.to_string(),
        hex: "0200".to_string(),
        inputs: input_ids
            .iter()
            .map(|id| TxInput {
                outpoint: id.parse().expect("valid utxo id"),
                script_sig: String::new(),
                n_sequence: 0xffff_fffd,
                witness: String::new(),
            })
            .collect(),
        outputs: vec![],
        n_locktime: 0,
        n_version: 2,
    }
}

#[async_trait]
impl WalletApi for MockWalletApi {
    async fn freeze_utxo(&self, id: &UtxoId, freeze: bool) -> Result<(), ApiError> {
        self.record(RecordedCall::Freeze {
            utxo: id.clone(),
            freeze,
        });

        let mut state = self.state.lock().unwrap();
        if state.failure_modes.fail_freeze {
            return Err(ApiError::http(500, "Mock failure: freeze"));
        }
        if state.failure_modes.fail_freeze_for.as_ref() == Some(id) {
            return Err(ApiError::http(500, format!("Mock failure: freeze {}", id)));
        }
        match state.utxos.iter_mut().find(|it| &it.id == id) {
            Some(utxo) => {
                utxo.frozen = freeze;
                Ok(())
            }
            None => Err(ApiError::http(404, format!("unknown utxo: {}", id))),
        }
    }

    async fn new_address(&self, jar: u32) -> Result<String, ApiError> {
        self.record(RecordedCall::NewAddress { jar });

        let mut state = self.state.lock().unwrap();
        if state.failure_modes.fail_new_address {
            state.failure_modes.fail_new_address = false; // reset after use
            return Err(ApiError::http(500, "Mock failure: new_address"));
        }
        Ok(state.next_address.clone())
    }

    async fn new_timelocked_address(
        &self,
        jar: u32,
        lockdate: &Lockdate,
    ) -> Result<String, ApiError> {
        self.record(RecordedCall::NewTimelockedAddress {
            jar,
            lockdate: *lockdate,
        });

        let mut state = self.state.lock().unwrap();
        if state.failure_modes.fail_new_address {
            state.failure_modes.fail_new_address = false; // reset after use
            return Err(ApiError::http(500, "Mock failure: new_timelocked_address"));
        }
        Ok(state.next_address.clone())
    }

    async fn direct_send(
        &self,
        jar: u32,
        destination: &str,
        amount_sats: u64,
    ) -> Result<TxInfo, ApiError> {
        self.record(RecordedCall::DirectSend {
            jar,
            destination: destination.to_string(),
            amount_sats,
        });

        let mut state = self.state.lock().unwrap();
        if state.failure_modes.fail_direct_send {
            state.failure_modes.fail_direct_send = false; // reset after use
            return Err(ApiError::http(409, "Mock failure: direct_send"));
        }
        state
            .next_tx
            .take()
            .ok_or_else(|| ApiError::http(500, "no transaction scripted"))
    }

    async fn reload_utxos(&self) -> Result<Vec<Utxo>, ApiError> {
        self.record(RecordedCall::ReloadUtxos);

        let mut state = self.state.lock().unwrap();
        if state.failure_modes.fail_reload_utxos {
            state.failure_modes.fail_reload_utxos = false; // reset after use
            return Err(ApiError::network("Mock failure: reload_utxos"));
        }
        match state.scripted_reloads.pop_front() {
            Some(snapshot) => Ok(snapshot),
            None => Ok(state.utxos.clone()),
        }
    }

    async fn reload_wallet_info(&self) -> Result<WalletInfo, ApiError> {
        self.record(RecordedCall::ReloadWalletInfo);

        let state = self.state.lock().unwrap();
        let mut info = WalletInfo {
            utxos: state.utxos.clone(),
            balance: WalletBalanceSummary::from_utxos(&state.utxos, state.now_ms),
            address_statuses: Default::default(),
        };
        for (address, status) in &state.address_statuses {
            info.address_statuses
                .insert(address.clone(), status.clone());
        }
        Ok(info)
    }
}
