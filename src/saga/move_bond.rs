//! Moving and spending an expired fidelity bond
//!
//! A bond whose lock has passed can be swept either into another jar
//! (fresh address derived in that jar) or to an external address. Both
//! variants run under the freeze coordinator so the sweep selects exactly
//! the bond, and both wait for the backend wallet to drop the bond from
//! its UTXO list before reporting success.

use crate::api::{TxInfo, WalletApi};
use crate::data_structures::{utxo_set, utxos_by_jar, Timestamp, Utxo};
use crate::errors::SagaError;
use crate::saga::cancellation::{CancellationToken, NeverCancel};
use crate::saga::freeze_guard::FreezeGuard;
use crate::saga::poller::{PollOutcome, SpendConfirmationPoller};

/// Driver for moving or spending a single expired fidelity bond
pub struct MoveBondSaga<A: WalletApi> {
    api: A,
    poller: SpendConfirmationPoller,
}

impl<A: WalletApi> MoveBondSaga<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poller: SpendConfirmationPoller::new(),
        }
    }

    /// Use a custom poller (mainly to shorten delays in tests)
    pub fn with_poller(mut self, poller: SpendConfirmationPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Sweep the bond into `target_jar` via a freshly derived address
    ///
    /// `now_ms` is the reference time for the lock check, which runs
    /// before any network call is made.
    pub async fn move_to_jar(
        &self,
        bond: &Utxo,
        target_jar: u32,
        now_ms: Timestamp,
    ) -> Result<TxInfo, SagaError> {
        self.move_to_jar_with_token(bond, target_jar, now_ms, &NeverCancel)
            .await
    }

    pub async fn move_to_jar_with_token(
        &self,
        bond: &Utxo,
        target_jar: u32,
        now_ms: Timestamp,
        token: &dyn CancellationToken,
    ) -> Result<TxInfo, SagaError> {
        Self::check_spendable(bond, now_ms)?;

        let destination = self
            .api
            .new_address(target_jar)
            .await
            .map_err(SagaError::AddressDerivation)?;

        self.sweep_bond(bond, &destination, token).await
    }

    /// Sweep the bond to an external `destination` address
    pub async fn spend_to_address(
        &self,
        bond: &Utxo,
        destination: &str,
        now_ms: Timestamp,
    ) -> Result<TxInfo, SagaError> {
        self.spend_to_address_with_token(bond, destination, now_ms, &NeverCancel)
            .await
    }

    pub async fn spend_to_address_with_token(
        &self,
        bond: &Utxo,
        destination: &str,
        now_ms: Timestamp,
        token: &dyn CancellationToken,
    ) -> Result<TxInfo, SagaError> {
        Self::check_spendable(bond, now_ms)?;
        self.sweep_bond(bond, destination, token).await
    }

    /// Reject non-bonds and bonds whose lock has not yet passed
    fn check_spendable(bond: &Utxo, now_ms: Timestamp) -> Result<(), SagaError> {
        if !utxo_set::is_fidelity_bond(bond) {
            return Err(SagaError::validation(format!(
                "utxo is not a fidelity bond: {}",
                bond.id
            )));
        }
        if utxo_set::is_locked(bond, now_ms) {
            return Err(SagaError::BondStillLocked);
        }
        Ok(())
    }

    /// Sweep the bond's jar to `destination` with every other coin of the
    /// jar frozen, then wait until the backend no longer lists the
    /// sweep's inputs.
    ///
    /// The freeze scope is built from a fresh snapshot so coins that
    /// appeared since the caller's view are covered too. A cancelled wait
    /// aborts with [`SagaError::Cancelled`]; the broadcast transaction may
    /// still confirm on its own but is never reported as success.
    async fn sweep_bond(
        &self,
        bond: &Utxo,
        destination: &str,
        token: &dyn CancellationToken,
    ) -> Result<TxInfo, SagaError> {
        let utxos = self
            .api
            .reload_utxos()
            .await
            .map_err(SagaError::WalletReload)?;

        let live_bond = utxos
            .iter()
            .find(|it| it.id == bond.id)
            .cloned()
            .ok_or_else(|| {
                SagaError::validation(format!("bond no longer in wallet: {}", bond.id))
            })?;
        if live_bond.jar != bond.jar {
            return Err(SagaError::WrongJar);
        }

        let jar_utxos = utxos_by_jar(&utxos)
            .remove(&live_bond.jar)
            .unwrap_or_default();
        let keep_spendable = [live_bond.clone()];

        let mut guard = FreezeGuard::new();
        let api = &self.api;
        let jar = live_bond.jar;
        let tx = guard
            .run_protected(api, &jar_utxos, &keep_spendable, || async {
                api.direct_send(jar, destination, 0)
                    .await
                    .map_err(SagaError::Send)
            })
            .await?;

        let awaited = tx.input_ids();
        // freeze flags are restored before the wait on purpose: the wait
        // can run for a long time and no coin may stay frozen meanwhile
        match self
            .poller
            .wait_for_utxos_to_be_spent(api, &awaited, token)
            .await?
        {
            PollOutcome::Confirmed => Ok(tx),
            PollOutcome::Cancelled => Err(SagaError::Cancelled),
        }
    }
}
