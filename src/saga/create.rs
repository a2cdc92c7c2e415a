//! Fidelity bond creation saga
//!
//! A multi-step workflow: pick an unlock date, pick a jar, pick the coins
//! to lock, freeze the jar's other coins, derive the time-locked address,
//! sweep the jar to it, and thaw whatever the saga froze. The whole state
//! lives in one value with explicit transitions so every step can be
//! validated and every failure path lands in a well-defined terminal
//! state, with no partial carry-over between attempts.

use crate::api::{WalletApi, WalletInfo, FIDELITY_BOND_JAR};
use crate::data_structures::{utxo_set, utxos_by_jar, Lockdate, Utxo, UtxoId};
use crate::errors::SagaError;
use crate::saga::cancellation::{CancellationToken, NeverCancel};
use crate::saga::freeze_guard::FreezeGuard;
use crate::saga::poller::{PollOutcome, SpendConfirmationPoller};

/// Steps of the creation saga, in forward order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateBondStep {
    SelectDate,
    SelectJar,
    SelectUtxos,
    FreezeUtxos,
    ReviewInputs,
    CreateBond,
    UnfreezeUtxos,
    Done,
    Failed,
}

/// Whether the selected coins are safe to turn into a fidelity bond
///
/// Locking raw deposit outputs ties them to the user's identity; the
/// workflow flags that but never blocks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSafety {
    /// Every selected coin is a coinjoin output or an existing bond
    Safe,
    /// At least one selected coin is an unmixed deposit
    Unsafe,
}

/// Driver for the fidelity bond creation workflow
///
/// Owns the backend handle, the current step, the user's selections and
/// the saga memory (ids frozen by this saga, ids awaited for spend
/// confirmation). Terminal states reset to a clean [`CreateBondStep::SelectDate`]
/// on acknowledgement.
pub struct CreateBondSaga<A: WalletApi> {
    api: A,
    poller: SpendConfirmationPoller,
    step: CreateBondStep,
    wallet_info: WalletInfo,
    lockdate: Option<Lockdate>,
    jar: Option<u32>,
    selected: Vec<Utxo>,
    timelocked_address: Option<String>,
    /// Lockdate the address was derived for; derivation is requested once
    /// per distinct lockdate
    derived_for: Option<Lockdate>,
    guard: FreezeGuard,
    awaited_ids: Vec<UtxoId>,
    last_error: Option<String>,
}

impl<A: WalletApi> CreateBondSaga<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            poller: SpendConfirmationPoller::new(),
            step: CreateBondStep::SelectDate,
            wallet_info: WalletInfo::default(),
            lockdate: None,
            jar: None,
            selected: Vec::new(),
            timelocked_address: None,
            derived_for: None,
            guard: FreezeGuard::new(),
            awaited_ids: Vec::new(),
            last_error: None,
        }
    }

    /// Use a custom poller (mainly to shorten delays in tests)
    pub fn with_poller(mut self, poller: SpendConfirmationPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn step(&self) -> CreateBondStep {
        self.step
    }

    pub fn lockdate(&self) -> Option<&Lockdate> {
        self.lockdate.as_ref()
    }

    pub fn jar(&self) -> Option<u32> {
        self.jar
    }

    pub fn selected_utxos(&self) -> &[Utxo] {
        &self.selected
    }

    pub fn timelocked_address(&self) -> Option<&str> {
        self.timelocked_address.as_deref()
    }

    /// Ids frozen by this saga and still awaiting their thaw
    pub fn frozen_by_saga(&self) -> &[UtxoId] {
        self.guard.frozen_by_saga()
    }

    /// Ids awaited for spend confirmation
    pub fn awaited_ids(&self) -> &[UtxoId] {
        &self.awaited_ids
    }

    /// The error of the most recent failed step, for UI display
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The wallet snapshot this saga currently works from
    pub fn wallet_info(&self) -> &WalletInfo {
        &self.wallet_info
    }

    /// Total value of the current selection, in satoshis
    pub fn selected_value_sats(&self) -> u64 {
        self.selected.iter().map(|it| it.value).sum()
    }

    /// True iff the selection covers every coin of the chosen jar
    pub fn all_jar_utxos_selected(&self) -> bool {
        match self.jar {
            Some(jar) => {
                let jar_utxos = self.jar_utxos(jar);
                !jar_utxos.is_empty()
                    && jar_utxos
                        .iter()
                        .all(|it| utxo_set::is_in_list(it, &self.selected))
            }
            None => false,
        }
    }

    /// Whether the current step's primary action can be attempted
    ///
    /// Used by drivers to gate their primary button; the transition
    /// methods re-validate regardless.
    pub fn can_advance(&self) -> bool {
        match self.step {
            CreateBondStep::SelectDate => !self.wallet_info.utxos.is_empty(),
            CreateBondStep::SelectJar => self.lockdate.is_some(),
            CreateBondStep::SelectUtxos => self.jar.is_some(),
            CreateBondStep::FreezeUtxos => !self.selected.is_empty(),
            CreateBondStep::ReviewInputs => self.timelocked_address.is_some(),
            // a sweep is in flight, nothing to trigger
            CreateBondStep::CreateBond => false,
            CreateBondStep::UnfreezeUtxos => true,
            CreateBondStep::Done | CreateBondStep::Failed => true,
        }
    }

    /// Fetch a fresh combined wallet snapshot to work from
    pub async fn reload(&mut self) -> Result<(), SagaError> {
        self.wallet_info = self
            .api
            .reload_wallet_info()
            .await
            .map_err(SagaError::WalletReload)?;
        Ok(())
    }

    fn jar_utxos(&self, jar: u32) -> Vec<Utxo> {
        utxos_by_jar(&self.wallet_info.utxos)
            .remove(&jar)
            .unwrap_or_default()
    }

    fn expect_step(&self, expected: CreateBondStep) -> Result<(), SagaError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(SagaError::validation(format!(
                "step {:?} expected, saga is at {:?}",
                expected, self.step
            )))
        }
    }

    /// SelectDate -> SelectJar
    pub fn select_lockdate(&mut self, lockdate: Lockdate) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::SelectDate)?;
        // a new date invalidates a previously derived address
        if self.derived_for != Some(lockdate) {
            self.timelocked_address = None;
            self.derived_for = None;
        }
        self.lockdate = Some(lockdate);
        self.step = CreateBondStep::SelectJar;
        Ok(())
    }

    /// SelectJar -> SelectUtxos; the jar must hold at least one coin
    pub fn select_jar(&mut self, jar: u32) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::SelectJar)?;
        if self.jar_utxos(jar).is_empty() {
            return Err(SagaError::validation(format!(
                "jar {} has no eligible utxos",
                jar
            )));
        }
        self.jar = Some(jar);
        self.selected.clear();
        self.step = CreateBondStep::SelectUtxos;
        Ok(())
    }

    /// SelectUtxos -> FreezeUtxos
    ///
    /// At least one coin must be selected, every id must resolve to a coin
    /// of the chosen jar, and none may already be frozen.
    pub fn select_utxos(&mut self, ids: &[UtxoId]) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::SelectUtxos)?;
        let jar = self
            .jar
            .ok_or_else(|| SagaError::validation("no jar selected"))?;

        if ids.is_empty() {
            return Err(SagaError::validation("no utxos selected"));
        }

        let jar_utxos = self.jar_utxos(jar);
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let utxo = jar_utxos
                .iter()
                .find(|it| &it.id == id)
                .ok_or_else(|| SagaError::validation(format!("unknown utxo in jar {}: {}", jar, id)))?;
            if utxo.frozen {
                return Err(SagaError::validation(format!(
                    "selected utxo is frozen: {}",
                    id
                )));
            }
            selected.push(utxo.clone());
        }

        self.selected = selected;
        self.step = CreateBondStep::FreezeUtxos;
        Ok(())
    }

    /// Safety assessment of the current selection
    ///
    /// Safe means every selected coin is a coinjoin output or already a
    /// fidelity bond; anything else is flagged for the primary action.
    pub fn selection_safety(&self) -> SelectionSafety {
        let all_safe = self.selected.iter().all(|utxo| {
            utxo_set::is_fidelity_bond(utxo) || self.wallet_info.is_cj_out_address(&utxo.address)
        });
        if all_safe {
            SelectionSafety::Safe
        } else {
            SelectionSafety::Unsafe
        }
    }

    /// FreezeUtxos -> ReviewInputs
    ///
    /// Freezes every not-yet-frozen sibling of the selection, then
    /// verifies against a fresh snapshot that everything outside the
    /// selection is frozen. On a freeze failure the step is kept so the
    /// action can be retried; the coordinator has recorded what did
    /// change.
    pub async fn freeze_sibling_utxos(&mut self) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::FreezeUtxos)?;
        let jar = self
            .jar
            .ok_or_else(|| SagaError::validation("no jar selected"))?;

        let jar_utxos = self.jar_utxos(jar);
        let api = &self.api;
        let result = self.guard.protect(api, &jar_utxos, &self.selected).await;
        if let Err(e) = result {
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        self.reload().await?;
        let to_freeze = utxo_set::utxos_to_freeze(&self.jar_utxos(jar), &self.selected);
        if !utxo_set::all_are_frozen(&to_freeze) {
            let e = SagaError::validation("not all sibling utxos are frozen yet");
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        self.last_error = None;
        self.step = CreateBondStep::ReviewInputs;
        Ok(())
    }

    /// Derive the time-locked destination address (ReviewInputs entry)
    ///
    /// Requested once per distinct lockdate; a failure keeps the step so
    /// the same action retries derivation.
    pub async fn derive_timelocked_address(&mut self) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::ReviewInputs)?;
        let lockdate = self
            .lockdate
            .ok_or_else(|| SagaError::validation("no lockdate selected"))?;

        if self.derived_for == Some(lockdate) && self.timelocked_address.is_some() {
            return Ok(());
        }

        // time-locked addresses always live in the fidelity bond account,
        // independent of which jar funds the sweep
        match self
            .api
            .new_timelocked_address(FIDELITY_BOND_JAR, &lockdate)
            .await
        {
            Ok(address) => {
                self.timelocked_address = Some(address);
                self.derived_for = Some(lockdate);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                let e = SagaError::AddressDerivation(e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// ReviewInputs -> CreateBond -> UnfreezeUtxos | Done | Failed
    ///
    /// Sweeps the jar to the derived address and waits until the backend
    /// wallet no longer lists the sweep's inputs. Reachable only once the
    /// address has been derived and all sibling coins are frozen.
    pub async fn create_bond(&mut self) -> Result<(), SagaError> {
        self.create_bond_with_token(&NeverCancel).await
    }

    /// Same as [`Self::create_bond`] but with an external cancellation
    /// token for the confirmation wait
    pub async fn create_bond_with_token(
        &mut self,
        token: &dyn CancellationToken,
    ) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::ReviewInputs)?;
        let jar = self
            .jar
            .ok_or_else(|| SagaError::validation("no jar selected"))?;
        let destination = self
            .timelocked_address
            .clone()
            .ok_or_else(|| SagaError::validation("timelocked address not derived"))?;

        self.step = CreateBondStep::CreateBond;

        // thaw any selected coin that got frozen since selection
        let api = &self.api;
        if let Err(e) = self.guard.unlock(api, &self.selected).await {
            return Err(self.fail(e).await);
        }

        let tx = match self.api.direct_send(jar, &destination, 0).await {
            Ok(tx) => tx,
            Err(e) => return Err(self.fail(SagaError::Send(e)).await),
        };

        self.awaited_ids = tx.input_ids();
        let poll = self
            .poller
            .wait_for_utxos_to_be_spent(&self.api, &self.awaited_ids, token)
            .await;
        self.awaited_ids.clear();

        match poll {
            Ok(PollOutcome::Confirmed) => {}
            // only a confirmed wait counts as success; the broadcast
            // transaction may still confirm on its own
            Ok(PollOutcome::Cancelled) => return Err(self.fail(SagaError::Cancelled).await),
            Err(e) => return Err(self.fail(e).await),
        }

        self.last_error = None;
        if self.guard.frozen_by_saga().is_empty() && self.guard.unfrozen_by_saga().is_empty() {
            self.step = CreateBondStep::Done;
        } else {
            self.step = CreateBondStep::UnfreezeUtxos;
        }
        Ok(())
    }

    /// UnfreezeUtxos -> Done: thaw everything this saga froze
    ///
    /// Restoration failures are logged by the coordinator and never
    /// surfaced; the bond exists either way.
    pub async fn unfreeze_saga_utxos(&mut self) -> Result<(), SagaError> {
        self.expect_step(CreateBondStep::UnfreezeUtxos)?;
        let api = &self.api;
        self.guard.restore(api).await;
        self.step = CreateBondStep::Done;
        Ok(())
    }

    /// Acknowledge a terminal state and reset for the next attempt
    pub fn acknowledge(&mut self) -> Result<(), SagaError> {
        match self.step {
            CreateBondStep::Done | CreateBondStep::Failed => {
                self.reset();
                Ok(())
            }
            _ => Err(SagaError::validation(format!(
                "nothing to acknowledge at {:?}",
                self.step
            ))),
        }
    }

    /// Reset all selections and saga memory back to the first step
    pub fn reset(&mut self) {
        self.step = CreateBondStep::SelectDate;
        self.lockdate = None;
        self.jar = None;
        self.selected.clear();
        self.timelocked_address = None;
        self.derived_for = None;
        self.guard = FreezeGuard::new();
        self.awaited_ids.clear();
        self.last_error = None;
    }

    /// Mark the saga failed after a spend-path error; the freeze
    /// coordinator restores whatever it changed before the state is shown
    /// to the user.
    async fn fail(&mut self, error: SagaError) -> SagaError {
        let api = &self.api;
        self.guard.restore(api).await;
        self.last_error = Some(error.to_string());
        self.step = CreateBondStep::Failed;
        error
    }
}
