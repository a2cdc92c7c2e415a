//! Freeze coordination for coin-selection control
//!
//! The backend's sweep operation spends every spendable coin of a jar. To
//! make it spend exactly a chosen subset, every other coin in the jar must
//! be frozen first, and any chosen coin that happens to be frozen must be
//! thawed. [`FreezeGuard`] performs both passes, remembers precisely which
//! flags it changed, and restores them afterwards whether or not the spend
//! succeeded. A crash or early return must never leave unrelated coins
//! stuck frozen.

use futures::future::join_all;

use crate::api::WalletApi;
use crate::data_structures::{utxo_set, Utxo, UtxoId};
use crate::errors::{ApiError, SagaError};

/// Records freeze-flag changes made on behalf of a saga and restores them
///
/// Bookkeeping is per UTXO: a freeze call that succeeds is recorded even
/// when a sibling call in the same batch fails, so a partial failure still
/// gets a full restoration of everything that actually changed.
#[derive(Debug, Default)]
pub struct FreezeGuard {
    /// Ids this guard froze (were unfrozen before; must be thawed again)
    frozen_by_saga: Vec<UtxoId>,
    /// Ids this guard thawed (were frozen before; must be re-frozen)
    unfrozen_by_saga: Vec<UtxoId>,
}

impl FreezeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids frozen by this guard so far
    pub fn frozen_by_saga(&self) -> &[UtxoId] {
        &self.frozen_by_saga
    }

    /// Ids unfrozen by this guard so far
    pub fn unfrozen_by_saga(&self) -> &[UtxoId] {
        &self.unfrozen_by_saga
    }

    /// Freeze every coin of the jar that is not about to be spent
    ///
    /// Already-frozen siblings are left alone and not recorded, so
    /// restoration will not thaw coins the user froze themselves. All
    /// calls are issued in parallel; on failure the successfully changed
    /// ids are still recorded and the first error is returned.
    pub async fn protect<A: WalletApi + ?Sized>(
        &mut self,
        api: &A,
        jar_utxos: &[Utxo],
        keep_spendable: &[Utxo],
    ) -> Result<(), SagaError> {
        let to_freeze: Vec<UtxoId> = utxo_set::utxos_to_freeze(jar_utxos, keep_spendable)
            .iter()
            .filter(|it| !it.frozen)
            .map(|it| it.id.clone())
            .collect();

        Self::toggle_batch(api, &to_freeze, true, &mut self.frozen_by_saga)
            .await
            .map_err(SagaError::Freeze)
    }

    /// Thaw the coins about to be spent that are currently frozen
    ///
    /// Same parallel and per-UTXO recording policy as [`Self::protect`].
    pub async fn unlock<A: WalletApi + ?Sized>(
        &mut self,
        api: &A,
        keep_spendable: &[Utxo],
    ) -> Result<(), SagaError> {
        let to_unfreeze: Vec<UtxoId> = keep_spendable
            .iter()
            .filter(|it| it.frozen)
            .map(|it| it.id.clone())
            .collect();

        Self::toggle_batch(api, &to_unfreeze, false, &mut self.unfrozen_by_saga)
            .await
            .map_err(SagaError::Unfreeze)
    }

    /// Restore every flag this guard changed
    ///
    /// Runs after the primary spend attempt regardless of its outcome. The
    /// two restoration groups are issued concurrently. Failures are logged
    /// and swallowed: a failed restore must not mask the primary result or
    /// crash the caller. The recorded state is cleared either way.
    pub async fn restore<A: WalletApi + ?Sized>(&mut self, api: &A) {
        let thaw = self.frozen_by_saga.iter().map(|id| async move {
            if let Err(e) = api.freeze_utxo(id, false).await {
                tracing::warn!(utxo = %id, error = %e, "failed to unfreeze previously frozen UTXO");
            }
        });
        let refreeze = self.unfrozen_by_saga.iter().map(|id| async move {
            if let Err(e) = api.freeze_utxo(id, true).await {
                tracing::warn!(utxo = %id, error = %e, "failed to re-freeze previously unfrozen UTXO");
            }
        });

        futures::join!(join_all(thaw), join_all(refreeze));

        self.frozen_by_saga.clear();
        self.unfrozen_by_saga.clear();
    }

    /// Run `spend` with protect/unlock before and restore after
    ///
    /// Restoration happens whether the setup passes, the spend succeeds or
    /// anything in between fails; only the primary result is returned.
    pub async fn run_protected<A, F, Fut, T>(
        &mut self,
        api: &A,
        jar_utxos: &[Utxo],
        keep_spendable: &[Utxo],
        spend: F,
    ) -> Result<T, SagaError>
    where
        A: WalletApi + ?Sized,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, SagaError>>,
    {
        let result = async {
            self.protect(api, jar_utxos, keep_spendable).await?;
            self.unlock(api, keep_spendable).await?;
            spend().await
        }
        .await;

        self.restore(api).await;
        result
    }

    /// Issue one freeze/unfreeze call per id, in parallel, recording each
    /// id whose flag actually changed before reporting the first error.
    async fn toggle_batch<A: WalletApi + ?Sized>(
        api: &A,
        ids: &[UtxoId],
        freeze: bool,
        record: &mut Vec<UtxoId>,
    ) -> Result<(), ApiError> {
        let calls = ids.iter().map(|id| async move {
            api.freeze_utxo(id, freeze).await.map(|_| id.clone())
        });

        let mut first_error = None;
        for result in join_all(calls).await {
            match result {
                Ok(id) => record.push(id),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TxInfo;
    use crate::saga::mocks::{mock_tx, mock_utxo, MockFailureModes, MockWalletApi};

    fn three_coin_jar(api: &MockWalletApi) -> Vec<Utxo> {
        let utxos = vec![
            mock_utxo("a:0", 0, 100_000, false),
            mock_utxo("b:0", 0, 200_000, false),
            mock_utxo("c:0", 0, 300_000, true),
        ];
        api.set_utxos(utxos.clone());
        utxos
    }

    #[tokio::test]
    async fn test_protect_freezes_only_unfrozen_siblings() {
        let api = MockWalletApi::new();
        let jar = three_coin_jar(&api);
        let selected = vec![jar[0].clone()];

        let mut guard = FreezeGuard::new();
        guard.protect(&api, &jar, &selected).await.unwrap();

        // b was frozen by the guard; c was already frozen and stays off the books
        assert_eq!(guard.frozen_by_saga(), &["b:0".parse::<UtxoId>().unwrap()]);
        assert_eq!(api.frozen("a:0"), Some(false));
        assert_eq!(api.frozen("b:0"), Some(true));
        assert_eq!(
            api.freeze_calls(),
            vec![("b:0".parse::<UtxoId>().unwrap(), true)]
        );
    }

    #[tokio::test]
    async fn test_restore_thaws_exactly_what_the_guard_froze() {
        let api = MockWalletApi::new();
        let jar = three_coin_jar(&api);
        let selected = vec![jar[0].clone()];

        let mut guard = FreezeGuard::new();
        guard.protect(&api, &jar, &selected).await.unwrap();
        guard.restore(&api).await;

        assert_eq!(api.frozen("b:0"), Some(false));
        // the user's own frozen coin is untouched
        assert_eq!(api.frozen("c:0"), Some(true));
        assert!(guard.frozen_by_saga().is_empty());
        assert!(guard.unfrozen_by_saga().is_empty());
    }

    #[tokio::test]
    async fn test_partial_freeze_failure_still_records_successes() {
        let api = MockWalletApi::new();
        api.set_utxos(vec![
            mock_utxo("keep:0", 0, 1_000, false),
            mock_utxo("good:0", 0, 2_000, false),
            mock_utxo("bad:0", 0, 3_000, false),
        ]);
        api.set_failure_modes(MockFailureModes {
            fail_freeze_for: Some("bad:0".parse().unwrap()),
            ..Default::default()
        });

        let jar = api.utxos();
        let selected = vec![jar[0].clone()];

        let mut guard = FreezeGuard::new();
        let result = guard.protect(&api, &jar, &selected).await;
        assert!(matches!(result, Err(SagaError::Freeze(_))));
        assert_eq!(guard.frozen_by_saga(), &["good:0".parse::<UtxoId>().unwrap()]);

        // restoration covers exactly the coin that did change
        api.set_failure_modes(MockFailureModes::default());
        api.clear_calls();
        guard.restore(&api).await;
        assert_eq!(
            api.freeze_calls(),
            vec![("good:0".parse::<UtxoId>().unwrap(), false)]
        );
    }

    #[tokio::test]
    async fn test_unlock_thaws_frozen_selection_and_restore_refreezes() {
        let api = MockWalletApi::new();
        api.set_utxos(vec![
            mock_utxo("sel:0", 0, 1_000, true),
            mock_utxo("sib:0", 0, 2_000, false),
        ]);
        let jar = api.utxos();
        let selected = vec![jar[0].clone()];

        let mut guard = FreezeGuard::new();
        guard.protect(&api, &jar, &selected).await.unwrap();
        guard.unlock(&api, &selected).await.unwrap();

        assert_eq!(api.frozen("sel:0"), Some(false));
        assert_eq!(api.frozen("sib:0"), Some(true));
        assert_eq!(guard.unfrozen_by_saga(), &["sel:0".parse::<UtxoId>().unwrap()]);

        guard.restore(&api).await;
        assert_eq!(api.frozen("sel:0"), Some(true));
        assert_eq!(api.frozen("sib:0"), Some(false));
    }

    #[tokio::test]
    async fn test_run_protected_restores_after_spend_failure() {
        let api = MockWalletApi::new();
        let jar = three_coin_jar(&api);
        let selected = vec![jar[0].clone()];
        api.set_failure_modes(MockFailureModes {
            fail_direct_send: true,
            ..Default::default()
        });

        let mut guard = FreezeGuard::new();
        let api_ref = &api;
        let result: Result<TxInfo, SagaError> = guard
            .run_protected(api_ref, &jar, &selected, || async {
                api_ref
                    .direct_send(0, "bcrt1qdest", 0)
                    .await
                    .map_err(SagaError::Send)
            })
            .await;

        assert!(matches!(result, Err(SagaError::Send(_))));
        // everything the guard froze has been thawed again
        assert_eq!(api.frozen("b:0"), Some(false));
        assert!(guard.frozen_by_saga().is_empty());
    }

    #[tokio::test]
    async fn test_run_protected_returns_spend_result() {
        let api = MockWalletApi::new();
        let jar = three_coin_jar(&api);
        let selected = vec![jar[0].clone(), jar[1].clone()];
        api.set_next_tx(mock_tx("cafe", &["a:0", "b:0"]));

        let mut guard = FreezeGuard::new();
        let api_ref = &api;
        let tx = guard
            .run_protected(api_ref, &jar, &selected, || async {
                api_ref
                    .direct_send(0, "bcrt1qdest", 0)
                    .await
                    .map_err(SagaError::Send)
            })
            .await
            .unwrap();

        assert_eq!(tx.txid, "cafe");
        // the user's own frozen coin was never thawed
        assert!(api
            .freeze_calls()
            .iter()
            .all(|(id, freeze)| (id.as_str(), *freeze) != ("c:0", false)));
        assert_eq!(api.frozen("c:0"), Some(true));
    }
}
