//! Spend-and-confirm polling
//!
//! After a sweep is broadcast, the backend wallet needs some time to
//! observe the transaction and drop the spent outpoints from its UTXO
//! view. [`SpendConfirmationPoller`] watches for that moment by reloading
//! the snapshot on an interval until none of the awaited ids remain,
//! without hammering the backend.

use std::time::Duration;

use crate::api::WalletApi;
use crate::data_structures::UtxoId;
use crate::errors::SagaError;
use crate::saga::cancellation::CancellationToken;

/// Delay before the first poll; gives the wallet time to synchronize its
/// UTXO set and reduces the number of requests.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Delay between subsequent polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of a completed polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Every awaited outpoint has disappeared from the live UTXO set
    Confirmed,
    /// Cancellation was requested; caller state must not be touched
    Cancelled,
}

/// Restartable, cancellable spend-confirmation poller
///
/// Iterations are strictly sequential: the next poll is only scheduled
/// after the previous one completes, so there is never more than one
/// reload in flight. There is no implicit timeout: polling continues
/// until confirmation, a reload error, or external cancellation.
#[derive(Debug, Clone)]
pub struct SpendConfirmationPoller {
    initial_delay: Duration,
    poll_interval: Duration,
}

impl Default for SpendConfirmationPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl SpendConfirmationPoller {
    pub fn new() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the delay before the first poll
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay between polls
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll until none of `spent_utxo_ids` is listed in the live UTXO set
    ///
    /// Each iteration narrows the awaited set to the ids still present, so
    /// later iterations check fewer outpoints. A reload failure stops
    /// polling and surfaces [`SagaError::WalletReload`] exactly once; the
    /// caller may retry the whole operation but the poller will not.
    pub async fn wait_for_utxos_to_be_spent<A: WalletApi + ?Sized>(
        &self,
        api: &A,
        spent_utxo_ids: &[UtxoId],
        token: &dyn CancellationToken,
    ) -> Result<PollOutcome, SagaError> {
        let mut awaited: Vec<UtxoId> = spent_utxo_ids.to_vec();
        if awaited.is_empty() {
            return Ok(PollOutcome::Confirmed);
        }

        tokio::time::sleep(self.initial_delay).await;

        loop {
            if token.is_cancelled() {
                tracing::debug!("spend confirmation polling cancelled");
                return Ok(PollOutcome::Cancelled);
            }

            let snapshot = match api.reload_utxos().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // give up waiting instead of retrying indefinitely
                    tracing::warn!(error = %e, "wallet reload failed while awaiting spend");
                    return Err(SagaError::WalletReload(e));
                }
            };

            if token.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }

            awaited.retain(|id| snapshot.iter().any(|utxo| &utxo.id == id));
            if awaited.is_empty() {
                tracing::debug!("all awaited outpoints spent");
                return Ok(PollOutcome::Confirmed);
            }

            tracing::debug!(remaining = awaited.len(), "outpoints still present, polling again");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::cancellation::{AlwaysCancel, NeverCancel};
    use crate::saga::mocks::{mock_utxo, MockFailureModes, MockWalletApi, RecordedCall};

    fn fast_poller() -> SpendConfirmationPoller {
        SpendConfirmationPoller::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_poll_interval(Duration::from_millis(1))
    }

    fn ids(ids: &[&str]) -> Vec<UtxoId> {
        ids.iter().map(|it| it.parse().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_poller_terminates_when_outpoints_disappear() {
        let api = MockWalletApi::new();
        api.script_reloads(vec![
            vec![mock_utxo("x:0", 0, 1, false), mock_utxo("y:0", 0, 1, false)],
            vec![mock_utxo("y:0", 0, 1, false)],
            vec![],
        ]);

        let outcome = fast_poller()
            .wait_for_utxos_to_be_spent(&api, &ids(&["x:0", "y:0"]), &NeverCancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Confirmed);
        // completion exactly after the third reload
        let reloads = api
            .calls()
            .iter()
            .filter(|it| matches!(it, RecordedCall::ReloadUtxos))
            .count();
        assert_eq!(reloads, 3);
    }

    #[tokio::test]
    async fn test_poller_empty_await_set_completes_without_polling() {
        let api = MockWalletApi::new();
        let outcome = fast_poller()
            .wait_for_utxos_to_be_spent(&api, &[], &NeverCancel)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Confirmed);
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_poller_cancellation_prevents_any_poll() {
        let api = MockWalletApi::new();
        api.set_utxos(vec![mock_utxo("x:0", 0, 1, false)]);

        let outcome = fast_poller()
            .wait_for_utxos_to_be_spent(&api, &ids(&["x:0"]), &AlwaysCancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_poller_reload_failure_surfaces_once_and_stops() {
        let api = MockWalletApi::new();
        api.set_utxos(vec![mock_utxo("x:0", 0, 1, false)]);
        api.set_failure_modes(MockFailureModes {
            fail_reload_utxos: true,
            ..Default::default()
        });

        let result = fast_poller()
            .wait_for_utxos_to_be_spent(&api, &ids(&["x:0"]), &NeverCancel)
            .await;

        assert!(matches!(result, Err(SagaError::WalletReload(_))));
        assert_eq!(api.call_count(), 1); // no automatic retry
    }
}
