//! Derived balance summaries
//!
//! Balances are recomputed from every fresh UTXO snapshot and never
//! persisted. "Available" deliberately excludes both frozen coins and
//! still-locked fidelity bonds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_structures::lockdate::Timestamp;
use crate::data_structures::utxo::{utxo_set, Utxo};

/// Per-jar (per-account) balance aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarBalanceSummary {
    pub jar: u32,
    pub total_sats: u64,
    pub frozen_or_locked_sats: u64,
    /// `total - frozen - locked`
    pub available_sats: u64,
}

/// Wallet-wide balance aggregate with a per-jar breakdown
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletBalanceSummary {
    pub total_sats: u64,
    pub frozen_or_locked_sats: u64,
    pub available_sats: u64,
    pub jars: Vec<JarBalanceSummary>,
}

impl WalletBalanceSummary {
    /// Compute the summary from a UTXO snapshot at a reference time
    pub fn from_utxos(utxos: &[Utxo], now_ms: Timestamp) -> Self {
        let mut jars: BTreeMap<u32, JarBalanceSummary> = BTreeMap::new();

        for utxo in utxos {
            let entry = jars.entry(utxo.jar).or_insert(JarBalanceSummary {
                jar: utxo.jar,
                total_sats: 0,
                frozen_or_locked_sats: 0,
                available_sats: 0,
            });
            entry.total_sats += utxo.value;
            if utxo.frozen || utxo_set::is_locked(utxo, now_ms) {
                entry.frozen_or_locked_sats += utxo.value;
            }
        }

        let mut summary = WalletBalanceSummary::default();
        for jar in jars.values_mut() {
            jar.available_sats = jar.total_sats - jar.frozen_or_locked_sats;
            summary.total_sats += jar.total_sats;
            summary.frozen_or_locked_sats += jar.frozen_or_locked_sats;
        }
        summary.available_sats = summary.total_sats - summary.frozen_or_locked_sats;
        summary.jars = jars.into_values().collect();
        summary
    }

    /// The summary of a single jar, if the jar holds any coins
    pub fn jar(&self, jar: u32) -> Option<&JarBalanceSummary> {
        self.jars.iter().find(|it| it.jar == jar)
    }
}

/// Group a UTXO snapshot by jar index, snapshot order preserved per jar
pub fn utxos_by_jar(utxos: &[Utxo]) -> BTreeMap<u32, Vec<Utxo>> {
    let mut by_jar: BTreeMap<u32, Vec<Utxo>> = BTreeMap::new();
    for utxo in utxos {
        by_jar.entry(utxo.jar).or_default().push(utxo.clone());
    }
    by_jar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::lockdate::Lockdate;
    use crate::data_structures::utxo::UtxoId;

    fn utxo(id: &str, jar: u32, value: u64, frozen: bool, locktime: Option<&str>) -> Utxo {
        Utxo {
            id: id.parse::<UtxoId>().unwrap(),
            address: format!("bcrt1q{}", jar),
            value,
            jar,
            confirmations: 1,
            frozen,
            locktime: locktime.map(|it| it.parse::<Lockdate>().unwrap()),
            label: None,
        }
    }

    #[test]
    fn test_balance_summary_arithmetic() {
        let now = Lockdate::to_timestamp(&"2009-01".parse().unwrap());
        let utxos = vec![
            utxo("a:0", 0, 100, false, None),
            utxo("b:0", 0, 50, true, None),
            // still locked until 2009-05
            utxo("c:0", 0, 25, false, Some("2009-05")),
            // expired bond counts as available
            utxo("d:0", 1, 10, false, Some("2008-01")),
        ];

        let summary = WalletBalanceSummary::from_utxos(&utxos, now);
        assert_eq!(summary.total_sats, 185);
        assert_eq!(summary.frozen_or_locked_sats, 75);
        assert_eq!(summary.available_sats, 110);

        let jar0 = summary.jar(0).unwrap();
        assert_eq!(jar0.total_sats, 175);
        assert_eq!(jar0.frozen_or_locked_sats, 75);
        assert_eq!(jar0.available_sats, 100);

        let jar1 = summary.jar(1).unwrap();
        assert_eq!(jar1.available_sats, 10);

        assert!(summary.jar(2).is_none());
    }

    #[test]
    fn test_utxos_by_jar_preserves_order() {
        let utxos = vec![
            utxo("a:0", 1, 1, false, None),
            utxo("b:0", 0, 1, false, None),
            utxo("c:0", 1, 1, false, None),
        ];
        let by_jar = utxos_by_jar(&utxos);
        assert_eq!(by_jar.len(), 2);
        let jar1_ids: Vec<_> = by_jar[&1].iter().map(|it| it.id.as_str()).collect();
        assert_eq!(jar1_ids, vec!["a:0", "c:0"]);
    }
}
