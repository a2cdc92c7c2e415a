//! UTXO data structures and pure set utilities
//!
//! The wallet backend owns the UTXO set; this crate only reads snapshots of
//! it and toggles the `frozen` flag through API calls. The helpers in
//! [`utxo_set`] are the pure building blocks of the freeze-coordination
//! protocol: set difference by id, all-frozen checks, and the
//! fidelity-bond/lock predicates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data_structures::lockdate::{Lockdate, Timestamp};

/// Identifier of a spendable output: `txid:vout`
///
/// The id is the sole key of a UTXO. Two UTXOs with different addresses
/// but the same id are the same output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtxoId(String);

impl UtxoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UtxoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((txid, vout)) if !txid.is_empty() && vout.parse::<u32>().is_ok() => {
                Ok(UtxoId(s.to_string()))
            }
            _ => Err(format!("invalid utxo id: {:?}", s)),
        }
    }
}

impl From<&UtxoId> for UtxoId {
    fn from(value: &UtxoId) -> Self {
        value.clone()
    }
}

/// A spendable output as reported by the wallet backend
///
/// `frozen` and `locktime` are independent: a fidelity bond is identified
/// by the presence of `locktime`, never by its freeze state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Globally unique outpoint, `txid:vout`
    #[serde(rename = "utxo")]
    pub id: UtxoId,
    pub address: String,
    /// Value in satoshis
    pub value: u64,
    /// Jar (mixdepth/account) index this output belongs to
    #[serde(rename = "mixdepth")]
    pub jar: u32,
    pub confirmations: u32,
    pub frozen: bool,
    /// Unlock date; present only for time-locked (fidelity bond) outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locktime: Option<Lockdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Pure functions over collections of [`Utxo`]s
pub mod utxo_set {
    use super::*;

    /// True iff both refer to the same outpoint. Address is explicitly not
    /// compared; the id is the sole key.
    pub fn is_equal(lhs: &Utxo, rhs: &Utxo) -> bool {
        lhs.id == rhs.id
    }

    /// Membership by id
    pub fn is_in_list(utxo: &Utxo, list: &[Utxo]) -> bool {
        list.iter().any(|it| is_equal(it, utxo))
    }

    /// `all_in_jar` minus every element matching (by id) an element of
    /// `selected`, order preserved from `all_in_jar`.
    ///
    /// These are the sibling outputs a saga must freeze so that a
    /// subsequent sweep selects exactly the `selected` coins.
    pub fn utxos_to_freeze(all_in_jar: &[Utxo], selected: &[Utxo]) -> Vec<Utxo> {
        all_in_jar
            .iter()
            .filter(|utxo| !is_in_list(utxo, selected))
            .cloned()
            .collect()
    }

    /// True iff the list is empty or every element is frozen
    pub fn all_are_frozen(utxos: &[Utxo]) -> bool {
        utxos.iter().all(|utxo| utxo.frozen)
    }

    /// True iff the output is time-locked, i.e. a fidelity bond
    pub fn is_fidelity_bond(utxo: &Utxo) -> bool {
        utxo.locktime.is_some()
    }

    /// True iff the output is a fidelity bond whose unlock date lies in
    /// the future. An expired bond is not locked: it is spendable by the
    /// usual consensus rule.
    pub fn is_locked(utxo: &Utxo, now_ms: Timestamp) -> bool {
        match &utxo.locktime {
            Some(lockdate) => lockdate.to_timestamp() > now_ms,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::utxo_set::*;
    use super::*;

    pub(crate) fn test_utxo(id: &str, jar: u32, frozen: bool) -> Utxo {
        Utxo {
            id: id.parse().expect("valid utxo id"),
            address: format!("bcrt1q{}", id.replace(':', "")),
            value: 100_000_000,
            jar,
            confirmations: 6,
            frozen,
            locktime: None,
            label: None,
        }
    }

    #[test]
    fn test_utxo_id_parsing() {
        assert!("abc123:0".parse::<UtxoId>().is_ok());
        assert!("abc123:17".parse::<UtxoId>().is_ok());
        assert!(":0".parse::<UtxoId>().is_err());
        assert!("abc123".parse::<UtxoId>().is_err());
        assert!("abc123:".parse::<UtxoId>().is_err());
        assert!("abc123:x".parse::<UtxoId>().is_err());
    }

    #[test]
    fn test_is_equal_compares_id_only() {
        let a = test_utxo("foo:0", 0, false);
        let mut b = test_utxo("foo:0", 3, true);
        b.address = "completely different".to_string();
        b.value = 1;
        assert!(is_equal(&a, &b));

        let c = test_utxo("foo:1", 0, false);
        assert!(!is_equal(&a, &c));
    }

    #[test]
    fn test_utxos_to_freeze_is_set_difference_by_id() {
        let all = vec![
            test_utxo("a:0", 0, false),
            test_utxo("b:0", 0, false),
            test_utxo("c:0", 0, true),
        ];
        let selected = vec![test_utxo("b:0", 0, false)];

        let to_freeze = utxos_to_freeze(&all, &selected);
        let ids: Vec<_> = to_freeze.iter().map(|it| it.id.as_str()).collect();
        assert_eq!(ids, vec!["a:0", "c:0"]);

        // empty selection leaves everything to freeze, order preserved
        let to_freeze = utxos_to_freeze(&all, &[]);
        assert_eq!(to_freeze, all);

        // selecting everything leaves nothing
        assert!(utxos_to_freeze(&all, &all).is_empty());
    }

    #[test]
    fn test_all_are_frozen() {
        assert!(all_are_frozen(&[]));
        assert!(all_are_frozen(&[
            test_utxo("a:0", 0, true),
            test_utxo("b:0", 0, true)
        ]));
        assert!(!all_are_frozen(&[
            test_utxo("a:0", 0, true),
            test_utxo("b:0", 0, false)
        ]));
    }

    #[test]
    fn test_is_fidelity_bond() {
        let mut utxo = test_utxo("a:0", 0, false);
        assert!(!is_fidelity_bond(&utxo));

        utxo.locktime = Some("2009-05".parse().unwrap());
        assert!(is_fidelity_bond(&utxo));

        // freeze state has no bearing on bond detection
        utxo.frozen = true;
        assert!(is_fidelity_bond(&utxo));
    }

    #[test]
    fn test_is_locked_boundary() {
        let lockdate: Lockdate = "2009-05".parse().unwrap();
        let unlock_ms = lockdate.to_timestamp();

        let mut bond = test_utxo("a:0", 0, false);
        bond.locktime = Some(lockdate);

        assert!(is_locked(&bond, unlock_ms - 1));
        assert!(!is_locked(&bond, unlock_ms + 1));
        assert!(!is_locked(&bond, unlock_ms));

        let plain = test_utxo("b:0", 0, false);
        assert!(!is_locked(&plain, i64::MIN));
        assert!(!is_locked(&plain, i64::MAX));
    }
}
