// ✅ Settlement Recorder - transactions, regeneration, settling
//
// The transaction list is a cache of the settlement plan: it can always be
// rebuilt from the expenses. The single exception is settled transactions,
// which are history and are carried forward verbatim on every rebuild.
// Unsettled transactions are replaced wholesale, never merged or diffed.

use crate::balances::compute_net_balances;
use crate::entities::{Expense, PersonId};
use crate::simplify::{simplify_debts, Debt};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,

    /// Debtor
    pub from: PersonId,

    /// Creditor
    pub to: PersonId,

    /// Positive amount
    pub amount: f64,

    pub date: NaiveDate,

    #[serde(default)]
    pub settled: bool,
}

impl Transaction {
    /// New unsettled transaction with a fresh UUID
    pub fn new(from: &str, to: &str, amount: f64, date: NaiveDate) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            date,
            settled: false,
        }
    }

    pub fn from_debt(debt: &Debt, date: NaiveDate) -> Self {
        Self::new(&debt.from, &debt.to, debt.amount, date)
    }

    pub fn as_debt(&self) -> Debt {
        Debt::new(&self.from, &self.to, self.amount)
    }

    /// Exactly this directed pair
    pub fn is_between(&self, debtor_id: &str, creditor_id: &str) -> bool {
        self.from == debtor_id && self.to == creditor_id
    }

    pub fn involves(&self, person_id: &str) -> bool {
        self.from == person_id || self.to == person_id
    }
}

// ============================================================================
// REGENERATION
// ============================================================================

/// Fresh plan from `expenses` plus every settled transaction from `previous`
///
/// New transactions are dated today (local time).
pub fn regenerate_transactions(expenses: &[Expense], previous: &[Transaction]) -> Vec<Transaction> {
    regenerate_transactions_on(expenses, previous, Local::now().date_naive())
}

/// Same as [`regenerate_transactions`] with an explicit date for new entries
pub fn regenerate_transactions_on(
    expenses: &[Expense],
    previous: &[Transaction],
    date: NaiveDate,
) -> Vec<Transaction> {
    let balances = compute_net_balances(expenses);
    let mut transactions: Vec<Transaction> = simplify_debts(&balances)
        .iter()
        .map(|debt| Transaction::from_debt(debt, date))
        .collect();

    transactions.extend(settled(previous));
    transactions
}

// ============================================================================
// SETTLING
// ============================================================================

/// Mark one transaction settled. Unknown ids and already-settled
/// transactions leave the list unchanged.
pub fn settle(transactions: &[Transaction], id: &str) -> Vec<Transaction> {
    transactions
        .iter()
        .map(|tx| {
            if tx.id == id {
                Transaction {
                    settled: true,
                    ..tx.clone()
                }
            } else {
                tx.clone()
            }
        })
        .collect()
}

/// Mark every unsettled `debtor -> creditor` transaction settled
pub fn settle_by_pair(transactions: &[Transaction], debtor_id: &str, creditor_id: &str) -> Vec<Transaction> {
    transactions
        .iter()
        .map(|tx| {
            if !tx.settled && tx.is_between(debtor_id, creditor_id) {
                Transaction {
                    settled: true,
                    ..tx.clone()
                }
            } else {
                tx.clone()
            }
        })
        .collect()
}

/// Unsettled transactions, in list order
pub fn pending(transactions: &[Transaction]) -> Vec<Transaction> {
    transactions.iter().filter(|tx| !tx.settled).cloned().collect()
}

/// Settled transactions, in list order, each id at most once
pub fn settled(transactions: &[Transaction]) -> Vec<Transaction> {
    let mut seen = HashSet::new();
    transactions
        .iter()
        .filter(|tx| tx.settled && seen.insert(tx.id.clone()))
        .cloned()
        .collect()
}

pub fn find<'a>(transactions: &'a [Transaction], id: &str) -> Option<&'a Transaction> {
    transactions.iter().find(|tx| tx.id == id)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money;
    use std::collections::BTreeMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
    }

    fn dinner() -> Expense {
        let mut paid = BTreeMap::new();
        paid.insert("alice".to_string(), 150.0);
        let ids: Vec<PersonId> = vec!["alice".into(), "bob".into(), "carol".into()];
        Expense::new("Dinner", 150.0, date(), paid, Expense::equal_shares(&ids, 150.0))
    }

    #[test]
    fn test_regenerate_from_scratch() {
        let transactions = regenerate_transactions_on(&[dinner()], &[], date());

        assert_eq!(transactions.len(), 2);
        assert!(transactions.iter().all(|tx| !tx.settled && tx.to == "alice"));
        assert!(transactions.iter().all(|tx| money::approx_eq(tx.amount, 50.0)));
        assert!(transactions.iter().all(|tx| tx.date == date()));
    }

    #[test]
    fn test_settle_is_idempotent() {
        let transactions = regenerate_transactions_on(&[dinner()], &[], date());
        let id = transactions[0].id.clone();

        let once = settle(&transactions, &id);
        let twice = settle(&once, &id);

        assert_eq!(once, twice);
        assert!(find(&once, &id).unwrap().settled);
        assert!(!once[1].settled);
    }

    #[test]
    fn test_settle_unknown_id_is_noop() {
        let transactions = regenerate_transactions_on(&[dinner()], &[], date());
        assert_eq!(settle(&transactions, "missing"), transactions);
    }

    #[test]
    fn test_settled_survive_regeneration_exactly_once() {
        let expenses = vec![dinner()];
        let first = regenerate_transactions_on(&expenses, &[], date());
        let settled_id = first[0].id.clone();

        let after_settle = settle(&first, &settled_id);
        let second = regenerate_transactions_on(&expenses, &after_settle, date());
        let third = regenerate_transactions_on(&expenses, &second, date());

        for list in [&second, &third] {
            let matches: Vec<&Transaction> = list.iter().filter(|tx| tx.id == settled_id).collect();
            assert_eq!(matches.len(), 1);
            assert!(matches[0].settled);
            assert_eq!(matches[0], find(&after_settle, &settled_id).unwrap());
        }

        // Unsettled part is fully recomputed: new ids every time
        let first_pending: HashSet<String> = pending(&first).into_iter().map(|tx| tx.id).collect();
        assert!(pending(&third).iter().all(|tx| !first_pending.contains(&tx.id)));
        assert_eq!(pending(&third).len(), 2);
    }

    #[test]
    fn test_regenerate_with_no_expenses_keeps_only_settled() {
        let first = regenerate_transactions_on(&[dinner()], &[], date());
        let after_settle = settle(&first, &first[1].id);

        let regenerated = regenerate_transactions_on(&[], &after_settle, date());

        assert_eq!(regenerated.len(), 1);
        assert!(regenerated[0].settled);
    }

    #[test]
    fn test_settle_by_pair_only_touches_exact_direction() {
        let transactions = vec![
            Transaction::new("bob", "alice", 20.0, date()),
            Transaction::new("bob", "alice", 30.0, date()),
            Transaction::new("alice", "bob", 5.0, date()),
            Transaction::new("carol", "alice", 50.0, date()),
        ];

        let result = settle_by_pair(&transactions, "bob", "alice");

        assert!(result[0].settled);
        assert!(result[1].settled);
        assert!(!result[2].settled);
        assert!(!result[3].settled);
        assert_eq!(settle_by_pair(&result, "bob", "alice"), result);
    }

    #[test]
    fn test_settled_helper_dedupes_ids() {
        let mut tx = Transaction::new("a", "b", 10.0, date());
        tx.settled = true;
        let list = vec![tx.clone(), tx];
        assert_eq!(settled(&list).len(), 1);
    }
}
