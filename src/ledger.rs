// 📒 Pairwise Debt Ledger - "who owes whom", netted only within each pair
//
// Two steps:
//   1. Decompose every expense into directed (debtor, creditor, amount)
//      obligations.
//   2. Net the obligations per pair of people: A→B 50 and B→A 30 collapse
//      into A→B 20. Unlike the simplifier this never routes a debt through a
//      third person.
//
// Decomposition policy (one policy, used everywhere):
//   Each participant whose share exceeds what they paid owes the difference.
//   That amount is split across the expense's net contributors in proportion
//   to their net contribution `paid - share`, not to the raw amount paid.
//   The two differ when a payer is also a participant: paying 100 toward
//   your own share of 100 contributes nothing, so you are owed nothing.
//   With a single payer this is exactly "every other participant owes the
//   payer their full share". For a consistent expense each person's ledger
//   total equals their net balance.

use crate::entities::{Expense, PersonId};
use crate::money;
use crate::settlement::Transaction;
use crate::simplify::Debt;
use std::collections::BTreeMap;

/// Directed obligation produced by decomposition (same shape as a debt)
pub type Obligation = Debt;

// ============================================================================
// DECOMPOSITION
// ============================================================================

/// Obligations implied by a single expense
pub fn decompose_expense(expense: &Expense) -> Vec<Obligation> {
    let mut creditors: Vec<(PersonId, f64)> = Vec::new();
    let mut debtors: Vec<(PersonId, f64)> = Vec::new();

    for person in expense.people() {
        let paid = expense.paid_by.get(&person).copied().unwrap_or(0.0);
        let share = expense.participants.get(&person).copied().unwrap_or(0.0);
        let net = paid - share;

        if money::is_positive(net) {
            creditors.push((person, net));
        } else if money::is_negative(net) {
            debtors.push((person, -net));
        }
    }

    let total_credit: f64 = creditors.iter().map(|(_, credit)| credit).sum();
    if money::is_zero(total_credit) {
        return Vec::new();
    }

    let mut obligations = Vec::new();
    for (debtor, owed) in &debtors {
        for (creditor, credit) in &creditors {
            let amount = owed * credit / total_credit;
            if amount > 0.0 {
                obligations.push(Debt::new(debtor, creditor, amount));
            }
        }
    }

    obligations
}

/// Obligations for a list of expenses, in expense order
pub fn decompose_obligations(expenses: &[Expense]) -> Vec<Obligation> {
    expenses.iter().flat_map(decompose_expense).collect()
}

// ============================================================================
// PAIRWISE NETTING
// ============================================================================

/// Net obligations per pair, largest first
pub fn compute_pairwise_ledger(obligations: &[Obligation]) -> Vec<Debt> {
    // (debtor, creditor) -> amount; at most one direction per pair is present
    let mut debt_map: BTreeMap<(PersonId, PersonId), f64> = BTreeMap::new();

    for obligation in obligations {
        if obligation.from == obligation.to {
            continue;
        }

        // A negative obligation is the same debt in the other direction
        let (from, to, amount) = if obligation.amount < 0.0 {
            (&obligation.to, &obligation.from, -obligation.amount)
        } else {
            (&obligation.from, &obligation.to, obligation.amount)
        };
        if amount <= 0.0 || amount.is_nan() {
            continue;
        }

        let key = (from.clone(), to.clone());
        let reverse_key = (to.clone(), from.clone());

        if let Some(existing) = debt_map.get(&reverse_key).copied() {
            let remaining = existing - amount;
            if money::is_zero(remaining) {
                debt_map.remove(&reverse_key);
            } else if remaining > 0.0 {
                debt_map.insert(reverse_key, remaining);
            } else {
                debt_map.remove(&reverse_key);
                debt_map.insert(key, remaining.abs());
            }
        } else {
            *debt_map.entry(key).or_insert(0.0) += amount;
        }
    }

    // Sub-cent crumbs from proportional splits are not worth showing
    let mut debts: Vec<Debt> = debt_map
        .into_iter()
        .filter(|(_, amount)| !money::is_zero(*amount))
        .map(|((from, to), amount)| Debt { from, to, amount })
        .collect();

    debts.sort_by(|a, b| {
        b.amount
            .total_cmp(&a.amount)
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });

    debts
}

/// Ledger straight from expenses
pub fn pairwise_debts(expenses: &[Expense]) -> Vec<Debt> {
    compute_pairwise_ledger(&decompose_obligations(expenses))
}

/// Ledger over the unsettled transactions ("who to pay")
pub fn ledger_from_transactions(transactions: &[Transaction]) -> Vec<Debt> {
    let obligations: Vec<Obligation> = transactions
        .iter()
        .filter(|tx| !tx.settled)
        .map(|tx| Debt::new(&tx.from, &tx.to, tx.amount))
        .collect();
    compute_pairwise_ledger(&obligations)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::compute_net_balances;
    use chrono::NaiveDate;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<PersonId, f64> {
        entries
            .iter()
            .map(|(id, amount)| (id.to_string(), *amount))
            .collect()
    }

    fn expense(paid: &[(&str, f64)], shares: &[(&str, f64)]) -> Expense {
        let amount = paid.iter().map(|(_, a)| a).sum();
        Expense::new(
            "Test expense",
            amount,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            map(paid),
            map(shares),
        )
    }

    fn find<'a>(debts: &'a [Debt], from: &str, to: &str) -> Option<&'a Debt> {
        debts.iter().find(|d| d.from == from && d.to == to)
    }

    #[test]
    fn test_opposite_debts_net_within_pair() {
        let obligations = vec![Debt::new("a", "b", 50.0), Debt::new("b", "a", 30.0)];

        let ledger = compute_pairwise_ledger(&obligations);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].from, "a");
        assert_eq!(ledger[0].to, "b");
        assert!(money::approx_eq(ledger[0].amount, 20.0));
    }

    #[test]
    fn test_netting_flips_direction() {
        let obligations = vec![Debt::new("a", "b", 30.0), Debt::new("b", "a", 50.0)];

        let ledger = compute_pairwise_ledger(&obligations);

        assert_eq!(ledger.len(), 1);
        assert_eq!((ledger[0].from.as_str(), ledger[0].to.as_str()), ("b", "a"));
        assert!(money::approx_eq(ledger[0].amount, 20.0));
    }

    #[test]
    fn test_netting_to_zero_removes_pair() {
        let obligations = vec![Debt::new("a", "b", 30.0), Debt::new("b", "a", 29.995)];
        assert!(compute_pairwise_ledger(&obligations).is_empty());
    }

    #[test]
    fn test_same_direction_accumulates_and_sorts_desc() {
        let obligations = vec![
            Debt::new("a", "b", 10.0),
            Debt::new("c", "b", 40.0),
            Debt::new("a", "b", 15.0),
        ];

        let ledger = compute_pairwise_ledger(&obligations);

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0], Debt::new("c", "b", 40.0));
        assert!(money::approx_eq(ledger[1].amount, 25.0));
    }

    #[test]
    fn test_pairwise_does_not_route_through_third_party() {
        // a owes b, b owes c: the ledger keeps both, the simplifier would not
        let obligations = vec![Debt::new("a", "b", 25.0), Debt::new("b", "c", 25.0)];

        let ledger = compute_pairwise_ledger(&obligations);

        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_self_and_zero_obligations_ignored() {
        let obligations = vec![
            Debt::new("a", "a", 25.0),
            Debt::new("a", "b", 0.0),
            Debt::new("c", "d", 0.004),
        ];
        assert!(compute_pairwise_ledger(&obligations).is_empty());
    }

    #[test]
    fn test_negative_obligation_counts_in_reverse() {
        let obligations = vec![
            Debt::new("a", "b", 50.0),
            Debt::new("a", "b", -20.0),
            Debt::new("c", "d", -0.0),
        ];

        let ledger = compute_pairwise_ledger(&obligations);

        assert_eq!(ledger.len(), 1);
        assert_eq!((ledger[0].from.as_str(), ledger[0].to.as_str()), ("a", "b"));
        assert!(money::approx_eq(ledger[0].amount, 30.0));
    }

    #[test]
    fn test_single_payer_decomposition() {
        let dinner = expense(
            &[("alice", 150.0)],
            &[("alice", 50.0), ("bob", 50.0), ("carol", 50.0)],
        );

        let obligations = decompose_expense(&dinner);

        assert_eq!(obligations.len(), 2);
        assert!(money::approx_eq(find(&obligations, "bob", "alice").unwrap().amount, 50.0));
        assert!(money::approx_eq(find(&obligations, "carol", "alice").unwrap().amount, 50.0));
    }

    #[test]
    fn test_multi_payer_proportional_decomposition() {
        // Bus ticket: 1000 split five ways, two people paid 500 each
        let bus = expense(
            &[("ifaz", 500.0), ("kalana_a", 500.0)],
            &[
                ("ifaz", 200.0),
                ("kalana_a", 200.0),
                ("kalana_p", 200.0),
                ("suhas", 200.0),
                ("sangeeth", 200.0),
            ],
        );

        let obligations = decompose_expense(&bus);

        // Each non-payer owes 100 to each payer
        assert_eq!(obligations.len(), 6);
        for debtor in ["kalana_p", "suhas", "sangeeth"] {
            assert!(money::approx_eq(find(&obligations, debtor, "ifaz").unwrap().amount, 100.0));
            assert!(money::approx_eq(find(&obligations, debtor, "kalana_a").unwrap().amount, 100.0));
        }
    }

    #[test]
    fn test_weighting_uses_net_contribution_not_amount_paid() {
        // b paid 100 but also consumed 100, so only a is owed anything
        let shared = expense(
            &[("a", 100.0), ("b", 100.0)],
            &[("a", 20.0), ("b", 100.0), ("c", 80.0)],
        );

        let obligations = decompose_expense(&shared);

        assert_eq!(obligations.len(), 1);
        assert!(money::approx_eq(find(&obligations, "c", "a").unwrap().amount, 80.0));
        assert!(find(&obligations, "c", "b").is_none());
    }

    #[test]
    fn test_ledger_totals_match_net_balances() {
        let expenses = vec![
            expense(
                &[("a", 100.0), ("b", 100.0)],
                &[("a", 20.0), ("b", 100.0), ("c", 80.0)],
            ),
            expense(&[("c", 60.0)], &[("a", 30.0), ("c", 30.0)]),
        ];

        let balances = compute_net_balances(&expenses);
        let ledger = pairwise_debts(&expenses);

        let mut from_ledger: BTreeMap<PersonId, f64> = BTreeMap::new();
        for debt in &ledger {
            *from_ledger.entry(debt.from.clone()).or_insert(0.0) -= debt.amount;
            *from_ledger.entry(debt.to.clone()).or_insert(0.0) += debt.amount;
        }

        for (id, balance) in &balances {
            let ledger_total = from_ledger.get(id).copied().unwrap_or(0.0);
            assert!(money::approx_eq(*balance, ledger_total), "{}: {} vs {}", id, balance, ledger_total);
        }
    }

    #[test]
    fn test_expense_with_no_payers_yields_no_obligations() {
        let broken = expense(&[], &[("a", 10.0), ("b", 10.0)]);
        assert!(decompose_expense(&broken).is_empty());
    }

    #[test]
    fn test_ledger_from_transactions_skips_settled() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut settled = Transaction::new("a", "b", 50.0, date);
        settled.settled = true;
        let transactions = vec![
            Transaction::new("a", "b", 50.0, date),
            Transaction::new("b", "a", 30.0, date),
            settled,
        ];

        let ledger = ledger_from_transactions(&transactions);

        assert_eq!(ledger.len(), 1);
        assert!(money::approx_eq(ledger[0].amount, 20.0));
    }
}
