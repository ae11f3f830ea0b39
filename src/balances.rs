// ⚖️ Balance Calculator - paid minus owed, per person
//
//   balance(p) = Σ paid_by[p] - Σ participants[p]   over all expenses
//
// Positive = is owed money, negative = owes money. The calculator never
// validates expenses: an expense with an empty payer or participant map still
// contributes its other side, which leaves a non-zero-summing balance set.

use crate::entities::{Expense, PersonId};
use crate::money;
use crate::settlement::Transaction;
use crate::simplify::Debt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Person id -> signed net balance
///
/// Ordered by id so iteration (and therefore simplification tie-breaks) is
/// reproducible.
pub type NetBalances = BTreeMap<PersonId, f64>;

/// Net balance of every person appearing in at least one expense
pub fn compute_net_balances(expenses: &[Expense]) -> NetBalances {
    let mut balances = NetBalances::new();

    for expense in expenses {
        for (payer, paid) in &expense.paid_by {
            *balances.entry(payer.clone()).or_insert(0.0) += paid;
        }
        for (participant, share) in &expense.participants {
            *balances.entry(participant.clone()).or_insert(0.0) -= share;
        }
    }

    balances
}

/// Net balances implied by the *unsettled* transactions
///
/// Debtor goes negative, creditor positive. Settled transactions are ignored.
pub fn balances_from_transactions(transactions: &[Transaction]) -> NetBalances {
    let mut balances = NetBalances::new();

    for tx in transactions.iter().filter(|tx| !tx.settled) {
        *balances.entry(tx.from.clone()).or_insert(0.0) -= tx.amount;
        *balances.entry(tx.to.clone()).or_insert(0.0) += tx.amount;
    }

    balances
}

/// Owed-to-me minus I-owe, over unsettled transactions
pub fn net_balance_for(transactions: &[Transaction], person_id: &str) -> f64 {
    let you_owe: f64 = transactions
        .iter()
        .filter(|tx| !tx.settled && tx.from == person_id)
        .map(|tx| tx.amount)
        .sum();
    let you_are_owed: f64 = transactions
        .iter()
        .filter(|tx| !tx.settled && tx.to == person_id)
        .map(|tx| tx.amount)
        .sum();
    you_are_owed - you_owe
}

/// Sum of all balances; ≈ 0 when every expense is internally consistent
pub fn total(balances: &NetBalances) -> f64 {
    balances.values().sum()
}

/// Balances with the epsilon band dropped (people who are settled up)
pub fn non_zero(balances: &NetBalances) -> NetBalances {
    balances
        .iter()
        .filter(|(_, amount)| !money::is_zero(**amount))
        .map(|(id, amount)| (id.clone(), *amount))
        .collect()
}

// ============================================================================
// PERSON SUMMARY (home screen)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub person_id: PersonId,

    /// Total others owe this person
    pub owed_to_them: f64,

    /// Total this person owes others
    pub they_owe: f64,

    /// Counterparty -> signed amount (positive: they owe this person,
    /// negative: this person owes them), largest magnitude first
    pub counterparties: Vec<(PersonId, f64)>,
}

impl PersonSummary {
    pub fn net(&self) -> f64 {
        self.owed_to_them - self.they_owe
    }
}

/// Summarize one person's position from their net balance and a plan
pub fn summarize_person(person_id: &str, balances: &NetBalances, plan: &[Debt]) -> PersonSummary {
    let balance = balances.get(person_id).copied().unwrap_or(0.0);

    let mut by_counterparty: BTreeMap<PersonId, f64> = BTreeMap::new();
    for debt in plan {
        if debt.from == person_id {
            *by_counterparty.entry(debt.to.clone()).or_insert(0.0) -= debt.amount;
        } else if debt.to == person_id {
            *by_counterparty.entry(debt.from.clone()).or_insert(0.0) += debt.amount;
        }
    }

    let mut counterparties: Vec<(PersonId, f64)> = by_counterparty
        .into_iter()
        .filter(|(_, amount)| !money::is_zero(*amount))
        .collect();
    counterparties.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(&b.0)));

    PersonSummary {
        person_id: person_id.to_string(),
        owed_to_them: if money::is_positive(balance) { balance } else { 0.0 },
        they_owe: if money::is_negative(balance) { balance.abs() } else { 0.0 },
        counterparties,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
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

    fn tx(from: &str, to: &str, amount: f64, settled: bool) -> Transaction {
        let mut tx = Transaction::new(from, to, amount, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        tx.settled = settled;
        tx
    }

    #[test]
    fn test_dinner_scenario_balances() {
        let dinner = expense(
            &[("alice", 150.0)],
            &[("alice", 50.0), ("bob", 50.0), ("carol", 50.0)],
        );

        let balances = compute_net_balances(&[dinner]);

        assert!(money::approx_eq(balances["alice"], 100.0));
        assert!(money::approx_eq(balances["bob"], -50.0));
        assert!(money::approx_eq(balances["carol"], -50.0));
        assert!(money::is_zero(total(&balances)));
    }

    #[test]
    fn test_multi_payer_custom_consumption() {
        // Paid 1000/1000/500/700, consumed 400/700/600/1000/500
        let group_dinner = expense(
            &[("ifaz", 1000.0), ("kalana_p", 1000.0), ("suhas", 500.0), ("sangeeth", 700.0)],
            &[
                ("ifaz", 400.0),
                ("kalana_p", 700.0),
                ("kalana_a", 600.0),
                ("sangeeth", 1000.0),
                ("suhas", 500.0),
            ],
        );

        let balances = compute_net_balances(&[group_dinner]);

        assert!(money::approx_eq(balances["ifaz"], 600.0));
        assert!(money::approx_eq(balances["kalana_p"], 300.0));
        assert!(money::is_zero(balances["suhas"]));
        assert!(money::approx_eq(balances["sangeeth"], -300.0));
        assert!(money::approx_eq(balances["kalana_a"], -600.0));
        assert!(money::is_zero(total(&balances)));
    }

    #[test]
    fn test_balances_accumulate_across_expenses() {
        let first = expense(&[("a", 30.0)], &[("a", 10.0), ("b", 10.0), ("c", 10.0)]);
        let second = expense(&[("b", 10.0)], &[("a", 5.0), ("b", 5.0)]);

        let balances = compute_net_balances(&[first.clone(), second.clone()]);
        let reversed = compute_net_balances(&[second, first]);

        assert!(money::approx_eq(balances["a"], 15.0));
        assert!(money::approx_eq(balances["b"], -5.0));
        assert!(money::approx_eq(balances["c"], -10.0));
        for (id, amount) in &balances {
            assert!(money::approx_eq(*amount, reversed[id]));
        }
    }

    #[test]
    fn test_malformed_expense_is_tolerated() {
        // No participants: the payer is credited, nobody is debited
        let broken = expense(&[("a", 40.0)], &[]);

        let balances = compute_net_balances(&[broken]);

        assert_eq!(balances.len(), 1);
        assert!(money::approx_eq(balances["a"], 40.0));
        assert!(!money::is_zero(total(&balances)));
    }

    #[test]
    fn test_empty_expenses_give_empty_balances() {
        assert!(compute_net_balances(&[]).is_empty());
    }

    #[test]
    fn test_balances_from_unsettled_transactions() {
        let transactions = vec![
            tx("bob", "alice", 50.0, false),
            tx("carol", "alice", 50.0, false),
            tx("carol", "bob", 20.0, true),
        ];

        let balances = balances_from_transactions(&transactions);

        assert!(money::approx_eq(balances["alice"], 100.0));
        assert!(money::approx_eq(balances["bob"], -50.0));
        assert!(money::approx_eq(balances["carol"], -50.0));
        assert!(money::approx_eq(net_balance_for(&transactions, "alice"), 100.0));
        assert!(money::approx_eq(net_balance_for(&transactions, "carol"), -50.0));
        assert_eq!(net_balance_for(&transactions, "nobody"), 0.0);
    }

    #[test]
    fn test_non_zero_drops_settled_people() {
        let balances = map(&[("a", 10.0), ("b", 0.004), ("c", -10.0)]);
        let filtered = non_zero(&balances);
        assert_eq!(filtered.len(), 2);
        assert!(!filtered.contains_key("b"));
    }

    #[test]
    fn test_summarize_person() {
        let balances = map(&[("me", 70.0), ("a", -50.0), ("b", -20.0)]);
        let plan = vec![
            Debt::new("a", "me", 50.0),
            Debt::new("b", "me", 20.0),
        ];

        let summary = summarize_person("me", &balances, &plan);

        assert!(money::approx_eq(summary.owed_to_them, 70.0));
        assert_eq!(summary.they_owe, 0.0);
        assert_eq!(summary.counterparties[0].0, "a");
        assert!(money::approx_eq(summary.counterparties[0].1, 50.0));
        assert!(money::approx_eq(summary.net(), 70.0));

        let debtor = summarize_person("b", &balances, &plan);
        assert!(money::approx_eq(debtor.they_owe, 20.0));
        assert!(money::approx_eq(debtor.counterparties[0].1, -20.0));
    }
}
