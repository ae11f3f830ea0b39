// 🔀 Debt Simplifier - greedy largest-creditor / largest-debtor matching
//
// Approximate min-cash-flow: repeatedly pay the biggest debt into the biggest
// credit until everything is within a cent of zero. Each round drives at
// least one person exactly to zero, so N people with non-zero balances are
// settled in at most N-1 transactions (zero-sum input). Not guaranteed to be
// globally minimal.
//
// Tie-break: balances live in a BTreeMap keyed by person id and a candidate
// only replaces the current best on a strictly better value, so among equal
// maxima (or minima) the smallest id wins.

use crate::balances::NetBalances;
use crate::entities::PersonId;
use crate::money;
use serde::{Deserialize, Serialize};

/// A directed obligation: `from` owes `to` the given amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    /// Debtor
    pub from: PersonId,

    /// Creditor
    pub to: PersonId,

    /// Positive amount
    pub amount: f64,
}

impl Debt {
    pub fn new(from: &str, to: &str, amount: f64) -> Self {
        Debt {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }
}

/// Settlement plan for the given balances
pub fn simplify_debts(balances: &NetBalances) -> Vec<Debt> {
    let mut working = balances.clone();
    let mut debts = Vec::new();

    while working.values().any(|amount| !money::is_zero(*amount)) {
        let Some((creditor, credit)) = max_balance(&working) else {
            break;
        };
        if money::is_zero(credit) || credit < 0.0 {
            break;
        }

        let Some((debtor, debt)) = min_balance(&working) else {
            break;
        };
        if money::is_zero(debt.abs()) {
            break;
        }

        let settle_amount = credit.min(debt.abs());
        debts.push(Debt::new(&debtor, &creditor, settle_amount));

        if let Some(balance) = working.get_mut(&creditor) {
            *balance -= settle_amount;
        }
        if let Some(balance) = working.get_mut(&debtor) {
            *balance += settle_amount;
        }
    }

    debts
}

/// Apply a plan to balances: each debtor pays, each creditor receives
///
/// Returns the residual balances (≈ 0 everywhere after a full plan).
pub fn apply_debts(balances: &NetBalances, debts: &[Debt]) -> NetBalances {
    let mut residual = balances.clone();
    for debt in debts {
        *residual.entry(debt.from.clone()).or_insert(0.0) += debt.amount;
        *residual.entry(debt.to.clone()).or_insert(0.0) -= debt.amount;
    }
    residual
}

fn max_balance(balances: &NetBalances) -> Option<(PersonId, f64)> {
    let mut best: Option<(&PersonId, f64)> = None;
    for (id, amount) in balances {
        match best {
            Some((_, current)) if *amount <= current => {}
            _ => best = Some((id, *amount)),
        }
    }
    best.map(|(id, amount)| (id.clone(), amount))
}

fn min_balance(balances: &NetBalances) -> Option<(PersonId, f64)> {
    let mut best: Option<(&PersonId, f64)> = None;
    for (id, amount) in balances {
        match best {
            Some((_, current)) if *amount >= current => {}
            _ => best = Some((id, *amount)),
        }
    }
    best.map(|(id, amount)| (id.clone(), amount))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balances::compute_net_balances;
    use crate::entities::Expense;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn balances(entries: &[(&str, f64)]) -> NetBalances {
        entries
            .iter()
            .map(|(id, amount)| (id.to_string(), *amount))
            .collect()
    }

    fn assert_settles(input: &NetBalances, debts: &[Debt]) {
        let residual = apply_debts(input, debts);
        for (id, amount) in &residual {
            assert!(money::is_zero(*amount), "{} left with {}", id, amount);
        }
    }

    #[test]
    fn test_dinner_scenario_two_payments_to_alice() {
        let input = balances(&[("alice", 100.0), ("bob", -50.0), ("carol", -50.0)]);

        let debts = simplify_debts(&input);

        assert_eq!(debts.len(), 2);
        assert!(debts.contains(&Debt::new("bob", "alice", 50.0)));
        assert!(debts.contains(&Debt::new("carol", "alice", 50.0)));
        assert_settles(&input, &debts);
    }

    #[test]
    fn test_tie_break_prefers_smallest_id() {
        let input = balances(&[("alice", 100.0), ("bob", -50.0), ("carol", -50.0)]);

        let debts = simplify_debts(&input);

        // bob and carol tie for minimum: bob (smaller id) goes first
        assert_eq!(debts[0], Debt::new("bob", "alice", 50.0));
        assert_eq!(debts[1], Debt::new("carol", "alice", 50.0));
    }

    #[test]
    fn test_three_way_cancellation() {
        // a paid 30 owes 10, b paid 10 owes 20, c paid 0 owes 10
        let input = balances(&[("a", 20.0), ("b", -10.0), ("c", -10.0)]);

        let debts = simplify_debts(&input);

        assert_eq!(debts.len(), 2);
        assert_settles(&input, &debts);
        assert!(debts.iter().all(|d| d.to == "a"));
    }

    #[test]
    fn test_routes_through_third_party() {
        // Chain a -> b -> c collapses into a single payment a -> c
        let input = balances(&[("a", -25.0), ("b", 0.0), ("c", 25.0)]);

        let debts = simplify_debts(&input);

        assert_eq!(debts, vec![Debt::new("a", "c", 25.0)]);
    }

    #[test]
    fn test_transaction_bound_n_minus_one() {
        let input = balances(&[
            ("a", 40.0),
            ("b", 25.5),
            ("c", -10.25),
            ("d", -30.0),
            ("e", -25.25),
        ]);

        let debts = simplify_debts(&input);

        assert!(debts.len() <= 4);
        assert_settles(&input, &debts);
        assert!(debts.iter().all(|d| d.amount > 0.0));
    }

    #[test]
    fn test_empty_and_already_settled() {
        assert!(simplify_debts(&NetBalances::new()).is_empty());
        assert!(simplify_debts(&balances(&[("a", 0.004), ("b", -0.004)])).is_empty());
    }

    #[test]
    fn test_non_zero_sum_input_terminates() {
        // Only creditors: nothing to match, must not loop forever
        let only_credit = balances(&[("a", 40.0), ("b", 10.0)]);
        assert!(simplify_debts(&only_credit).is_empty());

        // More owed than credited: pays what it can and stops
        let lopsided = balances(&[("a", 10.0), ("b", -30.0)]);
        let debts = simplify_debts(&lopsided);
        assert_eq!(debts, vec![Debt::new("b", "a", 10.0)]);
    }

    #[test]
    fn test_float_drift_from_many_expenses() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let ids: Vec<PersonId> = vec!["a".into(), "b".into(), "c".into()];
        let mut expenses = Vec::new();
        for i in 0..50 {
            let payer = ids[i % 3].clone();
            let mut paid = BTreeMap::new();
            paid.insert(payer, 10.1);
            expenses.push(Expense::new("Coffee", 10.1, date, paid, Expense::equal_shares(&ids, 10.1)));
        }

        let input = compute_net_balances(&expenses);
        let debts = simplify_debts(&input);

        assert!(debts.len() <= 2);
        assert_settles(&input, &debts);
    }
}
