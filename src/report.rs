// 🧾 Plain-text report: expenses, net balances, simplified settlements

use crate::balances::NetBalances;
use crate::entities::{Expense, PersonRegistry};
use crate::money;
use crate::simplify::Debt;

pub const CURRENCY: &str = "Rs.";

const RULE_WIDTH: usize = 60;

fn amount(value: f64) -> String {
    format!("{}{:.2}", CURRENCY, value)
}

/// Render a report block for the given expenses, balances and plan
pub fn render_report(
    title: &str,
    expenses: &[Expense],
    people: &PersonRegistry,
    balances: &NetBalances,
    debts: &[Debt],
) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines: Vec<String> = vec![String::new(), rule.clone(), format!("  {}", title), rule.clone()];

    for expense in expenses {
        lines.push(String::new());
        lines.push("📝 EXPENSE DETAILS:".to_string());
        lines.push(format!("   Description: {}", expense.description));
        lines.push(format!("   Date: {}", expense.date));
        lines.push(format!("   Category: {}", expense.category.display_name()));
        lines.push(format!("   Total Amount: {}", amount(expense.amount)));

        lines.push(String::new());
        lines.push("💰 CONTRIBUTIONS (Who Paid):".to_string());
        for (payer, paid) in &expense.paid_by {
            lines.push(format!("   {}: {}", people.display_name(payer), amount(*paid)));
        }

        lines.push(String::new());
        lines.push("🍽️  SHARES (What Each Person Owes):".to_string());
        for (participant, share) in &expense.participants {
            lines.push(format!("   {}: {}", people.display_name(participant), amount(*share)));
        }

        for issue in expense.validate() {
            lines.push(format!("   ⚠️  {}", issue));
        }
    }

    lines.push(String::new());
    lines.push("📊 NET BALANCES:".to_string());
    let mut sorted: Vec<(&String, f64)> = balances.iter().map(|(id, b)| (id, *b)).collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (id, balance) in sorted {
        let name = people.display_name(id);
        if money::is_positive(balance) {
            lines.push(format!("   {}: +{} (should receive)", name, amount(balance)));
        } else if money::is_negative(balance) {
            lines.push(format!("   {}: -{} (should pay)", name, amount(balance.abs())));
        } else {
            lines.push(format!("   {}: {} (settled)", name, amount(0.0)));
        }
    }

    lines.push(String::new());
    lines.push("✅ SIMPLIFIED SETTLEMENTS:".to_string());
    if debts.is_empty() {
        lines.push("   All balanced! No settlements needed.".to_string());
    } else {
        for debt in debts {
            lines.push(format!(
                "   {} should pay {}: {}",
                people.display_name(&debt.from),
                people.display_name(&debt.to),
                amount(debt.amount)
            ));
        }
    }

    lines.push(String::new());
    lines.push(rule);
    lines.push(String::new());

    lines.join("\n")
}
