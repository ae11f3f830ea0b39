// 🧾 Expense Entity - who paid, who consumed
//
// An expense carries two independent maps keyed by person id:
//   paid_by      - how much each payer contributed
//   participants - each participant's share of the total
// Both should sum to `amount`, but this is NOT enforced: the balance engine
// accepts inconsistent expenses and `validate()` only reports the problems.

use crate::entities::person::PersonId;
use crate::money;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// EXPENSE CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Food,
    Transport,
    Shopping,
    Entertainment,
    Bills,
    Travel,
    #[default]
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 7] = [
        ExpenseCategory::Food,
        ExpenseCategory::Transport,
        ExpenseCategory::Shopping,
        ExpenseCategory::Entertainment,
        ExpenseCategory::Bills,
        ExpenseCategory::Travel,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Food => "FOOD",
            ExpenseCategory::Transport => "TRANSPORT",
            ExpenseCategory::Shopping => "SHOPPING",
            ExpenseCategory::Entertainment => "ENTERTAINMENT",
            ExpenseCategory::Bills => "BILLS",
            ExpenseCategory::Travel => "TRAVEL",
            ExpenseCategory::Other => "OTHER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExpenseCategory::Food => "Food & Drinks",
            ExpenseCategory::Transport => "Transport",
            ExpenseCategory::Shopping => "Shopping",
            ExpenseCategory::Entertainment => "Entertainment",
            ExpenseCategory::Bills => "Bills & Utilities",
            ExpenseCategory::Travel => "Travel",
            ExpenseCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unknown becomes `Other`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Ok(ExpenseCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == upper)
            .unwrap_or(ExpenseCategory::Other))
    }
}

// ============================================================================
// EXPENSE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub description: String,

    /// Total amount (positive)
    pub amount: f64,

    pub date: NaiveDate,

    #[serde(default)]
    pub category: ExpenseCategory,

    /// Payer id -> amount paid
    pub paid_by: BTreeMap<PersonId, f64>,

    /// Participant id -> share owed
    pub participants: BTreeMap<PersonId, f64>,
}

impl Expense {
    /// Create an expense with a fresh UUID
    pub fn new(
        description: &str,
        amount: f64,
        date: NaiveDate,
        paid_by: BTreeMap<PersonId, f64>,
        participants: BTreeMap<PersonId, f64>,
    ) -> Self {
        let description = if description.trim().is_empty() {
            "Expense"
        } else {
            description
        };

        Expense {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            amount,
            date,
            category: ExpenseCategory::Other,
            paid_by,
            participants,
        }
    }

    pub fn with_category(mut self, category: ExpenseCategory) -> Self {
        self.category = category;
        self
    }

    /// Split `total` evenly across `participants`
    ///
    /// Empty input gives an empty map (no division by zero).
    pub fn equal_shares(participants: &[PersonId], total: f64) -> BTreeMap<PersonId, f64> {
        if participants.is_empty() {
            return BTreeMap::new();
        }
        let share = total / participants.len() as f64;
        participants.iter().map(|id| (id.clone(), share)).collect()
    }

    pub fn total_paid(&self) -> f64 {
        self.paid_by.values().sum()
    }

    pub fn total_shares(&self) -> f64 {
        self.participants.values().sum()
    }

    /// Everyone who appears on either side, sorted by id
    pub fn people(&self) -> Vec<PersonId> {
        let mut ids: Vec<PersonId> = self
            .paid_by
            .keys()
            .chain(self.participants.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn involves(&self, person_id: &str) -> bool {
        self.paid_by.contains_key(person_id) || self.participants.contains_key(person_id)
    }

    /// Advisory consistency check. An empty result means the expense is valid.
    pub fn validate(&self) -> Vec<ExpenseIssue> {
        let mut issues = Vec::new();

        if !money::is_positive(self.amount) {
            issues.push(ExpenseIssue::NonPositiveAmount(self.amount));
        }
        if self.paid_by.is_empty() {
            issues.push(ExpenseIssue::NoPayers);
        }
        if self.participants.is_empty() {
            issues.push(ExpenseIssue::NoParticipants);
        }

        let paid = self.total_paid();
        if !self.paid_by.is_empty() && !money::approx_eq(paid, self.amount) {
            issues.push(ExpenseIssue::PaidMismatch {
                expected: self.amount,
                actual: paid,
            });
        }

        let shares = self.total_shares();
        if !self.participants.is_empty() && !money::approx_eq(shares, self.amount) {
            issues.push(ExpenseIssue::SharesMismatch {
                expected: self.amount,
                actual: shares,
            });
        }

        issues
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Content hash for import deduplication
    ///
    /// Covers date, description, amount and every split, but not `id`, so the
    /// same expense exported under another id still hashes the same.
    pub fn compute_content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}|{:.2}", self.date, self.description, self.amount));
        for (payer, paid) in &self.paid_by {
            hasher.update(format!("|p:{}={:.2}", payer, paid));
        }
        for (participant, share) in &self.participants {
            hasher.update(format!("|s:{}={:.2}", participant, share));
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// VALIDATION ISSUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpenseIssue {
    NonPositiveAmount(f64),
    NoPayers,
    NoParticipants,
    PaidMismatch { expected: f64, actual: f64 },
    SharesMismatch { expected: f64, actual: f64 },
}

impl fmt::Display for ExpenseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpenseIssue::NonPositiveAmount(amount) => {
                write!(f, "amount must be positive, got {:.2}", amount)
            }
            ExpenseIssue::NoPayers => write!(f, "nobody paid for this expense"),
            ExpenseIssue::NoParticipants => write!(f, "nobody shares this expense"),
            ExpenseIssue::PaidMismatch { expected, actual } => write!(
                f,
                "payers contributed {:.2} but the total is {:.2}",
                actual, expected
            ),
            ExpenseIssue::SharesMismatch { expected, actual } => write!(
                f,
                "shares add up to {:.2} but the total is {:.2}",
                actual, expected
            ),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
