// Money Splitter - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod money;          // Epsilon comparator
pub mod entities;       // Person, Expense, Group
pub mod balances;       // Net balance calculator
pub mod simplify;       // Debt simplifier
pub mod ledger;         // Pairwise "who owes whom"
pub mod settlement;     // Transactions, regeneration, settling
pub mod book;           // Shared snapshot state
pub mod db;             // SQLite persistence + CSV import
pub mod report;         // Plain-text report

// Re-export commonly used types
pub use money::{is_negative, is_positive, is_zero, EPSILON};
pub use entities::{
    Expense, ExpenseCategory, ExpenseIssue,
    Group, GroupRegistry,
    Person, PersonId, PersonRegistry, CURRENT_USER_ID,
};
pub use balances::{compute_net_balances, net_balance_for, NetBalances, PersonSummary};
pub use simplify::{simplify_debts, Debt};
pub use ledger::{compute_pairwise_ledger, decompose_obligations, pairwise_debts, Obligation};
pub use settlement::{regenerate_transactions, settle, settle_by_pair, Transaction};
pub use book::{Snapshot, SplitBook};
pub use db::{load_csv, open_database, setup_database, CsvImport, Event};
pub use report::render_report;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
