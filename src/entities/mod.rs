// Entity Models
//
// Each entity has a stable identity (id) that never changes. Balances and
// transactions reference people by id only; names are looked up for display.

pub mod person;
pub mod expense;
pub mod group;

pub use person::{Person, PersonId, PersonRegistry, CURRENT_USER_ID};
pub use expense::{Expense, ExpenseCategory, ExpenseIssue};
pub use group::{Group, GroupRegistry};
