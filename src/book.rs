// 📚 SplitBook - the shared state behind every interface
//
// People, groups, expenses and the transaction list live in one immutable
// `Snapshot` behind a `RwLock<Arc<_>>`. Every mutation clones the current
// snapshot, edits the clone, persists it (when backed by SQLite) inside one
// SQL transaction and swaps it in while still holding the write lock. The
// SQL transaction commits only when the whole mutation succeeds. Readers grab the `Arc` and never see
// a half-applied update. Subscribers receive each new snapshot over a channel.

use crate::balances::{compute_net_balances, summarize_person, NetBalances, PersonSummary};
use crate::db::{self, CsvImport, Event};
use crate::entities::{Expense, Group, GroupRegistry, Person, PersonRegistry, CURRENT_USER_ID};
use crate::ledger;
use crate::settlement::{self, Transaction};
use crate::simplify::Debt;
use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction as SqlTransaction};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub people: PersonRegistry,
    pub groups: GroupRegistry,
    pub expenses: Vec<Expense>,
    pub transactions: Vec<Transaction>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            people: PersonRegistry::with_current_user(),
            groups: GroupRegistry::new(),
            expenses: Vec::new(),
            transactions: Vec::new(),
        }
    }
}

impl Snapshot {
    pub fn net_balances(&self) -> NetBalances {
        compute_net_balances(&self.expenses)
    }

    /// Unsettled transactions: the current plan
    pub fn settlement_plan(&self) -> Vec<Transaction> {
        settlement::pending(&self.transactions)
    }

    /// Who owes whom, per pair, from the expenses themselves
    pub fn pairwise_debts(&self) -> Vec<Debt> {
        ledger::pairwise_debts(&self.expenses)
    }

    pub fn person_summary(&self, person_id: &str) -> PersonSummary {
        let plan: Vec<Debt> = self.settlement_plan().iter().map(Transaction::as_debt).collect();
        summarize_person(person_id, &self.net_balances(), &plan)
    }

    fn regenerate(&mut self) {
        self.transactions = settlement::regenerate_transactions(&self.expenses, &self.transactions);
    }
}

// ============================================================================
// BOOK
// ============================================================================

pub struct SplitBook {
    state: RwLock<Arc<Snapshot>>,
    conn: Option<Mutex<Connection>>,
    subscribers: Mutex<Vec<Sender<Arc<Snapshot>>>>,
    actor: String,
}

impl Default for SplitBook {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl SplitBook {
    /// Book without persistence
    pub fn in_memory() -> Self {
        SplitBook {
            state: RwLock::new(Arc::new(Snapshot::default())),
            conn: None,
            subscribers: Mutex::new(Vec::new()),
            actor: CURRENT_USER_ID.to_string(),
        }
    }

    /// Load a book from SQLite; every later mutation is written through
    pub fn open(conn: Connection) -> Result<Self> {
        db::setup_database(&conn)?;

        let mut people = PersonRegistry::new();
        for person in db::get_all_people(&conn).context("Failed to load people")? {
            people.upsert(person);
        }
        if !people.contains(CURRENT_USER_ID) {
            let me = Person::current_user();
            db::insert_person(&conn, &me)?;
            people.upsert(me);
        }

        let mut groups = GroupRegistry::new();
        for group in db::get_all_groups(&conn).context("Failed to load groups")? {
            groups.upsert(group);
        }

        let expenses = db::get_all_expenses(&conn).context("Failed to load expenses")?;
        let mut transactions = db::get_all_payments(&conn).context("Failed to load payments")?;

        // Payments cache never written (fresh import): build it now
        if transactions.is_empty() && !expenses.is_empty() {
            transactions = settlement::regenerate_transactions(&expenses, &[]);
            let tx = conn.unchecked_transaction()?;
            db::replace_payments(&tx, &transactions)?;
            tx.commit()?;
        }

        tracing::info!(
            people = people.count(),
            groups = groups.count(),
            expenses = expenses.len(),
            transactions = transactions.len(),
            "book loaded"
        );

        Ok(SplitBook {
            state: RwLock::new(Arc::new(Snapshot {
                people,
                groups,
                expenses,
                transactions,
            })),
            conn: Some(Mutex::new(conn)),
            subscribers: Mutex::new(Vec::new()),
            actor: CURRENT_USER_ID.to_string(),
        })
    }

    /// Actor recorded on audit events
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn net_balances(&self) -> NetBalances {
        self.snapshot().net_balances()
    }

    pub fn settlement_plan(&self) -> Vec<Transaction> {
        self.snapshot().settlement_plan()
    }

    pub fn pairwise_debts(&self) -> Vec<Debt> {
        self.snapshot().pairwise_debts()
    }

    /// Receive every snapshot published after this call
    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    // ------------------------------------------------------------------------
    // People
    // ------------------------------------------------------------------------

    pub fn add_person(&self, person: Person) -> Result<()> {
        self.mutate(|snapshot, conn| {
            if let Some(conn) = conn {
                db::insert_person(conn, &person)?;
            }
            tracing::info!(person_id = %person.id, name = %person.name, "person saved");
            snapshot.people.upsert(person);
            Ok(())
        })
    }

    /// Edit a person in place. Returns `false` for an unknown id.
    pub fn update_person<F>(&self, person_id: &str, update_fn: F) -> Result<bool>
    where
        F: FnOnce(&mut Person),
    {
        self.mutate(|snapshot, conn| {
            if !snapshot.people.update(person_id, update_fn) {
                return Ok(false);
            }
            if let (Some(conn), Some(person)) = (conn, snapshot.people.find_by_id(person_id)) {
                db::insert_person(conn, person)?;
            }
            Ok(true)
        })
    }

    /// Remove a person and their group memberships
    ///
    /// Expenses and transactions that mention them are left as they are; the
    /// id simply stops resolving to a name.
    pub fn remove_person(&self, person_id: &str) -> Result<bool> {
        self.mutate(|snapshot, conn| {
            if snapshot.people.remove(person_id).is_none() {
                return Ok(false);
            }
            snapshot.groups.remove_member_everywhere(person_id);
            if let Some(conn) = conn {
                db::delete_person(conn, person_id)?;
            }
            tracing::info!(person_id, "person removed");
            Ok(true)
        })
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    pub fn add_group(&self, group: Group) -> Result<()> {
        self.mutate(|snapshot, conn| {
            if let Some(conn) = conn {
                db::insert_group(conn, &group)?;
            }
            tracing::info!(group_id = %group.id, members = group.members.len(), "group saved");
            snapshot.groups.upsert(group);
            Ok(())
        })
    }

    pub fn update_group(&self, group: Group) -> Result<bool> {
        if self.snapshot().groups.find_by_id(&group.id).is_none() {
            return Ok(false);
        }
        self.add_group(group)?;
        Ok(true)
    }

    pub fn remove_group(&self, group_id: &str) -> Result<bool> {
        self.mutate(|snapshot, conn| {
            if snapshot.groups.remove(group_id).is_none() {
                return Ok(false);
            }
            if let Some(conn) = conn {
                db::delete_group(conn, group_id)?;
            }
            Ok(true)
        })
    }

    // ------------------------------------------------------------------------
    // Expenses (each change rebuilds the unsettled transactions)
    // ------------------------------------------------------------------------

    pub fn add_expense(&self, expense: Expense) -> Result<()> {
        warn_if_invalid(&expense);
        let actor = self.actor.clone();

        self.mutate(|snapshot, conn| {
            if let Some(conn) = conn {
                db::insert_expense(conn, &expense)?;
            }

            snapshot.expenses.retain(|e| e.id != expense.id);
            snapshot.expenses.push(expense.clone());
            snapshot.regenerate();

            if let Some(conn) = conn {
                db::replace_payments(conn, &snapshot.transactions)?;
                record(conn, Event::new(
                    "expense_added",
                    "expense",
                    &expense.id,
                    serde_json::json!({
                        "description": expense.description,
                        "amount": expense.amount,
                    }),
                    &actor,
                ));
            }

            tracing::info!(
                expense_id = %expense.id,
                amount = expense.amount,
                pending = snapshot.settlement_plan().len(),
                "expense added"
            );
            Ok(())
        })
    }

    /// Replace an existing expense. Returns `false` for an unknown id.
    pub fn update_expense(&self, expense: Expense) -> Result<bool> {
        warn_if_invalid(&expense);

        self.mutate(|snapshot, conn| {
            let Some(slot) = snapshot.expenses.iter_mut().find(|e| e.id == expense.id) else {
                return Ok(false);
            };
            *slot = expense.clone();
            snapshot.regenerate();

            if let Some(conn) = conn {
                db::insert_expense(conn, &expense)?;
                db::replace_payments(conn, &snapshot.transactions)?;
            }

            tracing::info!(expense_id = %expense.id, "expense updated");
            Ok(true)
        })
    }

    pub fn delete_expense(&self, expense_id: &str) -> Result<bool> {
        let actor = self.actor.clone();

        self.mutate(|snapshot, conn| {
            let before = snapshot.expenses.len();
            snapshot.expenses.retain(|e| e.id != expense_id);
            if snapshot.expenses.len() == before {
                return Ok(false);
            }
            snapshot.regenerate();

            if let Some(conn) = conn {
                db::delete_expense(conn, expense_id)?;
                db::replace_payments(conn, &snapshot.transactions)?;
                record(conn, Event::new(
                    "expense_deleted",
                    "expense",
                    expense_id,
                    serde_json::json!({}),
                    &actor,
                ));
            }

            tracing::info!(expense_id, "expense deleted");
            Ok(true)
        })
    }

    /// Add imported people and expenses, skipping expenses already present
    /// (same id or same content). Returns how many expenses were added.
    pub fn import(&self, import: CsvImport) -> Result<usize> {
        self.mutate(|snapshot, conn| {
            for person in import.people {
                if snapshot.people.contains(&person.id) {
                    continue;
                }
                if let Some(conn) = conn {
                    db::insert_person(conn, &person)?;
                }
                snapshot.people.upsert(person);
            }

            let mut known_ids: HashSet<String> = snapshot.expenses.iter().map(|e| e.id.clone()).collect();
            let mut known_hashes: HashSet<String> =
                snapshot.expenses.iter().map(Expense::compute_content_hash).collect();

            let fresh: Vec<Expense> = import
                .expenses
                .into_iter()
                .filter(|e| known_ids.insert(e.id.clone()) && known_hashes.insert(e.compute_content_hash()))
                .collect();

            if fresh.is_empty() {
                tracing::info!("import contained no new expenses");
                return Ok(0);
            }

            for expense in &fresh {
                warn_if_invalid(expense);
            }
            if let Some(conn) = conn {
                db::import_expenses(conn, &fresh)?;
            }

            let added = fresh.len();
            snapshot.expenses.extend(fresh);
            snapshot.regenerate();

            if let Some(conn) = conn {
                db::replace_payments(conn, &snapshot.transactions)?;
            }

            tracing::info!(added, "expenses imported");
            Ok(added)
        })
    }

    // ------------------------------------------------------------------------
    // Settling
    // ------------------------------------------------------------------------

    /// Mark one transaction settled. Returns `false` if the id is unknown or
    /// the transaction was already settled.
    pub fn settle(&self, transaction_id: &str) -> Result<bool> {
        let actor = self.actor.clone();

        self.mutate(|snapshot, conn| {
            let Some(tx) = settlement::find(&snapshot.transactions, transaction_id) else {
                tracing::warn!(transaction_id, "settle requested for unknown transaction");
                return Ok(false);
            };
            if tx.settled {
                return Ok(false);
            }
            let tx = tx.clone();

            snapshot.transactions = settlement::settle(&snapshot.transactions, transaction_id);

            if let Some(conn) = conn {
                db::settle_payment(conn, transaction_id)?;
                record(conn, settled_event(&tx, &actor));
            }

            tracing::info!(transaction_id, from = %tx.from, to = %tx.to, amount = tx.amount, "transaction settled");
            Ok(true)
        })
    }

    /// Settle every unsettled `debtor -> creditor` transaction. Returns how
    /// many were settled.
    pub fn settle_by_pair(&self, debtor_id: &str, creditor_id: &str) -> Result<usize> {
        let actor = self.actor.clone();

        self.mutate(|snapshot, conn| {
            let matching: Vec<Transaction> = snapshot
                .transactions
                .iter()
                .filter(|tx| !tx.settled && tx.is_between(debtor_id, creditor_id))
                .cloned()
                .collect();

            if matching.is_empty() {
                return Ok(0);
            }

            snapshot.transactions = settlement::settle_by_pair(&snapshot.transactions, debtor_id, creditor_id);

            if let Some(conn) = conn {
                for tx in &matching {
                    db::settle_payment(conn, &tx.id)?;
                    record(conn, settled_event(tx, &actor));
                }
            }

            tracing::info!(debtor_id, creditor_id, count = matching.len(), "pair settled");
            Ok(matching.len())
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Clone-edit-swap under the write lock; commit and publish only on success
    ///
    /// Dropping the SQL transaction on an early return rolls back every row
    /// the closure wrote.
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Snapshot, Option<&SqlTransaction<'_>>) -> Result<T>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Snapshot::clone(&state);

        let result = match &self.conn {
            Some(conn) => {
                let conn = lock(conn);
                let tx = conn.unchecked_transaction().context("Failed to begin write")?;
                let result = f(&mut next, Some(&tx))?;
                tx.commit().context("Failed to commit write")?;
                result
            }
            None => f(&mut next, None)?,
        };

        let next = Arc::new(next);
        *state = Arc::clone(&next);
        drop(state);

        self.publish(next);
        Ok(result)
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        // Drop subscribers whose receiver is gone
        lock(&self.subscribers).retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn warn_if_invalid(expense: &Expense) {
    for issue in expense.validate() {
        tracing::warn!(expense_id = %expense.id, %issue, "expense accepted with issue");
    }
}

fn settled_event(tx: &Transaction, actor: &str) -> Event {
    Event::new(
        "payment_settled",
        "payment",
        &tx.id,
        serde_json::json!({
            "from": tx.from,
            "to": tx.to,
            "amount": tx.amount,
        }),
        actor,
    )
}

/// Audit failures never undo the change they describe
fn record(conn: &Connection, event: Event) {
    if let Err(e) = db::insert_event(conn, &event) {
        tracing::warn!(event_type = %event.event_type, "failed to record event: {}", e);
    }
}

// ============================================================================
// TESTS
// ============================================================================
