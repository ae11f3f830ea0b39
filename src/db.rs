use crate::entities::{Expense, ExpenseCategory, Group, Person, PersonId};
use crate::money;
use crate::settlement::Transaction;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Transaction as SqlTransaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // People
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS people (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_app_user INTEGER NOT NULL DEFAULT 0,
            phone_number TEXT,
            email TEXT,
            added_by TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Expenses (payers and participants in child tables)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'OTHER',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_payers (
            expense_id TEXT NOT NULL REFERENCES expenses(id) ON DELETE CASCADE,
            person_id TEXT NOT NULL,
            paid_amount REAL NOT NULL,
            PRIMARY KEY (expense_id, person_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_participants (
            expense_id TEXT NOT NULL REFERENCES expenses(id) ON DELETE CASCADE,
            person_id TEXT NOT NULL,
            share REAL NOT NULL,
            PRIMARY KEY (expense_id, person_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Groups
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_members (
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            person_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (group_id, person_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Payments (cache of the settlement plan + settled history)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            from_person_id TEXT NOT NULL,
            to_person_id TEXT NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            is_settled INTEGER NOT NULL DEFAULT 0,
            position INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_content_hash ON expenses(content_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_pair ON payments(from_person_id, to_person_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

fn parse_date(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    value
        .parse::<NaiveDate>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// PEOPLE
// ============================================================================

pub fn insert_person(conn: &Connection, person: &Person) -> Result<()> {
    conn.execute(
        "INSERT INTO people (id, name, is_app_user, phone_number, email, added_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            is_app_user = excluded.is_app_user,
            phone_number = excluded.phone_number,
            email = excluded.email,
            added_by = excluded.added_by",
        params![
            person.id,
            person.name,
            person.is_app_user,
            person.phone_number,
            person.email,
            person.added_by,
        ],
    )?;
    Ok(())
}

pub fn get_all_people(conn: &Connection) -> Result<Vec<Person>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, is_app_user, phone_number, email, added_by
         FROM people
         ORDER BY name, id",
    )?;

    let people = stmt
        .query_map([], |row| {
            Ok(Person {
                id: row.get(0)?,
                name: row.get(1)?,
                is_app_user: row.get(2)?,
                phone_number: row.get(3)?,
                email: row.get(4)?,
                added_by: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(people)
}

pub fn delete_person(tx: &SqlTransaction, person_id: &str) -> Result<()> {
    tx.execute("DELETE FROM group_members WHERE person_id = ?1", [person_id])?;
    tx.execute("DELETE FROM people WHERE id = ?1", [person_id])?;
    Ok(())
}

// ============================================================================
// EXPENSES
// ============================================================================

// Multi-statement writers take the caller's SQL transaction, so a book
// mutation commits (or rolls back) all of its rows together.

/// Insert or update an expense (edit = update in place)
pub fn insert_expense(tx: &SqlTransaction, expense: &Expense) -> Result<()> {
    tx.execute(
        "INSERT INTO expenses (id, content_hash, description, amount, date, category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            content_hash = excluded.content_hash,
            description = excluded.description,
            amount = excluded.amount,
            date = excluded.date,
            category = excluded.category",
        params![
            expense.id,
            expense.compute_content_hash(),
            expense.description,
            expense.amount,
            expense.date.to_string(),
            expense.category.as_str(),
        ],
    )?;
    write_expense_splits(tx, expense)?;

    Ok(())
}

fn write_expense_splits(conn: &Connection, expense: &Expense) -> Result<()> {
    // Delete existing payers/participants and re-add
    conn.execute("DELETE FROM expense_payers WHERE expense_id = ?1", [&expense.id])?;
    conn.execute("DELETE FROM expense_participants WHERE expense_id = ?1", [&expense.id])?;

    for (person_id, paid) in &expense.paid_by {
        conn.execute(
            "INSERT INTO expense_payers (expense_id, person_id, paid_amount) VALUES (?1, ?2, ?3)",
            params![expense.id, person_id, paid],
        )?;
    }

    for (person_id, share) in &expense.participants {
        conn.execute(
            "INSERT INTO expense_participants (expense_id, person_id, share) VALUES (?1, ?2, ?3)",
            params![expense.id, person_id, share],
        )?;
    }

    Ok(())
}

/// Import expenses, skipping ones already present: same id, or same
/// content (date, description, amount and splits) under another id
///
/// Returns the number of expenses actually inserted.
pub fn import_expenses(tx: &SqlTransaction, expenses: &[Expense]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for expense in expenses {
        let hash = expense.compute_content_hash();

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM expenses WHERE id = ?1 OR content_hash = ?2)",
            params![expense.id, hash],
            |row| row.get(0),
        )?;
        if exists {
            duplicates += 1;
            continue;
        }

        tx.execute(
            "INSERT INTO expenses (id, content_hash, description, amount, date, category)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                expense.id,
                hash,
                expense.description,
                expense.amount,
                expense.date.to_string(),
                expense.category.as_str(),
            ],
        )?;
        write_expense_splits(tx, expense)?;
        inserted += 1;

        let event = Event::new(
            "expense_imported",
            "expense",
            &expense.id,
            serde_json::json!({
                "description": expense.description,
                "amount": expense.amount,
                "content_hash": hash,
            }),
            "csv_importer",
        );
        if let Err(e) = insert_event(tx, &event) {
            tracing::warn!("failed to record import event for {}: {}", expense.id, e);
        }
    }

    tracing::info!(inserted, duplicates, "expense import finished");

    Ok(inserted)
}

pub fn get_all_expenses(conn: &Connection) -> Result<Vec<Expense>> {
    let mut payers = load_splits(conn, "SELECT expense_id, person_id, paid_amount FROM expense_payers")?;
    let mut participants = load_splits(conn, "SELECT expense_id, person_id, share FROM expense_participants")?;

    let mut stmt = conn.prepare(
        "SELECT id, description, amount, date, category
         FROM expenses
         ORDER BY date, created_at, id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            let date_str: String = row.get(3)?;
            let category_str: String = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                parse_date(3, &date_str)?,
                category_str,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let expenses = rows
        .into_iter()
        .map(|(id, description, amount, date, category)| Expense {
            paid_by: payers.remove(&id).unwrap_or_default(),
            participants: participants.remove(&id).unwrap_or_default(),
            category: category.parse().unwrap_or(ExpenseCategory::Other),
            id,
            description,
            amount,
            date,
        })
        .collect();

    Ok(expenses)
}

fn load_splits(
    conn: &Connection,
    sql: &str,
) -> Result<BTreeMap<String, BTreeMap<PersonId, f64>>> {
    let mut stmt = conn.prepare(sql)?;
    let mut splits: BTreeMap<String, BTreeMap<PersonId, f64>> = BTreeMap::new();

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    for row in rows {
        let (expense_id, person_id, amount) = row?;
        splits.entry(expense_id).or_default().insert(person_id, amount);
    }

    Ok(splits)
}

pub fn delete_expense(tx: &SqlTransaction, expense_id: &str) -> Result<bool> {
    tx.execute("DELETE FROM expense_payers WHERE expense_id = ?1", [expense_id])?;
    tx.execute("DELETE FROM expense_participants WHERE expense_id = ?1", [expense_id])?;
    let removed = tx.execute("DELETE FROM expenses WHERE id = ?1", [expense_id])?;
    Ok(removed > 0)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM expenses", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// GROUPS
// ============================================================================

pub fn insert_group(tx: &SqlTransaction, group: &Group) -> Result<()> {
    tx.execute(
        "INSERT INTO groups (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![group.id, group.name],
    )?;

    // Delete existing members and re-add
    tx.execute("DELETE FROM group_members WHERE group_id = ?1", [&group.id])?;
    for (position, member) in group.members.iter().enumerate() {
        tx.execute(
            "INSERT INTO group_members (group_id, person_id, position) VALUES (?1, ?2, ?3)",
            params![group.id, member, position as i64],
        )?;
    }

    Ok(())
}

pub fn get_all_groups(conn: &Connection) -> Result<Vec<Group>> {
    let mut members: BTreeMap<String, Vec<PersonId>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT group_id, person_id FROM group_members ORDER BY group_id, position",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (group_id, person_id) = row?;
            members.entry(group_id).or_default().push(person_id);
        }
    }

    let mut stmt = conn.prepare("SELECT id, name FROM groups ORDER BY name, id")?;
    let groups = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(id, name)| Group {
            members: members.remove(&id).unwrap_or_default(),
            id,
            name,
        })
        .collect();

    Ok(groups)
}

pub fn delete_group(tx: &SqlTransaction, group_id: &str) -> Result<()> {
    tx.execute("DELETE FROM group_members WHERE group_id = ?1", [group_id])?;
    tx.execute("DELETE FROM groups WHERE id = ?1", [group_id])?;
    Ok(())
}

// ============================================================================
// PAYMENTS
// ============================================================================

/// Rewrite the payments cache
pub fn replace_payments(tx: &SqlTransaction, transactions: &[Transaction]) -> Result<()> {
    tx.execute("DELETE FROM payments", [])?;

    for (position, payment) in transactions.iter().enumerate() {
        tx.execute(
            "INSERT INTO payments (id, from_person_id, to_person_id, amount, date, is_settled, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                payment.id,
                payment.from,
                payment.to,
                payment.amount,
                payment.date.to_string(),
                payment.settled,
                position as i64,
            ],
        )?;
    }

    Ok(())
}

pub fn get_all_payments(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_person_id, to_person_id, amount, date, is_settled
         FROM payments
         ORDER BY position",
    )?;

    let payments = stmt
        .query_map([], |row| {
            let date_str: String = row.get(4)?;
            Ok(Transaction {
                id: row.get(0)?,
                from: row.get(1)?,
                to: row.get(2)?,
                amount: row.get(3)?,
                date: parse_date(4, &date_str)?,
                settled: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payments)
}

pub fn settle_payment(conn: &Connection, payment_id: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE payments SET is_settled = 1 WHERE id = ?1 AND is_settled = 0",
        [payment_id],
    )?;
    Ok(updated > 0)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One CSV line: a single person's part in an expense
#[derive(Debug, Deserialize)]
struct CsvRow {
    expense_id: String,
    date: NaiveDate,
    description: String,
    #[serde(default)]
    category: String,
    person_id: String,
    #[serde(default)]
    person_name: String,
    #[serde(default)]
    paid: Option<f64>,
    #[serde(default)]
    share: Option<f64>,
}

/// Expenses and the people they mention, as read from a CSV file
#[derive(Debug, Default)]
pub struct CsvImport {
    pub expenses: Vec<Expense>,
    pub people: Vec<Person>,
}

/// Load expenses from CSV
///
/// Columns: `expense_id,date,description,category,person_id,person_name,paid,share`.
/// Rows sharing an `expense_id` form one expense; the total is the sum paid.
pub fn load_csv(csv_path: &Path) -> Result<CsvImport> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut order: Vec<String> = Vec::new();
    let mut expenses: BTreeMap<String, Expense> = BTreeMap::new();
    let mut people: BTreeMap<PersonId, Person> = BTreeMap::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| format!("Failed to deserialize CSV row {}", line + 2))?;

        if !people.contains_key(&row.person_id) {
            let name = if row.person_name.trim().is_empty() {
                row.person_id.as_str()
            } else {
                row.person_name.trim()
            };
            people.insert(row.person_id.clone(), Person::with_id(&row.person_id, name));
        }

        let expense = expenses.entry(row.expense_id.clone()).or_insert_with(|| {
            order.push(row.expense_id.clone());
            Expense {
                id: row.expense_id.clone(),
                description: row.description.clone(),
                amount: 0.0,
                date: row.date,
                category: row.category.parse().unwrap_or(ExpenseCategory::Other),
                paid_by: BTreeMap::new(),
                participants: BTreeMap::new(),
            }
        });

        if let Some(paid) = row.paid.filter(|p| !money::is_zero(*p)) {
            *expense.paid_by.entry(row.person_id.clone()).or_insert(0.0) += paid;
            expense.amount += paid;
        }
        if let Some(share) = row.share.filter(|s| !money::is_zero(*s)) {
            *expense.participants.entry(row.person_id.clone()).or_insert(0.0) += share;
        }
    }

    let expenses = order
        .into_iter()
        .filter_map(|id| expenses.remove(&id))
        .collect();

    Ok(CsvImport {
        expenses,
        people: people.into_values().collect(),
    })
}

pub fn open_database(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}
