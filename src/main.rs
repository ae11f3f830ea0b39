// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use money_splitter::{
    balances, load_csv, money, open_database, render_report, settlement, simplify_debts, SplitBook,
    CURRENT_USER_ID,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "money-splitter", version, about = "Shared expenses, balances and settle-up plans")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "MONEY_SPLITTER_DB", default_value = "money-splitter.db", global = true)]
    db: PathBuf,

    /// Log filter (e.g. "info", "money_splitter=debug")
    #[arg(long, env = "MONEY_SPLITTER_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Person id used for "you" views
    #[arg(long, env = "MONEY_SPLITTER_ME", default_value = CURRENT_USER_ID, global = true)]
    me: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import expenses from a CSV file
    Import { csv: PathBuf },
    /// List people
    People,
    /// List expenses
    Expenses,
    /// Net balance per person
    Balances,
    /// Unsettled transactions (the current settle-up plan)
    Plan,
    /// Pairwise "who owes whom"
    Debts,
    /// Every transaction, settled ones included
    Transactions,
    /// Mark one transaction settled
    Settle { id: String },
    /// Settle every pending payment from debtor to creditor
    SettlePair { debtor: String, creditor: String },
    /// Print the full text report
    Report {
        #[arg(long, default_value = "Money Splitter Report")]
        title: String,
    },
    /// Interactive terminal UI (default)
    Ui,
}

fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr so command output stays pipeable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Command::Ui);
    // The TUI owns the terminal; keep logs quiet unless asked for
    if matches!(command, Command::Ui) && std::env::var("MONEY_SPLITTER_LOG").is_err() {
        init_tracing("warn");
    } else {
        init_tracing(&cli.log_level);
    }

    let conn = open_database(&cli.db)?;
    let book = SplitBook::open(conn)
        .with_context(|| format!("Failed to load book from {}", cli.db.display()))?
        .with_actor(&cli.me);

    match command {
        Command::Import { csv } => run_import(&book, &csv)?,
        Command::People => list_people(&book),
        Command::Expenses => list_expenses(&book),
        Command::Balances => list_balances(&book, &cli.me),
        Command::Plan => list_plan(&book),
        Command::Debts => list_debts(&book),
        Command::Transactions => list_transactions(&book),
        Command::Settle { id } => {
            if book.settle(&id)? {
                println!("✓ Settled {}", id);
            } else {
                println!("Nothing to settle for {} (unknown id or already settled)", id);
            }
        }
        Command::SettlePair { debtor, creditor } => {
            let count = book.settle_by_pair(&debtor, &creditor)?;
            println!("✓ Settled {} payment(s) from {} to {}", count, debtor, creditor);
        }
        Command::Report { title } => {
            let snapshot = book.snapshot();
            let balances = snapshot.net_balances();
            let debts = simplify_debts(&balances);
            print!(
                "{}",
                render_report(&title, &snapshot.expenses, &snapshot.people, &balances, &debts)
            );
        }
        Command::Ui => run_ui_mode(Arc::new(book), &cli.me)?,
    }

    Ok(())
}

fn run_import(book: &SplitBook, csv_path: &std::path::Path) -> Result<()> {
    println!("🗄️  Import: CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let import = load_csv(csv_path)?;
    let total = import.expenses.len();
    println!("✓ Loaded {} expenses and {} people from CSV", total, import.people.len());

    println!("\n💾 Inserting expenses...");
    let added = book.import(import)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ New expenses: {}", added);
    println!("✓ Duplicates skipped: {}", total - added);
    println!("✓ Pending payments: {}", book.settlement_plan().len());

    Ok(())
}

fn list_people(book: &SplitBook) {
    for person in book.snapshot().people.all() {
        let marker = if person.is_app_user { "📱" } else { "  " };
        println!("{} {:<36} {}", marker, person.id, person.name);
    }
}

fn list_expenses(book: &SplitBook) {
    let snapshot = book.snapshot();
    for expense in &snapshot.expenses {
        let flag = if expense.is_valid() { " " } else { "!" };
        println!(
            "{}{} {:<10} {:<30} {:>10.2}  {}",
            flag,
            expense.date,
            expense.category.as_str(),
            expense.description,
            expense.amount,
            expense.id
        );
    }
}

fn list_balances(book: &SplitBook, me: &str) {
    let snapshot = book.snapshot();
    let net = snapshot.net_balances();

    for (id, amount) in &net {
        println!("{:<30} {:>12}", snapshot.people.display_name(id), money::format_signed(*amount));
    }

    let total = balances::total(&net);
    if !money::is_zero(total) {
        println!("⚠️  Balances do not sum to zero ({:.2}); some expenses are inconsistent", total);
    }

    let summary = snapshot.person_summary(me);
    println!(
        "\nYou ({}): owed {:.2}, owe {:.2}",
        snapshot.people.display_name(me),
        summary.owed_to_them,
        summary.they_owe
    );
}

fn list_plan(book: &SplitBook) {
    let snapshot = book.snapshot();
    let plan = snapshot.settlement_plan();
    if plan.is_empty() {
        println!("All balanced! No settlements needed.");
        return;
    }
    for tx in plan {
        println!(
            "{}  {} → {}  {:.2}",
            tx.id,
            snapshot.people.display_name(&tx.from),
            snapshot.people.display_name(&tx.to),
            tx.amount
        );
    }
}

fn list_debts(book: &SplitBook) {
    let snapshot = book.snapshot();
    for debt in snapshot.pairwise_debts() {
        println!(
            "{} owes {} {:.2}",
            snapshot.people.display_name(&debt.from),
            snapshot.people.display_name(&debt.to),
            debt.amount
        );
    }
}

fn list_transactions(book: &SplitBook) {
    let snapshot = book.snapshot();
    let settled = settlement::settled(&snapshot.transactions).len();
    for tx in &snapshot.transactions {
        let mark = if tx.settled { "✓" } else { "·" };
        println!(
            "{} {}  {}  {} → {}  {:.2}",
            mark,
            tx.id,
            tx.date,
            snapshot.people.display_name(&tx.from),
            snapshot.people.display_name(&tx.to),
            tx.amount
        );
    }
    println!("\n{} settled, {} pending", settled, snapshot.transactions.len().saturating_sub(settled));
}

#[cfg(feature = "tui")]
fn run_ui_mode(book: Arc<SplitBook>, me: &str) -> Result<()> {
    let mut app = ui::App::new(book, me);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_book: Arc<SplitBook>, _me: &str) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run the API: cargo run --bin splitter-server --features server");
    std::process::exit(1);
}
