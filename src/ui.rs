use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use money_splitter::{
    money, Debt, Expense, PersonSummary, Snapshot, SplitBook, Transaction,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Balances,
    SettlementPlan,
    WhoOwesWhom,
    Expenses,
}

impl Page {
    pub const ALL: [Page; 4] = [
        Page::Balances,
        Page::SettlementPlan,
        Page::WhoOwesWhom,
        Page::Expenses,
    ];

    pub fn next(&self) -> Self {
        match self {
            Page::Balances => Page::SettlementPlan,
            Page::SettlementPlan => Page::WhoOwesWhom,
            Page::WhoOwesWhom => Page::Expenses,
            Page::Expenses => Page::Balances,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Balances => Page::Expenses,
            Page::SettlementPlan => Page::Balances,
            Page::WhoOwesWhom => Page::SettlementPlan,
            Page::Expenses => Page::WhoOwesWhom,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Balances => "Balances",
            Page::SettlementPlan => "Settlement Plan",
            Page::WhoOwesWhom => "Who Owes Whom",
            Page::Expenses => "Expenses",
        }
    }
}

pub struct App {
    pub book: Arc<SplitBook>,
    pub me: String,
    pub snapshot: Arc<Snapshot>,
    pub balances: Vec<(String, f64)>,
    pub plan: Vec<Transaction>,
    pub debts: Vec<Debt>,
    pub summary: PersonSummary,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(book: Arc<SplitBook>, me: &str) -> Self {
        let snapshot = book.snapshot();
        let mut app = Self {
            summary: snapshot.person_summary(me),
            book,
            me: me.to_string(),
            snapshot,
            balances: Vec::new(),
            plan: Vec::new(),
            debts: Vec::new(),
            state: TableState::default(),
            current_page: Page::Balances,
            show_detail: false,
            status_message: None,
        };
        app.refresh();
        app
    }

    /// Pull the latest snapshot and rebuild every page's rows
    pub fn refresh(&mut self) {
        self.snapshot = self.book.snapshot();

        let mut balances: Vec<(String, f64)> = self
            .snapshot
            .net_balances()
            .into_iter()
            .collect();
        balances.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        self.balances = balances;
        self.plan = self.snapshot.settlement_plan();
        self.debts = self.snapshot.pairwise_debts();
        self.summary = self.snapshot.person_summary(&self.me);
        self.clamp_selection();
    }

    pub fn row_count(&self) -> usize {
        match self.current_page {
            Page::Balances => self.balances.len(),
            Page::SettlementPlan => self.plan.len(),
            Page::WhoOwesWhom => self.debts.len(),
            Page::Expenses => self.snapshot.expenses.len(),
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.row_count();
        match (len, self.state.selected()) {
            (0, _) => self.state.select(None),
            (_, None) => self.state.select(Some(0)),
            (len, Some(i)) if i >= len => self.state.select(Some(len - 1)),
            _ => {}
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.state.select(None);
        self.clamp_selection();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.state.select(None);
        self.clamp_selection();
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn selected_transaction(&self) -> Option<&Transaction> {
        if self.current_page != Page::SettlementPlan {
            return None;
        }
        self.state.selected().and_then(|i| self.plan.get(i))
    }

    pub fn selected_expense(&self) -> Option<&Expense> {
        if self.current_page != Page::Expenses {
            return None;
        }
        self.state.selected().and_then(|i| self.snapshot.expenses.get(i))
    }

    /// Settle the highlighted plan entry
    pub fn settle_selected(&mut self) -> Result<()> {
        let Some(tx) = self.selected_transaction().cloned() else {
            self.status_message = Some("Select a transaction on the Settlement Plan page".to_string());
            return Ok(());
        };

        if self.book.settle(&tx.id)? {
            self.status_message = Some(format!(
                "Settled: {} → {} {:.2}",
                self.name(&tx.from),
                self.name(&tx.to),
                tx.amount
            ));
        }
        self.refresh();
        Ok(())
    }

    pub fn name<'a>(&'a self, id: &'a str) -> &'a str {
        self.snapshot.people.display_name(id)
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("ui loop failed: {:?}", err);
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('s') => app.settle_selected()?,
                KeyCode::Char('r') => {
                    app.refresh();
                    app.status_message = Some("Reloaded".to_string());
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Home => {
                    if app.row_count() > 0 {
                        app.state.select(Some(0));
                    }
                }
                KeyCode::End => {
                    if app.row_count() > 0 {
                        app.state.select(Some(app.row_count() - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Expenses {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_expenses(f, content_chunks[0], app);
        render_expense_detail(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Balances => render_balances(f, chunks[1], app),
            Page::SettlementPlan => render_plan(f, chunks[1], app),
            Page::WhoOwesWhom => render_debts(f, chunks[1], app),
            Page::Expenses => render_expenses(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Owed to you: {:.2}", app.summary.owed_to_them),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("You owe: {:.2}", app.summary.they_owe),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn balance_color(amount: f64) -> Color {
    if money::is_positive(amount) {
        Color::Green
    } else if money::is_negative(amount) {
        Color::Red
    } else {
        Color::White
    }
}

fn render_rows<'a>(f: &mut Frame, area: Rect, state: &mut TableState, title: &str, table: Table<'a>) {
    let table = table
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(format!(" {} ", title)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_balances(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .balances
        .iter()
        .map(|(id, amount)| {
            let status = if money::is_positive(*amount) {
                "should receive"
            } else if money::is_negative(*amount) {
                "should pay"
            } else {
                "settled"
            };
            Row::new(vec![
                Cell::from(truncate(app.name(id), 30)),
                Cell::from(money::format_signed(*amount)).style(Style::default().fg(balance_color(*amount))),
                Cell::from(status),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(32), Constraint::Length(14), Constraint::Length(16)])
        .header(header_row(&["Person", "Balance", "Status"]));

    render_rows(f, area, &mut app.state, "Net Balances", table);
}

fn render_plan(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .plan
        .iter()
        .map(|tx| {
            let color = if tx.from == app.me {
                Color::Red
            } else if tx.to == app.me {
                Color::Green
            } else {
                Color::White
            };
            Row::new(vec![
                Cell::from(tx.date.to_string()),
                Cell::from(truncate(app.name(&tx.from), 24)),
                Cell::from(truncate(app.name(&tx.to), 24)),
                Cell::from(format!("{:.2}", tx.amount)).style(Style::default().fg(color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(26),
            Constraint::Length(26),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Date", "Pays", "To", "Amount"]));

    render_rows(f, area, &mut app.state, "Settlement Plan (s = settle)", table);
}

fn render_debts(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .debts
        .iter()
        .map(|debt| {
            Row::new(vec![
                Cell::from(truncate(app.name(&debt.from), 24)),
                Cell::from(truncate(app.name(&debt.to), 24)),
                Cell::from(format!("{:.2}", debt.amount)).style(Style::default().fg(Color::Yellow)),
            ])
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(26), Constraint::Length(26), Constraint::Length(12)])
        .header(header_row(&["Owes", "To", "Amount"]));

    render_rows(f, area, &mut app.state, "Who Owes Whom", table);
}

fn render_expenses(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .snapshot
        .expenses
        .iter()
        .map(|expense| {
            let style = if expense.is_valid() {
                Style::default()
            } else {
                Style::default().fg(Color::Red)
            };
            Row::new(vec![
                Cell::from(expense.date.to_string()),
                Cell::from(truncate(&expense.description, 30)),
                Cell::from(expense.category.display_name()),
                Cell::from(format!("{:.2}", expense.amount)),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(12),
            Constraint::Length(32),
            Constraint::Length(18),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Date", "Description", "Category", "Amount"]));

    render_rows(f, area, &mut app.state, "Expenses", table);
}

fn render_expense_detail(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();

    match app.selected_expense() {
        Some(expense) => {
            lines.push(Line::from(Span::styled(
                expense.description.clone(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("Total: {:.2}", expense.amount)));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Paid by", Style::default().fg(Color::Cyan))));
            for (id, paid) in &expense.paid_by {
                lines.push(Line::from(format!("  {}: {:.2}", app.name(id), paid)));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Shares", Style::default().fg(Color::Cyan))));
            for (id, share) in &expense.participants {
                lines.push(Line::from(format!("  {}: {:.2}", app.name(id), share)));
            }
            for issue in expense.validate() {
                lines.push(Line::from(Span::styled(
                    format!("⚠ {}", issue),
                    Style::default().fg(Color::Red),
                )));
            }
        }
        None => lines.push(Line::from("No expense selected")),
    }

    let detail = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Detail "),
    );

    f.render_widget(detail, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.row_count()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(message) = &app.status_message {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Green)));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("s", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Settle | "));
    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Details | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use money_splitter::{PersonId, CURRENT_USER_ID};
    use std::collections::BTreeMap;

    fn book_with_dinner() -> Arc<SplitBook> {
        let book = SplitBook::in_memory();
        let mut paid = BTreeMap::new();
        paid.insert(CURRENT_USER_ID.to_string(), 90.0);
        let ids: Vec<PersonId> = vec![CURRENT_USER_ID.into(), "bob".into(), "carol".into()];
        book.add_expense(Expense::new(
            "Dinner",
            90.0,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            paid,
            Expense::equal_shares(&ids, 90.0),
        ))
        .unwrap();
        Arc::new(book)
    }

    #[test]
    fn test_page_cycle() {
        let mut page = Page::Balances;
        for _ in 0..Page::ALL.len() {
            page = page.next();
        }
        assert_eq!(page, Page::Balances);
        assert_eq!(Page::Balances.previous(), Page::Expenses);
    }

    #[test]
    fn test_app_rows_and_summary() {
        let app = App::new(book_with_dinner(), CURRENT_USER_ID);

        assert_eq!(app.row_count(), 3);
        assert_eq!(app.balances[0].0, CURRENT_USER_ID);
        assert!(money::approx_eq(app.summary.owed_to_them, 60.0));
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_settle_selected_removes_plan_row() {
        let mut app = App::new(book_with_dinner(), CURRENT_USER_ID);

        // Not on the plan page: nothing happens
        app.settle_selected().unwrap();
        assert_eq!(app.plan.len(), 2);

        app.next_page();
        assert_eq!(app.current_page, Page::SettlementPlan);
        app.settle_selected().unwrap();

        assert_eq!(app.plan.len(), 1);
        assert_eq!(app.book.snapshot().transactions.len(), 2);
        assert!(app.status_message.as_deref().unwrap_or("").starts_with("Settled"));
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = App::new(book_with_dinner(), CURRENT_USER_ID);
        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("café con leche", 7), "café...");
    }
}
