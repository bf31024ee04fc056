use crate::api::TokenSource;
use crate::config::MonitorConfig;
use crate::error::FetchError;
use crate::monitor::{Applied, DerivedRow, FetchTicket, Monitor, Summary};
use crate::report::{format_count, short_mint};
use crate::scheduler::{spawn_second_ticker, Countdown, Phase};
use crate::token::Token;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::future::BoxFuture;
use futures::FutureExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph,
        Row, Table, Tabs, Wrap,
    },
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tui_big_text::{BigText, PixelSize};

const ACCENT: Color = Color::Rgb(0x4F, 0xDE, 0xE5);
const MUTED: Color = Color::Rgb(0xB4, 0xB4, 0xB4);
const CAPACITY_BAR: Color = Color::Rgb(0x2D, 0x2D, 0x2D);

// Bar lengths are ln(1 + value) in these units.
const LOG_SCALE: f64 = 1000.0;

/// Fetches the token list of a wallet; boxed so the app is not generic
/// over its data source.
pub type Fetcher =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Vec<Token>, FetchError>> + Send + Sync>;

pub fn fetcher<S: TokenSource>(source: S) -> Fetcher {
    let source = Arc::new(source);
    Arc::new(move |wallet: String| {
        let source = Arc::clone(&source);
        async move { source.fetch_tokens(&wallet).await }.boxed()
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Chart,
    Tokens,
}

impl Tab {
    fn title(self) -> &'static str {
        match self {
            Tab::Chart => "Supply vs Consumption",
            Tab::Tokens => "Tokens",
        }
    }

    fn all() -> &'static [Tab] {
        &[Tab::Chart, Tab::Tokens]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chart" => Some(Tab::Chart),
            "tokens" => Some(Tab::Tokens),
            _ => None,
        }
    }
}

struct FetchOutcome {
    ticket: FetchTicket,
    result: Result<Vec<Token>, FetchError>,
}

pub struct App {
    pub current_tab: Tab,
    pub should_quit: bool,
    pub selected_row: usize,
    pub flash_state: bool,
    monitor: Monitor,
    countdown: Countdown,
    fetch: Fetcher,
    sender: mpsc::UnboundedSender<FetchOutcome>,
    receiver: mpsc::UnboundedReceiver<FetchOutcome>,
    in_flight: Vec<JoinHandle<()>>,
    ticks: Option<mpsc::UnboundedReceiver<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(config: MonitorConfig, fetch: Fetcher) -> App {
        let (sender, receiver) = mpsc::unbounded_channel();
        App {
            current_tab: Tab::Chart,
            should_quit: false,
            selected_row: 0,
            flash_state: false,
            countdown: Countdown::new(config.interval_secs()),
            monitor: Monitor::new(config),
            fetch,
            sender,
            receiver,
            in_flight: Vec::new(),
            ticks: None,
            ticker: None,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Start the second ticker and issue the initial fetch. Must run inside
    /// a tokio runtime.
    pub fn start(&mut self) {
        let (sender, ticks) = mpsc::unbounded_channel();
        if let Some(old) = self.ticker.replace(spawn_second_ticker(sender)) {
            old.abort();
        }
        self.ticks = Some(ticks);
        self.countdown.start();
        self.spawn_fetch();
    }

    fn spawn_fetch(&mut self) {
        let ticket = self.monitor.begin_fetch();
        debug!(request = ticket.request, wallet = %ticket.wallet, "issuing fetch");
        let future = (self.fetch)(ticket.wallet.clone());
        let sender = self.sender.clone();

        self.countdown.fetch_started();
        self.in_flight.retain(|handle| !handle.is_finished());
        self.in_flight.push(tokio::spawn(async move {
            let result = future.await;
            // receiver gone means the dashboard shut down
            let _ = sender.send(FetchOutcome { ticket, result });
        }));
    }

    /// Advance the countdown by `seconds`, fetching whenever it runs out.
    pub fn on_tick(&mut self, seconds: u64) {
        for _ in 0..seconds {
            if self.countdown.tick() {
                self.spawn_fetch();
            }
        }
    }

    /// Consume the seconds the ticker has reported and advance the
    /// countdown by that many. Returns the number of seconds consumed.
    pub fn drain_ticks(&mut self) -> u64 {
        let mut seconds = 0;
        if let Some(ticks) = self.ticks.as_mut() {
            while ticks.try_recv().is_ok() {
                seconds += 1;
            }
        }
        self.on_tick(seconds);
        seconds
    }

    pub fn refresh_now(&mut self) {
        self.countdown.reset();
        self.spawn_fetch();
    }

    pub fn next_wallet(&mut self) {
        self.monitor.next_wallet();
        self.after_wallet_switch();
    }

    pub fn previous_wallet(&mut self) {
        self.monitor.previous_wallet();
        self.after_wallet_switch();
    }

    fn after_wallet_switch(&mut self) {
        self.selected_row = 0;
        self.refresh_now();
    }

    /// Apply every fetch result that has arrived. Returns true if the
    /// displayed data changed.
    pub fn drain_updates(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.receiver.try_recv() {
            self.countdown.fetch_finished();
            match self.monitor.apply(&outcome.ticket, outcome.result) {
                Applied::Stale => {}
                Applied::Updated | Applied::Failed => {
                    changed = true;
                    self.flash_state = !self.flash_state;
                }
            }
        }
        let rows = self.monitor.rows().len();
        if self.selected_row >= rows {
            self.selected_row = rows.saturating_sub(1);
        }
        changed
    }

    pub fn next_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + 1) % tabs.len()];
    }

    pub fn previous_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + tabs.len() - 1) % tabs.len()];
    }

    pub fn select_next(&mut self) {
        if self.selected_row + 1 < self.monitor.rows().len() {
            self.selected_row += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
    }

    /// Stop the ticker and the countdown, and abort any fetch still in flight.
    pub fn shutdown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.ticks = None;
        self.countdown.stop();
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
        self.receiver.close();
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('r') => self.refresh_now(),
            KeyCode::Char('w') => self.next_wallet(),
            KeyCode::Char('W') => self.previous_wallet(),
            KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => self.previous_tab(),
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => self.next_tab(),
            KeyCode::Char('j') | KeyCode::Down => self.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.select_previous(),
            KeyCode::Char('1') => self.current_tab = Tab::Chart,
            KeyCode::Char('2') => self.current_tab = Tab::Tokens,
            _ => {}
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(ticker) = &self.ticker {
            ticker.abort();
        }
        for handle in &self.in_flight {
            handle.abort();
        }
    }
}

pub async fn run_tui(config: MonitorConfig, fetch: Fetcher, tab: Option<Tab>) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, fetch);
    if let Some(tab) = tab {
        app.current_tab = tab;
    }
    app.start();

    let res = run_app(&mut terminal, &mut app).await;
    app.shutdown();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        app.drain_ticks();
        app.drain_updates();

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if app.should_quit {
            break;
        }
        // let spawned fetches make progress between frames
        tokio::task::yield_now().await;
    }
    Ok(())
}

pub fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_header(f, chunks[0], app);

    let monitor = app.monitor();
    if monitor.is_loading() && monitor.error().is_none() {
        render_loading(f, chunks[1]);
    } else {
        match app.current_tab {
            Tab::Chart => render_chart_tab(f, chunks[1], app),
            Tab::Tokens => render_tokens(f, chunks[1], app),
        }
    }

    let help = Paragraph::new("r refresh | w/W wallet | h/l tabs | j/k select | q quit")
        .style(Style::default().fg(MUTED))
        .alignment(Alignment::Center);
    f.render_widget(help, chunks[2]);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(44)])
        .split(area);

    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(t.title(), style))
        })
        .collect();

    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title("Token Monitor"))
        .highlight_style(Style::default().fg(ACCENT))
        .select(
            Tab::all()
                .iter()
                .position(|&t| t == app.current_tab)
                .unwrap_or(0),
        );
    f.render_widget(tabs, chunks[0]);

    let monitor = app.monitor();
    let (position, total) = monitor.wallet_position();
    let status = match (app.countdown().phase(), monitor.error()) {
        (_, Some(_)) => Span::styled("error", Style::default().fg(Color::Red)),
        (Phase::Fetching, None) => Span::styled("fetching", Style::default().fg(Color::Yellow)),
        (Phase::Counting, None) => Span::styled("live", Style::default().fg(Color::Green)),
        (Phase::Idle, None) => Span::styled("idle", Style::default().fg(MUTED)),
    };
    let status_line = Line::from(vec![
        Span::styled("Refresh in: ", Style::default().fg(MUTED)),
        Span::styled(
            format!(
                "{}s/{}s",
                app.countdown().remaining(),
                app.countdown().interval()
            ),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        status,
    ]);
    let wallet_title = format!(
        "Wallet {position}/{total}: {}",
        short_mint(monitor.wallet())
    );
    let status_widget = Paragraph::new(status_line)
        .block(Block::default().borders(Borders::ALL).title(wallet_title))
        .alignment(Alignment::Right);
    f.render_widget(status_widget, chunks[1]);
}

fn render_chart_tab(f: &mut Frame, area: Rect, app: &App) {
    let monitor = app.monitor();
    let rows = monitor.rows();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Min(8),
            Constraint::Length(12),
        ])
        .split(area);

    render_summary_cards(f, chunks[0], app, &rows);

    if let Some(error) = monitor.error() {
        render_error(f, chunks[1], error);
    } else {
        render_balance_bars(f, chunks[1], &rows);
    }
    render_history(f, chunks[2], app);
}

fn render_summary_cards(f: &mut Frame, area: Rect, app: &App, rows: &[DerivedRow]) {
    let summary = Summary::from_rows(rows);
    let cards = [
        ("Total Tokens", summary.total_capacity, ACCENT),
        ("Tokens in Circulation", summary.in_circulation, Color::Green),
        ("Tokens Consumed", summary.consumed, Color::Rgb(0xFF, 0xB5, 0x28)),
    ];

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(area);

    for ((title, value, color), chunk) in cards.iter().zip(chunks.iter()) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(MUTED))
            .title(Span::styled(*title, Style::default().fg(ACCENT)));
        let inner = block.inner(*chunk);
        f.render_widget(block, *chunk);

        let mut style = Style::default().fg(*color).add_modifier(Modifier::BOLD);
        if app.flash_state {
            style = style.add_modifier(Modifier::ITALIC);
        }
        let big_text = BigText::builder()
            .pixel_size(PixelSize::Quadrant)
            .style(style)
            .lines(vec![format_count(*value).into()])
            .build();
        f.render_widget(big_text, inner);
    }
}

fn log_bar(value: f64) -> u64 {
    (value.max(0.0).ln_1p() * LOG_SCALE).round() as u64
}

fn render_balance_bars(f: &mut Frame, area: Rect, rows: &[DerivedRow]) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(vec![
            Span::styled("Current Balance", Style::default().fg(ACCENT)),
            Span::raw(" vs "),
            Span::styled("Maximum Balance", Style::default().fg(MUTED)),
            Span::raw(" (log scale)"),
        ]));

    if rows.is_empty() {
        let empty = Paragraph::new("No token data for this wallet")
            .block(block)
            .style(Style::default().fg(MUTED))
            .alignment(Alignment::Center);
        f.render_widget(empty, area);
        return;
    }

    let max = rows
        .iter()
        .map(|r| log_bar(r.current_balance.max(r.max_capacity)))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut chart = BarChart::default()
        .block(block)
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .group_gap(1)
        .max(max);

    for row in rows {
        let color = if row.placeholder { MUTED } else { row.color };
        let bars = [
            Bar::default()
                .value(log_bar(row.current_balance))
                .text_value(format_count(row.current_balance))
                .style(Style::default().fg(color))
                .value_style(Style::default().fg(Color::Black).bg(color)),
            Bar::default()
                .value(log_bar(row.max_capacity))
                .text_value(format_count(row.max_capacity))
                .style(Style::default().fg(CAPACITY_BAR))
                .value_style(Style::default().fg(Color::White).bg(CAPACITY_BAR)),
        ];
        chart = chart.data(
            BarGroup::default()
                .label(Line::from(row.name.clone()))
                .bars(&bars),
        );
    }

    f.render_widget(chart, area);
}

fn render_history(f: &mut Frame, area: Rect, app: &App) {
    let history = app.monitor().history();
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Token Circulation vs Consumption");

    if history.len() < 2 {
        let waiting = Paragraph::new("Collecting samples...")
            .block(block)
            .style(Style::default().fg(MUTED))
            .alignment(Alignment::Center);
        f.render_widget(waiting, area);
        return;
    }

    let circulation: Vec<(f64, f64)> = history
        .iter()
        .enumerate()
        .map(|(i, s)| (i as f64, s.in_circulation))
        .collect();
    let consumed: Vec<(f64, f64)> = history
        .iter()
        .enumerate()
        .map(|(i, s)| (i as f64, s.consumed))
        .collect();
    let y_max = history
        .iter()
        .map(|s| s.in_circulation.max(s.consumed))
        .fold(1.0_f64, f64::max);

    let first = history.iter().next().map(|s| s.at.format("%H:%M:%S").to_string());
    let last = history.iter().last().map(|s| s.at.format("%H:%M:%S").to_string());

    let datasets = vec![
        Dataset::default()
            .name("In Circulation")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(ACCENT))
            .data(&circulation),
        Dataset::default()
            .name("Consumed")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::White))
            .data(&consumed),
    ];

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(MUTED))
                .bounds([0.0, (history.len() - 1) as f64])
                .labels(vec![
                    Span::raw(first.unwrap_or_default()),
                    Span::raw(last.unwrap_or_default()),
                ]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(MUTED))
                .bounds([0.0, y_max])
                .labels(vec![Span::raw("0"), Span::raw(format_count(y_max))]),
        );

    f.render_widget(chart, area);
}

fn render_tokens(f: &mut Frame, area: Rect, app: &App) {
    let monitor = app.monitor();
    if let Some(error) = monitor.error() {
        render_error(f, area, error);
        return;
    }

    let header_cells = [
        "Name",
        "Token",
        "Mint",
        "Balance",
        "Capacity",
        "Held %",
        "Consumable",
        "Wallet Cost",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = monitor.rows();
    let table_rows = rows.iter().enumerate().map(|(i, row)| {
        let token = monitor.tokens().iter().find(|t| t.mint_address == row.key);
        let details = token.and_then(|t| t.details.as_ref());
        let token_label = match (token, details) {
            (Some(t), Some(d)) => format!(
                "{} ({})",
                d.token_name.as_deref().unwrap_or(&t.name),
                d.token_symbol.as_deref().unwrap_or(&t.symbol)
            ),
            (Some(t), None) => format!("{} ({})", t.name, t.symbol),
            (None, _) => "-".to_string(),
        };
        let consumable = details
            .and_then(|d| d.consumable_name.clone())
            .unwrap_or_else(|| "-".to_string());
        let wallet_cost = details
            .and_then(|d| {
                d.wallet_cost.map(|cost| match &d.currency_type {
                    Some(currency) => format!("{cost:.2} {currency}"),
                    None => format!("{cost:.2}"),
                })
            })
            .unwrap_or_else(|| "-".to_string());
        let held = row
            .utilization()
            .map(|u| format!("{u:.1}%"))
            .unwrap_or_else(|| "-".to_string());

        let row_style = if i == app.selected_row {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        let name_color = if row.placeholder { MUTED } else { row.color };

        Row::new(vec![
            Cell::from(row.name.clone()).style(Style::default().fg(name_color)),
            Cell::from(token_label),
            Cell::from(short_mint(&row.key)),
            Cell::from(format_count(row.current_balance)),
            Cell::from(format_count(row.max_capacity)),
            Cell::from(held),
            Cell::from(consumable),
            Cell::from(wallet_cost),
        ])
        .height(1)
        .style(row_style)
    });

    let widths = [
        Constraint::Percentage(18),
        Constraint::Percentage(16),
        Constraint::Percentage(11),
        Constraint::Percentage(11),
        Constraint::Percentage(11),
        Constraint::Percentage(8),
        Constraint::Percentage(14),
        Constraint::Percentage(11),
    ];

    let updated = monitor
        .last_update()
        .map(|t| format!("updated {}", t.format("%H:%M:%S")))
        .unwrap_or_else(|| "not updated yet".to_string());
    let table = Table::new(table_rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Tokens - {updated}")),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

fn render_loading(f: &mut Frame, area: Rect) {
    let loading_text = Paragraph::new("Loading token data...")
        .block(Block::default().borders(Borders::ALL).title("Loading"))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);

    f.render_widget(loading_text, area);
}

fn render_error(f: &mut Frame, area: Rect, error: &str) {
    let error_paragraph = Paragraph::new(error)
        .block(Block::default().borders(Borders::ALL).title("Error"))
        .style(Style::default().fg(Color::Red))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, area);
}
