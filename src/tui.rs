use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, ListState, Paragraph, Row,
    Table, Wrap,
};

use crate::app::{
    AcquirePhase, Action, ActionOutcome, App, Page, ProgressEvent, ProgressSink, Session,
};
use crate::auth::IdentityClient;
use crate::backend::{ApiDocs, ApiKeyGrant, ApiReply, BackendClient};
use crate::domain::{DatasetEntry, DatasetName};
use crate::error::VaultError;
use crate::kaggle::DatasetProvider;
use crate::settings::SettingsClient;
use crate::storage::ObjectStore;

const MESSAGES_MAX: usize = 200;
const PREVIEW_ROWS: usize = 5;
const CHART_POINTS: usize = 64;

/// Which widget currently receives typed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Email,
    Password,
    PasswordConfirm,
    DatasetInput,
    DatasetList,
    KaggleUsername,
    KaggleKey,
    Subdomain,
    HeadRows,
}

/// Transient widget state. Everything that survives an interaction lives in
/// `Session`; this is only cursors and edit buffers.
struct UiState {
    focus: Focus,
    email: String,
    password: String,
    password_confirm: String,
    dataset_input: String,
    datasets: Vec<DatasetEntry>,
    dataset_cursor: ListState,
    head_rows: String,
    kaggle_username: String,
    kaggle_key: String,
    subdomain: String,
    chart_column: usize,
    key_grant: Option<ApiKeyGrant>,
    docs: Option<ApiDocs>,
    messages: VecDeque<String>,
    phase: Option<AcquirePhase>,
}

impl UiState {
    fn new() -> Self {
        Self {
            focus: Focus::Email,
            email: String::new(),
            password: String::new(),
            password_confirm: String::new(),
            dataset_input: String::new(),
            datasets: Vec::new(),
            dataset_cursor: ListState::default(),
            head_rows: "5".to_string(),
            kaggle_username: String::new(),
            kaggle_key: String::new(),
            subdomain: String::new(),
            chart_column: 0,
            key_grant: None,
            docs: None,
            messages: VecDeque::new(),
            phase: None,
        }
    }

    fn push_message(&mut self, message: impl Into<String>) {
        if self.messages.len() >= MESSAGES_MAX {
            self.messages.pop_front();
        }
        self.messages.push_back(message.into());
    }
}

/// Progress sink that buffers events for the message log; drained after each
/// dispatch since calls are blocking.
struct BufferSink {
    events: Mutex<Vec<String>>,
}

impl BufferSink {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn drain(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl ProgressSink for BufferSink {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.message);
        }
    }
}

pub struct Tui {
    ui: UiState,
}

impl Tui {
    pub fn new() -> Self {
        Self { ui: UiState::new() }
    }

    /// Interactive loop: draw the current session, translate key events into
    /// actions, dispatch, render the outcome. Exits on `q` from a top-level
    /// page or Ctrl-C anywhere.
    pub fn run<P, S, I, C, B>(&mut self, app: &App<P, S, I, C, B>) -> miette::Result<()>
    where
        P: DatasetProvider,
        S: ObjectStore,
        I: IdentityClient,
        C: SettingsClient,
        B: BackendClient,
    {
        let mut session = Session::new();

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let result = self.event_loop(app, &mut session, &mut terminal);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop<P, S, I, C, B>(
        &mut self,
        app: &App<P, S, I, C, B>,
        session: &mut Session,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> miette::Result<()>
    where
        P: DatasetProvider,
        S: ObjectStore,
        I: IdentityClient,
        C: SettingsClient,
        B: BackendClient,
    {
        loop {
            terminal
                .draw(|frame| draw_ui(frame, session, &mut self.ui))
                .into_diagnostic()?;

            if !event::poll(Duration::from_millis(120)).into_diagnostic()? {
                continue;
            }
            let Event::Key(key) = event::read().into_diagnostic()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                return Ok(());
            }

            match self.handle_key(session, key) {
                KeyOutcome::Quit => return Ok(()),
                KeyOutcome::Dispatch(action) => self.dispatch(app, session, action),
                KeyOutcome::Handled => {}
            }
        }
    }

    fn dispatch<P, S, I, C, B>(
        &mut self,
        app: &App<P, S, I, C, B>,
        session: &mut Session,
        action: Action,
    ) where
        P: DatasetProvider,
        S: ObjectStore,
        I: IdentityClient,
        C: SettingsClient,
        B: BackendClient,
    {
        let sink = BufferSink::new();
        let refresh_list = matches!(&action, Action::Acquire { .. } | Action::LogIn { .. });
        let result = app.dispatch(session, action, &sink);
        for message in sink.drain() {
            if let Some(phase) = parse_phase(&message) {
                self.ui.phase = Some(phase);
            }
            self.ui.push_message(message);
        }

        match result {
            Ok(outcome) => {
                self.apply_outcome(session, outcome);
                if refresh_list {
                    self.refresh_datasets(app, session);
                    self.ui.focus = Focus::DatasetList;
                }
            }
            Err(err) => {
                session.status = Some(err.to_string());
                self.ui.push_message(format!("error: {err}"));
                // auth errors route back to the login page, no retry
                if matches!(err, VaultError::AuthFailed(_) | VaultError::SessionMissing) {
                    session.page = if session.authenticated {
                        session.page
                    } else {
                        Page::Login
                    };
                }
            }
        }
    }

    fn apply_outcome(&mut self, session: &mut Session, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::None => {}
            ActionOutcome::Message(message) => {
                session.status = Some(message.clone());
                self.ui.push_message(message);
            }
            ActionOutcome::BrowseUrl(url) => {
                let message = format!("open in a browser to continue: {url}");
                session.status = Some(message.clone());
                self.ui.push_message(message);
            }
            ActionOutcome::Acquired(result) => {
                session.status = Some(format!(
                    "{} loaded ({} rows, {}) via {}",
                    result.dataset,
                    result.rows,
                    result.action,
                    result.strategy
                ));
            }
            ActionOutcome::Datasets(datasets) => {
                self.ui.datasets = datasets;
                if self.ui.datasets.is_empty() {
                    self.ui.dataset_cursor.select(None);
                } else {
                    self.ui.dataset_cursor.select(Some(0));
                }
            }
            ActionOutcome::Reply(reply) => {
                if let ApiReply::Rejected(message) | ApiReply::Unreachable(message) = &reply {
                    session.status = Some(message.clone());
                }
            }
            ActionOutcome::KeyGranted(grant) => {
                session.status = Some("New API key generated.".to_string());
                self.ui.key_grant = Some(grant);
            }
            ActionOutcome::Docs(docs) => {
                self.ui.docs = Some(docs);
            }
        }
    }

    fn refresh_datasets<P, S, I, C, B>(&mut self, app: &App<P, S, I, C, B>, session: &mut Session)
    where
        P: DatasetProvider,
        S: ObjectStore,
        I: IdentityClient,
        C: SettingsClient,
        B: BackendClient,
    {
        let sink = BufferSink::new();
        if let Ok(ActionOutcome::Datasets(datasets)) =
            app.dispatch(session, Action::ListDatasets, &sink)
        {
            self.apply_outcome(session, ActionOutcome::Datasets(datasets));
        }
    }

    fn handle_key(&mut self, session: &mut Session, key: KeyEvent) -> KeyOutcome {
        match session.page {
            Page::Welcome => self.handle_welcome_key(key),
            Page::Login => self.handle_login_key(key),
            Page::Register => self.handle_register_key(key),
            Page::Explorer => self.handle_explorer_key(session, key),
            Page::Visualize => self.handle_visualize_key(session, key),
            Page::ApiKeys => self.handle_api_keys_key(key),
            Page::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_welcome_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => KeyOutcome::Quit,
            KeyCode::Char('l') | KeyCode::Enter => {
                self.ui.focus = Focus::Email;
                KeyOutcome::Dispatch(Action::GoTo(Page::Login))
            }
            KeyCode::Char('r') => {
                self.ui.focus = Focus::Email;
                KeyOutcome::Dispatch(Action::GoTo(Page::Register))
            }
            _ => KeyOutcome::Handled,
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Esc => KeyOutcome::Dispatch(Action::GoTo(Page::Welcome)),
            KeyCode::Tab => {
                self.ui.focus = match self.ui.focus {
                    Focus::Email => Focus::Password,
                    _ => Focus::Email,
                };
                KeyOutcome::Handled
            }
            KeyCode::F(2) => KeyOutcome::Dispatch(Action::OAuthLogIn {
                provider: "google".to_string(),
            }),
            KeyCode::F(3) => KeyOutcome::Dispatch(Action::GoTo(Page::Register)),
            KeyCode::Enter => KeyOutcome::Dispatch(Action::LogIn {
                email: self.ui.email.clone(),
                password: self.ui.password.clone(),
            }),
            _ => {
                let focus = self.ui.focus;
                self.edit_field(focus, key);
                KeyOutcome::Handled
            }
        }
    }

    fn handle_register_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Esc => KeyOutcome::Dispatch(Action::GoTo(Page::Welcome)),
            KeyCode::Tab => {
                self.ui.focus = match self.ui.focus {
                    Focus::Email => Focus::Password,
                    Focus::Password => Focus::PasswordConfirm,
                    _ => Focus::Email,
                };
                KeyOutcome::Handled
            }
            KeyCode::F(3) => KeyOutcome::Dispatch(Action::GoTo(Page::Login)),
            KeyCode::Enter => {
                if self.ui.password != self.ui.password_confirm {
                    self.ui.push_message("Passwords do not match!");
                    return KeyOutcome::Handled;
                }
                KeyOutcome::Dispatch(Action::Register {
                    email: self.ui.email.clone(),
                    password: self.ui.password.clone(),
                })
            }
            _ => {
                let focus = self.ui.focus;
                self.edit_field(focus, key);
                KeyOutcome::Handled
            }
        }
    }

    fn handle_explorer_key(&mut self, _session: &mut Session, key: KeyEvent) -> KeyOutcome {
        if self.ui.focus == Focus::DatasetInput {
            return match key.code {
                KeyCode::Esc | KeyCode::Tab => {
                    self.ui.focus = Focus::DatasetList;
                    KeyOutcome::Handled
                }
                KeyCode::Enter => match self.ui.dataset_input.parse::<DatasetName>() {
                    Ok(dataset) => KeyOutcome::Dispatch(Action::Acquire {
                        dataset,
                        force: false,
                    }),
                    Err(err) => {
                        self.ui.push_message(format!("error: {err}"));
                        KeyOutcome::Handled
                    }
                },
                _ => {
                    self.edit_field(Focus::DatasetInput, key);
                    KeyOutcome::Handled
                }
            };
        }
        if self.ui.focus == Focus::HeadRows {
            return match key.code {
                KeyCode::Esc | KeyCode::Tab => {
                    self.ui.focus = Focus::DatasetList;
                    KeyOutcome::Handled
                }
                KeyCode::Enter => {
                    self.ui.focus = Focus::DatasetList;
                    let n = self.ui.head_rows.parse().unwrap_or(PREVIEW_ROWS);
                    KeyOutcome::Dispatch(Action::FetchHead { n })
                }
                _ => {
                    self.edit_field(Focus::HeadRows, key);
                    KeyOutcome::Handled
                }
            };
        }

        match key.code {
            KeyCode::Char('q') => KeyOutcome::Quit,
            KeyCode::Char('i') | KeyCode::Tab => {
                self.ui.focus = Focus::DatasetInput;
                KeyOutcome::Handled
            }
            KeyCode::Up => {
                self.move_cursor(-1);
                KeyOutcome::Handled
            }
            KeyCode::Down => {
                self.move_cursor(1);
                KeyOutcome::Handled
            }
            KeyCode::Enter => match self.selected_dataset() {
                Some(entry) => KeyOutcome::Dispatch(Action::LoadStored { path: entry.path }),
                None => KeyOutcome::Handled,
            },
            KeyCode::F(5) => KeyOutcome::Dispatch(Action::ListDatasets),
            KeyCode::Char('s') => KeyOutcome::Dispatch(Action::FetchSummary),
            KeyCode::Char('t') => KeyOutcome::Dispatch(Action::FetchStats),
            KeyCode::Char('h') => {
                let n = self.ui.head_rows.parse().unwrap_or(PREVIEW_ROWS);
                KeyOutcome::Dispatch(Action::FetchHead { n })
            }
            KeyCode::Char('n') => {
                self.ui.focus = Focus::HeadRows;
                KeyOutcome::Handled
            }
            KeyCode::Char('v') => {
                self.ui.chart_column = 0;
                KeyOutcome::Dispatch(Action::GoTo(Page::Visualize))
            }
            KeyCode::Char('k') => KeyOutcome::Dispatch(Action::GoTo(Page::ApiKeys)),
            KeyCode::Char('o') => {
                self.ui.focus = Focus::KaggleUsername;
                KeyOutcome::Dispatch(Action::GoTo(Page::Settings))
            }
            KeyCode::Char('x') => KeyOutcome::Dispatch(Action::LogOut),
            _ => KeyOutcome::Handled,
        }
    }

    fn handle_visualize_key(&mut self, session: &mut Session, key: KeyEvent) -> KeyOutcome {
        let numeric = session
            .table
            .as_ref()
            .map(|loaded| loaded.table.numeric_columns().len())
            .unwrap_or(0);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => KeyOutcome::Dispatch(Action::GoTo(Page::Explorer)),
            KeyCode::Left if numeric > 0 => {
                self.ui.chart_column = (self.ui.chart_column + numeric - 1) % numeric;
                KeyOutcome::Handled
            }
            KeyCode::Right if numeric > 0 => {
                self.ui.chart_column = (self.ui.chart_column + 1) % numeric;
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Handled,
        }
    }

    fn handle_api_keys_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => KeyOutcome::Dispatch(Action::GoTo(Page::Explorer)),
            KeyCode::Char('g') => KeyOutcome::Dispatch(Action::GenerateKey),
            KeyCode::Char('d') => KeyOutcome::Dispatch(Action::FetchDocs),
            _ => KeyOutcome::Handled,
        }
    }

    fn handle_settings_key(&mut self, key: KeyEvent) -> KeyOutcome {
        match key.code {
            KeyCode::Esc => {
                self.ui.focus = Focus::DatasetList;
                KeyOutcome::Dispatch(Action::GoTo(Page::Explorer))
            }
            KeyCode::Tab => {
                self.ui.focus = match self.ui.focus {
                    Focus::KaggleUsername => Focus::KaggleKey,
                    Focus::KaggleKey => Focus::Subdomain,
                    _ => Focus::KaggleUsername,
                };
                KeyOutcome::Handled
            }
            KeyCode::Enter => match self.ui.focus {
                Focus::Subdomain => KeyOutcome::Dispatch(Action::SaveSubdomain {
                    subdomain: self.ui.subdomain.clone(),
                }),
                _ => KeyOutcome::Dispatch(Action::SaveKaggleSettings {
                    username: self.ui.kaggle_username.clone(),
                    key: self.ui.kaggle_key.clone(),
                }),
            },
            KeyCode::F(8) => KeyOutcome::Dispatch(Action::DeleteKaggleSettings),
            KeyCode::F(9) => KeyOutcome::Dispatch(Action::DeleteSubdomain),
            _ => {
                let focus = self.ui.focus;
                self.edit_field(focus, key);
                KeyOutcome::Handled
            }
        }
    }

    fn edit_field(&mut self, focus: Focus, key: KeyEvent) {
        let buffer = match focus {
            Focus::Email => &mut self.ui.email,
            Focus::Password => &mut self.ui.password,
            Focus::PasswordConfirm => &mut self.ui.password_confirm,
            Focus::DatasetInput => &mut self.ui.dataset_input,
            Focus::KaggleUsername => &mut self.ui.kaggle_username,
            Focus::KaggleKey => &mut self.ui.kaggle_key,
            Focus::Subdomain => &mut self.ui.subdomain,
            Focus::HeadRows => &mut self.ui.head_rows,
            Focus::DatasetList => return,
        };
        match key.code {
            KeyCode::Char(ch) => buffer.push(ch),
            KeyCode::Backspace => {
                buffer.pop();
            }
            _ => {}
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.ui.datasets.is_empty() {
            return;
        }
        let len = self.ui.datasets.len() as isize;
        let current = self.ui.dataset_cursor.selected().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len);
        self.ui.dataset_cursor.select(Some(next as usize));
    }

    fn selected_dataset(&self) -> Option<DatasetEntry> {
        self.ui
            .dataset_cursor
            .selected()
            .and_then(|idx| self.ui.datasets.get(idx))
            .cloned()
    }
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

enum KeyOutcome {
    Handled,
    Quit,
    Dispatch(Action),
}

/// The single projection from state to screen; never mutates the session.
fn draw_ui(frame: &mut ratatui::Frame, session: &Session, ui: &mut UiState) {
    match session.page {
        Page::Welcome => draw_welcome(frame, session),
        Page::Login => draw_login(frame, session, ui),
        Page::Register => draw_register(frame, session, ui),
        Page::Explorer => draw_explorer(frame, session, ui),
        Page::Visualize => draw_visualize(frame, session, ui),
        Page::ApiKeys => draw_api_keys(frame, session, ui),
        Page::Settings => draw_settings(frame, session, ui),
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

fn status_line(session: &Session) -> Line<'_> {
    match &session.status {
        Some(status) => Line::from(Span::styled(
            status.as_str(),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::from(""),
    }
}

fn draw_welcome(frame: &mut ratatui::Frame, session: &Session) {
    let area = centered_rect(frame.area(), 60, 12);
    let text = Paragraph::new(vec![
        Line::from(Span::styled(
            "Welcome to DataVault Explorer",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Explore and analyze hosted datasets."),
        Line::from("- easy dataset preview"),
        Line::from("- seamless provider integration"),
        Line::from("- secure data storage"),
        Line::from("- API ready"),
        Line::from(""),
        Line::from("l: login   r: register   q: quit"),
        status_line(session),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title("DataVault"));
    frame.render_widget(text, area);
}

fn input_line<'a>(label: &'a str, value: &'a str, focused: bool, masked: bool) -> Line<'a> {
    let shown = if masked {
        "*".repeat(value.chars().count())
    } else {
        value.to_string()
    };
    let style = if focused {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{label}: "), style),
        Span::raw(shown),
        Span::raw(if focused { "_" } else { "" }),
    ])
}

fn draw_login(frame: &mut ratatui::Frame, session: &Session, ui: &UiState) {
    let area = centered_rect(frame.area(), 64, 10);
    let text = Paragraph::new(vec![
        Line::from("Login to DataVault Explorer"),
        Line::from(""),
        input_line("Email", &ui.email, ui.focus == Focus::Email, false),
        input_line("Password", &ui.password, ui.focus == Focus::Password, true),
        Line::from(""),
        Line::from("Enter: login   F2: login with Google   F3: register   Esc: back"),
        status_line(session),
    ])
    .block(Block::default().borders(Borders::ALL).title("Login"));
    frame.render_widget(text, area);
}

fn draw_register(frame: &mut ratatui::Frame, session: &Session, ui: &UiState) {
    let area = centered_rect(frame.area(), 64, 11);
    let text = Paragraph::new(vec![
        Line::from("Register for DataVault Explorer"),
        Line::from(""),
        input_line("Email", &ui.email, ui.focus == Focus::Email, false),
        input_line("Password", &ui.password, ui.focus == Focus::Password, true),
        input_line(
            "Confirm",
            &ui.password_confirm,
            ui.focus == Focus::PasswordConfirm,
            true,
        ),
        Line::from(""),
        Line::from("Enter: register   F3: login   Esc: back"),
        status_line(session),
    ])
    .block(Block::default().borders(Borders::ALL).title("Register"));
    frame.render_widget(text, area);
}

fn draw_explorer(frame: &mut ratatui::Frame, session: &Session, ui: &mut UiState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(30)])
        .split(frame.area());

    draw_sidebar(frame, chunks[0], session, ui);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(8),
        ])
        .split(chunks[1]);

    let input = Paragraph::new(input_line(
        "Dataset (owner/name)",
        &ui.dataset_input,
        ui.focus == Focus::DatasetInput,
        false,
    ))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Download new dataset"),
    );
    frame.render_widget(input, main[0]);

    draw_table_preview(frame, main[1], session);
    draw_message_log(frame, main[2], session, ui);
}

fn draw_sidebar(frame: &mut ratatui::Frame, area: Rect, session: &Session, ui: &mut UiState) {
    let email = session
        .user
        .as_ref()
        .map(|user| user.email.as_str())
        .unwrap_or("-");
    let title = format!("Your datasets ({email})");

    let items: Vec<ListItem> = if ui.datasets.is_empty() {
        vec![ListItem::new("No datasets uploaded yet")]
    } else {
        ui.datasets
            .iter()
            .map(|entry| ListItem::new(entry.file_name().to_string()))
            .collect()
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut ui.dataset_cursor);
}

fn draw_table_preview(frame: &mut ratatui::Frame, area: Rect, session: &Session) {
    let Some(loaded) = &session.table else {
        let hint = Paragraph::new(vec![
            Line::from("No dataset loaded."),
            Line::from(""),
            Line::from("i: edit dataset name   Enter: load selected   F5: refresh list"),
            Line::from("s: summary   t: stats   h: head   v: charts   k: API keys"),
            Line::from("o: settings   x: logout   q: quit"),
        ])
        .block(Block::default().borders(Borders::ALL).title("Dataset"));
        frame.render_widget(hint, area);
        return;
    };

    let table = &loaded.table;
    let title = format!(
        "{} | {} rows x {} columns | {}",
        session.current_dataset.as_deref().unwrap_or("-"),
        table.row_count(),
        table.column_count(),
        loaded.strategy.describe()
    );

    let widths: Vec<Constraint> = table
        .columns
        .iter()
        .map(|_| Constraint::Min(10))
        .collect();
    let header = Row::new(table.columns.clone()).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    let rows: Vec<Row> = table
        .head(PREVIEW_ROWS)
        .iter()
        .map(|row| Row::new(row.clone()))
        .collect();
    let widget = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(widget, area);
}

fn draw_message_log(frame: &mut ratatui::Frame, area: Rect, session: &Session, ui: &UiState) {
    let mut lines: Vec<Line> = ui
        .messages
        .iter()
        .rev()
        .take(area.height.saturating_sub(3) as usize)
        .rev()
        .map(|message| Line::from(message.as_str()))
        .collect();
    lines.push(status_line(session));
    let title = match ui.phase {
        Some(phase) => format!(
            "Activity | {} ({}/{})",
            phase.label(),
            phase.index(),
            AcquirePhase::LoadRemote.index()
        ),
        None => "Activity".to_string(),
    };
    let log = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(log, area);
}

fn parse_phase(message: &str) -> Option<AcquirePhase> {
    let rest = message.strip_prefix("phase=")?;
    let label = rest.split(';').next()?.trim();
    [
        AcquirePhase::Idle,
        AcquirePhase::CheckCache,
        AcquirePhase::FetchExternal,
        AcquirePhase::NormalizeLocalFile,
        AcquirePhase::StoreRemote,
        AcquirePhase::LoadRemote,
    ]
    .into_iter()
    .find(|phase| phase.label() == label)
}

fn draw_visualize(frame: &mut ratatui::Frame, session: &Session, ui: &UiState) {
    let Some(loaded) = &session.table else {
        let hint = Paragraph::new("No dataset loaded. Esc: back")
            .block(Block::default().borders(Borders::ALL).title("Charts"));
        frame.render_widget(hint, frame.area());
        return;
    };

    let numeric = loaded.table.numeric_columns();
    if numeric.is_empty() {
        let hint = Paragraph::new("No numeric columns to chart. Esc: back")
            .block(Block::default().borders(Borders::ALL).title("Charts"));
        frame.render_widget(hint, frame.area());
        return;
    }

    let column = numeric[ui.chart_column % numeric.len()];
    let values = loaded.table.numeric_values(column);
    let points: Vec<(f64, f64)> = values
        .iter()
        .take(CHART_POINTS)
        .enumerate()
        .map(|(idx, value)| (idx as f64, *value))
        .collect();

    let (min, max) = points
        .iter()
        .fold((f64::MAX, f64::MIN), |(min, max), (_, value)| {
            (min.min(*value), max.max(*value))
        });
    let (min, max) = if points.is_empty() {
        (0.0, 1.0)
    } else {
        (min.min(0.0), max.max(min + 1.0))
    };

    let name = &loaded.table.columns[column];
    let datasets = vec![
        Dataset::default()
            .name(name.clone())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&points),
    ];
    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{name} (first {} rows) | arrows: column | Esc: back", points.len())),
        )
        .x_axis(
            Axis::default()
                .title("row")
                .bounds([0.0, points.len().max(1) as f64]),
        )
        .y_axis(
            Axis::default()
                .title(name.clone())
                .bounds([min, max])
                .labels(vec![format!("{min:.1}"), format!("{max:.1}")]),
        );
    frame.render_widget(chart, frame.area());
}

fn draw_api_keys(frame: &mut ratatui::Frame, session: &Session, ui: &UiState) {
    let mut lines = vec![
        Line::from("API Access Management"),
        Line::from(""),
        Line::from("g: generate new API key   d: load documentation   Esc: back"),
        Line::from(""),
    ];

    if let Some(grant) = &ui.key_grant {
        lines.push(Line::from(Span::styled(
            "New API key (displayed once):",
            Style::default().fg(Color::Green),
        )));
        lines.push(Line::from(grant.api_key.as_str()));
        if !grant.message.is_empty() {
            lines.push(Line::from(Span::styled(
                grant.message.as_str(),
                Style::default().fg(Color::Yellow),
            )));
        }
        lines.push(Line::from(""));
    }

    if let Some(docs) = &ui.docs {
        lines.push(Line::from(format!("Base URL: {}", docs.base_url)));
        lines.push(Line::from(format!(
            "Auth: {} via {}",
            docs.authentication.auth_type, docs.authentication.header
        )));
        lines.push(Line::from(""));
        for (endpoint, details) in &docs.endpoints {
            lines.push(Line::from(Span::styled(
                endpoint.as_str(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("  {}", details.description)));
            if !details.parameters.is_empty() {
                lines.push(Line::from(format!(
                    "  parameters: {}",
                    details.parameters.join(", ")
                )));
            }
        }
        if !docs.available_datasets.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from("Your available datasets:"));
            for dataset in &docs.available_datasets {
                lines.push(Line::from(format!("  {dataset}")));
            }
        }
    }

    lines.push(status_line(session));
    let text = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("API"));
    frame.render_widget(text, frame.area());
}

fn draw_settings(frame: &mut ratatui::Frame, session: &Session, ui: &UiState) {
    let area = centered_rect(frame.area(), 70, 14);
    let text = Paragraph::new(vec![
        Line::from("Settings"),
        Line::from(""),
        Line::from("Kaggle credentials (stored per user):"),
        input_line(
            "Username",
            &ui.kaggle_username,
            ui.focus == Focus::KaggleUsername,
            false,
        ),
        input_line("API key", &ui.kaggle_key, ui.focus == Focus::KaggleKey, true),
        Line::from(""),
        Line::from("Custom API subdomain:"),
        input_line("Subdomain", &ui.subdomain, ui.focus == Focus::Subdomain, false),
        Line::from(""),
        Line::from("Tab: next field   Enter: save focused form"),
        Line::from("F8: delete Kaggle credentials   F9: delete subdomain   Esc: back"),
        status_line(session),
    ])
    .block(Block::default().borders(Borders::ALL).title("Settings"));
    frame.render_widget(text, area);
}
