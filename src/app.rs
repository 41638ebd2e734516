use color_eyre::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use itertools::Itertools;
use ratatui::{
    layout::{Constraint, Flex, Layout, Margin, Position, Rect},
    style::{palette::tailwind, Color, Modifier, Style, Stylize},
    text::{Line, Text},
    widgets::{
        Block, BorderType, Cell, Clear, HighlightSpacing, Paragraph, Row, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Table, TableState, Wrap,
    },
    DefaultTerminal, Frame,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::{
    dispatch::{Command, Dispatcher, Epoch, Reply},
    entities::{session::Session, todo::Todo},
    input::InputField,
    router::{GateAction, Route, SessionGate},
    store::{TodoList, TodoRequest},
};

const HOME_KEYS: [(&str, &str); 7] = [
    ("Add", "a"),
    ("Done", "<space>"),
    ("Delete", "d"),
    ("Reload", "r"),
    ("Sign out", "o"),
    ("Move", "j/k"),
    ("Quit", "q"),
];
const INPUT_KEYS: [(&str, &str); 2] = [("Save", "<enter>"), ("Cancel", "<esc>")];
const LOGIN_KEYS: [(&str, &str); 2] = [("Sign in", "<enter>"), ("Quit", "<esc>")];

const LOGIN_WIDTH: u16 = 64;

fn key_help(keys: &[(&str, &str)]) -> String {
    keys.iter()
        .map(|(action, key)| format!("{action}: {key}"))
        .join(" | ")
}

struct TableColors {
    buffer_bg: Color,
    header_bg: Color,
    row_fg: Color,
    done_fg: Color,
    selected_row_style_fg: Color,
    normal_row_color: Color,
    alt_row_color: Color,
    footer_border_color: Color,
    error_fg: Color,
}

impl TableColors {
    const fn new(color: &tailwind::Palette) -> Self {
        Self {
            buffer_bg: tailwind::SLATE.c950,
            header_bg: color.c900,
            row_fg: tailwind::SLATE.c200,
            done_fg: color.c400,
            selected_row_style_fg: color.c400,
            normal_row_color: tailwind::SLATE.c950,
            alt_row_color: tailwind::SLATE.c900,
            footer_border_color: color.c400,
            error_fg: tailwind::RED.c400,
        }
    }
}

pub struct App {
    route: Route,
    session: Option<Session>,
    gate: SessionGate,
    list: TodoList,
    epoch: Epoch,
    dedupe: bool,
    dispatcher: Dispatcher,
    provider: String,
    sign_in_url: String,
    callback: InputField,
    signing_in: bool,
    signing_out: bool,
    login_error: Option<String>,
    input_visible: bool,
    state: TableState,
    scroll_state: ScrollbarState,
    colors: TableColors,
    should_quit: bool,
}

impl App {
    pub fn new(
        dispatcher: Dispatcher,
        session: Option<Session>,
        provider: String,
        sign_in_url: String,
        dedupe: bool,
    ) -> Self {
        let mut list = TodoList::new(dedupe);
        list.set_owner(session.as_ref().map(|s| s.user.id));
        Self {
            route: Route::Home,
            session,
            gate: SessionGate::new(),
            list,
            epoch: 0,
            dedupe,
            dispatcher,
            provider,
            sign_in_url,
            callback: InputField::new(),
            signing_in: false,
            signing_out: false,
            login_error: None,
            input_visible: false,
            state: TableState::default().with_selected(0),
            scroll_state: ScrollbarState::new(0),
            colors: TableColors::new(&tailwind::INDIGO),
            should_quit: false,
        }
    }

    pub async fn run(
        mut self,
        mut terminal: DefaultTerminal,
        mut replies: UnboundedReceiver<Reply>,
    ) -> Result<()> {
        let mut events = EventStream::new();
        while !self.should_quit {
            self.sync_gate();
            terminal.draw(|frame| self.draw(frame))?;

            tokio::select! {
                Some(reply) = replies.recv() => self.handle_reply(reply),
                event = events.next() => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                },
            }
        }
        Ok(())
    }

    /// Applies gate decisions until the (route, session) pair settles.
    fn sync_gate(&mut self) {
        while let Some(action) = self.gate.check(self.route, self.session.as_ref()) {
            match action {
                GateAction::Redirect(route) => {
                    debug!(from = self.route.path(), to = route.path(), "redirect");
                    self.route = route;
                }
                GateAction::Load => {
                    let request = self.list.begin_load();
                    self.send(request);
                }
            }
        }
    }

    fn send(&self, request: TodoRequest) {
        self.dispatcher.dispatch(Command::Todo {
            epoch: self.epoch,
            request,
        });
    }

    /// Starts an empty list for the current session. Replies to requests
    /// issued before the reset no longer match the epoch and are dropped.
    fn reset_list(&mut self) {
        self.epoch += 1;
        self.list = TodoList::new(self.dedupe);
        self.list.set_owner(self.session.as_ref().map(|s| s.user.id));
        self.state.select(Some(0));
        self.scroll_state = ScrollbarState::new(0);
    }

    fn handle_reply(&mut self, reply: Reply) {
        match reply {
            Reply::Todo { epoch, response } if epoch != self.epoch => {
                debug!(epoch, current = self.epoch, ?response, "dropping stale reply");
            }
            Reply::Todo { response, .. } => {
                self.list.apply(response);
                self.clamp_selection();
            }
            Reply::SignedIn(Ok(session)) => {
                info!(user = %session.user.id, "session established");
                self.signing_in = false;
                self.login_error = None;
                self.callback.clear();
                self.session = Some(session);
                self.reset_list();
            }
            Reply::SignedIn(Err(err)) => {
                self.signing_in = false;
                self.login_error = Some(format!("Error signing in: {err}"));
            }
            Reply::SignedOut => {
                self.signing_out = false;
                self.session = None;
                self.reset_list();
                self.input_visible = false;
                self.route = Route::Login;
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Paste(text) => match self.route {
                Route::Login => self.callback.enter_str(&text),
                Route::Home if self.input_visible => self.list.new_task_mut().enter_str(&text),
                Route::Home => {}
            },
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.route {
            Route::Login => self.handle_login_key(key.code),
            Route::Home if self.session.is_none() => {}
            Route::Home if self.list.notice().is_some() => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    self.list.dismiss_notice();
                }
            }
            Route::Home if self.input_visible => self.handle_input_key(key.code),
            Route::Home => self.handle_home_key(key.code),
        }
    }

    fn handle_login_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => self.submit_callback(),
            KeyCode::Char(c) => self.callback.enter_char(c),
            KeyCode::Backspace => self.callback.delete_char(),
            KeyCode::Left => self.callback.move_cursor_left(),
            KeyCode::Right => self.callback.move_cursor_right(),
            _ => {}
        }
    }

    fn submit_callback(&mut self) {
        if self.signing_in || self.callback.is_blank() {
            return;
        }
        self.signing_in = true;
        self.login_error = None;
        self.dispatcher.dispatch(Command::SignIn {
            callback: self.callback.value().to_string(),
        });
    }

    fn handle_input_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.input_visible = false,
            KeyCode::Enter => {
                if let Some(request) = self.list.submit() {
                    self.send(request);
                    self.input_visible = false;
                }
            }
            KeyCode::Char(c) => self.list.new_task_mut().enter_char(c),
            KeyCode::Backspace => self.list.new_task_mut().delete_char(),
            KeyCode::Left => self.list.new_task_mut().move_cursor_left(),
            KeyCode::Right => self.list.new_task_mut().move_cursor_right(),
            _ => {}
        }
    }

    fn handle_home_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('a') => self.input_visible = true,
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.next_row(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_row(),
            KeyCode::Char(' ') => {
                if let Some((id, is_complete)) = self.selected().map(|t| (t.id, t.is_complete)) {
                    if let Some(request) = self.list.toggle(id, is_complete) {
                        self.send(request);
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = self.selected().map(|t| t.id) {
                    if let Some(request) = self.list.delete(id) {
                        self.send(request);
                    }
                }
            }
            KeyCode::Char('r') => {
                let request = self.list.begin_load();
                self.send(request);
            }
            KeyCode::Char('o') if !self.signing_out => {
                self.signing_out = true;
                self.dispatcher.dispatch(Command::SignOut);
            }
            _ => {}
        }
    }

    fn selected(&self) -> Option<&Todo> {
        self.state.selected().and_then(|i| self.list.todos().get(i))
    }

    fn select(&mut self, i: usize) {
        self.state.select(Some(i));
        self.scroll_state = self.scroll_state.position(i);
    }

    pub fn next_row(&mut self) {
        let len = self.list.todos().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.select(i);
    }

    pub fn previous_row(&mut self) {
        let len = self.list.todos().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.select(i);
    }

    fn clamp_selection(&mut self) {
        let len = self.list.todos().len();
        self.scroll_state = self.scroll_state.content_length(len);
        if let Some(i) = self.state.selected() {
            if len > 0 && i >= len {
                self.select(len - 1);
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        match self.route {
            Route::Login => self.render_login(frame),
            // Without a session the home view shows nothing until the redirect lands.
            Route::Home => {
                if let Some(session) = self.session.clone() {
                    self.render_home(frame, &session);
                }
            }
        }
    }

    fn render_login(&self, frame: &mut Frame) {
        let area = centered(frame.area(), LOGIN_WIDTH, 16);
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title("Sign in")
            .bg(self.colors.buffer_bg)
            .fg(self.colors.row_fg)
            .border_style(Style::new().fg(self.colors.footer_border_color));
        frame.render_widget(Clear, area);

        if self.session.is_some() {
            frame.render_widget(Paragraph::new("Redirecting...").block(block), area);
            return;
        }

        let inner = block.inner(area);
        frame.render_widget(block, area);
        let [intro, url, prompt, field, status, help] = Layout::vertical([
            Constraint::Length(2),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(inner.inner(Margin {
            vertical: 0,
            horizontal: 1,
        }));

        let provider = capitalize(&self.provider);
        frame.render_widget(
            Paragraph::new(Text::from(vec![
                Line::from(format!("Continue with {provider}")).bold(),
                Line::from("Open this address in a browser:"),
            ])),
            intro,
        );
        frame.render_widget(
            Paragraph::new(self.sign_in_url.as_str())
                .fg(self.colors.done_fg)
                .wrap(Wrap { trim: false }),
            url,
        );
        frame.render_widget(
            Paragraph::new("Then paste the address you were sent back to:"),
            prompt,
        );
        frame.render_widget(
            Paragraph::new(self.callback.value()).block(
                Block::bordered()
                    .border_type(BorderType::Rounded)
                    .fg(self.colors.selected_row_style_fg),
            ),
            field,
        );
        let status_line = match (&self.login_error, self.signing_in) {
            (_, true) => Line::from("Signing in..."),
            (Some(err), false) => Line::from(err.as_str()).fg(self.colors.error_fg),
            (None, false) => Line::default(),
        };
        frame.render_widget(Paragraph::new(status_line), status);
        frame.render_widget(
            Paragraph::new(key_help(&LOGIN_KEYS)).fg(self.colors.header_bg),
            help,
        );
        frame.set_cursor_position(cursor_in(field, &self.callback));
    }

    fn render_home(&mut self, frame: &mut Frame, session: &Session) {
        let [header, body, footer] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(frame.area());

        self.render_header(frame, header, session);
        if self.list.is_loading() {
            frame.render_widget(Paragraph::new("Loading...").block(self.body_block()), body);
        } else if self.list.todos().is_empty() {
            frame.render_widget(
                Paragraph::new("No todos yet! Add one above.").block(self.body_block()),
                body,
            );
        } else {
            self.render_table(frame, body);
            self.render_scrollbar(frame, body);
        }
        self.render_footer(frame, footer);

        if self.input_visible {
            self.render_input(frame);
        }
        if let Some(notice) = self.list.notice() {
            self.render_notice(frame, &notice.text);
        }
    }

    fn body_block(&self) -> Block<'static> {
        Block::bordered()
            .border_type(BorderType::Rounded)
            .title("Todos")
            .bg(self.colors.buffer_bg)
            .fg(self.colors.header_bg)
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, session: &Session) {
        let title = Line::from(vec![
            "My Todo List".bold(),
            "  ".into(),
            format!("Hello, {}", session.display_name()).fg(self.colors.row_fg),
        ]);
        frame.render_widget(
            Paragraph::new(title).block(
                Block::bordered()
                    .border_type(BorderType::Rounded)
                    .bg(self.colors.buffer_bg)
                    .fg(self.colors.header_bg),
            ),
            area,
        );
    }

    fn render_table(&mut self, frame: &mut Frame, area: Rect) {
        let selected_row_style = Style::default()
            .add_modifier(Modifier::REVERSED)
            .fg(self.colors.selected_row_style_fg);

        let rows = self.list.todos().iter().enumerate().map(|(i, todo)| {
            let bg = if i % 2 == 0 {
                self.colors.normal_row_color
            } else {
                self.colors.alt_row_color
            };
            let fg = if todo.is_complete {
                self.colors.done_fg
            } else {
                self.colors.row_fg
            };
            let task = if todo.is_complete {
                Cell::from(todo.task.as_str()).add_modifier(Modifier::CROSSED_OUT)
            } else {
                Cell::from(todo.task.as_str())
            };
            Row::new(vec![Cell::from(todo.state().label()), task])
                .style(Style::new().fg(fg).bg(bg))
                .height(1)
        });
        let table = Table::new(rows, [Constraint::Length(4), Constraint::Min(1)])
            .block(self.body_block())
            .row_highlight_style(selected_row_style)
            .bg(self.colors.buffer_bg)
            .highlight_spacing(HighlightSpacing::Always);
        frame.render_stateful_widget(table, area, &mut self.state);
    }

    fn render_scrollbar(&mut self, frame: &mut Frame, area: Rect) {
        frame.render_stateful_widget(
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(None)
                .end_symbol(None),
            area.inner(Margin {
                vertical: 1,
                horizontal: 1,
            }),
            &mut self.scroll_state,
        );
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let keys = if self.input_visible {
            key_help(&INPUT_KEYS)
        } else {
            key_help(&HOME_KEYS)
        };
        let status = match self.list.draft_state() {
            Some(state) => format!("  [{}...]", state.label()),
            None => String::new(),
        };
        let info_footer = Paragraph::new(format!("{keys}{status}"))
            .style(
                Style::new()
                    .fg(self.colors.row_fg)
                    .bg(self.colors.buffer_bg),
            )
            .centered()
            .block(
                Block::bordered()
                    .border_type(BorderType::Double)
                    .border_style(Style::new().fg(self.colors.footer_border_color)),
            );
        frame.render_widget(info_footer, area);
    }

    fn render_input(&self, frame: &mut Frame) {
        let input_area = centered(frame.area(), frame.area().width / 2, 3);
        let field = self.list.new_task();
        let popup = Paragraph::new(field.value()).fg(Color::Gray).block(
            Block::bordered()
                .title("What do you need to do?")
                .fg(self.colors.selected_row_style_fg)
                .bg(self.colors.buffer_bg)
                .border_type(BorderType::Rounded),
        );
        frame.render_widget(Clear, input_area);
        frame.render_widget(popup, input_area);
        frame.set_cursor_position(cursor_in(input_area, field));
    }

    fn render_notice(&self, frame: &mut Frame, text: &str) {
        let area = centered(frame.area(), frame.area().width / 2, 5);
        let popup = Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .fg(self.colors.row_fg)
            .block(
                Block::bordered()
                    .title("Error")
                    .title_bottom(Line::from("<enter> OK").right_aligned())
                    .border_type(BorderType::Double)
                    .bg(self.colors.buffer_bg)
                    .fg(self.colors.error_fg),
            );
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

/// Cursor inside a bordered one-line field, pinned to its right edge when the text overflows.
fn cursor_in(area: Rect, field: &InputField) -> Position {
    let max = area.width.saturating_sub(2);
    Position::new(
        area.x + 1 + field.cursor_column().min(max),
        area.y + 1,
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
