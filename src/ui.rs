use std::future::Future;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::debug;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tokio::runtime::Handle;

use crate::editor::TextField;
use crate::error::GatewayError;
use crate::flows::detail::RerunOutcome;
use crate::flows::form::FormOutcome;
use crate::flows::{DeleteConfirm, DetailView, FormField, TaskForm};
use crate::listing::{rows, NameSort, Pager, SearchBox, TaskRow};
use crate::models::{Task, TaskExecution};
use crate::store::{Notice, NoticeLevel, TaskStore};

/// Result of a spawned request, delivered back to the draw loop.
#[derive(Debug)]
enum Completion {
    Refreshed,
    RowRun,
    Submitted(Result<Task, GatewayError>),
    Rerun(Result<TaskExecution, GatewayError>),
    Deleted,
}

pub struct App {
    store: Arc<TaskStore>,
    runtime: Handle,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    pub table_state: TableState,
    pub sort: NameSort,
    pub pager: Pager,
    pub search: SearchBox,
    pub form: TaskForm,
    pub detail: DetailView,
    pub confirm: DeleteConfirm,
    pub status: Option<Notice>,
    pub should_quit: bool,
}

impl App {
    pub fn new(store: Arc<TaskStore>, runtime: Handle, page_size: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        let app = App {
            store,
            runtime,
            tx,
            rx,
            table_state: TableState::default(),
            sort: NameSort::None,
            pager: Pager::new(page_size),
            search: SearchBox::default(),
            form: TaskForm::default(),
            detail: DetailView::default(),
            confirm: DeleteConfirm::default(),
            status: None,
            should_quit: false,
        };
        app.refresh("");
        app
    }

    fn spawn<F>(&self, request: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let completion = request.await;
            // The receiver is gone only when the console has exited.
            let _ = tx.send(completion);
        });
    }

    pub fn refresh(&self, fragment: &str) {
        let store = self.store.clone();
        let fragment = fragment.to_string();
        self.spawn(async move {
            let _ = store.refresh(&fragment).await;
            Completion::Refreshed
        });
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn all_rows(&self) -> Vec<TaskRow> {
        rows(&self.store.tasks(), self.sort)
    }

    pub fn visible_rows(&self) -> Vec<TaskRow> {
        let all = self.all_rows();
        self.pager.slice(&all).to_vec()
    }

    pub fn selected_row(&self) -> Option<TaskRow> {
        let i = self.table_state.selected()?;
        self.visible_rows().into_iter().nth(i)
    }

    fn selected_task(&self) -> Option<Task> {
        self.selected_row().and_then(|row| self.store.find(&row.id))
    }

    fn flow_open(&self) -> bool {
        self.form.is_open() || self.detail.is_open() || self.confirm.is_open()
    }

    fn clamp_selection(&mut self) {
        let total = self.all_rows().len();
        self.pager.clamp(total);
        let visible = self.visible_rows().len();
        match self.table_state.selected() {
            _ if visible == 0 => self.table_state.select(None),
            Some(i) if i >= visible => self.table_state.select(Some(visible - 1)),
            None => self.table_state.select(Some(0)),
            Some(_) => {}
        }
    }

    fn select_id(&mut self, id: &str) {
        if let Some(pos) = self.all_rows().iter().position(|r| r.id == id) {
            self.pager.index = pos / self.pager.size;
            self.table_state.select(Some(pos % self.pager.size));
        }
    }

    pub fn next_item(&mut self) {
        let len = self.visible_rows().len();
        if len == 0 {
            return;
        }
        let i = match self.table_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.table_state.select(Some(i));
    }

    pub fn previous_item(&mut self) {
        let len = self.visible_rows().len();
        if len == 0 {
            return;
        }
        let i = match self.table_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.table_state.select(Some(i));
    }

    pub fn next_page(&mut self) {
        let total = self.all_rows().len();
        self.pager.next(total);
        self.table_state.select(Some(0));
        self.clamp_selection();
    }

    pub fn previous_page(&mut self) {
        self.pager.previous();
        self.table_state.select(Some(0));
        self.clamp_selection();
    }

    pub fn open_create(&mut self) {
        if !self.flow_open() {
            self.form.open_create();
        }
    }

    pub fn open_edit(&mut self) {
        if self.flow_open() {
            return;
        }
        if let Some(task) = self.selected_task() {
            self.form.open_edit(&task);
        }
    }

    pub fn open_detail(&mut self) {
        if self.flow_open() {
            return;
        }
        if let Some(task) = self.selected_task() {
            self.detail.open(task);
        }
    }

    pub fn request_delete(&mut self) {
        if self.flow_open() {
            return;
        }
        if let Some(row) = self.selected_row() {
            self.confirm.request(&row.id);
        }
    }

    pub fn run_selected(&mut self) {
        if let Some(row) = self.selected_row() {
            debug!("running {} from table", row.id);
            let store = self.store.clone();
            self.spawn(async move {
                let _ = store.run(&row.id).await;
                Completion::RowRun
            });
        }
    }

    pub fn submit_form(&mut self) {
        if let Some((payload, kind)) = self.form.begin_submit() {
            let store = self.store.clone();
            self.spawn(async move { Completion::Submitted(store.submit(&payload, kind).await) });
        }
    }

    pub fn rerun_detail(&mut self) {
        if let Some(id) = self.detail.begin_rerun() {
            let store = self.store.clone();
            self.spawn(async move { Completion::Rerun(store.run(&id).await) });
        }
    }

    pub fn confirm_delete(&mut self) {
        if let Some(id) = self.confirm.confirm() {
            let store = self.store.clone();
            self.spawn(async move {
                let _ = store.remove(&id).await;
                Completion::Deleted
            });
        }
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Submitted(result) => {
                if let FormOutcome::Saved(task) = self.form.finish_submit(result) {
                    self.select_id(&task.id);
                }
            }
            Completion::Rerun(result) => {
                if let RerunOutcome::Completed(_) = self.detail.finish_rerun(result) {
                    debug!("detail view closed after rerun");
                }
            }
            Completion::Deleted => self.confirm.finish(),
            Completion::Refreshed | Completion::RowRun => {}
        }
    }

    /// Applies every completion that has arrived, then shows the most severe new notice.
    ///
    /// Among notices of equal severity the newest wins, so an error is never
    /// covered by an info or success notice from the same batch.
    pub fn drain_completions(&mut self) {
        while let Ok(completion) = self.rx.try_recv() {
            self.apply(completion);
        }
        if let Some(notice) = self
            .store
            .take_notices()
            .into_iter()
            .max_by_key(|n| n.level)
        {
            self.status = Some(notice);
        }
        self.clamp_selection();
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.form.is_open() {
            self.handle_form_key(key);
        } else if self.detail.is_open() {
            self.handle_detail_key(key);
        } else if self.confirm.is_open() {
            self.handle_confirm_key(key);
        } else if self.search.editing {
            self.handle_search_key(key);
        } else {
            self.handle_table_key(key);
        }
    }

    fn handle_table_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.next_item(),
            KeyCode::Up | KeyCode::Char('k') => self.previous_item(),
            KeyCode::Right | KeyCode::Char(']') => self.next_page(),
            KeyCode::Left | KeyCode::Char('[') => self.previous_page(),
            KeyCode::Char('z') => {
                self.pager.cycle_size();
                self.clamp_selection();
            }
            KeyCode::Char('s') => self.sort = self.sort.cycle(),
            KeyCode::Char('/') => self.search.begin(),
            KeyCode::Char('n') => self.open_create(),
            KeyCode::Char('e') => self.open_edit(),
            KeyCode::Enter | KeyCode::Char('v') => self.open_detail(),
            KeyCode::Char('r') => self.run_selected(),
            KeyCode::Char('d') | KeyCode::Delete => self.request_delete(),
            KeyCode::Char('R') | KeyCode::F(5) => {
                let filter = self.store.active_filter();
                self.refresh(&filter);
            }
            _ => {}
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                let fragment = self.search.submit();
                self.pager.index = 0;
                self.refresh(&fragment);
            }
            KeyCode::Esc => self.search.abandon(),
            KeyCode::Backspace => self.search.backspace(),
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                let fragment = self.search.clear();
                self.pager.index = 0;
                self.refresh(&fragment);
            }
            KeyCode::Char(c) => self.search.push(c),
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.form.close(),
            KeyCode::Tab => self.form.focus_next(),
            KeyCode::BackTab => self.form.focus_previous(),
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => self.submit_form(),
            KeyCode::Enter => {
                let in_command = self
                    .form
                    .session()
                    .is_some_and(|s| s.focus == FormField::Command);
                if in_command {
                    if let Some(session) = self.form.session_mut() {
                        session.command.insert_newline();
                    }
                } else {
                    self.submit_form();
                }
            }
            code => {
                let Some(session) = self.form.session_mut() else {
                    return;
                };
                let field = session.focused_mut();
                match code {
                    KeyCode::Char(c) => field.insert_char(c),
                    KeyCode::Backspace => field.delete_char(),
                    KeyCode::Left => field.move_cursor_left(),
                    KeyCode::Right => field.move_cursor_right(),
                    KeyCode::Up => field.move_cursor_up(),
                    KeyCode::Down => field.move_cursor_down(),
                    KeyCode::Home => field.move_to_start_of_line(),
                    KeyCode::End => field.move_to_end_of_line(),
                    _ => {}
                }
            }
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.detail.close(),
            KeyCode::Char('r') => self.rerun_detail(),
            KeyCode::Down | KeyCode::Char('j') => self.detail.scroll_down(),
            KeyCode::Up | KeyCode::Char('k') => self.detail.scroll_up(),
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => self.confirm_delete(),
            KeyCode::Char('n') | KeyCode::Esc => self.confirm.cancel(),
            _ => {}
        }
    }
}

pub fn run_tui(store: Arc<TaskStore>, runtime: Handle, page_size: usize) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(store, runtime, page_size);
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        app.drain_completions();
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(f.area());

    render_search(f, app, chunks[0]);
    render_tasks(f, app, chunks[1]);
    render_status(f, app, chunks[2]);

    if let Some(session) = app.form.session_mut() {
        let area = centered_rect(70, 80, f.area());
        f.render_widget(Clear, area);
        render_form(f, session, area);
    } else if app.detail.is_open() {
        let area = centered_rect(80, 85, f.area());
        f.render_widget(Clear, area);
        render_detail(f, &app.detail, area);
    } else if let Some(task_id) = app.confirm.pending_id() {
        let area = centered_rect(50, 25, f.area());
        f.render_widget(Clear, area);
        let deleting = matches!(app.confirm, DeleteConfirm::Confirmed { .. });
        render_confirm(f, task_id, deleting, area);
    }
}

// Helper function to create centered rectangles for popups
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn render_search(f: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if app.search.editing {
        (
            format!("{}█", app.search.input),
            Style::default().fg(Color::Yellow),
        )
    } else if app.search.input.is_empty() {
        (
            "Press / to search tasks by name".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (app.search.input.clone(), Style::default().fg(Color::White))
    };

    let search = Paragraph::new(text)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title("Search"));
    f.render_widget(search, area);
}

fn render_tasks(f: &mut Frame, app: &mut App, area: Rect) {
    let all = app.all_rows();
    let page_count = app.pager.page_count(all.len());
    let visible = app.pager.slice(&all);

    let header = Row::new(vec![
        Cell::from("ID"),
        Cell::from(format!("Name{}", app.sort.label())),
        Cell::from("Owner"),
        Cell::from("Runs"),
    ])
    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    let table_rows: Vec<Row> = visible
        .iter()
        .map(|row| {
            let runs_style = if row.runs > 0 {
                Style::default().fg(Color::Blue)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Row::new(vec![
                Cell::from(row.id.clone()),
                Cell::from(row.name.clone()),
                Cell::from(row.owner.clone()),
                Cell::from(Span::styled(row.runs.to_string(), runs_style)),
            ])
        })
        .collect();

    let mut title = format!(
        "Tasks ({}) - page {}/{} - {} per page",
        all.len(),
        app.pager.index + 1,
        page_count,
        app.pager.size
    );
    if app.is_loading() {
        title.push_str(" - loading...");
    }

    let table = Table::new(
        table_rows,
        [
            Constraint::Length(20),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(
        Style::default()
            .bg(Color::LightGreen)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol(">> ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let help = "n: new  e: edit  Enter: view  r: run  d: delete  /: search  s: sort  [ ]: page  z: page size  R: refresh  q: quit";
    let line = match &app.status {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Success => Color::Green,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(notice.text.clone(), Style::default().fg(color)))
        }
        None => Line::from(Span::styled("Ready", Style::default().fg(Color::DarkGray))),
    };
    let status = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(help));
    f.render_widget(status, area);
}

/// Renders a field's visible lines with the cursor drawn when focused.
fn field_lines(field: &mut TextField, focused: bool, height: usize) -> Vec<Line<'static>> {
    field.adjust_scroll_with_height(height);
    let end = (field.scroll_offset + height).min(field.content.len());
    let mut lines = Vec::new();

    for i in field.scroll_offset..end {
        let chars: Vec<char> = field.content[i].chars().collect();
        if focused && i == field.cursor_row && !field.locked {
            let col = field.cursor_col.min(chars.len());
            let before: String = chars[..col].iter().collect();
            let cursor: String = chars.get(col).map(|c| c.to_string()).unwrap_or_else(|| " ".to_string());
            let after: String = chars.get(col + 1..).map(|rest| rest.iter().collect()).unwrap_or_default();
            lines.push(Line::from(vec![
                Span::raw(before),
                Span::styled(cursor, Style::default().bg(Color::Cyan).fg(Color::Black)),
                Span::raw(after),
            ]));
        } else {
            lines.push(Line::from(field.content[i].clone()));
        }
    }
    lines
}

fn render_form(f: &mut Frame, session: &mut crate::flows::form::FormSession, area: Rect) {
    let title = if session.is_edit() { "Edit Task" } else { "Create New Task" };
    let block = Block::default()
        .title(format!("{} - Tab: next field | Ctrl+S: save | Esc: close", title))
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(2),
        ])
        .split(inner);

    for (slot, field) in FormField::ALL.into_iter().enumerate() {
        let focused = session.focus == field;
        let area = chunks[slot];
        let height = area.height.saturating_sub(2) as usize;
        let text_field = session.field_mut(field);
        let locked = text_field.locked;
        let dirty = text_field.is_dirty;
        let lines = field_lines(text_field, focused, height);

        let label = if locked {
            format!("{} (read-only)", field.label())
        } else if dirty {
            format!("{} *", field.label())
        } else {
            field.label().to_string()
        };
        let border = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::White)
        };
        let input = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(label),
        );
        f.render_widget(input, area);
    }

    let footer = match (&session.error, session.submitting) {
        (_, true) => Line::from(Span::styled("Saving...", Style::default().fg(Color::Yellow))),
        (Some(error), false) => Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))),
        (None, false) => {
            let action = if session.is_edit() { "Update Task" } else { "Create Task" };
            Line::from(format!("Enter or Ctrl+S: {}", action))
        }
    };
    f.render_widget(Paragraph::new(footer).wrap(Wrap { trim: false }), chunks[4]);
}

fn render_detail(f: &mut Frame, detail: &DetailView, area: Rect) {
    let Some(session) = detail.session() else {
        return;
    };
    let task = &session.task;
    let block = Block::default()
        .title(format!("Task Details: {} - r: run again | Esc: close", task.name))
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Black).fg(Color::White));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(1)])
        .split(inner);

    let meta = Paragraph::new(vec![
        Line::from(format!("ID: {}", task.id)),
        Line::from(format!("Owner: {}", task.owner)),
        Line::from(vec![
            Span::raw("Command: "),
            Span::styled(task.command.clone(), Style::default().fg(Color::Yellow)),
        ]),
    ])
    .wrap(Wrap { trim: false });
    f.render_widget(meta, chunks[0]);

    let items: Vec<ListItem> = if session.history.is_empty() {
        vec![ListItem::new("No executions found for this task.")]
    } else {
        session
            .history
            .iter()
            .skip(session.scroll)
            .map(|entry| {
                let duration = entry
                    .duration_secs
                    .map(|s| format!("{}s", s))
                    .unwrap_or_else(|| "n/a".to_string());
                let mut lines = vec![Line::from(vec![
                    Span::styled("COMPLETED ", Style::default().fg(Color::Green)),
                    Span::styled("Start: ", Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(format!("{}  ", entry.start_time)),
                    Span::styled("Duration: ", Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw(duration),
                ])];
                if entry.output.is_empty() {
                    lines.push(Line::from(Span::styled(
                        "No output recorded.",
                        Style::default().fg(Color::DarkGray),
                    )));
                } else {
                    lines.extend(entry.output.lines().map(|l| Line::from(format!("  {}", l))));
                }
                lines.push(Line::from(""));
                ListItem::new(lines)
            })
            .collect()
    };
    let history = List::new(items).block(
        Block::default()
            .borders(Borders::TOP)
            .title(format!("Execution History ({} runs)", task.run_count())),
    );
    f.render_widget(history, chunks[1]);

    let footer = match (&session.error, session.running) {
        (_, true) => Span::styled("Running...", Style::default().fg(Color::Yellow)),
        (Some(error), false) => Span::styled(error.clone(), Style::default().fg(Color::Red)),
        (None, false) => Span::raw(""),
    };
    f.render_widget(Paragraph::new(Line::from(footer)), chunks[2]);
}

fn render_confirm(f: &mut Frame, task_id: &str, deleting: bool, area: Rect) {
    let block = Block::default()
        .title("Confirm Deletion")
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::DarkGray));
    let prompt = if deleting {
        "Deleting...".to_string()
    } else {
        "y / Enter: Delete    n / Esc: Cancel".to_string()
    };
    let content = Paragraph::new(vec![
        Line::from("Are you sure you want to delete task ID:"),
        Line::from(Span::styled(
            task_id.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from("This action cannot be undone."),
        Line::from(""),
        Line::from(prompt),
    ])
    .block(block)
    .alignment(Alignment::Center)
    .style(Style::default().fg(Color::White));

    f.render_widget(content, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::store::testing::*;
    use crate::store::StoreOptions;
    use std::sync::atomic::Ordering;

    impl App {
        /// Blocks until one completion arrives, then drains the rest.
        fn settle(&mut self) {
            if let Ok(completion) = self.rx.recv_timeout(Duration::from_secs(5)) {
                self.apply(completion);
            }
            self.drain_completions();
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn setup() -> (tokio::runtime::Runtime, Arc<FakeGateway>, App) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let gateway = Arc::new(FakeGateway::with_tasks(vec![
            task("T1", "Deploy", "Jane", "echo hi"),
            task("T2", "Backup", "Bob", "tar -czf a.tgz ."),
        ]));
        let store = Arc::new(TaskStore::new(gateway.clone(), StoreOptions::default()));
        let mut app = App::new(store, runtime.handle().clone(), 10);
        app.settle();
        (runtime, gateway, app)
    }

    #[test]
    fn test_initial_load_selects_first_row() {
        let (_runtime, _gateway, app) = setup();
        assert_eq!(app.visible_rows().len(), 2);
        assert_eq!(app.selected_row().unwrap().id, "T1");
    }

    #[test]
    fn test_cancelled_delete_sends_nothing() {
        let (_runtime, gateway, mut app) = setup();
        app.handle_key(key(KeyCode::Char('d')));
        assert_eq!(app.confirm.pending_id(), Some("T1"));

        // Other flows stay closed while the confirmation is showing.
        app.handle_key(key(KeyCode::Char('v')));
        app.handle_key(key(KeyCode::Char('n')));
        assert!(!app.detail.is_open());
        assert!(!app.confirm.is_open());
        assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_confirmed_delete_removes_row() {
        let (_runtime, gateway, mut app) = setup();
        app.handle_key(key(KeyCode::Char('d')));
        app.handle_key(key(KeyCode::Char('y')));
        app.settle();

        assert_eq!(app.confirm, DeleteConfirm::Idle);
        assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 1);
        let ids: Vec<String> = app.visible_rows().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["T2"]);
        assert_eq!(app.status.as_ref().unwrap().text, "Task T1 deleted successfully.");
    }

    #[test]
    fn test_search_without_match_shows_info() {
        let (_runtime, _gateway, mut app) = setup();
        app.handle_key(key(KeyCode::Char('/')));
        type_text(&mut app, "zzz");
        app.handle_key(key(KeyCode::Enter));
        app.settle();

        assert!(app.visible_rows().is_empty());
        assert!(app.selected_row().is_none());
        let status = app.status.clone().unwrap();
        assert_eq!(status.level, NoticeLevel::Info);
    }

    #[test]
    fn test_create_form_saves_and_selects_new_task() {
        let (_runtime, _gateway, mut app) = setup();
        app.handle_key(key(KeyCode::Char('n')));
        assert!(app.form.is_open());
        app.form.set(FormField::Id, "T3");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "Cleanup");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "Ann");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "rm -rf /tmp/x");
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));
        app.settle();

        assert!(!app.form.is_open());
        assert_eq!(app.selected_row().unwrap().id, "T3");
    }

    #[test]
    fn test_error_notice_survives_later_info() {
        let (runtime, gateway, mut app) = setup();
        gateway.fail_on("execute", failed(Operation::Execute, 500, None));
        let store = app.store.clone();
        assert!(runtime.block_on(store.run("T1")).is_err());
        runtime.block_on(store.refresh("zzz")).unwrap();

        app.drain_completions();
        let status = app.status.clone().unwrap();
        assert_eq!(status.level, NoticeLevel::Error);
        assert_eq!(status.text, "Failed to run task command.");
    }

    #[test]
    fn test_row_run_updates_run_count() {
        let (_runtime, _gateway, mut app) = setup();
        app.handle_key(key(KeyCode::Char('r')));
        app.settle();
        assert_eq!(app.selected_row().unwrap().runs, 1);
        assert_eq!(app.status.as_ref().unwrap().level, NoticeLevel::Success);
    }
}
