use crate::api::ApiClient;
use crate::config::Config;
use crate::error::ViewError;
use crate::list::ListView;
use crate::models::User;
use crate::validation::{AuthForm, SubmitOutcome};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::widgets::ListState;
use std::io;
use std::time::Duration;

pub struct App {
    pub api: ApiClient,
    pub list: ListView,
    pub state: ListState,
    pub sub_cursor: Option<usize>,
    pub session: Option<User>,
    pub input_mode: InputMode,
    pub input: String,
    pub auth: Option<AuthForm>,
    pub alert: Option<String>,
    debounce: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputMode {
    Normal,
    Search,
    AddTodo,
    AddSubTodo,
    EditTodo,
    EditSubTodo(i64),
    Auth,
    ConfirmDelete,
}

impl App {
    pub fn new(api: ApiClient, config: &Config) -> App {
        App {
            api,
            list: ListView::new(config.paged, config.page_size),
            state: ListState::default(),
            sub_cursor: None,
            session: None,
            input_mode: InputMode::Normal,
            input: String::new(),
            auth: None,
            alert: None,
            debounce: config.debounce(),
        }
    }

    pub fn session_name(&self) -> Option<String> {
        self.session.as_ref().map(|user| user.username.clone())
    }

    /// Session and list are fetched independently; neither failure blocks the other.
    pub async fn start(&mut self) {
        self.refresh_session().await;
        self.refresh().await;
    }

    pub async fn refresh_session(&mut self) {
        self.session = match self.api.current_user().await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!("No session: {}", err);
                None
            }
        };
        let session = self.session_name();
        self.list.sync_session(session.as_deref());
    }

    pub async fn refresh(&mut self) {
        if let Err(err) = self.list.load(&self.api).await {
            tracing::warn!("Error fetching todos: {}", err);
            self.alert = Some(err.user_message());
        }
        self.clamp_selection();
    }

    fn report(&mut self, err: ViewError) {
        tracing::warn!("{}", err);
        self.alert = Some(err.user_message());
    }

    /// Called once per loop iteration.
    pub fn tick(&mut self) {
        if let Some(form) = self.auth.as_mut() {
            form.pump(&self.api);
        }
        if let Some(notice) = self.list.notice.take() {
            self.alert = Some(notice);
        }
    }

    fn visible_len(&self) -> usize {
        self.list.visible(self.session_name().as_deref()).len()
    }

    /// Index into `list.rows` of the highlighted row.
    pub fn selected_row(&self) -> Option<usize> {
        let visible = self.list.visible(self.session_name().as_deref());
        self.state.selected().and_then(|i| visible.get(i).copied())
    }

    fn selected_sub_id(&self) -> Option<i64> {
        let row = &self.list.rows[self.selected_row()?];
        if !row.expanded {
            return None;
        }
        row.subitems.get(self.sub_cursor?).map(|item| item.id())
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            self.state.select(None);
        } else {
            let i = self.state.selected().unwrap_or(0).min(len - 1);
            self.state.select(Some(i));
        }
        self.reset_sub_cursor();
    }

    fn reset_sub_cursor(&mut self) {
        self.sub_cursor = self
            .selected_row()
            .map(|index| &self.list.rows[index])
            .filter(|row| row.expanded && !row.subitems.is_empty())
            .map(|_| 0);
    }

    pub fn next(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
        self.reset_sub_cursor();
    }

    pub fn previous(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
        self.reset_sub_cursor();
    }

    fn next_sub(&mut self) {
        let Some(index) = self.selected_row() else {
            return;
        };
        let count = self.list.rows[index].subitems.len();
        if !self.list.rows[index].expanded || count == 0 {
            self.sub_cursor = None;
            return;
        }
        self.sub_cursor = Some(match self.sub_cursor {
            Some(i) if i + 1 < count => i + 1,
            _ => 0,
        });
    }

    pub fn open_auth(&mut self) {
        self.auth = Some(AuthForm::new(self.debounce));
        self.input_mode = InputMode::Auth;
    }

    // Dropping the form cancels its pending timers.
    pub fn close_auth(&mut self) {
        self.auth = None;
        self.input_mode = InputMode::Normal;
    }

    pub async fn handle_input(&mut self, key: KeyEvent) -> io::Result<bool> {
        if self.alert.is_some() {
            self.alert = None;
            return Ok(false);
        }

        match self.input_mode {
            InputMode::Normal => return Ok(self.handle_normal(key).await),
            InputMode::Search => match key.code {
                KeyCode::Char(c) => {
                    self.input.push(c);
                    self.list.set_search(&self.input);
                    self.clamp_selection();
                }
                KeyCode::Backspace => {
                    self.input.pop();
                    self.list.set_search(&self.input);
                    self.clamp_selection();
                }
                KeyCode::Enter => self.input_mode = InputMode::Normal,
                KeyCode::Esc => {
                    self.input.clear();
                    self.list.set_search("");
                    self.input_mode = InputMode::Normal;
                    self.clamp_selection();
                }
                _ => {}
            },
            InputMode::AddTodo => match key.code {
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Enter => {
                    let session = self.session_name();
                    let title = self.input.clone();
                    match self.list.add(&self.api, session.as_deref(), &title).await {
                        Ok(()) => {
                            self.input.clear();
                            self.input_mode = InputMode::Normal;
                            self.clamp_selection();
                        }
                        Err(err) => self.report(err),
                    }
                }
                KeyCode::Esc => {
                    self.input.clear();
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            },
            InputMode::AddSubTodo => match key.code {
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Enter => {
                    let session = self.session_name();
                    let title = self.input.clone();
                    if let Some(index) = self.selected_row() {
                        let row = &mut self.list.rows[index];
                        match row.add_subitem(&self.api, session.as_deref(), &title).await {
                            Ok(()) => {
                                self.input.clear();
                                self.input_mode = InputMode::Normal;
                                self.reset_sub_cursor();
                            }
                            Err(err) => self.report(err),
                        }
                    }
                }
                KeyCode::Esc => {
                    self.input.clear();
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            },
            InputMode::EditTodo => {
                let Some(index) = self.selected_row() else {
                    self.input_mode = InputMode::Normal;
                    return Ok(false);
                };
                let row = &mut self.list.rows[index];
                match key.code {
                    KeyCode::Char(c) => {
                        if let Some(edit) = row.edit.as_mut() {
                            edit.push(c);
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(edit) = row.edit.as_mut() {
                            edit.pop();
                        }
                    }
                    KeyCode::Enter => {
                        self.input_mode = InputMode::Normal;
                        match row.commit_edit(&self.api).await {
                            Ok(true) => self.refresh().await,
                            Ok(false) => {}
                            Err(err) => self.report(err),
                        }
                    }
                    KeyCode::Esc => {
                        row.cancel_edit();
                        self.input_mode = InputMode::Normal;
                    }
                    _ => {}
                }
            }
            InputMode::EditSubTodo(sub_id) => {
                let Some(index) = self.selected_row() else {
                    self.input_mode = InputMode::Normal;
                    return Ok(false);
                };
                let row = &mut self.list.rows[index];
                match key.code {
                    KeyCode::Char(c) => {
                        if let Some(edit) = row.subitem_mut(sub_id).and_then(|s| s.edit.as_mut()) {
                            edit.push(c);
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(edit) = row.subitem_mut(sub_id).and_then(|s| s.edit.as_mut()) {
                            edit.pop();
                        }
                    }
                    KeyCode::Enter => {
                        self.input_mode = InputMode::Normal;
                        if let Err(err) = row.commit_subitem_edit(&self.api, sub_id).await {
                            self.report(err);
                        }
                    }
                    KeyCode::Esc => {
                        if let Some(item) = row.subitem_mut(sub_id) {
                            item.cancel_edit();
                        }
                        self.input_mode = InputMode::Normal;
                    }
                    _ => {}
                }
            }
            InputMode::Auth => self.handle_auth(key).await,
            InputMode::ConfirmDelete => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    self.input_mode = InputMode::Normal;
                    if let Err(err) = self.list.confirm_delete(&self.api).await {
                        self.report(err.into());
                    }
                    self.clamp_selection();
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.list.cancel_delete();
                    self.input_mode = InputMode::Normal;
                }
                _ => {}
            },
        }
        Ok(false)
    }

    async fn handle_auth(&mut self, key: KeyEvent) {
        let Some(form) = self.auth.as_mut() else {
            self.input_mode = InputMode::Normal;
            return;
        };
        match key.code {
            KeyCode::Char(c) => form.push_char(c),
            KeyCode::Backspace => form.pop_char(),
            KeyCode::Tab => form.focus_next(),
            KeyCode::F(2) => form.switch_mode(),
            KeyCode::Enter => match form.submit(&self.api).await {
                Some(SubmitOutcome::LoggedIn) => {
                    self.close_auth();
                    self.refresh_session().await;
                    self.refresh().await;
                }
                Some(SubmitOutcome::Registered) => {
                    self.alert = Some("Registration complete. Log in to continue.".into());
                }
                None => {}
            },
            KeyCode::Esc => self.close_auth(),
            _ => {}
        }
    }

    /// Returns `true` when the user asked to quit.
    async fn handle_normal(&mut self, key: KeyEvent) -> bool {
        let session = self.session_name();
        let session = session.as_deref();

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => self.next(),
            KeyCode::Char('k') | KeyCode::Up => self.previous(),
            KeyCode::Tab => self.next_sub(),
            KeyCode::Enter => {
                if let Some(index) = self.selected_row() {
                    if let Err(err) = self.list.rows[index].toggle_expanded(&self.api).await {
                        self.report(err.into());
                    }
                    self.reset_sub_cursor();
                }
            }
            KeyCode::Char('x') => {
                if let Some(index) = self.selected_row() {
                    let row = &mut self.list.rows[index];
                    let result = row.toggle(&self.api, session).await;
                    // The list is refreshed whatever the cascade outcome.
                    if !matches!(result, Err(ViewError::NotOwner)) {
                        self.refresh().await;
                    }
                    if let Err(err) = result {
                        self.report(err);
                    }
                }
            }
            KeyCode::Char('c') => {
                if let (Some(index), Some(sub_id)) = (self.selected_row(), self.selected_sub_id()) {
                    let row = &mut self.list.rows[index];
                    if let Err(err) = row.toggle_subitem(&self.api, session, sub_id).await {
                        self.report(err);
                    }
                }
            }
            KeyCode::Char('D') => {
                if let (Some(index), Some(sub_id)) = (self.selected_row(), self.selected_sub_id()) {
                    let row = &mut self.list.rows[index];
                    if let Err(err) = row.delete_subitem(&self.api, session, sub_id).await {
                        self.report(err);
                    }
                    self.reset_sub_cursor();
                }
            }
            KeyCode::Char('a') => {
                if session.is_none() {
                    self.alert = Some("Log in to add todos.".into());
                } else {
                    self.input.clear();
                    self.input_mode = InputMode::AddTodo;
                }
            }
            KeyCode::Char('s') => {
                if let Some(index) = self.selected_row() {
                    if self.list.rows[index].is_owned_by(session) {
                        self.input.clear();
                        self.input_mode = InputMode::AddSubTodo;
                    } else {
                        self.report(ViewError::NotOwner);
                    }
                }
            }
            KeyCode::Char('e') => {
                if let Some(index) = self.selected_row() {
                    match self.list.rows[index].begin_edit(session) {
                        Ok(()) => self.input_mode = InputMode::EditTodo,
                        Err(err) => self.report(err),
                    }
                }
            }
            KeyCode::Char('E') => {
                if let (Some(index), Some(sub_id)) = (self.selected_row(), self.selected_sub_id()) {
                    match self.list.rows[index].begin_subitem_edit(session, sub_id) {
                        Ok(()) => self.input_mode = InputMode::EditSubTodo(sub_id),
                        Err(err) => self.report(err),
                    }
                }
            }
            KeyCode::Char('d') => {
                if let Some(index) = self.selected_row() {
                    let row = &self.list.rows[index];
                    if row.is_owned_by(session) {
                        let id = row.id();
                        self.list.request_delete(id);
                        self.input_mode = InputMode::ConfirmDelete;
                    } else {
                        self.report(ViewError::NotOwner);
                    }
                }
            }
            KeyCode::Char('/') => {
                self.input = self.list.search.clone();
                self.input_mode = InputMode::Search;
            }
            KeyCode::Char('o') => self.list.flip_sort(),
            KeyCode::Char('m') => {
                if let Err(err) = self.list.toggle_show_mine(&self.api, session).await {
                    self.report(err.into());
                }
                self.clamp_selection();
            }
            KeyCode::Char('n') => {
                match self.list.next_page(&self.api).await {
                    Ok(true) => self.state.select(Some(0)),
                    Ok(false) => {}
                    Err(err) => self.report(err.into()),
                }
                self.clamp_selection();
            }
            KeyCode::Char('p') => {
                match self.list.previous_page(&self.api).await {
                    Ok(true) => self.state.select(Some(0)),
                    Ok(false) => {}
                    Err(err) => self.report(err.into()),
                }
                self.clamp_selection();
            }
            KeyCode::Char('r') => {
                self.refresh_session().await;
                self.refresh().await;
            }
            KeyCode::Char('l') => {
                if session.is_some() {
                    self.alert = Some("Already logged in. Press L to log out.".into());
                } else {
                    self.open_auth();
                }
            }
            KeyCode::Char('L') => {
                if let Err(err) = self.api.logout().await {
                    self.report(err.into());
                }
                self.refresh_session().await;
                self.refresh().await;
            }
            _ => {}
        }
        false
    }
}
