use crate::app::{App, InputMode};
use crate::item::ItemView;
use crate::list::PageButton;
use crate::validation::{AuthForm, AuthMode, Field, FieldState};
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length((r.width.saturating_sub(width)) / 2),
                Constraint::Length(width),
                Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn key_spans(keys: &[(&'static str, &'static str)]) -> Text<'static> {
    let mut spans = Vec::with_capacity(keys.len() * 2);
    for (key, action) in keys {
        spans.push(Span::styled(
            format!(" {} ", key),
            Style::default().fg(Color::Red),
        ));
        spans.push(Span::raw(format!(": {} ", action)));
    }
    Text::from(Line::from(spans))
}

fn get_legend(input_mode: &InputMode) -> Text<'static> {
    match input_mode {
        InputMode::Normal => key_spans(&[
            ("q", "Quit"),
            ("j/k", "Move"),
            ("Enter", "Expand"),
            ("Tab", "Sub-item"),
            ("x", "Toggle"),
            ("c", "Toggle Sub-item"),
            ("a", "Add"),
            ("s", "Add Sub-item"),
            ("e/E", "Rename"),
            ("d/D", "Delete"),
            ("/", "Search"),
            ("o", "Sort"),
            ("m", "Mine"),
            ("n/p", "Page"),
            ("r", "Refresh"),
            ("l/L", "Log in/out"),
        ]),
        InputMode::Auth => key_spans(&[
            ("Enter", "Submit"),
            ("Tab", "Next Field"),
            ("F2", "Log in / Register"),
            ("Esc", "Close"),
        ]),
        InputMode::ConfirmDelete => key_spans(&[("y", "Delete"), ("n", "Keep")]),
        InputMode::Search => key_spans(&[("Enter", "Keep Filter"), ("Esc", "Clear")]),
        InputMode::AddTodo
        | InputMode::AddSubTodo
        | InputMode::EditTodo
        | InputMode::EditSubTodo(_) => key_spans(&[("Enter", "Submit"), ("Esc", "Cancel")]),
    }
}

fn checkbox(checked: bool, owned: bool) -> Span<'static> {
    match (owned, checked) {
        (true, true) => Span::styled("[x] ", Style::default().fg(Color::Green)),
        (true, false) => Span::raw("[ ] "),
        (false, true) => Span::styled("DONE ", Style::default().fg(Color::Green)),
        (false, false) => Span::raw(""),
    }
}

fn row_item(row: &ItemView, owned: bool, sub_cursor: Option<usize>) -> ListItem<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    let owner = row.todo.owner().unwrap_or("unknown");
    let mut lines = vec![Line::from(vec![
        checkbox(row.todo.checked, owned),
        Span::raw(row.todo.title.clone()),
        Span::styled(
            format!("  {} · {}", owner, row.todo.created_at.format("%Y-%m-%d %H:%M")),
            dim,
        ),
    ])];

    if row.expanded {
        if row.subitems.is_empty() {
            lines.push(Line::from(Span::styled("      No sub-items", dim)));
        }
        for (i, item) in row.subitems.iter().enumerate() {
            let marker = if sub_cursor == Some(i) { "    > " } else { "      " };
            lines.push(Line::from(vec![
                Span::raw(marker),
                checkbox(item.sub.checked, owned),
                Span::raw(item.sub.title.clone()),
            ]));
        }
    }
    ListItem::new(Text::from(lines))
}

fn header_line(app: &App) -> Line<'static> {
    let session = match &app.session {
        Some(user) => Span::styled(
            format!("{} ", user.username),
            Style::default().fg(Color::Green),
        ),
        None => Span::styled("not logged in ", Style::default().fg(Color::Yellow)),
    };
    let mut spans = vec![
        session,
        Span::raw(format!("@ {}  ", app.api.base_url())),
        Span::raw(format!("Sort: {}  ", app.list.sort.label())),
    ];
    if app.list.show_mine {
        spans.push(Span::styled("Mine  ", Style::default().fg(Color::Cyan)));
    }
    if !app.list.search.is_empty() {
        spans.push(Span::raw(format!("Search: \"{}\"", app.list.search)));
    }
    Line::from(spans)
}

fn pager_line(app: &App) -> Line<'static> {
    let page = &app.list.page;
    let mut spans = vec![Span::raw(format!(
        "{} todos  ",
        page.total_elements
    ))];
    if app.list.is_paged() {
        for button in app.list.page_buttons() {
            spans.push(match button {
                PageButton::Page(n) if n == page.number => Span::styled(
                    format!("[{}] ", n + 1),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                PageButton::Page(n) => Span::raw(format!("{} ", n + 1)),
                PageButton::Ellipsis => Span::raw("… "),
            });
        }
    }
    Line::from(spans)
}

fn draw_list(f: &mut Frame, app: &mut App, area: Rect) {
    let session = app.session_name();
    let visible = app.list.visible(session.as_deref());
    let selected_row = app.selected_row();
    let title = if app.list.show_mine { "My Todos" } else { "Todos" };

    let widget = if visible.is_empty() {
        List::new(vec![ListItem::new("No todos")])
            .block(Block::default().borders(Borders::ALL).title(title))
    } else {
        let items: Vec<ListItem> = visible
            .iter()
            .map(|&index| {
                let row = &app.list.rows[index];
                let cursor = if selected_row == Some(index) {
                    app.sub_cursor
                } else {
                    None
                };
                row_item(row, row.is_owned_by(session.as_deref()), cursor)
            })
            .collect();

        List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ")
    };

    f.render_stateful_widget(widget, area, &mut app.state);
}

fn draw_input_popup(f: &mut Frame, area: Rect, title: &str, text: &str) {
    let popup_width = ((u32::from(area.width) * 60 / 100) as u16).saturating_sub(2);
    let lines_required = calculate_wrapped_lines(text, popup_width);
    let required_height = std::cmp::max(lines_required as u16, 1);
    let popup_height = std::cmp::min(required_height + 2, area.height.saturating_sub(2));
    let popup_area = centered_rect_absolute(popup_width + 2, popup_height, area);

    let popup_block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Green));

    let input = Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::White))
        .block(popup_block)
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(input, popup_area);
}

fn field_lines(form: &AuthForm, field: Field, label: &str) -> Vec<Line<'static>> {
    let value = match field {
        Field::Password => "*".repeat(form.password.chars().count()),
        _ => form.value(field).to_string(),
    };
    let label_style = if form.focus == field {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{:<10}", label), label_style),
        Span::raw(value),
    ])];
    match form.state(field) {
        FieldState::Invalid(message) => lines.push(Line::from(Span::styled(
            format!("          {}", message),
            Style::default().fg(Color::Red),
        ))),
        FieldState::Checking => lines.push(Line::from(Span::styled(
            "          checking…",
            Style::default().fg(Color::Yellow),
        ))),
        FieldState::Valid => lines.push(Line::from(Span::styled(
            "          ok",
            Style::default().fg(Color::Green),
        ))),
        FieldState::Idle => {}
    }
    lines
}

fn draw_auth_popup(f: &mut Frame, area: Rect, form: &AuthForm) {
    let (title, fields): (&str, &[(Field, &str)]) = match form.mode() {
        AuthMode::Login => (
            "Log in",
            &[(Field::Username, "Username"), (Field::Password, "Password")],
        ),
        AuthMode::Register => (
            "Register",
            &[
                (Field::Username, "Username"),
                (Field::Password, "Password"),
                (Field::Email, "Email"),
            ],
        ),
    };

    let mut lines = Vec::new();
    for (field, label) in fields {
        lines.extend(field_lines(form, *field, label));
    }
    if let Some(error) = &form.error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }

    let width = std::cmp::min(60, area.width);
    let height = std::cmp::min(lines.len() as u16 + 2, area.height);
    let popup_area = centered_rect_absolute(width, height, area);
    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::White)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(popup, popup_area);
}

fn draw_message_popup(f: &mut Frame, area: Rect, title: &str, message: &str, color: Color) {
    let width = std::cmp::min(60, area.width);
    let lines_required = calculate_wrapped_lines(message, width.saturating_sub(2));
    let height = std::cmp::min(std::cmp::max(lines_required as u16, 1) + 2, area.height);
    let popup_area = centered_rect_absolute(width, height, area);
    let popup = Paragraph::new(message.to_string())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .style(Style::default().fg(color)),
        )
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, popup_area);
    f.render_widget(popup, popup_area);
}

fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints(
            [
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(size);
    let body_chunk = chunks[1];

    f.render_widget(Paragraph::new(header_line(app)), chunks[0]);
    draw_list(f, app, body_chunk);
    f.render_widget(Paragraph::new(pager_line(app)), chunks[2]);

    let selected = app.selected_row();
    match app.input_mode {
        InputMode::Normal => {}
        InputMode::Search => draw_input_popup(f, body_chunk, "Search title or author", &app.input),
        InputMode::AddTodo => draw_input_popup(f, body_chunk, "New Todo", &app.input),
        InputMode::AddSubTodo => draw_input_popup(f, body_chunk, "New Sub-item", &app.input),
        InputMode::EditTodo => {
            if let Some(edit) = selected.and_then(|i| app.list.rows[i].edit.as_ref()) {
                let title = format!("Rename \"{}\"", edit.original());
                draw_input_popup(f, body_chunk, &title, &edit.buffer);
            }
        }
        InputMode::EditSubTodo(sub_id) => {
            let edit = selected
                .and_then(|i| app.list.rows[i].subitems.iter().find(|s| s.id() == sub_id))
                .and_then(|item| item.edit.as_ref());
            if let Some(edit) = edit {
                let title = format!("Rename \"{}\"", edit.original());
                draw_input_popup(f, body_chunk, &title, &edit.buffer);
            }
        }
        InputMode::Auth => {
            if let Some(form) = &app.auth {
                draw_auth_popup(f, body_chunk, form);
            }
        }
        InputMode::ConfirmDelete => {
            if let Some(target) = &app.list.delete_target {
                let message = format!("Delete \"{}\"?", target.title);
                draw_message_popup(f, body_chunk, "Confirm", &message, Color::Yellow);
            }
        }
    }

    if let Some(alert) = &app.alert {
        draw_message_popup(f, body_chunk, "Notice", alert, Color::Red);
    }

    let legend = Paragraph::new(get_legend(&app.input_mode))
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });

    f.render_widget(legend, chunks[3]);
}

pub async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, &mut app))?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let should_quit = app.handle_input(key).await?;
                    if should_quit {
                        return Ok(());
                    }
                }
            }
        }

        app.tick();
    }
}

fn calculate_wrapped_lines(text: &str, max_width: u16) -> usize {
    let max_width = max_width.max(1) as usize;
    let mut line_count = 0;
    for line in text.lines() {
        let line_width = line.chars().count();
        line_count += std::cmp::max(line_width.div_ceil(max_width), 1);
    }
    line_count
}
