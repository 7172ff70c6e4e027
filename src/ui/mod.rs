pub mod app;
pub mod dialogs;
pub mod panel;
pub mod text_file;
pub mod theme;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use app::{App, Screen, SortBy};
use theme::Theme;

pub type Term = ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>;

const BROWSER_HINTS: &str =
    " Enter:open  Space:select  d:delete  c/x/v:copy/cut/paste  b:batch  u:undo  q:quit";
const SELECTION_HINTS: &str = " Space:toggle  *:all  Esc:done  d:delete  c/x:copy/cut  b:batch";

pub fn draw(frame: &mut Frame, app: &mut App, theme: &Theme) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    match app.current_screen {
        Screen::Browser => panel::draw(frame, &mut app.panel, chunks[0], theme),
        Screen::TextFile => text_file::draw(frame, app, chunks[0], theme),
    }

    draw_status_bar(frame, app, chunks[1], theme);

    if app.dialog.is_some() {
        dialogs::draw_dialog(frame, app, area, theme);
    }
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let left = match &app.message {
        Some(msg) => {
            let lower = msg.to_lowercase();
            let style = if lower.contains("error") || lower.contains("failed") {
                theme.error_style()
            } else {
                theme.success_style()
            };
            Span::styled(format!(" {}", msg), style)
        }
        None => {
            let hints = match app.current_screen {
                Screen::TextFile => "",
                Screen::Browser if app.is_selection_mode() => SELECTION_HINTS,
                Screen::Browser => BROWSER_HINTS,
            };
            Span::styled(hints, theme.dim_style())
        }
    };

    let mut spans = vec![left];
    if let Some((count, op)) = app.clipboard_info() {
        spans.push(Span::styled(format!("  [{} to {}]", count, op), theme.marked_style()));
    }
    if app.undo_snapshot.is_some() {
        spans.push(Span::styled("  [undo]", theme.dim_style()));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(theme.status_bar_style()),
        area,
    );
}

/// Route a key press to the dialog or active screen
pub fn handle_key(app: &mut App, key: KeyEvent) {
    if app.dialog.is_some() {
        dialogs::handle_dialog_input(app, key.code, key.modifiers);
        return;
    }

    match app.current_screen {
        Screen::TextFile => text_file::handle_input(app, key.code, key.modifiers),
        Screen::Browser => handle_browser_input(app, key.code, key.modifiers),
    }
}

fn handle_browser_input(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    if modifiers.contains(KeyModifiers::CONTROL) {
        match code {
            KeyCode::Char('c') => app.clipboard_copy(),
            KeyCode::Char('x') => app.clipboard_cut(),
            KeyCode::Char('v') => app.clipboard_paste(),
            KeyCode::Char('a') => app.toggle_all_selection(),
            _ => {}
        }
        return;
    }

    match code {
        KeyCode::Up | KeyCode::Char('k') => app.move_cursor(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_cursor(1),
        KeyCode::PageUp => app.move_cursor(-10),
        KeyCode::PageDown => app.move_cursor(10),
        KeyCode::Home => app.cursor_to_start(),
        KeyCode::End => app.cursor_to_end(),
        KeyCode::Enter | KeyCode::Right => app.enter_selected(),
        KeyCode::Backspace | KeyCode::Left => {
            app.go_back();
        }
        KeyCode::Char(' ') => app.toggle_selection(),
        KeyCode::Char('*') => app.toggle_all_selection(),
        KeyCode::Esc => {
            if app.is_selection_mode() {
                app.exit_selection_mode();
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => app.show_delete_dialog(),
        KeyCode::Char('c') => app.clipboard_copy(),
        KeyCode::Char('x') => app.clipboard_cut(),
        KeyCode::Char('v') => app.clipboard_paste(),
        KeyCode::Char('b') => app.show_batch_operations_dialog(),
        KeyCode::Char('u') => app.undo_last_modification(),
        KeyCode::Char('n') => app.toggle_sort(SortBy::Name),
        KeyCode::Char('s') => app.toggle_sort(SortBy::Size),
        KeyCode::Char('t') => app.toggle_sort(SortBy::Modified),
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Char('q') => app.request_quit(),
        _ => {}
    }
}
