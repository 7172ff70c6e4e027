use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::{Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use super::{app::App, theme::Theme};

const TAB_SPACES: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    View,
    Edit,
}

/// A text file opened for viewing, and editing on request
pub struct TextFileState {
    pub file_path: PathBuf,
    pub lines: Vec<String>,
    pub load_state: LoadState,
    pub mode: TextMode,
    pub cursor_line: usize,
    pub cursor_col: usize,
    pub scroll: usize,
    pub horizontal_scroll: usize,
    pub visible_height: usize,
    pub visible_width: usize,
    pub modified: bool,
    /// Terminator after each line; "" for a last line without one
    endings: Vec<&'static str>,
    /// Terminator for newly inserted line breaks
    line_ending: &'static str,
    receiver: Option<Receiver<Result<String, String>>>,
}

impl TextFileState {
    /// Start reading `path` on a background thread
    pub fn open(path: PathBuf) -> Self {
        let mut state = Self {
            file_path: path,
            lines: vec![String::new()],
            load_state: LoadState::Loading,
            mode: TextMode::View,
            cursor_line: 0,
            cursor_col: 0,
            scroll: 0,
            horizontal_scroll: 0,
            visible_height: 20,
            visible_width: 80,
            modified: false,
            endings: vec![""],
            line_ending: "\n",
            receiver: None,
        };
        state.reload();
        state
    }

    /// Re-read the file from disk, dropping unsaved edits
    pub fn reload(&mut self) {
        self.mode = TextMode::View;
        self.modified = false;

        if !self.file_path.is_file() {
            log::warn!("Cannot open {}: not a file", self.file_path.display());
            self.load_state = LoadState::Failed("Invalid file".to_string());
            self.receiver = None;
            return;
        }

        self.load_state = LoadState::Loading;
        let (tx, rx) = mpsc::channel();
        let path = self.file_path.clone();
        thread::spawn(move || {
            let result = fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|_| "File is not valid UTF-8 text".to_string())
                });
            let _ = tx.send(result);
        });
        self.receiver = Some(rx);
    }

    /// Pick up the background read once it is done
    pub fn poll(&mut self) {
        let Some(receiver) = self.receiver.as_ref() else {
            return;
        };

        match receiver.try_recv() {
            Ok(Ok(content)) => {
                self.receiver = None;
                self.set_content(&content);
                self.load_state = LoadState::Loaded;
            }
            Ok(Err(e)) => {
                self.receiver = None;
                log::warn!("Failed to read {}: {}", self.file_path.display(), e);
                self.load_state = LoadState::Failed(e);
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {
                self.receiver = None;
                self.load_state = LoadState::Failed("Read interrupted".to_string());
            }
        }
    }

    fn set_content(&mut self, content: &str) {
        self.line_ending = if content.contains("\r\n") { "\r\n" } else { "\n" };
        self.lines.clear();
        self.endings.clear();

        for piece in content.split_inclusive('\n') {
            let (line, ending) = if let Some(line) = piece.strip_suffix("\r\n") {
                (line, "\r\n")
            } else if let Some(line) = piece.strip_suffix('\n') {
                (line, "\n")
            } else {
                (piece, "")
            };
            self.lines.push(line.to_string());
            self.endings.push(ending);
        }
        if self.lines.is_empty() {
            self.lines.push(String::new());
            self.endings.push("");
        }

        self.cursor_line = self.cursor_line.min(self.lines.len() - 1);
        self.cursor_col = self.cursor_col.min(self.line_len(self.cursor_line));
        self.update_scroll();
    }

    /// The edited text, with each line's original terminator preserved
    pub fn content(&self) -> String {
        self.lines
            .iter()
            .zip(&self.endings)
            .flat_map(|(line, ending)| [line.as_str(), *ending])
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Loaded
    }

    pub fn is_editing(&self) -> bool {
        self.mode == TextMode::Edit
    }

    pub fn enter_edit_mode(&mut self) {
        if self.is_loaded() {
            self.mode = TextMode::Edit;
        }
    }

    /// After a successful save
    pub fn mark_saved(&mut self) {
        self.modified = false;
        self.mode = TextMode::View;
    }

    fn line_len(&self, line: usize) -> usize {
        self.lines.get(line).map(|l| l.chars().count()).unwrap_or(0)
    }

    pub fn insert_char(&mut self, c: char) {
        let col = self.cursor_col;
        let line = &mut self.lines[self.cursor_line];
        let mut chars: Vec<char> = line.chars().collect();
        chars.insert(col.min(chars.len()), c);
        *line = chars.into_iter().collect();
        self.cursor_col += 1;
        self.modified = true;
        self.update_scroll();
    }

    pub fn insert_newline(&mut self) {
        let chars: Vec<char> = self.lines[self.cursor_line].chars().collect();
        let split = self.cursor_col.min(chars.len());
        let before: String = chars[..split].iter().collect();
        let after: String = chars[split..].iter().collect();

        self.lines[self.cursor_line] = before;
        self.lines.insert(self.cursor_line + 1, after);
        // the tail keeps the old terminator
        self.endings.insert(self.cursor_line, self.line_ending);
        self.cursor_line += 1;
        self.cursor_col = 0;
        self.modified = true;
        self.update_scroll();
    }

    /// Backspace
    pub fn delete_backward(&mut self) {
        if self.cursor_col > 0 {
            let col = self.cursor_col;
            let line = &mut self.lines[self.cursor_line];
            let mut chars: Vec<char> = line.chars().collect();
            chars.remove(col - 1);
            *line = chars.into_iter().collect();
            self.cursor_col -= 1;
            self.modified = true;
        } else if self.cursor_line > 0 {
            let current = self.lines.remove(self.cursor_line);
            self.endings.remove(self.cursor_line - 1);
            self.cursor_line -= 1;
            self.cursor_col = self.line_len(self.cursor_line);
            self.lines[self.cursor_line].push_str(&current);
            self.modified = true;
        }
        self.update_scroll();
    }

    /// Delete
    pub fn delete_forward(&mut self) {
        let line_len = self.line_len(self.cursor_line);
        if self.cursor_col < line_len {
            let col = self.cursor_col;
            let line = &mut self.lines[self.cursor_line];
            let mut chars: Vec<char> = line.chars().collect();
            chars.remove(col);
            *line = chars.into_iter().collect();
            self.modified = true;
        } else if self.cursor_line + 1 < self.lines.len() {
            let next = self.lines.remove(self.cursor_line + 1);
            self.endings.remove(self.cursor_line);
            self.lines[self.cursor_line].push_str(&next);
            self.modified = true;
        }
    }

    pub fn move_cursor(&mut self, line_delta: i32, col_delta: i32) {
        let new_line = (self.cursor_line as i32 + line_delta)
            .max(0)
            .min(self.lines.len().saturating_sub(1) as i32) as usize;

        if new_line != self.cursor_line {
            self.cursor_line = new_line;
            self.cursor_col = self.cursor_col.min(self.line_len(new_line));
        }

        if col_delta != 0 {
            let line_len = self.line_len(self.cursor_line);
            let new_col = self.cursor_col as i32 + col_delta;

            if new_col > line_len as i32 && self.cursor_line + 1 < self.lines.len() {
                // wrap to next line
                self.cursor_line += 1;
                self.cursor_col = 0;
            } else if new_col < 0 && self.cursor_line > 0 {
                // wrap to end of previous line
                self.cursor_line -= 1;
                self.cursor_col = self.line_len(self.cursor_line);
            } else {
                self.cursor_col = (new_col.max(0) as usize).min(line_len);
            }
        }

        self.update_scroll();
    }

    pub fn move_to_line_start(&mut self) {
        self.cursor_col = 0;
        self.update_scroll();
    }

    pub fn move_to_line_end(&mut self) {
        self.cursor_col = self.line_len(self.cursor_line);
        self.update_scroll();
    }

    pub fn move_to_top(&mut self) {
        self.cursor_line = 0;
        self.cursor_col = 0;
        self.update_scroll();
    }

    pub fn move_to_bottom(&mut self) {
        self.cursor_line = self.lines.len().saturating_sub(1);
        self.cursor_col = 0;
        self.update_scroll();
    }

    /// Keep the cursor inside the visible window
    pub fn update_scroll(&mut self) {
        let visible_height = self.visible_height.max(1);
        if self.cursor_line < self.scroll {
            self.scroll = self.cursor_line;
        } else if self.cursor_line >= self.scroll + visible_height {
            self.scroll = self.cursor_line - visible_height + 1;
        }

        let visible_width = self.visible_width.max(1);
        if self.cursor_col < self.horizontal_scroll {
            self.horizontal_scroll = self.cursor_col;
        } else if self.cursor_col >= self.horizontal_scroll + visible_width {
            self.horizontal_scroll = self.cursor_col - visible_width + 1;
        }
    }

    fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

fn char_width(c: char) -> usize {
    if c == '\t' {
        1
    } else {
        c.width().unwrap_or(0)
    }
}

fn visible_text(line: &str, skip: usize, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in line.chars().skip(skip) {
        let w = char_width(c);
        if used + w > width {
            break;
        }
        used += w;
        out.push(if c == '\t' { ' ' } else { c });
    }
    out
}

pub fn draw(frame: &mut Frame, app: &mut App, area: Rect, theme: &Theme) {
    let Some(state) = app.text_file.as_mut() else {
        return;
    };

    // dim in view mode, highlighted while editing
    let border_style = if state.modified {
        Style::default().fg(theme.warning)
    } else {
        theme.border_style(state.is_editing())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 3 || inner.width < 8 {
        return;
    }

    // Header
    let mode_label = match state.mode {
        TextMode::View => "[VIEW] ",
        TextMode::Edit => "[EDIT] ",
    };
    let header = Line::from(vec![
        Span::styled(
            format!(" {}{} ", if state.modified { "*" } else { "" }, state.file_name()),
            theme.header_style(),
        ),
        Span::styled(mode_label, theme.marked_style()),
        Span::styled(
            format!("Ln {}, Col {} ", state.cursor_line + 1, state.cursor_col + 1),
            theme.dim_style(),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(header).style(theme.status_bar_style()),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    // Footer
    let hints = match state.mode {
        TextMode::View => " e:edit  u:undo  Esc:back",
        TextMode::Edit => " ^S:save  ^Z:undo  Esc:discard",
    };
    frame.render_widget(
        Paragraph::new(Span::styled(hints, theme.dim_style())).style(theme.status_bar_style()),
        Rect::new(inner.x, inner.y + inner.height - 1, inner.width, 1),
    );

    let body = Rect::new(inner.x, inner.y + 1, inner.width, inner.height - 2);

    match &state.load_state {
        LoadState::Loading => {
            frame.render_widget(Paragraph::new(Span::styled("Loading...", theme.dim_style())), body);
            return;
        }
        LoadState::Failed(err) => {
            frame.render_widget(Paragraph::new(Span::styled(err.clone(), theme.error_style())), body);
            return;
        }
        LoadState::Loaded => {}
    }

    const GUTTER: u16 = 5;
    let content_height = body.height as usize;
    let content_width = body.width.saturating_sub(GUTTER + 1) as usize;
    state.visible_height = content_height;
    state.visible_width = content_width;
    state.update_scroll();

    for (i, line) in state
        .lines
        .iter()
        .skip(state.scroll)
        .take(content_height)
        .enumerate()
    {
        let line_num = state.scroll + i;
        let num_style = if line_num == state.cursor_line {
            Style::default()
                .fg(theme.text_header)
                .add_modifier(Modifier::BOLD)
        } else {
            theme.dim_style()
        };

        let spans = vec![
            Span::styled(format!("{:4} ", line_num + 1), num_style),
            Span::styled(
                visible_text(line, state.horizontal_scroll, content_width),
                theme.normal_style(),
            ),
        ];
        frame.render_widget(
            Paragraph::new(Line::from(spans)),
            Rect::new(body.x, body.y + i as u16, body.width, 1),
        );
    }

    let total_lines = state.lines.len();
    if total_lines > content_height {
        let max_scroll = total_lines.saturating_sub(content_height);
        let mut scrollbar_state = ScrollbarState::new(max_scroll + 1).position(state.scroll);
        frame.render_stateful_widget(
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(None)
                .end_symbol(None),
            body,
            &mut scrollbar_state,
        );
    }

    if state.is_editing() {
        let line = &state.lines[state.cursor_line];
        let offset: usize = line
            .chars()
            .skip(state.horizontal_scroll)
            .take(state.cursor_col.saturating_sub(state.horizontal_scroll))
            .map(char_width)
            .sum();
        let x = body.x + GUTTER + offset.min(content_width) as u16;
        let y = body.y + (state.cursor_line - state.scroll) as u16;
        frame.set_cursor_position(Position::new(x, y));
    }
}

pub fn handle_input(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    let Some(state) = app.text_file.as_mut() else {
        return;
    };
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);

    if !state.is_loaded() {
        if matches!(code, KeyCode::Esc | KeyCode::Char('q')) {
            app.close_text_file();
        }
        return;
    }

    let page = state.visible_height.max(1) as i32;

    match state.mode {
        TextMode::View => match code {
            KeyCode::Esc | KeyCode::Char('q') => app.close_text_file(),
            KeyCode::Char('e') => state.enter_edit_mode(),
            KeyCode::Char('u') => app.undo_last_modification(),
            KeyCode::Char('z') if ctrl => app.undo_last_modification(),
            KeyCode::Up | KeyCode::Char('k') => state.move_cursor(-1, 0),
            KeyCode::Down | KeyCode::Char('j') => state.move_cursor(1, 0),
            KeyCode::Left => state.move_cursor(0, -1),
            KeyCode::Right => state.move_cursor(0, 1),
            KeyCode::PageUp => state.move_cursor(-page, 0),
            KeyCode::PageDown => state.move_cursor(page, 0),
            KeyCode::Home | KeyCode::Char('g') => state.move_to_top(),
            KeyCode::End | KeyCode::Char('G') => state.move_to_bottom(),
            _ => {}
        },
        TextMode::Edit => {
            if ctrl {
                match code {
                    KeyCode::Char('s') => app.save_text_file(),
                    KeyCode::Char('z') => app.undo_last_modification(),
                    KeyCode::Home => state.move_to_top(),
                    KeyCode::End => state.move_to_bottom(),
                    _ => {}
                }
                return;
            }

            match code {
                KeyCode::Esc => {
                    if state.modified {
                        state.reload();
                        app.show_message("Changes discarded");
                    } else {
                        state.mode = TextMode::View;
                    }
                }
                KeyCode::Enter => state.insert_newline(),
                KeyCode::Backspace => state.delete_backward(),
                KeyCode::Delete => state.delete_forward(),
                KeyCode::Tab => TAB_SPACES.chars().for_each(|c| state.insert_char(c)),
                KeyCode::Up => state.move_cursor(-1, 0),
                KeyCode::Down => state.move_cursor(1, 0),
                KeyCode::Left => state.move_cursor(0, -1),
                KeyCode::Right => state.move_cursor(0, 1),
                KeyCode::PageUp => state.move_cursor(-page, 0),
                KeyCode::PageDown => state.move_cursor(page, 0),
                KeyCode::Home => state.move_to_line_start(),
                KeyCode::End => state.move_to_line_end(),
                KeyCode::Char(c) => state.insert_char(c),
                _ => {}
            }
        }
    }
}
