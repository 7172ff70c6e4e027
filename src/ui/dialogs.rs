use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use super::{
    app::{App, Dialog, DialogType, OperationProgress, BATCH_OPERATIONS},
    theme::Theme,
};
use crate::services::modifier::Modification;
use crate::utils::format::format_size;

pub fn draw_dialog(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let Some(dialog) = app.dialog.as_ref() else {
        return;
    };

    let (width, height) = match dialog.dialog_type {
        DialogType::Delete => (50u16, 6u16),
        DialogType::BatchMenu => (40, BATCH_OPERATIONS.len() as u16 + 4),
        DialogType::FindReplace => (area.width.saturating_sub(6).clamp(40, 70), 7),
        DialogType::Append | DialogType::Prepend => (area.width.saturating_sub(6).clamp(40, 70), 5),
        DialogType::Progress => (area.width.saturating_sub(6).clamp(40, 70), 8),
    };
    let width = width.min(area.width);
    let height = height.min(area.height);

    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let dialog_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, dialog_area);

    match dialog.dialog_type {
        DialogType::Delete => draw_confirm_dialog(frame, dialog, dialog_area, theme),
        DialogType::BatchMenu => draw_batch_menu(frame, dialog, dialog_area, theme),
        DialogType::FindReplace => draw_find_replace_dialog(frame, dialog, dialog_area, theme),
        DialogType::Append | DialogType::Prepend => {
            draw_text_input_dialog(frame, dialog, dialog_area, theme)
        }
        DialogType::Progress => {
            if let Some(progress) = app.operation_progress.as_ref() {
                draw_progress_dialog(frame, progress, dialog_area, theme);
            }
        }
    }
}

fn dialog_block<'a>(title: &'a str, theme: &Theme) -> Block<'a> {
    Block::default()
        .title(title)
        .title_style(theme.header_style())
        .borders(Borders::ALL)
        .border_style(theme.border_style(true))
}

/// Input text clipped from the left so the end stays visible
fn clip_input(input: &str, max_width: usize) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() > max_width {
        let skip = chars.len().saturating_sub(max_width.saturating_sub(3));
        let suffix: String = chars[skip..].iter().collect();
        format!("...{}", suffix)
    } else {
        input.to_string()
    }
}

fn input_line<'a>(label: &'a str, input: &str, focused: bool, max_width: usize, theme: &Theme) -> Line<'a> {
    let label_style = if focused {
        Style::default().fg(theme.info)
    } else {
        theme.dim_style()
    };
    let mut spans = vec![
        Span::styled(label, label_style),
        Span::styled(clip_input(input, max_width.saturating_sub(label.len() + 1)), theme.normal_style()),
    ];
    if focused {
        spans.push(Span::styled(
            "_",
            Style::default()
                .fg(theme.border_active)
                .add_modifier(Modifier::SLOW_BLINK),
        ));
    }
    Line::from(spans)
}

fn draw_confirm_dialog(frame: &mut Frame, dialog: &Dialog, area: Rect, theme: &Theme) {
    let block = dialog_block(" Delete ", theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height < 3 || inner.width < 4 {
        return;
    }

    let message_area = Rect::new(inner.x + 1, inner.y + 1, inner.width - 2, 1);
    frame.render_widget(
        Paragraph::new(dialog.message.clone())
            .style(theme.warning_style())
            .alignment(Alignment::Center),
        message_area,
    );

    let selected_style = theme.selected_style();
    let normal_style = theme.dim_style();
    let yes_style = if dialog.selected_button == 0 { selected_style } else { normal_style };
    let no_style = if dialog.selected_button == 1 { selected_style } else { normal_style };

    let buttons = Line::from(vec![
        Span::styled(" Yes ", yes_style),
        Span::raw("    "),
        Span::styled(" No ", no_style),
    ]);
    let button_area = Rect::new(inner.x + 1, inner.y + inner.height - 1, inner.width - 2, 1);
    frame.render_widget(Paragraph::new(buttons).alignment(Alignment::Center), button_area);
}

fn draw_batch_menu(frame: &mut Frame, dialog: &Dialog, area: Rect, theme: &Theme) {
    let block = dialog_block(" Batch Operations ", theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = BATCH_OPERATIONS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let style = if i == dialog.selected_button {
                theme.selected_style()
            } else {
                theme.normal_style()
            };
            Line::from(Span::styled(format!(" {}. {:<width$}", i + 1, name, width = inner.width.saturating_sub(4) as usize), style))
        })
        .collect();

    let list_area = Rect::new(inner.x, inner.y + 1, inner.width, inner.height.saturating_sub(1));
    frame.render_widget(Paragraph::new(lines), list_area);
}

fn draw_find_replace_dialog(frame: &mut Frame, dialog: &Dialog, area: Rect, theme: &Theme) {
    let block = dialog_block(" Find and Replace ", theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height < 4 || inner.width < 4 {
        return;
    }

    let max_width = (inner.width - 2) as usize;
    let lines = vec![
        Line::raw(""),
        input_line("Find:    ", &dialog.input, dialog.input_focus == 0, max_width, theme),
        input_line("Replace: ", &dialog.replace_input, dialog.input_focus == 1, max_width, theme),
        Line::raw(""),
        Line::from(Span::styled("Tab:switch  Enter:run  Esc:cancel", theme.dim_style())),
    ];
    frame.render_widget(
        Paragraph::new(lines),
        Rect::new(inner.x + 1, inner.y, inner.width - 2, inner.height),
    );
}

fn draw_text_input_dialog(frame: &mut Frame, dialog: &Dialog, area: Rect, theme: &Theme) {
    let title = match dialog.dialog_type {
        DialogType::Append => " Append Text ",
        _ => " Prepend Text ",
    };
    let block = dialog_block(title, theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height < 1 || inner.width < 4 {
        return;
    }

    let y_pos = inner.y + inner.height / 2;
    let input_area = Rect::new(inner.x + 1, y_pos, inner.width - 2, 1);
    frame.render_widget(
        Paragraph::new(input_line("> ", &dialog.input, true, (inner.width - 2) as usize, theme)),
        input_area,
    );
}

fn progress_bar<'a>(ratio: f64, width: usize, theme: &Theme) -> Line<'a> {
    let ratio = ratio.clamp(0.0, 1.0);
    let bar_width = width.saturating_sub(5);
    let filled = (ratio * bar_width as f64).round() as usize;
    Line::from(vec![
        Span::styled("█".repeat(filled), theme.gauge_style()),
        Span::styled("░".repeat(bar_width - filled), theme.dim_style()),
        Span::styled(format!("{:>4.0}%", ratio * 100.0), theme.normal_style()),
    ])
}

fn draw_progress_dialog(frame: &mut Frame, progress: &OperationProgress, area: Rect, theme: &Theme) {
    let title = format!(" {} ", progress.label);
    let block = dialog_block(&title, theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height < 5 || inner.width < 10 {
        return;
    }

    let width = (inner.width - 2) as usize;
    let status = if progress.current_file.is_empty() {
        "Preparing...".to_string()
    } else {
        format!(
            "Processing {} ({}/{})",
            progress.current_file,
            progress.current_index(),
            progress.total_files
        )
    };

    let totals = if progress.total_bytes > 0 {
        format!(
            "{} / {}",
            format_size(progress.completed_bytes),
            format_size(progress.total_bytes)
        )
    } else {
        format!("{} / {} files", progress.completed_files, progress.total_files)
    };

    let lines = vec![
        Line::from(Span::styled(clip_input(&status, width), theme.normal_style())),
        progress_bar(progress.current_file_progress, width, theme),
        Line::from(Span::styled(totals, theme.dim_style())),
        progress_bar(progress.overall_progress(), width, theme),
        Line::from(Span::styled(
            if progress.is_cancelled() { "Cancelling..." } else { "Esc:cancel" },
            theme.dim_style(),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines),
        Rect::new(inner.x + 1, inner.y, inner.width - 2, inner.height),
    );
}

/// Route a key press to the open dialog
pub fn handle_dialog_input(app: &mut App, code: KeyCode, _modifiers: KeyModifiers) {
    let Some(dialog) = app.dialog.as_mut() else {
        return;
    };

    match dialog.dialog_type {
        DialogType::Delete => match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                app.dialog = None;
                app.execute_delete();
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.dialog = None;
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                // 0: Yes, 1: No
                dialog.selected_button = 1 - dialog.selected_button;
            }
            KeyCode::Enter => {
                let confirmed = dialog.selected_button == 0;
                app.dialog = None;
                if confirmed {
                    app.execute_delete();
                }
            }
            _ => {}
        },
        DialogType::BatchMenu => match code {
            KeyCode::Up => {
                dialog.selected_button = dialog.selected_button.saturating_sub(1);
            }
            KeyCode::Down => {
                dialog.selected_button = (dialog.selected_button + 1).min(BATCH_OPERATIONS.len() - 1);
            }
            KeyCode::Enter => {
                let index = dialog.selected_button;
                app.open_modification_dialog(index);
            }
            KeyCode::Char(c @ '1'..='3') => {
                app.open_modification_dialog(c as usize - '1' as usize);
            }
            KeyCode::Esc => {
                app.dialog = None;
            }
            _ => {}
        },
        DialogType::FindReplace => match code {
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                dialog.input_focus = 1 - dialog.input_focus;
            }
            KeyCode::Enter => {
                if dialog.input_focus == 0 {
                    dialog.input_focus = 1;
                } else {
                    let modification = Modification::find_and_replace(
                        dialog.input.clone(),
                        dialog.replace_input.clone(),
                    );
                    app.dialog = None;
                    app.execute_modification(modification);
                }
            }
            KeyCode::Esc => {
                app.dialog = None;
            }
            KeyCode::Backspace => {
                if dialog.input_focus == 0 {
                    dialog.input.pop();
                } else {
                    dialog.replace_input.pop();
                }
            }
            KeyCode::Char(c) => {
                if dialog.input_focus == 0 {
                    dialog.input.push(c);
                } else {
                    dialog.replace_input.push(c);
                }
            }
            _ => {}
        },
        DialogType::Append | DialogType::Prepend => match code {
            KeyCode::Enter => {
                let text = dialog.input.clone();
                let dialog_type = dialog.dialog_type;
                app.dialog = None;
                if !text.is_empty() {
                    let modification = if dialog_type == DialogType::Append {
                        Modification::append_text(text)
                    } else {
                        Modification::prepend_text(text)
                    };
                    app.execute_modification(modification);
                }
            }
            KeyCode::Esc => {
                app.dialog = None;
            }
            KeyCode::Backspace => {
                dialog.input.pop();
            }
            KeyCode::Char(c) => {
                dialog.input.push(c);
            }
            _ => {}
        },
        DialogType::Progress => {
            if code == KeyCode::Esc {
                app.cancel_operation();
            }
        }
    }
}
