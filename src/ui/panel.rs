use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::{
    app::{FileItem, PanelState, SortBy, SortOrder},
    theme::Theme,
};
use crate::utils::format::format_size;

const TYPE_COL: usize = 11;
const SIZE_COL: usize = 10;
const DATE_COL: usize = 13;

struct Columns {
    name: usize,
    kind: usize,
    size: usize,
    date: usize,
}

impl Columns {
    /// Drop the optional columns one by one as the panel narrows
    fn fit(width: usize) -> Self {
        let mut cols = Columns {
            name: 0,
            kind: TYPE_COL,
            size: SIZE_COL,
            date: DATE_COL,
        };
        let min_name = 16;
        if width < min_name + cols.kind + cols.size + cols.date {
            cols.kind = 0;
        }
        if width < min_name + cols.kind + cols.size + cols.date {
            cols.date = 0;
        }
        if width < min_name + cols.kind + cols.size + cols.date {
            cols.size = 0;
        }
        cols.name = width.saturating_sub(cols.kind + cols.size + cols.date);
        cols
    }
}

pub fn draw(frame: &mut Frame, panel: &mut PanelState, area: Rect, theme: &Theme) {
    let title = if panel.selected_files.is_empty() {
        format!(" {} ", panel.title())
    } else {
        format!(" {} [{} selected] ", panel.title(), panel.selected_files.len())
    };

    let block = Block::default()
        .title(title)
        .title_style(
            Style::default()
                .fg(theme.border_active)
                .add_modifier(Modifier::BOLD),
        )
        .borders(Borders::ALL)
        .border_style(theme.border_style(true));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 3 || inner.width < 10 {
        return;
    }

    let cols = Columns::fit(inner.width as usize);

    frame.render_widget(
        Paragraph::new(create_header_line(panel, &cols, theme)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    let visible_height = (inner.height - 2) as usize; // header and footer
    let total_files = panel.files.len();

    if total_files == 0 {
        frame.render_widget(
            Paragraph::new(Span::styled("Empty folder", theme.dim_style())).alignment(Alignment::Center),
            Rect::new(inner.x, inner.y + 1 + visible_height as u16 / 2, inner.width, 1),
        );
    }

    // Keep the scroll while the cursor stays visible, otherwise center it
    let current_scroll = panel.scroll_offset;
    let start_index = if total_files <= visible_height {
        0
    } else if panel.selected_index >= current_scroll
        && panel.selected_index < current_scroll + visible_height
    {
        current_scroll.min(total_files - visible_height)
    } else {
        let mut new_start = panel.selected_index.saturating_sub(visible_height / 2);
        if new_start + visible_height > total_files {
            new_start = total_files - visible_height;
        }
        new_start
    };
    panel.scroll_offset = start_index;

    for (i, file) in panel.files.iter().skip(start_index).take(visible_height).enumerate() {
        let is_cursor = start_index + i == panel.selected_index;
        let is_marked = panel.selected_files.contains(&file.name);
        let line = create_file_line(file, is_cursor, is_marked, &cols, theme);

        let paragraph = if is_cursor {
            Paragraph::new(line).style(theme.selected_style())
        } else {
            Paragraph::new(line)
        };
        frame.render_widget(
            paragraph,
            Rect::new(inner.x, inner.y + 1 + i as u16, inner.width, 1),
        );
    }

    if total_files > visible_height {
        let mut scrollbar_state = ScrollbarState::new(total_files).position(panel.selected_index);
        frame.render_stateful_widget(
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼")),
            Rect::new(inner.x + inner.width - 1, inner.y + 1, 1, visible_height as u16),
            &mut scrollbar_state,
        );
    }

    let dir_count = panel.files.iter().filter(|f| f.is_directory).count();
    let file_count = total_files - dir_count;
    let total_size: u64 = panel.files.iter().filter(|f| !f.is_directory).map(|f| f.size).sum();

    let footer = Line::from(Span::styled(
        format!("{} folders, {} files, {}", dir_count, file_count, format_size(total_size)),
        theme.dim_style(),
    ));
    frame.render_widget(
        Paragraph::new(footer).alignment(Alignment::Center),
        Rect::new(inner.x, inner.y + inner.height - 1, inner.width, 1),
    );
}

fn sort_indicator(panel: &PanelState, column: SortBy, label: &str) -> String {
    if panel.sort_by != column {
        return label.to_string();
    }
    match panel.sort_order {
        SortOrder::Asc => format!("{}\u{25B2}", label),
        SortOrder::Desc => format!("{}\u{25BC}", label),
    }
}

fn create_header_line(panel: &PanelState, cols: &Columns, theme: &Theme) -> Line<'static> {
    let name = sort_indicator(panel, SortBy::Name, "Name");
    let mut text = pad_to_width(&format!("  {}", name), cols.name);
    if cols.kind > 0 {
        text.push_str(&pad_to_width("Type", cols.kind));
    }
    if cols.size > 0 {
        text.push_str(&format!(
            "{:>width$}  ",
            sort_indicator(panel, SortBy::Size, "Size"),
            width = cols.size - 2
        ));
    }
    if cols.date > 0 {
        text.push_str(&format!(
            "{:>width$} ",
            sort_indicator(panel, SortBy::Modified, "Modified"),
            width = cols.date - 1
        ));
    }
    Line::from(Span::styled(text, theme.header_style()))
}

/// Truncate to a display width, counting wide characters as two columns
fn truncate_to_width(s: &str, max_width: usize) -> String {
    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width {
            break;
        }
        result.push(c);
        current_width += char_width;
    }
    result
}

fn pad_to_width(s: &str, target_width: usize) -> String {
    let fitted = if s.width() > target_width {
        truncate_to_width(s, target_width)
    } else {
        s.to_string()
    };
    let width = fitted.width();
    format!("{}{}", fitted, " ".repeat(target_width.saturating_sub(width)))
}

fn display_name(name: &str, max_width: usize) -> String {
    if name.width() <= max_width {
        name.to_string()
    } else if max_width > 3 {
        format!("{}...", truncate_to_width(name, max_width - 3))
    } else {
        truncate_to_width(name, max_width)
    }
}

fn create_file_line(
    file: &FileItem,
    is_cursor: bool,
    is_marked: bool,
    cols: &Columns,
    theme: &Theme,
) -> Line<'static> {
    let marker = if is_marked { "* " } else { "  " };
    let suffix = if file.is_directory { "/" } else { "" };
    let name = format!("{}{}", display_name(&file.name, cols.name.saturating_sub(3)), suffix);
    let name_col = pad_to_width(&format!("{}{}", marker, name), cols.name);

    let kind_col = if cols.kind > 0 {
        pad_to_width(&file.type_label(), cols.kind)
    } else {
        String::new()
    };

    let size_col = if cols.size > 0 {
        let size = if file.is_directory {
            String::new()
        } else {
            format_size(file.size)
        };
        format!("{:>width$}  ", size, width = cols.size - 2)
    } else {
        String::new()
    };

    let date_col = if cols.date > 0 {
        format!(
            "{:>width$} ",
            file.modified.format("%y-%m-%d %H:%M").to_string(),
            width = cols.date - 1
        )
    } else {
        String::new()
    };

    // Cursor style is applied at Paragraph level
    let name_style = if is_cursor {
        theme.selected_style()
    } else if is_marked {
        theme.marked_style()
    } else if file.is_directory {
        theme.directory_style()
    } else {
        theme.normal_style()
    };
    let other_style = if is_cursor {
        theme.selected_style()
    } else {
        theme.dim_style()
    };

    Line::from(vec![
        Span::styled(name_col, name_style),
        Span::styled(kind_col, other_style),
        Span::styled(size_col, other_style),
        Span::styled(date_col, other_style),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_shrink_with_width() {
        let wide = Columns::fit(80);
        assert_eq!((wide.kind, wide.size, wide.date), (TYPE_COL, SIZE_COL, DATE_COL));
        assert_eq!(wide.name, 80 - TYPE_COL - SIZE_COL - DATE_COL);

        let narrow = Columns::fit(30);
        assert_eq!((narrow.kind, narrow.date), (0, 0));
        assert_eq!(narrow.size, SIZE_COL);

        let tiny = Columns::fit(12);
        assert_eq!(tiny.name, 12);
    }

    #[test]
    fn test_display_name_truncates_wide_chars() {
        assert_eq!(display_name("short.txt", 20), "short.txt");
        assert_eq!(display_name("abcdefghij", 8), "abcde...");
        assert_eq!(display_name("한글파일이름", 7), "한글...");
    }

    #[test]
    fn test_pad_to_width() {
        assert_eq!(pad_to_width("ab", 4), "ab  ");
        assert_eq!(pad_to_width("한", 3), "한 ");
        assert_eq!(pad_to_width("abcdef", 3), "abc");
    }
}
