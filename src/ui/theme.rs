use ratatui::style::{Color, Modifier, Style};

pub struct Theme {
    pub bg_selected: Color,
    pub bg_status_bar: Color,

    pub text: Color,
    pub text_dim: Color,
    pub text_selected: Color,
    pub text_header: Color,
    pub text_directory: Color,

    pub border: Color,
    pub border_active: Color,

    pub marked: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
}

impl Default for Theme {
    fn default() -> Self {
        let truecolor = std::env::var("COLORTERM")
            .map(|v| v == "truecolor" || v == "24bit")
            .unwrap_or(false);

        if truecolor {
            Self::slate_rgb()
        } else {
            Self::slate_256()
        }
    }
}

impl Theme {
    fn slate_rgb() -> Self {
        Self {
            bg_selected: Color::Rgb(59, 66, 82),
            bg_status_bar: Color::Rgb(46, 52, 64),

            text: Color::Rgb(229, 233, 240),
            text_dim: Color::Rgb(127, 138, 158),
            text_selected: Color::Rgb(236, 239, 244),
            text_header: Color::Rgb(136, 192, 208),
            text_directory: Color::Rgb(129, 161, 193),

            border: Color::Rgb(67, 76, 94),
            border_active: Color::Rgb(136, 192, 208),

            marked: Color::Rgb(235, 203, 139),
            success: Color::Rgb(163, 190, 140),
            warning: Color::Rgb(235, 203, 139),
            error: Color::Rgb(191, 97, 106),
            info: Color::Rgb(143, 188, 187),
        }
    }

    /// 256 color palette for terminals without true color
    fn slate_256() -> Self {
        Self {
            bg_selected: Color::Indexed(239),
            bg_status_bar: Color::Indexed(237),

            text: Color::Indexed(255),
            text_dim: Color::Indexed(245),
            text_selected: Color::Indexed(255),
            text_header: Color::Indexed(110),
            text_directory: Color::Indexed(74),

            border: Color::Indexed(240),
            border_active: Color::Indexed(110),

            marked: Color::Indexed(222),
            success: Color::Indexed(108),
            warning: Color::Indexed(222),
            error: Color::Indexed(167),
            info: Color::Indexed(109),
        }
    }

    pub fn normal_style(&self) -> Style {
        Style::default().fg(self.text)
    }

    pub fn dim_style(&self) -> Style {
        Style::default().fg(self.text_dim)
    }

    pub fn selected_style(&self) -> Style {
        Style::default().fg(self.text_selected).bg(self.bg_selected)
    }

    pub fn directory_style(&self) -> Style {
        Style::default()
            .fg(self.text_directory)
            .add_modifier(Modifier::BOLD)
    }

    pub fn header_style(&self) -> Style {
        Style::default()
            .fg(self.text_header)
            .add_modifier(Modifier::BOLD)
    }

    pub fn border_style(&self, active: bool) -> Style {
        if active {
            Style::default().fg(self.border_active)
        } else {
            Style::default().fg(self.border)
        }
    }

    pub fn warning_style(&self) -> Style {
        Style::default()
            .fg(self.warning)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.error)
    }

    pub fn success_style(&self) -> Style {
        Style::default().fg(self.success)
    }

    pub fn marked_style(&self) -> Style {
        Style::default().fg(self.marked)
    }

    pub fn status_bar_style(&self) -> Style {
        Style::default().fg(self.text_header).bg(self.bg_status_bar)
    }

    pub fn gauge_style(&self) -> Style {
        Style::default().fg(self.info).bg(self.bg_status_bar)
    }
}
