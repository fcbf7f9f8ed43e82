//! UI rendering for the TUI.

use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
    Frame,
};

use crate::app::{App, ToastKind};
use crate::message_format::{message_lines, staged_label};

/// Separator line color
const SEPARATOR_COLOR: Color = Color::Rgb(60, 60, 60);
/// Border color for Messages block
const BORDER_MESSAGES: Color = Color::Rgb(80, 160, 80);
/// Border color for the input block
const BORDER_INPUT: Color = Color::Rgb(100, 180, 180);
/// Border color while a generation is running
const BORDER_BUSY: Color = Color::Rgb(255, 180, 100);

/// Render the application UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    let staged_height = if app.engine.staged().is_empty() { 0 } else { 1 };
    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(3),
        Constraint::Length(staged_height),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .split(frame.area());

    render_header(frame, &app.title(), chunks[0]);
    render_messages(frame, app, chunks[1]);
    if staged_height > 0 {
        render_staged(frame, app, chunks[2]);
    }
    render_input(frame, app, chunks[3]);
    render_footer(frame, app, chunks[4]);
    render_toasts(frame, app, chunks[1]);
}

/// Render the header with title.
fn render_header(frame: &mut Frame, title: &str, area: Rect) {
    let header = Paragraph::new(title)
        .style(Style::default().fg(Color::Cyan).bold())
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

fn render_messages(frame: &mut Frame, app: &mut App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    for (idx, msg) in app.engine.messages().iter().enumerate() {
        if idx > 0 {
            lines.push(Line::from(Span::styled(
                "─".repeat(40),
                Style::default().fg(SEPARATOR_COLOR),
            )));
        }
        lines.extend(message_lines(&app.engine, msg));
        lines.push(Line::raw(""));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "  Type a message and press Enter. /attach <path> adds a file.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    // Approximate wrapped height so following the tail keeps the newest text visible
    let inner_width = area.width.saturating_sub(2).max(1) as usize;
    let wrapped_height: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(inner_width))
        .sum();
    let visible_height = area.height.saturating_sub(2) as usize;
    let max_scroll = wrapped_height.saturating_sub(visible_height);
    if app.follow_tail || app.scroll_offset > max_scroll {
        app.scroll_offset = max_scroll;
    }
    if app.scroll_offset == max_scroll {
        app.follow_tail = true;
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_MESSAGES))
                .title(" Messages ")
                .title_style(Style::default().fg(BORDER_MESSAGES).bold()),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.scroll_offset.min(u16::MAX as usize) as u16, 0));

    frame.render_widget(paragraph, area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
        .begin_symbol(Some("↑"))
        .end_symbol(Some("↓"));
    let mut scrollbar_state = ScrollbarState::new(max_scroll).position(app.scroll_offset);

    frame.render_stateful_widget(
        scrollbar,
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar_state,
    );
}

fn render_staged(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(" Files: ", Style::default().fg(Color::Magenta).bold())];
    for (idx, file) in app.engine.staged().iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::raw(staged_label(idx, file)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let (border, title) = if app.engine.is_generating() {
        (BORDER_BUSY, " Enter/Esc to stop ")
    } else {
        (BORDER_INPUT, " Message ")
    };

    let input = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(title),
    );
    frame.render_widget(input, area);

    let cursor_x = area.x + 1 + app.input.chars().count().min(u16::MAX as usize) as u16;
    frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(2)), area.y + 1));
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut footer_spans = vec![
        Span::styled(" Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" send  "),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" stop  "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" scroll  "),
        Span::styled("/new", Style::default().fg(Color::Yellow)),
        Span::raw(" chat  "),
        Span::styled("Ctrl-C", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ];

    if let Some(status) = app.status() {
        footer_spans.push(Span::raw("  │ "));
        footer_spans.push(Span::styled(
            format!("● {}", status),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(footer_spans)), area);
}

/// Stack toasts in the top-right corner of `area`, newest last.
fn render_toasts(frame: &mut Frame, app: &App, area: Rect) {
    let width = area.width.min(50);
    let mut y = area.y + 1;

    for toast in &app.toasts {
        if y + 4 > area.bottom() {
            break;
        }
        let color = match toast.kind {
            ToastKind::Info => Color::Cyan,
            ToastKind::Error => Color::Red,
        };
        let rect = Rect::new(area.right().saturating_sub(width + 1), y, width, 4);
        let body = Paragraph::new(toast.message.as_str())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(color))
                    .title(format!(" {} ", toast.title))
                    .title_style(Style::default().fg(color).bold()),
            );

        frame.render_widget(Clear, rect);
        frame.render_widget(body, rect);
        y += 4;
    }
}
