//! Shared message formatting helpers for TUI rendering.

use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use tidechat_core::{ChatEngine, ChatMessage, FileRef, Role, StagedAttachment};

/// Role label and style for message headers.
pub fn role_label(role: Role) -> (&'static str, Style) {
    match role {
        Role::User => ("You", Style::default().fg(Color::Cyan).bold()),
        Role::Assistant => ("Assistant", Style::default().fg(Color::Green).bold()),
        Role::System => ("System", Style::default().fg(Color::DarkGray)),
    }
}

/// Human-readable file size (B, KB, MB).
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn attachment_span(file: &FileRef) -> Span<'static> {
    Span::styled(
        format!("📎 {} ({})", file.filename, format_size(file.size)),
        Style::default().fg(Color::Magenta),
    )
}

/// One-line description of a staged file, numbered from 1.
pub fn staged_label(index: usize, file: &StagedAttachment) -> String {
    format!("[{}] {} ({})", index + 1, file.name, format_size(file.size))
}

/// Display lines for one message, using the engine's revealed text.
pub fn message_lines(engine: &ChatEngine, msg: &ChatMessage) -> Vec<Line<'static>> {
    let (label, style) = role_label(msg.role);
    let mut lines = vec![Line::from(vec![
        Span::styled(label, style),
        Span::styled(
            format!("  {}", msg.created_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    for file in &msg.attachments {
        lines.push(Line::from(vec![Span::raw("  "), attachment_span(file)]));
    }

    if msg.is_loading() {
        lines.push(Line::from(Span::styled(
            format!("  {}", msg.content),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
        return lines;
    }

    let content_style = if msg.is_error() {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };

    for line in engine.visible_content(msg).lines() {
        lines.push(Line::from(Span::styled(format!("  {}", line), content_style)));
    }

    lines
}
