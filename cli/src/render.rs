//! Plain-text status lines for the driver.

use kiln_engine::{App, ContentBlock, Message, Phase, Preview, one_line, truncate_with_ellipsis};

const SUMMARY_CHARS: usize = 80;

/// Turns phase transitions into one-off status lines.
#[derive(Debug)]
pub struct Reporter {
    last_phase: Phase,
}

impl Reporter {
    pub fn new(app: &App) -> Self {
        Self {
            last_phase: app.phase(),
        }
    }

    pub fn observe(&mut self, app: &App) -> Vec<String> {
        let phase = app.phase();
        let previous = std::mem::replace(&mut self.last_phase, phase);
        if previous == phase {
            return Vec::new();
        }

        let mut lines = Vec::new();
        match (previous, phase) {
            (_, Phase::Generating) => lines.push("generating...".to_string()),
            (_, Phase::Error) => {
                lines.push(app.last_error().unwrap_or("generation failed").to_string());
                lines.push("(/retry to try again)".to_string());
            }
            (Phase::Generating, Phase::Executing) => {
                lines.push(format!("generated: {}", preview_title(app.preview())));
                lines.push("executing...".to_string());
            }
            (Phase::Executing, Phase::Idle) => match app.last_sandbox_error() {
                Some(err) => lines.push(format!("execution failed: {err}")),
                None => match app.preview().result.as_ref().and_then(|r| r.url()) {
                    Some(url) => lines.push(format!("preview ready: {url}")),
                    None => lines.push("preview ready".to_string()),
                },
            },
            (Phase::Generating, Phase::Idle) => lines.push("generation finished".to_string()),
            _ => {}
        }
        lines
    }
}

fn preview_title(preview: &Preview) -> String {
    let Some(fragment) = preview.fragment.as_ref() else {
        return "(empty)".to_string();
    };
    let raw = fragment
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| fragment.commentary_or_empty());
    truncate_with_ellipsis(&one_line(raw), SUMMARY_CHARS)
}

fn summarize(message: &Message) -> String {
    let mut parts = Vec::new();
    for block in message.content() {
        match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => parts.push(one_line(text)),
            ContentBlock::Code { text } if !text.trim().is_empty() => {
                parts.push(format!("<{} lines of code>", text.lines().count()));
            }
            ContentBlock::Image { .. } => parts.push("<image>".to_string()),
            _ => {}
        }
    }
    if message.result().is_some() {
        parts.push("[executed]".to_string());
    }
    truncate_with_ellipsis(&parts.join(" "), SUMMARY_CHARS)
}

pub fn history_lines(messages: &[Message]) -> Vec<String> {
    if messages.is_empty() {
        return vec!["(empty conversation)".to_string()];
    }
    messages
        .iter()
        .enumerate()
        .map(|(i, message)| format!("[{i}] {}: {}", message.role().as_str(), summarize(message)))
        .collect()
}

pub fn preview_lines(preview: &Preview) -> Vec<String> {
    let Some(fragment) = preview.fragment.as_ref() else {
        return vec!["(no preview)".to_string()];
    };
    let mut lines = vec![format!("preview: {}", preview_title(preview))];
    if let Some(template) = fragment.template.as_deref() {
        lines.push(format!("template: {template}"));
    }
    lines.extend(fragment.code_or_empty().lines().map(|l| format!("  {l}")));
    if let Some(url) = preview.result.as_ref().and_then(|r| r.url()) {
        lines.push(format!("url: {url}"));
    }
    lines
}
