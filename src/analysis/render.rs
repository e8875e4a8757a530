use serde::Serialize;

/// Line-level display mapping for provider text. Nested or multi-line
/// markdown constructs are not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DisplayBlock {
    SubHeading(String),
    Heading(String),
    ListItem(String),
    LineBreak,
    Paragraph(String),
}

pub fn render_blocks(text: &str) -> Vec<DisplayBlock> {
    text.split('\n').map(classify_line).collect()
}

fn classify_line(line: &str) -> DisplayBlock {
    if let Some(rest) = line.strip_prefix("### ") {
        return DisplayBlock::SubHeading(rest.to_string());
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return DisplayBlock::Heading(rest.to_string());
    }
    if let Some(rest) = line.strip_prefix("* ") {
        return DisplayBlock::ListItem(rest.to_string());
    }
    if line.trim().is_empty() {
        return DisplayBlock::LineBreak;
    }
    DisplayBlock::Paragraph(line.to_string())
}

pub fn render_html(text: &str) -> String {
    render_blocks(text)
        .iter()
        .map(|block| match block {
            DisplayBlock::SubHeading(v) => format!("<h3>{}</h3>", escape_html(v)),
            DisplayBlock::Heading(v) => format!("<h2>{}</h2>", escape_html(v)),
            DisplayBlock::ListItem(v) => format!("<li>{}</li>", escape_html(v)),
            DisplayBlock::LineBreak => String::from("<br>"),
            DisplayBlock::Paragraph(v) => format!("<p>{}</p>", escape_html(v)),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain-text rendition used by the CLI.
pub fn render_terminal(text: &str) -> String {
    render_blocks(text)
        .iter()
        .map(|block| match block {
            DisplayBlock::SubHeading(v) => v.clone(),
            DisplayBlock::Heading(v) => format!("{v}\n{}", "=".repeat(v.chars().count())),
            DisplayBlock::ListItem(v) => format!("  • {v}"),
            DisplayBlock::LineBreak => String::new(),
            DisplayBlock::Paragraph(v) => v.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
