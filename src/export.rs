//! Write a conversation to a standalone file.

use std::fmt;
use std::fs;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::history::Statistics;
use crate::models;
use crate::types::{Message, Role};
use crate::utils::time::{display, file_stamp};

/// Output formats for [`export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Machine-readable dump including config and statistics.
    Json,
    /// Plain text transcript.
    Txt,
    /// Markdown transcript.
    Md,
    /// Self-contained HTML page.
    Html,
}

impl ExportFormat {
    /// Every format.
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Json,
        ExportFormat::Txt,
        ExportFormat::Md,
        ExportFormat::Html,
    ];

    /// The file extension, which is also the format's name.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
            ExportFormat::Md => "md",
            ExportFormat::Html => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| {
                Error::validation(
                    format!("Unsupported export format: {s} (expected json, txt, md, or html)"),
                    Some("format".to_string()),
                )
            })
    }
}

/// What gets exported.
#[derive(Debug, Clone)]
pub struct Conversation<'a> {
    /// The agent id.
    pub agent_id: &'a str,
    /// The agent's config at export time.
    pub config: &'a AgentConfig,
    /// The messages, oldest first.
    pub messages: &'a [Message],
    /// Statistics of `messages`.
    pub statistics: Statistics,
    /// When the export was made.
    pub exported_at: OffsetDateTime,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    agent_id: &'a str,
    #[serde(with = "crate::utils::time")]
    exported_at: OffsetDateTime,
    config: &'a AgentConfig,
    messages: &'a [Message],
    statistics: &'a Statistics,
}

/// Write `conversation` into `dir` as `conversation_<YYYYMMDD_HHMMSS>.<ext>`.
pub fn export(dir: &Path, format: ExportFormat, conversation: &Conversation<'_>) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|err| Error::io(format!("failed to create {}", dir.display()), err))?;
    let path = dir.join(format!(
        "conversation_{}.{}",
        file_stamp(&conversation.exported_at),
        format.extension()
    ));
    let body = render(format, conversation)?;
    fs::write(&path, body)
        .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
    info!("Exported conversation to {}", path.display());
    Ok(path)
}

/// Render `conversation` in `format`.
pub fn render(format: ExportFormat, conversation: &Conversation<'_>) -> Result<String> {
    match format {
        ExportFormat::Json => render_json(conversation),
        ExportFormat::Txt => Ok(render_txt(conversation)),
        ExportFormat::Md => Ok(render_md(conversation)),
        ExportFormat::Html => Ok(render_html(conversation)),
    }
}

fn render_json(c: &Conversation<'_>) -> Result<String> {
    let export = JsonExport {
        agent_id: c.agent_id,
        exported_at: c.exported_at,
        config: c.config,
        messages: c.messages,
        statistics: &c.statistics,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

fn render_txt(c: &Conversation<'_>) -> String {
    let model = models::display_name(&c.config.model);
    let mut out = String::new();
    let _ = writeln!(out, "OpenAI {model} Chat Agent Conversation Export");
    let _ = writeln!(out, "Agent ID: {}", c.agent_id);
    let _ = writeln!(out, "Model: {}", c.config.model);
    let _ = writeln!(out, "Exported: {}", display(&c.exported_at));
    let _ = writeln!(out, "{}\n", "=".repeat(50));
    for m in c.messages {
        let _ = writeln!(
            out,
            "[{}] {}:\n{}\n",
            display(&m.timestamp),
            m.role.as_str().to_uppercase(),
            m.content
        );
    }
    out
}

fn title_case(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::Developer => "Developer",
    }
}

fn render_md(c: &Conversation<'_>) -> String {
    let model = models::display_name(&c.config.model);
    let mut out = String::new();
    let _ = writeln!(out, "# OpenAI {model} Chat Agent Conversation\n");
    let _ = writeln!(out, "**Agent ID:** {}  ", c.agent_id);
    let _ = writeln!(out, "**Model:** {}  ", c.config.model);
    let _ = writeln!(out, "**Exported:** {}  \n", display(&c.exported_at));
    for m in c.messages {
        let icon = if m.role == Role::User { "🧑" } else { "🤖" };
        let _ = writeln!(
            out,
            "## {icon} {} - {}\n\n{}\n",
            title_case(m.role),
            display(&m.timestamp),
            m.content
        );
    }
    out
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape `content` and wrap the odd-numbered segments between ``` fences in code blocks.
fn format_html_content(content: &str) -> String {
    let escaped = escape_html(content);
    if !escaped.contains("```") {
        return escaped;
    }
    escaped
        .split("```")
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 1 {
                format!("<div class=\"code-block\">{part}</div>")
            } else {
                part.to_string()
            }
        })
        .collect()
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

const HTML_STYLE: &str = r#"
  body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; line-height: 1.6;
         color: #1e293b; background: #eef2f7; margin: 0; padding: 2rem; }
  .page { max-width: 960px; margin: 0 auto; background: #fff; border-radius: 12px;
          box-shadow: 0 10px 30px rgba(0,0,0,.12); overflow: hidden; }
  header { background: #2563eb; color: #fff; padding: 1.5rem 2rem; }
  header dl { display: grid; grid-template-columns: max-content 1fr; gap: .25rem 1rem; margin: 1rem 0 0; }
  header dt { font-weight: bold; }
  header dd { margin: 0; }
  .stats { display: grid; grid-template-columns: repeat(auto-fit, minmax(140px, 1fr));
           gap: 1rem; background: #f1f5f9; padding: 1.25rem 2rem; }
  .stat b { display: block; font-size: 1.4rem; color: #2563eb; }
  .stat span { font-size: .8rem; text-transform: uppercase; color: #64748b; }
  .messages { padding: 1.5rem 2rem; }
  .message { margin-bottom: 1.25rem; padding: 1rem; border-radius: 8px; border: 1px solid #e2e8f0; }
  .message.user { background: #eff6ff; }
  .message.assistant { background: #ecfdf5; }
  .meta { display: flex; justify-content: space-between; font-size: .8rem; color: #64748b; }
  .role { font-weight: bold; text-transform: capitalize; }
  .text { white-space: pre-wrap; margin-top: .5rem; }
  .code-block { background: #f8fafc; border: 1px solid #e2e8f0; border-radius: 6px; padding: .75rem;
                font-family: Menlo, Monaco, monospace; font-size: .9rem; overflow-x: auto; }
  footer { text-align: center; font-size: .8rem; color: #64748b; padding: 1rem; border-top: 1px solid #e2e8f0; }
"#;

fn render_html(c: &Conversation<'_>) -> String {
    let model = escape_html(models::display_name(&c.config.model));
    let agent = escape_html(c.agent_id);
    let exported = display(&c.exported_at);
    let s = &c.statistics;
    let duration = s
        .duration
        .map(crate::utils::time::elapsed)
        .unwrap_or_else(|| "N/A".to_string());

    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>OpenAI {model} Conversation - {agent}</title>\n<style>{HTML_STYLE}</style>\n\
         </head>\n<body>\n<div class=\"page\">\n<header>\n<h1>OpenAI {model} Chat Agent</h1>\n<dl>\n\
         <dt>Agent ID</dt><dd>{agent}</dd>\n<dt>Model</dt><dd>{}</dd>\n\
         <dt>Exported</dt><dd>{exported}</dd>\n<dt>Temperature</dt><dd>{}</dd>\n</dl>\n</header>\n",
        escape_html(&c.config.model),
        c.config.temperature,
    );
    let _ = writeln!(out, "<section class=\"stats\">");
    for (value, label) in [
        (s.total_messages.to_string(), "Total Messages"),
        (s.user_messages.to_string(), "User Messages"),
        (s.assistant_messages.to_string(), "Assistant Messages"),
        (group_thousands(s.total_characters), "Total Characters"),
        (group_thousands(s.average_message_length), "Avg Message Length"),
        (duration, "Duration"),
    ] {
        let _ = writeln!(
            out,
            "<div class=\"stat\"><b>{value}</b><span>{label}</span></div>"
        );
    }
    let _ = writeln!(out, "</section>\n<section class=\"messages\">");
    for m in c.messages {
        let _ = writeln!(
            out,
            "<div class=\"message {role}\">\n<div class=\"meta\"><span class=\"role\">{role}</span>\
             <span class=\"time\">{time}</span></div>\n<div class=\"text\">{text}</div>\n</div>",
            role = m.role.as_str(),
            time = display(&m.timestamp),
            text = format_html_content(&m.content),
        );
    }
    let _ = write!(
        out,
        "</section>\n<footer>Generated by OpenAI {model} Chat Agent &middot; Agent ID: {agent} \
         &middot; {exported}</footer>\n</div>\n</body>\n</html>\n"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::statistics;
    use time::macros::datetime;

    fn messages() -> Vec<Message> {
        vec![
            Message::user("Show <b>code</b> & \"quotes\"").at(datetime!(2025-03-01 12:00:00 UTC)),
            Message::assistant("Here:\n```fn main() {}```\ndone").at(datetime!(2025-03-01 12:00:05 UTC)),
        ]
    }

    fn conversation<'a>(config: &'a AgentConfig, messages: &'a [Message]) -> Conversation<'a> {
        Conversation {
            agent_id: "demo",
            config,
            messages,
            statistics: statistics(messages),
            exported_at: datetime!(2025-03-02 08:09:10 UTC),
        }
    }

    #[test]
    fn formats_parse() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Md);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn json_contains_everything() {
        let config = AgentConfig::for_model("gpt-5");
        let messages = messages();
        let body = render(ExportFormat::Json, &conversation(&config, &messages)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["agent_id"], "demo");
        assert_eq!(value["config"]["model"], "gpt-5");
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["statistics"]["total_messages"], 2);
        assert_eq!(value["statistics"]["conversation_duration"], "0:00:05");
    }

    #[test]
    fn txt_and_md_list_messages() {
        let config = AgentConfig::for_model("gpt-5-mini");
        let messages = messages();
        let c = conversation(&config, &messages);
        let txt = render(ExportFormat::Txt, &c).unwrap();
        assert!(txt.starts_with("OpenAI GPT-5 Mini Chat Agent Conversation Export\n"));
        assert!(txt.contains("[2025-03-01 12:00:00] USER:\nShow <b>code</b>"));
        let md = render(ExportFormat::Md, &c).unwrap();
        assert!(md.contains("## 🤖 Assistant - 2025-03-01 12:00:05"));
    }

    #[test]
    fn html_escapes_and_marks_code() {
        let config = AgentConfig::for_model("gpt-5");
        let messages = messages();
        let html = render(ExportFormat::Html, &conversation(&config, &messages)).unwrap();
        assert!(html.contains("Show &lt;b&gt;code&lt;/b&gt; &amp; &quot;quotes&quot;"));
        assert!(html.contains("<div class=\"code-block\">fn main() {}</div>"));
        assert!(!html.contains("<b>code</b>"));
    }

    #[test]
    fn export_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::for_model("gpt-5");
        let messages = messages();
        let path = export(dir.path(), ExportFormat::Txt, &conversation(&config, &messages)).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "conversation_20250302_080910.txt"
        );
        assert!(fs::read_to_string(path).unwrap().contains("Agent ID: demo"));
    }
}
