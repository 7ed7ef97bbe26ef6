//! Text shaping for rows, recent lines and the detail view.
//!
//! Wrapping is character based: a segment is cut into fixed-width chunks
//! without looking at word boundaries, so the cost is linear in the input and
//! the result does not depend on content shape. Pretty previews replace the
//! raw tail with a one-line summary extracted heuristically from (possibly
//! incomplete) tool arguments or output text.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::aggregator::{BoundedText, RecentLine};
use crate::classify::{sse_json, ColorClass, LevelHint};
use crate::state::PreviewMode;

/// Argument extraction only looks at this many trailing characters.
const ARGS_WINDOW: usize = 2000;

/// Separator between summary parts.
const PART_SEP: &str = "  ·  ";

static QUOTED_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"\\]*(?:\\.[^"\\]*)*)""#).expect("valid token regex")
});
static COMMAND_ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"command"\s*:\s*\[(.*?)\]"#).expect("valid command regex")
});
static ESCALATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"with_escalated_permissions"\s*:\s*(true|false)"#)
        .expect("valid escalation regex")
});
static TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""timeout_ms"\s*:\s*(\d+)"#).expect("valid timeout regex"));
static JUSTIFICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""justification"\s*:\s*"(.+?)""#).expect("valid justification regex")
});
static PATCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\*\*\* Begin Patch(.*)\*\*\* End Patch").expect("valid patch regex")
});
static ERROR_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(error|exception|traceback|failed)\b").expect("valid error regex")
});
static WARN_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(warn|deprecate)\w*\b").expect("valid warn regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid link regex"));
static ISO_TS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+Z").expect("valid timestamp regex")
});
static FUNCTION_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"FunctionCall:\s*(\{.*\})\s*$").expect("valid function call regex")
});
static JSON_KEY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*)("[^"\\]*(?:\\.[^"\\]*)*")\s*:(\s*)(.*)$"#).expect("valid json line regex")
});

static TOOL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    field_patterns(&["name", "tool", "tool_name", "function", "action"], r#""([^"]+)""#)
});
static QUERY_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    field_patterns(&["query", "q", "text", "prompt", "input"], r#""(.+?)""#)
});
static URL_RES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| field_patterns(&["url", "uri"], r#""(https?://[^"\s]+)""#));
static PATH_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    field_patterns(&["file", "path", "filepath", "filename"], r#""([^"\n]+)""#)
});
static COMMAND_RES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| field_patterns(&["command", "cmd", "shell"], r#""([^"\n]+)""#));

fn field_patterns(keys: &[&str], value: &str) -> Vec<Regex> {
    keys.iter()
        .map(|key| Regex::new(&format!(r#""{key}"\s*:\s*{value}"#)).expect("valid field regex"))
        .collect()
}

/// First capture of the first pattern that matches. Earlier keys win.
fn first_capture(patterns: &[Regex], src: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(src).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
}

/// Collapses whitespace and cuts to `limit` characters, marking the cut.
pub fn ellipsize(text: &str, limit: usize) -> String {
    if limit <= 1 {
        return if text.is_empty() { String::new() } else { "…".to_string() };
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(limit - 1).collect();
    out.push('…');
    out
}

/// Like [`ellipsize`] but keeps the end of the text.
pub fn tail_ellipsize(text: &str, limit: usize) -> String {
    if limit <= 1 {
        return if text.is_empty() { String::new() } else { "…".to_string() };
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let count = collapsed.chars().count();
    if count <= limit {
        return collapsed;
    }
    let mut out = String::from("…");
    out.extend(collapsed.chars().skip(count - (limit - 1)));
    out
}

/// Shortens a stream id to `keep` characters.
pub fn shorten_id(id: &str, keep: usize) -> String {
    if id.is_empty() {
        return "<no-id>".to_string();
    }
    if id.chars().count() <= keep {
        return id.to_string();
    }
    let mut out: String = id.chars().take(keep).collect();
    out.push('…');
    out
}

fn segment_chunks(segment: &str, width: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in segment.chars().filter(|&c| c != '\r') {
        if count == width {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    chunks.push(current);
    chunks
}

/// Splits on newlines and cuts each segment into `width`-character chunks.
/// Carriage returns are dropped. Empty segments yield empty lines.
pub fn wrap_chunks(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    text.split('\n')
        .flat_map(|segment| segment_chunks(segment, width))
        .collect()
}

/// The last `limit` lines of `wrap_chunks(text, width)`, computed from the end.
pub fn wrap_tail(text: &str, width: usize, limit: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::with_capacity(limit);
    for segment in text.rsplit('\n') {
        if out.len() >= limit {
            break;
        }
        for chunk in segment_chunks(segment, width).into_iter().rev() {
            if out.len() >= limit {
                break;
            }
            out.push(chunk);
        }
    }
    out.reverse();
    out
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if host.is_empty() {
        url
    } else {
        host
    }
}

/// Fields recognized in (possibly partial) tool-call arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgsSummary {
    /// Tool or function name.
    pub tool_name: Option<String>,
    /// Search query or prompt text.
    pub query: Option<String>,
    /// First URL.
    pub url: Option<String>,
    /// File path.
    pub path: Option<String>,
    /// Command line, joined if given as an array.
    pub command: Option<String>,
    /// `with_escalated_permissions: true`.
    pub escalated: bool,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Justification text.
    pub justification: Option<String>,
    /// Top-level keys when nothing else matched and the text is a JSON object.
    pub keys: Vec<String>,
}

impl ArgsSummary {
    fn is_empty(&self) -> bool {
        self.tool_name.is_none()
            && self.query.is_none()
            && self.url.is_none()
            && self.path.is_none()
            && self.command.is_none()
            && !self.escalated
            && self.timeout_ms.is_none()
            && self.justification.is_none()
    }
}

/// Pulls well-known fields out of argument text by pattern, tolerating
/// truncated or still-streaming JSON.
pub fn extract_args(text: &str) -> ArgsSummary {
    let count = text.chars().count();
    let src = text
        .char_indices()
        .nth(count.saturating_sub(ARGS_WINDOW))
        .map_or(text, |(i, _)| &text[i..])
        .trim();

    let mut out = ArgsSummary {
        tool_name: first_capture(&TOOL_RES, src),
        query: first_capture(&QUERY_RES, src),
        url: first_capture(&URL_RES, src),
        path: first_capture(&PATH_RES, src),
        command: first_capture(&COMMAND_RES, src),
        ..ArgsSummary::default()
    };

    if out.command.is_none() {
        if let Some(array) = COMMAND_ARRAY_RE.captures(src).and_then(|c| c.get(1)) {
            let tokens: Vec<String> = QUOTED_TOKEN_RE
                .captures_iter(array.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().replace("\\\"", "\""))
                .collect();
            if !tokens.is_empty() {
                out.command = Some(tokens.join(" "));
            }
        }
    }

    out.escalated = ESCALATED_RE
        .captures(src)
        .and_then(|c| c.get(1))
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("true"));
    out.timeout_ms = TIMEOUT_RE
        .captures(src)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    out.justification = JUSTIFICATION_RE
        .captures(src)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    if out.is_empty() {
        if let Ok(map) = serde_json::from_str::<serde_json::Map<String, Value>>(src) {
            out.keys = map.keys().take(6).cloned().collect();
        }
    }
    out
}

/// Diffstat line for an `apply_patch` envelope, `None` if there is none.
pub fn summarize_patch(text: &str, width: usize) -> Option<String> {
    if !text.contains("apply_patch") && !text.contains("*** Begin Patch") {
        return None;
    }
    let body = PATCH_RE.captures(text)?.get(1)?.as_str();

    let (mut add, mut update, mut delete, mut plus, mut minus) = (0, 0, 0, 0, 0);
    let mut files: Vec<(&str, &str)> = Vec::new();
    for line in body.lines() {
        if let Some(path) = line.strip_prefix("*** Add File: ") {
            add += 1;
            files.push(("+", basename(path.trim())));
        } else if let Some(path) = line.strip_prefix("*** Update File: ") {
            update += 1;
            files.push(("✏️", basename(path.trim())));
        } else if let Some(path) = line.strip_prefix("*** Delete File: ") {
            delete += 1;
            files.push(("🗑️", basename(path.trim())));
        } else if line.starts_with('+') {
            plus += 1;
        } else if line.starts_with('-') {
            minus += 1;
        }
    }

    let mut head = format!("🧩 patch: {add}➕ {update}✏️ {delete}🗑️ · +{plus} −{minus}");
    if !files.is_empty() {
        let mut shown = files
            .iter()
            .take(3)
            .map(|(mark, name)| format!("{mark} {name}"))
            .collect::<Vec<_>>()
            .join(" ");
        if files.len() > 3 {
            shown.push_str(" …");
        }
        head.push_str(" · ");
        head.push_str(&ellipsize(&shown, width.max(12)));
    }
    Some(head)
}

fn args_parts(info: &ArgsSummary, width: usize) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(tool) = &info.tool_name {
        parts.push(format!("🧰 {tool}"));
    }
    if let Some(query) = &info.query {
        parts.push(format!("🔎 {}", ellipsize(query, (width / 2).max(8))));
    }
    if let Some(url) = &info.url {
        parts.push(format!("🔗 {}", ellipsize(host_of(url), (width / 3).max(8))));
    }
    if let Some(path) = &info.path {
        parts.push(format!("📄 {}", ellipsize(basename(path), (width / 3).max(8))));
    }
    if let Some(command) = &info.command {
        match summarize_patch(command, width) {
            Some(patch) => parts.push(patch),
            None => parts.push(format!("🛠️ {}", ellipsize(command, (width / 2).max(12)))),
        }
    }
    parts
}

/// A synthesized one-line preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Summary text, already fitted to the width.
    pub text: String,
    /// Color class the row should use.
    pub class: ColorClass,
}

/// Summarizes stream content for the list view.
pub fn summarize(event_type: &str, content: &str, width: usize) -> Summary {
    let text = content.trim();

    if event_type.ends_with("function_call_arguments.delta") || text.starts_with('{') {
        let info = extract_args(text);
        let mut parts = args_parts(&info, width);
        if info.escalated {
            parts.push("🛡️ root".to_string());
        }
        if let Some(ms) = info.timeout_ms.filter(|&ms| ms > 0) {
            parts.push(format!("⏱️ {}s", ms / 1000));
        }
        if let Some(why) = &info.justification {
            parts.push(format!("✍️ {}", ellipsize(why, (width / 2).max(10))));
        }
        if parts.is_empty() && !info.keys.is_empty() {
            parts.push(format!("🧰 args:{}", info.keys.join(",")));
        }
        if !parts.is_empty() {
            return Summary {
                text: ellipsize(&parts.join(PART_SEP), width),
                class: ColorClass::Args,
            };
        }
    }

    if text.starts_with("```") {
        return Summary {
            text: ellipsize("🧩 code block", width),
            class: ColorClass::Notice,
        };
    }
    if ERROR_WORD_RE.is_match(text) {
        return Summary {
            text: ellipsize(&format!("❌ {text}"), width),
            class: ColorClass::Error,
        };
    }
    if WARN_WORD_RE.is_match(text) {
        return Summary {
            text: ellipsize(&format!("⚠️ {text}"), width),
            class: ColorClass::Notice,
        };
    }
    if let Some(link) = LINK_RE.find(text) {
        return Summary {
            text: ellipsize(&format!("🔗 {} · {text}", host_of(link.as_str())), width),
            class: ColorClass::Notice,
        };
    }
    if event_type.ends_with("output_text.delta") {
        return Summary {
            text: ellipsize(&format!("💬 {text}"), width),
            class: ColorClass::Output,
        };
    }
    Summary {
        text: ellipsize(text, width),
        class: ColorClass::of(event_type),
    }
}

/// Row lines for one stream under the given preview mode, at most `limit`.
///
/// Off shows the last `limit` wrapped lines. Summary shows the summary only.
/// Hybrid follows the summary with a tail excerpt of the content that the
/// summary did not already show.
pub fn preview_lines(
    mode: PreviewMode,
    event_type: &str,
    content: &BoundedText,
    width: usize,
    limit: usize,
) -> (Vec<String>, ColorClass) {
    let width = width.max(1);
    let limit = limit.max(1);
    if !mode.is_pretty() {
        // The last `limit` lines span at most `limit * (width + 1)` characters.
        let excerpt = content.wrap_aligned_tail(limit.saturating_mul(width + 1), width);
        return (wrap_tail(&excerpt, width, limit), ColorClass::of(event_type));
    }

    let raw = content.snapshot();

    let summary = summarize(event_type, &raw, width);
    let mut lines = wrap_chunks(&summary.text, width);
    if mode == PreviewMode::Summary || limit <= lines.len() {
        lines.truncate(limit);
        return (lines, summary.class);
    }

    let remain = limit - lines.len();
    let shown: usize = lines.iter().map(|l| l.chars().count()).sum();
    let flat: String = raw
        .chars()
        .filter(|&c| c != '\r')
        .map(|c| if c == '\n' { ' ' } else { c })
        .skip(shown)
        .collect();
    let tail = tail_ellipsize(&flat, width * remain);
    if !tail.is_empty() {
        let tail_lines = wrap_chunks(&tail, width);
        let skip = tail_lines.len().saturating_sub(remain);
        lines.extend(tail_lines.into_iter().skip(skip));
    }
    (lines, summary.class)
}

/// How a recent line is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentView {
    /// Level badge drawn before the text, if any.
    pub badge: Option<LevelHint>,
    /// Line text, fitted to the width.
    pub text: String,
    /// Text color for badge-less lines.
    pub class: ColorClass,
}

impl RecentView {
    fn badged(line: &RecentLine, width: usize) -> Self {
        let clean = ISO_TS_RE.replace(&line.text, "");
        let badge_len = line.level.name().len() + 3;
        Self {
            badge: Some(line.level),
            text: ellipsize(clean.trim(), width.saturating_sub(badge_len).max(1)),
            class: ColorClass::Default,
        }
    }

    fn plain(text: &str, class: ColorClass, width: usize) -> Self {
        Self {
            badge: None,
            text: ellipsize(text, width),
            class,
        }
    }
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Shapes one recent line. With `pretty` off every line gets a level badge;
/// with it on, structured and `FunctionCall:` lines are summarized.
pub fn recent_view(line: &RecentLine, width: usize, pretty: bool) -> RecentView {
    if !pretty {
        return RecentView::badged(line, width);
    }

    if let Some(obj) = sse_json(&line.text).and_then(|json| serde_json::from_str::<Value>(json).ok()) {
        return recent_event_view(&obj, width);
    }

    if let Some(call) = FUNCTION_CALL_RE
        .captures(&line.text)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object)
    {
        let command = match call.get("command") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let text = summarize_patch(&command, width)
            .unwrap_or_else(|| format!("🛠️ call: {}", ellipsize(&command, width.max(8))));
        return RecentView::plain(&text, ColorClass::Tool, width);
    }

    RecentView::badged(line, width)
}

fn recent_event_view(obj: &Value, width: usize) -> RecentView {
    let event_type = str_field(obj, "type").unwrap_or_default().to_ascii_lowercase();
    let class = ColorClass::of(&event_type);

    let mut meta = Vec::new();
    if let Some(id) = obj.get("item_id").filter(|v| !v.is_null()) {
        let id = id.as_str().map_or_else(|| id.to_string(), str::to_string);
        if !id.is_empty() {
            meta.push(shorten_id(&id, 10));
        }
    }
    if let Some(index) = obj.get("output_index").and_then(Value::as_i64) {
        meta.push(format!("#{index}"));
    }
    let prefix = if meta.is_empty() {
        String::new()
    } else {
        format!("{}: ", meta.join(" "))
    };
    let delta = str_field(obj, "delta");

    let body = if event_type.ends_with("function_call_arguments.delta") {
        let info = extract_args(delta.unwrap_or_default());
        let mut parts = args_parts(&info, width);
        if parts.is_empty() {
            if let Some(delta) = delta {
                parts.push(ellipsize(delta, width.max(8)));
            }
        }
        if parts.is_empty() {
            "🧰 args …".to_string()
        } else {
            parts.join(PART_SEP)
        }
    } else if event_type.ends_with("output_text.delta") {
        match delta.map(str::trim).filter(|d| !d.is_empty()) {
            Some(delta) => format!("💬 {delta}"),
            None => "💬 …".to_string(),
        }
    } else if event_type.contains("error") {
        let message = obj
            .get("message")
            .or_else(|| obj.get("error"))
            .or_else(|| obj.get("delta"))
            .filter(|v| !v.is_null())
            .map_or_else(
                || "error".to_string(),
                |v| v.as_str().map_or_else(|| v.to_string(), str::to_string),
            );
        format!("❌ {message}")
    } else {
        let label = str_field(obj, "type").unwrap_or("event");
        match delta {
            Some(delta) => format!("📡 {label}: {}", ellipsize(delta, (width / 2).max(8))),
            None => format!("📡 {label}"),
        }
    };

    RecentView::plain(&format!("{prefix}{body}"), class, width)
}

/// Pretty-printed JSON lines when the whole content parses as an object or
/// array, `None` otherwise.
pub fn pretty_json_lines(content: &str) -> Option<Vec<String>> {
    let text = content.trim();
    if !text.starts_with('{') && !text.starts_with('[') {
        return None;
    }
    let value: Value = serde_json::from_str(text).ok()?;
    let pretty = serde_json::to_string_pretty(&value).ok()?;
    Some(pretty.split('\n').map(str::to_string).collect())
}

/// Word-wraps one pretty JSON line, repeating its indent on continuation
/// lines. Words longer than the width are left whole.
pub fn wrap_json_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let indent_len = indent.chars().count();

    let mut out = Vec::new();
    let mut current = indent.to_string();
    let mut current_len = indent_len;
    let mut has_word = false;
    for word in body.split(' ') {
        let word_len = word.chars().count();
        let needed = if has_word { word_len + 1 } else { word_len };
        if has_word && current_len + needed > width {
            out.push(std::mem::replace(&mut current, indent.to_string()));
            current_len = indent_len;
            has_word = false;
        }
        if has_word {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
        has_word = true;
    }
    out.push(current);
    out
}

/// Kind of a JSON value, for coloring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonValueKind {
    /// Quoted string.
    String,
    /// Number.
    Number,
    /// `true`, `false` or `null`.
    Literal,
    /// Brackets and anything else.
    Other,
}

impl JsonValueKind {
    fn of(value: &str) -> Self {
        let value = value.trim_start();
        if value.starts_with('"') {
            Self::String
        } else if value.starts_with('-') || value.starts_with(|c: char| c.is_ascii_digit()) {
            Self::Number
        } else if ["true", "false", "null"].iter().any(|lit| value.starts_with(lit)) {
            Self::Literal
        } else {
            Self::Other
        }
    }
}

/// One pretty JSON line split for highlighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLineParts<'a> {
    /// Leading whitespace.
    pub indent: &'a str,
    /// Quoted key, if the line starts with one.
    pub key: Option<&'a str>,
    /// The colon and the whitespace after it.
    pub separator: &'a str,
    /// The rest of the line.
    pub value: &'a str,
    /// Kind of `value`.
    pub kind: JsonValueKind,
}

/// Splits a pretty JSON line into indent, key and value.
pub fn json_line_parts(line: &str) -> JsonLineParts<'_> {
    if let Some(caps) = JSON_KEY_LINE_RE.captures(line) {
        let group = |i| caps.get(i).map_or("", |m| m.as_str());
        let key = caps.get(2).map(|m| m.as_str());
        let colon_start = caps.get(2).map_or(0, |m| m.end());
        let value_start = caps.get(4).map_or(line.len(), |m| m.start());
        let separator = &line[colon_start..value_start];
        let value = group(4);
        return JsonLineParts {
            indent: group(1),
            key,
            separator,
            value,
            kind: JsonValueKind::of(value),
        };
    }
    let body = line.trim_start();
    JsonLineParts {
        indent: &line[..line.len() - body.len()],
        key: None,
        separator: "",
        value: body,
        kind: JsonValueKind::of(body),
    }
}
