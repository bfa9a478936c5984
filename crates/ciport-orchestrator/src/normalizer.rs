//! Deterministic cleanup of generated candidates
//!
//! Applied to every candidate before validation. Pure text in, text out:
//! 1. Strip Markdown code fences around the artifact
//! 2. Pin known action references to current major versions
//! 3. Re-indent heredoc terminators embedded in `run:` scripts
//!
//! Applying [`normalize`] twice gives the same result as applying it once.

use regex::Regex;
use std::sync::OnceLock;

/// Outdated action references and their pinned replacements (exact substring match).
///
/// No replacement contains a key, so rewriting is idempotent.
const ACTION_PINS: &[(&str, &str)] = &[
    ("actions/checkout@v1", "actions/checkout@v4"),
    ("actions/checkout@v2", "actions/checkout@v4"),
    ("actions/checkout@v3", "actions/checkout@v4"),
    ("actions/setup-node@v1", "actions/setup-node@v4"),
    ("actions/setup-node@v2", "actions/setup-node@v4"),
    ("actions/setup-node@v3", "actions/setup-node@v4"),
    ("actions/setup-python@v2", "actions/setup-python@v5"),
    ("actions/setup-python@v3", "actions/setup-python@v5"),
    ("actions/setup-python@v4", "actions/setup-python@v5"),
    ("actions/setup-java@v2", "actions/setup-java@v4"),
    ("actions/setup-java@v3", "actions/setup-java@v4"),
    ("actions/setup-go@v3", "actions/setup-go@v5"),
    ("actions/setup-go@v4", "actions/setup-go@v5"),
    ("actions/cache@v2", "actions/cache@v4"),
    ("actions/cache@v3", "actions/cache@v4"),
    ("actions/upload-artifact@v2", "actions/upload-artifact@v4"),
    ("actions/upload-artifact@v3", "actions/upload-artifact@v4"),
    ("actions/download-artifact@v2", "actions/download-artifact@v4"),
    ("actions/download-artifact@v3", "actions/download-artifact@v4"),
    ("docker/build-push-action@v4", "docker/build-push-action@v6"),
    ("docker/build-push-action@v5", "docker/build-push-action@v6"),
    ("docker/login-action@v2", "docker/login-action@v3"),
    ("docker/setup-buildx-action@v2", "docker/setup-buildx-action@v3"),
    ("docker/metadata-action@v4", "docker/metadata-action@v5"),
];

/// Run every normalization step in order
pub fn normalize(candidate: &str) -> String {
    let text = strip_code_fences(candidate);
    let text = pin_action_versions(&text);
    repair_heredoc_terminators(&text)
}

/// Keep only the body of the fenced block surrounding the artifact, if any
///
/// The opener is the first unindented fence line and the closer the last
/// unindented bare fence after it. Indented fence lines inside block scalars
/// belong to the artifact and are kept.
pub fn strip_code_fences(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();

    let Some(open) = lines.iter().position(|l| is_opening_fence(l)) else {
        return text.to_string();
    };

    let body_start = open + 1;
    let close = lines[body_start..]
        .iter()
        .rposition(|l| is_closing_fence(l))
        .map(|i| body_start + i)
        .unwrap_or(lines.len());

    let mut body = lines[body_start..close].join("\n");
    body.push('\n');
    body
}

fn is_opening_fence(line: &str) -> bool {
    line.starts_with("```")
}

fn is_closing_fence(line: &str) -> bool {
    line.trim_end() == "```"
}

/// Rewrite outdated action references to their pinned versions
pub fn pin_action_versions(text: &str) -> String {
    ACTION_PINS
        .iter()
        .fold(text.to_string(), |acc, (old, new)| {
            if acc.contains(old) {
                acc.replace(old, new)
            } else {
                acc
            }
        })
}

fn heredoc_opener_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // `<<EOF`, `<<-EOF`, `<< 'EOF'`, `<<"EOF"`; not `<<<` here-strings or YAML `<<:`
        Regex::new(r#"(?:^|[^<])<<-?\s*['"]?([A-Za-z_][A-Za-z0-9_]*)['"]?"#)
            .expect("heredoc regex is valid")
    })
}

/// Terminator token declared by a heredoc opener on this line
fn heredoc_token(line: &str) -> Option<&str> {
    heredoc_opener_re()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Align each heredoc's terminator with the line that opened it
///
/// For every opener, only the first later line consisting of whitespace plus
/// the token is touched. Openers without a terminator are left alone.
pub fn repair_heredoc_terminators(text: &str) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();

    for i in 0..lines.len() {
        let Some(token) = heredoc_token(&lines[i]).map(str::to_string) else {
            continue;
        };
        let indent = leading_whitespace(&lines[i]).to_string();

        if let Some(j) = (i + 1..lines.len()).find(|&j| lines[j].trim_start() == token) {
            lines[j] = format!("{}{}", indent, token);
        }
    }

    lines.join("\n")
}
