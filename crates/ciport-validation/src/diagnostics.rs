//! Diagnostic parsing for validator output
//!
//! Only stdout lines starting with [`DIAGNOSTIC_PREFIX`] are diagnostics.
//! Everything else (source snippets, caret markers, summaries) is noise,
//! kept in the raw outcome for logging but ignored here.

use ciport_core::{Diagnostic, DocKey};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Candidates are validated as `.github/workflows/<name>.yml`, so every
/// diagnostic line starts with this path
pub const DIAGNOSTIC_PREFIX: &str = ".github/workflows/";

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<path>\S+?):(?P<line>\d+):(?P<col>\d+):\s*(?P<msg>.*)$")
            .expect("location regex is valid")
    })
}

fn doc_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\S+?:\d+:\d+:\s*(?P<msg>.*?)\s+see\s+(?P<url>https?://\S+)")
            .expect("doc reference regex is valid")
    })
}

/// Loose shape used when no `see <url>` is present, for reversed fields
fn swapped_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\S+?:\d+:\d+:\s*(?P<first>\S+?)\s+see\s+(?P<second>.+?)\s*$")
            .expect("swapped reference regex is valid")
    })
}

fn is_diagnostic_line(line: &str) -> bool {
    line.starts_with(DIAGNOSTIC_PREFIX)
}

/// Parse every diagnostic line in validator stdout
///
/// One [`Diagnostic`] per prefixed line. A line whose location cannot be read
/// still counts, with line and column 0 and the whole line as the message.
pub fn parse_diagnostics(stdout: &str) -> Vec<Diagnostic> {
    stdout
        .lines()
        .filter(|line| is_diagnostic_line(line))
        .map(|line| {
            let reference_url = parse_doc_reference(line).map(|key| key.url);
            let located = location_re().captures(line).and_then(|caps| {
                Some((
                    caps["line"].parse().ok()?,
                    caps["col"].parse().ok()?,
                    caps["msg"].trim().to_string(),
                ))
            });
            let (line_no, column, message) =
                located.unwrap_or_else(|| (0, 0, line.trim().to_string()));

            Diagnostic {
                line: line_no,
                column,
                message,
                reference_url,
            }
        })
        .collect()
}

/// Distinct (url, message) documentation references in validator stdout
///
/// The set is ordered, so callers iterate keys deterministically.
pub fn extract_doc_references(stdout: &str) -> BTreeSet<DocKey> {
    stdout.lines().filter_map(parse_doc_reference).collect()
}

/// Extract a (url, message) pair from one `location: message see url` line
///
/// The message may itself contain "see"; the URL is the one following the
/// first "see" that is followed by a URL. When the line instead reads
/// `location: url see message` the fields are swapped back. If neither
/// shape fits, the line has no usable reference.
pub fn parse_doc_reference(line: &str) -> Option<DocKey> {
    let (url, message) = match doc_reference_re().captures(line) {
        Some(caps) => (clean_url(&caps["url"]), clean_message(&caps["msg"])),
        None => {
            let caps = swapped_reference_re().captures(line)?;
            let first = caps["first"].trim();
            if !is_url(first) {
                return None;
            }
            (clean_url(first), clean_message(&caps["second"]))
        }
    };

    if message.is_empty() {
        return None;
    }
    Some(DocKey::new(url, message))
}

fn is_url(text: &str) -> bool {
    text.starts_with("https://") || text.starts_with("http://")
}

fn clean_url(text: &str) -> String {
    text.trim_end_matches(['.', ',', ';', ')', '"', '\''])
        .to_string()
}

fn clean_message(text: &str) -> String {
    text.trim().trim_end_matches(['.', ',', ';']).trim().to_string()
}
