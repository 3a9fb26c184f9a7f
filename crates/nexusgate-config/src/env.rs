use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Failure while substituting `{{ env.VAR }}` placeholders
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// Referenced variable is unset and has no default
    #[error("environment variable not found: `{0}`")]
    MissingVar(String),
    /// Placeholder is not scoped with `env.`
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("static pattern")
    })
}

/// Substitute `{{ env.VAR }}` and `{{ env.VAR | default("x") }}` in raw config text
///
/// Runs before TOML parsing so config structs hold plain strings and secrets.
/// Comment lines are copied verbatim, which lets a commented-out entry mention
/// a variable that is not set.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        if line.trim_start().starts_with('#') || !line.contains("{{") {
            lines.push(line.to_owned());
            continue;
        }
        lines.push(expand_line(line)?);
    }

    Ok(lines.join("\n"))
}

fn expand_line(line: &str) -> Result<String, ExpandError> {
    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;

    for caps in placeholder().captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&line[cursor..whole.start()]);
        out.push_str(&resolve(&caps)?);
        cursor = whole.end();
    }

    out.push_str(&line[cursor..]);
    Ok(out)
}

fn resolve(caps: &Captures<'_>) -> Result<String, ExpandError> {
    let key = caps.get(1).map_or("", |m| m.as_str());
    let fallback = caps.get(2).map(|m| m.as_str());

    let var = match key.split_once('.') {
        Some(("env", name)) if !name.is_empty() && !name.contains('.') => name,
        _ => return Err(ExpandError::UnsupportedScope(key.to_owned())),
    };

    match (std::env::var(var), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(ExpandError::MissingVar(var.to_owned())),
    }
}
