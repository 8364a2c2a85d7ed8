//! Template engine: resolves `{{placeholder}}` expressions for external calls.
//!
//! Supported placeholders:
//! - `{{input.<name>}}`: value of a named input in the step's IO mapping (strict)
//! - `{{userLanguage}}`: caller's preferred language, `"en"` when unknown
//! - `{{userLanguages}}`: full language list
//! - `{{now()}}`: ISO-8601 UTC timestamp at resolution time
//! - `{{random()}}`: fresh float in `[0, 1)`
//! - `{{nanoid}}` / `{{nanoid(<seed>)}}`: fresh id, or one id per seed per pass
//!
//! A `TemplateResolver` is one resolution pass: the seeded-nanoid table lives
//! inside it and is dropped with it.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use regex::Regex;
use serde_json::Value;

use crate::error::TemplateError;
use crate::models::io_mapping::SubroutineIoMapping;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is a valid regex")
});

const NANOID_ALPHABET: &[u8] =
    b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";
const NANOID_LEN: usize = 21;

/// Generate a URL-safe 21-character id.
pub fn nanoid() -> String {
    let mut rng = rand::thread_rng();
    (0..NANOID_LEN)
        .map(|_| NANOID_ALPHABET[rng.gen_range(0..NANOID_ALPHABET.len())] as char)
        .collect()
}

/// One template resolution pass over a step's IO mapping.
pub struct TemplateResolver<'a> {
    io_mapping: &'a SubroutineIoMapping,
    user_languages: &'a [String],
    nanoid_seeds: HashMap<String, String>,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(io_mapping: &'a SubroutineIoMapping, user_languages: &'a [String]) -> Self {
        Self {
            io_mapping,
            user_languages,
            nanoid_seeds: HashMap::new(),
        }
    }

    /// Resolve a single placeholder expression (the text between the braces).
    pub fn resolve_placeholder(&mut self, expr: &str) -> Result<Value, TemplateError> {
        let expr = expr.trim();

        if let Some(name) = expr.strip_prefix("input.") {
            return self
                .io_mapping
                .input_value(name)
                .cloned()
                .ok_or_else(|| TemplateError::InputNotFound(name.to_string()));
        }

        match expr {
            "userLanguage" => Ok(Value::String(
                self.user_languages
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "en".to_string()),
            )),
            "userLanguages" => Ok(Value::Array(
                self.user_languages
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            )),
            "now()" => Ok(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            "random()" => Ok(serde_json::json!(rand::random::<f64>())),
            "nanoid" | "nanoid()" => Ok(Value::String(nanoid())),
            _ => match parse_nanoid_seed(expr) {
                Some(seed) => {
                    let id = self
                        .nanoid_seeds
                        .entry(seed.to_string())
                        .or_insert_with(nanoid)
                        .clone();
                    Ok(Value::String(id))
                }
                None => Err(TemplateError::UnknownPlaceholder(expr.to_string())),
            },
        }
    }

    /// Process a string template.
    ///
    /// A template that is exactly one placeholder yields the raw resolved
    /// value; otherwise non-string values are JSON-serialized and spliced.
    pub fn process_string(&mut self, template: &str) -> Result<Value, TemplateError> {
        let trimmed = template.trim();
        if let Some(caps) = PLACEHOLDER_RE.captures(trimmed) {
            let whole = caps.get(0).map(|m| m.len()).unwrap_or(0);
            if whole == trimmed.len() {
                return self.resolve_placeholder(&caps[1]);
            }
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(template) {
            let Some(m) = caps.get(0) else { continue };
            out.push_str(&template[last..m.start()]);
            let value = self.resolve_placeholder(&caps[1])?;
            out.push_str(&splice_text(&value));
            last = m.end();
        }
        out.push_str(&template[last..]);
        Ok(Value::String(out))
    }

    /// Process a string template and always return text.
    pub fn process_to_string(&mut self, template: &str) -> Result<String, TemplateError> {
        self.process_string(template).map(|v| splice_text(&v))
    }

    /// Recursively process every string leaf of a JSON structure.
    pub fn process_value(&mut self, template: &Value) -> Result<Value, TemplateError> {
        match template {
            Value::String(s) => self.process_string(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.process_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    out.insert(key.clone(), self.process_value(value)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

/// One-shot render of a string template.
pub fn render(
    template: &str,
    io_mapping: &SubroutineIoMapping,
    user_languages: &[String],
) -> Result<String, TemplateError> {
    TemplateResolver::new(io_mapping, user_languages).process_to_string(template)
}

fn splice_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `nanoid(<seed>)` → `Some(seed)`; quotes around the seed are stripped.
fn parse_nanoid_seed(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("nanoid(")?.strip_suffix(')')?.trim();
    let inner = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(inner);
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}
