//! Output formatting, field modifiers, and sort-key derivation.

use crate::types::value::{Value, ValueKind};
use chrono::{Local, TimeZone};

/// Single-letter field modifiers, written as `attr:m` in `-o` and `-S`
/// lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `h`: human-readable size
    Human,
    /// `x`: hexadecimal
    Hex,
    /// `o`: octal
    Octal,
    /// `n`: keep records whose value for this field is null
    KeepNull,
    /// `v`: natural/version sort key (sort lists only)
    Version,
}

impl Modifier {
    pub fn from_char(c: char) -> Option<Modifier> {
        match c {
            'h' => Some(Modifier::Human),
            'x' => Some(Modifier::Hex),
            'o' => Some(Modifier::Octal),
            'n' => Some(Modifier::KeepNull),
            'v' => Some(Modifier::Version),
            _ => None,
        }
    }

    /// Output modifiers apply in the sink; `v` only affects sort keys.
    pub fn is_output(&self) -> bool {
        !matches!(self, Modifier::Version)
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["", "K", "M", "G", "T", "P"];
    if bytes < 1024 {
        return bytes.to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value < 10.0 {
        format!("{value:.1}{}", UNITS[unit])
    } else {
        format!("{value:.0}{}", UNITS[unit])
    }
}

fn format_duration(mut secs: i64) -> String {
    if secs == 0 {
        return "0s".to_string();
    }
    let negative = secs < 0;
    if negative {
        secs = -secs;
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    for (unit, label) in [(86_400, "d"), (3600, "h"), (60, "m"), (1, "s")] {
        let amount = secs / unit;
        if amount > 0 {
            out.push_str(&format!("{amount}{label}"));
            secs -= amount * unit;
        }
    }
    out
}

fn format_time(epoch: i64) -> String {
    match Local.timestamp_opt(epoch, 0).earliest() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch.to_string(),
    }
}

/// Renders a value for record output. Null renders empty; whether the
/// record is suppressed is the sink's decision.
pub fn format_value(value: &Value, modifier: Option<Modifier>) -> String {
    match (value, modifier) {
        (Value::Null, _) => String::new(),
        (Value::Size(n), Some(Modifier::Human)) => human_size(*n),
        (Value::Size(n), Some(Modifier::Hex)) => format!("{n:x}"),
        (Value::Size(n), Some(Modifier::Octal)) => format!("{n:o}"),
        (Value::Size(n), _) => n.to_string(),
        (Value::Number(n), Some(Modifier::Hex)) => format!("{n:x}"),
        (Value::Number(n), Some(Modifier::Octal)) => format!("{n:o}"),
        (Value::Number(n), _) => n.to_string(),
        (Value::Mode(n), Some(Modifier::Hex)) => format!("{n:x}"),
        (Value::Mode(n), _) => format!("{n:o}"),
        (Value::Time(t), _) => format_time(*t),
        (Value::Duration(d), _) => format_duration(*d),
        (Value::Text(s), _) => s.clone(),
        (Value::Path(p), _) => p.to_string_lossy().into_owned(),
        (Value::FileType(k), _) => k.as_str().to_string(),
        (Value::Boolean(b), _) => b.to_string(),
        (Value::List(items), _) => items.join(","),
    }
}

/// Canonical string used as a tally bucket in `--count`.
pub fn tally_label(value: &Value) -> String {
    format_value(value, None)
}

/// One chunk of a version-sort key: digit runs compare numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionChunk {
    Num(u64),
    Alpha(String),
}

/// Comparable sort key. A given sort column always yields one variant
/// (plus `Null` for missing values, which sort first).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Text(String),
    Version(Vec<VersionChunk>),
}

fn version_chunks(s: &str) -> Vec<VersionChunk> {
    let mut chunks = Vec::new();
    let mut digits = String::new();
    let mut alpha = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            if !alpha.is_empty() {
                chunks.push(VersionChunk::Alpha(std::mem::take(&mut alpha)));
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                chunks.push(VersionChunk::Num(digits.parse().unwrap_or(u64::MAX)));
                digits.clear();
            }
            alpha.push(c);
        }
    }
    if !digits.is_empty() {
        chunks.push(VersionChunk::Num(digits.parse().unwrap_or(u64::MAX)));
    }
    if !alpha.is_empty() {
        chunks.push(VersionChunk::Alpha(alpha));
    }
    chunks
}

/// Derives the sort key for a value; `version` switches text keys to
/// natural ordering (digit runs compare numerically).
pub fn sort_key(value: &Value, version: bool) -> SortKey {
    match value {
        Value::Null => SortKey::Null,
        Value::Boolean(b) => SortKey::Bool(*b),
        Value::Number(n) | Value::Time(n) | Value::Duration(n) => SortKey::Int(*n),
        Value::Size(n) => SortKey::UInt(*n),
        Value::Mode(n) => SortKey::UInt(*n as u64),
        Value::Text(s) => {
            if version {
                SortKey::Version(version_chunks(s))
            } else {
                SortKey::Text(s.clone())
            }
        }
        Value::Path(p) => {
            let s = p.to_string_lossy().into_owned();
            if version {
                SortKey::Version(version_chunks(&s))
            } else {
                SortKey::Text(s)
            }
        }
        Value::FileType(k) => SortKey::Text(k.as_str().to_string()),
        Value::List(items) => SortKey::Text(items.join(",")),
    }
}

/// The default sort/format behavior is shared by every type; this check
/// exists for `--count` validation.
pub fn countable(kind: ValueKind) -> bool {
    kind.count_policy().is_some()
}
