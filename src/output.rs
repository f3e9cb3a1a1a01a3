//! Output sinks: records, JSON, counts, and external commands, plus the
//! field-list and result-slice parsing they share.

pub mod color;
pub mod count;
pub mod exec;
pub mod json;
pub mod record;

pub use color::ColorScheme;
pub use count::CountSink;
pub use exec::{CommandTemplate, ExecRunner, HaltMode};
pub use json::{write_json_array, write_json_lines};
pub use record::RecordWriter;

use crate::error::FfError;
use crate::types::Modifier;

/// One entry of a `-o`/`-S`/`--count` attribute list: a name plus an
/// optional single-letter modifier (`size:h`).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub modifier: Option<Modifier>,
}

impl FieldSpec {
    pub fn parse(input: &str) -> Result<FieldSpec, FfError> {
        let (name, modifier) = match input.split_once(':') {
            Some((name, suffix)) => {
                let mut chars = suffix.chars();
                let (Some(c), None) = (chars.next(), chars.next()) else {
                    return Err(FfError::Usage(format!(
                        "invalid field modifier '{suffix}' in '{input}'"
                    )));
                };
                let modifier = Modifier::from_char(c).ok_or_else(|| {
                    FfError::Usage(format!("unknown field modifier '{c}' in '{input}'"))
                })?;
                (name, Some(modifier))
            }
            None => (input, None),
        };
        if name.is_empty() {
            return Err(FfError::Usage(format!("empty attribute in field list '{input}'")));
        }
        Ok(FieldSpec {
            name: name.to_string(),
            modifier,
        })
    }

    /// Parses a comma-separated field list.
    pub fn parse_list(input: &str) -> Result<Vec<FieldSpec>, FfError> {
        input.split(',').map(FieldSpec::parse).collect()
    }
}

/// Result window `-l`: either a slice `[start]:[stop]` with negative
/// indices counted from the end, or `pagesize,page` (pages start at 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
    },
    Page {
        size: usize,
        page: usize,
    },
}

impl Limit {
    pub fn parse(input: &str) -> Result<Limit, FfError> {
        let bad = || FfError::Usage(format!("invalid limit '{input}'"));
        let trimmed = input.trim();
        if let Some((start, stop)) = trimmed.split_once(':') {
            let parse_end = |s: &str| -> Result<Option<i64>, FfError> {
                if s.is_empty() {
                    Ok(None)
                } else {
                    s.parse().map(Some).map_err(|_| bad())
                }
            };
            return Ok(Limit::Slice {
                start: parse_end(start)?,
                stop: parse_end(stop)?,
            });
        }
        if let Some((size, page)) = trimmed.split_once(',') {
            return Ok(Limit::Page {
                size: size.parse().map_err(|_| bad())?,
                page: page.parse().map_err(|_| bad())?,
            });
        }
        // a bare count is the first N results
        let stop: i64 = trimmed.parse().map_err(|_| bad())?;
        Ok(Limit::Slice {
            start: None,
            stop: Some(stop),
        })
    }

    /// Resolves the window against `len` results, clamping out-of-range
    /// indices. Returns a half-open `(start, stop)` index pair.
    pub fn resolve(&self, len: usize) -> (usize, usize) {
        match *self {
            Limit::Slice { start, stop } => {
                let clamp = |idx: Option<i64>, default: usize| -> usize {
                    match idx {
                        None => default,
                        Some(i) if i < 0 => len.saturating_sub(i.unsigned_abs() as usize),
                        Some(i) => (i as usize).min(len),
                    }
                };
                let start = clamp(start, 0);
                let stop = clamp(stop, len);
                (start, start.max(stop))
            }
            Limit::Page { size, page } => {
                let start = (size * page).min(len);
                let stop = (size * (page + 1)).min(len);
                (start, stop)
            }
        }
    }
}
