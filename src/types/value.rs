//! Core domain types: the tagged `Value` variant, its `ValueKind`
//! metadata, comparison operators, and count policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Filesystem object kinds, as reported by the `file.type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Socket,
    Fifo,
    CharDevice,
    BlockDevice,
}

impl FileKind {
    /// Long name used in output and count tallies.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symlink",
            FileKind::Socket => "socket",
            FileKind::Fifo => "fifo",
            FileKind::CharDevice => "char",
            FileKind::BlockDevice => "block",
        }
    }

    /// Parses a long name or the single-letter shorthand used by `find`.
    pub fn parse(input: &str) -> Option<FileKind> {
        match input {
            "f" | "file" => Some(FileKind::File),
            "d" | "dir" | "directory" => Some(FileKind::Directory),
            "l" | "link" | "symlink" => Some(FileKind::Symlink),
            "s" | "socket" => Some(FileKind::Socket),
            "p" | "fifo" | "pipe" => Some(FileKind::Fifo),
            "c" | "char" => Some(FileKind::CharDevice),
            "b" | "block" => Some(FileKind::BlockDevice),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single attribute value.
///
/// Each variant carries one concrete representation: times are integer
/// seconds since the epoch, durations are seconds, sizes are bytes, and
/// modes keep the low permission bits of `st_mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Path(PathBuf),
    Number(i64),
    Size(u64),
    Time(i64),
    Duration(i64),
    Mode(u32),
    FileType(FileKind),
    Boolean(bool),
    List(Vec<String>),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The kind of a concrete value; `Null` has none.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Text(_) => Some(ValueKind::Text),
            Value::Path(_) => Some(ValueKind::Path),
            Value::Number(_) => Some(ValueKind::Number),
            Value::Size(_) => Some(ValueKind::Size),
            Value::Time(_) => Some(ValueKind::Time),
            Value::Duration(_) => Some(ValueKind::Duration),
            Value::Mode(_) => Some(ValueKind::Mode),
            Value::FileType(_) => Some(ValueKind::FileType),
            Value::Boolean(_) => Some(ValueKind::Boolean),
            Value::List(_) => Some(ValueKind::List),
            Value::Null => None,
        }
    }

    /// JSON-native encoding: integers for the numeric kinds, strings for
    /// text/path/filetype, arrays for lists, null for missing.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Path(p) => serde_json::Value::String(p.to_string_lossy().into_owned()),
            Value::Number(n) => serde_json::Value::from(*n),
            Value::Size(n) => serde_json::Value::from(*n),
            Value::Time(n) => serde_json::Value::from(*n),
            Value::Duration(n) => serde_json::Value::from(*n),
            Value::Mode(n) => serde_json::Value::from(*n),
            Value::FileType(k) => serde_json::Value::String(k.as_str().to_string()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().cloned().map(serde_json::Value::String).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}

/// Comparison operators of the expression language.
///
/// `>`, `<`, `>=`, `<=` are accepted as synonyms for `+`, `-`, `+=`, `-=`
/// at the token level and normalize to the ordering variants here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `=` equality
    Eq,
    /// `+` / `>` strictly greater
    Gt,
    /// `-` / `<` strictly less
    Lt,
    /// `+=` / `>=` greater or equal
    Ge,
    /// `-=` / `<=` less or equal
    Le,
    /// `:` substring / bit-subset / any-element-contains
    Contains,
    /// `~` regex / any-bit / any-element-matches
    Matches,
    /// `%` gitignore-flavored glob
    Glob,
}

impl CmpOp {
    /// Canonical symbol, used in error messages and help output.
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Gt => "+",
            CmpOp::Lt => "-",
            CmpOp::Ge => "+=",
            CmpOp::Le => "-=",
            CmpOp::Contains => ":",
            CmpOp::Matches => "~",
            CmpOp::Glob => "%",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<CmpOp> {
        match symbol {
            "=" => Some(CmpOp::Eq),
            "+" | ">" => Some(CmpOp::Gt),
            "-" | "<" => Some(CmpOp::Lt),
            "+=" | ">=" => Some(CmpOp::Ge),
            "-=" | "<=" => Some(CmpOp::Le),
            ":" => Some(CmpOp::Contains),
            "~" => Some(CmpOp::Matches),
            "%" => Some(CmpOp::Glob),
            _ => None,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// How `--count` accumulates values of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPolicy {
    /// Accumulate a sum (wide-ranging types: size, duration)
    Sum,
    /// Count occurrences of each distinct value
    Tally,
}

const ORDERING_OPS: &[CmpOp] = &[CmpOp::Eq, CmpOp::Gt, CmpOp::Lt, CmpOp::Ge, CmpOp::Le];
const STRING_OPS: &[CmpOp] = &[CmpOp::Eq, CmpOp::Contains, CmpOp::Matches, CmpOp::Glob];
const MODE_OPS: &[CmpOp] = &[CmpOp::Eq, CmpOp::Contains, CmpOp::Matches];
const EQ_ONLY: &[CmpOp] = &[CmpOp::Eq];

/// Type metadata: one entry per `Value` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Path,
    Number,
    Size,
    Time,
    Duration,
    Mode,
    FileType,
    Boolean,
    List,
}

impl ValueKind {
    pub const ALL: &'static [ValueKind] = &[
        ValueKind::Text,
        ValueKind::Path,
        ValueKind::Number,
        ValueKind::Size,
        ValueKind::Time,
        ValueKind::Duration,
        ValueKind::Mode,
        ValueKind::FileType,
        ValueKind::Boolean,
        ValueKind::List,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Text => "string",
            ValueKind::Path => "path",
            ValueKind::Number => "number",
            ValueKind::Size => "size",
            ValueKind::Time => "time",
            ValueKind::Duration => "duration",
            ValueKind::Mode => "mode",
            ValueKind::FileType => "filetype",
            ValueKind::Boolean => "boolean",
            ValueKind::List => "list",
        }
    }

    /// The operator table for this type. An operator outside the table is
    /// a test-definition error.
    pub fn operators(&self) -> &'static [CmpOp] {
        match self {
            ValueKind::Text | ValueKind::Path | ValueKind::List => STRING_OPS,
            ValueKind::Number | ValueKind::Size | ValueKind::Time | ValueKind::Duration => {
                ORDERING_OPS
            }
            ValueKind::Mode => MODE_OPS,
            ValueKind::FileType | ValueKind::Boolean => EQ_ONLY,
        }
    }

    pub fn supports(&self, op: CmpOp) -> bool {
        self.operators().contains(&op)
    }

    /// Count policy; `None` means the type is not countable and `--count`
    /// rejects it.
    pub fn count_policy(&self) -> Option<CountPolicy> {
        match self {
            ValueKind::Size | ValueKind::Duration => Some(CountPolicy::Sum),
            ValueKind::Text
            | ValueKind::Number
            | ValueKind::Mode
            | ValueKind::FileType
            | ValueKind::Boolean
            | ValueKind::List => Some(CountPolicy::Tally),
            ValueKind::Path | ValueKind::Time => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
