//! Literal parsing: user strings to typed values.

use crate::error::TypeError;
use crate::types::value::{FileKind, Value, ValueKind};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Flags that influence literal parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseContext {
    /// `--si`: bare size suffixes (K, M, ...) mean powers of 1000 instead
    /// of 1024.
    pub si: bool,
}

fn bad(kind: ValueKind, input: &str, message: impl Into<String>) -> TypeError {
    TypeError::BadLiteral {
        kind: kind.name(),
        input: input.to_string(),
        message: message.into(),
    }
}

/// Parses `input` as a literal of the given kind.
///
/// For list attributes the right-hand side parses as text: `=` reads it
/// as the comma-joined list, the other string operators as a single
/// element candidate.
pub fn parse_value(kind: ValueKind, input: &str, ctx: &ParseContext) -> Result<Value, TypeError> {
    match kind {
        ValueKind::Text | ValueKind::List => Ok(Value::Text(input.to_string())),
        ValueKind::Path => Ok(Value::Path(PathBuf::from(input))),
        ValueKind::Number => input
            .parse::<i64>()
            .map(Value::Number)
            .map_err(|e| bad(kind, input, e.to_string())),
        ValueKind::Size => parse_size(input, ctx.si).map(Value::Size),
        ValueKind::Time => parse_time(input).map(Value::Time),
        ValueKind::Duration => parse_duration(input).map(Value::Duration),
        ValueKind::Mode => parse_mode(input).map(Value::Mode),
        ValueKind::FileType => FileKind::parse(input)
            .map(Value::FileType)
            .ok_or_else(|| bad(kind, input, "expected one of f, d, l, s, p, c, b")),
        ValueKind::Boolean => parse_bool(input).map(Value::Boolean),
    }
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*([kmgtp]?)(i?)(b?)$").unwrap())
}

/// `<number>[K|M|G|T|P][i?][B?]`. A bare letter or an `iB` suffix is base
/// 1024; a plain `B` suffix is base 1000; `si` swaps the bare-letter
/// default to 1000.
pub fn parse_size(input: &str, si: bool) -> Result<u64, TypeError> {
    let caps = size_re()
        .captures(input.trim())
        .ok_or_else(|| bad(ValueKind::Size, input, "expected <number>[K|M|G|T|P][i][B]"))?;

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| bad(ValueKind::Size, input, "bad number"))?;
    let exponent = match caps[2].to_ascii_lowercase().as_str() {
        "" => 0,
        "k" => 1,
        "m" => 2,
        "g" => 3,
        "t" => 4,
        "p" => 5,
        _ => unreachable!(),
    };
    let has_i = !caps[3].is_empty();
    let has_b = !caps[4].is_empty();

    if has_i && exponent == 0 {
        return Err(bad(ValueKind::Size, input, "'i' needs a unit letter"));
    }

    let base: f64 = if has_i {
        1024.0
    } else if has_b && exponent > 0 {
        1000.0
    } else if si {
        1000.0
    } else {
        1024.0
    };

    let bytes = number * base.powi(exponent);
    if bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(bad(ValueKind::Size, input, "size out of range"));
    }
    Ok(bytes as u64)
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([smhdwMy])").unwrap())
}

/// Sums `NN(s|m|h|d|w|M|y)` parts; a bare number means minutes.
pub fn parse_duration(input: &str) -> Result<i64, TypeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(bad(ValueKind::Duration, input, "empty duration"));
    }
    if let Ok(minutes) = trimmed.parse::<i64>() {
        return Ok(minutes * 60);
    }

    let mut rest = trimmed;
    let mut total: i64 = 0;
    while !rest.is_empty() {
        let caps = duration_re()
            .captures(rest)
            .ok_or_else(|| bad(ValueKind::Duration, input, "expected NN[smhdwMy] parts"))?;
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| bad(ValueKind::Duration, input, "bad number"))?;
        let unit: i64 = match &caps[2] {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 86_400,
            "w" => 7 * 86_400,
            "M" => 30 * 86_400,
            "y" => 365 * 86_400,
            _ => unreachable!(),
        };
        total = total
            .checked_add(amount.checked_mul(unit).ok_or_else(|| {
                bad(ValueKind::Duration, input, "duration out of range")
            })?)
            .ok_or_else(|| bad(ValueKind::Duration, input, "duration out of range"))?;
        rest = &rest[caps[0].len()..];
    }
    Ok(total)
}

fn local_epoch(ndt: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&ndt)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Accepts a fixed set of timestamp patterns, local-time interpreted, or
/// a bare epoch integer as a last resort.
pub fn parse_time(input: &str) -> Result<i64, TypeError> {
    let trimmed = input.trim();

    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y%m%d%H%M%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return local_epoch(ndt).ok_or_else(|| bad(ValueKind::Time, input, "nonexistent local time"));
        }
    }
    for pattern in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, pattern) {
            let ndt = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
            return local_epoch(ndt).ok_or_else(|| bad(ValueKind::Time, input, "nonexistent local time"));
        }
    }
    for pattern in ["%H:%M:%S", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(trimmed, pattern) {
            let ndt = Local::now().date_naive().and_time(time);
            return local_epoch(ndt).ok_or_else(|| bad(ValueKind::Time, input, "nonexistent local time"));
        }
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| bad(ValueKind::Time, input, "unrecognized timestamp"))
}

/// `{true,t,1,yes,y,on}` vs `{false,f,0,no,n,off}`, case-insensitive.
pub fn parse_bool(input: &str) -> Result<bool, TypeError> {
    match input.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Ok(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Ok(false),
        _ => Err(bad(ValueKind::Boolean, input, "expected true/false")),
    }
}

/// Octal or POSIX `find -perm` symbolic mode, applied against a zero base.
pub fn parse_mode(input: &str) -> Result<u32, TypeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(bad(ValueKind::Mode, input, "empty mode"));
    }
    if trimmed.chars().all(|c| ('0'..='7').contains(&c)) {
        return u32::from_str_radix(trimmed, 8)
            .map_err(|e| bad(ValueKind::Mode, input, e.to_string()));
    }

    let mut mode: u32 = 0;
    for clause in trimmed.split(',') {
        mode = apply_symbolic_clause(mode, clause)
            .ok_or_else(|| bad(ValueKind::Mode, input, format!("bad clause '{clause}'")))?;
    }
    Ok(mode)
}

/// One `[ugoa]*[+-=][rwxXst]*` clause. An empty who-list means `a`.
/// `X` is conditional execute and contributes nothing on a zero base,
/// matching `find -perm`.
fn apply_symbolic_clause(mode: u32, clause: &str) -> Option<u32> {
    let op_pos = clause.find(['+', '-', '='])?;
    let (who, rest) = clause.split_at(op_pos);
    let op = rest.chars().next()?;
    let perms = &rest[1..];

    let mut classes = 0u32; // bitmask: 4=user, 2=group, 1=other
    for c in who.chars() {
        match c {
            'u' => classes |= 4,
            'g' => classes |= 2,
            'o' => classes |= 1,
            'a' => classes |= 7,
            _ => return None,
        }
    }
    if classes == 0 {
        classes = 7;
    }

    let mut bits = 0u32;
    for p in perms.chars() {
        match p {
            'r' => {
                if classes & 4 != 0 {
                    bits |= 0o400;
                }
                if classes & 2 != 0 {
                    bits |= 0o040;
                }
                if classes & 1 != 0 {
                    bits |= 0o004;
                }
            }
            'w' => {
                if classes & 4 != 0 {
                    bits |= 0o200;
                }
                if classes & 2 != 0 {
                    bits |= 0o020;
                }
                if classes & 1 != 0 {
                    bits |= 0o002;
                }
            }
            'x' => {
                if classes & 4 != 0 {
                    bits |= 0o100;
                }
                if classes & 2 != 0 {
                    bits |= 0o010;
                }
                if classes & 1 != 0 {
                    bits |= 0o001;
                }
            }
            'X' => {} // inert on a zero base
            's' => {
                if classes & 4 != 0 {
                    bits |= 0o4000;
                }
                if classes & 2 != 0 {
                    bits |= 0o2000;
                }
            }
            't' => bits |= 0o1000,
            _ => return None,
        }
    }

    let class_mask = {
        let mut m = 0u32;
        if classes & 4 != 0 {
            m |= 0o4700;
        }
        if classes & 2 != 0 {
            m |= 0o2070;
        }
        if classes & 1 != 0 {
            m |= 0o1007;
        }
        m
    };

    Some(match op {
        '+' => mode | bits,
        '-' => mode & !bits,
        '=' => (mode & !class_mask) | bits,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SI: ParseContext = ParseContext { si: false };
    const SI: ParseContext = ParseContext { si: true };

    #[test]
    fn test_parse_size_bases() {
        assert_eq!(parse_size("4", false).unwrap(), 4);
        assert_eq!(parse_size("1K", false).unwrap(), 1024);
        assert_eq!(parse_size("1KiB", false).unwrap(), 1024);
        assert_eq!(parse_size("1KB", false).unwrap(), 1000);
        assert_eq!(parse_size("1K", true).unwrap(), 1000);
        assert_eq!(parse_size("1KiB", true).unwrap(), 1024);
        assert_eq!(parse_size("2M", false).unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1.5K", false).unwrap(), 1536);
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("", false).is_err());
        assert!(parse_size("abc", false).is_err());
        assert!(parse_size("1iB", false).is_err());
        assert!(parse_size("-3", false).is_err());
    }

    #[test]
    fn test_parse_size_via_kind() {
        assert_eq!(
            parse_value(ValueKind::Size, "10", &NO_SI).unwrap(),
            Value::Size(10)
        );
        assert_eq!(
            parse_value(ValueKind::Size, "1k", &SI).unwrap(),
            Value::Size(1000)
        );
    }

    #[test]
    fn test_parse_duration_parts() {
        assert_eq!(parse_duration("90s").unwrap(), 90);
        assert_eq!(parse_duration("2m").unwrap(), 120);
        assert_eq!(parse_duration("1h30m").unwrap(), 5400);
        assert_eq!(parse_duration("1d").unwrap(), 86_400);
        assert_eq!(parse_duration("1w").unwrap(), 7 * 86_400);
        assert_eq!(parse_duration("1M").unwrap(), 30 * 86_400);
        assert_eq!(parse_duration("1y").unwrap(), 365 * 86_400);
        // bare number means minutes
        assert_eq!(parse_duration("5").unwrap(), 300);
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5q").is_err());
        assert!(parse_duration("1h30").is_err());
    }

    #[test]
    fn test_parse_time_epoch_fallback() {
        assert_eq!(parse_time("1700000000").unwrap(), 1_700_000_000);
        assert!(parse_time("not a time").is_err());
    }

    #[test]
    fn test_parse_time_patterns_accepted() {
        assert!(parse_time("2024-05-01 12:30:00").is_ok());
        assert!(parse_time("2024-05-01 12:30").is_ok());
        assert!(parse_time("2024-05-01").is_ok());
        assert!(parse_time("20240501").is_ok());
        assert!(parse_time("20240501123000").is_ok());
        assert!(parse_time("12:30").is_ok());
        assert!(parse_time("12:30:45").is_ok());
    }

    #[test]
    fn test_parse_time_date_ordering() {
        let early = parse_time("2024-05-01").unwrap();
        let later = parse_time("2024-05-01 00:00:30").unwrap();
        assert_eq!(later - early, 30);
    }

    #[test]
    fn test_parse_bool_variants() {
        for s in ["true", "T", "1", "yes", "Y", "on", "ON"] {
            assert_eq!(parse_bool(s).unwrap(), true, "{s}");
        }
        for s in ["false", "F", "0", "no", "N", "off"] {
            assert_eq!(parse_bool(s).unwrap(), false, "{s}");
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_parse_mode_octal() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_mode("7777").unwrap(), 0o7777);
    }

    #[test]
    fn test_parse_mode_symbolic() {
        assert_eq!(parse_mode("u+rwx").unwrap(), 0o700);
        assert_eq!(parse_mode("a+r").unwrap(), 0o444);
        assert_eq!(parse_mode("+r").unwrap(), 0o444);
        assert_eq!(parse_mode("u=rw,go=r").unwrap(), 0o644);
        assert_eq!(parse_mode("u+s").unwrap(), 0o4000);
        assert_eq!(parse_mode("+t").unwrap(), 0o1000);
        // X grants nothing against a zero base
        assert_eq!(parse_mode("a+X").unwrap(), 0);
    }

    #[test]
    fn test_parse_mode_errors() {
        assert!(parse_mode("").is_err());
        assert!(parse_mode("u*r").is_err());
        assert!(parse_mode("z+r").is_err());
        assert!(parse_mode("8").is_err());
    }

    #[test]
    fn test_parse_filetype() {
        assert_eq!(
            parse_value(ValueKind::FileType, "f", &NO_SI).unwrap(),
            Value::FileType(FileKind::File)
        );
        assert!(parse_value(ValueKind::FileType, "q", &NO_SI).is_err());
    }
}
