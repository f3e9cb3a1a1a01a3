//! Plain record output: formatted fields joined by a separator.

use crate::output::color::ColorScheme;
use crate::types::{format_value, Modifier, Value, ValueKind};
use crate::walk::Row;
use std::io::{self, Write};

/// Streams one record per matched entry.
///
/// A record with a null field is suppressed unless `--all` was given or
/// the field carries the `n` modifier.
pub struct RecordWriter<'a, W: Write> {
    out: W,
    sep: String,
    /// `-0`: NUL-terminated records.
    null_terminated: bool,
    all: bool,
    /// Per-column output modifier.
    modifiers: Vec<Option<Modifier>>,
    /// Per-column flag: colorize path-typed values.
    path_columns: Vec<bool>,
    color: Option<&'a ColorScheme>,
}

impl<'a, W: Write> RecordWriter<'a, W> {
    pub fn new(
        out: W,
        sep: String,
        null_terminated: bool,
        all: bool,
        modifiers: Vec<Option<Modifier>>,
        kinds: &[ValueKind],
        color: Option<&'a ColorScheme>,
    ) -> RecordWriter<'a, W> {
        let path_columns = kinds.iter().map(|k| *k == ValueKind::Path).collect();
        RecordWriter {
            out,
            sep,
            null_terminated,
            all,
            modifiers,
            path_columns,
            color,
        }
    }

    fn suppressed(&self, row: &Row) -> bool {
        if self.all {
            return false;
        }
        row.values.iter().enumerate().any(|(i, value)| {
            value.is_null() && self.modifiers.get(i).copied().flatten() != Some(Modifier::KeepNull)
        })
    }

    /// Writes one record; returns whether it was emitted.
    pub fn write_row(&mut self, row: &Row) -> io::Result<bool> {
        if self.suppressed(row) {
            return Ok(false);
        }
        let mut first = true;
        for (i, value) in row.values.iter().enumerate() {
            if !first {
                self.out.write_all(self.sep.as_bytes())?;
            }
            first = false;
            let modifier = self.modifiers.get(i).copied().flatten();
            let text = format_value(value, modifier);
            let painted = match (self.color, self.path_columns.get(i).copied()) {
                (Some(scheme), Some(true)) if !matches!(value, Value::Null) => {
                    scheme.paint(&text, row.hint)
                }
                _ => text,
            };
            self.out.write_all(painted.as_bytes())?;
        }
        self.out
            .write_all(if self.null_terminated { b"\0" } else { b"\n" })?;
        Ok(true)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn row(values: Vec<Value>) -> Row {
        Row {
            path: PathBuf::from("x"),
            values,
            sort_keys: Vec::new(),
            hint: None,
        }
    }

    fn writer_output(
        rows: &[Row],
        all: bool,
        modifiers: Vec<Option<Modifier>>,
        kinds: &[ValueKind],
    ) -> String {
        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(
                &mut buf,
                " ".to_string(),
                false,
                all,
                modifiers,
                kinds,
                None,
            );
            for row in rows {
                writer.write_row(row).unwrap();
            }
        }
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_basic_record() {
        let rows = vec![row(vec![Value::Text("foo".into()), Value::Size(4)])];
        let out = writer_output(
            &rows,
            false,
            vec![None, None],
            &[ValueKind::Text, ValueKind::Size],
        );
        assert_eq!(out, "foo 4\n");
    }

    #[test]
    fn test_modifier_applies() {
        let rows = vec![row(vec![Value::Size(2048)])];
        let out = writer_output(&rows, false, vec![Some(Modifier::Human)], &[ValueKind::Size]);
        assert_eq!(out, "2.0K\n");
    }

    #[test]
    fn test_null_suppression() {
        let rows = vec![
            row(vec![Value::Text("a".into()), Value::Null]),
            row(vec![Value::Text("b".into()), Value::Number(1)]),
        ];
        let out = writer_output(
            &rows,
            false,
            vec![None, None],
            &[ValueKind::Text, ValueKind::Number],
        );
        assert_eq!(out, "b 1\n");
    }

    #[test]
    fn test_all_keeps_null_records() {
        let rows = vec![row(vec![Value::Text("a".into()), Value::Null])];
        let out = writer_output(
            &rows,
            true,
            vec![None, None],
            &[ValueKind::Text, ValueKind::Number],
        );
        assert_eq!(out, "a \n");
    }

    #[test]
    fn test_keep_null_modifier() {
        let rows = vec![row(vec![Value::Text("a".into()), Value::Null])];
        let out = writer_output(
            &rows,
            false,
            vec![None, Some(Modifier::KeepNull)],
            &[ValueKind::Text, ValueKind::Number],
        );
        assert_eq!(out, "a \n");
    }

    #[test]
    fn test_null_separator() {
        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(
                &mut buf,
                " ".to_string(),
                true,
                false,
                vec![None],
                &[ValueKind::Path],
            Option::<&ColorScheme>::None,
            );
            writer
                .write_row(&row(vec![Value::Path(PathBuf::from("a/b"))]))
                .unwrap();
        }
        assert_eq!(buf, b"a/b\0");
    }

    #[test]
    fn test_colorized_path_column() {
        let scheme = ColorScheme::parse("di=01;34");
        let mut buf = Vec::new();
        {
            let mut writer = RecordWriter::new(
                &mut buf,
                " ".to_string(),
                false,
                false,
                vec![None],
                &[ValueKind::Path],
                Some(&scheme),
            );
            let mut r = row(vec![Value::Path(PathBuf::from("dir"))]);
            r.hint = Some((crate::types::FileKind::Directory, false));
            writer.write_row(&r).unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "\x1b[01;34mdir\x1b[0m\n");
    }
}
