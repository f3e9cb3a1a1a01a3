//! `dircolors`-style path colorization driven by `LS_COLORS`.

use crate::types::FileKind;
use std::collections::HashMap;

/// Parsed `LS_COLORS` rules: per-type SGR codes plus suffix rules.
pub struct ColorScheme {
    types: HashMap<String, String>,
    suffixes: Vec<(String, String)>,
}

impl ColorScheme {
    /// The GNU default palette, used when `LS_COLORS` is absent.
    pub fn default_scheme() -> ColorScheme {
        ColorScheme::parse("di=01;34:ln=01;36:ex=01;32:so=01;35:pi=33:bd=01;33:cd=01;33")
    }

    pub fn from_env() -> ColorScheme {
        match std::env::var("LS_COLORS") {
            Ok(value) if !value.is_empty() => ColorScheme::parse(&value),
            _ => ColorScheme::default_scheme(),
        }
    }

    pub fn parse(input: &str) -> ColorScheme {
        let mut types = HashMap::new();
        let mut suffixes = Vec::new();
        for rule in input.split(':') {
            let Some((key, sgr)) = rule.split_once('=') else {
                continue;
            };
            if sgr.is_empty() {
                continue;
            }
            if let Some(pattern) = key.strip_prefix('*') {
                suffixes.push((pattern.to_string(), sgr.to_string()));
            } else {
                types.insert(key.to_string(), sgr.to_string());
            }
        }
        ColorScheme { types, suffixes }
    }

    fn code_for(&self, text: &str, hint: Option<(FileKind, bool)>) -> Option<&str> {
        if let Some((kind, executable)) = hint {
            let key = match kind {
                FileKind::Directory => "di",
                FileKind::Symlink => "ln",
                FileKind::Socket => "so",
                FileKind::Fifo => "pi",
                FileKind::BlockDevice => "bd",
                FileKind::CharDevice => "cd",
                FileKind::File => {
                    if executable {
                        "ex"
                    } else {
                        ""
                    }
                }
            };
            if !key.is_empty() {
                if let Some(sgr) = self.types.get(key) {
                    return Some(sgr);
                }
            }
        }
        let basename = text.rsplit('/').next().unwrap_or(text);
        self.suffixes
            .iter()
            .find(|(suffix, _)| basename.ends_with(suffix.as_str()))
            .map(|(_, sgr)| sgr.as_str())
    }

    /// Wraps `text` in the selected SGR sequence, or returns it
    /// unchanged when no rule applies.
    pub fn paint(&self, text: &str, hint: Option<(FileKind, bool)>) -> String {
        match self.code_for(text, hint) {
            Some(sgr) => format!("\x1b[{sgr}m{text}\x1b[0m"),
            None => text.to_string(),
        }
    }
}
