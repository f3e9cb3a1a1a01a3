//! Gitignore-style ignore engine.
//!
//! Rule sets are compiled per ignore file and stacked as traversal
//! descends; each directory task carries an immutable snapshot of the
//! stack, so pushes never disturb sibling subtrees. Matching walks the
//! stack deepest-first, which gives later rules precedence per gitignore
//! semantics, and reports the ignore file containing the winning rule.

use crate::context::IgnoreDecision;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Compiled rules from one ignore file, rooted at its directory.
pub struct IgnoreRules {
    source: PathBuf,
    matcher: Gitignore,
}

impl IgnoreRules {
    /// Compiles the rules in `file`. Returns `None` when the file cannot
    /// be read or contains no usable rules.
    pub fn load(file: &Path) -> Option<IgnoreRules> {
        let root = file.parent()?;
        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(file) {
            debug!("ignore file {}: {err}", file.display());
            return None;
        }
        match builder.build() {
            Ok(matcher) if matcher.num_ignores() + matcher.num_whitelists() > 0 => {
                Some(IgnoreRules {
                    source: file.to_path_buf(),
                    matcher,
                })
            }
            Ok(_) => None,
            Err(err) => {
                debug!("ignore file {}: {err}", file.display());
                None
            }
        }
    }

    /// Builds rules from literal pattern lines, rooted at `root`.
    pub fn from_lines<'a>(
        root: &Path,
        source: PathBuf,
        lines: impl IntoIterator<Item = &'a str>,
    ) -> Option<IgnoreRules> {
        let mut builder = GitignoreBuilder::new(root);
        for line in lines {
            if let Err(err) = builder.add_line(None, line) {
                debug!("ignore pattern '{line}': {err}");
            }
        }
        builder.build().ok().map(|matcher| IgnoreRules {
            source,
            matcher,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

struct Frame {
    rules: IgnoreRules,
    parent: IgnoreStack,
}

/// Immutable stack of rule sets; cloning is cheap and pushing returns a
/// new stack sharing the ancestor frames.
#[derive(Clone, Default)]
pub struct IgnoreStack(Option<Arc<Frame>>);

impl IgnoreStack {
    pub fn empty() -> IgnoreStack {
        IgnoreStack(None)
    }

    pub fn push(&self, rules: IgnoreRules) -> IgnoreStack {
        IgnoreStack(Some(Arc::new(Frame {
            rules,
            parent: self.clone(),
        })))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Decides whether `(path, is_dir)` is ignored. Deeper rule sets are
    /// consulted first and the first set with an opinion wins.
    pub fn decide(&self, path: &Path, is_dir: bool) -> IgnoreDecision {
        let mut frame = &self.0;
        while let Some(current) = frame {
            let matched = current.rules.matcher.matched(path, is_dir);
            if matched.is_ignore() {
                return IgnoreDecision {
                    ignored: true,
                    source: Some(current.rules.source.clone()),
                };
            }
            if matched.is_whitelist() {
                return IgnoreDecision {
                    ignored: false,
                    source: Some(current.rules.source.clone()),
                };
            }
            frame = &current.parent.0;
        }
        IgnoreDecision {
            ignored: false,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rules(root: &Path, lines: &[&str]) -> IgnoreRules {
        IgnoreRules::from_lines(root, root.join(".gitignore"), lines.iter().copied()).unwrap()
    }

    #[test]
    fn test_basic_patterns() {
        let dir = TempDir::new().unwrap();
        let stack = IgnoreStack::empty().push(rules(dir.path(), &["*.log", "build/"]));

        let decision = stack.decide(&dir.path().join("debug.log"), false);
        assert!(decision.ignored);
        assert_eq!(decision.source, Some(dir.path().join(".gitignore")));

        assert!(!stack.decide(&dir.path().join("debug.txt"), false).ignored);

        // directory-only marker
        assert!(stack.decide(&dir.path().join("build"), true).ignored);
        assert!(!stack.decide(&dir.path().join("build"), false).ignored);
    }

    #[test]
    fn test_negation() {
        let dir = TempDir::new().unwrap();
        let stack = IgnoreStack::empty().push(rules(dir.path(), &["*.log", "!keep.log"]));

        assert!(stack.decide(&dir.path().join("other.log"), false).ignored);
        let keep = stack.decide(&dir.path().join("keep.log"), false);
        assert!(!keep.ignored);
        assert!(keep.source.is_some());
    }

    #[test]
    fn test_leading_slash_anchors() {
        let dir = TempDir::new().unwrap();
        let stack = IgnoreStack::empty().push(rules(dir.path(), &["/top.txt"]));

        assert!(stack.decide(&dir.path().join("top.txt"), false).ignored);
        assert!(
            !stack
                .decide(&dir.path().join("sub/top.txt"), false)
                .ignored
        );
    }

    #[test]
    fn test_deeper_rules_override() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let stack = IgnoreStack::empty()
            .push(rules(dir.path(), &["*.log"]))
            .push(IgnoreRules::from_lines(&sub, sub.join(".gitignore"), ["!special.log"]).unwrap());

        assert!(stack.decide(&sub.join("normal.log"), false).ignored);
        let special = stack.decide(&sub.join("special.log"), false);
        assert!(!special.ignored);
        assert_eq!(special.source, Some(sub.join(".gitignore")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join(".ffignore");
        fs::write(&file, "secret/\n*.tmp\n").unwrap();

        let rules = IgnoreRules::load(&file).unwrap();
        assert_eq!(rules.source(), file.as_path());
        let stack = IgnoreStack::empty().push(rules);
        assert!(stack.decide(&dir.path().join("a.tmp"), false).ignored);
        assert!(stack.decide(&dir.path().join("secret"), true).ignored);
    }

    #[test]
    fn test_load_missing_or_empty_file() {
        let dir = TempDir::new().unwrap();
        assert!(IgnoreRules::load(&dir.path().join("absent")).is_none());

        let empty = dir.path().join(".gitignore");
        fs::write(&empty, "# comments only\n\n").unwrap();
        assert!(IgnoreRules::load(&empty).is_none());
    }

    #[test]
    fn test_empty_stack_never_ignores() {
        let decision = IgnoreStack::empty().decide(Path::new("anything"), false);
        assert!(!decision.ignored);
        assert!(decision.source.is_none());
    }
}
