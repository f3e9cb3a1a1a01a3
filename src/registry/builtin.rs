//! Built-in attribute providers.

use crate::context::Context;
use crate::registry::provider::{AttributeDef, Provider};
use crate::types::{FileKind, Value, ValueKind};
use std::fs;

/// The `file` provider: stat-level attributes. Its names are global and
/// resolve without a prefix.
pub struct FileProvider;

const FILE_ATTRS: &[AttributeDef] = &[
    AttributeDef {
        name: "path",
        kind: ValueKind::Path,
        cost: 0,
        cacheable: false,
        help: "path of the entry as discovered",
    },
    AttributeDef {
        name: "name",
        kind: ValueKind::Text,
        cost: 0,
        cacheable: false,
        help: "base name of the entry",
    },
    AttributeDef {
        name: "dir",
        kind: ValueKind::Path,
        cost: 0,
        cacheable: false,
        help: "directory containing the entry",
    },
    AttributeDef {
        name: "ext",
        kind: ValueKind::Text,
        cost: 0,
        cacheable: false,
        help: "extension without the dot",
    },
    AttributeDef {
        name: "depth",
        kind: ValueKind::Number,
        cost: 0,
        cacheable: false,
        help: "depth below the starting point",
    },
    AttributeDef {
        name: "hide",
        kind: ValueKind::Boolean,
        cost: 0,
        cacheable: false,
        help: "name starts with a dot",
    },
    AttributeDef {
        name: "size",
        kind: ValueKind::Size,
        cost: 1,
        cacheable: false,
        help: "size in bytes; 0 for anything but regular files",
    },
    AttributeDef {
        name: "type",
        kind: ValueKind::FileType,
        cost: 1,
        cacheable: false,
        help: "file type (file, directory, symlink, ...)",
    },
    AttributeDef {
        name: "time",
        kind: ValueKind::Time,
        cost: 1,
        cacheable: false,
        help: "modification time",
    },
    AttributeDef {
        name: "atime",
        kind: ValueKind::Time,
        cost: 1,
        cacheable: false,
        help: "access time",
    },
    AttributeDef {
        name: "ctime",
        kind: ValueKind::Time,
        cost: 1,
        cacheable: false,
        help: "inode change time",
    },
    AttributeDef {
        name: "mode",
        kind: ValueKind::Mode,
        cost: 1,
        cacheable: false,
        help: "permission bits",
    },
    AttributeDef {
        name: "perm",
        kind: ValueKind::Mode,
        cost: 1,
        cacheable: false,
        help: "permission bits (alias of mode)",
    },
    AttributeDef {
        name: "device",
        kind: ValueKind::Number,
        cost: 1,
        cacheable: false,
        help: "device id of the containing filesystem",
    },
    AttributeDef {
        name: "uid",
        kind: ValueKind::Number,
        cost: 1,
        cacheable: false,
        help: "owning user id",
    },
    AttributeDef {
        name: "gid",
        kind: ValueKind::Number,
        cost: 1,
        cacheable: false,
        help: "owning group id",
    },
    AttributeDef {
        name: "nlink",
        kind: ValueKind::Number,
        cost: 1,
        cacheable: false,
        help: "hard link count",
    },
    AttributeDef {
        name: "empty",
        kind: ValueKind::Boolean,
        cost: 2,
        cacheable: false,
        help: "zero-byte file or directory without entries",
    },
    AttributeDef {
        name: "link",
        kind: ValueKind::Path,
        cost: 2,
        cacheable: false,
        help: "symlink target",
    },
];

impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    fn help(&self) -> &'static str {
        "stat-level attributes of each entry"
    }

    fn attributes(&self) -> &'static [AttributeDef] {
        FILE_ATTRS
    }

    fn process(&self, ctx: &mut Context) {
        let (path, name, depth, metadata) = {
            let entry = ctx.entry();
            (
                entry.path.clone(),
                entry.file_name.clone(),
                entry.depth,
                entry.metadata.clone(),
            )
        };

        ctx.set("path", Value::Path(path.clone()));
        ctx.set("name", Value::Text(name.clone()));
        if let Some(parent) = path.parent() {
            ctx.set("dir", Value::Path(parent.to_path_buf()));
        }
        if let Some(ext) = path.extension() {
            ctx.set("ext", Value::Text(ext.to_string_lossy().into_owned()));
        }
        ctx.set("depth", Value::Number(depth as i64));
        ctx.set("hide", Value::Boolean(name.starts_with('.')));

        let Some(meta) = metadata else {
            return;
        };

        use std::os::unix::fs::{FileTypeExt, MetadataExt};
        let file_type = meta.file_type();
        let kind = if file_type.is_file() {
            FileKind::File
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_socket() {
            FileKind::Socket
        } else if file_type.is_fifo() {
            FileKind::Fifo
        } else if file_type.is_char_device() {
            FileKind::CharDevice
        } else {
            FileKind::BlockDevice
        };
        ctx.set("type", Value::FileType(kind));

        // only regular files report a meaningful size
        let size = if kind == FileKind::File { meta.size() } else { 0 };
        ctx.set("size", Value::Size(size));

        ctx.set("time", Value::Time(meta.mtime()));
        ctx.set("atime", Value::Time(meta.atime()));
        ctx.set("ctime", Value::Time(meta.ctime()));
        let mode = meta.mode() & 0o7777;
        ctx.set("mode", Value::Mode(mode));
        ctx.set("perm", Value::Mode(mode));
        ctx.set("device", Value::Number(meta.dev() as i64));
        ctx.set("uid", Value::Number(meta.uid() as i64));
        ctx.set("gid", Value::Number(meta.gid() as i64));
        ctx.set("nlink", Value::Number(meta.nlink() as i64));

        match kind {
            FileKind::File => ctx.set("empty", Value::Boolean(size == 0)),
            FileKind::Directory => {
                if let Ok(mut entries) = fs::read_dir(&path) {
                    ctx.set("empty", Value::Boolean(entries.next().is_none()));
                }
            }
            FileKind::Symlink => {
                if let Ok(target) = fs::read_link(&path) {
                    ctx.set("link", Value::Path(target));
                }
            }
            _ => {}
        }
    }
}

/// The `ignore` provider: the ignore engine's verdict for the entry.
/// Attributes are missing when ignore processing is inactive.
pub struct IgnoreProvider;

const IGNORE_ATTRS: &[AttributeDef] = &[
    AttributeDef {
        name: "ignored",
        kind: ValueKind::Boolean,
        cost: 0,
        cacheable: false,
        help: "entry matches an active ignore rule",
    },
    AttributeDef {
        name: "path",
        kind: ValueKind::Path,
        cost: 0,
        cacheable: false,
        help: "ignore file containing the winning rule",
    },
];

impl Provider for IgnoreProvider {
    fn name(&self) -> &'static str {
        "ignore"
    }

    fn help(&self) -> &'static str {
        "gitignore-style ignore status"
    }

    fn attributes(&self) -> &'static [AttributeDef] {
        IGNORE_ATTRS
    }

    fn process(&self, ctx: &mut Context) {
        let Some(decision) = ctx.entry().ignore.clone() else {
            return;
        };
        ctx.set("ignored", Value::Boolean(decision.ignored));
        if let Some(source) = decision.source {
            ctx.set("path", Value::Path(source));
        }
    }
}

/// The `text` provider: attributes derived from file content. One read
/// feeds every attribute, and the results are cached across runs.
pub struct TextProvider;

const TEXT_ATTRS: &[AttributeDef] = &[
    AttributeDef {
        name: "lines",
        kind: ValueKind::Number,
        cost: 8,
        cacheable: true,
        help: "number of lines (text files only)",
    },
    AttributeDef {
        name: "binary",
        kind: ValueKind::Boolean,
        cost: 8,
        cacheable: true,
        help: "content looks binary",
    },
];

impl Provider for TextProvider {
    fn name(&self) -> &'static str {
        "text"
    }

    fn help(&self) -> &'static str {
        "content-derived attributes of regular files"
    }

    fn attributes(&self) -> &'static [AttributeDef] {
        TEXT_ATTRS
    }

    fn process(&self, ctx: &mut Context) {
        let path = {
            let entry = ctx.entry();
            if !entry.metadata.as_ref().is_some_and(|m| m.is_file()) {
                return;
            }
            entry.path.clone()
        };
        let Ok(content) = fs::read(&path) else {
            return;
        };

        let probe = &content[..content.len().min(8192)];
        let binary = probe.contains(&0);
        ctx.set("binary", Value::Boolean(binary));
        if !binary {
            let lines = content.iter().filter(|&&b| b == b'\n').count() as i64;
            ctx.set("lines", Value::Number(lines));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, Entry, IgnoreDecision};
    use crate::registry::Registry;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ctx_for<'a>(registry: &'a Registry, path: PathBuf, depth: usize) -> Context<'a> {
        let meta = fs::symlink_metadata(&path).ok();
        Context::new(registry, None, Entry::new(path, depth, meta))
    }

    #[test]
    fn test_file_attributes() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();

        let mut ctx = ctx_for(&registry, path.clone(), 2);
        let get = |ctx: &mut Context, name: &str| {
            let id = registry.resolve(name).unwrap();
            ctx.get(id)
        };

        assert_eq!(get(&mut ctx, "name"), Value::Text("notes.txt".into()));
        assert_eq!(get(&mut ctx, "ext"), Value::Text("txt".into()));
        assert_eq!(get(&mut ctx, "size"), Value::Size(5));
        assert_eq!(get(&mut ctx, "type"), Value::FileType(FileKind::File));
        assert_eq!(get(&mut ctx, "depth"), Value::Number(2));
        assert_eq!(get(&mut ctx, "hide"), Value::Boolean(false));
        assert_eq!(get(&mut ctx, "empty"), Value::Boolean(false));
        assert_eq!(get(&mut ctx, "link"), Value::Null);
    }

    #[test]
    fn test_directory_size_is_zero() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let mut ctx = ctx_for(&registry, sub, 1);
        let size_id = registry.resolve("size").unwrap();
        let type_id = registry.resolve("type").unwrap();
        let empty_id = registry.resolve("empty").unwrap();
        assert_eq!(ctx.get(size_id), Value::Size(0));
        assert_eq!(ctx.get(type_id), Value::FileType(FileKind::Directory));
        assert_eq!(ctx.get(empty_id), Value::Boolean(true));
    }

    #[test]
    fn test_symlink_attributes() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let target = dir.path().join("target");
        fs::write(&target, "data").unwrap();
        let link = dir.path().join("link");
        symlink(&target, &link).unwrap();

        let mut ctx = ctx_for(&registry, link, 1);
        let type_id = registry.resolve("type").unwrap();
        let size_id = registry.resolve("size").unwrap();
        let link_id = registry.resolve("link").unwrap();
        assert_eq!(ctx.get(type_id), Value::FileType(FileKind::Symlink));
        assert_eq!(ctx.get(size_id), Value::Size(0));
        assert_eq!(ctx.get(link_id), Value::Path(target));
    }

    #[test]
    fn test_hidden_attribute() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join(".hidden");
        fs::write(&path, "").unwrap();

        let mut ctx = ctx_for(&registry, path, 1);
        let hide_id = registry.resolve("hide").unwrap();
        assert_eq!(ctx.get(hide_id), Value::Boolean(true));
    }

    #[test]
    fn test_ignore_provider_inactive() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();

        let mut ctx = ctx_for(&registry, path, 1);
        let id = registry.resolve("ignore.ignored").unwrap();
        assert_eq!(ctx.get(id), Value::Null);
    }

    #[test]
    fn test_ignore_provider_with_decision() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();

        let meta = fs::symlink_metadata(&path).ok();
        let mut entry = Entry::new(path, 1, meta);
        entry.ignore = Some(IgnoreDecision {
            ignored: true,
            source: Some(PathBuf::from(".gitignore")),
        });
        let mut ctx = Context::new(&registry, None, entry);

        let ignored_id = registry.resolve("ignore.ignored").unwrap();
        let source_id = registry.resolve("ignore.path").unwrap();
        assert_eq!(ctx.get(ignored_id), Value::Boolean(true));
        assert_eq!(ctx.get(source_id), Value::Path(PathBuf::from(".gitignore")));
    }

    #[test]
    fn test_text_provider_lines_and_binary() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();

        let text = dir.path().join("a.txt");
        fs::write(&text, "one\ntwo\n").unwrap();
        let mut ctx = ctx_for(&registry, text, 1);
        let lines_id = registry.resolve("text.lines").unwrap();
        let binary_id = registry.resolve("text.binary").unwrap();
        assert_eq!(ctx.get(lines_id), Value::Number(2));
        assert_eq!(ctx.get(binary_id), Value::Boolean(false));

        let bin = dir.path().join("a.bin");
        fs::write(&bin, b"\x00\x01\x02").unwrap();
        let mut ctx = ctx_for(&registry, bin, 1);
        assert_eq!(ctx.get(binary_id), Value::Boolean(true));
        assert_eq!(ctx.get(lines_id), Value::Null);
    }

    #[test]
    fn test_text_provider_skips_directories() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let mut ctx = ctx_for(&registry, sub, 1);
        let lines_id = registry.resolve("text.lines").unwrap();
        assert_eq!(ctx.get(lines_id), Value::Null);
    }
}
