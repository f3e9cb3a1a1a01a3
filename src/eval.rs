//! Expression binding and evaluation.
//!
//! Binding resolves attribute names against the registry, validates
//! operators against the attribute's type, parses literals, and resolves
//! file references. Bound children of each `and`/`or` are reordered by
//! cost so cheap tests run first; this is observationally safe because
//! tests are pure over the context.

use crate::cache::Cache;
use crate::context::{Context, Entry};
use crate::error::{FfError, TypeError};
use crate::expr::{Expr, Test, ValueExpr};
use crate::registry::{AttrId, Registry};
use crate::types::{format_value, parse::parse_value, CmpOp, ParseContext, Value, ValueKind};
use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};

/// Case sensitivity for string operators. `Smart` is case-insensitive
/// iff the literal contains no uppercase character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    Smart,
    Insensitive,
    Sensitive,
}

impl CaseMode {
    fn insensitive_for(&self, literal: &str) -> bool {
        match self {
            CaseMode::Smart => !literal.chars().any(|c| c.is_uppercase()),
            CaseMode::Insensitive => true,
            CaseMode::Sensitive => false,
        }
    }
}

/// Options fixed at binding time.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    pub case: CaseMode,
    pub parse: ParseContext,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            case: CaseMode::Smart,
            parse: ParseContext::default(),
        }
    }
}

/// A gitignore-flavored glob: patterns with `/` anchor at the start of
/// the attribute value (a leading `/` anchors even when the value does
/// not begin with one); patterns without match the base name.
#[derive(Debug)]
struct GlobTest {
    matcher: GlobMatcher,
    anchored: bool,
}

impl GlobTest {
    fn compile(pattern: &str, insensitive: bool) -> Result<GlobTest, TypeError> {
        let anchored = pattern.contains('/');
        let stripped = pattern.strip_prefix('/').unwrap_or(pattern);
        let glob = GlobBuilder::new(stripped)
            .literal_separator(anchored)
            .case_insensitive(insensitive)
            .build()?;
        Ok(GlobTest {
            matcher: glob.compile_matcher(),
            anchored,
        })
    }

    fn is_match(&self, value: &str) -> bool {
        if self.anchored {
            self.matcher.is_match(value.trim_start_matches('/'))
        } else {
            let basename = value.rsplit('/').next().unwrap_or(value);
            self.matcher.is_match(basename)
        }
    }
}

#[derive(Debug)]
struct BoundTest {
    attr: AttrId,
    kind: ValueKind,
    op: CmpOp,
    rhs: Value,
    insensitive: bool,
    regex: Option<Regex>,
    glob: Option<GlobTest>,
    cost: u8,
}

#[derive(Debug)]
enum Bound {
    Test(BoundTest),
    And(Vec<Bound>),
    Or(Vec<Bound>),
    Not(Box<Bound>),
}

impl Bound {
    fn cost(&self) -> u8 {
        match self {
            Bound::Test(test) => test.cost,
            Bound::Not(child) => child.cost(),
            Bound::And(children) | Bound::Or(children) => {
                children.iter().map(Bound::cost).max().unwrap_or(0)
            }
        }
    }
}

/// A bound, immutable expression shared by reference across workers.
#[derive(Debug)]
pub struct Evaluator {
    root: Bound,
    uses_ignore: bool,
}

impl Evaluator {
    /// Binds `expr`, failing on unknown/ambiguous attributes, operators
    /// outside the type's table, bad literals, and unreadable reference
    /// files.
    pub fn bind(
        expr: &Expr,
        registry: &Registry,
        cache: Option<&Cache>,
        opts: &EvalOptions,
    ) -> Result<Evaluator, FfError> {
        let mut uses_ignore = false;
        let root = bind_expr(expr, registry, cache, opts, &mut uses_ignore)?;
        Ok(Evaluator { root, uses_ignore })
    }

    /// Binds the disjunction of standalone exclusion tests.
    pub fn bind_exclusions(
        tests: &[Expr],
        registry: &Registry,
        cache: Option<&Cache>,
        opts: &EvalOptions,
    ) -> Result<Option<Evaluator>, FfError> {
        if tests.is_empty() {
            return Ok(None);
        }
        let expr = Expr::Or(tests.to_vec());
        Ok(Some(Evaluator::bind(&expr, registry, cache, opts)?))
    }

    pub fn matches(&self, ctx: &mut Context) -> bool {
        eval(&self.root, ctx)
    }

    /// Whether any test reads an `ignore.*` attribute; drives ignore
    /// stack maintenance in the walker.
    pub fn uses_ignore(&self) -> bool {
        self.uses_ignore
    }
}

fn bind_expr(
    expr: &Expr,
    registry: &Registry,
    cache: Option<&Cache>,
    opts: &EvalOptions,
    uses_ignore: &mut bool,
) -> Result<Bound, FfError> {
    Ok(match expr {
        Expr::Test(test) => Bound::Test(bind_test(test, registry, cache, opts, uses_ignore)?),
        Expr::Not(child) => Bound::Not(Box::new(bind_expr(
            child, registry, cache, opts, uses_ignore,
        )?)),
        Expr::And(children) => Bound::And(bind_children(
            children, registry, cache, opts, uses_ignore,
        )?),
        Expr::Or(children) => Bound::Or(bind_children(
            children, registry, cache, opts, uses_ignore,
        )?),
    })
}

fn bind_children(
    children: &[Expr],
    registry: &Registry,
    cache: Option<&Cache>,
    opts: &EvalOptions,
    uses_ignore: &mut bool,
) -> Result<Vec<Bound>, FfError> {
    let mut bound = children
        .iter()
        .map(|child| bind_expr(child, registry, cache, opts, uses_ignore))
        .collect::<Result<Vec<_>, _>>()?;
    // cheap tests first; stable, so equal costs keep their order
    bound.sort_by_key(Bound::cost);
    Ok(bound)
}

fn bind_test(
    test: &Test,
    registry: &Registry,
    cache: Option<&Cache>,
    opts: &EvalOptions,
    uses_ignore: &mut bool,
) -> Result<BoundTest, FfError> {
    let attr = registry.resolve(&test.attr)?;
    let def = registry.def(attr);
    let kind = def.kind;
    if !kind.supports(test.op) {
        return Err(TypeError::BadOperator {
            op: test.op.symbol().to_string(),
            kind: kind.name(),
        }
        .into());
    }
    if registry.qualified(attr).starts_with("ignore.") {
        *uses_ignore = true;
    }

    let literal = match &test.value {
        ValueExpr::Literal(raw) => raw.clone(),
        ValueExpr::FileRef { attr: ref_attr, path } => {
            let ref_id = match ref_attr {
                Some(name) => registry.resolve(name)?,
                None => attr,
            };
            let entry = Entry::from_path(path).map_err(|source| FfError::Reference {
                path: path.clone(),
                source,
            })?;
            let mut ctx = Context::new(registry, cache, entry);
            let value = ctx.get(ref_id);
            // re-enter binding with the referenced value as literal
            return bind_resolved(test, attr, kind, def.cost, value, opts);
        }
    };

    let insensitive = opts.case.insensitive_for(&literal);
    let mut regex = None;
    let mut glob = None;
    let rhs = match (test.op, kind) {
        (CmpOp::Matches, ValueKind::Text | ValueKind::Path | ValueKind::List) => {
            regex = Some(
                RegexBuilder::new(&literal)
                    .case_insensitive(insensitive)
                    .build()
                    .map_err(TypeError::BadRegex)?,
            );
            Value::Text(literal)
        }
        (CmpOp::Glob, ValueKind::Text | ValueKind::Path | ValueKind::List) => {
            glob = Some(GlobTest::compile(&literal, insensitive)?);
            Value::Text(literal)
        }
        _ => parse_value(kind, &literal, &opts.parse)?,
    };

    Ok(BoundTest {
        attr,
        kind,
        op: test.op,
        rhs,
        insensitive,
        regex,
        glob,
        cost: def.cost,
    })
}

/// Completes binding for a file-reference test once the referenced value
/// is known.
fn bind_resolved(
    test: &Test,
    attr: AttrId,
    kind: ValueKind,
    cost: u8,
    value: Value,
    opts: &EvalOptions,
) -> Result<BoundTest, FfError> {
    let mut regex = None;
    let mut glob = None;
    let mut insensitive = false;

    match &value {
        Value::Null => {}
        concrete => {
            let rendered = format_value(concrete, None);
            insensitive = opts.case.insensitive_for(&rendered);
            match (test.op, kind) {
                (CmpOp::Matches, ValueKind::Text | ValueKind::Path | ValueKind::List) => {
                    regex = Some(
                        RegexBuilder::new(&rendered)
                            .case_insensitive(insensitive)
                            .build()
                            .map_err(TypeError::BadRegex)?,
                    );
                }
                (CmpOp::Glob, ValueKind::Text | ValueKind::Path | ValueKind::List) => {
                    glob = Some(GlobTest::compile(&rendered, insensitive)?);
                }
                _ => {
                    if concrete.kind() != Some(kind) {
                        return Err(TypeError::BadLiteral {
                            kind: kind.name(),
                            input: rendered,
                            message: format!(
                                "reference value has type {}",
                                concrete
                                    .kind()
                                    .map(|k| k.name())
                                    .unwrap_or("null")
                            ),
                        }
                        .into());
                    }
                }
            }
        }
    }

    Ok(BoundTest {
        attr,
        kind,
        op: test.op,
        rhs: value,
        insensitive,
        regex,
        glob,
        cost,
    })
}

fn eval(bound: &Bound, ctx: &mut Context) -> bool {
    match bound {
        Bound::Test(test) => eval_test(test, ctx),
        Bound::Not(child) => !eval(child, ctx),
        Bound::And(children) => children.iter().all(|child| eval(child, ctx)),
        Bound::Or(children) => children.iter().any(|child| eval(child, ctx)),
    }
}

fn fold(s: &str, insensitive: bool) -> String {
    if insensitive {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

fn eval_test(test: &BoundTest, ctx: &mut Context) -> bool {
    let lhs = ctx.get(test.attr);
    if lhs.is_null() || test.rhs.is_null() {
        // missing compares unequal to everything
        return false;
    }

    match test.kind {
        ValueKind::Text | ValueKind::Path => {
            let value = match &lhs {
                Value::Text(s) => s.clone(),
                Value::Path(p) => p.to_string_lossy().into_owned(),
                _ => return false,
            };
            eval_string_op(test, &value)
        }
        ValueKind::List => {
            let Value::List(items) = &lhs else {
                return false;
            };
            // `=` compares the whole list (literal is the comma-joined
            // form); the other string operators test each element
            if test.op == CmpOp::Eq {
                let Value::Text(rhs) = &test.rhs else {
                    return false;
                };
                let expected: Vec<&str> = rhs.split(',').collect();
                return items.len() == expected.len()
                    && items.iter().zip(&expected).all(|(item, want)| {
                        fold(item, test.insensitive) == fold(want, test.insensitive)
                    });
            }
            items.iter().any(|item| eval_string_op(test, item))
        }
        ValueKind::Number | ValueKind::Time | ValueKind::Duration => {
            let (a, b) = match (&lhs, &test.rhs) {
                (Value::Number(a), Value::Number(b))
                | (Value::Time(a), Value::Time(b))
                | (Value::Duration(a), Value::Duration(b)) => (*a, *b),
                _ => return false,
            };
            eval_ordering(test.op, a.cmp(&b))
        }
        ValueKind::Size => {
            let (Value::Size(a), Value::Size(b)) = (&lhs, &test.rhs) else {
                return false;
            };
            eval_ordering(test.op, a.cmp(b))
        }
        ValueKind::Mode => {
            let (Value::Mode(a), Value::Mode(b)) = (&lhs, &test.rhs) else {
                return false;
            };
            match test.op {
                CmpOp::Eq => a == b,
                CmpOp::Contains => a & b == *b,
                CmpOp::Matches => a & b != 0,
                _ => false,
            }
        }
        ValueKind::FileType | ValueKind::Boolean => lhs == test.rhs,
    }
}

fn eval_string_op(test: &BoundTest, value: &str) -> bool {
    match test.op {
        CmpOp::Eq => {
            let Value::Text(rhs) = &test.rhs else {
                if let Value::Path(p) = &test.rhs {
                    return fold(value, test.insensitive)
                        == fold(&p.to_string_lossy(), test.insensitive);
                }
                return false;
            };
            fold(value, test.insensitive) == fold(rhs, test.insensitive)
        }
        CmpOp::Contains => {
            let rhs = match &test.rhs {
                Value::Text(s) => s.clone(),
                Value::Path(p) => p.to_string_lossy().into_owned(),
                _ => return false,
            };
            fold(value, test.insensitive).contains(&fold(&rhs, test.insensitive))
        }
        CmpOp::Matches => test
            .regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(value)),
        CmpOp::Glob => test.glob.as_ref().is_some_and(|glob| glob.is_match(value)),
        _ => false,
    }
}

fn eval_ordering(op: CmpOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Eq => ordering == Equal,
        CmpOp::Gt => ordering == Greater,
        CmpOp::Lt => ordering == Less,
        CmpOp::Ge => ordering != Less,
        CmpOp::Le => ordering != Greater,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expression, Shorthand};
    use crate::registry::{AttributeDef, Provider};
    use std::fs;
    use tempfile::TempDir;

    fn evaluator(registry: &Registry, tokens: &[&str]) -> Evaluator {
        let tokens: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        Evaluator::bind(&expr, registry, None, &EvalOptions::default()).unwrap()
    }

    fn ctx_for<'a>(registry: &'a Registry, path: &std::path::Path) -> Context<'a> {
        let meta = fs::symlink_metadata(path).ok();
        Context::new(registry, None, Entry::new(path.to_path_buf(), 1, meta))
    }

    #[test]
    fn test_size_ordering() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "1234").unwrap();

        for (tokens, expected) in [
            (vec!["size=4"], true),
            (vec!["size+3"], true),
            (vec!["size+4"], false),
            (vec!["size+=4"], true),
            (vec!["size-=4"], true),
            (vec!["size-4"], false),
        ] {
            let ev = evaluator(&registry, &tokens);
            let mut ctx = ctx_for(&registry, &path);
            assert_eq!(ev.matches(&mut ctx), expected, "{tokens:?}");
        }
    }

    #[test]
    fn test_string_operators() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("Makefile.am");
        fs::write(&path, "").unwrap();

        for (tokens, expected) in [
            (vec!["name=Makefile.am"], true),
            (vec!["name:file"], true),
            (vec!["name:xyz"], false),
            (vec!["name~^Make"], true),
            (vec!["name~file$"], false),
            (vec!["name%Makefile.*"], true),
            (vec!["name%*.am"], true),
            (vec!["name%*.cc"], false),
        ] {
            let ev = evaluator(&registry, &tokens);
            let mut ctx = ctx_for(&registry, &path);
            assert_eq!(ev.matches(&mut ctx), expected, "{tokens:?}");
        }
    }

    #[test]
    fn test_smart_case() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("README");
        fs::write(&path, "").unwrap();

        // lowercase literal matches case-insensitively in smart mode
        let ev = evaluator(&registry, &["name=readme"]);
        let mut ctx = ctx_for(&registry, &path);
        assert!(ev.matches(&mut ctx));

        // an uppercase literal is exact
        let ev = evaluator(&registry, &["name=Readme"]);
        let mut ctx = ctx_for(&registry, &path);
        assert!(!ev.matches(&mut ctx));

        // sensitive mode turns folding off entirely
        let tokens: Vec<String> = vec!["name=readme".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let ev = Evaluator::bind(
            &expr,
            &registry,
            None,
            &EvalOptions {
                case: CaseMode::Sensitive,
                parse: ParseContext::default(),
            },
        )
        .unwrap();
        let mut ctx = ctx_for(&registry, &path);
        assert!(!ev.matches(&mut ctx));
    }

    #[test]
    fn test_boolean_composition() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("foo.txt");
        fs::write(&path, "12345").unwrap();

        for (tokens, expected) in [
            (vec!["type=f", "size+1"], true),
            (vec!["type=d", "or", "size=5"], true),
            (vec!["type=d", "size=5"], false),
            (vec!["not", "type=d"], true),
            (vec!["(", "type=d", "or", "type=f", ")", "ext=txt"], true),
        ] {
            let ev = evaluator(&registry, &tokens);
            let mut ctx = ctx_for(&registry, &path);
            assert_eq!(ev.matches(&mut ctx), expected, "{tokens:?}");
        }
    }

    #[test]
    fn test_missing_attribute_is_false() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();

        // regular files have no symlink target; both the test and its
        // negation see the missing marker
        let ev = evaluator(&registry, &["link=foo"]);
        let mut ctx = ctx_for(&registry, &path);
        assert!(!ev.matches(&mut ctx));

        let ev = evaluator(&registry, &["not", "link=foo"]);
        let mut ctx = ctx_for(&registry, &path);
        assert!(ev.matches(&mut ctx));
    }

    #[test]
    fn test_bad_operator_rejected() {
        let registry = Registry::with_builtins().unwrap();
        let tokens: Vec<String> = vec!["size~4".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let err = Evaluator::bind(&expr, &registry, None, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err, FfError::Type(TypeError::BadOperator { .. })));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let registry = Registry::with_builtins().unwrap();
        let tokens: Vec<String> = vec!["nosuch=1".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let err = Evaluator::bind(&expr, &registry, None, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err, FfError::Attribute(_)));
    }

    #[test]
    fn test_mode_bit_operators() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o640);
        fs::set_permissions(&path, perms).unwrap();

        for (tokens, expected) in [
            (vec!["mode=640"], true),
            (vec!["mode:600"], true),  // subset of bits
            (vec!["mode:602"], false), // other-write not set
            (vec!["mode~u+w"], true),  // any of the bits
            (vec!["mode~o+rwx"], false),
        ] {
            let ev = evaluator(&registry, &tokens);
            let mut ctx = ctx_for(&registry, &path);
            assert_eq!(ev.matches(&mut ctx), expected, "{tokens:?}");
        }
    }

    #[test]
    fn test_file_reference() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let reference = dir.path().join("ref");
        fs::write(&reference, "12345678").unwrap();
        let subject = dir.path().join("subject");
        fs::write(&subject, "12345678").unwrap();

        let token = format!("size={{}}{}", reference.display());
        let tokens: Vec<String> = vec![token];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let ev = Evaluator::bind(&expr, &registry, None, &EvalOptions::default()).unwrap();
        let mut ctx = ctx_for(&registry, &subject);
        assert!(ev.matches(&mut ctx));
    }

    #[test]
    fn test_file_reference_missing_file_is_fatal() {
        let registry = Registry::with_builtins().unwrap();
        let tokens: Vec<String> = vec!["size={}/no/such/file".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let err = Evaluator::bind(&expr, &registry, None, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err, FfError::Reference { .. }));
    }

    #[test]
    fn test_exclusion_disjunction() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let hidden = dir.path().join(".hidden");
        fs::write(&hidden, "").unwrap();

        let tokens: Vec<String> = vec!["hide=yes".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let exclusion =
            Evaluator::bind_exclusions(&[expr], &registry, None, &EvalOptions::default())
                .unwrap()
                .unwrap();
        let mut ctx = ctx_for(&registry, &hidden);
        assert!(exclusion.matches(&mut ctx));
    }

    #[test]
    fn test_uses_ignore_detection() {
        let registry = Registry::with_builtins().unwrap();
        let tokens: Vec<String> = vec!["ignore.ignored=yes".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let ev = Evaluator::bind(&expr, &registry, None, &EvalOptions::default()).unwrap();
        assert!(ev.uses_ignore());

        let tokens: Vec<String> = vec!["size=1".into()];
        let expr = parse_expression(&tokens, &Shorthand::default()).unwrap();
        let ev = Evaluator::bind(&expr, &registry, None, &EvalOptions::default()).unwrap();
        assert!(!ev.uses_ignore());
    }

    struct TagsProvider;

    const TAGS_ATTRS: &[AttributeDef] = &[AttributeDef {
        name: "tags",
        kind: ValueKind::List,
        cost: 1,
        cacheable: false,
        help: "",
    }];

    impl Provider for TagsProvider {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn attributes(&self) -> &'static [AttributeDef] {
            TAGS_ATTRS
        }
        fn process(&self, ctx: &mut Context) {
            ctx.set("tags", Value::List(vec!["alpha".into(), "beta".into()]));
        }
    }

    #[test]
    fn test_list_operators() {
        let dir = TempDir::new().unwrap();
        let mut registry = Registry::with_builtins().unwrap();
        registry.register(Box::new(TagsProvider)).unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "").unwrap();

        for (tokens, expected) in [
            // whole-list equality: value, length, and order all count
            (vec!["fake.tags=alpha,beta"], true),
            (vec!["fake.tags=alpha"], false),
            (vec!["fake.tags=beta,alpha"], false),
            // the other string operators test each element
            (vec!["fake.tags:alph"], true),
            (vec!["fake.tags:gamma"], false),
            (vec!["fake.tags~^bet"], true),
            (vec!["fake.tags%al*"], true),
        ] {
            let ev = evaluator(&registry, &tokens);
            let mut ctx = ctx_for(&registry, &path);
            assert_eq!(ev.matches(&mut ctx), expected, "{tokens:?}");
        }
    }

    #[test]
    fn test_empty_expression_matches_everything() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::with_builtins().unwrap();
        let path = dir.path().join("anything");
        fs::write(&path, "").unwrap();

        let ev = evaluator(&registry, &[]);
        let mut ctx = ctx_for(&registry, &path);
        assert!(ev.matches(&mut ctx));
    }
}
