//! Expression AST: tests and boolean connectives.

use crate::types::CmpOp;
use std::fmt;
use std::path::PathBuf;

/// The right-hand side of a test: either a literal (parsed against the
/// attribute's type at binding time) or a file reference
/// `{ref-attr?}path`, which substitutes the referenced file's value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Literal(String),
    FileRef {
        /// Attribute to read from the referenced file; defaults to the
        /// test's own attribute.
        attr: Option<String>,
        path: PathBuf,
    },
}

/// One `attribute op value` atom. Attribute names are resolved against
/// the registry at binding time, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub attr: String,
    pub op: CmpOp,
    pub value: ValueExpr,
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ValueExpr::Literal(s) => write!(f, "{}{}{}", self.attr, self.op, s),
            ValueExpr::FileRef { attr, path } => write!(
                f,
                "{}{}{{{}}}{}",
                self.attr,
                self.op,
                attr.as_deref().unwrap_or(""),
                path.display()
            ),
        }
    }
}

/// Boolean expression tree. `And`/`Or` are n-ary; an empty `And` is the
/// match-everything expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Test(Test),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// The expression produced by an empty token list; matches every
    /// entry.
    pub fn everything() -> Expr {
        Expr::And(Vec::new())
    }

    /// True when the expression has no tests at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::Test(_) => false,
            Expr::And(children) | Expr::Or(children) => children.iter().all(Expr::is_empty),
            Expr::Not(child) => child.is_empty(),
        }
    }

    /// Visits every test in the tree.
    pub fn for_each_test<'a>(&'a self, f: &mut impl FnMut(&'a Test)) {
        match self {
            Expr::Test(test) => f(test),
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.for_each_test(f);
                }
            }
            Expr::Not(child) => child.for_each_test(f),
        }
    }
}
