//! Parses the CLI-provided token sequence into an expression tree.
//!
//! Precedence is `not` > `and` > `or`, with implicit conjunction between
//! adjacent tests. `(` `)` group, as do the aliases `{{` `}}`.

use crate::error::ExprError;
use crate::expr::ast::{Expr, Test, ValueExpr};
use crate::types::CmpOp;
use std::path::PathBuf;

/// Rewrite rule for bare tokens with no operator: `<regex>` becomes
/// `file.name~<regex>` by default, but the calling layer may request a
/// different attribute or operator.
#[derive(Debug, Clone)]
pub struct Shorthand {
    pub attr: String,
    pub op: CmpOp,
}

impl Default for Shorthand {
    fn default() -> Self {
        Shorthand {
            attr: "file.name".to_string(),
            op: CmpOp::Matches,
        }
    }
}

/// Operator tokens, longest first so `+=` wins over `+`.
const OPERATORS: &[&str] = &[
    "+=", "-=", ">=", "<=", "=", "+", "-", ">", "<", ":", "~", "%",
];

fn is_attr_name(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut segments = s.split('.');
    let count = s.split('.').count();
    if count > 2 {
        return false;
    }
    segments.all(|seg| {
        !seg.is_empty()
            && seg.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Splits `token` at the first operator whose prefix is a plausible
/// attribute name. Returns `(attr, op, value)`.
fn split_test(token: &str) -> Option<(&str, CmpOp, &str)> {
    for (i, _) in token.char_indices() {
        for op_str in OPERATORS {
            if token[i..].starts_with(op_str) {
                let attr = &token[..i];
                if is_attr_name(attr) {
                    let op = CmpOp::from_symbol(op_str).expect("operator table is exhaustive");
                    return Some((attr, op, &token[i + op_str.len()..]));
                }
                // Prefix is not an attribute name; the token is a
                // shorthand pattern that happens to contain an operator
                // character.
                return None;
            }
        }
    }
    None
}

fn parse_value_expr(raw: &str) -> ValueExpr {
    if let Some(rest) = raw.strip_prefix('{') {
        if let Some(close) = rest.find('}') {
            let attr = &rest[..close];
            let path = &rest[close + 1..];
            if !path.is_empty() && (attr.is_empty() || is_attr_name(attr)) {
                return ValueExpr::FileRef {
                    attr: if attr.is_empty() {
                        None
                    } else {
                        Some(attr.to_string())
                    },
                    path: PathBuf::from(path),
                };
            }
        }
    }
    ValueExpr::Literal(raw.to_string())
}

/// Parses a single test token, applying the shorthand rewrite when the
/// token carries no operator.
pub fn parse_test(token: &str, shorthand: &Shorthand) -> Result<Test, ExprError> {
    match split_test(token) {
        Some((attr, op, value)) => Ok(Test {
            attr: attr.to_string(),
            op,
            value: parse_value_expr(value),
        }),
        None => {
            if token.is_empty() {
                return Err(ExprError::EmptyAttribute(token.to_string()));
            }
            Ok(Test {
                attr: shorthand.attr.clone(),
                op: shorthand.op,
                value: ValueExpr::Literal(token.to_string()),
            })
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open,
    Close,
    And,
    Or,
    Not,
    Test(&'a str),
}

fn classify(raw: &str) -> Token<'_> {
    match raw {
        "(" | "{{" => Token::Open,
        ")" | "}}" => Token::Close,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        other => Token::Test(other),
    }
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    shorthand: &'a Shorthand,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token<'a>> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut children = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            if self.peek().is_none() || matches!(self.peek(), Some(Token::Close)) {
                return Err(ExprError::DanglingKeyword("or"));
            }
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.pop().expect("one child")
        } else {
            Expr::Or(children)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut children = vec![self.parse_not()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.advance();
                    if self.peek().is_none() || matches!(self.peek(), Some(Token::Close)) {
                        return Err(ExprError::DanglingKeyword("and"));
                    }
                    children.push(self.parse_not()?);
                }
                // implicit conjunction between adjacent terms
                Some(Token::Not) | Some(Token::Open) | Some(Token::Test(_)) => {
                    children.push(self.parse_not()?);
                }
                _ => break,
            }
        }
        Ok(if children.len() == 1 {
            children.pop().expect("one child")
        } else {
            Expr::And(children)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            if self.peek().is_none() || matches!(self.peek(), Some(Token::Close)) {
                return Err(ExprError::DanglingKeyword("not"));
            }
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Open) => {
                if matches!(self.peek(), Some(Token::Close)) {
                    return Err(ExprError::EmptyGroup);
                }
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(ExprError::UnmatchedGroup("(")),
                }
            }
            Some(Token::Close) => Err(ExprError::UnmatchedGroup(")")),
            Some(Token::Test(raw)) => Ok(Expr::Test(parse_test(raw, self.shorthand)?)),
            Some(Token::And) => Err(ExprError::DanglingKeyword("and")),
            Some(Token::Or) => Err(ExprError::DanglingKeyword("or")),
            Some(Token::Not) => Err(ExprError::DanglingKeyword("not")),
            None => Err(ExprError::EmptyGroup),
        }
    }
}

/// Parses an ordered token sequence into an expression. An empty
/// sequence yields the match-everything expression.
pub fn parse_expression(tokens: &[String], shorthand: &Shorthand) -> Result<Expr, ExprError> {
    if tokens.is_empty() {
        return Ok(Expr::everything());
    }
    let mut parser = Parser {
        tokens: tokens.iter().map(|t| classify(t)).collect(),
        pos: 0,
        shorthand,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(Token::Close) => Err(ExprError::UnmatchedGroup(")")),
        Some(_) => Err(ExprError::UnmatchedGroup("(")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn parse(list: &[&str]) -> Result<Expr, ExprError> {
        parse_expression(&toks(list), &Shorthand::default())
    }

    #[test]
    fn test_parse_single_test() {
        let expr = parse(&["file.size+=4K"]).unwrap();
        match expr {
            Expr::Test(test) => {
                assert_eq!(test.attr, "file.size");
                assert_eq!(test.op, CmpOp::Ge);
                assert_eq!(test.value, ValueExpr::Literal("4K".into()));
            }
            other => panic!("expected test, got {other:?}"),
        }
    }

    #[test]
    fn test_operator_longest_match() {
        let test = parse_test("size+=4", &Shorthand::default()).unwrap();
        assert_eq!(test.op, CmpOp::Ge);
        let test = parse_test("size+4", &Shorthand::default()).unwrap();
        assert_eq!(test.op, CmpOp::Gt);
        let test = parse_test("size<=4", &Shorthand::default()).unwrap();
        assert_eq!(test.op, CmpOp::Le);
    }

    #[test]
    fn test_shorthand_rewrite() {
        let test = parse_test("foo.*bar", &Shorthand::default()).unwrap();
        assert_eq!(test.attr, "file.name");
        assert_eq!(test.op, CmpOp::Matches);
        assert_eq!(test.value, ValueExpr::Literal("foo.*bar".into()));
    }

    #[test]
    fn test_shorthand_with_operator_chars() {
        // '*' makes the prefix invalid as an attribute name, so the whole
        // token is a pattern even though it contains '+'
        let test = parse_test("ab*c+", &Shorthand::default()).unwrap();
        assert_eq!(test.attr, "file.name");
        assert_eq!(test.value, ValueExpr::Literal("ab*c+".into()));
    }

    #[test]
    fn test_file_reference_value() {
        let test = parse_test("size={}reference.bin", &Shorthand::default()).unwrap();
        assert_eq!(
            test.value,
            ValueExpr::FileRef {
                attr: None,
                path: PathBuf::from("reference.bin"),
            }
        );

        let test = parse_test("size={file.time}ref", &Shorthand::default()).unwrap();
        assert_eq!(
            test.value,
            ValueExpr::FileRef {
                attr: Some("file.time".into()),
                path: PathBuf::from("ref"),
            }
        );
    }

    #[test]
    fn test_implicit_and() {
        let expr = parse(&["type=f", "size+1K"]).unwrap();
        match expr {
            Expr::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence_not_and_or() {
        // a or not b c  ==  Or(a, And(Not(b), c))
        let expr = parse(&["a=1", "or", "not", "b=1", "c=1"]).unwrap();
        match expr {
            Expr::Or(children) => {
                assert_eq!(children.len(), 2);
                match &children[1] {
                    Expr::And(inner) => {
                        assert!(matches!(inner[0], Expr::Not(_)));
                        assert!(matches!(inner[1], Expr::Test(_)));
                    }
                    other => panic!("expected and, got {other:?}"),
                }
            }
            other => panic!("expected or, got {other:?}"),
        }
    }

    #[test]
    fn test_groups() {
        let expr = parse(&["(", "a=1", "or", "b=1", ")", "c=1"]).unwrap();
        match expr {
            Expr::And(children) => {
                assert!(matches!(children[0], Expr::Or(_)));
                assert!(matches!(children[1], Expr::Test(_)));
            }
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn test_brace_group_aliases() {
        let expr = parse(&["{{", "a=1", "or", "b=1", "}}"]).unwrap();
        assert!(matches!(expr, Expr::Or(_)));
    }

    #[test]
    fn test_group_errors() {
        assert!(matches!(
            parse(&["(", "a=1"]),
            Err(ExprError::UnmatchedGroup("("))
        ));
        assert!(matches!(
            parse(&["a=1", ")"]),
            Err(ExprError::UnmatchedGroup(")"))
        ));
        assert!(matches!(parse(&["(", ")"]), Err(ExprError::EmptyGroup)));
    }

    #[test]
    fn test_dangling_keywords() {
        assert!(matches!(
            parse(&["a=1", "and"]),
            Err(ExprError::DanglingKeyword("and"))
        ));
        assert!(matches!(
            parse(&["a=1", "or"]),
            Err(ExprError::DanglingKeyword("or"))
        ));
        assert!(matches!(
            parse(&["not"]),
            Err(ExprError::DanglingKeyword("not"))
        ));
    }

    #[test]
    fn test_empty_tokens_match_everything() {
        assert_eq!(parse(&[]).unwrap(), Expr::everything());
    }

    #[test]
    fn test_not_not() {
        let expr = parse(&["not", "not", "a=1"]).unwrap();
        match expr {
            Expr::Not(inner) => assert!(matches!(*inner, Expr::Not(_))),
            other => panic!("expected not, got {other:?}"),
        }
    }
}
