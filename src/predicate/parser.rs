//! Recursive-descent parser producing the predicate syntax tree
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons (chainable),
//! `+ -`, `* / // %`, unary `-`, postfix `[index]` and `.method(args)`.

use super::lexer::{tokenize, Spanned, Token};
use super::value::Value;
use super::PredicateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Matches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Index(Box<Expr>, Box<Expr>),
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Method {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
}

/// Deepest syntax tree the parser builds; evaluation recurses this deep
const MAX_NESTING: usize = 256;

pub(crate) fn parse(input: &str) -> Result<Expr, PredicateError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some((position, token)) = parser.tokens.get(parser.index) {
        return Err(PredicateError::Parse {
            position: *position,
            message: format!("unexpected trailing token {:?}", token),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, t)| t)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.index + 1).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|(p, _)| *p)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(_, t)| t.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), PredicateError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", token)))
        }
    }

    fn error(&self, message: impl Into<String>) -> PredicateError {
        PredicateError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    /// Go one level deeper in the tree being built
    fn descend(&mut self) -> Result<(), PredicateError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        self.descend()?;
        let mut left = self.parse_and()?;
        let mut levels = 1;
        while self.eat(&Token::Or) {
            self.descend()?;
            levels += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.ascend(levels);
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_not()?;
        let mut levels = 0;
        while self.eat(&Token::And) {
            self.descend()?;
            levels += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.ascend(levels);
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, PredicateError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.parse_not()?;
            self.ascend(1);
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match (self.peek()?, self.peek_second()) {
            (Token::EqEq, _) => CompareOp::Eq,
            (Token::NotEq, _) => CompareOp::NotEq,
            (Token::Lt, _) => CompareOp::Lt,
            (Token::Le, _) => CompareOp::Le,
            (Token::Gt, _) => CompareOp::Gt,
            (Token::Ge, _) => CompareOp::Ge,
            (Token::In, _) => CompareOp::In,
            (Token::Tilde, _) => CompareOp::Matches,
            (Token::Not, Some(Token::In)) => {
                self.index += 2;
                return Some(CompareOp::NotIn);
            }
            _ => return None,
        };
        self.index += 1;
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, PredicateError> {
        let first = self.parse_sum()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.parse_sum()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_term()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => {
                    self.ascend(levels);
                    return Ok(left);
                }
            };
            self.index += 1;
            self.descend()?;
            levels += 1;
            let right = self.parse_term()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_unary()?;
        let mut levels = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Slash) => ArithOp::Div,
                Some(Token::DoubleSlash) => ArithOp::FloorDiv,
                Some(Token::Percent) => ArithOp::Mod,
                _ => {
                    self.ascend(levels);
                    return Ok(left);
                }
            };
            self.index += 1;
            self.descend()?;
            levels += 1;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, PredicateError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.ascend(1);
            return Ok(Expr::Neg(Box::new(inner)));
        }
        if self.eat(&Token::Plus) {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.ascend(1);
            return Ok(inner);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, PredicateError> {
        let mut expr = self.parse_primary()?;
        let mut levels = 0;
        loop {
            if matches!(self.peek(), Some(Token::LBracket | Token::Dot)) {
                self.descend()?;
                levels += 1;
            }
            if self.eat(&Token::LBracket) {
                let index = self.parse_or()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::Dot) {
                let method = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(self.error("expected method name after '.'")),
                };
                self.expect(&Token::LParen)?;
                let args = self.parse_args()?;
                expr = Expr::Method {
                    receiver: Box::new(expr),
                    method,
                    args,
                };
            } else {
                self.ascend(levels);
                return Ok(expr);
            }
        }
    }

    /// Arguments after an opening parenthesis, through the closing one
    fn parse_args(&mut self) -> Result<Vec<Expr>, PredicateError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Ident(name)) => {
                if !name.starts_with('$') && self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Call {
                        function: name,
                        args,
                    })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(PredicateError::Parse {
                position,
                message: format!("unexpected token {:?}", token),
            }),
            None => Err(PredicateError::Parse {
                position,
                message: "unexpected end of expression".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_string()))
    }

    fn int(n: i64) -> Expr {
        Expr::Literal(Value::Int(n))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("$A + 2 * 3 > 7").unwrap();
        assert_eq!(
            expr,
            Expr::Compare {
                first: Box::new(Expr::Arith(
                    ArithOp::Add,
                    name("$A"),
                    Box::new(Expr::Arith(ArithOp::Mul, Box::new(int(2)), Box::new(int(3))))
                )),
                rest: vec![(CompareOp::Gt, int(7))],
            }
        );
    }

    #[test]
    fn test_chained_comparison() {
        let expr = parse("1 < $N <= 10").unwrap();
        match expr {
            Expr::Compare { rest, .. } => {
                let ops: Vec<_> = rest.iter().map(|(op, _)| *op).collect();
                assert_eq!(ops, vec![CompareOp::Lt, CompareOp::Le]);
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_not_in_and_boolean_ops() {
        let expr = parse("not $X in 'abc' or $Y not in 'xyz'").unwrap();
        let Expr::Or(left, right) = expr else {
            panic!("expected or");
        };
        assert!(matches!(*left, Expr::Not(_)));
        assert!(matches!(
            *right,
            Expr::Compare { ref rest, .. } if rest[0].0 == CompareOp::NotIn
        ));
    }

    #[test]
    fn test_calls_methods_and_index() {
        let expr = parse(r#"len(vars["$X"].strip()) == 3"#).unwrap();
        let Expr::Compare { first, .. } = expr else {
            panic!("expected comparison");
        };
        let Expr::Call { function, args } = *first else {
            panic!("expected call");
        };
        assert_eq!(function, "len");
        assert!(matches!(&args[0], Expr::Method { method, .. } if method == "strip"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse("$X >"),
            Err(PredicateError::Parse { position: 4, .. })
        ));
        assert!(matches!(
            parse("($X"),
            Err(PredicateError::Parse { .. })
        ));
        assert!(matches!(
            parse("$X $Y"),
            Err(PredicateError::Parse { position: 3, .. })
        ));
        assert!(matches!(parse(""), Err(PredicateError::Parse { .. })));
    }

    fn nested_too_deeply(result: Result<Expr, PredicateError>) -> bool {
        matches!(result, Err(PredicateError::Parse { message, .. }) if message.contains("nested too deeply"))
    }

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let parens = format!("{}$N{} > 5", "(".repeat(2000), ")".repeat(2000));
        assert!(nested_too_deeply(parse(&parens)));

        let negations = format!("{}1 > 0", "not ".repeat(2000));
        assert!(nested_too_deeply(parse(&negations)));

        let unary = format!("{}1", "-".repeat(2000));
        assert!(nested_too_deeply(parse(&unary)));

        let chain = format!("1{} > 0", " + 1".repeat(5000));
        assert!(nested_too_deeply(parse(&chain)));
    }

    #[test]
    fn test_moderate_nesting_still_parses() {
        let parens = format!("{}$N{} > 5", "(".repeat(40), ")".repeat(40));
        assert!(parse(&parens).is_ok());

        let chain = format!("1{} > 0", " + 1".repeat(100));
        assert!(parse(&chain).is_ok());
    }
}
