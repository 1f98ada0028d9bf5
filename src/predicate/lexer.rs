//! Tokenizer for predicate expressions

use super::PredicateError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Tilde,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

/// A token and the byte position it starts at
pub(crate) type Spanned = (usize, Token);

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, PredicateError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            index: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, PredicateError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.index += 1;
                continue;
            }
            let start = self.index;
            let token = match c {
                b'0'..=b'9' => self.number()?,
                b'"' | b'\'' => self.string(c)?,
                b'$' => self.metavariable()?,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.word(),
                _ => self.symbol()?,
            };
            tokens.push((start, token));
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn error(&self, position: usize, message: impl Into<String>) -> PredicateError {
        PredicateError::Parse {
            position,
            message: message.into(),
        }
    }

    fn number(&mut self) -> Result<Token, PredicateError> {
        let start = self.index;
        self.eat_digits();
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.index += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.index += 1 + sign;
                self.eat_digits();
            }
        }

        let text: String = self.input[start..self.index]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| self.error(start, format!("invalid float '{}': {}", text, e)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|e| self.error(start, format!("invalid integer '{}': {}", text, e)))
        }
    }

    fn eat_digits(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == b'_')
        {
            self.index += 1;
        }
    }

    fn string(&mut self, quote: u8) -> Result<Token, PredicateError> {
        let start = self.index;
        self.index += 1;
        let mut value = String::new();
        let mut chars = self.input[self.index..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                c if c as u32 == u32::from(quote) => {
                    self.index += offset + 1;
                    return Ok(Token::Str(value));
                }
                '\\' => {
                    let escaped = match chars.next() {
                        Some((_, 'n')) => '\n',
                        Some((_, 't')) => '\t',
                        Some((_, 'r')) => '\r',
                        Some((_, other)) => other,
                        None => break,
                    };
                    value.push(escaped);
                }
                c => value.push(c),
            }
        }
        Err(self.error(start, "unterminated string literal"))
    }

    fn metavariable(&mut self) -> Result<Token, PredicateError> {
        let start = self.index;
        self.index += 1;
        if self.input[self.index..].starts_with("...") {
            self.index += 3;
        }
        let name_start = self.index;
        self.eat_ident_chars();
        if self.index == name_start {
            return Err(self.error(start, "expected metavariable name after '$'"));
        }
        Ok(Token::Ident(self.input[start..self.index].to_string()))
    }

    fn word(&mut self) -> Token {
        let start = self.index;
        self.eat_ident_chars();
        match &self.input[start..self.index] {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "True" | "true" => Token::True,
            "False" | "false" => Token::False,
            ident => Token::Ident(ident.to_string()),
        }
    }

    fn eat_ident_chars(&mut self) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.index += 1;
        }
    }

    fn symbol(&mut self) -> Result<Token, PredicateError> {
        let start = self.index;
        let two = (self.peek(), self.peek_at(1));
        let (token, width) = match two {
            (Some(b'&'), Some(b'&')) => (Token::And, 2),
            (Some(b'|'), Some(b'|')) => (Token::Or, 2),
            (Some(b'='), Some(b'=')) => (Token::EqEq, 2),
            (Some(b'='), Some(b'~')) => (Token::Tilde, 2),
            (Some(b'!'), Some(b'=')) => (Token::NotEq, 2),
            (Some(b'<'), Some(b'=')) => (Token::Le, 2),
            (Some(b'>'), Some(b'=')) => (Token::Ge, 2),
            (Some(b'/'), Some(b'/')) => (Token::DoubleSlash, 2),
            (Some(b'!'), _) => (Token::Not, 1),
            (Some(b'<'), _) => (Token::Lt, 1),
            (Some(b'>'), _) => (Token::Gt, 1),
            (Some(b'+'), _) => (Token::Plus, 1),
            (Some(b'-'), _) => (Token::Minus, 1),
            (Some(b'*'), _) => (Token::Star, 1),
            (Some(b'/'), _) => (Token::Slash, 1),
            (Some(b'%'), _) => (Token::Percent, 1),
            (Some(b'('), _) => (Token::LParen, 1),
            (Some(b')'), _) => (Token::RParen, 1),
            (Some(b'['), _) => (Token::LBracket, 1),
            (Some(b']'), _) => (Token::RBracket, 1),
            (Some(b','), _) => (Token::Comma, 1),
            (Some(b'.'), _) => (Token::Dot, 1),
            _ => {
                let c = self.input[start..].chars().next().unwrap_or('?');
                return Err(self.error(start, format!("unexpected character '{}'", c)));
            }
        };
        self.index += width;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("$N >= 10 and $N != 2.5"),
            vec![
                Token::Ident("$N".to_string()),
                Token::Ge,
                Token::Int(10),
                Token::And,
                Token::Ident("$N".to_string()),
                Token::NotEq,
                Token::Float(2.5),
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb""#),
            vec![Token::Str("it's".to_string()), Token::Str("a\nb".to_string())]
        );
    }

    #[test]
    fn test_index_and_method_tokens() {
        assert_eq!(
            kinds(r#"vars["$X"].startswith("f")"#),
            vec![
                Token::Ident("vars".to_string()),
                Token::LBracket,
                Token::Str("$X".to_string()),
                Token::RBracket,
                Token::Dot,
                Token::Ident("startswith".to_string()),
                Token::LParen,
                Token::Str("f".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_ellipsis_metavariable() {
        assert_eq!(kinds("$...ARGS"), vec![Token::Ident("$...ARGS".to_string())]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1_000 1e3 7 // 2"),
            vec![
                Token::Int(1000),
                Token::Float(1000.0),
                Token::Int(7),
                Token::DoubleSlash,
                Token::Int(2)
            ]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = tokenize("$X = 1").unwrap_err();
        assert_eq!(
            err,
            PredicateError::Parse {
                position: 3,
                message: "unexpected character '='".to_string()
            }
        );
        assert!(matches!(tokenize("'open"), Err(PredicateError::Parse { position: 0, .. })));
        assert!(matches!(tokenize("$ > 1"), Err(PredicateError::Parse { .. })));
    }
}
