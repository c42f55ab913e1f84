//! Hand-written lexer for the router condition language (spec §4.3).

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Ident(String),
    Regex(String),
    // operators / punctuation
    QuestionQuestion,
    PipePipe,
    AmpAmp,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Bang,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    // membership keywords
    In,
    Has,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unexpected character `{0}` at position {1}")]
pub struct LexError(pub char, pub usize);

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    prev_significant: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            prev_significant: None,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok == Token::Eof;
            tokens.push(tok.clone());
            self.prev_significant = Some(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    /// A leading `-` is a negative-number sign only when preceded by
    /// start-of-input, an operator, or an opening bracket/paren/comma (spec
    /// §4.3 "Literals").
    fn minus_starts_number(&self) -> bool {
        !matches!(
            self.prev_significant,
            Some(Token::Number(_))
                | Some(Token::String(_))
                | Some(Token::Bool(_))
                | Some(Token::Null)
                | Some(Token::Ident(_))
                | Some(Token::RBracket)
                | Some(Token::RParen)
        )
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        let Some(&(pos, c)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match c {
            '?' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '?'))) {
                    self.chars.next();
                    Ok(Token::QuestionQuestion)
                } else {
                    Err(LexError('?', pos))
                }
            }
            '|' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '|'))) {
                    self.chars.next();
                    Ok(Token::PipePipe)
                } else {
                    Err(LexError('|', pos))
                }
            }
            '&' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '&'))) {
                    self.chars.next();
                    Ok(Token::AmpAmp)
                } else {
                    Err(LexError('&', pos))
                }
            }
            '=' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '='))) {
                    self.chars.next();
                    Ok(Token::EqEq)
                } else {
                    Err(LexError('=', pos))
                }
            }
            '!' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '='))) {
                    self.chars.next();
                    Ok(Token::NotEq)
                } else {
                    Ok(Token::Bang)
                }
            }
            '<' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '='))) {
                    self.chars.next();
                    Ok(Token::LtEq)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.chars.next();
                if matches!(self.chars.peek(), Some((_, '='))) {
                    self.chars.next();
                    Ok(Token::GtEq)
                } else {
                    Ok(Token::Gt)
                }
            }
            '.' => {
                self.chars.next();
                Ok(Token::Dot)
            }
            '[' => {
                self.chars.next();
                Ok(Token::LBracket)
            }
            ']' => {
                self.chars.next();
                Ok(Token::RBracket)
            }
            '(' => {
                self.chars.next();
                Ok(Token::LParen)
            }
            ')' => {
                self.chars.next();
                Ok(Token::RParen)
            }
            ',' => {
                self.chars.next();
                Ok(Token::Comma)
            }
            '/' => self.read_regex(),
            '"' | '\'' => self.read_string(c),
            '-' if self.minus_starts_number() => self.read_number(),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_ident()),
            other => {
                self.chars.next();
                Err(LexError(other, pos))
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.chars.peek().map(|&(i, _)| i).unwrap_or(0);
        if matches!(self.chars.peek(), Some((_, '-'))) {
            self.chars.next();
        }
        let mut end = start + 1;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| LexError('0', start))
    }

    fn read_ident(&mut self) -> Token {
        let start = self.chars.peek().map(|&(i, _)| i).unwrap_or(0);
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        match &self.src[start..end] {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            "null" => Token::Null,
            "in" => Token::In,
            "has" => Token::Has,
            "contains" => Token::Contains,
            "startsWith" => Token::StartsWith,
            "endsWith" => Token::EndsWith,
            "matches" => Token::Matches,
            other => Token::Ident(other.to_string()),
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let (start_pos, _) = *self.chars.peek().expect("caller peeked quote");
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, '\'')) => out.push('\''),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '/')) => out.push('/'),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(LexError(quote, start_pos)),
                },
                Some((_, c)) => out.push(c),
                None => return Err(LexError(quote, start_pos)),
            }
        }
        Ok(Token::String(out))
    }

    fn read_regex(&mut self) -> Result<Token, LexError> {
        let (start_pos, _) = *self.chars.peek().expect("caller peeked slash");
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some((_, '/')) => break,
                Some((_, '\\')) => {
                    out.push('\\');
                    if let Some((_, next)) = self.chars.next() {
                        out.push(next);
                    }
                }
                Some((_, c)) => out.push(c),
                None => return Err(LexError('/', start_pos)),
            }
        }
        Ok(Token::Regex(out))
    }
}
