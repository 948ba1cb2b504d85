//! Lexer for bytevm assembly source.

use crate::error::{AssemblerError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Mnemonic, register name, or label; may contain a `.` width suffix.
    Identifier(String),

    /// Numeric literal: decimal (optionally negative), 0x hex, 0b binary.
    Number(i128),

    /// `.org`, `.byte`, `.quad`, `.zero`
    Directive(String),

    Comma,
    Colon,

    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "{}", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Directive(d) => write!(f, ".{}", d),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Newline => write!(f, "\\n"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// A token plus the source line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.current(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn is_ident_char(ch: char) -> bool {
        ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if Self::is_ident_char(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_number(&mut self) -> Result<i128> {
        let line = self.line;
        let negative = self.current() == Some('-');
        if negative {
            self.advance();
        }

        let (radix, mut digits) = if self.current() == Some('0')
            && matches!(self.peek(), Some('x') | Some('X'))
        {
            self.advance();
            self.advance();
            (16, String::new())
        } else if self.current() == Some('0') && matches!(self.peek(), Some('b') | Some('B')) {
            self.advance();
            self.advance();
            (2, String::new())
        } else {
            (10, String::new())
        };

        while let Some(ch) = self.current() {
            if ch.is_digit(radix) {
                digits.push(ch);
                self.advance();
            } else if ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        if digits.is_empty() {
            return Err(AssemblerError::UnexpectedChar {
                line,
                found: self.current().unwrap_or('\0'),
            });
        }

        // u64 digits always fit in i128.
        let magnitude = i128::from_str_radix(&digits, radix).map_err(|_| {
            AssemblerError::UnexpectedChar { line, found: '#' }
        })?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Tokenize the whole source.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let line = self.line;
            let Some(ch) = self.current() else {
                tokens.push(Spanned { token: Token::Eof, line });
                break;
            };

            match ch {
                '\n' => {
                    self.advance();
                    tokens.push(Spanned { token: Token::Newline, line });
                }
                ';' | '#' => self.skip_comment(),
                ',' => {
                    self.advance();
                    tokens.push(Spanned { token: Token::Comma, line });
                }
                ':' => {
                    self.advance();
                    tokens.push(Spanned { token: Token::Colon, line });
                }
                '.' => {
                    self.advance();
                    let name = self.read_identifier();
                    if name.is_empty() {
                        return Err(AssemblerError::UnexpectedChar { line, found: '.' });
                    }
                    tokens.push(Spanned { token: Token::Directive(name), line });
                }
                '-' => {
                    let value = self.read_number()?;
                    tokens.push(Spanned { token: Token::Number(value), line });
                }
                _ if ch.is_ascii_digit() => {
                    let value = self.read_number()?;
                    tokens.push(Spanned { token: Token::Number(value), line });
                }
                _ if ch.is_ascii_alphabetic() || ch == '_' => {
                    let name = self.read_identifier();
                    tokens.push(Spanned { token: Token::Identifier(name), line });
                }
                other => {
                    return Err(AssemblerError::UnexpectedChar { line, found: other });
                }
            }
        }

        Ok(tokens)
    }
}
