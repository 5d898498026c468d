use std::fmt::Display;

use miette::NamedSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
    /// Byte offset of `literal` within the scanned input.
    pub offset: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.offset + self.literal.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Whitespace,
    Ident,
    Plus,
    Minus,
    Star,
    Slash,
    Backslash,
    Percent,
    Caret,
    Digits,
    LeftParen,
    RightParen,
    Dot,
    Illegal,
}

/// Binding class of an operator token. Classes are listed from loosest to tightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Additive,
    Multiplicative,
    Exponent,
}

impl TokenKind {
    pub fn precedence(self) -> Option<Precedence> {
        match self {
            TokenKind::Plus | TokenKind::Minus => Some(Precedence::Additive),
            TokenKind::Star | TokenKind::Slash | TokenKind::Backslash | TokenKind::Percent => {
                Some(Precedence::Multiplicative)
            }
            TokenKind::Caret => Some(Precedence::Exponent),
            TokenKind::Eof
            | TokenKind::Whitespace
            | TokenKind::Ident
            | TokenKind::Digits
            | TokenKind::LeftParen
            | TokenKind::RightParen
            | TokenKind::Dot
            | TokenKind::Illegal => None,
        }
    }

    pub fn is(self, class: Precedence) -> bool {
        self.precedence() == Some(class)
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Eof => "EOF",
            TokenKind::Whitespace => "WS",
            TokenKind::Ident => "IDENTIFIER",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Star => "MULTIPLY",
            TokenKind::Slash => "DIVIDE",
            TokenKind::Backslash => "INT_DIVIDE",
            TokenKind::Percent => "MODULO",
            TokenKind::Caret => "POW",
            TokenKind::Digits => "DIGITS",
            TokenKind::LeftParen => "LEFT_PAREN",
            TokenKind::RightParen => "RIGHT_PAREN",
            TokenKind::Dot => "DOT",
            TokenKind::Illegal => "ILLEGAL",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Whitespace => write!(f, "WS {:?}", self.literal),
            kind => write!(f, "{kind} {}", self.literal),
        }
    }
}

pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    rest: &'de str,
    byte: usize,
    // width of the last char handed out by `read`, zero once it has been unread
    last: usize,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            last: 0,
        }
    }

    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string())
    }

    /// Returns the next token. Runs of whitespace, letters and digits come back as a
    /// single token each; end of input yields `Eof` with an empty literal, repeatedly.
    pub fn next_token(&mut self) -> Token<'de> {
        let start = self.byte;
        let Some(c) = self.read() else {
            return Token {
                kind: TokenKind::Eof,
                literal: "",
                offset: start,
            };
        };

        let kind = match c {
            c if is_whitespace(c) => {
                self.unread();
                self.scan_contiguous(is_whitespace);
                TokenKind::Whitespace
            }
            c if is_letter(c) => {
                self.unread();
                self.scan_contiguous(is_letter);
                TokenKind::Ident
            }
            c if is_digit(c) => {
                self.unread();
                self.scan_contiguous(is_digit);
                TokenKind::Digits
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '\\' => TokenKind::Backslash,
            '^' => TokenKind::Caret,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '.' => TokenKind::Dot,
            _ => TokenKind::Illegal,
        };

        let token = Token {
            kind,
            literal: &self.whole[start..self.byte],
            offset: start,
        };
        tracing::trace!(kind = ?token.kind, literal = token.literal, offset = token.offset, "scanned");
        token
    }

    fn read(&mut self) -> Option<char> {
        let Some(c) = self.rest.chars().next() else {
            self.last = 0;
            return None;
        };
        self.last = c.len_utf8();
        self.rest = &self.rest[self.last..];
        self.byte += self.last;
        Some(c)
    }

    fn unread(&mut self) {
        self.byte -= self.last;
        self.rest = &self.whole[self.byte..];
        self.last = 0;
    }

    /// Consumes chars while `class` accepts them and returns the consumed slice.
    fn scan_contiguous(&mut self, class: fn(char) -> bool) -> &'de str {
        let start = self.byte;
        while let Some(c) = self.read() {
            if !class(c) {
                self.unread();
                break;
            }
        }
        &self.whole[start..self.byte]
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Token<'de>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Token {
                kind: TokenKind::Eof,
                ..
            } => None,
            token => Some(token),
        }
    }
}

pub fn is_whitespace(c: char) -> bool {
    c.is_whitespace()
}

pub fn is_letter(c: char) -> bool {
    c.is_alphabetic()
}

pub fn is_digit(c: char) -> bool {
    c.is_numeric()
}
