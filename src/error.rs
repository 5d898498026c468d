use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::lex::Token;
use crate::number::NumberError;

/// Broad classification of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnexpectedEof,
    Syntax,
    NumberConversion,
    IllegalCharacter,
}

#[derive(Error, Debug, Diagnostic)]
pub enum ParseError {
    #[error("Unexpected end of input, expected {expected}")]
    #[diagnostic(
        code(mathval::unexpected_eof),
        help("the expression stops early, an operand may be missing")
    )]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,

        #[label("input ends here")]
        at: SourceSpan,

        expected: &'static str,
    },

    #[error("Expected {expected}, found {found}")]
    #[diagnostic(code(mathval::unexpected_token))]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,

        #[label("here")]
        at: SourceSpan,

        expected: String,
        found: String,
    },

    #[error("Expected `)` to close the group")]
    #[diagnostic(
        code(mathval::missing_right_paren),
        help("add a `)` after the grouped expression")
    )]
    MissingRightParen {
        #[source_code]
        src: NamedSource<String>,

        #[label("group opened here")]
        open: SourceSpan,

        #[label("expected `)` here")]
        at: SourceSpan,
    },

    #[error("Expected fractional digits after `.`")]
    #[diagnostic(
        code(mathval::expected_fraction),
        help("write `{integral}.0` or drop the decimal point")
    )]
    ExpectedFractionalDigits {
        #[source_code]
        src: NamedSource<String>,

        #[label("after this decimal point")]
        at: SourceSpan,

        integral: String,
    },

    #[error("Cannot convert `{text}` to an exact number")]
    #[diagnostic(code(mathval::invalid_number))]
    InvalidNumber {
        #[source_code]
        src: NamedSource<String>,

        #[label("this numeric literal")]
        at: SourceSpan,

        text: String,

        #[source]
        source: NumberError,
    },

    #[error("Unexpected character '{ch}' in input")]
    #[diagnostic(
        code(mathval::illegal_character),
        help("remove or correct the character: `{ch}`")
    )]
    IllegalCharacter {
        #[source_code]
        src: NamedSource<String>,

        #[label("this character")]
        at: SourceSpan,

        ch: char,
    },

    #[error("Unexpected `{found}` after a complete expression")]
    #[diagnostic(
        code(mathval::trailing_input),
        help("join the parts with an operator or remove the extra input")
    )]
    TrailingInput {
        #[source_code]
        src: NamedSource<String>,

        #[label("extra input starts here")]
        at: SourceSpan,

        found: String,
    },

    #[error("Groups nest deeper than {limit} levels")]
    #[diagnostic(
        code(mathval::nesting_too_deep),
        help("split the expression or remove redundant parentheses")
    )]
    NestingTooDeep {
        #[source_code]
        src: NamedSource<String>,

        #[label("this group crosses the limit")]
        at: SourceSpan,

        limit: usize,
    },
}

impl ParseError {
    pub fn illegal_character(src: NamedSource<String>, token: &Token<'_>) -> Self {
        ParseError::IllegalCharacter {
            src,
            at: SourceSpan::from(token.offset..token.end()),
            ch: token.literal.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::UnexpectedEof { .. } => ErrorKind::UnexpectedEof,
            ParseError::UnexpectedToken { .. }
            | ParseError::MissingRightParen { .. }
            | ParseError::ExpectedFractionalDigits { .. }
            | ParseError::TrailingInput { .. }
            | ParseError::NestingTooDeep { .. } => ErrorKind::Syntax,
            ParseError::InvalidNumber { .. } => ErrorKind::NumberConversion,
            ParseError::IllegalCharacter { .. } => ErrorKind::IllegalCharacter,
        }
    }

    /// The primary location of the error.
    pub fn span(&self) -> SourceSpan {
        match self {
            ParseError::UnexpectedEof { at, .. }
            | ParseError::UnexpectedToken { at, .. }
            | ParseError::MissingRightParen { at, .. }
            | ParseError::ExpectedFractionalDigits { at, .. }
            | ParseError::InvalidNumber { at, .. }
            | ParseError::IllegalCharacter { at, .. }
            | ParseError::TrailingInput { at, .. }
            | ParseError::NestingTooDeep { at, .. } => *at,
        }
    }

    fn src(&self) -> &NamedSource<String> {
        match self {
            ParseError::UnexpectedEof { src, .. }
            | ParseError::UnexpectedToken { src, .. }
            | ParseError::MissingRightParen { src, .. }
            | ParseError::ExpectedFractionalDigits { src, .. }
            | ParseError::InvalidNumber { src, .. }
            | ParseError::IllegalCharacter { src, .. }
            | ParseError::TrailingInput { src, .. }
            | ParseError::NestingTooDeep { src, .. } => src,
        }
    }

    /// 1-based line of the error location.
    pub fn line(&self) -> usize {
        let offset = self.span().offset();
        let source = self.src().inner();
        source[..offset.min(source.len())].matches('\n').count() + 1
    }
}
