use std::io::Read;

use miette::{IntoDiagnostic, WrapErr};

pub mod ast;
pub mod error;
pub mod lex;
pub mod number;
pub mod parse;

pub use ast::{AddOp, Chained, ExponentOp, Expression, Factor, MultiplyOp, Number, Power, Term};
pub use error::{ErrorKind, ParseError};
pub use lex::{Lexer, Precedence, Token, TokenKind};
pub use parse::{MAX_NESTING, Parser};

/// Parses a complete expression from `input`.
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    Parser::new(None, input).parse()
}

/// Reads `reader` to its end and parses the text as one expression.
///
/// `name` labels the source in diagnostics.
pub fn parse_reader<R: Read>(name: &str, mut reader: R) -> miette::Result<Expression> {
    let mut input = String::new();
    reader
        .read_to_string(&mut input)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{name}` failed"))?;

    Ok(Parser::new(Some(name), &input).parse()?)
}
