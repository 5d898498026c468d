use miette::SourceSpan;

use crate::{
    Lexer,
    ast::{AddOp, Chained, ExponentOp, Expression, Factor, MultiplyOp, Number, Power, Term},
    error::ParseError,
    lex::{Precedence, Token, TokenKind},
    number::parse_decimal,
};

const EXPRESSION: &str = "an expression";
const OPERAND: &str = "an operand";
const TERM: &str = "a number or `(`";
const NUMBER: &str = "a number";
const ADD_OP: &str = "an additive operator (`+` or `-`)";
const MULTIPLY_OP: &str = "a multiplicative operator (`*`, `/`, `\\` or `%`)";
const EXPONENT_OP: &str = "an exponentiation operator (`^`)";

/// Most groups that may be open at once. Each level costs a few stack frames.
pub const MAX_NESTING: usize = 64;

/// Recursive-descent parser with one token of lookahead.
///
/// The last token pulled from the lexer is kept in `last`; `unscan` marks it pending so
/// the next `scan` hands it out again instead of reading on.
pub struct Parser<'de> {
    lexer: Lexer<'de>,
    last: Option<Token<'de>>,
    pending: bool,
    // groups currently open
    depth: usize,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Parser {
            lexer: Lexer::new(filename, whole),
            last: None,
            pending: false,
            depth: 0,
        }
    }

    /// Parses a whole input: one expression followed by the end of input.
    pub fn parse(mut self) -> Result<Expression, ParseError> {
        let expression = self.parse_expression()?;
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => Ok(expression),
            TokenKind::Illegal => Err(ParseError::illegal_character(
                self.lexer.named_source(),
                &token,
            )),
            _ => Err(ParseError::TrailingInput {
                src: self.lexer.named_source(),
                at: span(&token),
                found: token.literal.to_string(),
            }),
        }
    }

    fn scan(&mut self) -> Token<'de> {
        if let (true, Some(token)) = (self.pending, self.last) {
            self.pending = false;
            return token;
        }
        let token = self.lexer.next_token();
        self.last = Some(token);
        token
    }

    fn unscan(&mut self) {
        self.pending = true;
    }

    /// Returns the next non-whitespace token without consuming it.
    fn peek(&mut self) -> Token<'de> {
        let token = self.scan_ignore_whitespace();
        self.unscan();
        token
    }

    fn scan_ignore_whitespace(&mut self) -> Token<'de> {
        let token = self.scan();
        if token.kind == TokenKind::Whitespace {
            return self.scan();
        }
        token
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.expect_more(EXPRESSION)?;

        let head = self.parse_factor()?;
        let mut rest = Vec::new();
        while self.peek().kind.is(Precedence::Additive) {
            let op = self.parse_add_op()?;
            rest.push((op, self.parse_factor()?));
        }
        Ok(Expression::from_chain(head, rest))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn parse_factor(&mut self) -> Result<Factor, ParseError> {
        self.expect_more(OPERAND)?;

        let head = self.parse_power()?;
        let mut rest = Vec::new();
        while self.peek().kind.is(Precedence::Multiplicative) {
            let op = self.parse_multiply_op()?;
            rest.push((op, self.parse_power()?));
        }
        Ok(Factor::from_chain(head, rest))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn parse_power(&mut self) -> Result<Power, ParseError> {
        self.expect_more(OPERAND)?;

        let head = self.parse_term()?;
        let mut rest = Vec::new();
        while self.peek().kind.is(Precedence::Exponent) {
            let op = self.parse_exponent_op()?;
            rest.push((op, self.parse_term()?));
        }
        Ok(Power::from_chain(head, rest))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    pub fn parse_term(&mut self) -> Result<Term, ParseError> {
        let token = self.expect_more(TERM)?;

        match token.kind {
            TokenKind::LeftParen => {
                if self.depth == MAX_NESTING {
                    return Err(ParseError::NestingTooDeep {
                        src: self.lexer.named_source(),
                        at: span(&token),
                        limit: MAX_NESTING,
                    });
                }
                self.scan_ignore_whitespace();
                self.depth += 1;
                let expression = self.parse_expression();
                self.depth -= 1;
                let expression = expression?;

                let close = self.peek();
                match close.kind {
                    TokenKind::RightParen => {}
                    TokenKind::Illegal => {
                        return Err(ParseError::illegal_character(
                            self.lexer.named_source(),
                            &close,
                        ));
                    }
                    _ => {
                        return Err(ParseError::MissingRightParen {
                            src: self.lexer.named_source(),
                            open: span(&token),
                            at: span(&close),
                        });
                    }
                }
                self.scan_ignore_whitespace();
                Ok(Term::Group(Box::new(expression)))
            }
            TokenKind::Digits => Ok(Term::Number(self.parse_number()?)),
            _ => Err(self.unexpected(&token, TERM)),
        }
    }

    pub fn parse_number(&mut self) -> Result<Number, ParseError> {
        let token = self.expect_more(NUMBER)?;
        if token.kind != TokenKind::Digits {
            return Err(self.unexpected(&token, NUMBER));
        }

        let integral = self.scan_ignore_whitespace();
        let mut text = integral.literal.to_string();
        let mut end = integral.end();

        if self.peek().kind == TokenKind::Dot {
            let dot = self.scan_ignore_whitespace();
            let fractional = self.peek();
            if fractional.kind != TokenKind::Digits {
                return Err(ParseError::ExpectedFractionalDigits {
                    src: self.lexer.named_source(),
                    at: span(&dot),
                    integral: text,
                });
            }
            self.scan_ignore_whitespace();
            text.push('.');
            text.push_str(fractional.literal);
            end = fractional.end();
        }

        tracing::trace!(text = text.as_str(), "number");
        match parse_decimal(&text) {
            Ok(value) => Ok(Number::new(text, value)),
            Err(source) => Err(ParseError::InvalidNumber {
                src: self.lexer.named_source(),
                at: SourceSpan::from(integral.offset..end),
                text,
                source,
            }),
        }
    }

    pub fn parse_add_op(&mut self) -> Result<AddOp, ParseError> {
        let token = self.expect_more(ADD_OP)?;
        let Some(op) = AddOp::from_token(token.kind) else {
            return Err(self.unexpected(&token, ADD_OP));
        };
        self.scan_ignore_whitespace();
        tracing::trace!(%op, "additive operator");
        Ok(op)
    }

    pub fn parse_multiply_op(&mut self) -> Result<MultiplyOp, ParseError> {
        let token = self.expect_more(MULTIPLY_OP)?;
        let Some(op) = MultiplyOp::from_token(token.kind) else {
            return Err(self.unexpected(&token, MULTIPLY_OP));
        };
        self.scan_ignore_whitespace();
        tracing::trace!(%op, "multiplicative operator");
        Ok(op)
    }

    pub fn parse_exponent_op(&mut self) -> Result<ExponentOp, ParseError> {
        let token = self.expect_more(EXPONENT_OP)?;
        let Some(op) = ExponentOp::from_token(token.kind) else {
            return Err(self.unexpected(&token, EXPONENT_OP));
        };
        self.scan_ignore_whitespace();
        tracing::trace!(%op, "exponentiation operator");
        Ok(op)
    }

    /// Peeks the next token, failing if the input is exhausted.
    fn expect_more(&mut self, expected: &'static str) -> Result<Token<'de>, ParseError> {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            return Err(ParseError::UnexpectedEof {
                src: self.lexer.named_source(),
                at: span(&token),
                expected,
            });
        }
        Ok(token)
    }

    fn unexpected(&self, token: &Token<'de>, expected: &str) -> ParseError {
        let found = match token.kind {
            TokenKind::Illegal => {
                return ParseError::illegal_character(self.lexer.named_source(), token);
            }
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident => format!("unknown identifier `{}`", token.literal),
            _ => format!("`{}`", token.literal),
        };
        ParseError::UnexpectedToken {
            src: self.lexer.named_source(),
            at: span(token),
            expected: expected.to_string(),
            found,
        }
    }
}

fn span(token: &Token<'_>) -> SourceSpan {
    SourceSpan::from(token.offset..token.end())
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use rstest::rstest;

    use super::*;
    use crate::error::ErrorKind;

    fn ratio(numer: i64, denom: i64) -> BigRational {
        BigRational::new(BigInt::from(numer), BigInt::from(denom))
    }

    fn num(text: &str, numer: i64, denom: i64) -> Term {
        Term::Number(Number::new(text, ratio(numer, denom)))
    }

    fn power(term: Term) -> Power {
        Power::Single(term)
    }

    fn factor(term: Term) -> Factor {
        Factor::Single(power(term))
    }

    #[test]
    fn parse_builds_precedence_tree() {
        let parser = Parser::new(None, "10^2*4+1");
        let expected = Expression::Chain(
            Factor::Chain(
                Power::Chain(
                    num("10", 10, 1),
                    ExponentOp::Power,
                    Box::new(power(num("2", 2, 1))),
                ),
                MultiplyOp::Multiply,
                Box::new(factor(num("4", 4, 1))),
            ),
            AddOp::Add,
            Box::new(Expression::Single(factor(num("1", 1, 1)))),
        );
        assert_eq!(parser.parse().unwrap(), expected);
    }

    #[test]
    fn scan_unscan() {
        let mut parser = Parser::new(None, "(49 + 77)*((14-2)/11)\\2");

        let token = parser.scan();
        assert_eq!((token.kind, token.literal), (TokenKind::LeftParen, "("));

        let token = parser.scan();
        assert_eq!((token.kind, token.literal), (TokenKind::Digits, "49"));

        parser.unscan();
        let again = parser.scan();
        assert_eq!(again, token);

        let token = parser.scan();
        assert_eq!(token.kind, TokenKind::Whitespace);
    }

    #[test]
    fn scan_ignore_whitespace() {
        let mut parser = Parser::new(None, " 10 + 12 ");
        let expected = [
            (TokenKind::Digits, "10"),
            (TokenKind::Plus, "+"),
            (TokenKind::Digits, "12"),
            (TokenKind::Eof, ""),
        ];
        for (kind, literal) in expected {
            let token = parser.scan_ignore_whitespace();
            assert_eq!((token.kind, token.literal), (kind, literal));
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let mut parser = Parser::new(None, "1+2");

        let token = parser.peek();
        assert_eq!((token.kind, token.literal), (TokenKind::Digits, "1"));
        assert_eq!(parser.peek(), token);

        let token = parser.scan();
        assert_eq!((token.kind, token.literal), (TokenKind::Digits, "1"));

        let token = parser.peek();
        assert_eq!((token.kind, token.literal), (TokenKind::Plus, "+"));
    }

    #[test]
    fn peek_skips_whitespace() {
        let mut parser = Parser::new(None, "  \t7");
        let token = parser.peek();
        assert_eq!((token.kind, token.literal, token.offset), (TokenKind::Digits, "7", 3));
        assert_eq!(parser.scan(), token);
        assert_eq!(parser.scan().kind, TokenKind::Eof);
    }

    #[test]
    fn empty_input_fails_everywhere() {
        type Routine = fn(&mut Parser<'static>) -> Result<(), ParseError>;
        let routines: [Routine; 8] = [
            |p| p.parse_expression().map(drop),
            |p| p.parse_factor().map(drop),
            |p| p.parse_power().map(drop),
            |p| p.parse_term().map(drop),
            |p| p.parse_number().map(drop),
            |p| p.parse_add_op().map(drop),
            |p| p.parse_multiply_op().map(drop),
            |p| p.parse_exponent_op().map(drop),
        ];
        for routine in routines {
            let mut parser = Parser::new(None, "");
            let err = routine(&mut parser).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        }
    }

    #[test]
    fn exponent_op() {
        let mut parser = Parser::new(None, "^");
        assert_eq!(parser.parse_exponent_op().unwrap(), ExponentOp::Power);

        let mut parser = Parser::new(None, " ");
        assert!(parser.parse_exponent_op().is_err());

        let mut parser = Parser::new(None, "*");
        let err = parser.parse_exponent_op().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn multiply_ops_in_sequence() {
        let mut parser = Parser::new(None, "*/%\\");
        for expected in [
            MultiplyOp::Multiply,
            MultiplyOp::Divide,
            MultiplyOp::Modulo,
            MultiplyOp::IntDivide,
        ] {
            assert_eq!(parser.parse_multiply_op().unwrap(), expected);
        }

        let mut parser = Parser::new(None, " ");
        assert!(parser.parse_multiply_op().is_err());

        let mut parser = Parser::new(None, "+");
        assert!(matches!(
            parser.parse_multiply_op(),
            Err(ParseError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn add_ops_in_sequence() {
        let mut parser = Parser::new(None, "+ -");
        assert_eq!(parser.parse_add_op().unwrap(), AddOp::Add);
        assert_eq!(parser.parse_add_op().unwrap(), AddOp::Subtract);

        let mut parser = Parser::new(None, " ");
        assert!(parser.parse_add_op().is_err());

        let mut parser = Parser::new(None, "^");
        let err = parser.parse_add_op().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("additive"));
    }

    #[rstest]
    #[case("10", 10, 1)]
    #[case("0.5", 1, 2)]
    #[case("2.5", 5, 2)]
    #[case("0.125", 1, 8)]
    #[case("100.00", 100, 1)]
    fn numbers_are_exact(#[case] text: &str, #[case] numer: i64, #[case] denom: i64) {
        let mut parser = Parser::new(None, text);
        let number = parser.parse_number().unwrap();
        assert_eq!(number.text(), text);
        assert_eq!(number.value(), &ratio(numer, denom));
    }

    #[test]
    fn number_requires_digits() {
        let mut parser = Parser::new(None, " ");
        assert!(parser.parse_number().is_err());

        let mut parser = Parser::new(None, "(1)");
        let err = parser.parse_number().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn number_requires_fraction_after_dot() {
        for input in ["1.", "1.+2", "1.x"] {
            let mut parser = Parser::new(None, input);
            assert!(matches!(
                parser.parse_number(),
                Err(ParseError::ExpectedFractionalDigits { .. })
            ));
        }
    }

    #[test]
    fn number_stops_before_operator() {
        let mut parser = Parser::new(None, "3.75*2");
        let number = parser.parse_number().unwrap();
        assert_eq!(number.text(), "3.75");
        assert_eq!(parser.peek().kind, TokenKind::Star);
    }

    #[test]
    fn non_decimal_digits_fail_conversion() {
        let mut parser = Parser::new(None, "١٢");
        let err = parser.parse_number().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NumberConversion);
        assert!(matches!(err, ParseError::InvalidNumber { ref text, .. } if text == "١٢"));
    }

    #[test]
    fn term_number_or_group() {
        let mut parser = Parser::new(None, "10");
        let term = parser.parse_term().unwrap();
        assert!(term.group().is_none());
        assert_eq!(term.number().unwrap().text(), "10");

        let mut parser = Parser::new(None, "(10)");
        let term = parser.parse_term().unwrap();
        assert!(term.number().is_none());
        let inner = term.group().unwrap();
        assert_eq!(inner.head().head().head().number().unwrap().text(), "10");
    }

    #[test]
    fn term_missing_right_paren() {
        let mut parser = Parser::new(None, "(10");
        assert!(matches!(
            parser.parse_term(),
            Err(ParseError::MissingRightParen { .. })
        ));

        let mut parser = Parser::new(None, "(1 2)");
        assert!(matches!(
            parser.parse_term(),
            Err(ParseError::MissingRightParen { .. })
        ));
    }

    #[test]
    fn term_rejects_other_tokens() {
        let mut parser = Parser::new(None, "abc");
        let err = parser.parse_term().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref found, .. } if found.contains("abc")));

        let mut parser = Parser::new(None, "-1");
        assert_eq!(parser.parse_term().unwrap_err().kind(), ErrorKind::Syntax);

        let mut parser = Parser::new(None, "#");
        assert!(matches!(
            parser.parse_term(),
            Err(ParseError::IllegalCharacter { ch: '#', .. })
        ));
    }

    #[test]
    fn power_chains() {
        let mut parser = Parser::new(None, "10");
        let pow = parser.parse_power().unwrap();
        assert!(pow.tail().is_none());
        assert_eq!(pow.head().number().unwrap().text(), "10");

        let mut parser = Parser::new(None, "10^2");
        let pow = parser.parse_power().unwrap();
        assert_eq!(pow.head().number().unwrap().text(), "10");
        let (op, rest) = pow.tail().unwrap();
        assert_eq!(op, ExponentOp::Power);
        assert_eq!(rest.head().number().unwrap().text(), "2");

        let mut parser = Parser::new(None, "10^");
        assert_eq!(
            parser.parse_power().unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn factor_chains() {
        let mut parser = Parser::new(None, "10");
        let fac = parser.parse_factor().unwrap();
        assert!(fac.tail().is_none());

        let mut parser = Parser::new(None, "10*2");
        let fac = parser.parse_factor().unwrap();
        assert_eq!(fac.head().head().number().unwrap().text(), "10");
        let (op, rest) = fac.tail().unwrap();
        assert_eq!(op, MultiplyOp::Multiply);
        assert_eq!(rest.head().head().number().unwrap().text(), "2");

        let mut parser = Parser::new(None, "10/");
        assert_eq!(
            parser.parse_factor().unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn expression_chains() {
        let mut parser = Parser::new(None, "10");
        let exp = parser.parse_expression().unwrap();
        assert!(exp.tail().is_none());

        let mut parser = Parser::new(None, "10+2");
        let exp = parser.parse_expression().unwrap();
        let (op, rest) = exp.tail().unwrap();
        assert_eq!(op, AddOp::Add);
        assert_eq!(rest.head().head().head().number().unwrap().text(), "2");

        let mut parser = Parser::new(None, "10+");
        assert_eq!(
            parser.parse_expression().unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }

    #[rstest]
    #[case("1-2-3", "(- 1 (- 2 3))")]
    #[case("8/4/2", "(/ 8 (/ 4 2))")]
    #[case("2^3^2", "(^ 2 (^ 3 2))")]
    #[case("1+2*3", "(+ 1 (* 2 3))")]
    #[case("(1+2)*3", "(* (group (+ 1 2)) 3)")]
    #[case("7 % 4 \\ 2", "(% 7 (\\ 4 2))")]
    #[case(" ( 1.5 ) ", "(group 1.5)")]
    fn chains_nest_to_the_right(#[case] input: &str, #[case] expected: &str) {
        let tree = Parser::new(None, input).parse().unwrap();
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn parse_rejects_trailing_input() {
        let err = Parser::new(None, "1 2").parse().unwrap_err();
        assert!(matches!(err, ParseError::TrailingInput { ref found, .. } if found == "2"));

        let err = Parser::new(None, "(1))").parse().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);

        let err = Parser::new(None, "1 + 2 ?").parse().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalCharacter);
    }

    #[test]
    fn error_spans_point_at_offending_token() {
        let err = Parser::new(None, "1 + x").parse().unwrap_err();
        assert_eq!(err.span(), SourceSpan::from(4..5));

        let err = Parser::new(None, "(1 + 2").parse().unwrap_err();
        assert_eq!(err.span(), SourceSpan::from(6..6));
    }

    fn nested(depth: usize) -> String {
        format!("{}1{}", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let tree = Parser::new(None, &nested(MAX_NESTING)).parse().unwrap();
        assert_eq!(tree.to_source(), nested(MAX_NESTING));

        let side_by_side = format!("{}+{}", nested(MAX_NESTING), nested(MAX_NESTING));
        assert!(Parser::new(None, &side_by_side).parse().is_ok());
    }

    #[test]
    fn nesting_past_the_limit_fails() {
        let err = Parser::new(None, &nested(MAX_NESTING + 1)).parse().unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { limit: MAX_NESTING, .. }));
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.span(), SourceSpan::from(MAX_NESTING..MAX_NESTING + 1));

        let err = Parser::new(None, &nested(50_000)).parse().unwrap_err();
        assert!(matches!(err, ParseError::NestingTooDeep { .. }));
    }

    #[test]
    fn long_chains_do_not_recurse() {
        let input = vec!["1"; 200_000].join("+");
        let tree = Parser::new(None, &input).parse().unwrap();
        let (head, rest) = tree.flatten();
        assert_eq!(head.head().head().number().unwrap().text(), "1");
        assert_eq!(rest.len(), 199_999);
        assert!(rest.iter().all(|(op, _)| *op == AddOp::Add));

        let copy = tree.clone();
        assert!(copy == tree);
        assert_eq!(copy.to_source(), input);
        drop(copy);
        drop(tree);
    }
}
