//! Syntax tree for the arithmetic grammar.
//!
//! ```text
//! Expression  = Factor | Factor AddOp Expression ;
//! Factor      = Power | Power MultiplyOp Factor ;
//! Power       = Term | Term ExponentOp Power ;
//! Term        = '(' Expression ')' | Number ;
//! Number      = Digits | Digits '.' Digits ;
//! ```
//!
//! Precedence lives in the nesting of the productions: an `Expression` chains
//! `Factor`s with additive operators, a `Factor` chains `Power`s with multiplicative
//! ones and a `Power` chains `Term`s with `^`. Every chain is right-nested, so
//! `1 - 2 - 3` is `Chain(1, -, Chain(2, -, Single(3)))`.
//!
//! `Clone`, `PartialEq` and `Drop` walk a chain in a loop, so a run of any length is safe to
//! copy, compare and free. The derived `Debug` nests once per link; prefer `Display` for long
//! chains.

use std::fmt::{self, Display};
use std::mem;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;

use crate::lex::TokenKind;
use crate::number::{NumberError, parse_decimal};

#[derive(Debug)]
pub enum Expression {
    Single(Factor),
    Chain(Factor, AddOp, Box<Expression>),
}

#[derive(Debug)]
pub enum Factor {
    Single(Power),
    Chain(Power, MultiplyOp, Box<Factor>),
}

#[derive(Debug)]
pub enum Power {
    Single(Term),
    Chain(Term, ExponentOp, Box<Power>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Group(Box<Expression>),
    Number(Number),
}

/// A numeric literal: its verbatim source text and the exact value it denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Number {
    text: String,
    value: BigRational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddOp {
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiplyOp {
    Multiply,
    Divide,
    IntDivide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExponentOp {
    Power,
}

/// A production of the form `Operand | Operand Op Self`.
pub trait Chained: Sized {
    type Operand;
    type Op: Copy + Display;

    fn single(operand: Self::Operand) -> Self;

    fn chain(operand: Self::Operand, op: Self::Op, rest: Self) -> Self;

    /// The mandatory left operand and, when present, the operator with its continuation.
    fn parts(&self) -> (&Self::Operand, Option<(Self::Op, &Self)>);

    fn head(&self) -> &Self::Operand {
        self.parts().0
    }

    fn tail(&self) -> Option<(Self::Op, &Self)> {
        self.parts().1
    }

    /// Builds the right-nested chain `head op1 (x1 op2 (x2 ...))` from operands in source order.
    fn from_chain(head: Self::Operand, rest: Vec<(Self::Op, Self::Operand)>) -> Self {
        let mut rest = rest.into_iter().rev();
        let Some((mut op, last)) = rest.next() else {
            return Self::single(head);
        };
        let mut acc = Self::single(last);
        for (prev_op, operand) in rest {
            acc = Self::chain(operand, op, acc);
            op = prev_op;
        }
        Self::chain(head, op, acc)
    }

    /// The operands in source order, for consumers that want to walk the chain left to right.
    fn flatten(&self) -> (&Self::Operand, Vec<(Self::Op, &Self::Operand)>) {
        let (head, mut tail) = self.parts();
        let mut rest = Vec::new();
        while let Some((op, node)) = tail {
            let (operand, next) = node.parts();
            rest.push((op, operand));
            tail = next;
        }
        (head, rest)
    }
}

impl Chained for Expression {
    type Operand = Factor;
    type Op = AddOp;

    fn single(operand: Factor) -> Self {
        Expression::Single(operand)
    }

    fn chain(operand: Factor, op: AddOp, rest: Self) -> Self {
        Expression::Chain(operand, op, Box::new(rest))
    }

    fn parts(&self) -> (&Factor, Option<(AddOp, &Self)>) {
        match self {
            Expression::Single(factor) => (factor, None),
            Expression::Chain(factor, op, rest) => (factor, Some((*op, &**rest))),
        }
    }
}

impl Chained for Factor {
    type Operand = Power;
    type Op = MultiplyOp;

    fn single(operand: Power) -> Self {
        Factor::Single(operand)
    }

    fn chain(operand: Power, op: MultiplyOp, rest: Self) -> Self {
        Factor::Chain(operand, op, Box::new(rest))
    }

    fn parts(&self) -> (&Power, Option<(MultiplyOp, &Self)>) {
        match self {
            Factor::Single(power) => (power, None),
            Factor::Chain(power, op, rest) => (power, Some((*op, &**rest))),
        }
    }
}

impl Chained for Power {
    type Operand = Term;
    type Op = ExponentOp;

    fn single(operand: Term) -> Self {
        Power::Single(operand)
    }

    fn chain(operand: Term, op: ExponentOp, rest: Self) -> Self {
        Power::Chain(operand, op, Box::new(rest))
    }

    fn parts(&self) -> (&Term, Option<(ExponentOp, &Self)>) {
        match self {
            Power::Single(term) => (term, None),
            Power::Chain(term, op, rest) => (term, Some((*op, &**rest))),
        }
    }
}

fn clone_chain<C>(node: &C) -> C
where
    C: Chained,
    C::Operand: Clone,
{
    let (head, rest) = node.flatten();
    let rest = rest
        .into_iter()
        .map(|(op, operand)| (op, operand.clone()))
        .collect();
    C::from_chain(head.clone(), rest)
}

fn chains_equal<C>(a: &C, b: &C) -> bool
where
    C: Chained,
    C::Operand: PartialEq,
    C::Op: PartialEq,
{
    a.flatten() == b.flatten()
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        clone_chain(self)
    }
}

impl Clone for Factor {
    fn clone(&self) -> Self {
        clone_chain(self)
    }
}

impl Clone for Power {
    fn clone(&self) -> Self {
        clone_chain(self)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        chains_equal(self, other)
    }
}

impl PartialEq for Factor {
    fn eq(&self, other: &Self) -> bool {
        chains_equal(self, other)
    }
}

impl PartialEq for Power {
    fn eq(&self, other: &Self) -> bool {
        chains_equal(self, other)
    }
}

// The drop impls detach each continuation before it is freed, leaving a hollow `Single` in its
// place, so the derived glue only ever sees one link at a time.
impl Drop for Expression {
    fn drop(&mut self) {
        let Expression::Chain(_, _, rest) = self else {
            return;
        };
        let mut next = mem::replace(&mut **rest, Expression::hollow());
        while let Expression::Chain(_, _, rest) = &mut next {
            next = mem::replace(&mut **rest, Expression::hollow());
        }
    }
}

impl Drop for Factor {
    fn drop(&mut self) {
        let Factor::Chain(_, _, rest) = self else {
            return;
        };
        let mut next = mem::replace(&mut **rest, Factor::hollow());
        while let Factor::Chain(_, _, rest) = &mut next {
            next = mem::replace(&mut **rest, Factor::hollow());
        }
    }
}

impl Drop for Power {
    fn drop(&mut self) {
        let Power::Chain(_, _, rest) = self else {
            return;
        };
        let mut next = mem::replace(&mut **rest, Power::hollow());
        while let Power::Chain(_, _, rest) = &mut next {
            next = mem::replace(&mut **rest, Power::hollow());
        }
    }
}

impl Expression {
    fn hollow() -> Self {
        Expression::Single(Factor::hollow())
    }

    /// Reconstructs the source text without whitespace, using each number's original text.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_source(&mut out);
        out
    }
}

impl Factor {
    fn hollow() -> Self {
        Factor::Single(Power::hollow())
    }
}

impl Power {
    fn hollow() -> Self {
        Power::Single(Term::Number(Number::hollow()))
    }
}

impl Term {
    pub fn group(&self) -> Option<&Expression> {
        match self {
            Term::Group(expression) => Some(&**expression),
            Term::Number(_) => None,
        }
    }

    pub fn number(&self) -> Option<&Number> {
        match self {
            Term::Group(_) => None,
            Term::Number(number) => Some(number),
        }
    }
}

impl Number {
    pub fn new(text: impl Into<String>, value: BigRational) -> Self {
        Number {
            text: text.into(),
            value,
        }
    }

    /// Parses `digits` or `digits.digits` into a number that keeps `text` verbatim.
    pub fn parse(text: &str) -> Result<Self, NumberError> {
        let value = parse_decimal(text)?;
        Ok(Number::new(text, value))
    }

    // Owns no heap memory; only fills a link that is about to be freed.
    fn hollow() -> Self {
        Number {
            text: String::new(),
            value: BigRational::new_raw(BigInt::zero(), BigInt::zero()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> &BigRational {
        &self.value
    }
}

impl AddOp {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Plus => Some(AddOp::Add),
            TokenKind::Minus => Some(AddOp::Subtract),
            _ => None,
        }
    }

    pub fn token(self) -> TokenKind {
        match self {
            AddOp::Add => TokenKind::Plus,
            AddOp::Subtract => TokenKind::Minus,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AddOp::Add => "+",
            AddOp::Subtract => "-",
        }
    }
}

impl MultiplyOp {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Star => Some(MultiplyOp::Multiply),
            TokenKind::Slash => Some(MultiplyOp::Divide),
            TokenKind::Backslash => Some(MultiplyOp::IntDivide),
            TokenKind::Percent => Some(MultiplyOp::Modulo),
            _ => None,
        }
    }

    pub fn token(self) -> TokenKind {
        match self {
            MultiplyOp::Multiply => TokenKind::Star,
            MultiplyOp::Divide => TokenKind::Slash,
            MultiplyOp::IntDivide => TokenKind::Backslash,
            MultiplyOp::Modulo => TokenKind::Percent,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            MultiplyOp::Multiply => "*",
            MultiplyOp::Divide => "/",
            MultiplyOp::IntDivide => "\\",
            MultiplyOp::Modulo => "%",
        }
    }
}

impl ExponentOp {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Caret => Some(ExponentOp::Power),
            _ => None,
        }
    }

    pub fn token(self) -> TokenKind {
        TokenKind::Caret
    }

    pub fn symbol(self) -> &'static str {
        "^"
    }
}

impl Display for AddOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Display for MultiplyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Display for ExponentOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// Prefix form: `(op lhs rhs)` per chain link. Walks the chain in a loop so long
// same-precedence runs do not recurse.
fn fmt_chain<C>(node: &C, f: &mut fmt::Formatter<'_>) -> fmt::Result
where
    C: Chained,
    C::Operand: Display,
{
    let mut node = node;
    let mut open = 0usize;
    loop {
        match node.parts() {
            (operand, None) => {
                write!(f, "{operand}")?;
                break;
            }
            (operand, Some((op, rest))) => {
                write!(f, "({op} {operand} ")?;
                open += 1;
                node = rest;
            }
        }
    }
    for _ in 0..open {
        f.write_str(")")?;
    }
    Ok(())
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_chain(self, f)
    }
}

impl Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_chain(self, f)
    }
}

impl Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_chain(self, f)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Group(expression) => write!(f, "(group {expression})"),
            Term::Number(number) => write!(f, "{number}"),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

trait WriteSource {
    fn write_source(&self, out: &mut String);
}

fn write_chain_source<C>(node: &C, out: &mut String)
where
    C: Chained,
    C::Operand: WriteSource,
{
    let (head, rest) = node.flatten();
    head.write_source(out);
    for (op, operand) in rest {
        out.push_str(&op.to_string());
        operand.write_source(out);
    }
}

impl WriteSource for Expression {
    fn write_source(&self, out: &mut String) {
        write_chain_source(self, out);
    }
}

impl WriteSource for Factor {
    fn write_source(&self, out: &mut String) {
        write_chain_source(self, out);
    }
}

impl WriteSource for Power {
    fn write_source(&self, out: &mut String) {
        write_chain_source(self, out);
    }
}

impl WriteSource for Term {
    fn write_source(&self, out: &mut String) {
        match self {
            Term::Group(expression) => {
                out.push('(');
                expression.write_source(out);
                out.push(')');
            }
            Term::Number(number) => out.push_str(number.text()),
        }
    }
}
