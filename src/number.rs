//! Exact conversion of decimal literal text into rationals.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Pow};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumberError {
    #[error("numeric literal is empty")]
    Empty,

    #[error("'{ch}' at position {position} is not a decimal digit")]
    InvalidDigit { ch: char, position: usize },

    #[error("missing digits after the decimal point")]
    MissingFraction,
}

/// Converts `digits` or `digits.digits` into the exact rational it denotes.
///
/// Only ASCII decimal digits are accepted. The result is always in lowest terms,
/// so `"2.50"` and `"2.5"` both yield `5/2`.
pub fn parse_decimal(text: &str) -> Result<BigRational, NumberError> {
    let (integral, fractional) = match text.split_once('.') {
        Some((integral, fractional)) => {
            if fractional.is_empty() {
                return Err(NumberError::MissingFraction);
            }
            (integral, fractional)
        }
        None => (text, ""),
    };

    if integral.is_empty() {
        return Err(NumberError::Empty);
    }
    check_digits(integral, 0)?;
    check_digits(fractional, integral.len() + 1)?;

    let mut digits = String::with_capacity(integral.len() + fractional.len());
    digits.push_str(integral);
    digits.push_str(fractional);

    let numerator = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or(NumberError::Empty)?;
    let denominator = if fractional.is_empty() {
        BigInt::one()
    } else {
        Pow::pow(BigInt::from(10u32), fractional.len())
    };

    Ok(BigRational::new(numerator, denominator))
}

fn check_digits(digits: &str, offset: usize) -> Result<(), NumberError> {
    match digits.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, ch)) => Err(NumberError::InvalidDigit {
            ch,
            position: offset + i,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(numer: i64, denom: i64) -> BigRational {
        BigRational::new(BigInt::from(numer), BigInt::from(denom))
    }

    #[test]
    fn integers_are_whole() {
        assert_eq!(parse_decimal("10").unwrap(), ratio(10, 1));
        assert_eq!(parse_decimal("0").unwrap(), ratio(0, 1));
        assert_eq!(parse_decimal("007").unwrap(), ratio(7, 1));
    }

    #[test]
    fn fractions_are_exact() {
        assert_eq!(parse_decimal("0.5").unwrap(), ratio(1, 2));
        assert_eq!(parse_decimal("2.5").unwrap(), ratio(5, 2));
        assert_eq!(parse_decimal("0.1").unwrap(), ratio(1, 10));
        assert_eq!(parse_decimal("3.14159").unwrap(), ratio(314159, 100000));
        assert_eq!(parse_decimal("2.50").unwrap(), ratio(5, 2));
    }

    #[test]
    fn digits_beyond_machine_width() {
        let value = parse_decimal("123456789012345678901234567890.000000000000000000001").unwrap();
        let numer: BigInt = "123456789012345678901234567890000000000000000000001"
            .parse()
            .unwrap();
        let denom = Pow::pow(BigInt::from(10u32), 21usize);
        assert_eq!(value, BigRational::new(numer, denom));
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(parse_decimal(""), Err(NumberError::Empty));
        assert_eq!(parse_decimal(".5"), Err(NumberError::Empty));
        assert_eq!(parse_decimal("1."), Err(NumberError::MissingFraction));
        assert_eq!(
            parse_decimal("1.2.3"),
            Err(NumberError::InvalidDigit {
                ch: '.',
                position: 3
            })
        );
        assert_eq!(
            parse_decimal("1٣"),
            Err(NumberError::InvalidDigit {
                ch: '٣',
                position: 1
            })
        );
    }
}
