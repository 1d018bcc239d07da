//! XSD datatype handling: lexical validation and value-space comparison
//!
//! `value_compare` is deliberately partial. Range constraints treat an
//! incomparable pair as "constraint not satisfied" (fail-closed), so this
//! module returns `None` rather than inventing an ordering for, say, a
//! date against an integer.

use crate::term::Literal;
use crate::vocab::xsd;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime};
use num_bigint::BigInt;
use std::cmp::Ordering;
use std::str::FromStr;

/// Is this datatype in the xsd decimal/integer family?
pub fn is_decimal_family(datatype: &str) -> bool {
    matches!(
        datatype,
        xsd::DECIMAL
            | xsd::INTEGER
            | xsd::LONG
            | xsd::INT
            | xsd::SHORT
            | xsd::BYTE
            | xsd::NON_NEGATIVE_INTEGER
            | xsd::NON_POSITIVE_INTEGER
            | xsd::NEGATIVE_INTEGER
            | xsd::POSITIVE_INTEGER
            | xsd::UNSIGNED_LONG
            | xsd::UNSIGNED_INT
            | xsd::UNSIGNED_SHORT
            | xsd::UNSIGNED_BYTE
    )
}

/// Is this datatype numeric (decimal family or floating point)?
pub fn is_numeric(datatype: &str) -> bool {
    is_decimal_family(datatype) || matches!(datatype, xsd::DOUBLE | xsd::FLOAT)
}

/// Parse an xsd:double/xsd:float lexical form, including the INF/NaN forms
fn parse_xsd_double(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

/// Compare two literals in value space
///
/// Returns `None` when the operands are not comparable: mismatched value
/// families, unparseable lexical forms, NaN, or datatypes this engine has
/// no ordering for.
pub fn value_compare(a: &Literal, b: &Literal) -> Option<Ordering> {
    let (dta, dtb) = (a.datatype().as_str(), b.datatype().as_str());

    // Numeric promotion: any float operand lifts both sides to f64,
    // otherwise exact decimal comparison.
    if is_numeric(dta) && is_numeric(dtb) {
        if matches!(dta, xsd::DOUBLE | xsd::FLOAT) || matches!(dtb, xsd::DOUBLE | xsd::FLOAT) {
            let x = parse_xsd_double(a.lexical())?;
            let y = parse_xsd_double(b.lexical())?;
            return x.partial_cmp(&y);
        }
        let x = BigDecimal::from_str(a.lexical()).ok()?;
        let y = BigDecimal::from_str(b.lexical()).ok()?;
        return Some(x.cmp(&y));
    }

    match (dta, dtb) {
        (xsd::DATE_TIME, xsd::DATE_TIME) => {
            let x = DateTime::parse_from_rfc3339(a.lexical()).ok()?;
            let y = DateTime::parse_from_rfc3339(b.lexical()).ok()?;
            Some(x.cmp(&y))
        }
        (xsd::DATE, xsd::DATE) => {
            let x = NaiveDate::from_str(a.lexical()).ok()?;
            let y = NaiveDate::from_str(b.lexical()).ok()?;
            Some(x.cmp(&y))
        }
        (xsd::TIME, xsd::TIME) => {
            let x = NaiveTime::from_str(a.lexical()).ok()?;
            let y = NaiveTime::from_str(b.lexical()).ok()?;
            Some(x.cmp(&y))
        }
        (xsd::BOOLEAN, xsd::BOOLEAN) => {
            let x = parse_boolean(a.lexical())?;
            let y = parse_boolean(b.lexical())?;
            Some(x.cmp(&y))
        }
        (xsd::STRING, xsd::STRING) => Some(a.lexical().cmp(b.lexical())),
        _ => None,
    }
}

fn parse_boolean(lexical: &str) -> Option<bool> {
    match lexical {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Does the lexical form belong to the datatype's lexical space?
///
/// Datatypes outside the recognized XSD core are accepted as-is: the engine
/// cannot validate lexical spaces it does not know, and sh:datatype on an
/// unknown datatype only checks the datatype IRI.
pub fn valid_lexical(datatype: &str, lexical: &str) -> bool {
    match datatype {
        xsd::STRING => true,
        xsd::BOOLEAN => parse_boolean(lexical).is_some(),
        xsd::DECIMAL => BigDecimal::from_str(lexical).is_ok(),
        xsd::DOUBLE | xsd::FLOAT => parse_xsd_double(lexical).is_some(),
        xsd::DATE_TIME => DateTime::parse_from_rfc3339(lexical).is_ok(),
        xsd::DATE => NaiveDate::from_str(lexical).is_ok(),
        xsd::TIME => NaiveTime::from_str(lexical).is_ok(),
        dt if is_decimal_family(dt) => {
            let Ok(value) = BigInt::from_str(lexical) else {
                return false;
            };
            integer_in_range(dt, &value)
        }
        _ => true,
    }
}

fn integer_in_range(datatype: &str, value: &BigInt) -> bool {
    use num_bigint::Sign;
    match datatype {
        xsd::INTEGER => true,
        xsd::LONG => *value >= BigInt::from(i64::MIN) && *value <= BigInt::from(i64::MAX),
        xsd::INT => *value >= BigInt::from(i32::MIN) && *value <= BigInt::from(i32::MAX),
        xsd::SHORT => *value >= BigInt::from(i16::MIN) && *value <= BigInt::from(i16::MAX),
        xsd::BYTE => *value >= BigInt::from(i8::MIN) && *value <= BigInt::from(i8::MAX),
        xsd::NON_NEGATIVE_INTEGER => value.sign() != Sign::Minus,
        xsd::NON_POSITIVE_INTEGER => value.sign() != Sign::Plus,
        xsd::NEGATIVE_INTEGER => value.sign() == Sign::Minus,
        xsd::POSITIVE_INTEGER => value.sign() == Sign::Plus,
        xsd::UNSIGNED_LONG => value.sign() != Sign::Minus && *value <= BigInt::from(u64::MAX),
        xsd::UNSIGNED_INT => value.sign() != Sign::Minus && *value <= BigInt::from(u32::MAX),
        xsd::UNSIGNED_SHORT => value.sign() != Sign::Minus && *value <= BigInt::from(u16::MAX),
        xsd::UNSIGNED_BYTE => value.sign() != Sign::Minus && *value <= BigInt::from(u8::MAX),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(lex: &str) -> Literal {
        Literal::typed(lex, crate::Iri::new(xsd::INTEGER))
    }

    fn dec(lex: &str) -> Literal {
        Literal::typed(lex, crate::Iri::new(xsd::DECIMAL))
    }

    fn dbl(lex: &str) -> Literal {
        Literal::typed(lex, crate::Iri::new(xsd::DOUBLE))
    }

    #[test]
    fn numeric_promotion_across_families() {
        assert_eq!(value_compare(&int("2"), &dec("2.0")), Some(Ordering::Equal));
        assert_eq!(value_compare(&int("2"), &dbl("2.5")), Some(Ordering::Less));
        assert_eq!(
            value_compare(&dec("10.0"), &int("9")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn nan_is_incomparable() {
        assert_eq!(value_compare(&dbl("NaN"), &dbl("1.0")), None);
    }

    #[test]
    fn cross_family_is_incomparable() {
        let date = Literal::typed("2024-01-01", crate::Iri::new(xsd::DATE));
        assert_eq!(value_compare(&int("5"), &date), None);
        assert_eq!(value_compare(&Literal::string("5"), &int("5")), None);
    }

    #[test]
    fn garbage_lexical_is_incomparable() {
        assert_eq!(value_compare(&int("abc"), &int("1")), None);
    }

    #[test]
    fn datetime_comparison() {
        let a = Literal::typed("2024-01-01T00:00:00Z", crate::Iri::new(xsd::DATE_TIME));
        let b = Literal::typed("2024-06-01T00:00:00Z", crate::Iri::new(xsd::DATE_TIME));
        assert_eq!(value_compare(&a, &b), Some(Ordering::Less));
    }

    #[test]
    fn lexical_validation() {
        assert!(valid_lexical(xsd::INTEGER, "42"));
        assert!(valid_lexical(xsd::INTEGER, "-7"));
        assert!(!valid_lexical(xsd::INTEGER, "abc"));
        assert!(!valid_lexical(xsd::INTEGER, "1.5"));
        assert!(!valid_lexical(xsd::NON_NEGATIVE_INTEGER, "-1"));
        assert!(!valid_lexical(xsd::BYTE, "300"));
        assert!(valid_lexical(xsd::DOUBLE, "-INF"));
        assert!(!valid_lexical(xsd::BOOLEAN, "yes"));
        // Unknown datatypes are accepted as-is
        assert!(valid_lexical("http://ex/custom", "anything"));
    }
}
