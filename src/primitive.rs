//! Wire formats of primitive values.
//!
//! | Kind | JSON form |
//! |------|-----------|
//! | Boolean | `true` / `false` |
//! | Byte, SByte, Int16, Int32 | number |
//! | Int64, Decimal | number, or string under IEEE754 compatibility |
//! | Single, Double | number; `"INF"`, `"-INF"`, `"NaN"` when not finite |
//! | Date | `"2024-01-15"` |
//! | DateTimeOffset | RFC 3339, `"2024-01-15T10:30:00Z"` |
//! | TimeOfDay | `"10:30:00.1234567"` |
//! | Duration | ISO 8601, `"P1DT2H3M4.5S"` |
//! | Guid | `"0f8fad5b-d9cb-469f-a165-70867728950e"` |
//! | Binary | base64 string |
//!
//! Finite doubles always carry a fraction or exponent (`1.0`, `1e20`) so the
//! plain JSON number reads back as a Double rather than an integer.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Timelike};
use uuid::Uuid;

use crate::edm::PrimitiveKind;
use crate::lexer::JsonScalar;
use crate::{Error, PrimitiveValue, Result};

pub const POSITIVE_INFINITY: &str = "INF";
pub const NEGATIVE_INFINITY: &str = "-INF";
pub const NOT_A_NUMBER: &str = "NaN";

/// Formats a primitive as the JSON scalar it travels as.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::lexer::JsonScalar;
/// use odata_json_light::primitive::format_primitive;
/// use odata_json_light::PrimitiveValue;
///
/// assert_eq!(
///     format_primitive(&PrimitiveValue::Double(2.0), false).unwrap(),
///     JsonScalar::Number("2.0".into())
/// );
/// assert_eq!(
///     format_primitive(&PrimitiveValue::Double(f64::NEG_INFINITY), false).unwrap(),
///     JsonScalar::String("-INF".into())
/// );
/// assert_eq!(
///     format_primitive(&PrimitiveValue::Int64(7), true).unwrap(),
///     JsonScalar::String("7".into())
/// );
/// ```
pub fn format_primitive(value: &PrimitiveValue, ieee754_compatible: bool) -> Result<JsonScalar> {
    let scalar = match value {
        PrimitiveValue::Binary(bytes) => JsonScalar::String(STANDARD.encode(bytes)),
        PrimitiveValue::Boolean(b) => JsonScalar::Bool(*b),
        PrimitiveValue::Byte(v) => JsonScalar::Number(v.to_string()),
        PrimitiveValue::SByte(v) => JsonScalar::Number(v.to_string()),
        PrimitiveValue::Int16(v) => JsonScalar::Number(v.to_string()),
        PrimitiveValue::Int32(v) => JsonScalar::Number(v.to_string()),
        PrimitiveValue::Int64(v) if ieee754_compatible => JsonScalar::String(v.to_string()),
        PrimitiveValue::Int64(v) => JsonScalar::Number(v.to_string()),
        PrimitiveValue::Decimal(text) => {
            if !is_decimal_text(text) {
                return Err(Error::invalid_primitive("Edm.Decimal", text));
            }
            if ieee754_compatible {
                JsonScalar::String(text.clone())
            } else {
                JsonScalar::Number(text.clone())
            }
        }
        PrimitiveValue::Double(d) => format_float(*d, format!("{:?}", d)),
        PrimitiveValue::Single(s) => format_float(f64::from(*s), format!("{:?}", s)),
        PrimitiveValue::String(s) => JsonScalar::String(s.clone()),
        PrimitiveValue::Date(d) => JsonScalar::String(d.format("%Y-%m-%d").to_string()),
        PrimitiveValue::DateTimeOffset(dt) => {
            JsonScalar::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        PrimitiveValue::TimeOfDay(t) => JsonScalar::String(format_time_of_day(t)),
        PrimitiveValue::Duration(d) => JsonScalar::String(format_duration(d)),
        PrimitiveValue::Guid(g) => JsonScalar::String(g.hyphenated().to_string()),
    };
    Ok(scalar)
}

fn format_float(value: f64, finite_text: String) -> JsonScalar {
    if value.is_nan() {
        JsonScalar::String(NOT_A_NUMBER.to_string())
    } else if value.is_infinite() && value > 0.0 {
        JsonScalar::String(POSITIVE_INFINITY.to_string())
    } else if value.is_infinite() {
        JsonScalar::String(NEGATIVE_INFINITY.to_string())
    } else {
        JsonScalar::Number(finite_text)
    }
}

fn is_decimal_text(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (&unsigned[..pos], Some(&unsigned[pos + 1..])),
        None => (unsigned, None),
    };
    let (int, frac) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let exponent_ok = exponent
        .map(|e| digits(e.strip_prefix(['+', '-']).unwrap_or(e)))
        .unwrap_or(true);
    digits(int) && frac.map(digits).unwrap_or(true) && exponent_ok
}

fn format_time_of_day(time: &NaiveTime) -> String {
    let base = time.format("%H:%M:%S").to_string();
    let ticks = time.nanosecond() % 1_000_000_000 / 100;
    if ticks == 0 {
        return base;
    }
    let fraction = format!("{:07}", ticks);
    format!("{}.{}", base, fraction.trim_end_matches('0'))
}

/// Formats a duration as ISO 8601 `[-]PnDTnHnMn.nS`.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::primitive::format_duration;
///
/// assert_eq!(format_duration(&chrono::Duration::seconds(93784)), "P1DT2H3M4S");
/// assert_eq!(format_duration(&chrono::Duration::milliseconds(-1500)), "-PT1.5S");
/// assert_eq!(format_duration(&chrono::Duration::zero()), "PT0S");
/// ```
pub fn format_duration(duration: &chrono::Duration) -> String {
    let negative = *duration < chrono::Duration::zero();
    let abs = if negative { -*duration } else { *duration };
    let total_seconds = abs.num_seconds();
    let nanos = (abs - chrono::Duration::seconds(total_seconds))
        .num_nanoseconds()
        .unwrap_or(0);

    let days = total_seconds / 86_400;
    let hours = total_seconds % 86_400 / 3_600;
    let minutes = total_seconds % 3_600 / 60;
    let seconds = total_seconds % 60;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || nanos > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds > 0 || nanos > 0 || (hours == 0 && minutes == 0) {
            if nanos > 0 {
                let fraction = format!("{:09}", nanos);
                out.push_str(&format!("{}.{}S", seconds, fraction.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{}S", seconds));
            }
        }
    }
    out
}

/// Parses an ISO 8601 duration restricted to days, hours, minutes and seconds.
pub fn parse_duration(text: &str) -> Result<chrono::Duration> {
    let invalid = || Error::invalid_primitive("Edm.Duration", text);
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let rest = rest.strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total = chrono::Duration::zero();
    let mut any = false;
    let add = |total: chrono::Duration, part: Option<chrono::Duration>| {
        part.and_then(|part| total.checked_add(&part)).ok_or_else(invalid)
    };
    if !date_part.is_empty() {
        let days = date_part.strip_suffix('D').ok_or_else(invalid)?;
        let days: i64 = days.parse().map_err(|_| invalid())?;
        total = add(total, chrono::Duration::try_days(days))?;
        any = true;
    }
    if let Some(mut time) = time_part {
        if time.is_empty() {
            return Err(invalid());
        }
        for (designator, unit_seconds) in [('H', 3_600i64), ('M', 60)] {
            if let Some(pos) = time.find(designator) {
                let n: i64 = time[..pos].parse().map_err(|_| invalid())?;
                let seconds = n.checked_mul(unit_seconds).ok_or_else(invalid)?;
                total = add(total, chrono::Duration::try_seconds(seconds))?;
                time = &time[pos + 1..];
                any = true;
            }
        }
        if let Some(seconds) = time.strip_suffix('S') {
            let (whole, fraction) = match seconds.split_once('.') {
                Some((w, f)) => (w, f),
                None => (seconds, ""),
            };
            let whole: i64 = whole.parse().map_err(|_| invalid())?;
            total = add(total, chrono::Duration::try_seconds(whole))?;
            if !fraction.is_empty() {
                if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let nanos: i64 = format!("{:0<9}", fraction).parse().map_err(|_| invalid())?;
                total = add(total, Some(chrono::Duration::nanoseconds(nanos)))?;
            }
            any = true;
        } else if !time.is_empty() {
            return Err(invalid());
        }
    }
    if !any {
        return Err(invalid());
    }
    Ok(if negative { -total } else { total })
}

fn parse_float(kind: PrimitiveKind, scalar: &JsonScalar) -> Result<f64> {
    let text = match scalar {
        JsonScalar::Number(n) => n.as_str(),
        JsonScalar::String(s) => match s.as_str() {
            POSITIVE_INFINITY => return Ok(f64::INFINITY),
            NEGATIVE_INFINITY => return Ok(f64::NEG_INFINITY),
            NOT_A_NUMBER => return Ok(f64::NAN),
            other => other,
        },
        other => return Err(Error::invalid_primitive(kind.full_name(), other)),
    };
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::invalid_primitive(kind.full_name(), text))
}

fn parse_integer(kind: PrimitiveKind, scalar: &JsonScalar, allow_string: bool) -> Result<i64> {
    let text = match scalar {
        JsonScalar::Number(n) => n.as_str(),
        JsonScalar::String(s) if allow_string => s.as_str(),
        other => return Err(Error::invalid_primitive(kind.full_name(), other)),
    };
    text.parse::<i64>()
        .map_err(|_| Error::invalid_primitive(kind.full_name(), text))
}

fn string_of(kind: PrimitiveKind, scalar: &JsonScalar) -> Result<&str> {
    scalar
        .as_str()
        .ok_or_else(|| Error::invalid_primitive(kind.full_name(), scalar))
}

/// Parses a JSON scalar as a primitive of the given kind.
///
/// `Edm.PrimitiveType` infers the kind from the JSON shape. `null` must be
/// handled by the caller.
pub fn parse_primitive(kind: PrimitiveKind, scalar: &JsonScalar) -> Result<PrimitiveValue> {
    let name = kind.full_name();
    let range = |v: i64| Error::invalid_primitive(name, v);
    let value = match kind {
        PrimitiveKind::PrimitiveType => {
            return infer_primitive(scalar)?.ok_or_else(|| Error::invalid_primitive(name, scalar))
        }
        PrimitiveKind::Boolean => match scalar {
            JsonScalar::Bool(b) => PrimitiveValue::Boolean(*b),
            other => return Err(Error::invalid_primitive(name, other)),
        },
        PrimitiveKind::Byte => {
            let v = parse_integer(kind, scalar, false)?;
            PrimitiveValue::Byte(u8::try_from(v).map_err(|_| range(v))?)
        }
        PrimitiveKind::SByte => {
            let v = parse_integer(kind, scalar, false)?;
            PrimitiveValue::SByte(i8::try_from(v).map_err(|_| range(v))?)
        }
        PrimitiveKind::Int16 => {
            let v = parse_integer(kind, scalar, false)?;
            PrimitiveValue::Int16(i16::try_from(v).map_err(|_| range(v))?)
        }
        PrimitiveKind::Int32 => {
            let v = parse_integer(kind, scalar, false)?;
            PrimitiveValue::Int32(i32::try_from(v).map_err(|_| range(v))?)
        }
        PrimitiveKind::Int64 => PrimitiveValue::Int64(parse_integer(kind, scalar, true)?),
        PrimitiveKind::Decimal => {
            let text = match scalar {
                JsonScalar::Number(n) | JsonScalar::String(n) => n,
                other => return Err(Error::invalid_primitive(name, other)),
            };
            if !is_decimal_text(text) {
                return Err(Error::invalid_primitive(name, text));
            }
            PrimitiveValue::Decimal(text.clone())
        }
        PrimitiveKind::Double => PrimitiveValue::Double(parse_float(kind, scalar)?),
        PrimitiveKind::Single => {
            let wide = parse_float(kind, scalar)?;
            let narrow = wide as f32;
            if wide.is_finite() && !narrow.is_finite() {
                return Err(Error::invalid_primitive(name, scalar));
            }
            PrimitiveValue::Single(narrow)
        }
        PrimitiveKind::String => PrimitiveValue::String(string_of(kind, scalar)?.to_string()),
        PrimitiveKind::Date => {
            let text = string_of(kind, scalar)?;
            PrimitiveValue::Date(
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map_err(|_| Error::invalid_primitive(name, text))?,
            )
        }
        PrimitiveKind::DateTimeOffset => {
            let text = string_of(kind, scalar)?;
            PrimitiveValue::DateTimeOffset(
                DateTime::parse_from_rfc3339(text).map_err(|_| Error::invalid_primitive(name, text))?,
            )
        }
        PrimitiveKind::TimeOfDay => {
            let text = string_of(kind, scalar)?;
            let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                .map_err(|_| Error::invalid_primitive(name, text))?;
            PrimitiveValue::TimeOfDay(time)
        }
        PrimitiveKind::Duration => PrimitiveValue::Duration(parse_duration(string_of(kind, scalar)?)?),
        PrimitiveKind::Guid => {
            let text = string_of(kind, scalar)?;
            PrimitiveValue::Guid(Uuid::parse_str(text).map_err(|_| Error::invalid_primitive(name, text))?)
        }
        PrimitiveKind::Binary => {
            let text = string_of(kind, scalar)?;
            let bytes = STANDARD
                .decode(text)
                .or_else(|_| URL_SAFE.decode(text))
                .or_else(|_| URL_SAFE_NO_PAD.decode(text))
                .map_err(|_| Error::invalid_primitive(name, text))?;
            PrimitiveValue::Binary(bytes)
        }
        PrimitiveKind::Stream => return Err(Error::invalid_primitive(name, scalar)),
    };
    Ok(value)
}

/// Infers a primitive from its JSON shape alone.
///
/// Strings stay strings and booleans stay booleans. Integral numbers become
/// Int32 when they fit, else Int64; numbers with a fraction or exponent, and
/// integers beyond Int64, become Double. Returns `None` for `null`.
///
/// # Examples
///
/// ```rust
/// use odata_json_light::lexer::JsonScalar;
/// use odata_json_light::primitive::infer_primitive;
/// use odata_json_light::PrimitiveValue;
///
/// let n = |s: &str| JsonScalar::Number(s.to_string());
/// assert_eq!(infer_primitive(&n("42")).unwrap(), Some(PrimitiveValue::Int32(42)));
/// assert_eq!(infer_primitive(&n("5000000000")).unwrap(), Some(PrimitiveValue::Int64(5_000_000_000)));
/// assert_eq!(infer_primitive(&n("1.5")).unwrap(), Some(PrimitiveValue::Double(1.5)));
/// assert_eq!(infer_primitive(&JsonScalar::Null).unwrap(), None);
/// ```
pub fn infer_primitive(scalar: &JsonScalar) -> Result<Option<PrimitiveValue>> {
    let value = match scalar {
        JsonScalar::Null => return Ok(None),
        JsonScalar::Bool(b) => PrimitiveValue::Boolean(*b),
        JsonScalar::String(s) => PrimitiveValue::String(s.clone()),
        JsonScalar::Number(text) => {
            let integral = !text.contains(['.', 'e', 'E']);
            match text.parse::<i64>() {
                Ok(v) if integral => match i32::try_from(v) {
                    Ok(small) => PrimitiveValue::Int32(small),
                    Err(_) => PrimitiveValue::Int64(v),
                },
                _ => PrimitiveValue::Double(
                    text.parse::<f64>()
                        .map_err(|_| Error::invalid_primitive("Edm.Double", text))?,
                ),
            }
        }
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn s(text: &str) -> JsonScalar {
        JsonScalar::String(text.to_string())
    }

    fn n(text: &str) -> JsonScalar {
        JsonScalar::Number(text.to_string())
    }

    #[test]
    fn test_non_finite_round_trip() {
        for v in [f64::INFINITY, f64::NEG_INFINITY] {
            let wire = format_primitive(&PrimitiveValue::Double(v), false).unwrap();
            assert_eq!(
                parse_primitive(PrimitiveKind::Double, &wire).unwrap(),
                PrimitiveValue::Double(v)
            );
        }
        match parse_primitive(PrimitiveKind::Single, &s("NaN")).unwrap() {
            PrimitiveValue::Single(v) => assert!(v.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_integer_ranges() {
        assert!(parse_primitive(PrimitiveKind::Byte, &n("256")).is_err());
        assert!(parse_primitive(PrimitiveKind::SByte, &n("-129")).is_err());
        assert_eq!(
            parse_primitive(PrimitiveKind::Int16, &n("-7")).unwrap(),
            PrimitiveValue::Int16(-7)
        );
        assert_eq!(
            parse_primitive(PrimitiveKind::Int16, &n("32767")).unwrap(),
            PrimitiveValue::Int16(i16::MAX)
        );
        assert!(parse_primitive(PrimitiveKind::Int16, &n("32768")).is_err());
        assert!(parse_primitive(PrimitiveKind::Int16, &n("-32769")).is_err());
        assert_eq!(
            parse_primitive(PrimitiveKind::Byte, &n("255")).unwrap(),
            PrimitiveValue::Byte(255)
        );
        assert!(parse_primitive(PrimitiveKind::Int32, &n("2147483648")).is_err());
        assert_eq!(
            parse_primitive(PrimitiveKind::Int32, &n("-2147483648")).unwrap(),
            PrimitiveValue::Int32(i32::MIN)
        );
        assert!(parse_primitive(PrimitiveKind::Int64, &n("9223372036854775808")).is_err());
        assert!(parse_primitive(PrimitiveKind::Int32, &n("1.5")).is_err());
        assert_eq!(
            parse_primitive(PrimitiveKind::Int64, &s("9007199254740993")).unwrap(),
            PrimitiveValue::Int64(9_007_199_254_740_993)
        );
    }

    #[test]
    fn test_decimal_keeps_text() {
        assert_eq!(
            parse_primitive(PrimitiveKind::Decimal, &n("12345678901234567890.123")).unwrap(),
            PrimitiveValue::Decimal("12345678901234567890.123".into())
        );
        assert!(format_primitive(&PrimitiveValue::Decimal("1,5".into()), false).is_err());
    }

    #[test]
    fn test_temporal_formats() {
        let dt = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, 10, 30, 0)
            .unwrap();
        let wire = format_primitive(&PrimitiveValue::DateTimeOffset(dt), false).unwrap();
        assert_eq!(wire, s("2024-01-15T10:30:00+02:00"));
        assert_eq!(
            parse_primitive(PrimitiveKind::DateTimeOffset, &wire).unwrap(),
            PrimitiveValue::DateTimeOffset(dt)
        );

        let time = NaiveTime::from_hms_nano_opt(10, 0, 1, 120_000_000).unwrap();
        let wire = format_primitive(&PrimitiveValue::TimeOfDay(time), false).unwrap();
        assert_eq!(wire, s("10:00:01.12"));
        assert_eq!(
            parse_primitive(PrimitiveKind::TimeOfDay, &wire).unwrap(),
            PrimitiveValue::TimeOfDay(time)
        );
    }

    #[test]
    fn test_duration_parse() {
        assert_eq!(parse_duration("P1DT2H3M4S").unwrap(), chrono::Duration::seconds(93_784));
        assert_eq!(parse_duration("-PT0.25S").unwrap(), chrono::Duration::milliseconds(-250));
        assert_eq!(parse_duration("PT90M").unwrap(), chrono::Duration::minutes(90));
        assert!(parse_duration("P1Y").is_err());
        assert!(parse_duration("P").is_err());
        assert!(parse_duration("PT").is_err());
    }

    #[test]
    fn test_duration_overflow_is_invalid() {
        for text in ["P9999999999999999D", "PT9999999999999999H", "PT9999999999999999M", "P106751991167DT23H"] {
            match parse_duration(text) {
                Err(Error::InvalidPrimitiveValue { type_name, value }) => {
                    assert_eq!(type_name, "Edm.Duration");
                    assert_eq!(value, text);
                }
                other => panic!("{}: unexpected {:?}", text, other),
            }
        }
        assert_eq!(parse_duration("P10000D").unwrap(), chrono::Duration::days(10_000));
    }

    #[test]
    fn test_single_range() {
        assert!(matches!(
            parse_primitive(PrimitiveKind::Single, &n("1e300")),
            Err(Error::InvalidPrimitiveValue { .. })
        ));
        assert!(parse_primitive(PrimitiveKind::Single, &n("-1e39")).is_err());
        assert!(matches!(
            parse_primitive(PrimitiveKind::Single, &n("3.4e38")),
            Ok(PrimitiveValue::Single(v)) if v.is_finite()
        ));
        assert_eq!(
            parse_primitive(PrimitiveKind::Single, &s("INF")).unwrap(),
            PrimitiveValue::Single(f32::INFINITY)
        );
        assert_eq!(
            parse_primitive(PrimitiveKind::Single, &s("-INF")).unwrap(),
            PrimitiveValue::Single(f32::NEG_INFINITY)
        );
        assert_eq!(
            parse_primitive(PrimitiveKind::Double, &n("1e300")).unwrap(),
            PrimitiveValue::Double(1e300)
        );
    }

    #[test]
    fn test_binary_accepts_url_safe() {
        let bytes = vec![0xfb, 0xff, 0x01];
        let wire = format_primitive(&PrimitiveValue::Binary(bytes.clone()), false).unwrap();
        assert_eq!(wire, s("+/8B"));
        assert_eq!(
            parse_primitive(PrimitiveKind::Binary, &s("-_8B")).unwrap(),
            PrimitiveValue::Binary(bytes)
        );
    }

    #[test]
    fn test_double_keeps_fraction() {
        assert_eq!(format_primitive(&PrimitiveValue::Double(3.0), false).unwrap(), n("3.0"));
        assert_eq!(format_primitive(&PrimitiveValue::Single(0.5), false).unwrap(), n("0.5"));
    }
}
