//! Casting of argument values to their declared types.

use crate::schema::{ScalarType, TypeRef};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Number, Value};
use url::Url;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Casts `value` to `ty`, returning `None` when it cannot be represented.
///
/// Argument values arrive as text, so numbers, booleans and dates are
/// parsed from strings as well as accepted in their JSON form.
#[must_use]
pub fn cast_value(value: &Value, ty: &TypeRef) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match ty {
        TypeRef::Scalar(scalar) => cast_scalar(value, *scalar),
        TypeRef::Relational(_) => cast_scalar(value, ScalarType::Id),
        TypeRef::List(inner) => match value {
            Value::Array(elements) => elements
                .iter()
                .map(|element| cast_value(element, inner))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            _ => None,
        },
    }
}

fn cast_scalar(value: &Value, ty: ScalarType) -> Option<Value> {
    match ty {
        ScalarType::Mixed => Some(value.clone()),
        ScalarType::Id | ScalarType::String => to_text(value).map(Value::String),
        ScalarType::Int => to_int(value).map(Value::from),
        ScalarType::Float => to_float(value)
            .and_then(Number::from_f64)
            .map(Value::Number),
        ScalarType::Bool => to_bool(value).map(Value::Bool),
        ScalarType::Date => {
            let date = NaiveDate::parse_from_str(value.as_str()?.trim(), DATE_FORMAT).ok()?;
            Some(Value::String(date.format(DATE_FORMAT).to_string()))
        }
        ScalarType::Time => to_timestamp(value).map(Value::from),
        ScalarType::Url => {
            let url = value.as_str()?.trim();
            Url::parse(url).ok().map(|_| Value::String(url.to_string()))
        }
        ScalarType::Object => value.is_object().then(|| value.clone()),
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            let float = number.as_f64()?;
            (float.fract() == 0.0).then_some(float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Unix seconds from an integer, `now`, RFC 3339, `Y-m-d H:i:s` or `Y-m-d`.
fn to_timestamp(value: &Value) -> Option<i64> {
    let text = match value {
        Value::Number(number) => return number.as_i64(),
        Value::String(text) => text.trim(),
        _ => return None,
    };
    if text.eq_ignore_ascii_case("now") {
        return Some(Utc::now().timestamp());
    }
    if let Ok(seconds) = text.parse::<i64>() {
        return Some(seconds);
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Some(date_time.timestamp());
    }
    if let Ok(date_time) = NaiveDateTime::parse_from_str(text, DATE_TIME_FORMAT) {
        return Some(Utc.from_utc_datetime(&date_time).timestamp());
    }
    let date = NaiveDate::parse_from_str(text, DATE_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?).timestamp())
}


/// Renders a value for messages: strings without quotes, the rest as JSON.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scalar(ty: ScalarType) -> TypeRef {
        TypeRef::scalar(ty)
    }

    #[test]
    fn test_numbers() {
        assert_eq!(cast_value(&json!("3"), &scalar(ScalarType::Int)), Some(json!(3)));
        assert_eq!(cast_value(&json!(4.0), &scalar(ScalarType::Int)), Some(json!(4)));
        assert_eq!(cast_value(&json!("abc"), &scalar(ScalarType::Int)), None);
        assert_eq!(cast_value(&json!("2.5"), &scalar(ScalarType::Float)), Some(json!(2.5)));
        assert_eq!(cast_value(&json!(7), &scalar(ScalarType::String)), Some(json!("7")));
    }

    #[test]
    fn test_booleans() {
        let ty = scalar(ScalarType::Bool);
        assert_eq!(cast_value(&json!("true"), &ty), Some(json!(true)));
        assert_eq!(cast_value(&json!("0"), &ty), Some(json!(false)));
        assert_eq!(cast_value(&json!("maybe"), &ty), None);
    }

    #[test]
    fn test_dates_and_times() {
        assert_eq!(
            cast_value(&json!("2020-02-29"), &scalar(ScalarType::Date)),
            Some(json!("2020-02-29"))
        );
        assert_eq!(cast_value(&json!("2021-02-29"), &scalar(ScalarType::Date)), None);

        let time = scalar(ScalarType::Time);
        assert_eq!(cast_value(&json!("1970-01-02"), &time), Some(json!(86_400)));
        assert_eq!(
            cast_value(&json!("1970-01-01 00:01:00"), &time),
            Some(json!(60))
        );
        assert_eq!(
            cast_value(&json!("1970-01-01T01:00:00+01:00"), &time),
            Some(json!(0))
        );
        assert_eq!(cast_value(&json!("yesterday-ish"), &time), None);
    }

    #[test]
    fn test_now() {
        let time = scalar(ScalarType::Time);
        let before = Utc::now().timestamp();
        for text in ["now", " NOW ", "Now"] {
            let cast = cast_value(&json!(text), &time).and_then(|v| v.as_i64());
            let after = Utc::now().timestamp();
            assert!(cast.is_some_and(|seconds| (before..=after).contains(&seconds)), "{text}");
        }
        assert_eq!(cast_value(&json!("nowish"), &time), None);
    }

    #[test]
    fn test_urls() {
        let ty = scalar(ScalarType::Url);
        assert_eq!(
            cast_value(&json!(" https://example.com/a?b=1 "), &ty),
            Some(json!("https://example.com/a?b=1"))
        );
        assert!(cast_value(&json!("http://[::1]:8080"), &ty).is_some());
        for invalid in [
            "example.com",
            "1http://x",
            "-://x",
            "http://[::1",
            "http://exa%zzmple",
            "http://exa mple.com",
        ] {
            assert_eq!(cast_value(&json!(invalid), &ty), None, "{invalid}");
        }
    }

    #[test]
    fn test_lists_and_other_scalars() {
        let ids = TypeRef::list(TypeRef::scalar(ScalarType::Int));
        assert_eq!(cast_value(&json!(["1", 2]), &ids), Some(json!([1, 2])));
        assert_eq!(cast_value(&json!(["1", "x"]), &ids), None);
        assert_eq!(cast_value(&json!("1"), &ids), None);

        assert_eq!(
            cast_value(&json!(42), &TypeRef::relational("Post")),
            Some(json!("42"))
        );
        assert_eq!(cast_value(&json!(null), &scalar(ScalarType::Int)), Some(Value::Null));
    }
}
