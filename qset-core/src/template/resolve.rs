//! Value resolvers
//!
//! Pure conversions from the string argument of a value variable
//! (`#kind:argument`) into a typed [`Value`]. The resolver is selected by the
//! first four characters of the command, so `#numb:`, `#number:` and
//! `#numbers:` all select the number resolver.

use super::error::{ResolveKind, VariableError};
use super::results::DataOp;
use crate::document::{ObjectId, Value, REGEX_OPTIONS};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

const DATE_LAYOUT: &str = "%Y-%m-%d";
const DATE_TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
const DATE_TIME_UTC_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A parsed value-variable command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Number,
    String,
    Date,
    ObjectId,
    Regex,
    Time,
    /// Cross-stage lookup, `data.<op>`
    Data(DataOp),
}

impl Command {
    /// Parse the command half of `#command:argument`
    pub fn parse(cmd: &str) -> Result<Self, VariableError> {
        let unknown = || VariableError::UnknownResolverCommand(cmd.to_string());

        let prefix = cmd.get(..4).ok_or_else(unknown)?;
        let command = match prefix {
            "numb" => Command::Number,
            "stri" => Command::String,
            "date" => Command::Date,
            "obji" => Command::ObjectId,
            "rege" => Command::Regex,
            "time" => Command::Time,
            "data" => {
                let op = cmd[4..].strip_prefix('.').ok_or_else(unknown)?;
                Command::Data(DataOp::parse(op).ok_or_else(unknown)?)
            }
            _ => return Err(unknown()),
        };

        Ok(command)
    }

    /// Resolve `param` for every command except the cross-stage lookup.
    pub fn resolve(self, param: &str) -> Result<Value, VariableError> {
        match self {
            Command::Number => number(param),
            Command::String => Ok(Value::String(param.to_string())),
            Command::Date => iso_date(param),
            Command::ObjectId => object_id(param),
            Command::Regex => regex(param),
            Command::Time => adjust_time(param),
            // Lookups need the result index, see `ResultIndex::lookup`
            Command::Data(_) => Err(VariableError::UnknownResolverCommand("data".to_string())),
        }
    }
}

/// Parse a decimal integer
pub fn number(value: &str) -> Result<Value, VariableError> {
    value
        .parse::<i64>()
        .map(Value::Int64)
        .map_err(|_| VariableError::resolution(ResolveKind::Number, value))
}

/// Parse one of the three supported date layouts, chosen by length
pub fn iso_date(value: &str) -> Result<Value, VariableError> {
    let err = || VariableError::resolution(ResolveKind::Date, value);

    let naive = match value.len() {
        10 => NaiveDate::parse_from_str(value, DATE_LAYOUT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        23 => NaiveDateTime::parse_from_str(value, DATE_TIME_LAYOUT).ok(),
        24 => NaiveDateTime::parse_from_str(value, DATE_TIME_UTC_LAYOUT).ok(),
        _ => None,
    }
    .ok_or_else(err)?;

    Ok(Value::DateTime(naive.and_utc()))
}

/// Parse a 24 character hex ObjectId
pub fn object_id(value: &str) -> Result<Value, VariableError> {
    ObjectId::parse_str(value)
        .map(Value::ObjectId)
        .map_err(|_| VariableError::resolution(ResolveKind::ObjectId, value))
}

/// Parse a `/pattern/options` literal. The last slash closes the pattern.
/// Options are limited to [`REGEX_OPTIONS`].
pub fn regex(value: &str) -> Result<Value, VariableError> {
    let err = || VariableError::resolution(ResolveKind::Regex, value);

    let body = value.strip_prefix('/').ok_or_else(err)?;
    let close = body.rfind('/').ok_or_else(err)?;

    let options = &body[close + 1..];
    if !options.chars().all(|c| REGEX_OPTIONS.contains(c)) {
        return Err(err());
    }

    Ok(Value::Regex {
        pattern: body[..close].to_string(),
        options: options.to_string(),
    })
}

/// Current time adjusted by a signed offset, see [`parse_offset`]
pub fn adjust_time(value: &str) -> Result<Value, VariableError> {
    adjust_time_from(Utc::now(), value)
}

/// `now` adjusted by a signed offset
pub fn adjust_time_from(now: DateTime<Utc>, value: &str) -> Result<Value, VariableError> {
    let offset = parse_offset(value)?;
    now.checked_add_signed(offset)
        .map(Value::DateTime)
        .ok_or_else(|| VariableError::resolution(ResolveKind::Duration, value))
}

/// Parse `-?digits(ns|us|ms|s|m|h)?`. Bare digits are seconds.
pub fn parse_offset(value: &str) -> Result<TimeDelta, VariableError> {
    let err = || VariableError::resolution(ResolveKind::Duration, value);

    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let split = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, unit) = rest.split_at(split);
    if digits.is_empty() {
        return Err(err());
    }

    let amount: i64 = digits.parse().map_err(|_| err())?;
    let amount = if negative { -amount } else { amount };

    let offset = match unit {
        "ns" => Some(TimeDelta::nanoseconds(amount)),
        "us" => Some(TimeDelta::microseconds(amount)),
        "ms" => TimeDelta::try_milliseconds(amount),
        "" | "s" => TimeDelta::try_seconds(amount),
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        _ => None,
    };

    offset.ok_or_else(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("numb").unwrap(), Command::Number);
        assert_eq!(Command::parse("number").unwrap(), Command::Number);
        assert_eq!(Command::parse("string").unwrap(), Command::String);
        assert_eq!(Command::parse("date").unwrap(), Command::Date);
        assert_eq!(Command::parse("objid").unwrap(), Command::ObjectId);
        assert_eq!(Command::parse("regex").unwrap(), Command::Regex);
        assert_eq!(Command::parse("time").unwrap(), Command::Time);
        assert_eq!(
            Command::parse("data.*").unwrap(),
            Command::Data(DataOp::All)
        );
        assert_eq!(
            Command::parse("data.12").unwrap(),
            Command::Data(DataOp::Index(12))
        );
    }

    #[test]
    fn test_parse_unknown_commands() {
        for cmd in ["", "num", "nope", "data", "data.", "data.x", "data*", "dat€"] {
            assert!(
                matches!(
                    Command::parse(cmd),
                    Err(VariableError::UnknownResolverCommand(_))
                ),
                "{:?} should be unknown",
                cmd
            );
        }
    }

    #[test]
    fn test_number() {
        assert_eq!(number("42").unwrap(), Value::Int64(42));
        assert_eq!(number("-7").unwrap(), Value::Int64(-7));
        assert_eq!(
            number("abc"),
            Err(VariableError::Resolution {
                kind: ResolveKind::Number,
                value: "abc".to_string()
            })
        );
        assert!(number("4.2").is_err());
        assert!(number("").is_err());
    }

    #[test]
    fn test_iso_date() {
        let day = iso_date("2020-01-02").unwrap();
        assert_eq!(
            day,
            Value::DateTime(Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap())
        );

        let with_zone = iso_date("2020-01-02T03:04:05.999Z").unwrap();
        let expected = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
            + TimeDelta::milliseconds(999);
        assert_eq!(with_zone, Value::DateTime(expected));

        let without_zone = iso_date("2020-01-02T03:04:05.999").unwrap();
        assert_eq!(without_zone, Value::DateTime(expected));

        assert!(iso_date("2020/01/02").is_err());
        assert!(iso_date("2020-1-2").is_err());
        assert!(iso_date("2020-13-02").is_err());
        assert!(iso_date("").is_err());
    }

    #[test]
    fn test_object_id() {
        let v = object_id("5660bc6e16908cae692e0593").unwrap();
        assert_eq!(v.as_object_id().unwrap().to_hex(), "5660bc6e16908cae692e0593");

        assert!(object_id("5660bc6e").is_err());
        assert!(object_id("zz60bc6e16908cae692e0593").is_err());
    }

    #[test]
    fn test_regex() {
        assert_eq!(
            regex("/^Coral/i").unwrap(),
            Value::Regex {
                pattern: "^Coral".to_string(),
                options: "i".to_string()
            }
        );
        assert_eq!(regex("/a/b/").unwrap().as_regex(), Some(("a/b", "")));
        assert_eq!(regex("//").unwrap().as_regex(), Some(("", "")));

        assert_eq!(regex("/a/msx").unwrap().as_regex(), Some(("a", "msx")));
        assert_eq!(
            regex("/a/q"),
            Err(VariableError::Resolution {
                kind: ResolveKind::Regex,
                value: "/a/q".to_string()
            })
        );
        assert!(regex("/a/ig").is_err());

        assert!(regex("^Coral/i").is_err());
        assert!(regex("/Coral").is_err());
        assert!(regex("").is_err());
    }

    #[test]
    fn test_offsets() {
        assert_eq!(parse_offset("0").unwrap(), TimeDelta::zero());
        assert_eq!(parse_offset("-3600").unwrap(), TimeDelta::hours(-1));
        assert_eq!(parse_offset("3m").unwrap(), TimeDelta::minutes(3));
        assert_eq!(parse_offset("3us").unwrap(), TimeDelta::microseconds(3));
        assert_eq!(parse_offset("10ns").unwrap(), TimeDelta::nanoseconds(10));
        assert_eq!(parse_offset("-5ms").unwrap(), TimeDelta::milliseconds(-5));
        assert_eq!(parse_offset("2h").unwrap(), TimeDelta::hours(2));
        assert_eq!(parse_offset("9s").unwrap(), TimeDelta::seconds(9));

        for bad in ["", "-", "m", "3d", "3 m", "3mm", "x3", "99999999999999999999"] {
            assert!(parse_offset(bad).is_err(), "{:?} should fail", bad);
        }
    }

    #[test]
    fn test_adjust_time() {
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(adjust_time_from(now, "0").unwrap(), Value::DateTime(now));
        assert_eq!(
            adjust_time_from(now, "-3600").unwrap(),
            Value::DateTime(now - TimeDelta::hours(1))
        );
        assert_eq!(
            adjust_time_from(now, "3m").unwrap(),
            Value::DateTime(now + TimeDelta::minutes(3))
        );
        assert_eq!(
            adjust_time_from(now, "3us").unwrap(),
            Value::DateTime(now + TimeDelta::microseconds(3))
        );
        assert!(adjust_time_from(now, "9223372036854775807h").is_err());
    }

    #[test]
    fn test_adjust_time_now() {
        let before = Utc::now();
        let v = adjust_time("0").unwrap();
        let after = Utc::now();

        let at = *v.as_datetime().unwrap();
        assert!(at >= before && at <= after);
    }
}
