use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

/// One column of result metadata, used to decode that column's cells.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ColumnType {
    /// The name of the column
    pub name: String,
    /// Snowflake's type tag for the serialized values, e.g. `fixed`
    #[serde(rename = "type")]
    pub data_type: String,
    /// Decimal digits after the point, for `fixed` columns
    pub scale: Option<i64>,
    pub precision: Option<u32>,
    pub nullable: Option<bool>,
}

/// A decoded cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Null,
    Boolean(bool),
    Int(i128),
    Decimal(BigDecimal),
    Float(f64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
    Varchar(String),
}

impl ColumnType {
    /// Decode a raw cell under this column's type tag.
    ///
    /// Snowflake serializes every value as a string. A value that does not
    /// parse under its declared tag is handed back untouched as `Varchar`,
    /// and unrecognized tags pass through the same way.
    pub fn decode(&self, value: &Option<String>) -> Cell {
        let Some(value) = value else {
            return Cell::Null;
        };
        match self.data_type.as_str() {
            // Strict literal match: anything but "true" is false
            "boolean" => Cell::Boolean(value == "true"),
            "date" => decode_date(value),
            "fixed" => decode_fixed(value, self.scale.unwrap_or(0)),
            "float" | "double" | "double precision" | "real" => match value.parse() {
                Ok(parsed) => Cell::Float(parsed),
                Err(_) => passthrough(value),
            },
            "time" | "datetime" | "timestamp" | "timestamp_ltz" | "timestamp_ntz" => {
                match parse_epoch_seconds(value) {
                    Some(instant) => Cell::Timestamp(instant),
                    None => passthrough(value),
                }
            }
            "timestamp_tz" => decode_timestamp_tz(value),
            "binary" => match hex::decode(value) {
                Ok(bytes) => Cell::Binary(bytes),
                Err(_) => passthrough(value),
            },
            _ => passthrough(value),
        }
    }
}

fn passthrough(value: &str) -> Cell {
    Cell::Varchar(value.to_owned())
}

/// Dates arrive as a signed count of days since 1970-01-01.
fn decode_date(value: &str) -> Cell {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    value
        .parse::<i64>()
        .ok()
        .and_then(|days| epoch.checked_add_signed(Duration::days(days)))
        .map(Cell::Date)
        .unwrap_or_else(|| passthrough(value))
}

/// Scale 0 stays integral; i128 holds every NUMBER(38,0). Positive scales
/// become decimals rounded half-even to the declared scale.
fn decode_fixed(value: &str, scale: i64) -> Cell {
    if scale <= 0 {
        if let Ok(int) = value.parse::<i128>() {
            return Cell::Int(int);
        }
    }
    match BigDecimal::from_str(value) {
        Ok(dec) => Cell::Decimal(dec.with_scale_round(scale.max(0), RoundingMode::HalfEven)),
        Err(_) => passthrough(value),
    }
}

/// Timestamps arrive as decimal seconds since the Unix epoch with up to
/// nanosecond precision. Parsed exactly, not through an f64.
fn parse_epoch_seconds(value: &str) -> Option<DateTime<Utc>> {
    let (int_part, frac_part) = match value.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (value, ""),
    };
    let secs: i64 = int_part.parse().ok()?;
    let mut nanos: u32 = 0;
    if !frac_part.is_empty() {
        if frac_part.len() > 9 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        nanos = format!("{frac_part:0<9}").parse().ok()?;
    }
    let (secs, nanos) = if int_part.starts_with('-') && nanos > 0 {
        (secs.checked_sub(1)?, 1_000_000_000 - nanos)
    } else {
        (secs, nanos)
    };
    Utc.timestamp_opt(secs, nanos).single()
}

/// `timestamp_tz` cells are `<epoch seconds> <offset minutes>`. The offset
/// is subtracted from the epoch seconds, preserving the original wall-clock
/// reading of the value.
fn decode_timestamp_tz(value: &str) -> Cell {
    let Some((seconds, offset)) = value.split_once(' ') else {
        return passthrough(value);
    };
    let (Some(instant), Ok(offset_minutes)) =
        (parse_epoch_seconds(seconds), offset.parse::<i64>())
    else {
        return passthrough(value);
    };
    match instant.checked_sub_signed(Duration::seconds(offset_minutes * 60)) {
        Some(adjusted) => Cell::Timestamp(adjusted),
        None => passthrough(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: &str, scale: Option<i64>) -> ColumnType {
        ColumnType {
            name: "C".to_owned(),
            data_type: data_type.to_owned(),
            scale,
            precision: None,
            nullable: None,
        }
    }

    fn decode(data_type: &str, scale: Option<i64>, value: &str) -> Cell {
        column(data_type, scale).decode(&Some(value.to_owned()))
    }

    #[test]
    fn booleans_match_the_literal_true_only() {
        assert_eq!(decode("boolean", None, "true"), Cell::Boolean(true));
        assert_eq!(decode("boolean", None, "false"), Cell::Boolean(false));
        assert_eq!(decode("boolean", None, "TRUE"), Cell::Boolean(false));
    }

    #[test]
    fn dates_count_days_from_the_epoch() {
        let date = |y, m, d| Cell::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(decode("date", None, "0"), date(1970, 1, 1));
        assert_eq!(decode("date", None, "-1"), date(1969, 12, 31));
        assert_eq!(decode("date", None, "19358"), date(2022, 12, 31));
    }

    #[test]
    fn scale_zero_fixed_is_exact_far_past_i64() {
        assert_eq!(
            decode("fixed", Some(0), "12345678901234567890"),
            Cell::Int(12345678901234567890),
        );
        assert_eq!(decode("fixed", Some(0), "-7"), Cell::Int(-7));
    }

    #[test]
    fn scaled_fixed_rounds_half_to_even() {
        let dec = |s| Cell::Decimal(BigDecimal::from_str(s).unwrap());
        assert_eq!(decode("fixed", Some(2), "1.005"), dec("1.00"));
        assert_eq!(decode("fixed", Some(2), "1.015"), dec("1.02"));
        assert_eq!(decode("fixed", Some(2), "2.675"), dec("2.68"));
        assert_eq!(decode("fixed", Some(3), "12.3456"), dec("12.346"));
    }

    #[test]
    fn float_family_tags_parse_as_f64() {
        assert_eq!(decode("real", None, "1.5"), Cell::Float(1.5));
        assert_eq!(decode("float", None, "-0.25"), Cell::Float(-0.25));
        assert_eq!(decode("double precision", None, "2"), Cell::Float(2.0));
    }

    #[test]
    fn timestamps_parse_fractional_epoch_seconds_exactly() {
        let expect = Utc.timestamp_opt(1700000000, 123_456_789).single().unwrap();
        assert_eq!(
            decode("timestamp_ntz", Some(9), "1700000000.123456789"),
            Cell::Timestamp(expect),
        );
        let whole = Utc.timestamp_opt(1700000000, 0).single().unwrap();
        assert_eq!(decode("timestamp", None, "1700000000"), Cell::Timestamp(whole));
        // short fractions are right-padded, not left
        let tenth = Utc.timestamp_opt(10, 500_000_000).single().unwrap();
        assert_eq!(decode("time", Some(1), "10.5"), Cell::Timestamp(tenth));
    }

    #[test]
    fn negative_timestamps_borrow_from_the_fraction() {
        let expect = Utc.timestamp_opt(-1, 500_000_000).single().unwrap();
        assert_eq!(decode("timestamp_ltz", Some(1), "-0.5"), Cell::Timestamp(expect));
    }

    // The offset is subtracted, so a negative offset moves the instant
    // forward. Documented convention, matching the service's serializer.
    #[test]
    fn timestamp_tz_subtracts_the_offset_minutes() {
        let expect = Utc.timestamp_opt(1700018000, 0).single().unwrap();
        assert_eq!(
            decode("timestamp_tz", Some(9), "1700000000.000000000 -300"),
            Cell::Timestamp(expect),
        );
        let east = Utc.timestamp_opt(1699992800, 0).single().unwrap();
        assert_eq!(
            decode("timestamp_tz", Some(0), "1700000000 120"),
            Cell::Timestamp(east),
        );
    }

    #[test]
    fn binary_cells_decode_from_hex() {
        assert_eq!(decode("binary", None, "666f6f"), Cell::Binary(b"foo".to_vec()));
    }

    #[test]
    fn unknown_tags_pass_through_verbatim() {
        assert_eq!(
            decode("variant", None, "{\"k\": 1}"),
            Cell::Varchar("{\"k\": 1}".to_owned()),
        );
        assert_eq!(decode("text", None, "plain"), Cell::Varchar("plain".to_owned()));
    }

    #[test]
    fn unparseable_values_pass_through_verbatim() {
        assert_eq!(decode("date", None, "yesterday"), Cell::Varchar("yesterday".to_owned()));
        assert_eq!(decode("fixed", Some(2), "1.2.3"), Cell::Varchar("1.2.3".to_owned()));
        assert_eq!(decode("timestamp", None, "noonish"), Cell::Varchar("noonish".to_owned()));
    }

    #[test]
    fn null_cells_are_null_for_every_tag() {
        for tag in ["boolean", "fixed", "timestamp_tz", "variant"] {
            assert_eq!(column(tag, Some(2)).decode(&None), Cell::Null);
        }
    }
}
