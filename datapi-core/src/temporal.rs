//! Durations and dates
//!
//! # Durations
//!
//! [`DataApiDuration`] follows the CQL duration model: a number of months, a
//! number of days and a number of nanoseconds, all sharing one sign. Months
//! and days are kept apart because their length in seconds depends on the
//! calendar.
//!
//! Encoding depends on the active [`DurationEncoding`]:
//!
//! | Encoding     | Wire form                                          |
//! |--------------|----------------------------------------------------|
//! | `Iso8601`    | `"P1Y2M3DT4H5M6.5S"`, `"-PT90M"`, `"PT0S"`         |
//! | `Structured` | `{"months": 14, "days": 3, "nanoseconds": 14706500000000}` |
//!
//! Decoding accepts both forms plus the compact notation used by CQL
//! (`1h30m`, `2w`, `-3d12h`, `500ms`).
//!
//! # Dates
//!
//! [`DataApiDate`] is the `{"$date": <epoch millis>}` timestamp used for
//! collection documents.

use crate::codec::{active_config, DurationEncoding};
use crate::error::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;

/// Calendar aware duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataApiDuration {
    /// Whole months
    pub months: i32,
    /// Whole days
    pub days: i32,
    /// Remaining time in nanoseconds
    pub nanoseconds: i64,
}

impl DataApiDuration {
    /// Build a duration from its components
    ///
    /// Components are expected to share one sign; see
    /// [`try_new`](Self::try_new) for a checked constructor. A duration with
    /// mixed signs has no ISO-8601 form and is always encoded structured.
    pub fn new(months: i32, days: i32, nanoseconds: i64) -> Self {
        Self {
            months,
            days,
            nanoseconds,
        }
    }

    /// Build a duration, rejecting components of different signs
    pub fn try_new(months: i32, days: i32, nanoseconds: i64) -> Result<Self, Error> {
        let duration = Self::new(months, days, nanoseconds);
        if duration.has_mixed_signs() {
            return Err(Error::Serialization(format!(
                "duration components must share one sign: {} months, {} days, {} nanoseconds",
                months, days, nanoseconds
            )));
        }
        Ok(duration)
    }

    /// Whether some components are positive and others negative
    pub fn has_mixed_signs(&self) -> bool {
        let signs = [
            i64::from(self.months).signum(),
            i64::from(self.days).signum(),
            self.nanoseconds.signum(),
        ];
        signs.contains(&1) && signs.contains(&-1)
    }

    /// Duration of `nanoseconds` with no calendar part
    pub fn from_nanos(nanoseconds: i64) -> Self {
        Self::new(0, 0, nanoseconds)
    }

    /// Whether every component is zero
    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.nanoseconds == 0
    }

    /// Whether the duration points backwards
    pub fn is_negative(&self) -> bool {
        self.months < 0 || self.days < 0 || self.nanoseconds < 0
    }

    /// Convert to a [`std::time::Duration`], counting a day as 24 hours
    ///
    /// Returns `None` for negative durations and for durations with a month
    /// component, which has no fixed length.
    pub fn to_std(&self) -> Option<Duration> {
        if self.is_negative() || self.months != 0 {
            return None;
        }
        let days = Duration::from_secs(u64::try_from(self.days).ok()? * 86_400);
        let rest = Duration::from_nanos(u64::try_from(self.nanoseconds).ok()?);
        days.checked_add(rest)
    }

    /// ISO-8601 representation
    ///
    /// ISO-8601 carries a single sign, so a duration with mixed signs is
    /// written as negative and does not parse back to the same value.
    pub fn to_iso8601(&self) -> String {
        if self.is_zero() {
            return "PT0S".to_string();
        }
        let mut out = String::new();
        if self.is_negative() {
            out.push('-');
        }
        out.push('P');

        let months = self.months.unsigned_abs();
        let (years, months) = (months / 12, months % 12);
        push_component(&mut out, u64::from(years), 'Y');
        push_component(&mut out, u64::from(months), 'M');
        push_component(&mut out, u64::from(self.days.unsigned_abs()), 'D');

        let nanos = self.nanoseconds.unsigned_abs();
        if nanos > 0 {
            out.push('T');
            push_component(&mut out, nanos / NANOS_PER_HOUR, 'H');
            push_component(&mut out, nanos % NANOS_PER_HOUR / NANOS_PER_MINUTE, 'M');
            let seconds = nanos % NANOS_PER_MINUTE / NANOS_PER_SECOND;
            let fraction = nanos % NANOS_PER_SECOND;
            if fraction > 0 {
                let digits = format!("{:09}", fraction);
                out.push_str(&format!("{}.{}S", seconds, digits.trim_end_matches('0')));
            } else {
                push_component(&mut out, seconds, 'S');
            }
        }
        out
    }

    /// Parse an ISO-8601 or compact duration
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        if body.is_empty() {
            return Err(invalid_duration(input, "empty duration"));
        }
        let parts = if body.starts_with(['P', 'p']) {
            parse_iso8601(&body[1..]).map_err(|reason| invalid_duration(input, reason))?
        } else {
            parse_compact(body).map_err(|reason| invalid_duration(input, reason))?
        };
        parts.finish(negative).map_err(|reason| invalid_duration(input, reason))
    }
}

fn push_component(out: &mut String, value: u64, unit: char) {
    if value > 0 {
        out.push_str(&value.to_string());
        out.push(unit);
    }
}

fn invalid_duration(input: &str, reason: &str) -> Error {
    Error::Serialization(format!("invalid duration '{}': {}", input, reason))
}

/// Unsigned components accumulated while parsing
#[derive(Default)]
struct Parts {
    months: u64,
    days: u64,
    nanos: u64,
}

impl Parts {
    fn add(&mut self, value: u64, unit: Unit) -> Result<(), &'static str> {
        let (slot, factor) = match unit {
            Unit::Years => (&mut self.months, 12),
            Unit::Months => (&mut self.months, 1),
            Unit::Weeks => (&mut self.days, 7),
            Unit::Days => (&mut self.days, 1),
            Unit::Nanos(factor) => (&mut self.nanos, factor),
        };
        let amount = value.checked_mul(factor).ok_or("component overflows")?;
        *slot = slot.checked_add(amount).ok_or("component overflows")?;
        Ok(())
    }

    fn finish(self, negative: bool) -> Result<DataApiDuration, &'static str> {
        let signed = |magnitude: u64| {
            let magnitude = i128::from(magnitude);
            if negative {
                -magnitude
            } else {
                magnitude
            }
        };
        let months = i32::try_from(signed(self.months)).map_err(|_| "months out of range")?;
        let days = i32::try_from(signed(self.days)).map_err(|_| "days out of range")?;
        let nanos = i64::try_from(signed(self.nanos)).map_err(|_| "nanoseconds out of range")?;
        Ok(DataApiDuration::new(months, days, nanos))
    }
}

#[derive(Clone, Copy)]
enum Unit {
    Years,
    Months,
    Weeks,
    Days,
    Nanos(u64),
}

/// Split a leading run of ASCII digits
fn take_number(input: &str) -> Result<(u64, &str), &'static str> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return Err("expected a number");
    }
    let value = input[..end].parse().map_err(|_| "number out of range")?;
    Ok((value, &input[end..]))
}

fn parse_iso8601(body: &str) -> Result<Parts, &'static str> {
    let (date, time) = match body.find(['T', 't']) {
        Some(index) => (&body[..index], Some(&body[index + 1..])),
        None => (body, None),
    };
    if date.is_empty() && time.map_or(true, str::is_empty) {
        return Err("no components");
    }

    let mut parts = Parts::default();
    let mut rest = date;
    while !rest.is_empty() {
        let (value, tail) = take_number(rest)?;
        let mut chars = tail.chars();
        let unit = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('Y') => Unit::Years,
            Some('M') => Unit::Months,
            Some('W') => Unit::Weeks,
            Some('D') => Unit::Days,
            _ => return Err("unknown date designator"),
        };
        parts.add(value, unit)?;
        rest = chars.as_str();
    }

    let mut rest = time.unwrap_or("");
    while !rest.is_empty() {
        let (value, tail) = take_number(rest)?;
        let (fraction, tail) = match tail.strip_prefix(['.', ',']) {
            Some(after) => {
                let end = after
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after.len());
                (Some(&after[..end]), &after[end..])
            }
            None => (None, tail),
        };
        let mut chars = tail.chars();
        match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('H') if fraction.is_none() => parts.add(value, Unit::Nanos(NANOS_PER_HOUR))?,
            Some('M') if fraction.is_none() => parts.add(value, Unit::Nanos(NANOS_PER_MINUTE))?,
            Some('S') => {
                parts.add(value, Unit::Nanos(NANOS_PER_SECOND))?;
                if let Some(digits) = fraction {
                    parts.add(fraction_nanos(digits)?, Unit::Nanos(1))?;
                }
            }
            _ => return Err("unknown time designator"),
        }
        rest = chars.as_str();
    }
    Ok(parts)
}

/// Nanoseconds held by the digits after a decimal point, truncated to nine places
fn fraction_nanos(digits: &str) -> Result<u64, &'static str> {
    if digits.is_empty() {
        return Err("empty fraction");
    }
    let mut padded: String = digits.chars().take(9).collect();
    while padded.len() < 9 {
        padded.push('0');
    }
    padded.parse().map_err(|_| "invalid fraction")
}

fn parse_compact(body: &str) -> Result<Parts, &'static str> {
    let mut parts = Parts::default();
    let mut rest = body;
    while !rest.is_empty() {
        let (value, tail) = take_number(rest)?;
        let end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let unit = match tail[..end].to_ascii_lowercase().as_str() {
            "y" => Unit::Years,
            "mo" => Unit::Months,
            "w" => Unit::Weeks,
            "d" => Unit::Days,
            "h" => Unit::Nanos(NANOS_PER_HOUR),
            "m" => Unit::Nanos(NANOS_PER_MINUTE),
            "s" => Unit::Nanos(NANOS_PER_SECOND),
            "ms" => Unit::Nanos(NANOS_PER_MILLI),
            "us" | "µs" => Unit::Nanos(NANOS_PER_MICRO),
            "ns" => Unit::Nanos(1),
            _ => return Err("unknown unit"),
        };
        parts.add(value, unit)?;
        rest = &tail[end..];
    }
    Ok(parts)
}

impl fmt::Display for DataApiDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl FromStr for DataApiDuration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Duration> for DataApiDuration {
    /// Saturates at `i64::MAX` nanoseconds
    fn from(duration: Duration) -> Self {
        Self::from_nanos(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Serialize for DataApiDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match active_config().duration_encoding {
            DurationEncoding::Iso8601 if !self.has_mixed_signs() => {
                serializer.serialize_str(&self.to_iso8601())
            }
            _ => {
                let mut state = serializer.serialize_struct("DataApiDuration", 3)?;
                state.serialize_field("months", &self.months)?;
                state.serialize_field("days", &self.days)?;
                state.serialize_field("nanoseconds", &self.nanoseconds)?;
                state.end()
            }
        }
    }
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = DataApiDuration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an ISO-8601 duration, a compact duration or a {months, days, nanoseconds} object")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        DataApiDuration::parse(v).map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut duration = DataApiDuration::default();
        while let Some(key) = map.next_key::<String>()? {
            if key.eq_ignore_ascii_case("months") {
                duration.months = map.next_value()?;
            } else if key.eq_ignore_ascii_case("days") {
                duration.days = map.next_value()?;
            } else if key.eq_ignore_ascii_case("nanoseconds") {
                duration.nanoseconds = map.next_value()?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(duration)
    }
}

impl<'de> Deserialize<'de> for DataApiDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Reserved key of the date wrapper object
pub const DATE_KEY: &str = "$date";

/// UTC timestamp with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataApiDate(DateTime<Utc>);

impl DataApiDate {
    /// Current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Timestamp from milliseconds since the Unix epoch
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Underlying chrono value
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for DataApiDate {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }
}

impl fmt::Display for DataApiDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for DataApiDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(DATE_KEY, &self.timestamp_millis())?;
        map.end()
    }
}

struct DateVisitor;

impl DateVisitor {
    fn from_millis<E: de::Error>(millis: i64) -> Result<DataApiDate, E> {
        DataApiDate::from_millis(millis)
            .ok_or_else(|| E::custom(format!("timestamp {} out of range", millis)))
    }
}

impl<'de> Visitor<'de> for DateVisitor {
    type Value = DataApiDate;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("epoch milliseconds, an RFC 3339 string or a {\"$date\": ...} object")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Self::from_millis(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let millis = i64::try_from(v).map_err(E::custom)?;
        Self::from_millis(millis)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        DateTime::parse_from_rfc3339(v)
            .map(|datetime| DataApiDate(datetime.with_timezone(&Utc)))
            .map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut date = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == DATE_KEY {
                date = Some(map.next_value::<DataApiDate>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        date.ok_or_else(|| de::Error::missing_field(DATE_KEY))
    }
}

impl<'de> Deserialize<'de> for DataApiDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DateVisitor)
    }
}
