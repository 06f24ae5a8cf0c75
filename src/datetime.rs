use std::borrow::Cow;

use chrono::TimeZone;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    macros::format_description,
    Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
};

use crate::error::ApiError;

/// Parse an ISO-8601 timestamp into a UTC instant. Naive values are taken as UTC,
/// a bare date means midnight UTC.
pub fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt.to_offset(UtcOffset::UTC));
    }
    let raw = with_t_separator(raw);
    if let Ok(dt) = OffsetDateTime::parse(&raw, &Iso8601::DEFAULT) {
        return Some(dt.to_offset(UtcOffset::UTC));
    }
    if let Ok(dt) = PrimitiveDateTime::parse(&raw, &Iso8601::DEFAULT) {
        return Some(dt.assume_utc());
    }
    Date::parse(&raw, &Iso8601::DEFAULT)
        .ok()
        .map(|d| d.midnight().assume_utc())
}

/// Like [`parse_instant`], failing with an error that names `field`.
pub fn parse_param(field: &str, raw: &str) -> Result<OffsetDateTime, ApiError> {
    parse_instant(raw).ok_or_else(|| ApiError::invalid(field, "not an ISO-8601 datetime"))
}

/// Build a UTC instant from a local `date` + `time` in the IANA zone `tz` (default UTC).
/// An explicit offset carried by `time` wins over the zone.
pub fn from_local_parts(
    date: &str,
    time: &str,
    tz: Option<&str>,
) -> Result<OffsetDateTime, ApiError> {
    let combined = format!("{}T{}", date.trim(), time.trim());
    if let Ok(dt) = OffsetDateTime::parse(&combined, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(&combined, &Iso8601::DEFAULT))
    {
        return Ok(dt.to_offset(UtcOffset::UTC));
    }
    let local = PrimitiveDateTime::parse(&combined, &Iso8601::DEFAULT).map_err(|_| {
        ApiError::invalid(
            "date",
            "expected date like 2025-08-26 and time like 09:10:00",
        )
    })?;
    let name = tz.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("UTC");
    localize(local, name)
}

fn localize(local: PrimitiveDateTime, name: &str) -> Result<OffsetDateTime, ApiError> {
    let zone: chrono_tz::Tz = name
        .parse()
        .map_err(|_| ApiError::invalid("timezone", format!("unknown IANA timezone '{name}'")))?;
    let out_of_range = || ApiError::invalid("date", "date/time out of range");

    let naive = chrono::NaiveDate::from_ymd_opt(
        local.year(),
        u32::from(u8::from(local.month())),
        u32::from(local.day()),
    )
    .and_then(|d| {
        d.and_hms_nano_opt(
            u32::from(local.hour()),
            u32::from(local.minute()),
            u32::from(local.second()),
            local.nanosecond(),
        )
    })
    .ok_or_else(out_of_range)?;

    // DST overlaps resolve to the earlier instant; gaps have none.
    let zoned = zone.from_local_datetime(&naive).earliest().ok_or_else(|| {
        ApiError::invalid("time", format!("local time does not exist in '{name}'"))
    })?;
    let nanos = i128::from(zoned.timestamp()) * 1_000_000_000
        + i128::from(zoned.timestamp_subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| out_of_range())
}

fn with_t_separator(raw: &str) -> Cow<'_, str> {
    if raw.len() > 10 && raw.as_bytes()[10] == b' ' {
        let mut owned = raw.to_string();
        owned.replace_range(10..11, "T");
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(raw)
    }
}

/// RFC 3339 rendering of an ISO-8601 timestamp in the offset it was written with.
/// Naive timestamps stay naive; anything else (bare dates included) yields `None`.
pub fn canonical_datetime(raw: &str) -> Option<String> {
    let raw = with_t_separator(raw.trim());
    if let Ok(dt) = OffsetDateTime::parse(&raw, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(&raw, &Iso8601::DEFAULT))
    {
        return dt.format(&Rfc3339).ok();
    }
    let dt = PrimitiveDateTime::parse(&raw, &Iso8601::DEFAULT).ok()?;
    if dt.nanosecond() == 0 {
        dt.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
            .ok()
    } else {
        dt.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"
        ))
        .ok()
    }
}

pub fn canonical_date(raw: &str) -> Option<String> {
    let format = format_description!("[year]-[month]-[day]");
    let date = Date::parse(raw.trim(), format).ok()?;
    date.format(format).ok()
}

pub fn canonical_time(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let t = Time::parse(raw, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(raw, format_description!("[hour]:[minute]:[second].[subsecond]")))
        .or_else(|_| Time::parse(raw, format_description!("[hour]:[minute]")))
        .ok()?;
    t.format(format_description!("[hour]:[minute]:[second]")).ok()
}
