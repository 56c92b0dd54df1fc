//! Expiry extraction from free-text WHOIS responses.
//!
//! Registries disagree on field names and date formats, so extraction is a
//! chain of parsers tried in priority order. Each one recognises its marker
//! line and pulls a date out of it; a marker line whose date does not parse is
//! skipped and the scan goes on.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub trait ExpiryParser: Send + Sync {
    /// Whether `line` carries this parser's expiry marker.
    fn matches(&self, line: &str) -> bool;

    /// Extracts the expiry from a marker line.
    fn extract(&self, line: &str) -> Option<DateTime<Utc>>;
}

/// `Registry Expiry Date: 2030-01-01T00:00:00Z` and its relatives.
#[derive(Debug, Default)]
pub struct EnglishExpiryParser;

impl EnglishExpiryParser {
    const FORMATS: [&'static str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];
}

impl ExpiryParser for EnglishExpiryParser {
    fn matches(&self, line: &str) -> bool {
        line.to_ascii_lowercase().contains("expir")
    }

    fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
        let (_, value) = line.trim().split_once(": ")?;
        let value = value.trim().replace('T', " ").to_ascii_uppercase();
        let value = value.strip_suffix('Z').unwrap_or(&value).trim();

        Self::FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|dt| dt.and_utc())
    }
}

/// JPRS style `[有効期限]    2030/01/01`, or `[Expires on]    2030/01/01` in
/// its English output.
#[derive(Debug, Default)]
pub struct JprsExpiryParser;

impl JprsExpiryParser {
    const MARKERS: [&'static str; 2] = ["有効期限", "[Expires on]"];
}

impl ExpiryParser for JprsExpiryParser {
    fn matches(&self, line: &str) -> bool {
        Self::MARKERS.iter().any(|marker| line.contains(marker))
    }

    fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
        let (_, value) = line.split_once(']')?;
        let date = NaiveDate::parse_from_str(value.trim(), "%Y/%m/%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

static PARSERS: [&dyn ExpiryParser; 2] = [&EnglishExpiryParser, &JprsExpiryParser];

/// Runs the parser chain over `raw`; `None` when no marker yields a date.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    PARSERS.iter().find_map(|parser| {
        raw.lines()
            .filter(|line| parser.matches(line))
            .find_map(|line| parser.extract(line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_english_iso_date() {
        let raw = "Domain Name: EXAMPLE.COM\r\n   Registry Expiry Date: 2030-01-01T00:00:00Z\r\n";
        assert_eq!(
            parse_expiry(raw),
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_english_variants() {
        let parser = EnglishExpiryParser;
        assert_eq!(
            parser.extract("Expiration Date: 2027-03-04 05:06:07"),
            Some(Utc.with_ymd_and_hms(2027, 3, 4, 5, 6, 7).unwrap())
        );
        assert_eq!(
            parser.extract("Registrar Registration Expiration Date: 2028-11-30T23:59:59.000Z"),
            Some(Utc.with_ymd_and_hms(2028, 11, 30, 23, 59, 59).unwrap())
        );
        assert!(parser.matches("Expiry Date: 2030-01-01"));
        assert!(parser.matches("expires: 2030-01-01"));
        assert_eq!(parser.extract("Expiry Date:"), None);
    }

    #[test]
    fn test_unparsable_marker_line_is_skipped() {
        let raw = "\
NOTICE: Expiration dates are shown in UTC
Registry Expiry Date: 2031-07-15T12:00:00Z
";
        assert_eq!(
            parse_expiry(raw),
            Some(Utc.with_ymd_and_hms(2031, 7, 15, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_japanese_label() {
        let raw = "\
[ドメイン名]                    EXAMPLE.JP
[登録年月日]                    2001/02/03
[有効期限]                      2029/02/28
[状態]                          Active
";
        assert_eq!(
            parse_expiry(raw),
            Some(Utc.with_ymd_and_hms(2029, 2, 28, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_jprs_english_output() {
        let raw = "\
Domain Information:
[Domain Name]                   EXAMPLE.JP
[Registered Date]               2001/02/03
[Expires on]                    2029/02/28
[Status]                        Active
[Last Update]                   2024/03/01 01:05:03 (JST)
";
        assert_eq!(
            parse_expiry(raw),
            Some(Utc.with_ymd_and_hms(2029, 2, 28, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(parse_expiry("No match for \"EXAMPLE.TEST\".\r\n"), None);
        assert_eq!(parse_expiry(""), None);
    }
}
