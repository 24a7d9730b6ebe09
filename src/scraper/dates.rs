//! Date text → canonical instant.
//!
//! SensCritique shows review dates as relative French phrases ("il y a 3 jours"),
//! absolute phrases ("le 4 nov. 2025"), sometimes a `datetime` attribute. All of
//! them end up as a UTC instant; the source text is kept for display.
//!
//! Relative phrases resolve against the `now` passed in, so the same text
//! harvested twice gives two different instants.

use crate::errors::{HarvestError, Result};
use chrono::{DateTime, Datelike, Local, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

static RELATIVE_FR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)il\s+y\s+a\s+(\d+)\s*(années?|ans?|jours?|semaines?|mois)\b").unwrap()
});

static RELATIVE_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(days?|weeks?|months?|years?)\s+ago\b").unwrap()
});

static TODAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:aujourd['’]hui|auj\.|today)").unwrap());

static YESTERDAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:hier|yesterday)\b").unwrap());

static KEYWORD_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:aujourd['’]hui|auj\.|today|hier|yesterday)\s*$").unwrap()
});

static ABSOLUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:le|on)\s+(\d{1,2})(?:er)?\s+(\p{L}+)\.?,?\s+(\d{4})\b").unwrap()
});

static NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Day,
    Week,
    Month,
    Year,
}

fn unit_from(word: &str) -> Option<Unit> {
    let w = word.to_lowercase();
    match w.as_str() {
        "jour" | "jours" | "day" | "days" => Some(Unit::Day),
        "semaine" | "semaines" | "week" | "weeks" => Some(Unit::Week),
        "mois" | "month" | "months" => Some(Unit::Month),
        "an" | "ans" | "année" | "années" | "year" | "years" => Some(Unit::Year),
        _ => None,
    }
}

/// Month number (1-12) for a French or English month name or abbreviation.
pub fn month_from_name(name: &str) -> Option<u32> {
    let n = name.trim().trim_end_matches('.').to_lowercase();
    let m = match n.as_str() {
        "jan" | "janv" | "janvier" | "january" => 1,
        "fév" | "févr" | "fev" | "fevr" | "février" | "fevrier" | "feb" | "february" => 2,
        "mar" | "mars" | "march" => 3,
        "avr" | "avril" | "apr" | "april" => 4,
        "mai" | "may" => 5,
        "jun" | "juin" | "june" => 6,
        "jul" | "juil" | "juillet" | "july" => 7,
        "aoû" | "août" | "aou" | "aout" | "aug" | "august" => 8,
        "sep" | "sept" | "septembre" | "september" => 9,
        "oct" | "octobre" | "october" => 10,
        "nov" | "novembre" | "november" => 11,
        "déc" | "décembre" | "dec" | "decembre" | "december" => 12,
        _ => return None,
    };
    Some(m)
}

fn local_midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn subtract(now: DateTime<Utc>, n: u32, unit: Unit) -> Option<DateTime<Utc>> {
    match unit {
        Unit::Day => now.checked_sub_signed(chrono::Duration::days(i64::from(n))),
        Unit::Week => now.checked_sub_signed(chrono::Duration::weeks(i64::from(n))),
        Unit::Month => now.checked_sub_months(Months::new(n)),
        Unit::Year => now.checked_sub_months(Months::new(n.checked_mul(12)?)),
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Machine-readable attribute value. Only `YYYY-MM-DD…` shapes are accepted.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    let s = value.trim();
    if !ISO_PREFIX.is_match(s) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    // "2025-11-04" or something we can't fully read after the date part
    let date = NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Human date text → instant, trying relative, keyword, absolute then numeric forms.
pub fn parse_date_text(text: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let miss = || HarvestError::DateParseMiss(text.to_string());

    let relative = RELATIVE_FR
        .captures(text)
        .or_else(|| RELATIVE_EN.captures(text));
    if let Some(caps) = relative {
        let n: u32 = caps[1].parse().map_err(|_| miss())?;
        let unit = unit_from(&caps[2]).ok_or_else(miss)?;
        return subtract(now, n, unit).ok_or_else(miss);
    }

    if TODAY.is_match(text) {
        return Ok(now);
    }
    if YESTERDAY.is_match(text) {
        return subtract(now, 1, Unit::Day).ok_or_else(miss);
    }

    if let Some(caps) = ABSOLUTE.captures(text) {
        let day: u32 = caps[1].parse().map_err(|_| miss())?;
        let month = month_from_name(&caps[2]).ok_or_else(miss)?;
        let year: i32 = caps[3].parse().map_err(|_| miss())?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(miss)?;
        return local_midnight(date).ok_or_else(miss);
    }

    if let Some(caps) = NUMERIC.captures(text) {
        let day: u32 = caps[1].parse().map_err(|_| miss())?;
        let month: u32 = caps[2].parse().map_err(|_| miss())?;
        let year: i32 = caps[3].parse().map_err(|_| miss())?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(miss)?;
        return local_midnight(date).ok_or_else(miss);
    }

    Err(miss())
}

/// Locate a date-shaped phrase inside arbitrary text.
///
/// Bare keywords only count when they are the whole text: "hier" is a common
/// word in review bodies.
pub fn find_date_phrase(text: &str) -> Option<String> {
    for re in [&*RELATIVE_FR, &*RELATIVE_EN, &*ABSOLUTE, &*NUMERIC] {
        if let Some(m) = re.find(text) {
            return Some(m.as_str().trim().to_string());
        }
    }
    if KEYWORD_ONLY.is_match(text) {
        return Some(text.trim().to_string());
    }
    None
}

pub fn is_iso_like(value: &str) -> bool {
    ISO_PREFIX.is_match(value.trim())
}

// ── Normalization ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDate {
    pub display: Option<String>,
    pub instant: Option<DateTime<Utc>>,
}

/// A usable ISO attribute wins; otherwise the display text is parsed.
/// Unparseable text stays as display-only.
pub fn normalize(
    date_text: Option<&str>,
    iso: Option<&str>,
    now: DateTime<Utc>,
) -> NormalizedDate {
    let display = date_text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let instant = iso.and_then(parse_iso).or_else(|| {
        let text = display.as_deref()?;
        match parse_date_text(text, now) {
            Ok(instant) => Some(instant),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    });

    NormalizedDate { display, instant }
}

// ── Display ───────────────────────────────────────────────────────────────────

const FR_MONTHS: [&str; 12] = [
    "janv.", "févr.", "mars", "avr.", "mai", "juin", "juil.", "août", "sept.", "oct.", "nov.",
    "déc.",
];

/// Re-derive the French "time ago" label from a canonical instant.
///
/// Returns `None` for instants in the future.
pub fn time_ago(instant: DateTime<Utc>, now: DateTime<Utc>) -> Option<String> {
    let seconds = now.signed_duration_since(instant).num_seconds();
    if seconds < 0 {
        return None;
    }
    if seconds < 60 {
        return Some("À l'instant".to_string());
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return Some(format!("{} min", minutes));
    }
    let hours = minutes / 60;
    if hours < 24 {
        return Some(format!("{}h", hours));
    }
    let days = hours / 24;
    if days == 1 {
        return Some("Hier".to_string());
    }
    if days < 7 {
        return Some(format!("il y a {} jours", days));
    }
    let weeks = days / 7;
    if weeks < 4 {
        let plural = if weeks > 1 { "s" } else { "" };
        return Some(format!("il y a {} semaine{}", weeks, plural));
    }
    let local = instant.with_timezone(&Local);
    let month = FR_MONTHS[local.month0() as usize];
    Some(format!("le {} {} {}", local.day(), month, local.year()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 20, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_relative_days_french_and_english() {
        let t = now();
        let expected = t - chrono::Duration::days(3);
        assert_eq!(parse_date_text("il y a 3 jours", t).unwrap(), expected);
        assert_eq!(parse_date_text("3 days ago", t).unwrap(), expected);
        assert_eq!(parse_date_text("Il y a 1 jour", t).unwrap(), t - chrono::Duration::days(1));
    }

    #[test]
    fn test_relative_against_wall_clock_within_one_second() {
        let before = Utc::now();
        let parsed = parse_date_text("3 days ago", Utc::now()).unwrap();
        let target = before - chrono::Duration::days(3);
        let diff = (parsed - target).num_milliseconds().abs();
        assert!(diff < 1_000, "drift {}ms", diff);
    }

    #[test]
    fn test_one_and_two_days_differ_by_exactly_a_day() {
        let t = now();
        let one = parse_date_text("1 day ago", t).unwrap();
        let two = parse_date_text("2 days ago", t).unwrap();
        assert_eq!(one - two, chrono::Duration::days(1));
    }

    #[test]
    fn test_relative_weeks_months_years() {
        let t = now();
        assert_eq!(
            parse_date_text("il y a 2 semaines", t).unwrap(),
            t - chrono::Duration::days(14)
        );
        assert_eq!(
            parse_date_text("il y a 3 mois", t).unwrap(),
            Utc.with_ymd_and_hms(2025, 8, 20, 15, 30, 0).unwrap()
        );
        assert_eq!(
            parse_date_text("il y a 1 an", t).unwrap(),
            Utc.with_ymd_and_hms(2024, 11, 20, 15, 30, 0).unwrap()
        );
        assert_eq!(
            parse_date_text("2 years ago", t).unwrap(),
            Utc.with_ymd_and_hms(2023, 11, 20, 15, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_keywords() {
        let t = now();
        assert_eq!(parse_date_text("Aujourd'hui", t).unwrap(), t);
        assert_eq!(parse_date_text("today", t).unwrap(), t);
        assert_eq!(parse_date_text("Hier", t).unwrap(), t - chrono::Duration::days(1));
    }

    #[test]
    fn test_absolute_phrase_is_local_midnight() {
        for text in ["on 4 Nov 2025", "le 4 nov. 2025", "le 4 novembre 2025"] {
            let instant = parse_date_text(text, now()).unwrap();
            let local = instant.with_timezone(&Local);
            assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2025, 11, 4).unwrap());
            assert_eq!((local.hour(), local.minute(), local.second()), (0, 0, 0));
        }
    }

    #[test]
    fn test_numeric_day_first() {
        let instant = parse_date_text("publié le 03/02/2024", now()).unwrap();
        let local = instant.with_timezone(&Local);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
    }

    #[test]
    fn test_unrecognised_text_is_a_miss() {
        let err = parse_date_text("la semaine des quatre jeudis", now()).unwrap_err();
        assert!(matches!(err, HarvestError::DateParseMiss(_)));
        assert!(parse_date_text("le 31 février 2025", now()).is_err());
    }

    #[test]
    fn test_iso_attribute() {
        assert_eq!(
            parse_iso("2025-11-04T10:00:00Z"),
            Some(Utc.with_ymd_and_hms(2025, 11, 4, 10, 0, 0).unwrap())
        );
        assert_eq!(
            parse_iso("2025-11-04T10:00:00.000+01:00"),
            Some(Utc.with_ymd_and_hms(2025, 11, 4, 9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_iso("2025-11-04"),
            Some(Utc.with_ymd_and_hms(2025, 11, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_iso("04/11/2025"), None);
    }

    #[test]
    fn test_normalize_prefers_iso_and_keeps_display() {
        let n = normalize(Some(" il y a 2 jours "), Some("2025-11-01T00:00:00Z"), now());
        assert_eq!(n.display.as_deref(), Some("il y a 2 jours"));
        assert_eq!(n.instant, Some(Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap()));

        let bad_iso = normalize(Some("il y a 2 jours"), Some("n/a"), now());
        assert_eq!(bad_iso.instant, Some(now() - chrono::Duration::days(2)));

        let undated = normalize(Some("un jour peut-être"), None, now());
        assert_eq!(undated.display.as_deref(), Some("un jour peut-être"));
        assert_eq!(undated.instant, None);
    }

    #[test]
    fn test_find_date_phrase() {
        assert_eq!(
            find_date_phrase("Par KiMi_ · il y a 5 jours · 3 likes").as_deref(),
            Some("il y a 5 jours")
        );
        assert_eq!(
            find_date_phrase("Publiée le 12 janv. 2024").as_deref(),
            Some("le 12 janv. 2024")
        );
        assert_eq!(find_date_phrase("Hier"), Some("Hier".to_string()));
        assert_eq!(find_date_phrase("Je l'ai vu hier soir au cinéma"), None);
    }

    #[test]
    fn test_time_ago_labels() {
        let t = now();
        assert_eq!(time_ago(t - chrono::Duration::seconds(10), t).unwrap(), "À l'instant");
        assert_eq!(time_ago(t - chrono::Duration::minutes(5), t).unwrap(), "5 min");
        assert_eq!(time_ago(t - chrono::Duration::hours(3), t).unwrap(), "3h");
        assert_eq!(time_ago(t - chrono::Duration::days(1), t).unwrap(), "Hier");
        assert_eq!(time_ago(t - chrono::Duration::days(4), t).unwrap(), "il y a 4 jours");
        assert_eq!(time_ago(t - chrono::Duration::days(14), t).unwrap(), "il y a 2 semaines");
        assert!(time_ago(t - chrono::Duration::days(90), t).unwrap().starts_with("le "));
        assert_eq!(time_ago(t + chrono::Duration::hours(1), t), None);
    }
}
