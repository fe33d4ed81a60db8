// libs/appointment-cell/src/services/slot.rs
use chrono::{Datelike, NaiveDate, NaiveTime};

use shared_config::BookingConfig;

/// Clinic operating hours as a half-open range of 24-hour clock hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicHours {
    opening_hour: u32,
    closing_hour: u32,
}

impl Default for ClinicHours {
    fn default() -> Self {
        Self {
            opening_hour: 9,
            closing_hour: 22,
        }
    }
}

impl ClinicHours {
    pub fn new(opening_hour: u32, closing_hour: u32) -> Self {
        Self {
            opening_hour,
            closing_hour: closing_hour.min(24),
        }
    }

    pub fn from_config(config: &BookingConfig) -> Self {
        Self::new(config.opening_hour, config.closing_hour)
    }

    /// Whether a `hh:mm AM/PM` label falls inside opening hours. Never fails:
    /// anything that does not parse is simply outside.
    pub fn accepts(&self, label: &str) -> bool {
        match parse_time_label(label) {
            Some((hour, minute)) => {
                hour >= self.opening_hour && hour < self.closing_hour && minute <= 59
            }
            None => false,
        }
    }

    /// Human-readable range, e.g. "between 9:00 AM and 9:59 PM".
    pub fn describe(&self) -> String {
        let first = NaiveTime::from_hms_opt(self.opening_hour, 0, 0);
        let last = self
            .closing_hour
            .checked_sub(1)
            .and_then(|h| NaiveTime::from_hms_opt(h, 59, 0));

        match (first, last) {
            (Some(first), Some(last)) => format!(
                "between {} and {}",
                first.format("%-I:%M %p"),
                last.format("%-I:%M %p")
            ),
            _ => "during clinic hours".to_string(),
        }
    }

    pub fn rejection_message(&self) -> String {
        format!("Please select a time {}", self.describe())
    }

    /// The stored `hh:mm AM/PM` form of an accepted label, `None` when rejected.
    pub fn normalize(&self, label: &str) -> Option<String> {
        if !self.accepts(label) {
            return None;
        }
        normalize_time_label(label)
    }
}

/// Default-hours check for a single label.
pub fn is_within_clinic_hours(label: &str) -> bool {
    ClinicHours::default().accepts(label)
}

/// Splits `hh:mm AM/PM` into a 24-hour `(hour, minute)`.
///
/// Only the shape is checked here; range checks belong to [`ClinicHours::accepts`].
pub fn parse_time_label(label: &str) -> Option<(u32, u32)> {
    let mut tokens = label.split_whitespace();
    let (clock, meridiem) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(clock), Some(meridiem), None) => (clock, meridiem),
        _ => return None,
    };

    let (hour, minute) = clock.split_once(':')?;
    if minute.contains(':') {
        return None;
    }
    let hour: u32 = parse_digits(hour)?;
    let minute = parse_digits(minute)?;

    let hour = match meridiem.to_ascii_uppercase().as_str() {
        "PM" if hour != 12 => hour.checked_add(12)?,
        "PM" => hour,
        "AM" if hour == 12 => 0,
        "AM" => hour,
        _ => return None,
    };

    Some((hour, minute))
}

/// Unsigned decimal only: `u32::from_str` would also take a leading `+`.
fn parse_digits<T: std::str::FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Rewrites any parsable label as the zero-padded `hh:mm AM/PM` form.
pub fn normalize_time_label(label: &str) -> Option<String> {
    let (hour, minute) = parse_time_label(label)?;
    NaiveTime::from_hms_opt(hour, minute, 0).map(format_time_label)
}

/// Formats a time as the stored `hh:mm AM/PM` label.
pub fn format_time_label(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}

/// Formats a date as the stored `D/M/YYYY` label.
pub fn format_date_label(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

pub fn parse_date_label(label: &str) -> Option<NaiveDate> {
    let mut parts = label.trim().split('/');
    let (day, month, year) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(d), Some(m), Some(y), None) => (d, m, y),
        _ => return None,
    };

    NaiveDate::from_ymd_opt(parse_digits(year)?, parse_digits(month)?, parse_digits(day)?)
}

/// Rewrites a valid date label without zero padding, so `05/03/2025` and
/// `5/3/2025` name the same slot.
pub fn normalize_date_label(label: &str) -> Option<String> {
    parse_date_label(label).map(format_date_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twelve_hour_label(hour24: u32, minute: u32) -> String {
        let (hour12, meridiem) = match hour24 {
            0 => (12, "AM"),
            1..=11 => (hour24, "AM"),
            12 => (12, "PM"),
            _ => (hour24 - 12, "PM"),
        };
        format!("{:02}:{:02} {}", hour12, minute, meridiem)
    }

    #[test]
    fn test_every_open_minute_is_accepted() {
        for hour in 9..=21 {
            for minute in 0..=59 {
                let label = twelve_hour_label(hour, minute);
                assert!(is_within_clinic_hours(&label), "{} should be accepted", label);
            }
        }
    }

    #[test]
    fn test_closed_hours_are_rejected() {
        for hour in (0..=8).chain(22..=23) {
            for minute in [0, 30, 59] {
                let label = twelve_hour_label(hour, minute);
                assert!(!is_within_clinic_hours(&label), "{} should be rejected", label);
            }
        }
    }

    #[test]
    fn test_boundaries() {
        assert!(is_within_clinic_hours("09:00 AM"));
        assert!(is_within_clinic_hours("09:59 PM"));
        assert!(!is_within_clinic_hours("10:00 PM"));
        assert!(!is_within_clinic_hours("08:59 AM"));
        assert!(!is_within_clinic_hours("12:00 AM"));
        assert!(is_within_clinic_hours("12:00 PM"));
    }

    #[test]
    fn test_meridiem_is_case_insensitive() {
        assert!(is_within_clinic_hours("10:30 am"));
        assert!(is_within_clinic_hours("04:15 Pm"));
    }

    #[test]
    fn test_malformed_labels_are_rejected() {
        for label in ["", "9:00", "9:00 XM", "abc:def AM", "10:30 AM extra", "10:30:00 AM", ":30 AM", "10: AM", "-1:30 PM"] {
            assert!(!is_within_clinic_hours(label), "{:?} should be rejected", label);
        }
        assert!(!is_within_clinic_hours("10:75 AM"));
        assert!(!is_within_clinic_hours("4294967295:00 PM"));
    }

    #[test]
    fn test_validator_is_pure() {
        for label in ["10:30 AM", "11:00 PM", "garbage"] {
            let first = is_within_clinic_hours(label);
            for _ in 0..5 {
                assert_eq!(is_within_clinic_hours(label), first);
            }
        }
    }

    #[test]
    fn test_custom_hours() {
        let hours = ClinicHours::new(8, 18);
        assert!(hours.accepts("08:00 AM"));
        assert!(!hours.accepts("06:00 PM"));
        assert_eq!(hours.describe(), "between 8:00 AM and 5:59 PM");
    }

    #[test]
    fn test_default_rejection_message() {
        assert_eq!(
            ClinicHours::default().rejection_message(),
            "Please select a time between 9:00 AM and 9:59 PM"
        );
    }

    #[test]
    fn test_label_formatting() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert_eq!(format_date_label(date), "5/3/2025");
        assert_eq!(parse_date_label("5/3/2025"), Some(date));
        assert_eq!(parse_date_label("31/2/2025"), None);
        assert_eq!(parse_date_label("2025-03-05"), None);

        let time = NaiveTime::from_hms_opt(9, 5, 0).unwrap();
        assert_eq!(format_time_label(time), "09:05 AM");
        assert_eq!(format_time_label(NaiveTime::from_hms_opt(21, 30, 0).unwrap()), "09:30 PM");
    }

    #[test]
    fn test_signed_numbers_are_rejected() {
        assert!(!is_within_clinic_hours("+10:30 AM"));
        assert!(!is_within_clinic_hours("10:+30 AM"));
        assert_eq!(parse_date_label("+5/3/2025"), None);
        assert_eq!(parse_date_label("5/3/+2025"), None);
        assert_eq!(parse_date_label("5/3/-2025"), None);
    }

    #[test]
    fn test_labels_normalize_to_stored_form() {
        assert_eq!(normalize_date_label("05/03/2025").as_deref(), Some("5/3/2025"));
        assert_eq!(normalize_date_label(" 5/3/2025 ").as_deref(), Some("5/3/2025"));
        assert_eq!(normalize_date_label("5/13/2025"), None);

        assert_eq!(normalize_time_label("9:00 am").as_deref(), Some("09:00 AM"));
        assert_eq!(normalize_time_label("12:05 pm").as_deref(), Some("12:05 PM"));
        assert_eq!(normalize_time_label("10:75 AM"), None);

        let hours = ClinicHours::default();
        assert_eq!(hours.normalize("4:15 Pm").as_deref(), Some("04:15 PM"));
        assert_eq!(hours.normalize("10:00 PM"), None);
    }
}
