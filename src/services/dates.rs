use std::sync::OnceLock;

use chrono::{Datelike, Duration, Local, NaiveDate};
use regex::Regex;

use crate::services::text::fold;

/// Appointments may be booked at most this many days ahead.
pub const MAX_BOOKING_DAYS: i64 = 365;

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Debug, PartialEq)]
pub enum DateRejection {
    Past,
    BeyondWindow,
    Unparseable(String),
}

impl std::fmt::Display for DateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateRejection::Past => write!(
                f,
                "Não é possível agendar para uma data no passado. Por favor, escolha uma data futura."
            ),
            DateRejection::BeyondWindow => write!(
                f,
                "Agendamentos só podem ser feitos para os próximos {MAX_BOOKING_DAYS} dias."
            ),
            DateRejection::Unparseable(input) => write!(
                f,
                "Não consegui entender '{input}' como uma data. Por favor, use um formato claro como DD/MM/AAAA."
            ),
        }
    }
}

/// Parses a free-text appointment date and applies the booking window rules.
pub fn validate_appointment_date(input: &str, today: NaiveDate) -> Result<NaiveDate, DateRejection> {
    let date = parse_free_date(input, today)
        .ok_or_else(|| DateRejection::Unparseable(input.trim().to_string()))?;

    if date < today {
        return Err(DateRejection::Past);
    }
    if (date - today).num_days() > MAX_BOOKING_DAYS {
        return Err(DateRejection::BeyondWindow);
    }
    Ok(date)
}

const MONTHS: &[&str] = &[
    "janeiro", "fevereiro", "marco", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

struct Patterns {
    iso: Regex,
    day_first: Regex,
    month_name: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        iso: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("iso date pattern is valid"),
        day_first: Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})(?:[/.\-](\d{4}|\d{2}))?\b")
            .expect("day-first date pattern is valid"),
        month_name: Regex::new(&format!(
            r"\b(\d{{1,2}})\s*(?:de\s+)?({})(?:\s*(?:de\s+)?(\d{{4}}))?",
            MONTHS.join("|")
        ))
        .expect("month name pattern is valid"),
    })
}

/// Day-first, permissive date reading. Relative words are resolved against `today`.
pub fn parse_free_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = fold(input.trim());
    if text.is_empty() {
        return None;
    }

    let relative = [
        ("depois de amanha", 2),
        ("anteontem", -2),
        ("amanha", 1),
        ("ontem", -1),
        ("hoje", 0),
    ];
    if let Some((_, offset)) = relative.iter().find(|(word, _)| text.contains(*word)) {
        return Some(today + Duration::days(*offset));
    }

    let p = patterns();

    if let Some(caps) = p.iso.captures(&text) {
        return NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
    }

    if let Some(caps) = p.day_first.captures(&text) {
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = match caps.get(3) {
            Some(y) if y.as_str().len() == 2 => 2000 + y.as_str().parse::<i32>().ok()?,
            Some(y) => y.as_str().parse().ok()?,
            None => today.year(),
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = p.month_name.captures(&text) {
        let day = caps[1].parse().ok()?;
        let month = MONTHS.iter().position(|m| *m == &caps[2])? as u32 + 1;
        let year = match caps.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => today.year(),
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        d("2025-01-10")
    }

    #[test]
    fn test_yesterday_is_past() {
        assert_eq!(
            validate_appointment_date("09/01/2025", today()),
            Err(DateRejection::Past)
        );
        assert_eq!(validate_appointment_date("ontem", today()), Err(DateRejection::Past));
    }

    #[test]
    fn test_today_is_accepted() {
        let date = validate_appointment_date("10/01/2025", today()).unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2025-01-10");
    }

    #[test]
    fn test_window_boundary() {
        // 2026-01-10 is exactly 365 days after 2025-01-10
        assert_eq!(
            validate_appointment_date("10/01/2026", today()),
            Ok(d("2026-01-10"))
        );
        assert_eq!(
            validate_appointment_date("11/01/2026", today()),
            Err(DateRejection::BeyondWindow)
        );
        assert_eq!(
            validate_appointment_date("15/01/2026", today()),
            Err(DateRejection::BeyondWindow)
        );
    }

    #[test]
    fn test_unparseable_input() {
        let err = validate_appointment_date("semana que vem talvez", today()).unwrap_err();
        assert!(matches!(err, DateRejection::Unparseable(_)));
        assert!(err.to_string().contains("DD/MM/AAAA"));
        assert!(validate_appointment_date("31/02/2025", today()).is_err());
    }

    #[test]
    fn test_formats() {
        let t = today();
        assert_eq!(parse_free_date("15-03-2025", t), Some(d("2025-03-15")));
        assert_eq!(parse_free_date("15.03.25", t), Some(d("2025-03-15")));
        assert_eq!(parse_free_date("dia 15/3", t), Some(d("2025-03-15")));
        assert_eq!(parse_free_date("2025-03-15", t), Some(d("2025-03-15")));
        assert_eq!(parse_free_date("15 de março de 2025", t), Some(d("2025-03-15")));
        assert_eq!(parse_free_date("15 marco", t), Some(d("2025-03-15")));
        assert_eq!(parse_free_date("amanhã", t), Some(d("2025-01-11")));
        assert_eq!(parse_free_date("depois de amanhã", t), Some(d("2025-01-12")));
        assert_eq!(parse_free_date("anteontem", t), Some(d("2025-01-08")));
    }

    #[test]
    fn test_rejection_messages() {
        assert!(DateRejection::Past.to_string().contains("passado"));
        assert!(DateRejection::BeyondWindow.to_string().contains("365"));
    }
}
