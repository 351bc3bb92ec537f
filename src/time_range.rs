use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};

/// The dashboard time range a report is rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
}

impl TimeRange {
    pub fn new(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> Self {
        TimeRange { from, to }
    }

    pub fn parse_rfc3339(from: &str, to: &str) -> Result<Self, chrono::ParseError> {
        Ok(TimeRange {
            from: DateTime::parse_from_rfc3339(from)?,
            to: DateTime::parse_from_rfc3339(to)?,
        })
    }

    pub fn format_from(&self, pattern: &str) -> String {
        format_moment(&self.from, pattern)
    }

    pub fn format_to(&self, pattern: &str) -> String {
        format_moment(&self.to, pattern)
    }
}

// Longest first wherever one token is a prefix of another.
const TOKENS: &[&str] = &[
    "YYYY", "YY", "MMMM", "MMM", "MM", "M", "Do", "DD", "D", "dddd", "ddd", "HH", "H", "hh", "h",
    "mm", "m", "ss", "s", "SSS", "A", "a", "ZZ", "Z", "X", "x",
];

/// Format a timestamp with a moment.js-style pattern such as
/// `YYYY-MM-DD HH:mm`. Text in `[brackets]` is copied literally, as is
/// anything that is not a recognised token.
pub fn format_moment(time: &DateTime<FixedOffset>, pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        if c == '[' {
            match rest.find(']') {
                Some(end) => {
                    out.push_str(&rest[1..end]);
                    rest = &rest[end + 1..];
                }
                None => {
                    out.push_str(rest);
                    rest = "";
                }
            }
            continue;
        }
        match TOKENS.iter().find(|token| rest.starts_with(**token)) {
            Some(token) => {
                out.push_str(&expand(time, token));
                rest = &rest[token.len()..];
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

fn expand(time: &DateTime<FixedOffset>, token: &str) -> String {
    let (pm, hour12) = time.hour12();
    match token {
        "YYYY" => format!("{:04}", time.year()),
        "YY" => format!("{:02}", time.year().rem_euclid(100)),
        "MMMM" => time.format("%B").to_string(),
        "MMM" => time.format("%b").to_string(),
        "MM" => format!("{:02}", time.month()),
        "M" => time.month().to_string(),
        "Do" => ordinal(time.day()),
        "DD" => format!("{:02}", time.day()),
        "D" => time.day().to_string(),
        "dddd" => time.format("%A").to_string(),
        "ddd" => time.format("%a").to_string(),
        "HH" => format!("{:02}", time.hour()),
        "H" => time.hour().to_string(),
        "hh" => format!("{:02}", hour12),
        "h" => hour12.to_string(),
        "mm" => format!("{:02}", time.minute()),
        "m" => time.minute().to_string(),
        "ss" => format!("{:02}", time.second()),
        "s" => time.second().to_string(),
        "SSS" => format!("{:03}", time.timestamp_subsec_millis().min(999)),
        "A" => meridiem(pm).to_string(),
        "a" => meridiem(pm).to_lowercase(),
        "ZZ" => time.format("%z").to_string(),
        "Z" => time.format("%:z").to_string(),
        "X" => time.timestamp().to_string(),
        "x" => time.timestamp_millis().to_string(),
        other => other.to_string(),
    }
}

fn meridiem(pm: bool) -> &'static str {
    if pm {
        "PM"
    } else {
        "AM"
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", day, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> TimeRange {
        TimeRange::parse_rfc3339("2021-03-01T09:05:07.042+01:00", "2021-03-22T18:30:00Z").unwrap()
    }

    #[test]
    fn test_numeric_tokens() {
        let r = range();
        assert_eq!(r.format_from("YYYY-MM-DD HH:mm:ss.SSS"), "2021-03-01 09:05:07.042");
        assert_eq!(r.format_from("YY/M/D H:m:s"), "21/3/1 9:5:7");
        assert_eq!(r.format_to("hh:mm A"), "06:30 PM");
        assert_eq!(r.format_to("h a"), "6 pm");
    }

    #[test]
    fn test_names_and_ordinals() {
        let r = range();
        assert_eq!(r.format_from("dddd, MMMM Do"), "Monday, March 1st");
        assert_eq!(r.format_to("ddd MMM Do"), "Mon Mar 22nd");
    }

    #[test]
    fn test_offsets_and_epochs() {
        let r = range();
        assert_eq!(r.format_from("Z"), "+01:00");
        assert_eq!(r.format_from("ZZ"), "+0100");
        assert_eq!(r.format_to("X"), "1616437800");
        assert_eq!(r.format_to("x"), "1616437800000");
    }

    #[test]
    fn test_literals_pass_through() {
        let r = range();
        assert_eq!(r.format_from("[Week of] YYYY"), "Week of 2021");
        assert_eq!(r.format_from("YYYY!"), "2021!");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(23), "23rd");
    }
}
