use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref DURATION_REGEX: Regex = Regex::new(r"^(?:\d+[smhd])+$").unwrap();
    static ref DURATION_PART_REGEX: Regex = Regex::new(r"(?P<amount>\d+)(?P<unit>[smhd])").unwrap();
}

#[readonly::make]
#[derive(Debug, Eq, PartialEq)]
pub struct ParsedDuration {
    pub seconds: u64,
}

// Parses duration specs like "30s", "1h30m" or "2d12h" into a total
// amount of seconds. Range limits are enforced by the command layer.
pub fn parse_duration(text: &str) -> Result<ParsedDuration> {
    if !DURATION_REGEX.is_match(text) {
        let message = format!(
            "The duration `{}` is invalid. Use digits followed by s/m/h/d, e.g. `1h30m`.",
            text
        );
        return Err(Error::Validation(message));
    }

    let mut seconds: u64 = 0;
    for captures in DURATION_PART_REGEX.captures_iter(text) {
        let amount = captures["amount"].parse::<u64>().map_err(|_| {
            Error::Validation(format!("The duration `{}` contains a too large number.", text))
        })?;
        let multiplier = match &captures["unit"] {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            _ => 24 * 60 * 60,
        };
        seconds = seconds.saturating_add(amount.saturating_mul(multiplier));
    }

    Ok(ParsedDuration { seconds })
}

#[cfg(test)]
mod tests {
    use crate::commands::giveaway::parser::parse_duration;

    #[test]
    fn test_parse_seconds() {
        let parsed = parse_duration("45s").unwrap();

        assert_eq!(parsed.seconds, 45);
    }

    #[test]
    fn test_parse_minutes() {
        let parsed = parse_duration("5m").unwrap();

        assert_eq!(parsed.seconds, 300);
    }

    #[test]
    fn test_parse_hours() {
        let parsed = parse_duration("2h").unwrap();

        assert_eq!(parsed.seconds, 7200);
    }

    #[test]
    fn test_parse_days() {
        let parsed = parse_duration("3d").unwrap();

        assert_eq!(parsed.seconds, 259_200);
    }

    #[test]
    fn test_parse_combined_units() {
        let parsed = parse_duration("1h30m").unwrap();

        assert_eq!(parsed.seconds, 5400);
    }

    #[test]
    fn test_parse_repeated_units_are_summed() {
        let parsed = parse_duration("10m10m").unwrap();

        assert_eq!(parsed.seconds, 1200);
    }

    #[test]
    fn test_parse_empty_string_is_rejected() {
        let result = parse_duration("");

        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_parse_plain_number_is_rejected() {
        let result = parse_duration("90");

        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_parse_unknown_unit_is_rejected() {
        let result = parse_duration("1w");

        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_parse_trailing_garbage_is_rejected() {
        let result = parse_duration("1h30m!");

        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_parse_spaces_are_rejected() {
        let result = parse_duration("1h 30m");

        assert_eq!(result.is_err(), true);
    }
}
