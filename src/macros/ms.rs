//! `ms.macro`: human readable durations to milliseconds at build time.
//!
//! ```js
//! import { ms } from 'ms.macro';
//! setTimeout(poll, ms('2 days'));   // -> setTimeout(poll, 172800000);
//! ```

use anyhow::{anyhow, bail};
use lazy_static::lazy_static;
use regex::Regex;

use super::{invocation_range, static_string};
use crate::definition::{MacroDefinition, MacroSpecifier};
use crate::eval::js_number_text;

pub const MS_SOURCE: &str = "ms.macro";

const SECOND: f64 = 1000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)\s*(\w+)?$").unwrap();
}

pub fn ms_macro() -> MacroDefinition {
    MacroDefinition::new(MS_SOURCE).specifier(
        "ms",
        MacroSpecifier::new(invocation_range, |_, expr| {
            let time = static_string(expr)?;
            Ok(js_number_text(parse_duration(&time)?))
        }),
    )
}

/// `"1.5h"` → 5400000. A bare number is in seconds.
pub fn parse_duration(time: &str) -> anyhow::Result<f64> {
    let invalid = || anyhow!("Format \"{}\" isn't a valid time for {}", time, MS_SOURCE);
    let caps = DURATION_RE.captures(time).ok_or_else(invalid)?;
    let amount: f64 = caps[1].parse().map_err(|_| invalid())?;
    let unit = caps.get(2).map_or("s", |m| m.as_str());

    let factor = match unit.to_ascii_lowercase().chars().next() {
        Some('s') => SECOND,
        Some('m') => MINUTE,
        Some('h') => HOUR,
        Some('d') => DAY,
        Some('w') => WEEK,
        Some('y') => YEAR,
        _ => bail!("Unknown unit \"{}\" in \"{}\"", unit, time),
    };
    Ok(amount * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("1s").unwrap(), 1000.0);
        assert_eq!(parse_duration("10").unwrap(), 10_000.0);
        assert_eq!(parse_duration("2 minutes").unwrap(), 120_000.0);
        assert_eq!(parse_duration("1.5h").unwrap(), 5_400_000.0);
        assert_eq!(parse_duration("1 Day").unwrap(), 86_400_000.0);
        assert_eq!(parse_duration("1w").unwrap(), 604_800_000.0);
        assert_eq!(parse_duration("1y").unwrap(), 31_557_600_000.0);
    }

    #[test]
    fn test_invalid_formats() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("3 fortnights").is_err());
    }
}
