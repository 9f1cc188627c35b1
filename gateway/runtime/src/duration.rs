use std::{fmt, str::FromStr, time::Duration};

/// A positive duration parsed from a Go-style duration string, e.g. `30s`, `1m30s` or `1.5h`.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Interval(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("duration must be positive")]
    NotPositive,

    #[error("duration is too large")]
    OutOfRange,
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

impl From<Interval> for Duration {
    fn from(Interval(duration): Interval) -> Self {
        duration
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl FromStr for Interval {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn unit(unit: &str) -> Result<Duration, ParseError> {
            const MINUTE: Duration = Duration::from_secs(60);
            match unit {
                "ns" => Ok(Duration::from_nanos(1)),
                // U+00B5 is the "micro sign" while U+03BC is "Greek letter mu"
                "us" | "\u{00b5}s" | "\u{03bc}s" => Ok(Duration::from_micros(1)),
                "ms" => Ok(Duration::from_millis(1)),
                "s" => Ok(Duration::from_secs(1)),
                "m" => Ok(MINUTE),
                "h" => Ok(MINUTE * 60),
                _ => Err(ParseError::InvalidUnit),
            }
        }

        let s = s.trim();
        if s.starts_with('-') {
            return Err(ParseError::NotPositive);
        }
        let mut rest = s.strip_prefix('+').unwrap_or(s);
        if rest == "0" {
            return Err(ParseError::NotPositive);
        }

        let mut total = Duration::ZERO;
        while !rest.is_empty() {
            let unit_start = rest
                .find(|c: char| c.is_alphabetic())
                .ok_or(ParseError::NoUnit)?;
            let (val, tail) = rest.split_at(unit_start);
            let val = val.parse::<f64>()?;
            let unit_end = tail
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(tail.len());
            let (u, tail) = tail.split_at(unit_end);
            if val.is_sign_negative() {
                return Err(ParseError::NotPositive);
            }
            let part = Duration::try_from_secs_f64(unit(u)?.as_secs_f64() * val)
                .map_err(|_| ParseError::OutOfRange)?;
            total = total.checked_add(part).ok_or(ParseError::OutOfRange)?;
            rest = tail;
        }

        if total.is_zero() {
            return Err(ParseError::NotPositive);
        }
        Ok(Self(total))
    }
}
