//! Date/interval arithmetic (spec §4.1).
//!
//! Everything here is pure integer nanosecond arithmetic; there is
//! deliberately no dependency on wall-clock libraries beyond `now()`
//! (provided by the caller, so tests can inject a fixed instant).

use std::time::Duration;

use fancy_regex::Regex;
use std::sync::OnceLock;

/// A unit drawn from the fixed InfluxQL-style duration literal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Ns,
    Us,
    Ms,
    S,
    M,
    H,
    D,
    W,
    /// Any suffix outside the fixed set. Carries a zero nanosecond factor,
    /// per spec: "unknown units map to zero duration (silent)".
    Unknown,
}

impl Unit {
    fn from_str(s: &str) -> Unit {
        match s {
            "ns" => Unit::Ns,
            "u" | "\u{b5}" => Unit::Us,
            "ms" => Unit::Ms,
            "s" => Unit::S,
            "m" => Unit::M,
            "h" => Unit::H,
            "d" => Unit::D,
            "w" => Unit::W,
            _ => Unit::Unknown,
        }
    }

    /// Nanoseconds-per-unit, per the fixed table in spec §3.
    pub fn nanos_factor(self) -> i64 {
        match self {
            Unit::Ns => 1,
            Unit::Us => 1_000,
            Unit::Ms => 1_000_000,
            Unit::S => 1_000_000_000,
            Unit::M => 60 * 1_000_000_000,
            Unit::H => 3600 * 1_000_000_000,
            Unit::D => 86_400 * 1_000_000_000,
            Unit::W => 7 * 86_400 * 1_000_000_000,
            Unit::Unknown => 0,
        }
    }
}

/// An integer number paired with a duration unit, e.g. `10s` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub number: i64,
    pub unit: Unit,
}

impl Interval {
    pub fn new(number: i64, unit: Unit) -> Self {
        Interval { number, unit }
    }

    /// Parse an InfluxQL-style duration literal such as `10s`, `1h`, `100u`.
    /// Mirrors `split_influx_time` in the original implementation: the
    /// leading run of digits is the number, everything after it is the
    /// unit.
    pub fn parse(text: &str) -> Option<Interval> {
        static DIGITS: OnceLock<Regex> = OnceLock::new();
        let re = DIGITS.get_or_init(|| Regex::new(r"^(\d+)(.*)$").unwrap());
        let text = text.trim();
        let caps = re.captures(text).ok()??;
        let number: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = Unit::from_str(caps.get(2)?.as_str().trim());
        Some(Interval { number, unit })
    }

    /// Convert to nanoseconds. Unknown units silently resolve to zero, so
    /// callers that add this to a bound treat it as "no shift".
    pub fn to_nanos(&self) -> i64 {
        self.number * self.unit.nanos_factor()
    }

    /// Convert to a wall-clock `Duration`. Fails for `ns`, preserving the
    /// edge case the original implementation has (its `timedelta` type
    /// cannot represent nanoseconds); `ns` intervals should be kept in
    /// nanosecond form via [`Interval::to_nanos`] instead.
    pub fn to_duration(&self) -> Option<Duration> {
        if matches!(self.unit, Unit::Ns) {
            return None;
        }
        let nanos = self.to_nanos();
        if nanos < 0 {
            return None;
        }
        Some(Duration::from_nanos(nanos as u64))
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.unit {
            Unit::Ns => "ns",
            Unit::Us => "u",
            Unit::Ms => "ms",
            Unit::S => "s",
            Unit::M => "m",
            Unit::H => "h",
            Unit::D => "d",
            Unit::W => "w",
            Unit::Unknown => "",
        };
        write!(f, "{}{}", self.number, unit)
    }
}

/// Add a (possibly negative) nanosecond shift to an absolute instant
/// expressed in nanoseconds. This is "compose duration and absolute time":
/// everything downstream works in nanoseconds so there is no intermediate
/// `Duration` round-trip (and thus no loss of `ns`-unit precision).
pub fn shift_nanos(timestamp_ns: i64, shift_ns: i64) -> i64 {
    timestamp_ns + shift_ns
}

/// Parse a retention-policy duration in the composite `<h>h<m>m<s>s` form
/// (e.g. `720h0m0s`) into a single nanosecond duration.
pub fn parse_rp_duration(text: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(?P<h>\d+)h(?P<m>\d+)m(?P<s>\d+)s$").unwrap());
    let caps = re.captures(text.trim()).ok()??;
    let h: i64 = caps.name("h")?.as_str().parse().ok()?;
    let m: i64 = caps.name("m")?.as_str().parse().ok()?;
    let s: i64 = caps.name("s")?.as_str().parse().ok()?;
    Some(h * Unit::H.nanos_factor() + m * Unit::M.nanos_factor() + s * Unit::S.nanos_factor())
}

/// Quantize a nanosecond instant to a coarser unit by floor division.
pub fn quantize_to_unit(timestamp_ns: i64, unit: Unit) -> i64 {
    let factor = unit.nanos_factor();
    if factor <= 1 {
        return timestamp_ns;
    }
    timestamp_ns.div_euclid(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_intervals() {
        assert_eq!(Interval::parse("10s"), Some(Interval::new(10, Unit::S)));
        assert_eq!(Interval::parse("1h"), Some(Interval::new(1, Unit::H)));
        assert_eq!(Interval::parse("100u"), Some(Interval::new(100, Unit::Us)));
        assert_eq!(Interval::parse("1w"), Some(Interval::new(1, Unit::W)));
    }

    #[test]
    fn week_is_seven_days() {
        assert_eq!(Interval::new(1, Unit::W).to_nanos(), 7 * Interval::new(1, Unit::D).to_nanos());
    }

    #[test]
    fn unknown_unit_is_zero_shift() {
        let i = Interval::parse("10x").unwrap();
        assert_eq!(i.to_nanos(), 0);
    }

    #[test]
    fn ns_has_no_duration() {
        assert!(Interval::new(5, Unit::Ns).to_duration().is_none());
        assert!(Interval::new(5, Unit::S).to_duration().is_some());
    }

    #[test]
    fn rp_duration_roundtrip() {
        let ns = parse_rp_duration("720h0m0s").unwrap();
        assert_eq!(ns, 720 * Unit::H.nanos_factor());
    }

    #[test]
    fn quantize_floors() {
        let ts = Unit::S.nanos_factor() * 90 + 5;
        assert_eq!(quantize_to_unit(ts, Unit::M), 1);
    }
}
