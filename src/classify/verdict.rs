//! Verdict parsing.
//!
//! Classifier output is free text with a marker-prefix protocol: a configured
//! positive marker, a configured negative marker, anything else is ambiguous.
//! The parser is an explicit `marker -> kind` table so a new outcome kind is
//! a table entry, not a call-site change.

use std::time::SystemTime;

/// Structured classification outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerdictKind {
    Positive,
    Negative,
    Unknown,
}

/// Outcome of classifying one frame sample. Consumed once by the cooldown
/// gate and dispatcher; retained only inside an `AlertEvent` if accepted.
#[derive(Clone, Debug)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub raw_text: String,
    pub produced_at: SystemTime,
}

/// Prefix-match parser over configured marker strings.
#[derive(Clone, Debug)]
pub struct VerdictParser {
    markers: Vec<(String, VerdictKind)>,
}

impl VerdictParser {
    pub fn new(positive_marker: &str, negative_marker: &str) -> Self {
        Self {
            markers: vec![
                (positive_marker.to_string(), VerdictKind::Positive),
                (negative_marker.to_string(), VerdictKind::Negative),
            ],
        }
    }

    /// Map raw classifier text to a verdict.
    ///
    /// Matching is case-sensitive exact prefix, tolerant of trailing
    /// whitespace in the input. Text matching no marker maps to `Unknown`;
    /// the caller logs it and produces no alert.
    pub fn parse(&self, raw_text: &str, produced_at: SystemTime) -> Verdict {
        let text = raw_text.trim_end();
        let kind = self
            .markers
            .iter()
            .find(|(marker, _)| text.starts_with(marker.as_str()))
            .map(|(_, kind)| *kind)
            .unwrap_or(VerdictKind::Unknown);
        Verdict {
            kind,
            raw_text: raw_text.to_string(),
            produced_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn parser() -> VerdictParser {
        VerdictParser::new("FALL_DETECTED:", "NO_FALL:")
    }

    #[test]
    fn positive_marker_prefix_is_positive() {
        let v = parser().parse("FALL_DETECTED: person collapsed near bed", UNIX_EPOCH);
        assert_eq!(v.kind, VerdictKind::Positive);
        assert_eq!(v.raw_text, "FALL_DETECTED: person collapsed near bed");
    }

    #[test]
    fn negative_marker_prefix_is_negative() {
        let v = parser().parse("NO_FALL: person walking normally", UNIX_EPOCH);
        assert_eq!(v.kind, VerdictKind::Negative);
    }

    #[test]
    fn unmatched_text_is_unknown() {
        let v = parser().parse("the scene shows an empty corridor", UNIX_EPOCH);
        assert_eq!(v.kind, VerdictKind::Unknown);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let v = parser().parse("fall_detected: lowercase marker", UNIX_EPOCH);
        assert_eq!(v.kind, VerdictKind::Unknown);
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        let v = parser().parse("FALL_DETECTED:   \n", UNIX_EPOCH);
        assert_eq!(v.kind, VerdictKind::Positive);
    }

    #[test]
    fn leading_whitespace_is_not_tolerated() {
        let v = parser().parse("  FALL_DETECTED: indented", UNIX_EPOCH);
        assert_eq!(v.kind, VerdictKind::Unknown);
    }

    #[test]
    fn parse_is_idempotent() {
        let p = parser();
        let a = p.parse("FALL_DETECTED: same input", UNIX_EPOCH);
        let b = p.parse("FALL_DETECTED: same input", UNIX_EPOCH);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.raw_text, b.raw_text);
        assert_eq!(a.produced_at, b.produced_at);
    }
}
