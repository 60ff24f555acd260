//! Combination codec.
//!
//! Text form: segments joined by `" + "`, each a medicine name in capitals
//! optionally followed by a `(m+a+n)` dosage group:
//!
//! ```text
//! COBECWT (1+0+0) + SLIM-X (0+1+0) + COBECGT(0+0+1)
//! ```
//!
//! [`parse`] is best-effort and never fails; [`parse_strict`] rejects any
//! malformed segment. Neither merges repeated medicines; see
//! [`CombinationDescriptor::merged`].

pub mod legacy;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::models::{CombinationComponent, CombinationDescriptor, DosagePattern};

pub use legacy::LegacyFields;

/// Separator between combination segments.
pub const SEGMENT_SEPARATOR: &str = " + ";

/// Combination text errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Combination text is empty")]
    Empty,

    #[error("Malformed combination segment: {0:?}")]
    MalformedSegment(String),

    #[error("Malformed dosage pattern: {0:?}")]
    MalformedDosage(String),

    #[error("Malformed legacy combination field: {0}")]
    MalformedLegacy(String),
}

static LEADING_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z\-]+)").expect("valid regex"));

static MEDICINE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z\-]+$").expect("valid regex"));

static DOSAGE_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("valid regex"));

static STRICT_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z\-]+)(?:\s*\(\s*(\d+)\s*\+\s*(\d+)\s*\+\s*(\d+)\s*\))?$")
        .expect("valid regex")
});

fn segments(text: &str) -> impl Iterator<Item = &str> {
    text.split(SEGMENT_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse combination text, skipping segments that carry no medicine name.
///
/// A segment whose dosage group is missing or unreadable keeps its name with
/// dosage `0+0+0`.
pub fn parse(text: &str) -> CombinationDescriptor {
    let mut components = Vec::new();
    for segment in segments(text) {
        let Some(name) = LEADING_NAME_RE.captures(segment).map(|c| c[1].to_string()) else {
            debug!(segment, "Skipping combination segment without medicine name");
            continue;
        };
        let dosage = DOSAGE_GROUP_RE
            .captures(&segment[name.len()..])
            .and_then(|c| c[1].parse::<DosagePattern>().ok())
            .unwrap_or_default();
        components.push(CombinationComponent::new(name, dosage));
    }
    CombinationDescriptor::new(components)
}

/// Parse combination text, failing on the first malformed segment.
pub fn parse_strict(text: &str) -> Result<CombinationDescriptor, ParseError> {
    let mut components = Vec::new();
    for segment in segments(text) {
        let caps = STRICT_SEGMENT_RE
            .captures(segment)
            .ok_or_else(|| ParseError::MalformedSegment(segment.to_string()))?;
        let dosage = match (caps.get(2), caps.get(3), caps.get(4)) {
            (Some(m), Some(a), Some(n)) => DosagePattern::new(
                parse_units(m.as_str(), segment)?,
                parse_units(a.as_str(), segment)?,
                parse_units(n.as_str(), segment)?,
            ),
            _ => DosagePattern::default(),
        };
        components.push(CombinationComponent::new(&caps[1], dosage));
    }
    if components.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(CombinationDescriptor::new(components))
}

fn parse_units(digits: &str, segment: &str) -> Result<u32, ParseError> {
    digits
        .parse()
        .map_err(|_| ParseError::MalformedDosage(segment.to_string()))
}

/// Whether `name` is a base medicine name the text form can carry.
pub fn is_medicine_name(name: &str) -> bool {
    MEDICINE_NAME_RE.is_match(name)
}

/// Render a descriptor as combination text, in descriptor order.
pub fn format(descriptor: &CombinationDescriptor) -> String {
    descriptor
        .components
        .iter()
        .map(|c| format!("{} ({})", c.base_medicine_name, c.dosage))
        .collect::<Vec<_>>()
        .join(SEGMENT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn component(name: &str, m: u32, a: u32, n: u32) -> CombinationComponent {
        CombinationComponent::new(name, DosagePattern::new(m, a, n))
    }

    #[test]
    fn test_parse_two_components() {
        let d = parse("COBECWT (1+0+0) + COBECGT (0+0+1)");
        assert_eq!(
            d.components,
            vec![component("COBECWT", 1, 0, 0), component("COBECGT", 0, 0, 1)]
        );
    }

    #[test]
    fn test_parse_without_space_before_dosage() {
        let d = parse("SLIM-X(2+0+2) + COBECPT(0+0+1)");
        assert_eq!(
            d.components,
            vec![component("SLIM-X", 2, 0, 2), component("COBECPT", 0, 0, 1)]
        );
    }

    #[test]
    fn test_parse_name_without_dosage() {
        let d = parse("COBECWT + COBECGT (0+1+0)");
        assert_eq!(
            d.components,
            vec![component("COBECWT", 0, 0, 0), component("COBECGT", 0, 1, 0)]
        );
    }

    #[test]
    fn test_parse_skips_segments_without_name() {
        let d = parse("cobecwt (1+0+0) + COBECGT (0+0+1) + (1+1+1)");
        assert_eq!(d.components, vec![component("COBECGT", 0, 0, 1)]);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse("").is_empty());
        assert!(parse("take two daily").is_empty());
    }

    #[test]
    fn test_parse_keeps_repeated_names() {
        let d = parse("A (2+0+1) + B (0+1+0) + A (0+0+1)");
        assert_eq!(
            d.components,
            vec![
                component("A", 2, 0, 1),
                component("B", 0, 1, 0),
                component("A", 0, 0, 1),
            ]
        );
        assert_eq!(
            d.merged().components,
            vec![component("A", 2, 0, 2), component("B", 0, 1, 0)]
        );
    }

    #[test]
    fn test_parse_malformed_dosage_defaults_to_zero() {
        let d = parse("COBECWT (1+x+0)");
        assert_eq!(d.components, vec![component("COBECWT", 0, 0, 0)]);
    }

    #[test]
    fn test_parse_strict() {
        let d = parse_strict("COBECWT(1+0+0) + SLIM-X (0+1+0)").unwrap();
        assert_eq!(d.len(), 2);

        assert_eq!(
            parse_strict("COBECWT (1+0+0) + cobecgt (0+0+1)"),
            Err(ParseError::MalformedSegment("cobecgt (0+0+1)".into()))
        );
        assert!(matches!(
            parse_strict("COBECWT (1+0)"),
            Err(ParseError::MalformedSegment(_))
        ));
        assert_eq!(parse_strict("   "), Err(ParseError::Empty));
    }

    #[test]
    fn test_format() {
        let d = CombinationDescriptor::new(vec![
            component("COBECWT", 1, 0, 0),
            component("COBECGT", 0, 0, 1),
        ]);
        assert_eq!(format(&d), "COBECWT (1+0+0) + COBECGT (0+0+1)");
        assert_eq!(format(&CombinationDescriptor::default()), "");
    }

    #[test]
    fn test_is_medicine_name() {
        assert!(is_medicine_name("SLIM-X"));
        assert!(!is_medicine_name("Cobecwt"));
        assert!(!is_medicine_name("COBECWT (1+0+0)"));
        assert!(!is_medicine_name(""));
    }

    fn unique_descriptor() -> impl Strategy<Value = CombinationDescriptor> {
        prop::collection::btree_map("[A-Z][A-Z-]{0,8}", (0u32..10, 0u32..10, 0u32..10), 0..6)
            .prop_flat_map(|map| {
                let entries: Vec<_> = map.into_iter().collect();
                Just(entries).prop_shuffle()
            })
            .prop_map(|entries| {
                CombinationDescriptor::new(
                    entries
                        .into_iter()
                        .map(|(name, (m, a, n))| component(&name, m, a, n))
                        .collect(),
                )
            })
    }

    proptest! {
        #[test]
        fn prop_format_parse_round_trip(d in unique_descriptor()) {
            prop_assert_eq!(parse(&format(&d)), d.clone());
            if !d.is_empty() {
                prop_assert_eq!(parse_strict(&format(&d)), Ok(d));
            }
        }

        #[test]
        fn prop_parse_never_panics(text in "\\PC{0,60}") {
            let d = parse(&text);
            prop_assert!(d.len() <= text.split(SEGMENT_SEPARATOR).count());
        }
    }
}
