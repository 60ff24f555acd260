//! Medicine definition models: simple medicines and predefined combinations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::{self, ParseError};

/// Per-day dosage as (morning, afternoon, night) unit counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DosagePattern {
    pub morning: u32,
    pub afternoon: u32,
    pub night: u32,
}

impl DosagePattern {
    pub fn new(morning: u32, afternoon: u32, night: u32) -> Self {
        Self {
            morning,
            afternoon,
            night,
        }
    }

    /// Human-readable schedule, e.g. "1 Morning, 2 Night".
    pub fn schedule(&self) -> String {
        let mut times = Vec::new();
        if self.morning > 0 {
            times.push(format!("{} Morning", self.morning));
        }
        if self.afternoon > 0 {
            times.push(format!("{} Afternoon", self.afternoon));
        }
        if self.night > 0 {
            times.push(format!("{} Night", self.night));
        }
        times.join(", ")
    }
}

impl DosagePattern {
    /// Slot-wise sum, `None` if any slot overflows.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self {
            morning: self.morning.checked_add(other.morning)?,
            afternoon: self.afternoon.checked_add(other.afternoon)?,
            night: self.night.checked_add(other.night)?,
        })
    }

    /// Slot-wise sum, clamped at `u32::MAX`.
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            morning: self.morning.saturating_add(other.morning),
            afternoon: self.afternoon.saturating_add(other.afternoon),
            night: self.night.saturating_add(other.night),
        }
    }
}

impl fmt::Display for DosagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}+{}", self.morning, self.afternoon, self.night)
    }
}

impl FromStr for DosagePattern {
    type Err = ParseError;

    /// Parse `"m+a+n"`, with or without surrounding parentheses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let parts: Vec<&str> = inner.split('+').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ParseError::MalformedDosage(s.to_string()));
        }
        let mut units = [0u32; 3];
        for (slot, part) in units.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(ParseError::MalformedDosage(s.to_string()));
            }
            *slot = part
                .parse()
                .map_err(|_| ParseError::MalformedDosage(s.to_string()))?;
        }
        Ok(Self::new(units[0], units[1], units[2]))
    }
}

/// One base medicine inside a combination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombinationComponent {
    pub base_medicine_name: String,
    pub dosage: DosagePattern,
}

impl CombinationComponent {
    pub fn new(base_medicine_name: impl Into<String>, dosage: DosagePattern) -> Self {
        Self {
            base_medicine_name: base_medicine_name.into(),
            dosage,
        }
    }
}

/// Ordered list of combination components.
///
/// The codec produces and consumes this form; it may contain the same base
/// medicine more than once until [`CombinationDescriptor::merged`] is applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombinationDescriptor {
    pub components: Vec<CombinationComponent>,
}

impl CombinationDescriptor {
    pub fn new(components: Vec<CombinationComponent>) -> Self {
        Self { components }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Base medicine names in descriptor order (duplicates kept).
    pub fn names(&self) -> Vec<&str> {
        self.components
            .iter()
            .map(|c| c.base_medicine_name.as_str())
            .collect()
    }

    /// Whether every base medicine appears at most once.
    pub fn has_unique_names(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.components
            .iter()
            .all(|c| seen.insert(c.base_medicine_name.as_str()))
    }

    /// Sum dosages of repeated base medicines into one component each.
    ///
    /// The first occurrence fixes the position of the merged component.
    /// Sums that overflow are clamped; use [`Self::try_merged`] to reject them.
    pub fn merged(&self) -> Self {
        self.merge_with(|a, b| Some(a.saturating_add(b)))
            .unwrap_or_default()
    }

    /// Like [`Self::merged`], but fails when a summed dosage overflows.
    pub fn try_merged(&self) -> Result<Self, ParseError> {
        self.merge_with(DosagePattern::checked_add)
    }

    fn merge_with<F>(&self, add: F) -> Result<Self, ParseError>
    where
        F: Fn(DosagePattern, DosagePattern) -> Option<DosagePattern>,
    {
        let mut merged: Vec<CombinationComponent> = Vec::with_capacity(self.components.len());
        for component in &self.components {
            match merged
                .iter_mut()
                .find(|m| m.base_medicine_name == component.base_medicine_name)
            {
                Some(existing) => {
                    existing.dosage = add(existing.dosage, component.dosage).ok_or_else(|| {
                        ParseError::MalformedDosage(format!(
                            "{} ({}) + ({})",
                            existing.base_medicine_name, existing.dosage, component.dosage
                        ))
                    })?;
                }
                None => merged.push(component.clone()),
            }
        }
        Ok(Self { components: merged })
    }

    /// Generated description, e.g. "COBECWT: 1 Morning | COBECGT: 1 Night".
    pub fn describe(&self) -> String {
        self.components
            .iter()
            .map(|c| format!("{}: {}", c.base_medicine_name, c.dosage.schedule()))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Variant-specific part of a medicine definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MedicineKind {
    /// A single base medicine bound to its current batch.
    ///
    /// The binding is `None` after the batch was administratively deleted.
    Simple { inventory_batch_id: Option<String> },
    /// A predefined bundle of base medicines, resolved by name at
    /// transaction time.
    Combination { components: CombinationDescriptor },
}

/// A medicine that can be prescribed during a visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicineDefinition {
    /// Unique definition ID
    pub id: String,
    /// Display name; for combinations this is usually the legacy encoding
    pub name: String,
    pub description: Option<String>,
    /// Free-form tags
    pub tags: Vec<String>,
    pub kind: MedicineKind,
    pub created_at: String,
}

impl MedicineDefinition {
    /// Create a simple medicine bound to a batch.
    pub fn simple(name: impl Into<String>, inventory_batch_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            kind: MedicineKind::Simple { inventory_batch_id },
            created_at: super::timestamp_now(),
        }
    }

    /// Create a predefined combination. Repeated base medicines are merged.
    pub fn combination(name: impl Into<String>, components: CombinationDescriptor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            kind: MedicineKind::Combination {
                components: components.merged(),
            },
            created_at: super::timestamp_now(),
        }
    }

    pub fn is_combination(&self) -> bool {
        matches!(self.kind, MedicineKind::Combination { .. })
    }

    /// Directly bound batch, if this is a bound simple medicine.
    pub fn inventory_batch_id(&self) -> Option<&str> {
        match &self.kind {
            MedicineKind::Simple { inventory_batch_id } => inventory_batch_id.as_deref(),
            MedicineKind::Combination { .. } => None,
        }
    }

    /// Distinct base medicine names a combination draws stock from.
    ///
    /// Falls back to parsing the name when no structured components were
    /// stored (legacy records). Empty for simple medicines.
    pub fn component_names(&self) -> Vec<String> {
        let MedicineKind::Combination { components } = &self.kind else {
            return Vec::new();
        };
        let descriptor = if components.is_empty() {
            codec::parse(&self.name)
        } else {
            components.clone()
        };
        descriptor
            .merged()
            .components
            .into_iter()
            .map(|c| c.base_medicine_name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, m: u32, a: u32, n: u32) -> CombinationComponent {
        CombinationComponent::new(name, DosagePattern::new(m, a, n))
    }

    #[test]
    fn test_dosage_display_and_parse() {
        let dosage = DosagePattern::new(1, 0, 2);
        assert_eq!(dosage.to_string(), "1+0+2");
        assert_eq!("1+0+2".parse::<DosagePattern>().unwrap(), dosage);
        assert_eq!("(1+0+2)".parse::<DosagePattern>().unwrap(), dosage);
        assert_eq!(" 1 + 0 + 2 ".parse::<DosagePattern>().unwrap(), dosage);
    }

    #[test]
    fn test_dosage_parse_rejects_malformed() {
        assert!("1+0".parse::<DosagePattern>().is_err());
        assert!("1+x+0".parse::<DosagePattern>().is_err());
        assert!("1++0".parse::<DosagePattern>().is_err());
        assert!("-1+0+0".parse::<DosagePattern>().is_err());
    }

    #[test]
    fn test_dosage_schedule() {
        assert_eq!(DosagePattern::new(1, 0, 1).schedule(), "1 Morning, 1 Night");
        assert_eq!(DosagePattern::new(0, 2, 0).schedule(), "2 Afternoon");
        assert_eq!(DosagePattern::new(0, 0, 0).schedule(), "");
    }

    #[test]
    fn test_merge_sums_repeated_medicines() {
        let descriptor = CombinationDescriptor::new(vec![
            component("A", 2, 0, 1),
            component("B", 0, 1, 0),
            component("A", 0, 0, 1),
        ]);
        assert!(!descriptor.has_unique_names());

        let merged = descriptor.merged();
        assert_eq!(
            merged.components,
            vec![component("A", 2, 0, 2), component("B", 0, 1, 0)]
        );
        assert!(merged.has_unique_names());
    }

    #[test]
    fn test_merge_overflow() {
        let descriptor = CombinationDescriptor::new(vec![
            component("A", u32::MAX, 0, 0),
            component("A", 1, 0, 0),
        ]);
        assert!(matches!(
            descriptor.try_merged(),
            Err(ParseError::MalformedDosage(_))
        ));
        assert_eq!(
            descriptor.merged().components,
            vec![component("A", u32::MAX, 0, 0)]
        );
        assert_eq!(
            DosagePattern::new(1, 2, 3).checked_add(DosagePattern::new(0, 0, 1)),
            Some(DosagePattern::new(1, 2, 4))
        );
    }

    #[test]
    fn test_describe() {
        let descriptor = CombinationDescriptor::new(vec![
            component("COBECWT", 1, 0, 0),
            component("COBECGT", 0, 0, 1),
        ]);
        assert_eq!(descriptor.describe(), "COBECWT: 1 Morning | COBECGT: 1 Night");
    }

    #[test]
    fn test_combination_constructor_merges() {
        let descriptor = CombinationDescriptor::new(vec![
            component("SLIM-X", 1, 0, 0),
            component("SLIM-X", 0, 0, 1),
        ]);
        let def = MedicineDefinition::combination("SLIM-X (1+0+0) + SLIM-X (0+0+1)", descriptor);
        assert_eq!(def.component_names(), vec!["SLIM-X"]);
        assert!(def.is_combination());
        assert_eq!(def.inventory_batch_id(), None);
    }

    #[test]
    fn test_component_names_fall_back_to_name() {
        let def = MedicineDefinition::combination(
            "COBECWT (1+0+0) + COBECGT (0+0+1)",
            CombinationDescriptor::default(),
        );
        assert_eq!(def.component_names(), vec!["COBECWT", "COBECGT"]);
    }

    #[test]
    fn test_simple_has_no_components() {
        let def = MedicineDefinition::simple("COBECWT", Some("batch-1".into()));
        assert!(def.component_names().is_empty());
        assert_eq!(def.inventory_batch_id(), Some("batch-1"));
    }
}
