//! Derived combination columns kept for older readers.
//!
//! `medicines_included` is a JSON array of names in component order,
//! `medicine_dosages` a JSON object from name to `"m+a+n"`, and
//! `dosage_pattern` the first component's dosage as `"(m+a+n)"`.

use std::collections::HashMap;

use super::ParseError;
use crate::models::{CombinationComponent, CombinationDescriptor, DosagePattern};

/// Serialized legacy forms of a combination's components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFields {
    pub medicines_included: String,
    pub medicine_dosages: String,
    pub dosage_pattern: Option<String>,
}

impl LegacyFields {
    /// Derive the legacy columns. Expects a merged descriptor; with repeated
    /// names the dosage map keeps the last occurrence.
    pub fn from_descriptor(descriptor: &CombinationDescriptor) -> Self {
        let names: Vec<&str> = descriptor.names();
        let dosages: serde_json::Map<String, serde_json::Value> = descriptor
            .components
            .iter()
            .map(|c| {
                (
                    c.base_medicine_name.clone(),
                    serde_json::Value::String(c.dosage.to_string()),
                )
            })
            .collect();

        Self {
            medicines_included: serde_json::Value::from(names).to_string(),
            medicine_dosages: serde_json::Value::Object(dosages).to_string(),
            dosage_pattern: descriptor
                .components
                .first()
                .map(|c| format!("({})", c.dosage)),
        }
    }

    /// Rebuild the descriptor. Names without an entry in the dosage map get
    /// `0+0+0`.
    pub fn to_descriptor(&self) -> Result<CombinationDescriptor, ParseError> {
        let names: Vec<String> = serde_json::from_str(&self.medicines_included)
            .map_err(|e| ParseError::MalformedLegacy(format!("medicines_included: {}", e)))?;
        let dosages: HashMap<String, String> = if self.medicine_dosages.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(&self.medicine_dosages)
                .map_err(|e| ParseError::MalformedLegacy(format!("medicine_dosages: {}", e)))?
        };

        let components = names
            .into_iter()
            .map(|name| {
                let dosage = match dosages.get(&name) {
                    Some(text) => text.parse::<DosagePattern>()?,
                    None => DosagePattern::default(),
                };
                Ok(CombinationComponent::new(name, dosage))
            })
            .collect::<Result<Vec<_>, ParseError>>()?;

        Ok(CombinationDescriptor::new(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> CombinationDescriptor {
        CombinationDescriptor::new(vec![
            CombinationComponent::new("COBECYT", DosagePattern::new(1, 0, 0)),
            CombinationComponent::new("COBECGT", DosagePattern::new(0, 1, 0)),
            CombinationComponent::new("COBECPT", DosagePattern::new(0, 0, 1)),
        ])
    }

    #[test]
    fn test_from_descriptor() {
        let fields = LegacyFields::from_descriptor(&descriptor());
        assert_eq!(
            fields.medicines_included,
            r#"["COBECYT","COBECGT","COBECPT"]"#
        );
        let dosages: HashMap<String, String> =
            serde_json::from_str(&fields.medicine_dosages).unwrap();
        assert_eq!(dosages["COBECGT"], "0+1+0");
        assert_eq!(fields.dosage_pattern.as_deref(), Some("(1+0+0)"));
    }

    #[test]
    fn test_round_trip_keeps_order() {
        let d = descriptor();
        let fields = LegacyFields::from_descriptor(&d);
        assert_eq!(fields.to_descriptor().unwrap(), d);
    }

    #[test]
    fn test_missing_dosage_defaults_to_zero() {
        let fields = LegacyFields {
            medicines_included: r#"["COBECWT"]"#.into(),
            medicine_dosages: String::new(),
            dosage_pattern: None,
        };
        let d = fields.to_descriptor().unwrap();
        assert_eq!(d.components[0].dosage, DosagePattern::default());
    }

    #[test]
    fn test_malformed_json() {
        let fields = LegacyFields {
            medicines_included: "COBECWT".into(),
            medicine_dosages: "{}".into(),
            dosage_pattern: None,
        };
        assert!(matches!(
            fields.to_descriptor(),
            Err(ParseError::MalformedLegacy(_))
        ));
    }

    #[test]
    fn test_empty_descriptor() {
        let fields = LegacyFields::from_descriptor(&CombinationDescriptor::default());
        assert_eq!(fields.medicines_included, "[]");
        assert_eq!(fields.medicine_dosages, "{}");
        assert_eq!(fields.dosage_pattern, None);
    }
}
