//! The fixed set of bookable parking slots.

use serde::Serialize;
use std::fmt;

use super::error::LedgerError;

/// Row prefixes of the standard lot.
pub const STANDARD_ROWS: [char; 2] = ['A', 'B'];

/// Slots per row in the standard lot.
pub const SLOTS_PER_ROW: u32 = 10;

/// A slot label that belongs to a catalogue, e.g. `A7`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, closed set of slot labels. Built once; never grows or shrinks.
#[derive(Debug, Clone)]
pub struct SlotCatalogue {
    slots: Vec<SlotId>,
}

impl SlotCatalogue {
    /// The standard lot: two rows of ten, `A1..=A10` then `B1..=B10`.
    pub fn standard() -> Self {
        let slots = STANDARD_ROWS
            .iter()
            .flat_map(|row| (1..=SLOTS_PER_ROW).map(move |n| SlotId(format!("{}{}", row, n))))
            .collect();
        Self { slots }
    }

    /// Catalogue from explicit labels. Labels are upper-cased; duplicates are dropped.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut slots: Vec<SlotId> = Vec::new();
        for label in labels {
            let id = SlotId(label.as_ref().trim().to_uppercase());
            if !id.0.is_empty() && !slots.contains(&id) {
                slots.push(id);
            }
        }
        Self { slots }
    }

    /// Resolve a user-supplied label against the catalogue.
    pub fn parse(&self, label: &str) -> Result<SlotId, LedgerError> {
        let wanted = label.trim().to_uppercase();
        self.slots
            .iter()
            .find(|slot| slot.0 == wanted)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownSlot(label.trim().to_string()))
    }

    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for SlotCatalogue {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue_layout() {
        let catalogue = SlotCatalogue::standard();
        assert_eq!(catalogue.len(), 20);
        assert_eq!(catalogue.slots()[0].as_str(), "A1");
        assert_eq!(catalogue.slots()[9].as_str(), "A10");
        assert_eq!(catalogue.slots()[10].as_str(), "B1");
        assert_eq!(catalogue.slots()[19].as_str(), "B10");
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let catalogue = SlotCatalogue::standard();
        assert_eq!(catalogue.parse(" b7 ").unwrap().as_str(), "B7");
    }

    #[test]
    fn test_parse_rejects_unknown_labels() {
        let catalogue = SlotCatalogue::standard();
        for label in ["C1", "A11", "A0", ""] {
            assert!(matches!(catalogue.parse(label), Err(LedgerError::UnknownSlot(_))));
        }
    }

    #[test]
    fn test_from_labels_dedupes() {
        let catalogue = SlotCatalogue::from_labels(["a1", "A2", "A1", " "]);
        let labels: Vec<&str> = catalogue.slots().iter().map(SlotId::as_str).collect();
        assert_eq!(labels, vec!["A1", "A2"]);
    }

    #[test]
    fn test_empty_catalogue() {
        let catalogue = SlotCatalogue::from_labels(Vec::<String>::new());
        assert!(catalogue.is_empty());
        assert!(catalogue.parse("A1").is_err());
    }
}
