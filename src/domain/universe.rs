//! Investable universe selection.
//!
//! Parses instrument id and class lists from configuration and decides which
//! loaded instruments belong to the universe.

use crate::domain::instrument::{Instrument, InstrumentClass};
use std::collections::HashSet;

/// Selection criteria handed to the instrument loader.
///
/// An instrument matches when its id is listed or its class is listed. Empty
/// lists select nothing on their own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniverseCriteria {
    pub ids: Vec<String>,
    pub classes: Vec<InstrumentClass>,
}

impl UniverseCriteria {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.classes.is_empty()
    }

    pub fn matches(&self, instrument: &Instrument) -> bool {
        self.ids.iter().any(|id| *id == instrument.id) || self.classes.contains(&instrument.class)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in list")]
    EmptyToken,

    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("{0}")]
    UnknownClass(String),
}

pub fn parse_ids(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(UniverseError::Duplicate(trimmed.to_string()));
        }
        ids.push(trimmed.to_string());
    }

    Ok(ids)
}

pub fn parse_classes(input: &str) -> Result<Vec<InstrumentClass>, UniverseError> {
    let mut classes = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let class: InstrumentClass = trimmed.parse().map_err(UniverseError::UnknownClass)?;
        if classes.contains(&class) {
            return Err(UniverseError::Duplicate(trimmed.to_string()));
        }
        classes.push(class);
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(id: &str) -> Instrument {
        Instrument {
            id: id.into(),
            ticker: id.into(),
            lot: 1,
            class: InstrumentClass::Share,
            min_price_increment: 0.01,
        }
    }

    #[test]
    fn parse_ids_trims_tokens() {
        assert_eq!(
            parse_ids(" BBG004730N88, BBG004731032 ").unwrap(),
            vec!["BBG004730N88", "BBG004731032"]
        );
    }

    #[test]
    fn parse_ids_rejects_empty_token() {
        assert_eq!(parse_ids("A,,B"), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_ids_rejects_duplicates() {
        assert_eq!(
            parse_ids("A,B,A"),
            Err(UniverseError::Duplicate("A".to_string()))
        );
    }

    #[test]
    fn parse_classes_reads_known_classes() {
        assert_eq!(
            parse_classes("share, etf").unwrap(),
            vec![InstrumentClass::Share, InstrumentClass::Etf]
        );
    }

    #[test]
    fn parse_classes_rejects_unknown() {
        assert!(matches!(
            parse_classes("share,future"),
            Err(UniverseError::UnknownClass(_))
        ));
    }

    #[test]
    fn criteria_matches_by_id_or_class() {
        let by_id = UniverseCriteria {
            ids: vec!["A".into()],
            classes: vec![],
        };
        assert!(by_id.matches(&share("A")));
        assert!(!by_id.matches(&share("B")));

        let by_class = UniverseCriteria {
            ids: vec![],
            classes: vec![InstrumentClass::Share],
        };
        assert!(by_class.matches(&share("B")));
    }

    #[test]
    fn empty_criteria() {
        assert!(UniverseCriteria::default().is_empty());
        assert!(!UniverseCriteria::default().matches(&share("A")));
    }
}
