//! Exchange rule (C5): a stateless predicate over instances governing cohort save/learn
//! decisions. A trait rather than a concrete struct, so the allow-list and cohort-scope filters
//! named in spec.md §4.5 are a pluggable concern — a real deployment might consult an external
//! policy service instead of a static allow-list.

use std::collections::HashSet;

use omrs_types::{entity::Entity, relationship::Relationship};

pub use crate::config::SaveExchangeRuleMode;

/// The type-name this exchange rule should test an instance's type against.
pub trait TypeNamed {
    fn type_name(&self) -> &str;
}

impl TypeNamed for Entity {
    fn type_name(&self) -> &str {
        &self.entity_type.name
    }
}

impl TypeNamed for Relationship {
    fn type_name(&self) -> &str {
        &self.relationship_type.name
    }
}

/// A pure function of an instance: may it be persisted (save) or proactively refreshed (learn)?
pub trait ExchangeRule: Send + Sync {
    fn process_instance_event(&self, type_name: &str) -> bool;
    fn learn_instance_event(&self, type_name: &str) -> bool;
}

/// The default [`ExchangeRule`]: a type-name allow-list plus a [`SaveExchangeRuleMode`], the
/// same knobs spec.md §6 exposes as `saveExchangeRule`/`selectedTypesToProcess`.
#[derive(Debug, Clone)]
pub struct TypeNameAllowList {
    mode: SaveExchangeRuleMode,
    selected_types: HashSet<String>,
}

impl TypeNameAllowList {
    #[must_use]
    pub fn new(mode: SaveExchangeRuleMode, selected_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            mode,
            selected_types: selected_types.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self::new(SaveExchangeRuleMode::All, [])
    }
}

impl ExchangeRule for TypeNameAllowList {
    fn process_instance_event(&self, type_name: &str) -> bool {
        match self.mode {
            SaveExchangeRuleMode::None => false,
            SaveExchangeRuleMode::All | SaveExchangeRuleMode::JustTypeDefs | SaveExchangeRuleMode::LearnedTypeDefs => {
                true
            }
            SaveExchangeRuleMode::DesiredTypeDefs | SaveExchangeRuleMode::SelectedTypeDefs => {
                self.selected_types.contains(type_name)
            }
        }
    }

    fn learn_instance_event(&self, type_name: &str) -> bool {
        match self.mode {
            SaveExchangeRuleMode::None => false,
            SaveExchangeRuleMode::All | SaveExchangeRuleMode::LearnedTypeDefs => true,
            SaveExchangeRuleMode::JustTypeDefs => false,
            SaveExchangeRuleMode::DesiredTypeDefs | SaveExchangeRuleMode::SelectedTypeDefs => {
                self.selected_types.contains(type_name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_mode_rejects_everything() {
        let rule = TypeNameAllowList::new(SaveExchangeRuleMode::None, []);
        assert!(!rule.process_instance_event("DataSet"));
        assert!(!rule.learn_instance_event("DataSet"));
    }

    #[test]
    fn selected_mode_only_allows_listed_types() {
        let rule = TypeNameAllowList::new(
            SaveExchangeRuleMode::SelectedTypeDefs,
            ["DataSet".to_owned()],
        );
        assert!(rule.process_instance_event("DataSet"));
        assert!(!rule.process_instance_event("Glossary"));
    }

    #[test]
    fn all_mode_allows_everything() {
        let rule = TypeNameAllowList::all();
        assert!(rule.process_instance_event("Anything"));
        assert!(rule.learn_instance_event("Anything"));
    }
}
