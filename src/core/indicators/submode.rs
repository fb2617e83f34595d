//! Submode descriptors and templated key expansion.
//!
//! A templated submode such as `<courseid>requests` stands for a family of
//! concrete submodes, one per backing entity: `[7.requests]`, `[9.requests]`...
//! The template is parsed once when an indicator declares it; acquisition and
//! emission only ever work on the structured [`Submode`].

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{error::IndicatorError, types::IndicatorResult};

static TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([A-Za-z_][A-Za-z0-9_]*)>(.+)$").expect("valid template regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubmodeKind {
    Plain,
    Templated { placeholder: String },
}

/// Structured submode: a plain value slot, or a template over an entity set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Submode {
    kind: SubmodeKind,
    radical: String,
}

impl Submode {
    pub fn plain(name: impl Into<String>) -> Self {
        Submode {
            kind: SubmodeKind::Plain,
            radical: name.into(),
        }
    }

    pub fn templated(placeholder: impl Into<String>, radical: impl Into<String>) -> Self {
        Submode {
            kind: SubmodeKind::Templated {
                placeholder: placeholder.into(),
            },
            radical: radical.into(),
        }
    }

    /// Parses a declarative submode string. Fails on an empty string.
    pub fn parse(raw: &str) -> IndicatorResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IndicatorError::Config("Submode is empty".to_string()));
        }
        match TEMPLATE.captures(raw) {
            Some(caps) => Ok(Submode::templated(&caps[1], &caps[2])),
            None => Ok(Submode::plain(raw)),
        }
    }

    /// Parses a comma separated submode list, skipping blanks.
    pub fn parse_list(raw: &str) -> IndicatorResult<Vec<Self>> {
        raw.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Submode::parse)
            .collect()
    }

    pub fn kind(&self) -> &SubmodeKind {
        &self.kind
    }

    pub fn radical(&self) -> &str {
        &self.radical
    }

    pub fn placeholder(&self) -> Option<&str> {
        match &self.kind {
            SubmodeKind::Templated { placeholder } => Some(placeholder),
            SubmodeKind::Plain => None,
        }
    }

    pub fn is_templated(&self) -> bool {
        matches!(self.kind, SubmodeKind::Templated { .. })
    }

    /// Declarative form, e.g. `<courseid>requests` or `webrequests`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Submode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SubmodeKind::Plain => f.write_str(&self.radical),
            SubmodeKind::Templated { placeholder } => write!(f, "<{}>{}", placeholder, self.radical),
        }
    }
}

/// Concrete keys of one templated submode, in entity order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Family {
    members: Vec<(String, String)>,
}

impl Family {
    /// Builds `[<entity_id>.<radical>]` for every entity id.
    pub fn build<I, S>(entity_ids: I, radical: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let members = entity_ids
            .into_iter()
            .map(|id| {
                let id = id.to_string();
                let key = format!("[{}.{}]", id, radical);
                (id, key)
            })
            .collect();
        Family { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `(entity_id, concrete_key)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.members.iter().map(|(id, key)| (id.as_str(), key.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(_, key)| key.as_str())
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(id, _)| id.as_str())
    }

    pub fn key_for(&self, entity_id: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|(id, _)| id == entity_id)
            .map(|(_, key)| key.as_str())
    }
}

/// Indicator-local expansion state for one acquisition pass.
///
/// Entity sets are remembered per placeholder so sibling templates sharing a
/// placeholder resolve their entities once. Families are rebuilt whenever the
/// entity set they were built from changes.
#[derive(Debug, Default)]
pub struct SubmodeExpander {
    entities: HashMap<String, Vec<String>>,
    families: HashMap<String, Family>,
}

impl SubmodeExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity ids already resolved for `placeholder` in this pass.
    pub fn cached_entities(&self, placeholder: &str) -> Option<&[String]> {
        self.entities.get(placeholder).map(Vec::as_slice)
    }

    pub fn remember_entities(&mut self, placeholder: &str, ids: Vec<String>) {
        self.entities.insert(placeholder.to_string(), ids);
    }

    /// Expands `submode` over `entity_ids`, reusing the previous family when the
    /// entity set is unchanged.
    pub fn expand(&mut self, submode: &Submode, entity_ids: &[String]) -> &Family {
        let key = submode.key();
        let stale = match self.families.get(&key) {
            Some(family) => !family.entity_ids().eq(entity_ids.iter().map(String::as_str)),
            None => true,
        };
        if stale {
            let family = Family::build(entity_ids, submode.radical());
            self.families.insert(key.clone(), family);
        }
        &self.families[&key]
    }

    /// Family built for `submode` during the current pass, if any.
    pub fn family(&self, submode: &Submode) -> Option<&Family> {
        self.families.get(&submode.key())
    }

    pub fn reset(&mut self) {
        self.entities.clear();
        self.families.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn plain_submode() {
            let s = Submode::parse("webrequests").unwrap();
            assert_eq!(s.kind(), &SubmodeKind::Plain);
            assert_eq!(s.radical(), "webrequests");
            assert_eq!(s.key(), "webrequests");
        }

        #[test]
        fn templated_submode() {
            let s = Submode::parse("<courseid>requests").unwrap();
            assert_eq!(s.placeholder(), Some("courseid"));
            assert_eq!(s.radical(), "requests");
            assert_eq!(s.key(), "<courseid>requests");
        }

        #[test]
        fn bracketed_custom_keys_stay_plain() {
            let s = Submode::parse("[course.7.bounces.count]").unwrap();
            assert!(!s.is_templated());
        }

        #[test]
        fn empty_submode_is_config_error() {
            assert!(matches!(Submode::parse("  "), Err(IndicatorError::Config(_))));
        }

        #[test]
        fn list_skips_blanks() {
            let list = Submode::parse_list("all,visible,,<catid>requests").unwrap();
            assert_eq!(list.len(), 3);
            assert!(list[2].is_templated());
        }
    }

    mod expansion_tests {
        use super::*;

        fn ids(v: &[&str]) -> Vec<String> {
            v.iter().map(|s| s.to_string()).collect()
        }

        #[test]
        fn family_has_one_key_per_entity() {
            let family = Family::build([7, 9], "requests");
            assert_eq!(family.len(), 2);
            let keys: Vec<_> = family.keys().collect();
            assert_eq!(keys, vec!["[7.requests]", "[9.requests]"]);
            assert_eq!(family.key_for("9"), Some("[9.requests]"));

            let pattern = Regex::new(r"^\[\d+\.requests\]$").unwrap();
            assert!(family.keys().all(|k| pattern.is_match(k)));
        }

        #[test]
        fn empty_entity_set_gives_empty_family() {
            let mut expander = SubmodeExpander::new();
            let submode = Submode::templated("courseid", "requests");
            assert!(expander.expand(&submode, &[]).is_empty());
        }

        #[test]
        fn family_is_rebuilt_when_entities_change() {
            let mut expander = SubmodeExpander::new();
            let submode = Submode::templated("catid", "distinctusers");

            assert_eq!(expander.expand(&submode, &ids(&["1", "2"])).len(), 2);
            assert_eq!(expander.expand(&submode, &ids(&["1", "2"])).len(), 2);
            let family = expander.expand(&submode, &ids(&["3"]));
            assert_eq!(family.keys().collect::<Vec<_>>(), vec!["[3.distinctusers]"]);
        }

        #[test]
        fn entity_cache_is_shared_by_placeholder_and_reset() {
            let mut expander = SubmodeExpander::new();
            expander.remember_entities("courseid", ids(&["7", "9"]));
            assert_eq!(expander.cached_entities("courseid").map(|e| e.len()), Some(2));
            assert!(expander.cached_entities("catid").is_none());

            expander.expand(&Submode::templated("courseid", "enrolled"), &ids(&["7", "9"]));
            expander.reset();
            assert!(expander.cached_entities("courseid").is_none());
            assert!(expander
                .family(&Submode::templated("courseid", "enrolled"))
                .is_none());
        }
    }
}
