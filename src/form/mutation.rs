//! Declarative field mutations.
//!
//! # Design Decisions
//! - Steps always run delete → set → append, so precedence on a shared key is
//!   fixed: set beats delete, append lands after set
//! - A `MutationSpec` is immutable once built and shared behind `Arc`

use std::collections::BTreeMap;

use crate::config::schema::MutationConfig;
use crate::config::validation::ValidationError;
use crate::form::fields::FormFields;

/// The delete / set / append operations applied to every form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSpec {
    delete: Vec<String>,
    set: BTreeMap<String, String>,
    append: BTreeMap<String, String>,
}

impl MutationSpec {
    /// Build a spec. Fails when all three operation sets are empty.
    pub fn new(
        delete: Vec<String>,
        set: BTreeMap<String, String>,
        append: BTreeMap<String, String>,
    ) -> Result<Self, ValidationError> {
        if delete.is_empty() && set.is_empty() && append.is_empty() {
            return Err(ValidationError::EmptyMutations);
        }
        Ok(Self { delete, set, append })
    }

    pub fn delete_keys(&self) -> &[String] {
        &self.delete
    }

    pub fn set_fields(&self) -> &BTreeMap<String, String> {
        &self.set
    }

    pub fn append_fields(&self) -> &BTreeMap<String, String> {
        &self.append
    }

    /// Apply the mutation pass to `fields` in place.
    pub fn apply(&self, fields: &mut FormFields) {
        for key in &self.delete {
            fields.remove(key);
        }
        for (key, value) in &self.set {
            fields.set(key.as_str(), value.as_str());
        }
        for (key, value) in &self.append {
            fields.append(key.as_str(), value.as_str());
        }
    }
}

impl TryFrom<&MutationConfig> for MutationSpec {
    type Error = ValidationError;

    fn try_from(config: &MutationConfig) -> Result<Self, Self::Error> {
        MutationSpec::new(config.delete.clone(), config.set.clone(), config.append.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn spec(delete: &[&str], set: &[(&str, &str)], append: &[(&str, &str)]) -> MutationSpec {
        MutationSpec::new(
            delete.iter().map(|s| s.to_string()).collect(),
            map(set),
            map(append),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_spec_rejected() {
        let err = MutationSpec::new(Vec::new(), BTreeMap::new(), BTreeMap::new()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyMutations);
    }

    #[test]
    fn test_disjoint_operations() {
        let mut fields: FormFields = [
            ("gone", "1"),
            ("gone", "2"),
            ("over", "old"),
            ("more", "first"),
            ("keep", "k1"),
            ("keep", "k2"),
        ]
        .into_iter()
        .collect();

        spec(&["gone"], &[("over", "new")], &[("more", "second")]).apply(&mut fields);

        assert!(!fields.contains_key("gone"));
        assert_eq!(fields.get_all("over"), ["new"]);
        assert_eq!(fields.get_all("more"), ["first", "second"]);
        assert_eq!(fields.get_all("keep"), ["k1", "k2"]);
    }

    #[test]
    fn test_set_then_append_on_same_key() {
        let mut fields: FormFields = [("b", "x"), ("b", "z")].into_iter().collect();
        spec(&[], &[("b", "y")], &[("b", "w")]).apply(&mut fields);
        assert_eq!(fields.get_all("b"), ["y", "w"]);

        let mut empty = FormFields::new();
        spec(&[], &[("b", "y")], &[("b", "w")]).apply(&mut empty);
        assert_eq!(empty.get_all("b"), ["y", "w"]);
    }

    #[test]
    fn test_delete_then_append_on_same_key() {
        let mut fields: FormFields = [("a", "1"), ("a", "2")].into_iter().collect();
        spec(&["a"], &[], &[("a", "3")]).apply(&mut fields);
        assert_eq!(fields.get_all("a"), ["3"]);
    }

    #[test]
    fn test_delete_then_set_on_same_key() {
        let mut fields: FormFields = [("a", "1")].into_iter().collect();
        spec(&["a"], &[("a", "2")], &[]).apply(&mut fields);
        assert_eq!(fields.get_all("a"), ["2"]);
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let mut fields: FormFields = [("a", "1")].into_iter().collect();
        let before = fields.clone();
        spec(&["missing"], &[], &[]).apply(&mut fields);
        assert_eq!(fields, before);
    }

    #[test]
    fn test_from_config() {
        let config = MutationConfig {
            delete: vec!["a".into()],
            set: BTreeMap::new(),
            append: BTreeMap::new(),
        };
        let spec = MutationSpec::try_from(&config).unwrap();
        assert_eq!(spec.delete_keys(), ["a"]);

        let err = MutationSpec::try_from(&MutationConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyMutations);
    }
}
