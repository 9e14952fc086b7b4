//! Partitioning of a batch into one layer per distinct attribute value.

use indexmap::IndexMap;

use crate::feature::FeatureRecord;

/// Group key of features whose split attribute is missing or null.
pub const NULL_GROUP: &str = "NULL";

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Groups features by the string representation of the `key` attribute (matched ignoring case).
///
/// Groups are returned in the order their first feature appears, features keep their order
/// inside a group. Features without geometry are grouped like any other.
pub fn split(
    features: impl IntoIterator<Item = FeatureRecord>,
    key: &str,
) -> IndexMap<String, Vec<FeatureRecord>> {
    let mut groups: IndexMap<String, Vec<FeatureRecord>> = IndexMap::new();
    for feature in features {
        let group = group_key(&feature, key);
        groups.entry(group).or_default().push(feature);
    }

    groups
}

/// Group key of a single feature.
pub fn group_key(feature: &FeatureRecord, key: &str) -> String {
    match feature.attributes.get_ignore_case(key) {
        Some(value) if !value.is_null() => value.to_string(),
        _ => NULL_GROUP.to_string(),
    }
}

/// Makes a group key safe to use in a layer name: characters that are not allowed in file names
/// and whitespace are replaced by `_`.
pub fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            c if INVALID_CHARS.contains(&c) || c.is_control() || c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Name of the layer of a group: `{base}-{sanitized key}`.
pub fn layer_name(base: &str, key: &str) -> String {
    format!("{base}-{}", sanitize(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{AttributeValue, Attributes};

    fn with_type(value: impl Into<AttributeValue>) -> FeatureRecord {
        let value: AttributeValue = value.into();
        let attributes: Attributes = [("type", value)].into_iter().collect();
        FeatureRecord::new(attributes, None)
    }

    #[test]
    fn groups_in_first_seen_order() {
        let features = vec![with_type("A"), with_type("B"), with_type("A")];
        let groups = split(features, "type");

        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(groups["A"].len(), 2);
        assert_eq!(groups["B"].len(), 1);
    }

    #[test]
    fn missing_and_null_values() {
        let features = vec![
            with_type(AttributeValue::Null),
            FeatureRecord::default(),
            with_type(7_i64),
        ];
        let groups = split(features, "TYPE");

        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["NULL", "7"]);
        assert_eq!(groups[NULL_GROUP].len(), 2);
    }

    #[test]
    fn layer_names() {
        assert_eq!(sanitize("a/b c"), "a_b_c");
        assert_eq!(sanitize("x:y*z?\"|<>\\"), "x_y_z______");
        assert_eq!(sanitize("tab\there"), "tab_here");
        assert_eq!(layer_name("roads", "A 1"), "roads-A_1");
        assert_eq!(layer_name("roads", NULL_GROUP), "roads-NULL");
    }
}
