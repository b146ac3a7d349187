//! Model-state key construction.
//!
//! Keys use `.` between a prefix and a property and `[...]` for indexes,
//! for example `order.lines[0].sku`.

/// Joins a prefix and a property name.
///
/// ```
/// use daedalus_core::names::create_property_model_name;
///
/// assert_eq!(create_property_model_name("", "name"), "name");
/// assert_eq!(create_property_model_name("person", "name"), "person.name");
/// assert_eq!(create_property_model_name("person", "[0]"), "person[0]");
/// assert_eq!(create_property_model_name("person", ""), "person");
/// ```
#[must_use]
pub fn create_property_model_name(prefix: &str, property: &str) -> String {
    if prefix.is_empty() {
        property.to_string()
    } else if property.is_empty() {
        prefix.to_string()
    } else if property.starts_with('[') {
        format!("{prefix}{property}")
    } else {
        format!("{prefix}.{property}")
    }
}

/// Appends an index to a prefix.
///
/// ```
/// use daedalus_core::names::create_index_model_name;
///
/// assert_eq!(create_index_model_name("ids", "2"), "ids[2]");
/// assert_eq!(create_index_model_name("", "key"), "[key]");
/// ```
#[must_use]
pub fn create_index_model_name(prefix: &str, index: &str) -> String {
    format!("{prefix}[{index}]")
}

/// Returns true if `key` equals `prefix` or names something below it.
///
/// Comparison is ASCII case-insensitive. An empty prefix matches every key.
#[must_use]
pub fn is_under_prefix(key: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let (key, prefix) = (key.as_bytes(), prefix.as_bytes());
    if key.len() < prefix.len() || !key[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return false;
    }
    key.len() == prefix.len() || matches!(key[prefix.len()], b'.' | b'[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        assert!(is_under_prefix("person.name", "person"));
        assert!(is_under_prefix("Person[0]", "person"));
        assert!(is_under_prefix("person", "PERSON"));
        assert!(!is_under_prefix("personal", "person"));
        assert!(!is_under_prefix("per", "person"));
        assert!(is_under_prefix("anything", ""));
    }
}
