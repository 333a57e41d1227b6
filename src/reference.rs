use std::fmt;

use serde_json::Value;

use crate::types::{AttrMap, AttrValue};

/// Name of the primary key-set variant. Every collection has one, and it is
/// the only variant that backs a unique index usable for upserts.
pub const PRIMARY_REF: &str = "manager_ref";

/// Separator used when joining key values into a stringified reference.
pub const STRINGIFIED_SEPARATOR: &str = "__";

/// Immutable natural-key identifier of an entity.
///
/// A reference is a lookup key, not a record: it names which key-set variant
/// it belongs to (`ref_name`), which attributes form that key (`keys`) and the
/// raw attribute mapping it was built from (`full_reference`). Values in the
/// mapping may themselves be lazy handles; those are flattened by building a
/// new reference rather than by editing this one.
#[derive(Debug, Clone)]
pub struct Reference {
    ref_name: String,
    keys: Vec<String>,
    full_reference: AttrMap,
    nested_secondary_index: bool,
}

impl Reference {
    /// Builds a reference for the key-set variant `ref_name`.
    ///
    /// Duplicate names in `keys` are dropped, keeping first-seen order.
    pub fn new(ref_name: impl Into<String>, keys: Vec<String>, full_reference: AttrMap) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(keys.len());
        for key in keys {
            if !unique.contains(&key) {
                unique.push(key);
            }
        }

        let nested_secondary_index = unique.iter().any(|key| {
            matches!(
                full_reference.get(key),
                Some(AttrValue::Lazy(nested)) if !nested.reference().is_primary()
            )
        });

        Self {
            ref_name: ref_name.into(),
            keys: unique,
            full_reference,
            nested_secondary_index,
        }
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn full_reference(&self) -> &AttrMap {
        &self.full_reference
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.full_reference.get(key)
    }

    /// Returns `true` for the primary (`manager_ref`) variant.
    pub fn is_primary(&self) -> bool {
        self.ref_name == PRIMARY_REF
    }

    /// Returns the first key whose value is null or missing.
    pub fn first_null_key(&self) -> Option<&str> {
        self.keys
            .iter()
            .find(|key| self.full_reference.get(*key).map_or(true, AttrValue::is_null))
            .map(String::as_str)
    }

    /// A reference is loadable when it has keys and every key maps to a
    /// non-null value. Only loadable references are expected to resolve.
    pub fn is_loadable(&self) -> bool {
        !self.keys.is_empty() && self.first_null_key().is_none()
    }

    /// Returns `true` when some key value is a lazy handle into a secondary
    /// index. Such references must be flattened before they can be used as
    /// a lookup key.
    pub fn has_nested_secondary_index(&self) -> bool {
        self.nested_secondary_index
    }

    /// Returns only the key entries of the full reference.
    pub fn key_values(&self) -> AttrMap {
        self.keys
            .iter()
            .filter_map(|key| {
                self.full_reference
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Joins the key values into the string the collection indexes by.
    pub fn stringified(&self) -> String {
        stringify_keys(&self.keys, &self.full_reference)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ref_name)?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let fragment = self
                .full_reference
                .get(key)
                .map(AttrValue::index_fragment)
                .unwrap_or_default();
            write!(f, "{key}: {fragment}")?;
        }
        write!(f, ")")
    }
}

/// Joins the values of `keys` in `data` with `"__"`. Missing values
/// contribute an empty fragment.
///
/// Strings are not quoted, so the string `"1"` and the number `1` join to
/// the same key. Collections are expected to type each key attribute
/// consistently.
pub fn stringify_keys(keys: &[String], data: &AttrMap) -> String {
    join_fragments(
        keys.iter()
            .map(|key| data.get(key).map(AttrValue::index_fragment).unwrap_or_default()),
    )
}

/// Joins index fragments with [`STRINGIFIED_SEPARATOR`].
///
/// `_` and `\` inside a fragment are escaped with a backslash, so a value
/// containing the separator cannot collide with a split of its neighbours:
/// `("a__b", "c")` and `("a", "b__c")` stay distinct.
pub fn join_fragments<I>(fragments: I) -> String
where
    I: IntoIterator<Item = String>,
{
    fragments
        .into_iter()
        .map(|fragment| escape_fragment(&fragment))
        .collect::<Vec<_>>()
        .join(STRINGIFIED_SEPARATOR)
}

fn escape_fragment(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders a concrete value as an index fragment. Strings are used verbatim
/// so that `"vm-1"` and `vm-1` do not diverge.
pub fn value_fragment(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
