//! Ordered, case-insensitive field map

use indexmap::IndexMap;

use super::Value;

/// An insertion-ordered map whose keys compare case-insensitively.
///
/// The spelling used by the most recent insert is kept for display and
/// serialization; lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    /// lowercase key -> (original key, value)
    entries: IndexMap<String, (String, Value)>,
}

impl Fields {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value, overwriting any existing key that differs only in case.
    ///
    /// An overwritten key keeps its position. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        self.entries
            .insert(key.to_lowercase(), (key, value))
            .map(|(_, old)| old)
    }

    /// Look up a value ignoring case
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// Mutable lookup ignoring case
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// String value of a field, if the field holds a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Value for `key`, inserting `default()` first when the key is absent
    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> Value) -> &mut Value {
        &mut self
            .entries
            .entry(key.to_lowercase())
            .or_insert_with(|| (key.to_string(), default()))
            .1
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// Remove a key, preserving the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries
            .shift_remove(&key.to_lowercase())
            .map(|(_, v)| v)
    }

    /// Iterate over (original key, value) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in insertion order, original spelling
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }

    /// JSON object with lowercase keys, as handed to templates
    pub fn to_template_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(lower, (_, v))| (lower.clone(), v.to_template_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoValues<String, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
