use std::collections::BTreeMap;

/// Parameters of a single Query API call.
///
/// Plain parameters may be absent, in which case they are dropped before
/// signing. Indexed parameters expand into `Name.1`, `Name.2`, ... in the
/// order of their values. Build a fresh value for every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    params: BTreeMap<String, Option<String>>,
    indexed: Vec<(String, Vec<String>)>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with the mandatory `Action` parameter.
    pub fn action(action: &str) -> Self {
        Self::new().param("Action", action)
    }

    pub fn param<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params.insert(name.into(), Some(value.to_string()));
        self
    }

    /// Adds `name` only when `value` is `Some`. An explicit empty string is kept.
    pub fn opt_param<K, V>(mut self, name: K, value: Option<V>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.params.insert(name.into(), value.map(|v| v.to_string()));
        self
    }

    pub fn indexed<K, I, V>(mut self, name: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.indexed.push((
            name.into(),
            values.into_iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn insert<K: Into<String>>(&mut self, name: K, value: Option<String>) {
        self.params.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Flattens into the final name/value mapping: absent values are dropped and
    /// indexed parameters are expanded with 1-based suffixes.
    pub fn expand(self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (name, value) in self.params {
            if let Some(value) = value {
                out.insert(name, value);
            }
        }
        for (name, values) in self.indexed {
            for (i, value) in values.into_iter().enumerate() {
                out.insert(format!("{}.{}", name, i + 1), value);
            }
        }
        out
    }
}
