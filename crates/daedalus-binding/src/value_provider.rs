//! Value providers.
//!
//! A [`ValueProvider`] exposes one source of request data (query string,
//! route values, form fields) as a case-insensitive key lookup with prefix
//! queries. Binders never read the request directly for keyed data; they ask
//! the provider in scope, which the binding context filters by the binding
//! source of the model being bound.
//!
//! # Example
//!
//! ```
//! use daedalus_binding::{NameValueProvider, ValueProvider};
//! use daedalus_core::BindingSource;
//!
//! let provider = NameValueProvider::new(
//!     BindingSource::Query,
//!     vec![("person.Name".to_string(), "Ada".to_string())],
//! );
//! assert!(provider.contains_prefix("person"));
//! assert!(!provider.contains_prefix("pers"));
//! assert_eq!(provider.get_value("PERSON.name").first_value(), Some("Ada"));
//! ```

use daedalus_core::names::is_under_prefix;
use daedalus_core::BindingSource;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Values found for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueProviderResult {
    values: Vec<String>,
}

impl ValueProviderResult {
    /// The result for a key with no values.
    #[must_use]
    pub const fn none() -> Self {
        Self { values: Vec::new() }
    }

    /// Wraps the values posted for a key.
    #[must_use]
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// A single value.
    pub fn single(value: impl Into<String>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }

    /// Whether no value was found.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.values.is_empty()
    }

    /// The first value, used when binding a simple type.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// All values in posted order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Consumes the result, returning the values.
    #[must_use]
    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

impl fmt::Display for ValueProviderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values.join(","))
    }
}

/// A source of keyed request data.
pub trait ValueProvider: Send + Sync + fmt::Debug {
    /// Whether any key equals `prefix` or lies below it.
    fn contains_prefix(&self, prefix: &str) -> bool;

    /// Values posted for `key`.
    fn get_value(&self, key: &str) -> ValueProviderResult;

    /// Immediate children of `prefix` as `(segment, full key)` pairs, in the
    /// order the keys were posted. `person.name` and `person[name]` both yield
    /// the segment `name` for the prefix `person`.
    fn keys_from_prefix(&self, _prefix: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// The provider restricted to data a model bound from `source` may use,
    /// or `None` if this provider has nothing for that source.
    fn filter(&self, _source: &BindingSource) -> Option<Arc<dyn ValueProvider>> {
        None
    }
}

/// Sorted key index answering prefix queries.
#[derive(Debug, Clone, Default)]
pub struct PrefixContainer {
    sorted: Vec<String>,
    original: Vec<String>,
}

impl PrefixContainer {
    /// Indexes `keys`. Duplicates (ignoring ASCII case) are kept once.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut original: Vec<String> = Vec::new();
        for key in keys {
            let key = key.into();
            if seen.insert(key.to_ascii_lowercase()) {
                original.push(key);
            }
        }
        let mut sorted: Vec<String> = seen.into_iter().collect();
        sorted.sort_unstable();
        Self { sorted, original }
    }

    /// Whether any key equals `prefix` or lies below it.
    #[must_use]
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return !self.sorted.is_empty();
        }
        let needle = prefix.to_ascii_lowercase();
        let start = self.sorted.partition_point(|k| k.as_str() < needle.as_str());
        self.sorted[start..]
            .iter()
            .take_while(|k| k.starts_with(&needle))
            .any(|k| is_under_prefix(k, &needle))
    }

    /// Immediate children of `prefix`; see [`ValueProvider::keys_from_prefix`].
    #[must_use]
    pub fn keys_from_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut children: Vec<(String, String)> = Vec::new();
        for key in &self.original {
            if key.len() <= prefix.len() || !is_under_prefix(key, prefix) {
                continue;
            }
            let Some((segment, end)) = child_segment(key, prefix.len()) else {
                continue;
            };
            if segment.is_empty() || !seen.insert(segment.to_ascii_lowercase()) {
                continue;
            }
            children.push((segment.to_string(), key[..end].to_string()));
        }
        children
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// Whether there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

// Segment after `offset` and the byte length of the child key that ends it.
fn child_segment(key: &str, offset: usize) -> Option<(&str, usize)> {
    let rest = &key[offset..];
    if let Some(inner) = rest.strip_prefix('[') {
        let close = inner.find(']')?;
        return Some((&inner[..close], offset + close + 2));
    }
    let body = rest.strip_prefix('.').unwrap_or(rest);
    let skipped = rest.len() - body.len();
    let end = body.find(|c| c == '.' || c == '[').unwrap_or(body.len());
    Some((&body[..end], offset + skipped + end))
}

/// A provider over name/value pairs from one binding source.
///
/// Cloning is cheap; the pairs are shared.
#[derive(Debug, Clone)]
pub struct NameValueProvider {
    source: BindingSource,
    inner: Arc<NameValues>,
}

#[derive(Debug)]
struct NameValues {
    values: IndexMap<String, Vec<String>>,
    prefixes: PrefixContainer,
}

impl NameValueProvider {
    /// Creates a provider. Repeated names accumulate values in order.
    pub fn new<I>(source: BindingSource, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut values: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut names = Vec::new();
        for (name, value) in pairs {
            let lowered = name.to_ascii_lowercase();
            if !values.contains_key(&lowered) {
                names.push(name);
            }
            values.entry(lowered).or_default().push(value);
        }
        Self {
            source,
            inner: Arc::new(NameValues {
                values,
                prefixes: PrefixContainer::new(names),
            }),
        }
    }

    /// The binding source this provider serves.
    #[must_use]
    pub const fn binding_source(&self) -> &BindingSource {
        &self.source
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    /// Whether no names were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }
}

impl ValueProvider for NameValueProvider {
    fn contains_prefix(&self, prefix: &str) -> bool {
        self.inner.prefixes.contains_prefix(prefix)
    }

    fn get_value(&self, key: &str) -> ValueProviderResult {
        self.inner
            .values
            .get(&key.to_ascii_lowercase())
            .map(|values| ValueProviderResult::new(values.clone()))
            .unwrap_or_default()
    }

    fn keys_from_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.inner.prefixes.keys_from_prefix(prefix)
    }

    fn filter(&self, source: &BindingSource) -> Option<Arc<dyn ValueProvider>> {
        source
            .can_accept_data_from(&self.source)
            .then(|| Arc::new(self.clone()) as Arc<dyn ValueProvider>)
    }
}

/// A provider holding exactly one key.
///
/// Collection binders use it to feed each repeated value of a key to the
/// element binder in turn.
#[derive(Debug, Clone)]
pub struct ElementalValueProvider {
    key: String,
    value: String,
}

impl ElementalValueProvider {
    /// Creates the provider.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl ValueProvider for ElementalValueProvider {
    fn contains_prefix(&self, prefix: &str) -> bool {
        is_under_prefix(&self.key, prefix)
    }

    fn get_value(&self, key: &str) -> ValueProviderResult {
        if key.eq_ignore_ascii_case(&self.key) {
            ValueProviderResult::single(self.value.clone())
        } else {
            ValueProviderResult::none()
        }
    }
}

/// Ordered aggregate of providers. Earlier providers take precedence.
#[derive(Debug, Clone, Default)]
pub struct CompositeValueProvider {
    providers: Vec<Arc<dyn ValueProvider>>,
}

impl CompositeValueProvider {
    /// Creates an aggregate over `providers`.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ValueProvider>>) -> Self {
        Self { providers }
    }

    /// Appends a provider with the lowest precedence.
    pub fn push(&mut self, provider: Arc<dyn ValueProvider>) {
        self.providers.push(provider);
    }

    /// Inserts a provider with the highest precedence.
    pub fn push_front(&mut self, provider: Arc<dyn ValueProvider>) {
        self.providers.insert(0, provider);
    }

    /// The aggregated providers.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn ValueProvider>] {
        &self.providers
    }

    /// Number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether there are no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl ValueProvider for CompositeValueProvider {
    fn contains_prefix(&self, prefix: &str) -> bool {
        self.providers.iter().any(|p| p.contains_prefix(prefix))
    }

    fn get_value(&self, key: &str) -> ValueProviderResult {
        self.providers
            .iter()
            .map(|p| p.get_value(key))
            .find(|result| !result.is_none())
            .unwrap_or_default()
    }

    fn keys_from_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.providers
            .iter()
            .map(|p| p.keys_from_prefix(prefix))
            .find(|keys| !keys.is_empty())
            .unwrap_or_default()
    }

    fn filter(&self, source: &BindingSource) -> Option<Arc<dyn ValueProvider>> {
        let filtered: Vec<_> = self
            .providers
            .iter()
            .filter_map(|p| p.filter(source))
            .collect();
        if filtered.is_empty() {
            return None;
        }
        Some(Arc::new(Self::new(filtered)))
    }
}
