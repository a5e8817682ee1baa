//! Header names used by the core, plus the case-preserving header multimap.

use std::collections::HashMap;

pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const CONNECTION: &str = "Connection";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const HOST: &str = "Host";
pub const LOCATION: &str = "Location";
pub const SERVER: &str = "Server";

/// Multimap of header names to values. Keys keep the case they were inserted
/// with; reads that cross a trust boundary go through the `_ignore_case`
/// variants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`, keeping any values already stored.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(name.into()).or_default().push(value.into());
    }

    /// Replace every value stored under `name`. Existing keys are matched
    /// case-insensitively so an injected `Content-Length` cannot coexist
    /// with an upstream `content-length`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.entries.insert(name.to_string(), vec![value.into()]);
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn first_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
