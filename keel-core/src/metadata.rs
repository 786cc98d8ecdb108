//! Handshake metadata (ZMTP properties).
//!
//! An ordered list of `name -> value` pairs as carried by READY and INITIATE
//! commands. Property names are compared case-insensitively, as ZMTP requires.

use bytes::Bytes;
use smallvec::SmallVec;

/// Ordered set of handshake properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    props: SmallVec<[(String, Bytes); 4]>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a property.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        let name = name.into();
        let value = value.into();
        match self
            .props
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.props.push((name, value)),
        }
    }

    /// Look up a property value.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.props
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Copy every property of `other` into `self`, replacing duplicates.
    pub fn extend_from(&mut self, other: &Metadata) {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.props.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}
