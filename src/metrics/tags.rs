//! Tags and metadata attached to samples.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{HttpTrailError, Result};

/// Well-known tags the engine sets on its own samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SystemTag {
    Proto,
    Subproto,
    Status,
    Method,
    Url,
    Name,
    Group,
    Check,
    Error,
    ErrorCode,
    TlsVersion,
    Scenario,
    Service,
    ExpectedResponse,
    Ip,
    Vu,
    Iter,
}

impl SystemTag {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Per-VU/per-iteration values go to metadata, not indexed tags.
    pub fn is_indexable(self) -> bool {
        !matches!(self, Self::Vu | Self::Iter)
    }
}

/// Which system tags are enabled for a run.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SystemTagSet(u32);

impl SystemTagSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        SystemTag::iter().fold(Self::empty(), Self::with)
    }

    pub fn with(self, tag: SystemTag) -> Self {
        Self(self.0 | tag.bit())
    }

    pub fn without(self, tag: SystemTag) -> Self {
        Self(self.0 & !tag.bit())
    }

    pub fn has(&self, tag: SystemTag) -> bool {
        self.0 & tag.bit() != 0
    }

    /// Parse a list like `["status", "method", "ip"]`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        names.iter().try_fold(Self::empty(), |set, name| {
            let tag = SystemTag::from_str(name.as_ref()).map_err(|_| {
                HttpTrailError::InvalidArgument(format!("unknown system tag `{}`", name.as_ref()))
            })?;
            Ok(set.with(tag))
        })
    }
}

impl Default for SystemTagSet {
    fn default() -> Self {
        Self::all()
            .without(SystemTag::Ip)
            .without(SystemTag::Vu)
            .without(SystemTag::Iter)
    }
}

impl fmt::Debug for SystemTagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(SystemTag::iter().filter(|t| self.has(*t)))
            .finish()
    }
}

/// An ordered set of indexed tag key/values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Copy with one more tag, leaving `self` untouched.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.insert(key, value);
        next
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Tags plus non-indexed metadata, cloned per request before being filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagsAndMeta {
    pub tags: TagSet,
    pub metadata: BTreeMap<String, String>,
}

impl TagsAndMeta {
    pub fn new(tags: TagSet) -> Self {
        Self {
            tags,
            metadata: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key)
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key, value);
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn set_system_tag_or_meta(&mut self, tag: SystemTag, value: impl Into<String>) {
        if tag.is_indexable() {
            self.set_tag(tag.to_string(), value);
        } else {
            self.set_metadata(tag.to_string(), value);
        }
    }

    pub fn set_system_tag_or_meta_if_enabled(
        &mut self,
        enabled: SystemTagSet,
        tag: SystemTag,
        value: impl Into<String>,
    ) {
        if enabled.has(tag) {
            self.set_system_tag_or_meta(tag, value);
        }
    }
}
