//! Tag-based hard exclusions
//!
//! Checked before any metric call: a protected or managed resource is never
//! worth a metric query.

use super::ExclusionReason;
use crate::models::Tag;

pub const DEFAULT_PROTECTED_KEYS: &[&str] = &["keep", "do_not_delete", "protected"];

pub const DEFAULT_MANAGED_INDICATORS: &[&str] =
    &["kubernetes.io/", "ebs.csi.aws.com", "csivolumename"];

/// Protection markers and managed-subsystem indicators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionPolicy {
    /// Lowercased tag keys that protect a resource
    protected_keys: Vec<String>,
    /// Lowercased substrings identifying resources owned by another subsystem
    managed_indicators: Vec<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROTECTED_KEYS.iter().copied(),
            DEFAULT_MANAGED_INDICATORS.iter().copied(),
        )
    }
}

impl ExclusionPolicy {
    pub fn new<P, M>(protected_keys: P, managed_indicators: M) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            protected_keys: protected_keys
                .into_iter()
                .map(|k| k.as_ref().to_ascii_lowercase())
                .collect(),
            managed_indicators: managed_indicators
                .into_iter()
                .map(|m| m.as_ref().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Policy that excludes nothing
    pub fn none() -> Self {
        Self::new(Vec::<String>::new(), Vec::<String>::new())
    }

    /// First exclusion that applies to `tags`, if any
    ///
    /// Protection is checked before managed ownership.
    pub fn check(&self, tags: &[Tag]) -> Option<ExclusionReason> {
        if let Some(tag) = tags
            .iter()
            .find(|t| self.protected_keys.contains(&t.key.to_ascii_lowercase()))
        {
            return Some(ExclusionReason::Protected {
                key: tag.key.clone(),
            });
        }

        tags.iter()
            .find(|t| self.is_managed(t))
            .map(|t| ExclusionReason::Managed { key: t.key.clone() })
    }

    fn is_managed(&self, tag: &Tag) -> bool {
        let key = tag.key.to_ascii_lowercase();
        let value = tag.value.to_ascii_lowercase();
        self.managed_indicators
            .iter()
            .any(|indicator| key.contains(indicator.as_str()) || value.contains(indicator.as_str()))
    }
}
