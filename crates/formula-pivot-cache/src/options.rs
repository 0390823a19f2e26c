use serde::{Deserialize, Serialize};

/// Number of record slots added when a write lands past the allocated capacity.
pub const DEFAULT_GROWTH_STEP: usize = 128;

/// Tuning knobs for a [`crate::DataCache`].
///
/// Deserializes from partial payloads: missing keys fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    #[serde(default = "crate::options::default_growth_step")]
    pub growth_step: usize,
    /// Upper bound on the slots reserved by `begin_import`. Sources frequently over-report their
    /// row count; records past the limit are still accepted and grow the store on demand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preallocation_limit: Option<usize>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            growth_step: DEFAULT_GROWTH_STEP,
            preallocation_limit: None,
        }
    }
}

impl CacheOptions {
    pub(crate) fn preallocation(&self, expected: usize) -> usize {
        match self.preallocation_limit {
            Some(limit) => expected.min(limit),
            None => expected,
        }
    }
}

pub(crate) const fn default_growth_step() -> usize {
    DEFAULT_GROWTH_STEP
}
