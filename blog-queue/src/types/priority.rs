use serde::{Deserialize, Serialize};

/// Job priority. Higher values are dispatched first.
///
/// Ordering across priorities: `jobs.sort_by_key(|r| (Reverse(r.message.priority), r.next_run_at))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPriority(pub u8);

impl JobPriority {
    pub const LOW: Self = Self(1);
    pub const NORMAL: Self = Self(5);
    pub const HIGH: Self = Self(8);
    pub const CRITICAL: Self = Self(10);

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for JobPriority {
    fn from(value: u8) -> Self {
        Self(value)
    }
}
