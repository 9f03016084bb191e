//! Per-origin policy map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-origin tri-state. *Absent* from the map means `unknown`; once set to
/// `Upgrade` or `Passthrough` an entry never changes again (policy is
/// monotonic once observed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Upgrade,
    Passthrough,
}

/// Process-wide map from `"host:port"` to [`Policy`]. Cheap to clone: all
/// clones share the same backing map, guarded by a plain mutex since
/// contention is negligible.
#[derive(Debug, Clone, Default)]
pub struct PolicyMap {
    inner: Arc<Mutex<HashMap<String, Policy>>>,
}

impl PolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The request task's view: absent entries read as optimistic `Upgrade`,
    /// even though it means the first request to a new origin may be sent
    /// in upgrade form and bounce.
    pub fn get_or_upgrade(&self, origin: &str) -> Policy {
        self.inner
            .lock()
            .expect("policy map mutex poisoned")
            .get(origin)
            .copied()
            .unwrap_or(Policy::Upgrade)
    }

    /// The response task's view: `None` means "still unknown, keep reading
    /// responses on this origin".
    pub fn get(&self, origin: &str) -> Option<Policy> {
        self.inner
            .lock()
            .expect("policy map mutex poisoned")
            .get(origin)
            .copied()
    }

    pub fn set(&self, origin: &str, policy: Policy) {
        self.inner
            .lock()
            .expect("policy map mutex poisoned")
            .insert(origin.to_string(), policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_origin_reads_as_optimistic_upgrade() {
        let map = PolicyMap::new();
        assert_eq!(map.get_or_upgrade("example.com:80"), Policy::Upgrade);
        assert_eq!(map.get("example.com:80"), None);
    }

    #[test]
    fn set_is_observed_by_both_views() {
        let map = PolicyMap::new();
        map.set("example.com:80", Policy::Passthrough);
        assert_eq!(map.get("example.com:80"), Some(Policy::Passthrough));
        assert_eq!(map.get_or_upgrade("example.com:80"), Policy::Passthrough);
    }

    #[test]
    fn clones_share_the_same_backing_map() {
        let map = PolicyMap::new();
        let other = map.clone();
        other.set("a:1", Policy::Upgrade);
        assert_eq!(map.get("a:1"), Some(Policy::Upgrade));
    }
}
