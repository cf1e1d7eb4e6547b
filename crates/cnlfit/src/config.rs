//! Registry configuration.
//!
//! Defaults can be overridden programmatically or from the environment:
//!
//! | Variable              | Field          | Default |
//! |-----------------------|----------------|---------|
//! | `CNLFIT_MAX_SESSIONS` | `max_sessions` | 1       |
//! | `CNLFIT_POOL_SIZE`    | `pool_size`    | 32      |
//! | `CNLFIT_POOL_WAIT`    | `pool_policy`  | fail    |

use cnlfit_core::env::{parse_flag, parse_or};

use crate::pool::AllocPolicy;

pub const DEFAULT_MAX_SESSIONS: usize = 1;
pub const DEFAULT_POOL_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitConfig {
    /// Capacity of the session table.
    pub max_sessions: usize,
    /// Number of event/request containers shared by all sessions.
    pub pool_size: usize,
    /// What an allocation does when the pool is empty.
    pub pool_policy: AllocPolicy,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            pool_size: DEFAULT_POOL_SIZE,
            pool_policy: AllocPolicy::Fail,
        }
    }
}

impl FitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `CNLFIT_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` yields for each `CNLFIT_*`
    /// name.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let wait = parse_flag(
            lookup("CNLFIT_POOL_WAIT").as_deref(),
            d.pool_policy == AllocPolicy::WaitForever,
        );
        Self {
            max_sessions: parse_or(lookup("CNLFIT_MAX_SESSIONS").as_deref(), d.max_sessions),
            pool_size: parse_or(lookup("CNLFIT_POOL_SIZE").as_deref(), d.pool_size),
            pool_policy: if wait { AllocPolicy::WaitForever } else { AllocPolicy::Fail },
        }
        .sanitized()
    }

    pub fn max_sessions(mut self, n: usize) -> Self {
        self.max_sessions = n;
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = n;
        self
    }

    pub fn pool_policy(mut self, policy: AllocPolicy) -> Self {
        self.pool_policy = policy;
        self
    }

    /// Clamp zero sizes up to one; a registry always has a slot and a container.
    pub fn sanitized(mut self) -> Self {
        self.max_sessions = self.max_sessions.max(1);
        self.pool_size = self.pool_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = FitConfig::default();
        assert_eq!(c.max_sessions, 1);
        assert_eq!(c.pool_size, 32);
        assert_eq!(c.pool_policy, AllocPolicy::Fail);
    }

    #[test]
    fn builder_and_sanitize() {
        let c = FitConfig::new().max_sessions(0).pool_size(0).sanitized();
        assert_eq!(c.max_sessions, 1);
        assert_eq!(c.pool_size, 1);
    }

    #[test]
    fn lookup_overrides() {
        let c = FitConfig::from_lookup(|key| match key {
            "CNLFIT_MAX_SESSIONS" => Some("4".into()),
            "CNLFIT_POOL_SIZE" => Some("0".into()),
            "CNLFIT_POOL_WAIT" => Some("yes".into()),
            _ => None,
        });
        assert_eq!(c.max_sessions, 4);
        assert_eq!(c.pool_size, 1);
        assert_eq!(c.pool_policy, AllocPolicy::WaitForever);
    }

    #[test]
    fn lookup_garbage_keeps_defaults() {
        let c = FitConfig::from_lookup(|_| Some("lots".into()));
        assert_eq!(c.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(c.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(c.pool_policy, AllocPolicy::Fail);
    }
}
