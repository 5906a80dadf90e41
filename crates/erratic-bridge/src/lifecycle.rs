use std::fmt;

/// Where an [`ErraticBridge`][crate::ErraticBridge] is in its
/// subscribe/run/stop cycle.
///
/// ```text
/// Created ──start()──► Subscribed ──► Running ──stop()──► Stopped
///    │                     │                                 ▲
///    │                     └──────────────stop()─────────────┘
///    └──subscribe failure──► InitFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Created,
    Subscribed,
    Running,
    Stopped,
    InitFailed,
}

impl LifecycleState {
    /// `true` while device subscriptions may be held.
    pub fn holds_subscriptions(self) -> bool {
        matches!(self, Self::Subscribed | Self::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Subscribed => "subscribed",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::InitFailed => "init-failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_live_states_hold_subscriptions() {
        assert!(LifecycleState::Subscribed.holds_subscriptions());
        assert!(LifecycleState::Running.holds_subscriptions());
        assert!(!LifecycleState::Created.holds_subscriptions());
        assert!(!LifecycleState::InitFailed.holds_subscriptions());
        assert!(!LifecycleState::Stopped.holds_subscriptions());
    }

    #[test]
    fn display_names() {
        assert_eq!(LifecycleState::default().to_string(), "created");
        assert_eq!(LifecycleState::InitFailed.to_string(), "init-failed");
    }
}
