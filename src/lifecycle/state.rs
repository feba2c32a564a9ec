//! Application lifecycle states

use strum_macros::{Display, EnumString, IntoStaticStr};

/// The lifecycle state of an [`Application`](super::Application)
///
/// ```text
/// created ──start──▶ starting ──▶ started ──stop──▶ stopping ──▶ stopped
///                        ▲                                          │
///                        └──────────────────start───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum State {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl State {
    /// Whether a start or stop sequence is running
    pub fn is_transitional(self) -> bool {
        matches!(self, State::Starting | State::Stopping)
    }
}

/// A lifecycle operation on the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Start,
    Stop,
}

impl Operation {
    /// The state the application is in while this operation runs
    pub(crate) fn in_progress(self) -> State {
        match self {
            Operation::Start => State::Starting,
            Operation::Stop => State::Stopping,
        }
    }

    /// The state the application settles in once this operation completes
    pub(crate) fn settled(self) -> State {
        match self {
            Operation::Start => State::Started,
            Operation::Stop => State::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_state_names() {
        assert_eq!(State::Starting.to_string(), "starting");
        assert_eq!(State::from_str("stopped").unwrap(), State::Stopped);
        assert_eq!(Operation::Stop.to_string(), "stop");
    }

    #[test]
    fn test_transitional_states() {
        assert!(State::Starting.is_transitional());
        assert!(State::Stopping.is_transitional());
        assert!(!State::Created.is_transitional());
        assert!(!State::Started.is_transitional());
        assert!(!State::Stopped.is_transitional());
    }
}
