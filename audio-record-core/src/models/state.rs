use std::fmt;

/// Recorder session state machine.
///
/// State transitions:
/// ```text
/// uninitialized → initialized ⇄ recording
///                      ↓
///                   released (terminal)
/// ```
/// `initialized → initialized` is a re-initialisation with a new configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Recording,
    Released,
}

impl SessionState {
    pub fn can_initialize(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Initialized)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Recording => "recording",
            Self::Released => "released",
        })
    }
}

/// Lifecycle of a capture worker thread.
///
/// ```text
/// created → running → draining → terminated
/// ```
/// A worker that finds its input not recording goes straight from
/// `running` to `terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
}

impl WorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Terminated,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_states_can_initialize() {
        assert!(SessionState::Uninitialized.can_initialize());
        assert!(SessionState::Initialized.can_initialize());
        assert!(!SessionState::Recording.can_initialize());
        assert!(!SessionState::Released.can_initialize());
    }

    #[test]
    fn worker_state_round_trips_through_u8() {
        for state in [
            WorkerState::Created,
            WorkerState::Running,
            WorkerState::Draining,
            WorkerState::Terminated,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
    }
}
