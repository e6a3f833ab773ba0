use std::fmt;

use serde::{Deserialize, Serialize};

/// Status returned by every public recorder operation.
///
/// Callers outside the core only ever see this value, usually as its ordinal.
/// The ordinals are stable and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    NoError = 0,
    InitError = 1,
    StateError = 2,
    StartError = 3,
    StopError = 4,
    ReleaseError = 5,
}

impl StatusCode {
    pub const ALL: [StatusCode; 6] = [
        Self::NoError,
        Self::InitError,
        Self::StateError,
        Self::StartError,
        Self::StopError,
        Self::ReleaseError,
    ];

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.ordinal() == ordinal)
    }

    pub fn is_ok(self) -> bool {
        self == Self::NoError
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoError => "no error",
            Self::InitError => "init error",
            Self::StateError => "state error",
            Self::StartError => "start error",
            Self::StopError => "stop error",
            Self::ReleaseError => "release error",
        };
        write!(f, "{} ({})", name, self.ordinal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_stable() {
        assert_eq!(StatusCode::NoError.ordinal(), 0);
        assert_eq!(StatusCode::InitError.ordinal(), 1);
        assert_eq!(StatusCode::StateError.ordinal(), 2);
        assert_eq!(StatusCode::StartError.ordinal(), 3);
        assert_eq!(StatusCode::StopError.ordinal(), 4);
        assert_eq!(StatusCode::ReleaseError.ordinal(), 5);
    }

    #[test]
    fn from_ordinal_rejects_unknown_values() {
        assert_eq!(StatusCode::from_ordinal(3), Some(StatusCode::StartError));
        assert_eq!(StatusCode::from_ordinal(6), None);
        assert_eq!(StatusCode::from_ordinal(-1), None);
    }

    #[test]
    fn display_includes_ordinal() {
        assert_eq!(StatusCode::StopError.to_string(), "stop error (4)");
    }
}
