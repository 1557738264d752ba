//! Supported realms and their stable name/digit mapping

use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported external realm (source of joining users).
///
/// The digit mapping is persisted in the registry and embedded in dialed
/// galaxy-override digits; it must never be renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Galaxy {
    #[default]
    Unknown,
    Altspace,
    Sansar,
}

impl Galaxy {
    /// Stable numeric ID used in persistence and address overrides
    pub fn digit(self) -> u8 {
        match self {
            Galaxy::Unknown => 0,
            Galaxy::Altspace => 1,
            Galaxy::Sansar => 2,
        }
    }

    pub fn from_digit(digit: u8) -> Self {
        match digit {
            1 => Galaxy::Altspace,
            2 => Galaxy::Sansar,
            _ => Galaxy::Unknown,
        }
    }

    /// Lowercase realm name used in FQLIDs
    pub fn name(self) -> &'static str {
        match self {
            Galaxy::Unknown => "unknown",
            Galaxy::Altspace => "altspace",
            Galaxy::Sansar => "sansar",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "altspace" => Galaxy::Altspace,
            "sansar" => Galaxy::Sansar,
            _ => Galaxy::Unknown,
        }
    }
}

impl fmt::Display for Galaxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_mapping_is_stable() {
        assert_eq!(Galaxy::Unknown.digit(), 0);
        assert_eq!(Galaxy::Altspace.digit(), 1);
        assert_eq!(Galaxy::Sansar.digit(), 2);

        for galaxy in [Galaxy::Unknown, Galaxy::Altspace, Galaxy::Sansar] {
            assert_eq!(Galaxy::from_digit(galaxy.digit()), galaxy);
            assert_eq!(Galaxy::from_name(galaxy.name()), galaxy);
        }
    }

    #[test]
    fn test_unknown_fallbacks() {
        assert_eq!(Galaxy::from_digit(99), Galaxy::Unknown);
        assert_eq!(Galaxy::from_name("orion"), Galaxy::Unknown);
    }
}
