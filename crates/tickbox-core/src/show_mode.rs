#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The active display filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowMode {
    #[default]
    All,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter `{0}` (expected all, active or completed)")]
pub struct UnknownShowMode(pub String);

impl ShowMode {
    pub const ALL: [ShowMode; 3] = [ShowMode::All, ShowMode::Active, ShowMode::Completed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Whether an item with the given completion state is shown.
    #[must_use]
    pub const fn shows(self, completed: bool) -> bool {
        match self {
            Self::All => true,
            Self::Active => !completed,
            Self::Completed => completed,
        }
    }
}

impl fmt::Display for ShowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShowMode {
    type Err = UnknownShowMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(UnknownShowMode(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_agree() {
        for mode in ShowMode::ALL {
            assert_eq!(mode.to_string().parse::<ShowMode>(), Ok(mode));
        }
        assert_eq!(" Active ".parse::<ShowMode>(), Ok(ShowMode::Active));
        assert!("done".parse::<ShowMode>().is_err());
    }

    #[test]
    fn shows_by_completion() {
        assert!(ShowMode::All.shows(true) && ShowMode::All.shows(false));
        assert!(ShowMode::Active.shows(false) && !ShowMode::Active.shows(true));
        assert!(ShowMode::Completed.shows(true) && !ShowMode::Completed.shows(false));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&ShowMode::Completed).unwrap(), r#""completed""#);
        let mode: ShowMode = serde_json::from_str(r#""active""#).unwrap();
        assert_eq!(mode, ShowMode::Active);
    }
}
