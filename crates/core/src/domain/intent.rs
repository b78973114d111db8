use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of categories a user message can resolve to. Routing is total
/// over this enum; anything the classifier cannot place lands on `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Login,
    Subscription,
    Reservation,
    Knowledge,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Login,
        Intent::Subscription,
        Intent::Reservation,
        Intent::Knowledge,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Subscription => "subscription",
            Self::Reservation => "reservation",
            Self::Knowledge => "knowledge",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized intent label `{0}`")]
pub struct ParseIntentError(pub String);

impl FromStr for Intent {
    type Err = ParseIntentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "login" => Ok(Self::Login),
            "subscription" => Ok(Self::Subscription),
            "reservation" => Ok(Self::Reservation),
            "knowledge" => Ok(Self::Knowledge),
            "unknown" => Ok(Self::Unknown),
            other => Err(ParseIntentError(other.to_string())),
        }
    }
}
