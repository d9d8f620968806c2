// Alert severity value object

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const HIGH_SCORE: u32 = 90;
    pub const MEDIUM_SCORE: u32 = 75;

    pub fn from_score(score: u32) -> Self {
        if score >= Self::HIGH_SCORE {
            Severity::High
        } else if score >= Self::MEDIUM_SCORE {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands_follow_score() {
        assert_eq!(Severity::from_score(100), Severity::High);
        assert_eq!(Severity::from_score(90), Severity::High);
        assert_eq!(Severity::from_score(89), Severity::Medium);
        assert_eq!(Severity::from_score(75), Severity::Medium);
        assert_eq!(Severity::from_score(74), Severity::Low);
        assert_eq!(Severity::from_score(70), Severity::Low);
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Medium).expect("serialize");
        assert_eq!(json, "\"MEDIUM\"");
        assert_eq!(Severity::High.to_string(), "HIGH");
    }
}
