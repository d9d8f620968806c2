use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "transaction-events")]
    TransactionEvents,
    #[serde(rename = "fraud-alerts")]
    FraudAlerts,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::TransactionEvents, Topic::FraudAlerts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::TransactionEvents => "transaction-events",
            Topic::FraudAlerts => "fraud-alerts",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
