//! Health report entries

use serde::{Deserialize, Serialize};

/// Status line shown by the health endpoint
pub const ALL_HEALTHY: &str = "all connections are healthy";

/// One line of the health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    pub status: String,
}

impl HealthEntry {
    /// A failing collaborator
    pub fn unhealthy(connection: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            connection: Some(connection.into()),
            status: status.into(),
        }
    }

    pub fn all_healthy() -> Self {
        Self {
            connection: None,
            status: ALL_HEALTHY.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.connection.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_entry_serialization() {
        let json = serde_json::to_value(HealthEntry::all_healthy()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": ALL_HEALTHY }));

        let json = serde_json::to_value(HealthEntry::unhealthy("store", "unhealthy")).unwrap();
        assert_eq!(json["connection"], "store");
    }
}
