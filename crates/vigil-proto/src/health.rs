use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model: String,
}

impl HealthStatus {
    pub fn ok(model: impl Into<String>) -> Self {
        Self { status: "ok".into(), model: model.into() }
    }
}
