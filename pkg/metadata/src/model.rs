//! Subset of the Rancher metadata (2015-12-19) document used by the controller.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Stack {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment_uuid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub stack_name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// `public:private` port specs.
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub stack_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub health_state: String,
    /// `hostIP:publicPort:privatePort[/proto]` port specs.
    #[serde(default)]
    pub ports: Vec<String>,
}

impl Container {
    /// Running, and either healthy or without a health check.
    pub fn is_serving(&self) -> bool {
        self.state == "running"
            && matches!(self.health_state.as_str(), "healthy" | "updating-healthy" | "")
    }
}
