//! Deployment instance descriptors

use std::fmt;

use serde::{Deserialize, Serialize};

/// How an instance group's jobs run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Long running processes
    #[default]
    Service,
    /// One-shot jobs run on demand
    Errand,
}

/// One instance of an instance group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Owning instance group
    pub group: String,
    /// Index within the group
    pub index: u32,
    /// VM identifier, once a VM exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_cid: Option<String>,
}

impl Instance {
    pub fn new(group: impl Into<String>, index: u32) -> Self {
        Self {
            group: group.into(),
            index,
            vm_cid: None,
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.index)
    }
}

/// An instance group of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl InstanceGroup {
    /// Create an errand group with `count` instances
    pub fn errand(name: impl Into<String>, count: u32) -> Self {
        let name = name.into();
        let instances = (0..count).map(|i| Instance::new(name.clone(), i)).collect();
        Self {
            name,
            lifecycle: Lifecycle::Errand,
            instances,
        }
    }

    /// Whether this group can run errands
    pub fn is_errand(&self) -> bool {
        self.lifecycle == Lifecycle::Errand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errand_group() {
        let group = InstanceGroup::errand("smoke-tests", 2);
        assert!(group.is_errand());
        assert_eq!(group.instances.len(), 2);
        assert_eq!(group.instances[1].to_string(), "smoke-tests/1");
    }

    #[test]
    fn test_lifecycle_defaults_to_service() {
        let group: InstanceGroup = serde_json::from_str(r#"{"name": "web"}"#).unwrap();
        assert!(!group.is_errand());
        assert!(group.instances.is_empty());
    }
}
