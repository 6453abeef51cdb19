//! Cross-kind lookups shared by pipelines
//!
//! Some pipelines need facts about other resource kinds (an address needs
//! the state of its instance, a snapshot needs the name of its volume). The
//! index is collected once per scan and passed to those pipelines explicitly.

use crate::models::{ResourceDescriptor, ResourceKind};
use crate::sources::ResourceSource;
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub state: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSummary {
    pub volume_type: String,
    pub name: String,
    /// First attached instance
    pub instance_id: Option<String>,
}

/// Instances and volumes keyed by id
#[derive(Debug, Clone, Default)]
pub struct InventoryIndex {
    instances: HashMap<String, InstanceSummary>,
    volumes: HashMap<String, VolumeSummary>,
}

impl InventoryIndex {
    pub fn from_descriptors(
        instances: &[ResourceDescriptor],
        volumes: &[ResourceDescriptor],
    ) -> Self {
        let instances = instances
            .iter()
            .map(|d| {
                (
                    d.id(),
                    InstanceSummary {
                        state: d.str_attr("State.Name").unwrap_or_default().to_string(),
                        name: d.name_tag(),
                    },
                )
            })
            .collect();

        let volumes = volumes
            .iter()
            .map(|d| {
                (
                    d.id(),
                    VolumeSummary {
                        volume_type: d.str_attr("VolumeType").unwrap_or_default().to_string(),
                        name: d.name_tag(),
                        instance_id: d.str_attr("Attachments.0.InstanceId").map(str::to_string),
                    },
                )
            })
            .collect();

        Self { instances, volumes }
    }

    /// List instances and volumes from the resource source
    pub async fn collect(resources: &dyn ResourceSource) -> Result<Self> {
        let instances = resources
            .list(ResourceKind::Instance)
            .await
            .context("listing instances for the inventory index")?;
        let volumes = resources
            .list(ResourceKind::Volume)
            .await
            .context("listing volumes for the inventory index")?;

        debug!(
            instances = instances.len(),
            volumes = volumes.len(),
            "Collected inventory index"
        );
        Ok(Self::from_descriptors(&instances, &volumes))
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceSummary> {
        self.instances.get(id)
    }

    pub fn instance_state(&self, id: &str) -> Option<&str> {
        self.instance(id).map(|i| i.state.as_str())
    }

    pub fn volume(&self, id: &str) -> Option<&VolumeSummary> {
        self.volumes.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::FakeCloud;
    use serde_json::json;

    #[tokio::test]
    async fn test_collect() {
        let cloud = FakeCloud::default()
            .with_resources(
                ResourceKind::Instance,
                vec![json!({
                    "InstanceId": "i-1",
                    "State": {"Name": "running"},
                    "Tags": [{"Key": "Name", "Value": "web"}]
                })],
            )
            .with_resources(
                ResourceKind::Volume,
                vec![json!({
                    "VolumeId": "vol-1",
                    "VolumeType": "gp3",
                    "Attachments": [{"InstanceId": "i-1"}]
                })],
            );

        let index = InventoryIndex::collect(&cloud).await.unwrap();

        assert_eq!(index.instance_state("i-1"), Some("running"));
        assert_eq!(index.instance("i-1").unwrap().name, "web");
        let volume = index.volume("vol-1").unwrap();
        assert_eq!(volume.volume_type, "gp3");
        assert_eq!(volume.instance_id.as_deref(), Some("i-1"));
        assert!(index.volume("vol-missing").is_none());
    }
}
