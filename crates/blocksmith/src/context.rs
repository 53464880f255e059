//! Cross-cutting deployment context shared by every building block.

use serde::{Deserialize, Serialize};

use crate::stamp::{ResourceReference, ResourceStamp};

/// Fields every resource kind consumes: where the resources land and which
/// subscription owns them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingBlockContext {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub location: String,
}

impl BuildingBlockContext {
    /// Builds a reference to a resource in this context's resource group.
    pub fn reference(
        &self,
        provider_path: impl Into<String>,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> ResourceReference {
        ResourceReference {
            subscription_id: self.subscription_id.clone(),
            resource_group_name: self.resource_group_name.clone(),
            provider_path: provider_path.into(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Stamps a resource into this context's resource group and location.
    pub fn stamp(
        &self,
        kind: impl Into<String>,
        name: impl Into<String>,
        properties: serde_json::Value,
    ) -> ResourceStamp {
        ResourceStamp {
            kind: kind.into(),
            name: name.into(),
            resource_group_name: self.resource_group_name.clone(),
            location: self.location.clone(),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_context() -> BuildingBlockContext {
        BuildingBlockContext {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_owned(),
            resource_group_name: "test-rg".to_owned(),
            location: "westus".to_owned(),
        }
    }

    #[test]
    fn reference_carries_context() {
        let reference = test_context().reference("Microsoft.Network/virtualNetworks", ["vnet"]);
        assert_eq!(reference.resource_group_name, "test-rg");
        assert_eq!(
            reference.to_id(),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/test-rg/providers/Microsoft.Network/virtualNetworks/vnet"
        );
    }

    #[test]
    fn stamp_carries_context() {
        let stamp = test_context().stamp(
            "Microsoft.Network/publicIPAddresses",
            "test-pip",
            serde_json::json!({}),
        );
        assert_eq!(stamp.location, "westus");
        assert_eq!(stamp.resource_group_name, "test-rg");
    }
}
