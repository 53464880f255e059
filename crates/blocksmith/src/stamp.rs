//! Concrete output resources and the references between them.

use serde::Serialize;
use serde_json::Value;

use crate::resource_id::resource_id;

/// Fixed placeholder substituted for a secret's plaintext value in every
/// [`ResourceStamp`]. The plaintext is surfaced exactly once, on the
/// transform output's side-channel field.
pub const REDACTED_SECRET: &str = "*** REDACTED ***";

/// One concrete resource instance emitted by a transform: a computed name and
/// a fully populated, provider-shaped property bag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStamp {
    /// Provider type path, for example `Microsoft.Compute/virtualMachines`.
    #[serde(rename = "type")]
    pub kind: String,

    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub properties: Value,
}

/// A non-owning, named pointer to another resource.
///
/// Reducible to a canonical id string via [`ResourceReference::to_id`]; it
/// never owns the resource it points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub provider_path: String,
    pub names: Vec<String>,
}

impl ResourceReference {
    pub fn to_id(&self) -> String {
        let names = self.names.iter().map(String::as_str).collect::<Vec<_>>();
        resource_id(
            &self.subscription_id,
            &self.resource_group_name,
            &self.provider_path,
            &names,
        )
    }

    /// The property-bag shape every provider expects for an embedded
    /// reference: `{"id": "/subscriptions/..."}`.
    pub fn to_property(&self) -> Value {
        serde_json::json!({ "id": self.to_id() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ResourceReference {
        ResourceReference {
            subscription_id: "sub".to_owned(),
            resource_group_name: "rg".to_owned(),
            provider_path: "Microsoft.Network/networkInterfaces".to_owned(),
            names: vec!["test-vm1-nic1".to_owned()],
        }
    }

    #[test]
    fn reference_reduces_to_id() {
        assert_eq!(
            reference().to_id(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/test-vm1-nic1"
        );
    }

    #[test]
    fn reference_property_shape() {
        assert_eq!(
            reference().to_property(),
            serde_json::json!({
                "id": "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/test-vm1-nic1"
            })
        );
    }

    #[test]
    fn stamp_serializes_with_provider_type_key() {
        let stamp = ResourceStamp {
            kind: "Microsoft.Compute/virtualMachines".to_owned(),
            name: "test-vm1".to_owned(),
            resource_group_name: "rg".to_owned(),
            location: "westus".to_owned(),
            properties: serde_json::json!({}),
        };
        let serialized = serde_json::to_value(&stamp).expect("stamp serializes");
        assert_eq!(serialized["type"], "Microsoft.Compute/virtualMachines");
        assert_eq!(serialized["name"], "test-vm1");
    }
}
