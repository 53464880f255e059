//! Canonical resource-identifier strings.
//!
//! Every cross-reference between stamps is reduced to the path-style form
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{providerPath}/{name}/...`.

/// Formats the canonical id for a resource within a subscription and resource group.
///
/// `provider_path` is the provider type path (for example
/// `Microsoft.Compute/virtualMachines`), `names` the resource name followed by
/// any subresource type/name pairs.
///
/// Segments are expected to be already-validated, non-empty names. This is a
/// pure formatter and performs no validation of its own beyond a debug-level
/// non-emptiness check.
pub fn resource_id(
    subscription_id: &str,
    resource_group_name: &str,
    provider_path: &str,
    names: &[&str],
) -> String {
    debug_assert!(!subscription_id.is_empty());
    debug_assert!(!resource_group_name.is_empty());
    debug_assert!(!provider_path.is_empty());
    debug_assert!(names.iter().all(|name| !name.is_empty()));

    let mut id = format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group_name}/providers/{provider_path}"
    );
    for name in names {
        id.push('/');
        id.push_str(name);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_resource() {
        assert_eq!(
            resource_id(
                "00000000-0000-0000-0000-000000000000",
                "my-rg",
                "Microsoft.Compute/virtualMachines",
                &["test-vm1"],
            ),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/my-rg/providers/Microsoft.Compute/virtualMachines/test-vm1"
        );
    }

    #[test]
    fn subresource() {
        assert_eq!(
            resource_id(
                "sub",
                "rg",
                "Microsoft.Network/applicationGateways",
                &["gw", "httpListeners", "listener1"],
            ),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/applicationGateways/gw/httpListeners/listener1"
        );
    }

    #[test]
    fn no_names_yields_provider_path_only() {
        assert_eq!(
            resource_id("sub", "rg", "Microsoft.Network/virtualNetworks", &[]),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks"
        );
    }
}
