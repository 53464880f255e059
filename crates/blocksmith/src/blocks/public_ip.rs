//! Public IP address building block.
//!
//! Used standalone, and as a synthesized child: the virtual-machine block
//! runs this pipeline for every public NIC, the application-gateway block
//! for every Public front end.

use serde_json::{Value, json};
use strum::VariantNames;

use super::{BuildingBlock, Error, TransformOutput, str_field};
use crate::{
    context::BuildingBlockContext,
    merge,
    rules::{RuleSet, check},
};

pub const PROVIDER_PATH: &str = "Microsoft.Network/publicIPAddresses";

/// Output kind key for the stamps this block emits.
pub const OUTPUT_KIND: &str = "publicIpAddresses";

#[derive(Clone, Copy, Debug, PartialEq, Eq, VariantNames)]
pub enum IpAllocationMethod {
    Static,
    Dynamic,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PublicIpBlock;

impl BuildingBlock for PublicIpBlock {
    const KIND: &'static str = "publicIpAddress";

    fn defaults(&self, _settings: &Value) -> Result<Value, merge::Error> {
        Ok(json!({
            "publicIPAllocationMethod": "Dynamic",
            "publicIPAddressVersion": "IPv4",
        }))
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .leaf("name", check::valid_name)
            .leaf(
                "publicIPAllocationMethod",
                check::one_of(IpAllocationMethod::VARIANTS),
            )
            .leaf("publicIPAddressVersion", check::one_of(&["IPv4", "IPv6"]))
            .leaf("domainNameLabel", check::optional(check::valid_name))
            .leaf(
                "idleTimeoutInMinutes",
                check::optional(check::positive_integer),
            )
    }

    fn transform(
        &self,
        merged: &Value,
        context: &BuildingBlockContext,
    ) -> Result<TransformOutput, Error> {
        let name = str_field(merged, "/name")?;

        let mut properties = json!({
            "publicIPAllocationMethod": str_field(merged, "/publicIPAllocationMethod")?,
            "publicIPAddressVersion": str_field(merged, "/publicIPAddressVersion")?,
        });
        if let Some(label) = merged.pointer("/domainNameLabel").and_then(Value::as_str) {
            properties["dnsSettings"] = json!({ "domainNameLabel": label });
        }
        if let Some(timeout) = merged
            .pointer("/idleTimeoutInMinutes")
            .and_then(Value::as_u64)
        {
            properties["idleTimeoutInMinutes"] = json!(timeout);
        }

        let mut output = TransformOutput::default();
        output.push(OUTPUT_KIND, context.stamp(PROVIDER_PATH, name, properties));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::blocks::process;

    fn context() -> BuildingBlockContext {
        BuildingBlockContext {
            subscription_id: "sub".to_owned(),
            resource_group_name: "rg".to_owned(),
            location: "westus".to_owned(),
        }
    }

    #[test]
    fn minimal_settings_default_to_dynamic_ipv4() {
        let run = process(&PublicIpBlock, &json!({ "name": "test-pip" }), &context())
            .expect("pipeline runs");
        assert_eq!(run.errors, []);

        let output = run.output.expect("valid");
        let stamps = output.stamps(OUTPUT_KIND);
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].name, "test-pip");
        assert_eq!(stamps[0].kind, PROVIDER_PATH);
        assert_eq!(stamps[0].properties["publicIPAllocationMethod"], "Dynamic");
        assert_eq!(stamps[0].properties["publicIPAddressVersion"], "IPv4");
        assert_eq!(stamps[0].properties.get("dnsSettings"), None);
    }

    #[test]
    fn domain_name_label_lands_in_dns_settings() {
        let run = process(
            &PublicIpBlock,
            &json!({ "name": "test-pip", "domainNameLabel": "test-vm1" }),
            &context(),
        )
        .expect("pipeline runs");
        let output = run.output.expect("valid");
        assert_eq!(
            output.stamps(OUTPUT_KIND)[0].properties["dnsSettings"]["domainNameLabel"],
            "test-vm1"
        );
    }

    #[test]
    fn missing_name_is_reported_not_thrown() {
        let run = process(&PublicIpBlock, &json!({}), &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".name");
        assert!(run.output.is_none());
    }

    #[test]
    fn unknown_allocation_method_is_rejected() {
        let run = process(
            &PublicIpBlock,
            &json!({ "name": "p", "publicIPAllocationMethod": "Floating" }),
            &context(),
        )
        .expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".publicIPAllocationMethod");
    }
}
