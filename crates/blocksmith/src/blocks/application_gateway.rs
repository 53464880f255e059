//! Application gateway building block.
//!
//! A gateway is a single stamp with a deeply nested property bag: listeners,
//! routing rules, backend pools and probes all live inside it and name each
//! other. Validation guarantees every such name references a declared
//! sibling entry; the transform then resolves each name into a canonical
//! subresource reference. A Public front end implies an entire public IP
//! address resource, synthesized through that kind's own pipeline.

use serde_json::{Value, json};
use strum::VariantNames;

use super::{
    BuildingBlock, Error, TransformOutput, array_field, process_synthesized,
    public_ip::{self, PublicIpBlock},
    str_field,
};
use crate::{
    context::BuildingBlockContext,
    merge::{self, Customizers, merge_each},
    rules::{RuleSet, Verdict, check},
};

pub const PROVIDER_PATH: &str = "Microsoft.Network/applicationGateways";
const VNET_PROVIDER_PATH: &str = "Microsoft.Network/virtualNetworks";

/// Front-end discriminant: a Public front end implies a synthesized public
/// IP address, an Internal one binds to a subnet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, VariantNames)]
pub enum FrontendType {
    Public,
    Internal,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ApplicationGatewayBlock;

impl BuildingBlock for ApplicationGatewayBlock {
    const KIND: &'static str = "applicationGateway";

    fn defaults(&self, _settings: &Value) -> Result<Value, merge::Error> {
        Ok(json!({
            "sku": {
                "name": "Standard_Small",
                "tier": "Standard",
                "capacity": 2,
            },
            // Empty object, not absent: the nested rules must fire and
            // report the missing name instead of skipping the subtree.
            "virtualNetwork": {},
            "gatewayIPConfigurations": [{ "name": "appGatewayIpConfig", "subnetName": "default" }],
            "frontendIPConfigurations": [],
            "frontendPorts": [],
            "backendAddressPools": [],
            "backendHttpSettingsCollection": [],
            "httpListeners": [],
            "requestRoutingRules": [],
            "probes": [],
        }))
    }

    fn customizers(&self) -> Customizers {
        // Per-element defaults for every named collection; the array-level
        // replace-wholesale decision stays with the caller.
        Customizers::new()
            .with("backendHttpSettingsCollection", element_customizer(json!({
                "port": 80,
                "protocol": "Http",
                "cookieBasedAffinity": "Disabled",
            })))
            .with("httpListeners", element_customizer(json!({
                "protocol": "Http",
            })))
            .with("requestRoutingRules", element_customizer(json!({
                "ruleType": "Basic",
            })))
            .with("probes", element_customizer(json!({
                "protocol": "Http",
                "path": "/",
                "interval": 30,
                "timeout": 30,
                "unhealthyThreshold": 3,
            })))
            .with("frontendIPConfigurations", element_customizer(json!({
                "applicationGatewayType": "Internal",
            })))
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .leaf("name", check::valid_name)
            .nested(
                "sku",
                RuleSet::new()
                    .leaf("name", check::non_empty_string)
                    .leaf(
                        "tier",
                        check::one_of(&["Standard", "WAF", "Standard_v2", "WAF_v2"]),
                    )
                    .leaf("capacity", check::positive_integer),
            )
            .nested(
                "virtualNetwork",
                RuleSet::new().leaf("name", check::valid_name),
            )
            .each(
                "gatewayIPConfigurations",
                RuleSet::new()
                    .leaf("name", check::valid_name)
                    .leaf("subnetName", check::valid_name),
            )
            .leaf("frontendIPConfigurations", frontend_cardinality)
            .each("frontendIPConfigurations", frontend_rules())
            .each(
                "frontendPorts",
                RuleSet::new()
                    .leaf("name", check::valid_name)
                    .leaf("port", check::valid_port),
            )
            .each(
                "backendAddressPools",
                RuleSet::new().leaf("name", check::valid_name),
            )
            .each(
                "backendHttpSettingsCollection",
                RuleSet::new()
                    .leaf("name", check::valid_name)
                    .leaf("port", check::valid_port)
                    .leaf("protocol", check::one_of(&["Http", "Https"]))
                    .leaf("cookieBasedAffinity", check::one_of(&["Enabled", "Disabled"])),
            )
            .each(
                "probes",
                RuleSet::new()
                    .leaf("name", check::valid_name)
                    .leaf("protocol", check::one_of(&["Http", "Https"]))
                    .leaf("path", check::non_empty_string)
                    .leaf("interval", check::positive_integer)
                    .leaf("timeout", check::positive_integer)
                    .leaf("unhealthyThreshold", check::positive_integer),
            )
            // Cross-reference rules need the declared names of sibling
            // collections, so they are resolved at evaluation time.
            .dynamic_self(cross_reference_rules)
    }

    fn transform(
        &self,
        merged: &Value,
        context: &BuildingBlockContext,
    ) -> Result<TransformOutput, Error> {
        let gateway_name = str_field(merged, "/name")?;
        let vnet_name = str_field(merged, "/virtualNetwork/name")?;
        let subresource = |kind: &str, name: &str| {
            context
                .reference(PROVIDER_PATH, [gateway_name, kind, name])
                .to_property()
        };

        let mut output = TransformOutput::default();

        let mut gateway_ip_configurations = Vec::new();
        for entry in array_field(merged, "/gatewayIPConfigurations")? {
            let subnet = context.reference(
                VNET_PROVIDER_PATH,
                [vnet_name, "subnets", str_field(entry, "/subnetName")?],
            );
            gateway_ip_configurations.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": { "subnet": subnet.to_property() },
            }));
        }

        let mut frontend_ip_configurations = Vec::new();
        for entry in array_field(merged, "/frontendIPConfigurations")? {
            let name = str_field(entry, "/name")?;
            let properties = match str_field(entry, "/applicationGatewayType")? {
                "Public" => {
                    // The Public variant implies an entire public IP address
                    // resource, produced by that kind's own pipeline.
                    let pip_name = format!("{gateway_name}-{name}-pip");
                    let pip_settings = json!({ "name": pip_name.as_str() });
                    let pip_output =
                        process_synthesized(&PublicIpBlock, &pip_settings, context)?;
                    output.splice(
                        pip_output,
                        public_ip::OUTPUT_KIND,
                        public_ip::OUTPUT_KIND,
                    );
                    json!({
                        "publicIPAddress": context
                            .reference(public_ip::PROVIDER_PATH, [pip_name.as_str()])
                            .to_property(),
                    })
                }
                _ => {
                    let subnet_name = entry
                        .pointer("/internalApplicationGatewaySettings/subnetName")
                        .and_then(Value::as_str)
                        .unwrap_or("default");
                    json!({
                        "subnet": context
                            .reference(VNET_PROVIDER_PATH, [vnet_name, "subnets", subnet_name])
                            .to_property(),
                        "privateIPAllocationMethod": "Dynamic",
                    })
                }
            };
            frontend_ip_configurations.push(json!({ "name": name, "properties": properties }));
        }

        let mut frontend_ports = Vec::new();
        for entry in array_field(merged, "/frontendPorts")? {
            frontend_ports.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": { "port": entry["port"].clone() },
            }));
        }

        let mut backend_address_pools = Vec::new();
        for entry in array_field(merged, "/backendAddressPools")? {
            backend_address_pools.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": {
                    "backendAddresses": entry.get("backendAddresses").cloned().unwrap_or_else(|| json!([])),
                },
            }));
        }

        let mut backend_http_settings = Vec::new();
        for entry in array_field(merged, "/backendHttpSettingsCollection")? {
            let mut properties = json!({
                "port": entry["port"].clone(),
                "protocol": str_field(entry, "/protocol")?,
                "cookieBasedAffinity": str_field(entry, "/cookieBasedAffinity")?,
            });
            if let Some(probe) = entry.get("probeName").and_then(Value::as_str) {
                properties["probe"] = subresource("probes", probe);
            }
            backend_http_settings.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": properties,
            }));
        }

        let mut http_listeners = Vec::new();
        for entry in array_field(merged, "/httpListeners")? {
            http_listeners.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": {
                    "frontendIPConfiguration": subresource(
                        "frontendIPConfigurations",
                        str_field(entry, "/frontendIPConfigurationName")?,
                    ),
                    "frontendPort": subresource(
                        "frontendPorts",
                        str_field(entry, "/frontendPortName")?,
                    ),
                    "protocol": str_field(entry, "/protocol")?,
                },
            }));
        }

        let mut request_routing_rules = Vec::new();
        for entry in array_field(merged, "/requestRoutingRules")? {
            request_routing_rules.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": {
                    "ruleType": str_field(entry, "/ruleType")?,
                    "httpListener": subresource(
                        "httpListeners",
                        str_field(entry, "/httpListenerName")?,
                    ),
                    "backendAddressPool": subresource(
                        "backendAddressPools",
                        str_field(entry, "/backendAddressPoolName")?,
                    ),
                    "backendHttpSettings": subresource(
                        "backendHttpSettingsCollection",
                        str_field(entry, "/backendHttpSettingsName")?,
                    ),
                },
            }));
        }

        let mut probes = Vec::new();
        for entry in array_field(merged, "/probes")? {
            probes.push(json!({
                "name": str_field(entry, "/name")?,
                "properties": {
                    "protocol": str_field(entry, "/protocol")?,
                    "path": str_field(entry, "/path")?,
                    "interval": entry["interval"].clone(),
                    "timeout": entry["timeout"].clone(),
                    "unhealthyThreshold": entry["unhealthyThreshold"].clone(),
                },
            }));
        }

        let properties = json!({
            "sku": merged["sku"].clone(),
            "gatewayIPConfigurations": gateway_ip_configurations,
            "frontendIPConfigurations": frontend_ip_configurations,
            "frontendPorts": frontend_ports,
            "backendAddressPools": backend_address_pools,
            "backendHttpSettingsCollection": backend_http_settings,
            "httpListeners": http_listeners,
            "requestRoutingRules": request_routing_rules,
            "probes": probes,
        });
        output.push(
            "applicationGateway",
            context.stamp(PROVIDER_PATH, gateway_name, properties),
        );
        Ok(output)
    }
}

// Non-array caller values pass through `merge_each` unchanged so the
// array-shape rules report them at the field's own path.
fn element_customizer(template: Value) -> impl Fn(&Value, &Value, &str) -> Option<Value> {
    move |default, caller, _field| {
        let base = match caller {
            Value::Null => default,
            Value::Array(elements) if elements.is_empty() => default,
            _ => caller,
        };
        Some(merge_each(base, &template, &Customizers::new()))
    }
}

fn frontend_rules() -> RuleSet {
    RuleSet::new()
        .leaf("name", check::valid_name)
        .leaf("applicationGatewayType", check::one_of(FrontendType::VARIANTS))
        .dynamic_self(|frontend, _parent| {
            if frontend["applicationGatewayType"] == json!("Internal") {
                RuleSet::new().nested(
                    "internalApplicationGatewaySettings",
                    RuleSet::new().leaf("subnetName", check::valid_name),
                )
            } else {
                RuleSet::new()
            }
        })
}

/// At most one Public front end; reported once, at the array path.
fn frontend_cardinality(value: &Value, _parent: &Value) -> Verdict {
    let Some(frontends) = value.as_array() else {
        return Verdict::Fail("must be an array of front-end configurations".to_owned());
    };
    if frontends.is_empty() {
        return Verdict::Fail("at least one front-end configuration must be declared".to_owned());
    }
    let public_count = frontends
        .iter()
        .filter(|frontend| frontend["applicationGatewayType"] == json!("Public"))
        .count();
    Verdict::require(
        public_count <= 1,
        "at most one front-end configuration may be Public",
    )
}

fn cross_reference_rules(root: &Value, _parent: &Value) -> RuleSet {
    let frontends = check::declared_names(root, "frontendIPConfigurations");
    let ports = check::declared_names(root, "frontendPorts");
    let listeners = check::declared_names(root, "httpListeners");
    let pools = check::declared_names(root, "backendAddressPools");
    let settings = check::declared_names(root, "backendHttpSettingsCollection");
    let probes = check::declared_names(root, "probes");

    RuleSet::new()
        .each(
            "httpListeners",
            RuleSet::new()
                .leaf("name", check::valid_name)
                .leaf(
                    "frontendIPConfigurationName",
                    check::member_of(frontends, "frontendIPConfigurations"),
                )
                .leaf("frontendPortName", check::member_of(ports, "frontendPorts"))
                .leaf("protocol", check::one_of(&["Http", "Https"])),
        )
        .each(
            "requestRoutingRules",
            RuleSet::new()
                .leaf("name", check::valid_name)
                .leaf("ruleType", check::one_of(&["Basic", "PathBasedRouting"]))
                .leaf(
                    "httpListenerName",
                    check::member_of(listeners, "httpListeners"),
                )
                .leaf(
                    "backendAddressPoolName",
                    check::member_of(pools, "backendAddressPools"),
                )
                .leaf(
                    "backendHttpSettingsName",
                    check::member_of(settings, "backendHttpSettingsCollection"),
                ),
        )
        .each(
            "backendHttpSettingsCollection",
            RuleSet::new().leaf(
                "probeName",
                check::optional(check::member_of(probes, "probes")),
            ),
        )
}
