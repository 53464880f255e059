//! Virtual machine building block.
//!
//! Expands `vmCount` into concrete VM stamps (1-based naming:
//! `{namePrefix}-vm{index}`), synthesizes per-VM NICs, public IPs, disks and
//! the availability set, and assigns pooled storage accounts round-robin
//! across VM instances.

use std::str::FromStr;

use serde_json::{Value, json};
use strum::VariantNames;

use super::{
    BuildingBlock, Error, TransformOutput, array_field, bool_field, process_synthesized,
    public_ip::{self, IpAllocationMethod, PublicIpBlock},
    str_field, string_list, u64_field,
};
use crate::{
    context::BuildingBlockContext,
    merge::{self, Customizers, MissingDiscriminantSnafu, UnknownDiscriminantSnafu, merge_each},
    pool::Pool,
    rules::{RuleSet, Verdict, check},
    stamp::REDACTED_SECRET,
};

pub const PROVIDER_PATH: &str = "Microsoft.Compute/virtualMachines";
const NIC_PROVIDER_PATH: &str = "Microsoft.Network/networkInterfaces";
const AVSET_PROVIDER_PATH: &str = "Microsoft.Compute/availabilitySets";
const STORAGE_PROVIDER_PATH: &str = "Microsoft.Storage/storageAccounts";
const VNET_PROVIDER_PATH: &str = "Microsoft.Network/virtualNetworks";

/// OS-type discriminant. Selects the default sub-template (image reference,
/// OS configuration shape) before the merge, and the osProfile variant during
/// the transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum OsType {
    Windows,
    Linux,
}

/// Authentication-type discriminant: exactly one of the password-based or
/// key-based profile shapes is emitted per instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum AuthenticationType {
    Password,
    Ssh,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VirtualMachineBlock;

/// Reads the OS-type discriminant off the *raw* settings. The shape of the
/// default template depends on it, so this must fail fatally before merge,
/// not be collected during validation.
fn os_type(settings: &Value) -> Result<OsType, merge::Error> {
    let value = settings
        .pointer("/osDisk/osType")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            MissingDiscriminantSnafu {
                field: "osDisk.osType",
            }
            .build()
        })?;
    OsType::from_str(value).map_err(|_| {
        UnknownDiscriminantSnafu {
            field: "osDisk.osType",
            value,
            expected: OsType::VARIANTS,
        }
        .build()
    })
}

fn nic_element_template() -> Value {
    json!({
        "isPublic": false,
        "subnetName": "default",
        "privateIPAllocationMethod": "Dynamic",
        "publicIPAllocationMethod": "Dynamic",
    })
}

impl BuildingBlock for VirtualMachineBlock {
    const KIND: &'static str = "virtualMachine";

    fn defaults(&self, settings: &Value) -> Result<Value, merge::Error> {
        let os_type = os_type(settings)?;
        let image_reference = match os_type {
            OsType::Windows => json!({
                "publisher": "MicrosoftWindowsServer",
                "offer": "WindowsServer",
                "sku": "2022-datacenter",
                "version": "latest",
            }),
            OsType::Linux => json!({
                "publisher": "Canonical",
                "offer": "0001-com-ubuntu-server-jammy",
                "sku": "22_04-lts",
                "version": "latest",
            }),
        };

        Ok(json!({
            "vmCount": 1,
            "size": "Standard_DS2_v2",
            "osAuthenticationType": "password",
            "osDisk": {
                "osType": os_type.to_string(),
                "caching": "ReadWrite",
                "createOption": "fromImage",
            },
            "imageReference": image_reference,
            "dataDisks": {
                "count": 0,
                "properties": {
                    "sizeGB": 127,
                    "caching": "None",
                    "createOption": "empty",
                },
            },
            "nics": [{}],
            "storageAccounts": {
                "count": 1,
                "nameSuffix": "st",
                "skuType": "Premium_LRS",
                "accounts": [],
            },
            "diagnosticStorageAccounts": {
                "count": 1,
                "nameSuffix": "diag",
                "skuType": "Standard_LRS",
                "accounts": [],
            },
            "availabilitySet": {
                "useExistingAvailabilitySet": false,
            },
            // Empty object, not absent: the nested rules must fire and
            // report the missing name instead of skipping the subtree.
            "virtualNetwork": {},
        }))
    }

    fn customizers(&self) -> Customizers {
        // The default NIC array is a singleton; any non-empty caller array
        // discards it wholesale, but each surviving element still picks up
        // the per-NIC defaults. Non-array caller values pass through so the
        // array-shape rule reports them at `.nics`.
        Customizers::new().with("nics", |default, caller, _field| {
            let base = match caller {
                Value::Null => default,
                Value::Array(elements) if elements.is_empty() => default,
                _ => caller,
            };
            Some(merge_each(base, &nic_element_template(), &Customizers::new()))
        })
    }

    fn rules(&self) -> RuleSet {
        RuleSet::new()
            .leaf("namePrefix", check::valid_name)
            .leaf("vmCount", check::positive_integer)
            .leaf("size", check::non_empty_string)
            .leaf("adminUsername", check::non_empty_string)
            .leaf("computerNamePrefix", check::optional(check::valid_name))
            .leaf(
                "osAuthenticationType",
                check::one_of(AuthenticationType::VARIANTS),
            )
            .dynamic_self(authentication_rules)
            .dynamic("osDisk", os_disk_rules)
            .nested(
                "imageReference",
                RuleSet::new()
                    .leaf("publisher", check::non_empty_string)
                    .leaf("offer", check::non_empty_string)
                    .leaf("sku", check::non_empty_string)
                    .leaf("version", check::non_empty_string),
            )
            .nested(
                "dataDisks",
                RuleSet::new().leaf("count", check::non_negative_integer).nested(
                    "properties",
                    RuleSet::new()
                        .leaf("sizeGB", check::positive_integer)
                        .leaf("caching", check::one_of(&["None", "ReadOnly", "ReadWrite"]))
                        .leaf("createOption", check::one_of(&["empty", "attach"])),
                ),
            )
            .leaf("nics", nic_cardinality)
            .each("nics", nic_rules())
            .nested("storageAccounts", storage_account_rules())
            .nested("diagnosticStorageAccounts", storage_account_rules())
            .nested(
                "availabilitySet",
                RuleSet::new()
                    .leaf("useExistingAvailabilitySet", check::boolean)
                    .dynamic_self(|avset, _parent| {
                        if avset["useExistingAvailabilitySet"] == json!(true) {
                            // An existing set can only be found by name.
                            RuleSet::new().leaf("name", check::valid_name)
                        } else {
                            RuleSet::new().leaf("name", check::optional(check::valid_name))
                        }
                    }),
            )
            .nested(
                "virtualNetwork",
                RuleSet::new().leaf("name", check::valid_name),
            )
    }

    fn transform(
        &self,
        merged: &Value,
        context: &BuildingBlockContext,
    ) -> Result<TransformOutput, Error> {
        let name_prefix = str_field(merged, "/namePrefix")?;
        let vm_count = count_field(merged, "/vmCount")?;
        let size = str_field(merged, "/size")?;
        let admin_username = str_field(merged, "/adminUsername")?;
        let computer_name_prefix = merged
            .pointer("/computerNamePrefix")
            .and_then(Value::as_str)
            .unwrap_or(name_prefix);
        let os = parse_discriminant::<OsType>(merged, "/osDisk/osType")?;
        let auth = parse_discriminant::<AuthenticationType>(merged, "/osAuthenticationType")?;
        let vnet_name = str_field(merged, "/virtualNetwork/name")?;

        let secret = match auth {
            AuthenticationType::Password => str_field(merged, "/adminPassword")?,
            AuthenticationType::Ssh => str_field(merged, "/sshPublicKey")?,
        };

        let storage_pool = account_pool(merged, "storageAccounts", name_prefix, context)?;
        let diagnostic_pool =
            account_pool(merged, "diagnosticStorageAccounts", name_prefix, context)?;

        let (availability_set_name, availability_set_stamp) =
            availability_set(merged, name_prefix, context)?;

        let mut output = TransformOutput::default();
        let nics = array_field(merged, "/nics")?;
        let explicit_primary = nics.iter().any(|nic| nic["isPrimary"] == json!(true));

        for vm_index in 1..=vm_count {
            let vm_name = format!("{name_prefix}-vm{vm_index}");
            let computer_name = format!("{computer_name_prefix}-vm{vm_index}");

            // All of this VM's disks share one pool slot; the disk index
            // never participates in the assignment.
            let storage_account = assign_name(&storage_pool, vm_index - 1, "storageAccounts")?;
            let diagnostic_account =
                assign_name(&diagnostic_pool, vm_index - 1, "diagnosticStorageAccounts")?;

            let mut network_interfaces = Vec::with_capacity(nics.len());
            for (nic_position, nic) in nics.iter().enumerate() {
                let nic_index = nic_position + 1;
                let nic_name = format!("{vm_name}-nic{nic_index}");
                let primary = if explicit_primary {
                    nic["isPrimary"] == json!(true)
                } else {
                    nic_position == 0
                };

                let subnet_reference = context.reference(
                    VNET_PROVIDER_PATH,
                    [vnet_name, "subnets", str_field(nic, "/subnetName")?],
                );
                let mut ip_configuration = json!({
                    "subnet": subnet_reference.to_property(),
                    "privateIPAllocationMethod": str_field(nic, "/privateIPAllocationMethod")?,
                });

                // Only externally reachable NICs get a companion public IP.
                if bool_field(nic, "/isPublic")? {
                    let pip_name = format!("{vm_name}-pip{nic_index}");
                    let mut pip_settings = json!({
                        "name": pip_name.as_str(),
                        "publicIPAllocationMethod": str_field(nic, "/publicIPAllocationMethod")?,
                    });
                    if let Some(label_prefix) =
                        nic.get("domainNameLabelPrefix").and_then(Value::as_str)
                    {
                        pip_settings["domainNameLabel"] =
                            json!(format!("{label_prefix}-vm{vm_index}"));
                    }

                    let pip_output =
                        process_synthesized(&PublicIpBlock, &pip_settings, context)?;
                    output.splice(pip_output, public_ip::OUTPUT_KIND, "pips");
                    ip_configuration["publicIPAddress"] = context
                        .reference(public_ip::PROVIDER_PATH, [pip_name.as_str()])
                        .to_property();
                }

                output.push(
                    "nics",
                    context.stamp(
                        NIC_PROVIDER_PATH,
                        &nic_name,
                        json!({
                            "ipConfigurations": [{
                                "name": "ipconfig1",
                                "properties": ip_configuration,
                            }],
                            "primary": primary,
                        }),
                    ),
                );

                let mut interface = context
                    .reference(NIC_PROVIDER_PATH, [nic_name.as_str()])
                    .to_property();
                interface["properties"] = json!({ "primary": primary });
                network_interfaces.push(interface);
            }

            let properties = json!({
                "hardwareProfile": { "vmSize": size },
                "osProfile": os_profile(&computer_name, admin_username, os, auth)?,
                "storageProfile": storage_profile(merged, &vm_name, &storage_account)?,
                "networkProfile": { "networkInterfaces": network_interfaces },
                "diagnosticsProfile": {
                    "bootDiagnostics": {
                        "enabled": true,
                        "storageUri": format!("http://{diagnostic_account}.blob.core.windows.net"),
                    },
                },
                "availabilitySet": context
                    .reference(AVSET_PROVIDER_PATH, [availability_set_name.as_str()])
                    .to_property(),
            });
            output.push("virtualMachines", context.stamp(PROVIDER_PATH, vm_name, properties));
        }

        output.extend("storageAccounts", storage_pool.new_stamps().cloned());
        output.extend(
            "diagnosticStorageAccounts",
            diagnostic_pool.new_stamps().cloned(),
        );
        if let Some(stamp) = availability_set_stamp {
            output.push("availabilitySet", stamp);
        }
        output.secret = Some(secret.to_owned());
        Ok(output)
    }
}

/// Password auth requires `adminPassword`, key auth requires `sshPublicKey`;
/// Windows instances only support password auth. Resolved dynamically off the
/// sibling discriminants.
fn authentication_rules(root: &Value, _parent: &Value) -> RuleSet {
    match root["osAuthenticationType"].as_str() {
        Some("password") => RuleSet::new().leaf("adminPassword", check::non_empty_string),
        Some("ssh") => {
            let rules = RuleSet::new().leaf("sshPublicKey", check::non_empty_string);
            if root.pointer("/osDisk/osType") == Some(&json!("windows")) {
                rules.leaf("osAuthenticationType", |_, _| {
                    Verdict::Fail("ssh authentication is not supported on windows".to_owned())
                })
            } else {
                rules
            }
        }
        // The one_of leaf on osAuthenticationType reports anything else.
        _ => RuleSet::new(),
    }
}

fn os_disk_rules(os_disk: &Value, _parent: &Value) -> RuleSet {
    let rules = RuleSet::new()
        .leaf("osType", check::one_of(OsType::VARIANTS))
        .leaf("caching", check::one_of(&["None", "ReadOnly", "ReadWrite"]))
        .leaf("createOption", check::one_of(&["fromImage", "attach"]));
    if os_disk["createOption"] == json!("attach") {
        // Attaching boots from an existing image blob instead of a platform
        // image.
        rules.leaf("image", check::non_empty_string)
    } else {
        rules
    }
}

fn nic_rules() -> RuleSet {
    RuleSet::new()
        .leaf("subnetName", check::valid_name)
        .leaf("isPublic", check::boolean)
        .leaf("isPrimary", check::optional(check::boolean))
        .leaf(
            "privateIPAllocationMethod",
            check::one_of(IpAllocationMethod::VARIANTS),
        )
        .leaf(
            "publicIPAllocationMethod",
            check::one_of(IpAllocationMethod::VARIANTS),
        )
        .leaf("domainNameLabelPrefix", check::optional(check::valid_name))
}

fn nic_cardinality(value: &Value, _parent: &Value) -> Verdict {
    let Some(nics) = value.as_array() else {
        return Verdict::Fail("must be an array of NIC settings".to_owned());
    };
    if nics.is_empty() {
        return Verdict::Fail("at least one NIC must be declared".to_owned());
    }
    let primary_count = nics
        .iter()
        .filter(|nic| nic["isPrimary"] == json!(true))
        .count();
    Verdict::require(
        primary_count <= 1,
        "at most one NIC may be flagged isPrimary",
    )
}

fn storage_account_rules() -> RuleSet {
    RuleSet::new()
        .leaf("count", check::positive_integer)
        .leaf("nameSuffix", check::non_empty_string)
        .leaf(
            "skuType",
            check::one_of(&["Standard_LRS", "Standard_GRS", "Premium_LRS"]),
        )
        .leaf("accounts", |value, parent| {
            let existing =
                u64::try_from(value.as_array().map_or(0, Vec::len)).unwrap_or(u64::MAX);
            let count = parent["count"].as_u64().unwrap_or(0);
            Verdict::require(
                existing <= count,
                "cannot supply more existing accounts than the pool size (count)",
            )
        })
}

fn parse_discriminant<T: FromStr>(merged: &Value, path: &str) -> Result<T, Error> {
    T::from_str(str_field(merged, path)?).map_err(|_| Error::InvariantViolated {
        detail: format!("unrecognized discriminant at {path}"),
    })
}

fn count_field(merged: &Value, path: &str) -> Result<usize, Error> {
    usize::try_from(u64_field(merged, path)?).map_err(|_| Error::InvariantViolated {
        detail: format!("count at {path} exceeds the addressable range"),
    })
}

fn assign_name(pool: &Pool, instance: usize, field: &str) -> Result<String, Error> {
    pool.assign(instance)
        .map(|entry| entry.name().to_owned())
        .ok_or_else(|| Error::InvariantViolated {
            detail: format!("{field} pool is empty"),
        })
}

/// Builds the storage-account pool for `field`: caller-supplied existing
/// account names first, synthesized accounts
/// (`{sanitizedPrefix}{suffix}{index}`, 1-based) after.
fn account_pool(
    merged: &Value,
    field: &str,
    name_prefix: &str,
    context: &BuildingBlockContext,
) -> Result<Pool, Error> {
    let count = count_field(merged, &format!("/{field}/count"))?;
    let existing = string_list(merged, &format!("/{field}/accounts"))?;
    let suffix = str_field(merged, &format!("/{field}/nameSuffix"))?;
    let sku = str_field(merged, &format!("/{field}/skuType"))?;

    // Storage account names allow lowercase alphanumerics only.
    let seed: String = name_prefix
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .flat_map(char::to_lowercase)
        .collect();

    Ok(Pool::build(count, &existing, |index| {
        context.stamp(
            STORAGE_PROVIDER_PATH,
            format!("{seed}{suffix}{}", index + 1),
            json!({
                "sku": { "name": sku },
                "kind": "StorageV2",
                "supportsHttpsTrafficOnly": true,
            }),
        )
    }))
}

fn availability_set(
    merged: &Value,
    name_prefix: &str,
    context: &BuildingBlockContext,
) -> Result<(String, Option<crate::stamp::ResourceStamp>), Error> {
    let use_existing = bool_field(merged, "/availabilitySet/useExistingAvailabilitySet")?;
    let name = merged
        .pointer("/availabilitySet/name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map_or_else(|| format!("{name_prefix}-as"), str::to_owned);

    if use_existing {
        return Ok((name, None));
    }
    let stamp = context.stamp(
        AVSET_PROVIDER_PATH,
        &name,
        json!({
            "platformFaultDomainCount": 3,
            "platformUpdateDomainCount": 5,
        }),
    );
    Ok((name, Some(stamp)))
}

fn os_profile(
    computer_name: &str,
    admin_username: &str,
    os: OsType,
    auth: AuthenticationType,
) -> Result<Value, Error> {
    let mut profile = json!({
        "computerName": computer_name,
        "adminUsername": admin_username,
    });
    // Exactly one authentication shape is emitted; the unused alternative is
    // omitted entirely, never set to null.
    match (os, auth) {
        (OsType::Windows, AuthenticationType::Password) => {
            profile["adminPassword"] = json!(REDACTED_SECRET);
            profile["windowsConfiguration"] = json!({ "provisionVMAgent": true });
        }
        (OsType::Linux, AuthenticationType::Password) => {
            profile["adminPassword"] = json!(REDACTED_SECRET);
            profile["linuxConfiguration"] = json!({ "disablePasswordAuthentication": false });
        }
        (OsType::Linux, AuthenticationType::Ssh) => {
            profile["linuxConfiguration"] = json!({
                "disablePasswordAuthentication": true,
                "ssh": {
                    "publicKeys": [{
                        "path": format!("/home/{admin_username}/.ssh/authorized_keys"),
                        "keyData": REDACTED_SECRET,
                    }],
                },
            });
        }
        (OsType::Windows, AuthenticationType::Ssh) => {
            // Rejected by validation; reaching this is a caller bug.
            return Err(Error::InvariantViolated {
                detail: "ssh authentication combined with a windows OS disk".to_owned(),
            });
        }
    }
    Ok(profile)
}

fn storage_profile(merged: &Value, vm_name: &str, storage_account: &str) -> Result<Value, Error> {
    let vhd_base = format!("http://{storage_account}.blob.core.windows.net/vhds");
    let caching = str_field(merged, "/osDisk/caching")?;
    let create_option = str_field(merged, "/osDisk/createOption")?;

    let mut os_disk = json!({
        "name": format!("{vm_name}-os"),
        "caching": caching,
        "createOption": create_option,
        "vhd": { "uri": format!("{vhd_base}/{vm_name}-os.vhd") },
    });

    let mut profile = json!({});
    if create_option == "attach" {
        os_disk["image"] = json!({ "uri": str_field(merged, "/osDisk/image")? });
    } else {
        profile["imageReference"] = merged
            .pointer("/imageReference")
            .cloned()
            .unwrap_or_else(|| json!({}));
    }
    profile["osDisk"] = os_disk;

    let data_disk_count = count_field(merged, "/dataDisks/count")?;
    let mut data_disks = Vec::with_capacity(data_disk_count);
    for disk_index in 1..=data_disk_count {
        data_disks.push(json!({
            "name": format!("{vm_name}-dataDisk{disk_index}"),
            "lun": disk_index - 1,
            "diskSizeGB": u64_field(merged, "/dataDisks/properties/sizeGB")?,
            "caching": str_field(merged, "/dataDisks/properties/caching")?,
            "createOption": str_field(merged, "/dataDisks/properties/createOption")?,
            "vhd": { "uri": format!("{vhd_base}/{vm_name}-dataDisk{disk_index}.vhd") },
        }));
    }
    profile["dataDisks"] = json!(data_disks);
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::blocks::process;

    fn context() -> BuildingBlockContext {
        BuildingBlockContext {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_owned(),
            resource_group_name: "test-rg".to_owned(),
            location: "westus".to_owned(),
        }
    }

    /// Minimal settings that pass validation for a windows VM.
    fn windows_settings() -> Value {
        json!({
            "namePrefix": "test",
            "adminUsername": "ops",
            "adminPassword": "s3cret!pass",
            "osDisk": { "osType": "windows" },
            "virtualNetwork": { "name": "test-vnet" },
        })
    }

    fn linux_ssh_settings() -> Value {
        json!({
            "namePrefix": "test",
            "adminUsername": "ops",
            "osAuthenticationType": "ssh",
            "sshPublicKey": "ssh-rsa AAAAB3NzaC1yc2E= ops@host",
            "osDisk": { "osType": "linux" },
            "virtualNetwork": { "name": "test-vnet" },
        })
    }

    fn transform(settings: Value) -> TransformOutput {
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors, [], "settings should be valid");
        run.output.expect("valid settings produce output")
    }

    #[test]
    fn fully_defaulted_document_yields_no_errors() {
        let run = process(&VirtualMachineBlock, &windows_settings(), &context())
            .expect("pipeline runs");
        assert_eq!(run.errors, []);
    }

    #[test]
    fn missing_os_type_discriminant_is_fatal() {
        let error = process(
            &VirtualMachineBlock,
            &json!({ "namePrefix": "test" }),
            &context(),
        )
        .expect_err("missing discriminant aborts the pipeline");
        assert!(matches!(
            error,
            Error::Defaults {
                source: merge::Error::MissingDiscriminant { .. }
            }
        ));
    }

    #[test]
    fn empty_name_prefix_yields_one_error_at_its_path() {
        let mut settings = windows_settings();
        settings["namePrefix"] = json!("");
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".namePrefix");
        assert!(run.output.is_none());
    }

    #[test]
    fn omitted_virtual_network_is_reported_not_fatal() {
        let mut settings = windows_settings();
        settings
            .as_object_mut()
            .expect("settings are an object")
            .remove("virtualNetwork");
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".virtualNetwork.name");
        assert!(run.output.is_none());
    }

    #[test]
    fn non_array_nics_value_is_reported_at_its_path() {
        let mut settings = windows_settings();
        settings["nics"] = json!("three");
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        // The caller's value survives the merge; validation reports it.
        assert_eq!(run.merged["nics"], json!("three"));
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".nics");
        assert!(run.output.is_none());
    }

    #[test]
    fn vm_instances_are_named_one_based() {
        let mut settings = windows_settings();
        settings["vmCount"] = json!(2);
        let output = transform(settings);

        let vms = output.stamps("virtualMachines");
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].name, "test-vm1");
        assert_eq!(vms[1].name, "test-vm2");
        for vm in vms {
            assert_eq!(
                vm.properties["osProfile"]["computerName"],
                json!(vm.name),
                "computerName must equal the VM's own name"
            );
        }
    }

    #[test]
    fn storage_accounts_are_assigned_round_robin() {
        let mut settings = windows_settings();
        settings["vmCount"] = json!(4);
        settings["storageAccounts"] = json!({ "count": 2, "accounts": ["existing1"] });
        let output = transform(settings);

        // Pool of 2: [existing1, synthesized]; only the synthesized account
        // is emitted as a stamp.
        let accounts = output.stamps("storageAccounts");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "testst1");

        let os_disk_uri = |vm: usize| {
            output.stamps("virtualMachines")[vm].properties["storageProfile"]["osDisk"]["vhd"]
                ["uri"]
                .as_str()
                .expect("vhd uri is a string")
                .to_owned()
        };
        assert!(os_disk_uri(0).starts_with("http://existing1."));
        assert!(os_disk_uri(1).starts_with("http://testst1."));
        assert!(os_disk_uri(2).starts_with("http://existing1."));
        assert!(os_disk_uri(3).starts_with("http://testst1."));
    }

    #[test]
    fn all_disks_of_one_vm_share_its_pool_slot() {
        let mut settings = windows_settings();
        settings["vmCount"] = json!(2);
        settings["storageAccounts"] = json!({ "count": 2 });
        settings["dataDisks"] = json!({ "count": 2 });
        let output = transform(settings);

        let vm2 = &output.stamps("virtualMachines")[1];
        let os_uri = vm2.properties["storageProfile"]["osDisk"]["vhd"]["uri"]
            .as_str()
            .expect("vhd uri");
        let account = os_uri
            .strip_prefix("http://")
            .and_then(|rest| rest.split('.').next())
            .expect("account host");
        for data_disk in vm2.properties["storageProfile"]["dataDisks"]
            .as_array()
            .expect("data disks")
        {
            let uri = data_disk["vhd"]["uri"].as_str().expect("vhd uri");
            assert!(
                uri.starts_with(&format!("http://{account}.")),
                "data disk must use the same pool slot as the OS disk"
            );
        }
    }

    #[test]
    fn secret_appears_only_on_the_side_channel() {
        let output = transform(windows_settings());
        assert_eq!(output.secret.as_deref(), Some("s3cret!pass"));

        let serialized = serde_json::to_string(&output.resources).expect("output serializes");
        assert!(
            !serialized.contains("s3cret!pass"),
            "no stamp may contain the secret plaintext"
        );
        assert!(serialized.contains(REDACTED_SECRET));
    }

    #[test]
    fn password_variant_never_emits_ssh_shape() {
        let output = transform(windows_settings());
        let profile = &output.stamps("virtualMachines")[0].properties["osProfile"];
        assert_eq!(profile["adminPassword"], json!(REDACTED_SECRET));
        assert_eq!(profile.get("linuxConfiguration"), None);
        assert_eq!(profile["windowsConfiguration"]["provisionVMAgent"], json!(true));
    }

    #[test]
    fn ssh_variant_never_emits_password_field() {
        let output = transform(linux_ssh_settings());
        let profile = &output.stamps("virtualMachines")[0].properties["osProfile"];
        assert_eq!(profile.get("adminPassword"), None);
        assert_eq!(
            profile["linuxConfiguration"]["disablePasswordAuthentication"],
            json!(true)
        );
        assert_eq!(
            profile["linuxConfiguration"]["ssh"]["publicKeys"][0]["keyData"],
            json!(REDACTED_SECRET)
        );
        assert_eq!(output.secret.as_deref(), Some("ssh-rsa AAAAB3NzaC1yc2E= ops@host"));
    }

    #[test]
    fn windows_with_ssh_is_rejected_by_validation() {
        let mut settings = windows_settings();
        settings["osAuthenticationType"] = json!("ssh");
        settings["sshPublicKey"] = json!("ssh-rsa AAAA");
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".osAuthenticationType");
    }

    #[test]
    fn public_nic_synthesizes_a_pip_and_references_it() {
        let mut settings = windows_settings();
        settings["nics"] = json!([
            { "subnetName": "web", "isPublic": true, "domainNameLabelPrefix": "testlabel" },
            { "subnetName": "data" },
        ]);
        let output = transform(settings);

        let nics = output.stamps("nics");
        assert_eq!(nics.len(), 2);
        assert_eq!(nics[0].name, "test-vm1-nic1");
        assert_eq!(nics[1].name, "test-vm1-nic2");
        // First NIC is primary by default when none is flagged.
        assert_eq!(nics[0].properties["primary"], json!(true));
        assert_eq!(nics[1].properties["primary"], json!(false));

        let pips = output.stamps("pips");
        assert_eq!(pips.len(), 1);
        assert_eq!(pips[0].name, "test-vm1-pip1");
        // Domain name labels are indexed 1-based, like every other name.
        assert_eq!(
            pips[0].properties["dnsSettings"]["domainNameLabel"],
            json!("testlabel-vm1")
        );

        let pip_id = nics[0].properties["ipConfigurations"][0]["properties"]["publicIPAddress"]
            ["id"]
            .as_str()
            .expect("pip reference id");
        assert!(pip_id.ends_with("/publicIPAddresses/test-vm1-pip1"));
        assert_eq!(
            nics[1].properties["ipConfigurations"][0]["properties"].get("publicIPAddress"),
            None
        );
    }

    #[test]
    fn nic_subnets_resolve_to_vnet_references() {
        let output = transform(windows_settings());
        let subnet_id = output.stamps("nics")[0].properties["ipConfigurations"][0]["properties"]
            ["subnet"]["id"]
            .as_str()
            .expect("subnet reference id");
        assert!(subnet_id.ends_with("/virtualNetworks/test-vnet/subnets/default"));
    }

    #[test]
    fn availability_set_is_stamped_and_referenced() {
        let output = transform(windows_settings());
        let avsets = output.stamps("availabilitySet");
        assert_eq!(avsets.len(), 1);
        assert_eq!(avsets[0].name, "test-as");

        let vm_ref = output.stamps("virtualMachines")[0].properties["availabilitySet"]["id"]
            .as_str()
            .expect("availability set id");
        assert!(vm_ref.ends_with("/availabilitySets/test-as"));
    }

    #[test]
    fn existing_availability_set_is_referenced_but_not_stamped() {
        let mut settings = windows_settings();
        settings["availabilitySet"] =
            json!({ "useExistingAvailabilitySet": true, "name": "shared-as" });
        let output = transform(settings);
        assert!(output.stamps("availabilitySet").is_empty());
        let vm_ref = output.stamps("virtualMachines")[0].properties["availabilitySet"]["id"]
            .as_str()
            .expect("availability set id");
        assert!(vm_ref.ends_with("/availabilitySets/shared-as"));
    }

    #[test]
    fn too_many_existing_accounts_is_a_rule_violation() {
        let mut settings = windows_settings();
        settings["storageAccounts"] = json!({ "count": 1, "accounts": ["a", "b"] });
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".storageAccounts.accounts");
    }

    #[test]
    fn two_primary_nics_are_rejected() {
        let mut settings = windows_settings();
        settings["nics"] = json!([
            { "subnetName": "a", "isPrimary": true },
            { "subnetName": "b", "isPrimary": true },
        ]);
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".nics");
    }

    #[test]
    fn attach_create_option_requires_an_image() {
        let mut settings = windows_settings();
        settings["osDisk"] = json!({ "osType": "windows", "createOption": "attach" });
        let run = process(&VirtualMachineBlock, &settings, &context()).expect("pipeline runs");
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].path, ".osDisk.image");
    }
}
