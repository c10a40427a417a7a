// Capability heuristics. Brand and model hints only ever add to the
// family default, so an unrecognized device keeps its family's set.

use crate::model::{Capability, CapabilitySet, DeviceFamily};

/// Baseline capabilities for a device family.
pub fn family_defaults(family: DeviceFamily) -> CapabilitySet {
    let caps: &[Capability] = match family {
        DeviceFamily::Router => &[
            Capability::Routing,
            Capability::Qos,
            Capability::Firewall,
            Capability::Vpn,
        ],
        DeviceFamily::Switch => &[Capability::Vlan, Capability::Qos],
        DeviceFamily::AccessPoint => &[Capability::Wireless, Capability::Qos],
        DeviceFamily::Other => &[],
    };
    caps.iter().copied().collect()
}

/// Derive a device's capability set from its family, brand and model.
pub fn capabilities_of(
    family: DeviceFamily,
    brand: Option<&str>,
    model: Option<&str>,
) -> CapabilitySet {
    let mut caps = family_defaults(family);

    let brand = brand.unwrap_or_default().to_ascii_lowercase();
    if brand.contains("mikrotik") {
        caps.insert(Capability::RouterOs);
        caps.insert(Capability::Api);
    } else if brand.contains("ubiquiti") || brand.contains("unifi") {
        caps.insert(Capability::Api);
    }

    let model = model.unwrap_or_default().to_ascii_lowercase();
    // CCR, RB and hEX boards run the full routing stack.
    if ["ccr", "rb", "hex"].iter().any(|hint| model.starts_with(hint)) {
        caps.insert(Capability::Routing);
        caps.insert(Capability::Qos);
    }

    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mikrotik_router_gets_routeros_and_api() {
        let caps = capabilities_of(DeviceFamily::Router, Some("MikroTik"), Some("CCR2004"));
        let expected: CapabilitySet = [
            Capability::Routing,
            Capability::Qos,
            Capability::Firewall,
            Capability::Vpn,
            Capability::RouterOs,
            Capability::Api,
        ]
        .into_iter()
        .collect();
        assert_eq!(caps, expected);
    }

    #[test]
    fn unknown_brand_keeps_family_default() {
        let caps = capabilities_of(DeviceFamily::Switch, Some("Acme Networks"), None);
        assert_eq!(caps, family_defaults(DeviceFamily::Switch));
        assert!(!caps.is_empty());
    }

    #[test]
    fn routerboard_switch_gains_routing() {
        let caps = capabilities_of(DeviceFamily::Switch, Some("mikrotik"), Some("RB5009"));
        assert!(caps.contains(&Capability::Routing));
        assert!(caps.contains(&Capability::Vlan));
    }

    #[test]
    fn other_family_without_hints_is_empty() {
        assert!(capabilities_of(DeviceFamily::Other, None, Some("OLT-8")).is_empty());
    }
}
