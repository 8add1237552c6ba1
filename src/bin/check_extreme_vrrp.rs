//! Check VRRP status of VLANs on Extreme Core devices.
//!
//! The operator supplies the expected sum of all VRRP state codes
//! (initialize=1, backup=2, master=3 per VLAN); any deviation means a
//! master changed or the VRRP VLAN layout changed.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts};
use netdev_checks::{Resource, Runner, ServiceState};

/// Check VRRP status of VLAN on Extreme Core devices.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,

    /// Expected sum of all VRRP status codes.
    #[arg(short = 'w', long)]
    warning: u64,
}

// EXTREME-VLAN-MIB extremeVlanIfDescr, indexed by vlan id
const OID_VLAN_NAMES: &str = "1.3.6.1.4.1.1916.1.2.8.1.1.1";
// EXTREME-VLAN-MIB vlan interface address table, row index ends in vlan id
const OID_VLAN_INTERFACES: &str = "1.3.6.1.4.1.1916.1.2.4.1.1.1";
// VRRP-MIB vrrpOperState, indexed by ifIndex.vrId
const OID_VRRP_STATUS: &str = "1.3.6.1.2.1.68.1.3.1.3";
// IP-MIB ipAdEntIfIndex, indexed by the interface address
const OID_VRRP_ID: &str = "1.3.6.1.2.1.4.20.1.2";

fn vrrp_state_name(code: i64) -> String {
    match code {
        1 => "Initialize".to_string(),
        2 => "Backup".to_string(),
        3 => "Master".to_string(),
        other => format!("State {}", other),
    }
}

/// One VLAN carrying a VRRP instance.
struct VlanStatus {
    vlan_name: String,
    state: i64,
}

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_extreme_vrrp", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;

    let vlan_interfaces = snmp.walk(OID_VLAN_INTERFACES)?;
    if vlan_interfaces.is_empty() {
        bail!("SNMP query error: no VLAN interface reported by this device !");
    }
    let vrrp_status_table = snmp.walk(OID_VRRP_STATUS)?;

    // vrId per interface index, from the vrrpOperState row index
    // (ifIndex.vrId).
    let mut router_ids: Vec<(u64, u64)> = Vec::new();
    for row in &vrrp_status_table {
        if row.index.len() >= 2 {
            let if_index = row.index[row.index.len() - 2];
            let vr_id = row.index[row.index.len() - 1];
            router_ids.push((if_index, vr_id));
        }
    }

    let mut vlans = Vec::new();
    for vlan in &vlan_interfaces {
        let Some(vlan_id) = vlan.index.last().copied() else {
            continue;
        };
        let address = vlan.value.to_string();
        if address.is_empty() {
            continue;
        }

        // The interface address is itself the index into ipAdEntIfIndex.
        let oid_by_address = format!("{}.{}", OID_VRRP_ID, address);
        let Some(if_index) = snmp.try_get(&oid_by_address)?.and_then(|v| v.as_u64()) else {
            debug!("vlan {} has no VRRP interface index", vlan_id);
            continue;
        };
        let Some(vr_id) = router_ids
            .iter()
            .find(|(index, _)| *index == if_index)
            .map(|(_, vr_id)| *vr_id)
        else {
            continue;
        };

        let Some(state) = snmp
            .get_indexed(OID_VRRP_STATUS, &[if_index, vr_id])?
            .and_then(|v| v.as_i64())
        else {
            continue;
        };

        let vlan_name = snmp
            .get_indexed(OID_VLAN_NAMES, &[vlan_id])?
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("Vlan{}", vlan_id));

        vlans.push(VlanStatus { vlan_name, state });
    }

    Ok(evaluate(&vlans, cli.warning))
}

fn evaluate(vlans: &[VlanStatus], expected_sum: u64) -> Resource {
    let mut resource = Resource::new("VRRP");
    let mut sum: u64 = 0;

    for vlan in vlans {
        sum += u64::try_from(vlan.state).unwrap_or(0);
        resource.push_detail(format!(
            "{}: {}",
            vlan.vlan_name,
            vrrp_state_name(vlan.state)
        ));
    }

    if sum != expected_sum {
        resource.set_state(ServiceState::Warning);
        resource.set_description(
            "VRRP master has changed for at least one VLAN \
             or VRRP VLAN configuration has changed !",
        );
    } else {
        resource.set_state(ServiceState::Ok);
        resource.set_description("VRRP status has not changed.");
    }
    resource
}
