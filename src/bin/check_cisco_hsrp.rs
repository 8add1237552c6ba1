//! Check HSRP on Cisco devices: every standby group on the router must be
//! in the role the operator expects (active or standby).

use std::fmt;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, ValueEnum};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts};
use netdev_checks::{Resource, Runner, ServiceState};

/// Check HSRP on Cisco devices. Check if the router must be the active or
/// standby router for VLANs.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,

    /// Role of this router.
    #[arg(short = 'r', long)]
    role: Role,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Role {
    Active,
    Standby,
}

impl Role {
    fn state_code(self) -> i64 {
        match self {
            Role::Standby => 5,
            Role::Active => 6,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Active => "active",
            Role::Standby => "standby",
        })
    }
}

// cHsrpGrpStandbyState: initial(1) learn(2) listen(3) speak(4) standby(5) active(6)
fn state_name(code: i64) -> String {
    match code {
        1 => "initial".to_string(),
        2 => "learn".to_string(),
        3 => "listen".to_string(),
        4 => "speak".to_string(),
        5 => "standby".to_string(),
        6 => "active".to_string(),
        other => format!("state {}", other),
    }
}

// CISCO-HSRP-MIB cHsrpGrpStandbyState, indexed by ifIndex.cHsrpGrpNumber
const OID_HSRP_STATES: &str = "1.3.6.1.4.1.9.9.106.1.2.1.1.15";
// IF-MIB ifDescr
const OID_IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";

/// One HSRP group with its interface name and current state code.
struct Group {
    interface: String,
    state: i64,
}

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_cisco_hsrp", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;
    let states = snmp.walk(OID_HSRP_STATES)?;
    if states.is_empty() {
        bail!("SNMP query error: no HSRP group found on this device !");
    }

    let mut groups = Vec::with_capacity(states.len());
    for row in &states {
        // Row index is ifIndex.groupNumber.
        if row.index.len() < 2 {
            debug!("skipping HSRP row with short index {:?}", row.index);
            continue;
        }
        let if_index = row.index[row.index.len() - 2];
        let interface = snmp
            .get_indexed(OID_IF_DESCR, &[if_index])?
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("if{}", if_index));

        groups.push(Group {
            interface,
            state: row.value.as_i64().unwrap_or(0),
        });
    }

    Ok(evaluate(&groups, cli.role))
}

fn evaluate(groups: &[Group], role: Role) -> Resource {
    let mut resource = Resource::new("HSRP");
    let mut errors = 0;

    for group in groups {
        if group.state != role.state_code() {
            resource.push_detail(format!(
                "** {} is in state {} (must be {}) **",
                group.interface,
                state_name(group.state),
                role
            ));
            errors += 1;
        } else {
            resource.push_detail(format!("{} is in state {}", group.interface, role));
        }
    }

    if errors > 0 {
        resource.set_state(ServiceState::Warning);
        resource.set_description(format!("{} HSRP interface error !", errors));
    } else {
        resource.set_state(ServiceState::Ok);
        resource.set_description(format!("Role for HSRP is {}.", role));
    }
    resource
}
