//! Check config last change and last saved date time: warn when the
//! running configuration was modified after the last save.

use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts};
use netdev_checks::{Resource, Runner, ServiceState};

/// Check config last change and last saved date time.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,
}

// SNMPv2-MIB sysUpTime
const OID_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
// CISCO-CONFIG-MAN-MIB ccmHistoryRunningLastChanged
const OID_CONFIG_LAST_CHANGED: &str = "1.3.6.1.4.1.9.9.43.1.1.1.0";
// CISCO-CONFIG-MAN-MIB ccmHistoryRunningLastSaved
const OID_CONFIG_LAST_SAVED: &str = "1.3.6.1.4.1.9.9.43.1.1.2.0";

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_cisco_config", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;
    let uptime = snmp
        .get(OID_UPTIME)?
        .as_u64()
        .context("sysUpTime is not a timeticks value")?;
    let last_changed = snmp
        .get(OID_CONFIG_LAST_CHANGED)?
        .as_u64()
        .context("config last changed is not a timeticks value")?;
    let last_saved = snmp
        .get(OID_CONFIG_LAST_SAVED)?
        .as_u64()
        .context("config last saved is not a timeticks value")?;
    debug!(
        "uptime={} changed={} saved={}",
        uptime, last_changed, last_saved
    );

    Ok(evaluate(uptime, last_changed, last_saved))
}

/// Timeticks are hundredths of a second since the device booted; the
/// larger of the two config stamps is the more recent event.
fn evaluate(uptime: u64, last_changed: u64, last_saved: u64) -> Resource {
    let mut resource = Resource::new("CONFIG");

    let changed_age = ticks_ago(uptime, last_changed);
    let saved_age = ticks_ago(uptime, last_saved);
    resource.push_detail(format!("Config last changed: {} ago", changed_age));
    resource.push_detail(format!("Config last saved: {} ago", saved_age));

    if last_changed > last_saved {
        resource.set_state(ServiceState::Warning);
        resource.set_description(format!(
            "Config was changed without saving {} ago !",
            changed_age
        ));
    } else {
        resource.set_state(ServiceState::Ok);
        resource.set_description(format!(
            "Running configuration was saved {} ago.",
            saved_age
        ));
    }
    resource
}

fn ticks_ago(uptime: u64, event: u64) -> String {
    let seconds = uptime.abs_diff(event) / 100;
    // Drop sub-minute noise from the display.
    let rounded = seconds - seconds % 60;
    humantime::format_duration(Duration::from_secs(rounded)).to_string()
}
