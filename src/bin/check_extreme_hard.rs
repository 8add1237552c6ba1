//! Check hardware (power only) of Extreme devices.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, ValueEnum};

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts, TableEntry};
use netdev_checks::{Resource, Runner, ServiceState};

/// Check hardware (power only) of Extreme devices.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,

    /// Type of hardware to check.
    #[arg(short = 'T', long = "type")]
    hardware: HardwareType,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HardwareType {
    Power,
}

impl HardwareType {
    fn label(self) -> &'static str {
        match self {
            HardwareType::Power => "Power",
        }
    }
}

// EXTREME-SYSTEM-MIB extremePowerSupplyStatus
const OID_POWER_STATUS: &str = "1.3.6.1.4.1.1916.1.1.1.27.1.2";

const STATUS_NORMAL: i64 = 2;

fn status_name(code: i64) -> String {
    match code {
        1 => "Not present".to_string(),
        2 => "Normal".to_string(),
        3 => "Error".to_string(),
        other => format!("status {}", other),
    }
}

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_extreme_hard", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;
    let status_table = snmp.walk(OID_POWER_STATUS)?;
    if status_table.is_empty() {
        bail!(
            "SNMP query error: no {} status reported by this device !",
            cli.hardware.label().to_lowercase()
        );
    }

    Ok(evaluate(&status_table, cli.hardware))
}

fn evaluate(status_table: &[TableEntry], hardware: HardwareType) -> Resource {
    let mut resource = Resource::new("EXTREME_HARD");
    let mut errors = 0;

    for (ordinal, entry) in status_table.iter().enumerate() {
        let name = format!("{}{}", hardware.label(), ordinal);
        let code = entry.value.as_i64().unwrap_or(0);

        if code != STATUS_NORMAL {
            resource.push_detail(format!("** {}: {} **", name, status_name(code)));
            errors += 1;
        } else {
            resource.push_detail(format!("{}: {}", name, status_name(code)));
        }
    }

    if errors > 0 {
        resource.set_state(ServiceState::Critical);
        resource.set_description(format!(
            "{} {} health in error !",
            errors,
            hardware.label()
        ));
    } else {
        resource.set_state(ServiceState::Ok);
        resource.set_description(format!("{} health is good.", hardware.label()));
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdev_checks::snmp::SnmpValue;

    fn entry(index: u64, code: i64) -> TableEntry {
        TableEntry {
            index: vec![index],
            value: SnmpValue::Int(code),
        }
    }

    #[test]
    fn test_all_supplies_normal() {
        let resource = evaluate(&[entry(1, 2), entry(2, 2)], HardwareType::Power);
        assert_eq!(resource.state(), ServiceState::Ok);

        let out = resource.to_nagios_string();
        assert!(out.starts_with("EXTREME_HARD OK: Power health is good."));
        assert!(out.contains("Power0: Normal"));
        assert!(out.contains("Power1: Normal"));
    }

    #[test]
    fn test_failed_supply_is_critical() {
        let resource = evaluate(&[entry(1, 2), entry(2, 3)], HardwareType::Power);
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(resource.exit_code(), 2);

        let out = resource.to_nagios_string();
        assert!(out.starts_with("EXTREME_HARD CRITICAL: 1 Power health in error !"));
        assert!(out.contains("** Power1: Error **"));
    }

    #[test]
    fn test_absent_supply_counts_as_error() {
        let resource = evaluate(&[entry(1, 1)], HardwareType::Power);
        assert_eq!(resource.state(), ServiceState::Critical);
        assert!(resource
            .to_nagios_string()
            .contains("** Power0: Not present **"));
    }
}
