//! Check all CPU usage on Cisco devices supporting CISCO-PROCESS-MIB.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts, TableEntry};
use netdev_checks::table::{self, NamedRow};
use netdev_checks::{
    BandTally, Metric, Resource, Runner, ServiceState, Thresholds, Unit,
};

/// Check all CPU usage on Cisco devices supporting CISCO-PROCESS-MIB.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,

    /// Warning threshold in percent (eg. 80).
    #[arg(short = 'w', long)]
    warning: u32,

    /// Critical threshold in percent (eg. 90).
    #[arg(short = 'c', long)]
    critical: u32,
}

// ENTITY-MIB entPhysicalName
const OID_ENTITY_NAME: &str = "1.3.6.1.2.1.47.1.1.1.1.7";
// CISCO-PROCESS-MIB cpmCPUTotalPhysicalIndex
const OID_CPU_INDEXES: &str = "1.3.6.1.4.1.9.9.109.1.1.1.1.2";
// CISCO-PROCESS-MIB cpmCPUTotal5minRev
const OID_CPU_USAGE: &str = "1.3.6.1.4.1.9.9.109.1.1.1.1.8";

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_cisco_cpu", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let thresholds = Thresholds::new(cli.warning, cli.critical)?;

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;
    let usages = snmp.walk(OID_CPU_USAGE)?;
    if usages.is_empty() {
        bail!("SNMP query error: query returned no result !");
    }
    let physical_indexes = snmp.walk(OID_CPU_INDEXES)?;

    let cpus = resolve_cpu_names(&mut snmp, &usages, &physical_indexes)?;
    Ok(evaluate(&cpus, &thresholds))
}

/// Resolve a display name for every CPU row: follow the physical index
/// into the entity name table, falling back to `CPU<ordinal>` when the
/// device does not relate the CPU to a physical entity.
fn resolve_cpu_names(
    snmp: &mut SnmpClient,
    usages: &[TableEntry],
    physical_indexes: &[TableEntry],
) -> anyhow::Result<Vec<NamedRow>> {
    let mut rows = Vec::with_capacity(usages.len());

    for (ordinal, usage) in usages.iter().enumerate() {
        let physical = table::find(physical_indexes, &usage.index).and_then(|v| v.as_u64());
        let name = match physical {
            Some(index) if index > 0 => snmp
                .get_indexed(OID_ENTITY_NAME, &[index])?
                .map(|v| v.to_string())
                .filter(|s| !s.is_empty()),
            _ => None,
        };
        let name = name.unwrap_or_else(|| format!("CPU{}", ordinal));
        debug!("cpu {} -> {}", ordinal, name);

        rows.push(NamedRow {
            name,
            index: usage.index.clone(),
            value: usage.value.clone(),
        });
    }

    Ok(rows)
}

fn evaluate(cpus: &[NamedRow], thresholds: &Thresholds<u32>) -> Resource {
    let mut resource = Resource::new("CPU");
    let mut tally = BandTally::default();

    for cpu in cpus {
        let usage = cpu.value.as_u64().unwrap_or(0) as u32;
        let state = thresholds.classify(usage);
        tally.record(state);

        match state {
            ServiceState::Warning => resource.push_detail(format!(
                "* {}: {}% * (>{})",
                cpu.name,
                usage,
                thresholds.warning()
            )),
            ServiceState::Critical => resource.push_detail(format!(
                "** {}: {}% ** (>{})",
                cpu.name,
                usage,
                thresholds.critical()
            )),
            _ => resource.push_detail(format!(
                "{}: {}% (<{})",
                cpu.name,
                usage,
                thresholds.warning()
            )),
        }

        resource.push(
            Metric::new(cpu.name.replace(' ', "_"), usage)
                .with_thresholds(thresholds)
                .with_unit(Unit::Percentage)
                .with_bounds(Some(0), Some(100)),
        );
    }

    let overall = tally.overall();
    let summary = match overall {
        ServiceState::Ok => "All CPU usage are below thresholds.".to_string(),
        ServiceState::Warning => format!(
            "{} CPU are above {}% of usage !",
            tally.errors(),
            thresholds.warning()
        ),
        _ => format!(
            "{} CPU are above {}% of usage !",
            tally.errors(),
            thresholds.critical()
        ),
    };

    resource.set_state(overall);
    resource.set_description(summary);
    resource
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdev_checks::snmp::SnmpValue;

    fn cpu(name: &str, usage: i64) -> NamedRow {
        NamedRow {
            name: name.to_string(),
            index: vec![1],
            value: SnmpValue::Int(usage),
        }
    }

    #[test]
    fn test_three_cores_worst_wins() {
        let thresholds = Thresholds::new(80u32, 90).unwrap();
        let cpus = [cpu("CPU0", 70), cpu("CPU1", 85), cpu("CPU2", 95)];

        let resource = evaluate(&cpus, &thresholds);
        assert_eq!(resource.state(), ServiceState::Critical);
        assert_eq!(resource.exit_code(), 2);

        let out = resource.to_nagios_string();
        assert!(out.starts_with("CPU CRITICAL: 2 CPU are above 90% of usage !"));
        assert!(out.contains("CPU0: 70% (<80)"));
        assert!(out.contains("* CPU1: 85% * (>80)"));
        assert!(out.contains("** CPU2: 95% ** (>90)"));
        assert!(out.contains("CPU0=70%;80;90;0;100"));
    }

    #[test]
    fn test_all_below_thresholds() {
        let thresholds = Thresholds::new(80u32, 90).unwrap();
        let cpus = [cpu("CPU0", 10), cpu("CPU1", 20)];

        let resource = evaluate(&cpus, &thresholds);
        assert_eq!(resource.state(), ServiceState::Ok);
        assert!(resource
            .to_nagios_string()
            .starts_with("CPU OK: All CPU usage are below thresholds."));
    }
}
