//! Check SAN directors for CRC errors on ports.
//!
//! CRC counters only ever grow, so a single reading says nothing; this
//! check persists one snapshot per run and alerts on the increase over the
//! last `-r` runs (or, with `--max-age`, over the snapshots younger than
//! the given age). Until the window is filled the check reports UNKNOWN
//! and keeps collecting.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::retention::{
    self, Evaluation, PortDelta, PortSample, RetentionStore, Snapshot, Window, MAX_SNAPSHOTS,
};
use netdev_checks::snmp::{SnmpClient, SnmpOpts, TableEntry};
use netdev_checks::table;
use netdev_checks::{
    BandTally, Metric, Resource, Runner, ServiceState, Thresholds, Unit,
};

/// Check SAN directors for CRCs on ports.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,

    /// Make an average for the last <N> records.
    #[arg(short = 'r', long, default_value_t = 2)]
    records: usize,

    /// Use a time window instead: ignore records older than this many
    /// seconds.
    #[arg(long, conflicts_with = "records")]
    max_age: Option<u64>,

    /// Warn if the number of CRCs increased above this threshold.
    #[arg(short = 'w', long)]
    warning: u64,

    /// Crit if the number of CRCs increased above this threshold.
    #[arg(short = 'c', long)]
    critical: u64,

    /// Directory holding the retention files.
    #[arg(long, default_value = "/var/tmp")]
    retention_dir: PathBuf,
}

// SW-MIB swFCPortPortName
const OID_PORT_NAME: &str = "1.3.6.1.4.1.1588.2.1.1.1.6.2.1.36";
// SW-MIB swFCPortSpecifier (the port alias, our stable key)
const OID_PORT_ALIAS: &str = "1.3.6.1.4.1.1588.2.1.1.1.6.2.1.37";
// SW-MIB swFCPortRxCrcs
const OID_PORT_CRC: &str = "1.3.6.1.4.1.1588.2.1.1.1.6.2.1.22";

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_san_crc", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let window = match cli.max_age {
        Some(age) => Window::MaxAge(age),
        None => {
            if cli.records < 2 {
                bail!("Number of records must be >= 2 to make an average !");
            }
            Window::Samples(cli.records)
        }
    };
    let thresholds = Thresholds::new(cli.warning, cli.critical)?;

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;
    let aliases = snmp.walk(OID_PORT_ALIAS)?;
    if aliases.is_empty() {
        bail!(
            "SNMP query error: the port table returned no result, \
             the equipment may not support such requests !"
        );
    }
    let names = snmp.walk(OID_PORT_NAME)?;
    let counters = snmp.walk(OID_PORT_CRC)?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the epoch")?
        .as_secs();
    let snapshot = Snapshot {
        timestamp,
        values: collect_ports(&aliases, &names, &counters),
    };
    debug!("snapshot with {} ports", snapshot.values.len());

    let store = RetentionStore::new(&cli.retention_dir, "check_san_crc", &cli.snmp.hostname);
    let mut history = store.load()?;
    retention::append_pruned(&mut history, snapshot, MAX_SNAPSHOTS);
    // Persist before evaluating: an UNKNOWN on an unfilled window must
    // still contribute its snapshot, or the window would never fill.
    store.save(&history)?;

    match retention::evaluate(&history, window) {
        Evaluation::Insufficient { need, .. } => bail!(
            "Not enough data to generate average, need {} more checks. Waiting next check.",
            need
        ),
        Evaluation::Ready {
            deltas,
            span_minutes,
        } => Ok(evaluate(&deltas, &thresholds, span_minutes)),
    }
}

/// One sample per port, keyed by the port alias. Ports without an alias
/// are not monitored; a port without a name renders `No description`.
fn collect_ports(
    aliases: &[TableEntry],
    names: &[TableEntry],
    counters: &[TableEntry],
) -> BTreeMap<String, PortSample> {
    let mut values = BTreeMap::new();

    for row in aliases {
        let alias = row.value.to_string();
        if alias.is_empty() {
            continue;
        }
        let Some(counter) = table::find(counters, &row.index).and_then(|v| v.as_u64()) else {
            continue;
        };
        let name = table::find(names, &row.index)
            .map(|v| v.to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No description".to_string());

        values.insert(alias, PortSample { name, counter });
    }

    values
}

fn evaluate(deltas: &[PortDelta], thresholds: &Thresholds<u64>, span_minutes: u64) -> Resource {
    let mut resource = Resource::new("CRC");
    let mut tally = BandTally::default();
    let mut warn_ports = Vec::new();
    let mut crit_ports = Vec::new();
    let mut resets = 0;

    for port in deltas {
        let state = thresholds.classify(port.delta);
        tally.record(state);
        match state {
            ServiceState::Warning => warn_ports.push(port),
            ServiceState::Critical => crit_ports.push(port),
            _ => {}
        }
        resets += port.resets;

        resource.push(
            Metric::new(format!("Port_{}", port.key), port.delta)
                .with_thresholds(thresholds)
                .with_unit(Unit::Counter)
                .with_bounds(Some(0), None),
        );
    }

    let summary = match (warn_ports.len(), crit_ports.len()) {
        (0, 0) => "No CRC error detected on ports.".to_string(),
        (warn, 0) => format!("{} ports have warnings CRC errors !", warn),
        (0, crit) => format!("{} ports have criticals CRC errors !", crit),
        (warn, crit) => format!(
            "{} ports have criticals, {} ports have warnings CRC errors !",
            crit, warn
        ),
    };

    if !crit_ports.is_empty() {
        resource.push_detail(format!(
            "Critical ({}) (>= {}):",
            crit_ports.len(),
            thresholds.critical()
        ));
        for port in &crit_ports {
            resource.push_detail(format!(
                "  Port {}: {} crc ({})",
                port.key, port.delta, port.name
            ));
        }
    }
    if !warn_ports.is_empty() {
        resource.push_detail(format!(
            "Warning ({}) (>= {}):",
            warn_ports.len(),
            thresholds.warning()
        ));
        for port in &warn_ports {
            resource.push_detail(format!(
                "  Port {}: {} crc ({})",
                port.key, port.delta, port.name
            ));
        }
    }
    if resets > 0 {
        resource.push_detail(format!(
            "Counter reset detected on {} interval(s), those intervals count as zero.",
            resets
        ));
    }

    resource.set_state(tally.overall());
    resource.set_description(format!(
        "{} (Average on last {} mins)",
        summary, span_minutes
    ));
    resource
}
