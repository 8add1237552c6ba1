//! Check all temperature sensors on Cisco devices and alert if one is
//! above thresholds. Nexus fabric extenders carry their own threshold
//! class: `-w`/`-c` each take three values (outlet, fex outlet, fex die).

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts};
use netdev_checks::table::{self, NamedRow};
use netdev_checks::{
    BandTally, Metric, Resource, Runner, ServiceState, Thresholds, Unit,
};

/// Check all temperature on Cisco devices and alert if one is above thresholds.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,

    /// Warning thresholds for 5K Outlet / Catalyst, Fex Outlet and Fex Die.
    #[arg(short = 'w', long, num_args = 3, required = true, value_names = ["OUTLET", "FEX_OUTLET", "FEX_DIE"])]
    warning: Vec<u32>,

    /// Critical thresholds for 5K Outlet / Catalyst, Fex Outlet and Fex Die.
    #[arg(short = 'c', long, num_args = 3, required = true, value_names = ["OUTLET", "FEX_OUTLET", "FEX_DIE"])]
    critical: Vec<u32>,
}

// CISCO-ENTITY-SENSOR-MIB entSensorType
const OID_SENSOR_TYPES: &str = "1.3.6.1.4.1.9.9.91.1.1.1.1.1";
// CISCO-ENTITY-SENSOR-MIB entSensorValue
const OID_SENSOR_VALUES: &str = "1.3.6.1.4.1.9.9.91.1.1.1.1.4";
// ENTITY-MIB entPhysicalName
const OID_ENTITY_NAMES: &str = "1.3.6.1.2.1.47.1.1.1.1.7";

// entSensorType celsius(8)
const SENSOR_TYPE_CELSIUS: i64 = 8;

/// Which of the three threshold pairs applies to a sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SensorClass {
    Outlet,
    FexOutlet,
    FexDie,
}

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_cisco_temp", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let thresholds = ClassThresholds::new(&cli.warning, &cli.critical)?;

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;
    let types = snmp.walk(OID_SENSOR_TYPES)?;
    if types.is_empty() {
        bail!("SNMP Query Error: query all sensor types returned no result !");
    }
    let values = snmp.walk(OID_SENSOR_VALUES)?;
    let names = snmp.walk(OID_ENTITY_NAMES)?;

    // Keep celsius sensors only, then join values and names by index.
    let celsius: Vec<_> = types
        .iter()
        .filter(|t| t.value.as_i64() == Some(SENSOR_TYPE_CELSIUS))
        .filter_map(|t| {
            table::find(&values, &t.index).map(|value| netdev_checks::snmp::TableEntry {
                index: t.index.clone(),
                value: value.clone(),
            })
        })
        .collect();
    let sensors = table::correlate(&celsius, &names, "Sensor");
    debug!("{} celsius sensors", sensors.len());

    Ok(evaluate(&sensors, &thresholds))
}

struct ClassThresholds {
    outlet: Thresholds<u32>,
    fex_outlet: Thresholds<u32>,
    fex_die: Thresholds<u32>,
}

impl ClassThresholds {
    fn new(warning: &[u32], critical: &[u32]) -> anyhow::Result<Self> {
        Ok(ClassThresholds {
            outlet: Thresholds::new(warning[0], critical[0])?,
            fex_outlet: Thresholds::new(warning[1], critical[1])?,
            fex_die: Thresholds::new(warning[2], critical[2])?,
        })
    }

    fn for_class(&self, class: SensorClass) -> &Thresholds<u32> {
        match class {
            SensorClass::Outlet => &self.outlet,
            SensorClass::FexOutlet => &self.fex_outlet,
            SensorClass::FexDie => &self.fex_die,
        }
    }
}

/// Pick the threshold class from the sensor name. Anything unrecognized
/// is treated like a Catalyst/5K outlet sensor.
fn classify_sensor(name: &str) -> SensorClass {
    if name.starts_with("Fex") && name.contains("Outlet") {
        SensorClass::FexOutlet
    } else if name.starts_with("Fex") && name.contains("Die") {
        SensorClass::FexDie
    } else {
        SensorClass::Outlet
    }
}

fn perf_name(ordinal: usize, name: &str) -> String {
    let cleaned = name
        .replace(' ', "_")
        .replace(',', "_")
        .replace("_temperature", "");
    format!("{}_{}", ordinal, cleaned)
}

fn evaluate(sensors: &[NamedRow], thresholds: &ClassThresholds) -> Resource {
    let mut resource = Resource::new("TEMP");
    let mut tally = BandTally::default();
    let mut lines_crit = Vec::new();
    let mut lines_warn = Vec::new();
    let mut lines_ok = Vec::new();

    for (ordinal, sensor) in sensors.iter().enumerate() {
        let value = sensor.value.as_u64().unwrap_or(0) as u32;
        let t = thresholds.for_class(classify_sensor(&sensor.name));
        let state = t.classify(value);
        tally.record(state);

        match state {
            ServiceState::Critical => lines_crit.push(format!(
                " ** {}: {} C (>{}) **",
                sensor.name,
                value,
                t.critical()
            )),
            ServiceState::Warning => lines_warn.push(format!(
                " * {}: {} C (>{} <{}) *",
                sensor.name,
                value,
                t.warning(),
                t.critical()
            )),
            _ => lines_ok.push(format!(" {}: {} C (<{})", sensor.name, value, t.warning())),
        }

        resource.push(
            Metric::new(perf_name(ordinal, &sensor.name), value)
                .with_thresholds(t)
                .with_unit(Unit::Other("C".to_string())),
        );
    }

    if !lines_crit.is_empty() {
        resource.push_detail(format!("Critical: ({})", lines_crit.len()));
        for line in lines_crit {
            resource.push_detail(line);
        }
    }
    if !lines_warn.is_empty() {
        resource.push_detail(format!("Warning: ({})", lines_warn.len()));
        for line in lines_warn {
            resource.push_detail(line);
        }
    }
    if !lines_ok.is_empty() {
        resource.push_detail(format!("OK: ({})", lines_ok.len()));
        for line in lines_ok {
            resource.push_detail(line);
        }
    }

    let overall = tally.overall();
    let summary = if overall == ServiceState::Ok {
        "All temperature sensor are below thresholds.".to_string()
    } else {
        format!("{} temperature sensor above thresholds !", tally.errors())
    };

    resource.set_state(overall);
    resource.set_description(summary);
    resource
}
