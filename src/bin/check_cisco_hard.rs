//! Check hardware (sensors, fans, power) of Cisco devices.
//!
//! Prefers CISCO-ENTITY-SENSOR-MIB; devices without it are checked via the
//! older CISCO-ENVMON-MIB fan and power tables. Devices with neither are
//! reported OK: absence of sensor support is not a fault.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::snmp::{SnmpClient, SnmpOpts};
use netdev_checks::table::{self, NamedRow};
use netdev_checks::{Resource, Runner, ServiceState};

/// Check hardware (sensors, fans, power) of Cisco devices.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    snmp: SnmpOpts,
}

// ENTITY-MIB entPhysicalName
const OID_SENSOR_NAMES: &str = "1.3.6.1.2.1.47.1.1.1.1.7";
// CISCO-ENTITY-SENSOR-MIB entSensorStatus
const OID_SENSORS_STATUS: &str = "1.3.6.1.4.1.9.9.91.1.1.1.1.5";
// CISCO-ENVMON-MIB ciscoEnvMonFanState
const OID_ENVMON_FAN_STATUS: &str = "1.3.6.1.4.1.9.9.13.1.4.1.3";
// CISCO-ENVMON-MIB ciscoEnvMonSupplyState
const OID_ENVMON_POWER_STATUS: &str = "1.3.6.1.4.1.9.9.13.1.5.1.3";

// entSensorStatus unavailable(2)
const ENTITY_SENSOR_UNAVAILABLE: i64 = 2;
// ciscoEnvMon states notPresent(5)
const ENVMON_NOT_PRESENT: i64 = 5;

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_cisco_hard", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.snmp.debug);

    let mut snmp = SnmpClient::connect(&cli.snmp).context("SNMP session setup failed")?;

    let entity_sensors = snmp.walk(OID_SENSORS_STATUS)?;
    let envmon_fans = snmp.walk(OID_ENVMON_FAN_STATUS)?;
    let envmon_power = snmp.walk(OID_ENVMON_POWER_STATUS)?;

    if entity_sensors.is_empty() && envmon_fans.is_empty() && envmon_power.is_empty() {
        return Ok(Resource::new("HARDWARE")
            .with_state(ServiceState::Ok)
            .with_description("No support for hardware sensor available."));
    }

    let names = snmp.walk(OID_SENSOR_NAMES)?;

    let sensors = if !entity_sensors.is_empty() {
        debug!("device supports CISCO-ENTITY-SENSOR-MIB");
        table::correlate_filtered(
            &entity_sensors,
            &names,
            "Sensor",
            &[ENTITY_SENSOR_UNAVAILABLE],
        )
    } else {
        debug!("no CISCO-ENTITY-SENSOR-MIB support, falling back to CISCO-ENVMON-MIB");
        let mut sensors =
            table::correlate_filtered(&envmon_fans, &names, "Fan", &[ENVMON_NOT_PRESENT]);
        sensors.extend(table::correlate_filtered(
            &envmon_power,
            &names,
            "Power",
            &[ENVMON_NOT_PRESENT],
        ));
        sensors
    };

    Ok(evaluate(&sensors))
}

fn evaluate(sensors: &[NamedRow]) -> Resource {
    let mut resource = Resource::new("HARDWARE");
    let mut failed = 0;

    for sensor in sensors {
        // Status 1 is ok/normal in both MIB branches.
        let status = sensor.value.as_i64().unwrap_or(0);
        if status > 1 {
            resource.push_detail(format!("** {}: Non operational ! **", sensor.name));
            failed += 1;
        } else {
            resource.push_detail(format!("{}: ok", sensor.name));
        }
    }

    if failed > 0 {
        resource.set_state(ServiceState::Critical);
        resource.set_description(format!("{} sensors are non operationals !", failed));
    } else {
        resource.set_state(ServiceState::Ok);
        resource.set_description("Sensor health is good.");
    }
    resource
}
