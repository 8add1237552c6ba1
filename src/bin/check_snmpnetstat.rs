//! Check the number of TCP or UDP connections using the external
//! `snmpnetstat` command.

use std::fmt;
use std::process::Command;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, ValueEnum};
use log::debug;

use netdev_checks::config_generator::print_icinga_command_config_if_env_and_exit;
use netdev_checks::{Metric, Resource, Runner, ServiceState, Thresholds};

/// Check the number of tcp or udp connection using 'snmpnetstat'.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// The hostname to probe.
    #[arg(short = 'H', long)]
    hostname: String,

    /// The SNMP community to use.
    #[arg(short = 'C', long, default_value = "public")]
    community: String,

    /// Use SNMP version 2c instead of v1.
    #[arg(short = '2', long = "v2c")]
    v2c: bool,

    /// Warning threshold (none if not set).
    #[arg(short = 'w', long, default_value_t = 0)]
    warning: u64,

    /// Critical threshold (none if not set).
    #[arg(short = 'c', long, default_value_t = 0)]
    critical: u64,

    /// Protocol to check for.
    #[arg(short = 'p', long, default_value_t = Protocol::Tcp)]
    protocol: Protocol,

    /// Count only lines matching this pattern; a leading `^` anchors the
    /// match at the start of the line. Defaults to the protocol name.
    #[arg(short = 'm', long = "match")]
    pattern: Option<String>,

    /// Do not try to use DNS to interpret IP addresses.
    #[arg(long)]
    no_dns: bool,

    /// Log debug information to stderr.
    #[arg(short = 'd', long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

fn main() {
    Runner::new().safe_run(run).print_and_exit()
}

fn run() -> anyhow::Result<Resource> {
    print_icinga_command_config_if_env_and_exit("check_snmpnetstat", &Cli::command())?;
    let cli: Cli = netdev_checks::parse_args();
    netdev_checks::init_logging(cli.debug);

    let thresholds = match (cli.warning, cli.critical) {
        (0, 0) => None,
        (warning, critical) => Some(Thresholds::new(warning, critical)?),
    };
    let pattern = cli
        .pattern
        .clone()
        .unwrap_or_else(|| format!("^{}", cli.protocol));

    let mut command = Command::new("snmpnetstat");
    command
        .arg("-c")
        .arg(&cli.community)
        .arg(if cli.v2c { "-v2c" } else { "-v1" });
    if cli.no_dns {
        command.arg("-Cn");
    }
    command.arg("-Cp").arg(cli.protocol.to_string()).arg(&cli.hostname);
    debug!("running {:?}", command);

    let output = command
        .output()
        .context("cannot execute the snmpnetstat command")?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        bail!("snmpnetstat reported an error: {}", stderr.trim());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        bail!("No output from snmpnetstat !");
    }

    Ok(evaluate(&stdout, &pattern, thresholds))
}

/// A leading `^` anchors the pattern at the start of the line; anything
/// else matches as a plain substring.
fn line_matches(line: &str, pattern: &str) -> bool {
    match pattern.strip_prefix('^') {
        Some(prefix) => line.starts_with(prefix),
        None => line.contains(pattern),
    }
}

fn evaluate(output: &str, pattern: &str, thresholds: Option<Thresholds<u64>>) -> Resource {
    let connections = output
        .lines()
        .filter(|line| line_matches(line, pattern))
        .count() as u64;

    let (state, bounds_note) = match thresholds {
        Some(ref t) => {
            let state = t.classify(connections);
            let note = match state {
                ServiceState::Critical => format!(" (>={})", t.critical()),
                ServiceState::Warning => format!(" (>={}) (<{})", t.warning(), t.critical()),
                _ => format!(" (<{})", t.warning()),
            };
            (state, note)
        }
        None => (ServiceState::Ok, String::new()),
    };

    let mut metric = Metric::new("nbrConn", connections);
    if let Some(ref t) = thresholds {
        metric = metric.with_thresholds(t);
    }

    Resource::new("NETSTAT")
        .with_state(state)
        .with_description(format!(
            "{} connection(s) using pattern '{}'{}",
            connections, pattern, bounds_note
        ))
        .with_result(metric)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
Active Internet (tcp) Connections
tcp   10.1.2.3.22      10.9.9.9.55310   ESTABLISHED
tcp   10.1.2.3.443     10.9.9.8.40112   ESTABLISHED
tcp   10.1.2.3.443     10.9.9.7.40654   TIME_WAIT
udp   10.1.2.3.161     *.*\n";

    #[test]
    fn test_pattern_matching() {
        assert!(line_matches("tcp 10.0.0.1.22", "^tcp"));
        assert!(!line_matches("Active tcp connections", "^tcp"));
        assert!(line_matches("Active tcp connections", "tcp"));
        assert!(!line_matches("udp 10.0.0.1.161", "^tcp"));
    }

    #[test]
    fn test_count_without_thresholds_is_ok() {
        let resource = evaluate(OUTPUT, "^tcp", None);
        assert_eq!(resource.state(), ServiceState::Ok);
        assert_eq!(
            resource.to_nagios_string(),
            "NETSTAT OK: 3 connection(s) using pattern '^tcp' | nbrConn=3"
        );
    }

    #[test]
    fn test_count_against_thresholds() {
        let thresholds = Thresholds::new(2u64, 10).unwrap();
        let resource = evaluate(OUTPUT, "^tcp", Some(thresholds));
        assert_eq!(resource.state(), ServiceState::Warning);
        assert_eq!(resource.exit_code(), 1);

        let out = resource.to_nagios_string();
        assert!(out.starts_with("NETSTAT WARNING: 3 connection(s) using pattern '^tcp' (>=2) (<10)"));
        assert!(out.contains("nbrConn=3;2;10"));
    }

    #[test]
    fn test_substring_pattern() {
        let resource = evaluate(OUTPUT, "ESTABLISHED", None);
        assert!(resource
            .to_nagios_string()
            .starts_with("NETSTAT OK: 2 connection(s)"));
    }
}
