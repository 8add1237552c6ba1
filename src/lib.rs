//! Building blocks for Nagios/Icinga check plugins that poll network
//! equipment over SNMP.
//!
//! Each binary in `src/bin/` is one independent checker. The library holds
//! the pattern they all share: a [`Resource`] collecting a service state,
//! a summary line, long output and performance metrics; [`Thresholds`] for
//! warning/critical classification; the [`snmp`] query adapter; the
//! [`table`] correlator for joining parallel SNMP tables; and the
//! [`retention`] tracker for counter deltas across executions.
//!
//! ```no_run
//! use netdev_checks::{Metric, Resource, Runner, Thresholds};
//!
//! fn do_check() -> anyhow::Result<Resource> {
//!     let thresholds = Thresholds::new(80u32, 90)?;
//!     Ok(Resource::new("CPU")
//!         .with_description("All CPU usage are below thresholds")
//!         .with_result(Metric::new("cpu0", 42).with_thresholds(&thresholds)))
//! }
//!
//! fn main() {
//!     Runner::new().safe_run(do_check).print_and_exit()
//! }
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::process;

pub mod config_generator;
pub mod retention;
pub mod snmp;
pub mod table;

mod runner;
mod thresholds;

pub use crate::runner::{safe_run, Runner, RunnerResult};
pub use crate::thresholds::{BandTally, Thresholds, ThresholdsError};

/// Service state as understood by Nagios and Icinga.
///
/// The ordering is by severity (`Unknown < Ok < Warning < Critical`), so
/// that the overall state of a check is the maximum over its parts. The
/// exit-code mapping is the plugin API convention, unrelated to that
/// ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl ServiceState {
    /// Process exit code signalling this state to the scheduler.
    pub fn exit_code(self) -> i32 {
        match self {
            ServiceState::Ok => 0,
            ServiceState::Warning => 1,
            ServiceState::Critical => 2,
            ServiceState::Unknown => 3,
        }
    }

    fn severity(self) -> u8 {
        match self {
            ServiceState::Unknown => 0,
            ServiceState::Ok => 1,
            ServiceState::Warning => 2,
            ServiceState::Critical => 3,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceState::Ok => "OK",
            ServiceState::Warning => "WARNING",
            ServiceState::Critical => "CRITICAL",
            ServiceState::Unknown => "UNKNOWN",
        })
    }
}

impl PartialOrd for ServiceState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

/// Unit of measurement appended to a perfdata value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Unit {
    #[default]
    None,
    Percentage,
    Counter,
    Seconds,
    Bytes,
    Other(String),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::None => Ok(()),
            Unit::Percentage => f.write_str("%"),
            Unit::Counter => f.write_str("c"),
            Unit::Seconds => f.write_str("s"),
            Unit::Bytes => f.write_str("B"),
            Unit::Other(s) => f.write_str(s),
        }
    }
}

/// Anything a [`Resource`] can carry as a performance metric.
pub trait ResourceMetric {
    fn name(&self) -> &str;
    fn state(&self) -> Option<ServiceState>;
    fn perf_string(&self) -> String;
}

/// A single measured value with optional thresholds and bounds.
///
/// Renders as `label=value<uom>;warn;crit;min;max` with empty trailing
/// fields trimmed. When built via [`Metric::with_thresholds`] the state is
/// derived from the classification of the value.
pub struct Metric<T> {
    name: String,
    value: T,
    state: Option<ServiceState>,
    warning: Option<T>,
    critical: Option<T>,
    min: Option<T>,
    max: Option<T>,
    unit: Unit,
}

impl<T> Metric<T>
where
    T: fmt::Display + PartialOrd + Copy,
{
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Metric {
            name: name.into(),
            value,
            state: None,
            warning: None,
            critical: None,
            min: None,
            max: None,
            unit: Unit::None,
        }
    }

    /// Record the threshold pair in the perfdata and derive the state from
    /// classifying the value against it.
    pub fn with_thresholds(mut self, thresholds: &Thresholds<T>) -> Self {
        self.warning = Some(thresholds.warning());
        self.critical = Some(thresholds.critical());
        self.state = Some(thresholds.classify(self.value));
        self
    }

    /// Set the state explicitly instead of deriving it from thresholds.
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_bounds(mut self, min: Option<T>, max: Option<T>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn value(&self) -> T {
        self.value
    }
}

impl<T> ResourceMetric for Metric<T>
where
    T: fmt::Display + PartialOrd + Copy,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> Option<ServiceState> {
        self.state
    }

    fn perf_string(&self) -> String {
        let mut fields = vec![format!("{}{}", self.value, self.unit)];
        for bound in [self.warning, self.critical, self.min, self.max] {
            fields.push(bound.map(|v| v.to_string()).unwrap_or_default());
        }
        let joined = fields.join(";");
        format!("{}={}", perf_label(&self.name), joined.trim_end_matches(';'))
    }
}

/// Sanitize a metric label for the perfdata section: `=` is not allowed,
/// single quotes are doubled, labels with spaces get quoted.
fn perf_label(name: &str) -> String {
    let label = name.replace('=', "_").replace('\'', "''");
    if label.contains(' ') {
        format!("'{}'", label)
    } else {
        label
    }
}

/// One service from the perspective of the monitoring scheduler.
///
/// Collects the state, the one-line summary, long-output detail lines and
/// performance metrics, then renders them in the plugin output format and
/// exits with the matching code.
pub struct Resource {
    name: String,
    state: Option<ServiceState>,
    summary: Option<String>,
    details: Vec<String>,
    metrics: Vec<Box<dyn ResourceMetric>>,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Resource {
            name: name.into(),
            state: None,
            summary: None,
            details: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// One-line summary shown after the state.
    pub fn with_description(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Force the state instead of deriving it from the metrics.
    pub fn with_state(mut self, state: ServiceState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_result<M: ResourceMetric + 'static>(mut self, metric: M) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }

    pub fn push<M: ResourceMetric + 'static>(&mut self, metric: M) {
        self.metrics.push(Box::new(metric));
    }

    /// Append one line of long output.
    pub fn push_detail(&mut self, line: impl Into<String>) {
        self.details.push(line.into());
    }

    pub fn set_state(&mut self, state: ServiceState) {
        self.state = Some(state);
    }

    pub fn set_description(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    /// The state reported to the scheduler: the explicitly set one, or the
    /// worst state among the metrics, or Unknown if there is nothing to go
    /// by.
    pub fn state(&self) -> ServiceState {
        if let Some(state) = self.state {
            return state;
        }
        self.metrics
            .iter()
            .filter_map(|m| m.state())
            .max()
            .unwrap_or(ServiceState::Unknown)
    }

    pub fn exit_code(&self) -> i32 {
        self.state().exit_code()
    }

    /// Render the complete plugin output: status line with perfdata, then
    /// the long output lines.
    pub fn to_nagios_string(&self) -> String {
        let mut out = format!("{} {}", self.name, self.state());

        if let Some(ref summary) = self.summary {
            out.push_str(": ");
            out.push_str(summary);
        }

        if !self.metrics.is_empty() {
            out.push_str(" |");
            for metric in &self.metrics {
                out.push(' ');
                out.push_str(&metric.perf_string());
            }
        }

        for line in &self.details {
            out.push('\n');
            out.push_str(line);
        }

        out
    }

    pub fn print_and_exit(&self) -> ! {
        println!("{}", self.to_nagios_string());
        process::exit(self.exit_code());
    }
}

/// Initialize stderr logging for a check binary. With `debug` the filter
/// drops to debug level, mirroring the `-d` flag of the original plugins.
pub fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

/// Parse command line arguments, mapping usage errors to an UNKNOWN exit
/// instead of clap's default exit code 2 (which the scheduler would read
/// as CRITICAL). `--help` and `--version` keep their normal behavior.
pub fn parse_args<T: clap::Parser>() -> T {
    use clap::error::ErrorKind;

    match T::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("UNKNOWN: {}", e);
            process::exit(ServiceState::Unknown.exit_code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_exit_codes() {
        assert_eq!(ServiceState::Ok.exit_code(), 0);
        assert_eq!(ServiceState::Warning.exit_code(), 1);
        assert_eq!(ServiceState::Critical.exit_code(), 2);
        assert_eq!(ServiceState::Unknown.exit_code(), 3);

        assert_eq!(ServiceState::Ok.to_string(), "OK");
        assert_eq!(ServiceState::Warning.to_string(), "WARNING");
        assert_eq!(ServiceState::Critical.to_string(), "CRITICAL");
        assert_eq!(ServiceState::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn test_state_ordering() {
        assert!(ServiceState::Unknown < ServiceState::Ok);
        assert!(ServiceState::Ok < ServiceState::Warning);
        assert!(ServiceState::Warning < ServiceState::Critical);

        let worst = [ServiceState::Ok, ServiceState::Critical, ServiceState::Warning]
            .into_iter()
            .max();
        assert_eq!(worst, Some(ServiceState::Critical));
    }

    #[test]
    fn test_metric_perf_string() {
        let thresholds = Thresholds::new(15u32, 30).unwrap();
        let metric = Metric::new("test", 12u32)
            .with_thresholds(&thresholds)
            .with_bounds(Some(0), Some(100));
        assert_eq!(metric.perf_string(), "test=12;15;30;0;100");
        assert_eq!(metric.state(), Some(ServiceState::Ok));

        let metric = Metric::new("usage", 85u32)
            .with_thresholds(&thresholds)
            .with_unit(Unit::Percentage);
        assert_eq!(metric.perf_string(), "usage=85%;15;30");
        assert_eq!(metric.state(), Some(ServiceState::Critical));

        let metric = Metric::new("plain", 7u64);
        assert_eq!(metric.perf_string(), "plain=7");
        assert_eq!(metric.state(), None);
    }

    #[test]
    fn test_perf_label_sanitizing() {
        let cases = [
            ("test", "test=0"),
            ("test=a", "test_a=0"),
            ("te'st", "te''st=0"),
            ("te st", "'te st'=0"),
        ];
        for (label, expected) in cases {
            let metric = Metric::new(label, 0u32);
            assert_eq!(metric.perf_string(), expected);
        }
    }

    #[test]
    fn test_resource_output() {
        let thresholds = Thresholds::new(14u32, 20).unwrap();
        let resource = Resource::new("CPU")
            .with_description("All CPU usage are below thresholds")
            .with_result(Metric::new("cpu0", 12u32).with_thresholds(&thresholds));

        assert_eq!(
            resource.to_nagios_string(),
            "CPU OK: All CPU usage are below thresholds | cpu0=12;14;20"
        );
        assert_eq!(resource.exit_code(), 0);
    }

    #[test]
    fn test_resource_worst_state_wins() {
        let thresholds = Thresholds::new(10u32, 20).unwrap();
        let resource = Resource::new("CPU")
            .with_result(Metric::new("a", 5u32).with_thresholds(&thresholds))
            .with_result(Metric::new("b", 15u32).with_thresholds(&thresholds))
            .with_result(Metric::new("c", 25u32).with_thresholds(&thresholds));

        assert_eq!(resource.state(), ServiceState::Critical);
    }

    #[test]
    fn test_resource_explicit_state_and_details() {
        let mut resource = Resource::new("HSRP").with_state(ServiceState::Warning);
        resource.set_description("1 HSRP interface error !");
        resource.push_detail("** Vlan12 is in state standby (must be active) **");

        let out = resource.to_nagios_string();
        assert_eq!(
            out,
            "HSRP WARNING: 1 HSRP interface error !\n** Vlan12 is in state standby (must be active) **"
        );
    }

    #[test]
    fn test_resource_without_anything_is_unknown() {
        let resource = Resource::new("X");
        assert_eq!(resource.state(), ServiceState::Unknown);
    }
}
