use std::fmt;

use crate::ServiceState;

/// Warning/critical bound pair.
///
/// The invariant `warn <= crit` is enforced at construction; a violating
/// pair is a configuration error and must surface before any SNMP traffic.
/// Classification follows one consistent convention across all checkers:
/// `v < warn` is OK, `warn <= v < crit` is WARNING, `v >= crit` is
/// CRITICAL. With `warn == crit` the warning band is empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds<T> {
    warn: T,
    crit: T,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ThresholdsError {
    #[error("warning threshold cannot be above critical")]
    WarnAboveCrit,
}

impl<T> Thresholds<T>
where
    T: PartialOrd + Copy,
{
    pub fn new(warn: T, crit: T) -> Result<Self, ThresholdsError> {
        if warn > crit {
            return Err(ThresholdsError::WarnAboveCrit);
        }
        Ok(Thresholds { warn, crit })
    }

    pub fn warning(&self) -> T {
        self.warn
    }

    pub fn critical(&self) -> T {
        self.crit
    }

    pub fn classify(&self, value: T) -> ServiceState {
        if value >= self.crit {
            ServiceState::Critical
        } else if value >= self.warn {
            ServiceState::Warning
        } else {
            ServiceState::Ok
        }
    }
}

impl<T: fmt::Display> fmt::Display for Thresholds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.warn, self.crit)
    }
}

/// Per-band item counts for a check that classifies many values.
///
/// The overall state is the worst band with at least one member; a check
/// with zero recorded items has nothing to say and must decide UNKNOWN
/// itself before asking for an overall state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandTally {
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
}

impl BandTally {
    pub fn record(&mut self, state: ServiceState) {
        match state {
            ServiceState::Ok => self.ok += 1,
            ServiceState::Warning => self.warning += 1,
            ServiceState::Critical => self.critical += 1,
            ServiceState::Unknown => {}
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.warning + self.critical
    }

    /// Items outside the OK band.
    pub fn errors(&self) -> usize {
        self.warning + self.critical
    }

    pub fn overall(&self) -> ServiceState {
        if self.critical > 0 {
            ServiceState::Critical
        } else if self.warning > 0 {
            ServiceState::Warning
        } else {
            ServiceState::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_bands() {
        let t = Thresholds::new(80u32, 90).unwrap();
        assert_eq!(t.classify(0), ServiceState::Ok);
        assert_eq!(t.classify(79), ServiceState::Ok);
        assert_eq!(t.classify(80), ServiceState::Warning);
        assert_eq!(t.classify(89), ServiceState::Warning);
        assert_eq!(t.classify(90), ServiceState::Critical);
        assert_eq!(t.classify(200), ServiceState::Critical);
    }

    #[test]
    fn test_equal_bounds_have_empty_warning_band() {
        let t = Thresholds::new(50u64, 50).unwrap();
        assert_eq!(t.classify(49), ServiceState::Ok);
        assert_eq!(t.classify(50), ServiceState::Critical);
        assert_eq!(t.classify(51), ServiceState::Critical);
    }

    #[test]
    fn test_warn_above_crit_is_rejected() {
        assert_eq!(
            Thresholds::new(90u32, 80).unwrap_err(),
            ThresholdsError::WarnAboveCrit
        );
    }

    #[test]
    fn test_tally_worst_band_wins() {
        let t = Thresholds::new(80u32, 90).unwrap();
        let mut tally = BandTally::default();
        for value in [70, 85, 95] {
            tally.record(t.classify(value));
        }
        assert_eq!(tally.ok, 1);
        assert_eq!(tally.warning, 1);
        assert_eq!(tally.critical, 1);
        assert_eq!(tally.errors(), 2);
        assert_eq!(tally.overall(), ServiceState::Critical);
    }

    #[test]
    fn test_tally_all_ok() {
        let mut tally = BandTally::default();
        tally.record(ServiceState::Ok);
        tally.record(ServiceState::Ok);
        assert_eq!(tally.overall(), ServiceState::Ok);
        assert_eq!(tally.errors(), 0);
    }
}
