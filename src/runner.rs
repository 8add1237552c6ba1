use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::process;

use crate::{Resource, ServiceState};

/// Runs a check body and guarantees a Nagios-compliant outcome.
///
/// An `Err` from the body is printed as `<STATE>: <error>` and the process
/// exits with that state (Unknown unless overridden, since a check that
/// could not gather data has nothing to alert on). A panic inside the body
/// is caught and reported the same way — the scheduler depends on every
/// invocation producing an output line and one of the four exit codes.
pub struct Runner<E> {
    error_state: ServiceState,
    on_error: Option<Box<dyn FnOnce(&E) -> ServiceState>>,
}

impl<E: Display> Runner<E> {
    pub fn new() -> Self {
        Self {
            error_state: ServiceState::Unknown,
            on_error: None,
        }
    }

    /// Exit with this state on error instead of Unknown.
    pub fn with_error_state(mut self, state: ServiceState) -> Self {
        self.error_state = state;
        self
    }

    /// Decide the exit state per error.
    pub fn on_error(mut self, f: impl FnOnce(&E) -> ServiceState + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn safe_run(self, f: impl FnOnce() -> Result<Resource, E>) -> RunnerResult<E> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(resource)) => RunnerResult::Ok(resource),
            Ok(Err(err)) => {
                let state = match self.on_error {
                    Some(f) => f(&err),
                    None => self.error_state,
                };
                RunnerResult::Err(state, err)
            }
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unexpected internal error".to_string());
                RunnerResult::Fault(msg)
            }
        }
    }
}

impl<E: Display> Default for Runner<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a check body, exiting with `error_state` if it fails.
pub fn safe_run<E: Display>(
    f: impl FnOnce() -> Result<Resource, E>,
    error_state: ServiceState,
) -> RunnerResult<E> {
    Runner::new().with_error_state(error_state).safe_run(f)
}

pub enum RunnerResult<E> {
    Ok(Resource),
    Err(ServiceState, E),
    Fault(String),
}

impl<E: Display> RunnerResult<E> {
    pub fn print_and_exit(self) -> ! {
        match self {
            RunnerResult::Ok(resource) => resource.print_and_exit(),
            RunnerResult::Err(state, err) => {
                println!("{}: {:#}", state, err);
                process::exit(state.exit_code());
            }
            RunnerResult::Fault(msg) => {
                println!("{}: internal error: {}", ServiceState::Unknown, msg);
                process::exit(ServiceState::Unknown.exit_code());
            }
        }
    }
}
