//! Adapters to the external simulation engine.
//!
//! A [`Simulator`] turns one [`ParameterVector`] into [`Statistics`] with a
//! blocking call that may take minutes. The dispatcher runs every call on a
//! dedicated blocking thread, so implementations must be `Send + Sync` and
//! must not share mutable engine state between calls. Implementations never
//! retry; a fault is reported once as a [`SimulationError`].
//!
//! Plain closures implement the trait:
//!
//! ```
//! use facility_search::parameter::ParameterVector;
//! use facility_search::simulator::{SimulationError, Simulator};
//! use facility_search::statistics::Statistics;
//!
//! fn assert_simulator(_: &impl Simulator) {}
//!
//! let fake = |v: &ParameterVector| -> Result<Statistics, SimulationError> {
//!     Ok(Statistics {
//!         vessels_handled_qtt: v.values()[0] as f64,
//!         ..Statistics::default()
//!     })
//! };
//! assert_simulator(&fake);
//! ```

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::parameter::ParameterVector;
use crate::statistics::Statistics;

/// A fault raised by the simulation engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("simulation failed: {cause}")]
pub struct SimulationError {
    /// Human-readable description of the fault.
    pub cause: String,
}

impl SimulationError {
    #[must_use]
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Blocking adapter to the simulation engine.
pub trait Simulator: Send + Sync {
    /// Runs one simulation for `vector`.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationError`] when the engine fails.
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError>;
}

impl<F> Simulator for F
where
    F: Fn(&ParameterVector) -> Result<Statistics, SimulationError> + Send + Sync,
{
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError> {
        self(vector)
    }
}

/// Runs the engine as a fresh child process per evaluation.
///
/// The vector's named JSON record is written to the child's stdin; the child
/// must print a [`Statistics`] JSON document on stdout and exit with status
/// zero. Each call spawns its own process, so no engine state is ever shared
/// between concurrent evaluations.
#[derive(Clone, Debug)]
pub struct ProcessSimulator {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl ProcessSimulator {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends a command-line argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Simulator for ProcessSimulator {
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError> {
        let input = serde_json::to_vec(vector)
            .map_err(|e| SimulationError::new(format!("encoding parameters: {e}")))?;

        let mut child = self.command().spawn().map_err(|e| {
            SimulationError::new(format!("spawning {}: {e}", self.program.display()))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .map_err(|e| SimulationError::new(format!("writing parameters: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| SimulationError::new(format!("waiting for engine: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty());
            return Err(SimulationError::new(format!(
                "engine exited with {}: {}",
                output.status,
                last.unwrap_or("no diagnostic output")
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SimulationError::new(format!("parsing engine output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::parameter::{ParamSpec, ParameterSpace};

    fn vector() -> ParameterVector {
        let space = Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, 9).unwrap()]).unwrap());
        space.vector(vec![4]).unwrap()
    }

    #[test]
    fn closures_are_simulators() {
        let sim = |v: &ParameterVector| -> Result<Statistics, SimulationError> {
            #[allow(clippy::cast_precision_loss)]
            let x = v.values()[0] as f64;
            Ok(Statistics {
                income: x,
                ..Statistics::default()
            })
        };
        let boxed: Box<dyn Simulator> = Box::new(sim);
        let stats = boxed.simulate(&vector()).unwrap();
        assert!((stats.income - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_program_is_a_simulation_error() {
        let sim = ProcessSimulator::new("/nonexistent/facility-engine-binary");
        let err = sim.simulate(&vector()).unwrap_err();
        assert!(err.cause.contains("spawning"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn parses_child_stdout() {
        let sim = ProcessSimulator::new("sh").arg("-c").arg(
            "cat > /dev/null; echo '{\"vesselsHandledQtt\":5,\"primeCost\":1,\"medianHandlingTime\":3,\"medianAtTerminalTime\":1,\"income\":9,\"totalCosts\":2}'",
        );
        let stats = sim.simulate(&vector()).unwrap();
        assert!((stats.vessels_handled() - 5.0).abs() < f64::EPSILON);
        assert!((stats.profit() - 7.0).abs() < f64::EPSILON);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        let sim = ProcessSimulator::new("sh")
            .arg("-c")
            .arg("cat > /dev/null; echo 'array index out of range' >&2; exit 3");
        let err = sim.simulate(&vector()).unwrap_err();
        assert!(err.cause.contains("array index out of range"), "{err}");
    }
}
