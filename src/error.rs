/// Errors raised while building a simulation.
///
/// Construction is the only place configuration is validated; once a
/// component is built its configuration is immutable and these can no
/// longer occur.
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// The value that was rejected, rendered for display.
    pub entered: String,
    /// The configuration field the value was given for.
    pub field: &'static str,
    /// Description of the accepted values.
    pub expected: String,
}

impl ConfigError {
    pub fn new(entered: impl std::fmt::Display, field: &'static str, expected: impl Into<String>) -> Self {
        Self {
            entered: entered.to_string(),
            field,
            expected: expected.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' is an invalid input for {}, use any of the following: {}",
            self.entered, self.field, self.expected
        )
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised while a simulation is running.
#[derive(Debug, Clone)]
pub enum SimError {
    /// A code path that should be unreachable given the coordination
    /// protocol's invariants was reached. The run is aborted; continuing
    /// would mean the pipeline state is no longer trustworthy.
    Invariant(String),
}

impl SimError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        SimError::Invariant(msg.into())
    }
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::Invariant(msg) => write!(f, "invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}
