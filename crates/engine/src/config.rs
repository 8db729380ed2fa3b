use std::time::Duration;

const DEFAULT_MAX_CASCADE_DEPTH: usize = 32;
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Tuning knobs of a dialog session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Generations of cascading updates resolved for a single edit; deeper
    /// generations are dropped.
    pub max_cascade_depth: usize,

    /// Upper bound for a single backend call. `None` waits forever.
    pub backend_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
            backend_timeout: Some(DEFAULT_BACKEND_TIMEOUT),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DIALOG_MAX_CASCADE_DEPTH` and
    /// `DIALOG_BACKEND_TIMEOUT_MS` (`0` disables the timeout).
    pub fn from_env() -> Self {
        Self {
            max_cascade_depth: max_cascade_depth_from_env(),
            backend_timeout: backend_timeout_from_env(),
        }
    }
}

fn max_cascade_depth_from_env() -> usize {
    std::env::var("DIALOG_MAX_CASCADE_DEPTH")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_CASCADE_DEPTH)
        .clamp(1, 1024)
}

fn backend_timeout_from_env() -> Option<Duration> {
    match std::env::var("DIALOG_BACKEND_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => Some(DEFAULT_BACKEND_TIMEOUT),
    }
}
