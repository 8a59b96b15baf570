//! Environment overrides for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! Values set through builder methods after
//! [`with_env_overrides`](super::builder::RuntimeBuilder::with_env_overrides)
//! win over the environment; the environment wins over defaults.
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `FIBRA_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `FIBRA_THREAD_STACK_SIZE` | `usize` | `thread_stack_size` |
//! | `FIBRA_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `FIBRA_ENABLE_PARKING` | `bool` | `enable_parking` |
//! | `FIBRA_POLL_BUDGET` | `u32` | `poll_budget` |

use crate::runtime::config::RuntimeConfig;
use crate::tracing_compat::debug;
use crate::types::BuildError;

/// Worker thread count.
pub const ENV_WORKER_THREADS: &str = "FIBRA_WORKER_THREADS";
/// Worker and blocking thread stack size.
pub const ENV_THREAD_STACK_SIZE: &str = "FIBRA_THREAD_STACK_SIZE";
/// Worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "FIBRA_THREAD_NAME_PREFIX";
/// Idle-worker parking toggle.
pub const ENV_ENABLE_PARKING: &str = "FIBRA_ENABLE_PARKING";
/// Consecutive quanta for a self-waking fiber.
pub const ENV_POLL_BUDGET: &str = "FIBRA_POLL_BUDGET";

/// Applies every `FIBRA_*` variable that is set.
///
/// A variable that is set but cannot be parsed is an error; nothing is
/// partially applied past it.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), BuildError> {
    if let Some(val) = read_env(ENV_WORKER_THREADS) {
        config.worker_threads = parse_usize(ENV_WORKER_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_STACK_SIZE) {
        config.thread_stack_size = parse_usize(ENV_THREAD_STACK_SIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_ENABLE_PARKING) {
        config.enable_parking = parse_bool(ENV_ENABLE_PARKING, &val)?;
    }
    if let Some(val) = read_env(ENV_POLL_BUDGET) {
        config.poll_budget = parse_u32(ENV_POLL_BUDGET, &val)?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    debug!(var = name, value = %value, "runtime config override from environment");
    Some(value)
}

fn parse_usize(var: &str, val: &str) -> Result<usize, BuildError> {
    val.trim().parse::<usize>().map_err(|e| {
        BuildError::custom(format!(
            "invalid value for {var}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_u32(var: &str, val: &str) -> Result<u32, BuildError> {
    val.trim().parse::<u32>().map_err(|e| {
        BuildError::custom(format!(
            "invalid value for {var}: expected u32, got {val:?} ({e})"
        ))
    })
}

fn parse_bool(var: &str, val: &str) -> Result<bool, BuildError> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BuildError::custom(format!(
            "invalid value for {var}: expected bool (true/false/1/0/yes/no), got {val:?}"
        ))),
    }
}
