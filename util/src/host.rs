//! Host platform utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{env, path::PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable holding the root directory of the software checkout.
pub const SW_ROOT_ENV: &str = "SPRAYBOT_SW_ROOT";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable ({}) is not set", SW_ROOT_ENV)]
    SwRootNotSet,

    #[error("The software root {0:?} is not a directory")]
    SwRootInvalid(PathBuf),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the root directory of the software, which contains the `params`
/// directory and under which sessions and data are stored.
pub fn get_sw_root() -> Result<PathBuf, HostError> {
    let root = match env::var_os(SW_ROOT_ENV) {
        Some(r) => PathBuf::from(r),
        None => return Err(HostError::SwRootNotSet),
    };

    if !root.is_dir() {
        return Err(HostError::SwRootInvalid(root));
    }

    Ok(root)
}

/// Resolve a path from a parameter file against the software root.
///
/// Absolute paths are returned unchanged.
pub fn resolve_path(path: &str) -> Result<PathBuf, HostError> {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        return Ok(p);
    }

    Ok(get_sw_root()?.join(p))
}
