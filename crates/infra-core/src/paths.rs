use std::{env, path::PathBuf};

/// Resolves the runtime directory holding relay sockets.
pub fn default_runtime_dir() -> PathBuf {
    if let Some(override_dir) = env::var_os("INFRA_RUNTIME_DIR") {
        return PathBuf::from(override_dir);
    }

    if let Some(xdg) = env::var_os("XDG_RUNTIME_DIR") {
        return PathBuf::from(xdg).join("infra");
    }

    PathBuf::from("/tmp/infra")
}

/// Socket served to operators and the reconciliation side.
pub fn default_control_socket() -> PathBuf {
    default_runtime_dir().join("infrad.sock")
}

/// Socket external drivers connect back to.
pub fn default_driver_socket() -> PathBuf {
    default_runtime_dir().join("drivers.sock")
}
