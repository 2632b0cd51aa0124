//! Node supervisor for the desktop wallet
//!
//! Launches, monitors and recovers the external blockchain node and its
//! companion wallet backend as child processes. See [`node`] for the
//! supervisor itself and [`logging`] for the log4rs setup shared by the
//! host binary.

pub mod logging;
pub mod node;

pub use node::{NodeState, NodeSupervisor, SupervisorConfig, SupervisorError};

/// Expand environment variables and ~ in paths
/// Windows: %VAR% style
/// Unix: ~ expands to HOME
pub fn expand_path(path: &str) -> String {
    let mut result = path.to_string();

    #[cfg(windows)]
    {
        // Expand %VAR% style environment variables on Windows
        while let Some(start) = result.find('%') {
            if let Some(end) = result[start + 1..].find('%') {
                let var_name = &result[start + 1..start + 1 + end];
                if let Ok(value) = std::env::var(var_name) {
                    result = format!("{}{}{}", &result[..start], value, &result[start + 2 + end..]);
                } else {
                    break;
                }
            } else {
                break;
            }
        }
    }

    #[cfg(not(windows))]
    {
        if result.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                result = format!("{}{}", home.display(), &result[1..]);
            }
        } else if result == "~" {
            if let Some(home) = dirs::home_dir() {
                result = home.to_string_lossy().to_string();
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_plain_path_unchanged() {
        assert_eq!(expand_path("/var/lib/node"), "/var/lib/node");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_path("~/state");
            assert_eq!(expanded, format!("{}/state", home.display()));
        }
    }
}
