//! Workspace initialization utilities for tests

use assert_fs::TempDir;
use std::fs;

/// Create a temporary directory, removed on drop
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// A localhost port with nothing listening on it
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind probe port");
    listener
        .local_addr()
        .expect("Failed to read probe port")
        .port()
}

/// Initialize a Depot workspace whose backend is unreachable
///
/// Both the HTTP and the websocket URL point at a closed localhost port with
/// short timeouts, so commands behave as on an offline device.
///
/// # Example
///
/// ```rust
/// use depot_test_helpers::workspace::init_workspace;
///
/// let workspace = init_workspace();
/// assert!(workspace.path().join(".depot/config.toml").exists());
/// ```
pub fn init_workspace() -> TempDir {
    let port = unused_port();
    workspace_with_config(&format!(
        r#"
[remote]
base_url = "http://127.0.0.1:{port}"
timeout_ms = 500

[sync]
probe_timeout_ms = 200

[realtime]
url = "ws://127.0.0.1:{port}/ws"
base_delay_ms = 10
max_delay_ms = 20
max_attempts = 1
connect_timeout_ms = 200
"#,
        port = port
    ))
}

/// Create a workspace with `config` as its `.depot/config.toml`
pub fn workspace_with_config(config: &str) -> TempDir {
    let temp = temp_dir();
    let depot_dir = temp.path().join(".depot");
    fs::create_dir_all(&depot_dir).expect("Failed to create .depot directory");
    fs::write(depot_dir.join("config.toml"), config).expect("Failed to write config");
    temp
}
