//! Shared test utilities for Depot test suites
//!
//! # Modules
//!
//! - [`workspace`]: Temp workspaces with a `.depot/config.toml`
//! - [`cli`]: Command builders with pre-configured environments
//! - [`logging`]: Test logging configuration
//! - [`assertions`]: Domain-specific assertion helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use depot_test_helpers::prelude::*;
//!
//! let workspace = init_workspace();
//! depot_command()
//!     .current_dir(workspace.path())
//!     .arg("status")
//!     .assert()
//!     .success();
//! ```

pub mod assertions;
pub mod cli;
pub mod logging;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::cli::{command_for, depot_command};
    pub use crate::logging::{init_test_logging, suppress_logs};
    pub use crate::workspace::{
        init_workspace, temp_dir, unused_port, workspace_with_config,
    };
}
