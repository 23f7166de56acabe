pub mod cli;
pub mod scenario;

pub use cli::{build_cli_command, Cli, Commands};
pub use scenario::{ParamsFile, Scenario};
