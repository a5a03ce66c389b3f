//! CLI command implementations

pub mod args;
pub mod context;
pub mod error;
pub mod login;
pub mod populate;
pub mod reset;
pub mod stats;

pub use args::{Cli, Commands, OutputFormat};
pub use context::AppContext;
pub use error::CliError;
pub use login::LoginArgs;
pub use populate::PopulateArgs;
pub use reset::ResetArgs;
pub use stats::StatsArgs;
