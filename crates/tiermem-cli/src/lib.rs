pub mod commands;
pub mod error;
pub mod output;

pub use commands::{
    ConfigCommand, ExportCommand, ForgetCommand, ListCommand, MigrateCommand, RecallCommand,
    RecentCommand, RememberCommand, ShowCommand, StatsCommand,
};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, truncate_string};
