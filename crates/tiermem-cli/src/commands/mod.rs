pub mod config;
pub mod memory;
pub mod recall;
pub mod stats;

pub use config::ConfigCommand;
pub use memory::{ForgetCommand, ListCommand, RecentCommand, RememberCommand, ShowCommand};
pub use recall::RecallCommand;
pub use stats::{ExportCommand, MigrateCommand, StatsCommand};
