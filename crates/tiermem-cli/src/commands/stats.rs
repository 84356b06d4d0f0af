use clap::Parser;
use tiermem::MemoryManager;

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json};

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let stats = manager.stats().await?;

        match format {
            OutputFormat::Json => print_json(&stats)?,
            OutputFormat::Table => {
                println!("tiermem Statistics");
                println!("==================\n");

                let mut table = new_table(["Tier", "Count", "Capacity"]);
                table.add_row(["Hot", &stats.hot.to_string(), &stats.hot_capacity.to_string()]);
                table.add_row(["Warm", &stats.warm.to_string(), &stats.warm_capacity.to_string()]);
                table.add_row(["Cold", &stats.cold.to_string(), "unbounded"]);
                println!("{table}\n");

                println!("Total: {} records ({} indexed)", stats.total, stats.indexed);
                println!(
                    "Cache: {}/{} records, {} queries, hit ratio {:.1}%",
                    stats.cache.record_entries,
                    stats.cache.capacity,
                    stats.cache.query_entries,
                    stats.cache_hit_ratio * 100.0
                );
            }
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct MigrateCommand {}

impl MigrateCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let report = manager.run_migration().await?;

        match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => {
                if report.is_noop() {
                    println!("Nothing to migrate.");
                    return Ok(());
                }

                let mut table = new_table(["Step", "Records"]);
                table.add_row(["Promoted", &report.promoted.to_string()]);
                table.add_row(["Hot -> Warm", &report.demoted_to_warm.to_string()]);
                table.add_row(["Warm -> Cold", &report.demoted_to_cold.to_string()]);
                table.add_row(["Re-indexed", &report.reindexed.to_string()]);
                table.add_row(["Dropped from index", &report.removed_from_index.to_string()]);
                table.add_row(["Expired", &report.expired.to_string()]);
                println!("{table}");

                for failure in &report.failures {
                    eprintln!(
                        "Failed to move {} from {}: {}",
                        failure.id, failure.from, failure.error
                    );
                }
            }
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct ExportCommand {
    #[clap(long, short, help = "Output file (defaults to <data_dir>/export_<timestamp>.json)")]
    pub output: Option<std::path::PathBuf>,
}

impl ExportCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let path = manager.export(self.output.as_deref()).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "path": path.display().to_string(),
            }))?,
            OutputFormat::Table => println!("Exported records to {}", path.display()),
        }

        Ok(())
    }
}
