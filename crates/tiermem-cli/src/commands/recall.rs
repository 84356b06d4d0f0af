use clap::{Parser, ValueEnum};
use tiermem::index::TierScope;
use tiermem::{MemoryManager, RecallRequest};

use crate::error::CliResult;
use crate::output::{OutputFormat, new_table, print_json, record_json, truncate_string};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ScopeArg {
    Hot,
    #[default]
    HotWarm,
    All,
}

impl From<ScopeArg> for TierScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Hot => TierScope::Hot,
            ScopeArg::HotWarm => TierScope::HotWarm,
            ScopeArg::All => TierScope::All,
        }
    }
}

#[derive(Parser)]
pub struct RecallCommand {
    #[clap(help = "Query text")]
    pub query: String,

    #[clap(short, help = "Maximum number of results (defaults to retrieval.default_k)")]
    pub k: Option<usize>,

    #[clap(
        long,
        short = 'r',
        default_value = "0.0",
        help = "Weight of recency against similarity, 0.0 to 1.0"
    )]
    pub recency_bias: f32,

    #[clap(long, short, value_enum, default_value_t, help = "Tiers to search")]
    pub scope: ScopeArg,

    #[clap(long, help = "Deadline for the Cold scan in milliseconds")]
    pub timeout_ms: Option<u64>,
}

impl RecallCommand {
    pub fn request(&self) -> RecallRequest {
        let mut request = RecallRequest::new(self.query.clone())
            .recency_bias(self.recency_bias)
            .scope(self.scope.into());
        if let Some(k) = self.k {
            request = request.k(k);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            request = request.timeout_ms(timeout_ms);
        }
        request
    }

    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let recall = manager.recall_with(self.request()).await;

        match format {
            OutputFormat::Json => {
                let records: Vec<_> = recall
                    .records
                    .iter()
                    .map(|r| {
                        let mut value = record_json(&r.record);
                        value["similarity"] = r.similarity.into();
                        value["score"] = r.score.into();
                        value
                    })
                    .collect();
                print_json(&serde_json::json!({
                    "records": records,
                    "from_cache": recall.from_cache,
                    "partial": recall.partial,
                    "degraded": recall.degraded,
                }))?;
            }
            OutputFormat::Table => {
                if recall.degraded {
                    eprintln!("Warning: a backend failed, results may be incomplete.");
                }
                if recall.partial {
                    eprintln!("Warning: Cold scan timed out, results cover Hot and Warm only.");
                }
                if recall.is_empty() {
                    println!("No matching records.");
                    return Ok(());
                }

                let mut table = new_table(["ID", "Text", "Tier", "Similarity", "Score"]);
                for r in &recall.records {
                    table.add_row([
                        truncate_string(&r.record.id.to_string(), 8),
                        truncate_string(&r.record.text, 60),
                        r.record.tier.to_string(),
                        format!("{:.3}", r.similarity),
                        format!("{:.3}", r.score),
                    ]);
                }
                println!("{table}");
            }
        }

        Ok(())
    }
}
