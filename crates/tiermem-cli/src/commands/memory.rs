use clap::Parser;
use tiermem::{MemoryManager, NewRecord, RecordKind, Tier};
use uuid::Uuid;

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, print_json, record_json, records_table};

fn parse_id(id: &str) -> CliResult<Uuid> {
    Ok(Uuid::parse_str(id).map_err(|e| format!("Invalid UUID format: {e}"))?)
}

fn parse_metadata(pairs: &[String]) -> CliResult<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| CliError::from(format!("Metadata must be key=value, got '{pair}'")))
        })
        .collect()
}

#[derive(Parser)]
pub struct RememberCommand {
    #[clap(help = "Text to remember")]
    pub text: String,

    #[clap(
        long,
        short,
        default_value = "interaction",
        help = "Record kind (interaction, document_chunk, or a custom name)"
    )]
    pub kind: String,

    #[clap(long = "meta", short, help = "Metadata entry as key=value (repeatable)")]
    pub metadata: Vec<String>,
}

impl RememberCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let kind: RecordKind = self.kind.parse()?;
        // naming a custom kind on the command line is its registration
        if let RecordKind::Custom(name) = &kind {
            manager.register_kind(name)?;
        }

        let mut new = NewRecord::new(self.text.clone(), kind);
        for (key, value) in parse_metadata(&self.metadata)? {
            new = new.with_metadata(key, value);
        }

        let id = manager.remember_with(new).await?;

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "id": id.to_string(),
                "created": true,
            }))?,
            OutputFormat::Table => {
                println!("Record created successfully.");
                println!("ID: {id}");
            }
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct ForgetCommand {
    #[clap(help = "Record ID to delete (UUID format)")]
    pub id: String,
}

impl ForgetCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let id = parse_id(&self.id)?;

        let deleted = match manager.forget(id).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };

        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "id": self.id,
                "deleted": deleted,
            }))?,
            OutputFormat::Table => {
                if deleted {
                    println!("Record {} deleted successfully.", self.id);
                } else {
                    println!("Record {} not found.", self.id);
                }
            }
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct ShowCommand {
    #[clap(help = "Record ID (UUID format)")]
    pub id: String,
}

impl ShowCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let id = parse_id(&self.id)?;
        let record = manager
            .get(id)
            .await?
            .ok_or_else(|| format!("Record not found: {}", self.id))?;

        match format {
            OutputFormat::Json => print_json(&record_json(&record))?,
            OutputFormat::Table => {
                let mut table = crate::output::new_table(["Property", "Value"]);
                table.add_row(["ID", &record.id.to_string()]);
                table.add_row(["Text", &record.text]);
                table.add_row(["Kind", record.kind.as_str()]);
                table.add_row(["Tier", record.tier.as_str()]);
                table.add_row(["Created", &record.created_at.to_rfc3339()]);
                table.add_row(["Last Accessed", &record.last_accessed.to_rfc3339()]);
                table.add_row(["Access Count", &record.access_count.to_string()]);
                for (key, value) in &record.metadata {
                    table.add_row([format!("meta.{key}").as_str(), value]);
                }
                table.add_row(["Embedding Size", &record.embedding.len().to_string()]);

                println!("{table}");
            }
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct ListCommand {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of records to display"
    )]
    pub limit: usize,

    #[clap(long, short, help = "Only records in this tier (hot, warm, cold)")]
    pub tier: Option<String>,
}

impl ListCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        let tier = self.tier.as_deref().map(str::parse::<Tier>).transpose()?;
        let records = manager.list(tier, self.limit).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = records.iter().map(record_json).collect();
                print_json(&output)?;
            }
            OutputFormat::Table => {
                if records.is_empty() {
                    println!("No records found.");
                    return Ok(());
                }
                println!("{}", records_table(&records));
                println!("\nTotal: {} records", records.len());
            }
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct RecentCommand {
    #[clap(long, short, default_value = "10", help = "Number of records")]
    pub limit: usize,

    #[clap(long, short, help = "Only records of this kind")]
    pub kind: Option<String>,

    #[clap(long, help = "Print interactions as a User/AI transcript")]
    pub history: bool,

    #[clap(long, requires = "history", help = "Only interactions of this agent role")]
    pub agent_type: Option<String>,
}

impl RecentCommand {
    pub async fn execute(&self, manager: &MemoryManager, format: OutputFormat) -> CliResult<()> {
        if self.history {
            let transcript = manager
                .recent_history(self.limit, self.agent_type.as_deref())
                .await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "history": transcript }))?,
                OutputFormat::Table => print!("{transcript}"),
            }
            return Ok(());
        }

        let kind = self.kind.as_deref().map(str::parse::<RecordKind>).transpose()?;
        let records = manager.recent(self.limit, kind.as_ref()).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = records.iter().map(record_json).collect();
                print_json(&output)?;
            }
            OutputFormat::Table => {
                if records.is_empty() {
                    println!("No records found.");
                } else {
                    println!("{}", records_table(&records));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        let pairs = vec!["source = handbook.pdf".to_string(), "page=3".to_string()];
        assert_eq!(
            parse_metadata(&pairs).unwrap(),
            vec![
                ("source".to_string(), "handbook.pdf".to_string()),
                ("page".to_string(), "3".to_string())
            ]
        );
        assert!(parse_metadata(&["novalue".to_string()]).is_err());
        assert!(parse_metadata(&["=x".to_string()]).is_err());
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
