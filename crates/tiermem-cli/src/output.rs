use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use tiermem::Record;

use crate::error::CliResult;

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Shorten to at most `max_len` characters, ending in "..." when cut
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn new_table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Record fields for `--json` output; the embedding is reduced to its size
pub fn record_json(record: &Record) -> serde_json::Value {
    serde_json::json!({
        "id": record.id.to_string(),
        "text": &record.text,
        "kind": record.kind.as_str(),
        "tier": record.tier.as_str(),
        "access_count": record.access_count,
        "created_at": record.created_at.to_rfc3339(),
        "last_accessed": record.last_accessed.to_rfc3339(),
        "metadata": &record.metadata,
        "embedding_size": record.embedding.len(),
    })
}

pub fn records_table(records: &[Record]) -> Table {
    let mut table = new_table(["ID", "Text", "Kind", "Tier", "Accesses", "Created"]);
    for record in records {
        table.add_row([
            truncate_string(&record.id.to_string(), 8),
            truncate_string(&record.text, 50),
            record.kind.to_string(),
            record.tier.to_string(),
            record.access_count.to_string(),
            format_timestamp(&record.created_at),
        ]);
    }
    table
}
