//! CLI command: `densex usage`
//!
//! Replays the usage log and prints the running total of every service.

use anyhow::Context;
use densex_core::{UsageLedger, UsageSnapshot};

/// Run the usage subcommand.
pub async fn run(json: bool) -> anyhow::Result<()> {
    let config = crate::server::load_config().context("Failed to load configuration")?;
    let ledger_config = config.monitor.ledger_config();
    let ledger = UsageLedger::open(&ledger_config)
        .await
        .with_context(|| format!("Failed to read {}", ledger_config.log_path.display()))?;
    let snapshot = ledger.snapshot().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_table(&snapshot));
    }
    Ok(())
}

fn render_table(snapshot: &UsageSnapshot) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str("  Service Usage\n");
    out.push_str(&format!("  {}\n", "-".repeat(44)));
    out.push_str(&format!("  {:<24} {:>12}\n", "Service", "Total"));
    out.push_str(&format!("  {}\n", "-".repeat(44)));

    if snapshot.totals.is_empty() {
        out.push_str("  (no usage recorded yet)\n");
    } else {
        for (service, total) in &snapshot.totals {
            let warn = if *total >= snapshot.alert_limit { " !!" } else { "" };
            out.push_str(&format!("  {:<24} {:>12.4}{}\n", service, total, warn));
        }
    }

    out.push_str(&format!("  {}\n", "-".repeat(44)));
    out.push_str(&format!("  Alert limit: ${:.2}\n\n", snapshot.alert_limit));
    out
}
