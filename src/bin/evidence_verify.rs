//! evidence_verify - check the hash chain of a planting evidence log
//!
//! Every entry must link to its predecessor and hash to its stored value;
//! an edited, removed or reordered entry fails the check.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use planting_verifier::storage::verify_entries;
use planting_verifier::{EvidenceLog, SqliteEvidenceLog};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "evidence_verify",
    about = "Verify planting evidence log integrity (hash chain)"
)]
struct Args {
    /// Path to the evidence SQLite DB
    #[arg(long, default_value = "evidence.db")]
    db: PathBuf,

    /// Print every entry
    #[arg(short, long)]
    verbose: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui.parse()?,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    if !args.db.exists() {
        return Err(anyhow!("evidence log {} does not exist", args.db.display()));
    }
    let entries = {
        let _stage = ui.stage("Read evidence log");
        SqliteEvidenceLog::open(&args.db)?.entries()?
    };

    ui.note(&format!("{} entries read", entries.len()));
    println!("evidence_verify: checking {}", args.db.display());
    let count = {
        let _stage = ui.stage("Verify hash chain");
        verify_entries(&entries)?
    };

    if args.verbose {
        for entry in &entries {
            let record = entry.record()?;
            println!(
                "  #{} {} {} -> {} ({})",
                entry.id,
                entry.created_at,
                record.source,
                record.response.reason,
                hex::encode(entry.entry_hash)
            );
        }
    }

    match entries.last() {
        Some(last) => println!(
            "OK: {} entries verified, head {}",
            count,
            hex::encode(last.entry_hash)
        ),
        None => println!("OK: log is empty"),
    }
    Ok(())
}
