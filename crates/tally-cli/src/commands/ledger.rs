//! Read-only ledger listings

use anyhow::{Context, Result};
use tally_core::Database;

use super::truncate;

pub fn cmd_recent(db: &Database, count: usize) -> Result<()> {
    let records = db
        .list_recent(count.max(1))
        .context("Failed to list recent transactions")?;

    if records.is_empty() {
        println!("No transactions recorded yet.");
        return Ok(());
    }

    println!("🧾 Recent transactions");
    println!();
    println!(
        "   {:10}  {:>12}  {:40}  {:12}",
        "Date", "Amount", "Description", "Category"
    );
    println!("   {}", "─".repeat(80));
    for record in &records {
        println!(
            "   {:10}  {:>12}  {:40}  {:12}",
            record.date,
            record.amount,
            truncate(&record.description, 40),
            record.category.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!(
        "   {} of {} transaction(s)",
        records.len(),
        db.count_transactions()?
    );

    Ok(())
}

pub fn cmd_batches(db: &Database, limit: usize) -> Result<()> {
    let batches = db
        .list_batches(limit.max(1))
        .context("Failed to list batches")?;

    if batches.is_empty() {
        println!("No batches reconciled yet.");
        return Ok(());
    }

    println!("📦 Batch history");
    println!();
    println!(
        "   {:>5}  {:19}  {:24}  {:21}  {:>5}  {:>4}  {:>4}  {:>4}  {:>4}",
        "ID", "Started", "Source", "Status", "Rows", "New", "Pend", "Dup", "Fail"
    );
    println!("   {}", "─".repeat(104));
    for batch in &batches {
        println!(
            "   {:>5}  {:19}  {:24}  {:21}  {:>5}  {:>4}  {:>4}  {:>4}  {:>4}",
            batch.id,
            batch.started_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(batch.source.as_deref().unwrap_or("-"), 24),
            batch.status.as_str(),
            batch.row_count,
            batch.inserted_count,
            batch.pending_count,
            batch.exact_duplicate_count + batch.previously_discarded_count,
            batch.failed_count
        );
    }

    Ok(())
}

pub fn cmd_discards(db: &Database, limit: usize) -> Result<()> {
    let entries = db
        .list_discards(limit.max(1))
        .context("Failed to list discards")?;

    if entries.is_empty() {
        println!("No discard decisions recorded.");
        return Ok(());
    }

    println!("🗑️  Discarded candidates");
    println!();
    for entry in &entries {
        println!(
            "   {}  {}  (kept {})",
            entry.decided_at.format("%Y-%m-%d %H:%M"),
            truncate(&entry.candidate_fingerprint, 16),
            truncate(&entry.existing_fingerprint, 16)
        );
    }

    Ok(())
}
