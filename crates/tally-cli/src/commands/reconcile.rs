//! Batch reconciliation command
//!
//! Rows come from an already-tabular file: CSV with a header row, or JSON
//! (a list of rows, or `{"source": ..., "rows": [...]}`). With
//! `--interactive` every possible duplicate is put to the user before the
//! command exits; otherwise pending matches are only reported.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::Deserialize;
use tally_core::models::{
    Batch, BatchResult, CandidateRow, Confirmation, PendingMatch, ResolveOutcome,
};
use tally_core::{Database, LogSink, PendingStore, ReconcileConfig, Reconciler, Resolver};

use super::truncate;

/// JSON row files may carry their own source name
#[derive(Deserialize)]
#[serde(untagged)]
enum RowFile {
    Batch(Batch),
    Rows(Vec<CandidateRow>),
}

/// Load a batch from a CSV or JSON row file (chosen by extension)
pub fn load_batch(file: &Path) -> Result<Batch> {
    let handle =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let reader = BufReader::new(handle);

    let is_json = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        let parsed: RowFile = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse JSON rows: {}", file.display()))?;
        Ok(match parsed {
            RowFile::Batch(batch) => batch,
            RowFile::Rows(rows) => Batch::new(rows),
        })
    } else {
        let rows = parse_csv_rows(reader)
            .with_context(|| format!("Failed to parse CSV rows: {}", file.display()))?;
        Ok(Batch::new(rows))
    }
}

/// Column positions resolved from the CSV header
struct Columns {
    date: usize,
    description: usize,
    amount: usize,
    external_id: Option<usize>,
    category: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| anyhow::anyhow!("Missing '{}' column", names[0]))
        };

        Ok(Self {
            date: require(&["date", "transaction date"])?,
            description: require(&["description", "desc", "memo"])?,
            amount: require(&["amount"])?,
            external_id: find(&["external_id", "transaction_id", "id"]),
            category: find(&["category"]),
        })
    }
}

/// Parse CSV rows by header name; cells stay as text for the pipeline
pub fn parse_csv_rows<R: Read>(reader: R) -> Result<Vec<CandidateRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns = Columns::from_headers(rdr.headers()?)?;
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let cell = |idx: usize| record.get(idx).unwrap_or("").to_string();
        let optional = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        rows.push(CandidateRow {
            date: cell(columns.date),
            description: cell(columns.description),
            amount: cell(columns.amount),
            external_id: optional(columns.external_id),
            category: optional(columns.category),
        });
    }

    Ok(rows)
}

pub fn cmd_reconcile(
    db: &Database,
    config: &ReconcileConfig,
    file: &Path,
    source: Option<&str>,
    interactive: bool,
) -> Result<BatchResult> {
    let mut batch = load_batch(file)?;
    if let Some(name) = source {
        batch.source = Some(name.to_string());
    } else if batch.source.is_none() {
        batch.source = file.file_name().map(|n| n.to_string_lossy().into_owned());
    }

    println!(
        "📥 Reconciling {} row(s) from {}...",
        batch.rows.len(),
        file.display()
    );

    let sink = LogSink;
    let result = Reconciler::new(db, config)
        .with_sink(&sink)
        .reconcile(&batch)
        .context("Failed to reconcile batch")?;

    print_summary(&result);

    if !result.pending_matches.is_empty() {
        if interactive {
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let mut output = io::stdout();
            let summary =
                resolve_interactively(db, &result.pending_matches, &mut input, &mut output)?;
            println!();
            println!(
                "✅ Inserted {}, discarded {}, skipped {}",
                summary.inserted, summary.discarded, summary.skipped
            );
        } else {
            println!();
            println!("   Run again with --interactive to confirm or discard them.");
        }
    }

    Ok(result)
}

fn print_summary(result: &BatchResult) {
    println!();
    println!("📊 {}", result.message());
    println!("   ─────────────────────────────");
    println!("   New transactions:     {}", result.inserted_count);
    println!("   Already recorded:     {}", result.exact_duplicate_count);
    println!("   Previously discarded: {}", result.previously_discarded_count);
    println!("   Need confirmation:    {}", result.pending_count);
    println!("   Failed rows:          {}", result.failed_count);

    for report in result.rows.iter().filter(|r| r.detail.is_some()) {
        println!(
            "   ⚠️  Row {}: {}",
            report.index + 1,
            report.detail.as_deref().unwrap_or_default()
        );
    }
}

/// Tally of answers given in an interactive session
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InteractiveSummary {
    pub inserted: usize,
    pub discarded: usize,
    pub skipped: usize,
}

/// Ask about each pending match and apply the answers
///
/// End of input skips whatever is left; skipped matches come back the next
/// time the same rows are reconciled.
pub fn resolve_interactively<R: BufRead, W: Write>(
    db: &Database,
    pending: &[PendingMatch],
    input: &mut R,
    output: &mut W,
) -> Result<InteractiveSummary> {
    let store = PendingStore::default();
    store.add_all(pending.iter().cloned());
    let resolver = Resolver::new(db, &store);

    let mut summary = InteractiveSummary::default();
    let mut remaining = pending.len();

    for (i, pending_match) in pending.iter().enumerate() {
        writeln!(output)?;
        writeln!(
            output,
            "🔎 Possible duplicate {}/{} (similarity {:.0}%)",
            i + 1,
            pending.len(),
            pending_match.similarity * 100.0
        )?;
        let new = &pending_match.candidate;
        let old = &pending_match.existing_match;
        writeln!(
            output,
            "   new:      {}  {:>10}  {}",
            new.date,
            new.amount,
            truncate(&new.description, 50)
        )?;
        writeln!(
            output,
            "   recorded: {}  {:>10}  {}",
            old.date,
            old.amount,
            truncate(&old.description, 50)
        )?;

        let Some(answer) = prompt(input, output)? else {
            summary.skipped += remaining;
            break;
        };
        remaining -= 1;

        let confirmation = match answer {
            Answer::Insert => Confirmation::insert(pending_match),
            Answer::Discard => Confirmation::discard(pending_match),
            Answer::Skip => {
                summary.skipped += 1;
                continue;
            }
        };

        let resolution = resolver
            .resolve(&confirmation)
            .context("Failed to apply confirmation")?;
        match resolution.outcome {
            ResolveOutcome::Inserted => {
                summary.inserted += 1;
                writeln!(output, "   ➕ Inserted")?;
            }
            ResolveOutcome::AlreadyExists => {
                summary.skipped += 1;
                writeln!(output, "   Already in the ledger")?;
            }
            ResolveOutcome::Discarded => {
                summary.discarded += 1;
                writeln!(output, "   🗑️  Discarded")?;
            }
            ResolveOutcome::Invalid => {
                summary.skipped += 1;
                writeln!(
                    output,
                    "   ⚠️  Not applied: {}",
                    resolution.reason.as_deref().unwrap_or("invalid confirmation")
                )?;
            }
        }
    }

    Ok(summary)
}

enum Answer {
    Insert,
    Discard,
    Skip,
}

/// Read one answer, re-asking on unrecognized input; `None` at end of input
fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Option<Answer>> {
    loop {
        write!(output, "   Insert as new [i], discard as duplicate [d], or skip [s]? ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }

        match line.trim().to_ascii_lowercase().as_str() {
            "i" | "insert" => return Ok(Some(Answer::Insert)),
            "d" | "discard" => return Ok(Some(Answer::Discard)),
            "s" | "skip" | "" => return Ok(Some(Answer::Skip)),
            other => writeln!(output, "   Unrecognized answer '{}'", other)?,
        }
    }
}
