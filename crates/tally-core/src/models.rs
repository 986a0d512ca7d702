//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// A row as delivered by the row source (spreadsheet parser, CSV/JSON file)
///
/// Fields are kept as text until fingerprinting normalizes them, so that an
/// unparseable date or amount becomes a per-row failure instead of a
/// deserialization error for the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub date: String,
    pub description: String,
    #[serde(deserialize_with = "text_or_number")]
    pub amount: String,
    /// Bank-provided transaction identifier, if the source has one
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl CandidateRow {
    pub fn new(date: &str, description: &str, amount: &str) -> Self {
        Self {
            date: date.to_string(),
            description: description.to_string(),
            amount: amount.to_string(),
            external_id: None,
            category: None,
        }
    }

    pub fn with_external_id(mut self, external_id: &str) -> Self {
        self.external_id = Some(external_id.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

/// Accept both `"12.50"` and `12.5` for amounts (JSON numbers, CSV cells)
fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Cell::deserialize(deserializer)? {
        Cell::Text(s) => s,
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => f.to_string(),
    })
}

/// A row after normalization, identified by its fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub fingerprint: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub category: Option<String>,
    pub external_id: Option<String>,
}

impl Candidate {
    /// Whether the fingerprint came from a bank identifier rather than content
    pub fn has_external_id(&self) -> bool {
        self.external_id.is_some()
    }

    /// Turn the candidate into a ledger record admitted at `processed_at`
    pub fn into_record(self, processed_at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            fingerprint: self.fingerprint,
            date: self.date,
            description: self.description,
            amount: self.amount,
            category: self.category,
            external_id: self.external_id,
            processed_at,
        }
    }
}

/// A confirmed transaction in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub fingerprint: String,
    pub date: NaiveDate,
    pub description: String,
    /// Negative = expense, positive = income
    pub amount: Decimal,
    pub category: Option<String>,
    pub external_id: Option<String>,
    /// When the record was admitted into the ledger
    pub processed_at: DateTime<Utc>,
}

/// A discard decision: the candidate was judged a duplicate of an existing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardEntry {
    pub candidate_fingerprint: String,
    pub existing_fingerprint: String,
    pub decided_at: DateTime<Utc>,
}

/// A near-duplicate awaiting a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMatch {
    pub candidate: Candidate,
    pub existing_match: TransactionRecord,
    /// Description similarity in [0, 1]
    pub similarity: f64,
    pub detected_at: DateTime<Utc>,
}

/// Classification of a single row by the reconciliation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Inserted,
    PendingConfirmation,
    ExactDuplicate,
    PreviouslyDiscarded,
    Failed,
}

impl RowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::PendingConfirmation => "pending_confirmation",
            Self::ExactDuplicate => "exact_duplicate",
            Self::PreviouslyDiscarded => "previously_discarded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-row report within a batch result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowReport {
    /// Zero-based position of the row in the batch
    pub index: usize,
    /// Absent when the row could not be fingerprinted
    pub fingerprint: Option<String>,
    pub outcome: RowOutcome,
    /// Error text for failed rows
    pub detail: Option<String>,
}

/// Overall status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Recorded while the batch is still being processed
    #[default]
    Running,
    Success,
    Warning,
    ConfirmationRequired,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::ConfirmationRequired => "confirmation_required",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "confirmation_required" => Ok(Self::ConfirmationRequired),
            _ => Err(format!("Unknown batch status: {}", s)),
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A batch of rows to reconcile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Where the rows came from (e.g. the uploaded file name)
    #[serde(default)]
    pub source: Option<String>,
    pub rows: Vec<CandidateRow>,
}

impl Batch {
    pub fn new(rows: Vec<CandidateRow>) -> Self {
        Self { source: None, rows }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

/// Outcome of reconciling one batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    /// Batch history id, when the batch was recorded
    pub batch_id: Option<i64>,
    pub source: Option<String>,
    pub inserted_count: usize,
    pub pending_count: usize,
    pub exact_duplicate_count: usize,
    pub previously_discarded_count: usize,
    pub failed_count: usize,
    pub pending_matches: Vec<PendingMatch>,
    /// Records admitted by this batch, in input order
    pub inserted: Vec<TransactionRecord>,
    pub rows: Vec<RowReport>,
}

impl BatchResult {
    /// Count a row outcome and keep its report
    pub(crate) fn record(&mut self, report: RowReport) {
        match report.outcome {
            RowOutcome::Inserted => self.inserted_count += 1,
            RowOutcome::PendingConfirmation => self.pending_count += 1,
            RowOutcome::ExactDuplicate => self.exact_duplicate_count += 1,
            RowOutcome::PreviouslyDiscarded => self.previously_discarded_count += 1,
            RowOutcome::Failed => self.failed_count += 1,
        }
        self.rows.push(report);
    }

    /// Number of classified rows
    pub fn total(&self) -> usize {
        self.inserted_count
            + self.pending_count
            + self.exact_duplicate_count
            + self.previously_discarded_count
            + self.failed_count
    }

    /// Pending items dominate because they block completion of the batch;
    /// failures come next.
    pub fn status(&self) -> BatchStatus {
        if self.pending_count > 0 {
            BatchStatus::ConfirmationRequired
        } else if self.failed_count > 0 {
            BatchStatus::Warning
        } else {
            BatchStatus::Success
        }
    }

    /// Human-readable summary for transport layers
    pub fn message(&self) -> String {
        let name = self.source.as_deref().unwrap_or("batch");

        if self.total() == 0 {
            return format!("Processed '{}': no rows to reconcile.", name);
        }

        let mut message = if self.inserted_count == 0
            && self.failed_count == 0
            && self.pending_count == 0
        {
            format!(
                "Processed '{}': no new transactions (all already recorded).",
                name
            )
        } else {
            format!(
                "Processed '{}': {} new transaction(s) added.",
                name, self.inserted_count
            )
        };

        if self.failed_count > 0 {
            message.push_str(&format!(
                " {} row(s) with errors were skipped.",
                self.failed_count
            ));
        }
        if self.pending_count > 0 {
            message.push_str(&format!(
                " {} possible duplicate(s) need confirmation.",
                self.pending_count
            ));
        }
        message
    }
}

/// A row of the batch history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: i64,
    pub source: Option<String>,
    pub status: BatchStatus,
    pub row_count: i64,
    pub inserted_count: i64,
    pub pending_count: i64,
    pub exact_duplicate_count: i64,
    pub previously_discarded_count: i64,
    pub failed_count: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Human decision for a pending candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmAction {
    /// Not a duplicate: admit the candidate into the ledger
    Insert,
    /// A duplicate: remember the decision so it is never asked again
    Discard,
}

impl ConfirmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Discard => "discard",
        }
    }
}

impl std::str::FromStr for ConfirmAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "discard" => Ok(Self::Discard),
            _ => Err(format!("Unknown confirmation action: {}", s)),
        }
    }
}

impl std::fmt::Display for ConfirmAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Candidate fields needed to insert a confirmed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDetails {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl From<&Candidate> for CandidateDetails {
    fn from(candidate: &Candidate) -> Self {
        Self {
            date: candidate.date,
            description: candidate.description.clone(),
            amount: candidate.amount,
            category: candidate.category.clone(),
            external_id: candidate.external_id.clone(),
        }
    }
}

/// A decision presented by the session layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub candidate_fingerprint: String,
    pub action: ConfirmAction,
    /// Required when `action` is insert
    #[serde(default)]
    pub candidate: Option<CandidateDetails>,
    /// Required when `action` is discard
    #[serde(default)]
    pub existing_fingerprint: Option<String>,
}

impl Confirmation {
    /// Build the confirmation that accepts a pending match as a new record
    pub fn insert(pending: &PendingMatch) -> Self {
        Self {
            candidate_fingerprint: pending.candidate.fingerprint.clone(),
            action: ConfirmAction::Insert,
            candidate: Some(CandidateDetails::from(&pending.candidate)),
            existing_fingerprint: None,
        }
    }

    /// Build the confirmation that rejects a pending match as a duplicate
    pub fn discard(pending: &PendingMatch) -> Self {
        Self {
            candidate_fingerprint: pending.candidate.fingerprint.clone(),
            action: ConfirmAction::Discard,
            candidate: None,
            existing_fingerprint: Some(pending.existing_match.fingerprint.clone()),
        }
    }
}

/// Terminal state reached by a confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Inserted,
    Discarded,
    AlreadyExists,
    Invalid,
}

impl ResolveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Discarded => "discarded",
            Self::AlreadyExists => "already_exists",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for ResolveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of applying a confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: ResolveOutcome,
    /// Why the confirmation was rejected, for `Invalid`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Resolution {
    pub fn new(outcome: ResolveOutcome) -> Self {
        Self {
            outcome,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            outcome: ResolveOutcome::Invalid,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcome: RowOutcome) -> RowReport {
        RowReport {
            index: 0,
            fingerprint: None,
            outcome,
            detail: None,
        }
    }

    #[test]
    fn test_batch_status_precedence() {
        let mut result = BatchResult::default();
        assert_eq!(result.status(), BatchStatus::Success);

        result.record(report(RowOutcome::Failed));
        assert_eq!(result.status(), BatchStatus::Warning);

        result.record(report(RowOutcome::PendingConfirmation));
        assert_eq!(result.status(), BatchStatus::ConfirmationRequired);
        assert_eq!(result.total(), 2);
    }

    #[test]
    fn test_batch_message() {
        let mut result = BatchResult {
            source: Some("march.xlsx".to_string()),
            ..Default::default()
        };
        assert!(result.message().contains("no rows"));

        result.record(report(RowOutcome::ExactDuplicate));
        assert!(result.message().contains("already recorded"));

        result.record(report(RowOutcome::Inserted));
        result.record(report(RowOutcome::Failed));
        let message = result.message();
        assert!(message.contains("1 new transaction"));
        assert!(message.contains("1 row(s) with errors"));
    }

    #[test]
    fn test_candidate_row_amount_accepts_numbers() {
        let row: CandidateRow = serde_json::from_str(
            r#"{"date": "2024-03-01", "description": "Coffee", "amount": -3.5}"#,
        )
        .unwrap();
        assert_eq!(row.amount, "-3.5");
        assert!(row.external_id.is_none());

        let row: CandidateRow = serde_json::from_str(
            r#"{"date": "2024-03-01", "description": "Rent", "amount": "-900,00", "external_id": "TX-1"}"#,
        )
        .unwrap();
        assert_eq!(row.amount, "-900,00");
        assert_eq!(row.external_id.as_deref(), Some("TX-1"));
    }

    #[test]
    fn test_confirm_action_parse() {
        assert_eq!("INSERT".parse::<ConfirmAction>().unwrap(), ConfirmAction::Insert);
        assert_eq!("discard".parse::<ConfirmAction>().unwrap(), ConfirmAction::Discard);
        assert!("maybe".parse::<ConfirmAction>().is_err());
    }

    #[test]
    fn test_resolution_serialization() {
        let json = serde_json::to_value(Resolution::new(ResolveOutcome::AlreadyExists)).unwrap();
        assert_eq!(json["outcome"], "already_exists");
        assert!(json.get("reason").is_none());

        let json = serde_json::to_value(Resolution::invalid("unknown candidate")).unwrap();
        assert_eq!(json["outcome"], "invalid");
        assert_eq!(json["reason"], "unknown candidate");
    }
}
