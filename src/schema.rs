use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// First and last page of a document within a loan package.
///
/// Serialized as a two-element JSON array, e.g. `[1, 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRange(pub u32, pub u32);

impl PageRange {
    pub fn to_vec(self) -> Vec<u32> {
        vec![self.0, self.1]
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0, self.1)
    }
}

/// The `combined-extraction` document the IDP service returns for one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionDocument {
    pub results: Vec<ExtractionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub document_category: String,
    pub page_range: PageRange,
    pub extracted_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRecord {
    pub document_category: String,
    pub page_range: PageRange,
    pub datapoint_name: String,
    pub value: Value,
}

/// Identity of a datapoint within one loan.
pub type RecordKey = (String, PageRange, String);

impl ExtractionRecord {
    pub fn key(&self) -> RecordKey {
        (
            self.document_category.clone(),
            self.page_range,
            self.datapoint_name.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub document_category: String,
    pub page_range: PageRange,
    pub datapoint_name: String,
    pub actual: Value,
    pub expected: Value,
    pub matched: bool,
    pub loan: String,
}

/// A comparison row annotated with the accuracy of its datapoint name.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub row: ComparisonRow,
    pub accuracy: f64,
    pub category_uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCatalog {
    pub categories: Vec<CategoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEntry {
    #[serde(rename = "documentCategory")]
    pub document_category: String,
    pub uid: String,
}

impl CategoryCatalog {
    pub fn uid_for(&self, document_category: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.document_category == document_category)
            .map(|c| c.uid.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptEntry {
    pub document_category: String,
    pub datapoint_name: String,
    pub prompt: String,
    pub use_visual_llm: bool,
    pub datapoint_type: String,
    pub category_uid: String,
}

/// A configured prompt joined with the measured rows for its datapoint.
///
/// `scored` is `None` when no loan produced a comparison row for the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptAccuracyRow {
    pub prompt: PromptEntry,
    pub scored: Option<ScoredRow>,
}

impl PromptAccuracyRow {
    pub fn accuracy(&self) -> Option<f64> {
        self.scored.as_ref().map(|s| s.accuracy)
    }
}

/// A prompt at or below the threshold together with the row used as its example.
#[derive(Debug, Clone, PartialEq)]
pub struct FailingPrompt {
    pub prompt: PromptEntry,
    pub example: ScoredRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementResult {
    #[serde(rename = "Document")]
    pub document: String,
    pub datapoint: String,
    pub new_prompt: String,
    pub old_prompt: String,
    pub old_accuracy: f64,
    pub new_accuracy: f64,
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    #[serde(rename = "Loan Num")]
    pub loan_number: String,
    #[serde(rename = "Harvester UID")]
    pub upload_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expiry: DateTime<Utc>,
}

impl Token {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

/// One verification call made while refining a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptLogEntry {
    pub document: String,
    pub datapoint: String,
    pub prompt: String,
    pub new_value: Value,
    pub expected: Value,
    pub refinement_test_id: String,
    pub verification_test_id: String,
}

/// Renders an extracted value the way it appears in prompts, logs and CSV cells.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
