use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::schema::{ComparisonRow, ExtractionDocument, ExtractionRecord, RecordKey, ScoredRow};

pub fn load_extraction(path: &Path) -> Result<ExtractionDocument> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// One record per extracted datapoint of every result entry.
pub fn flatten(document: &ExtractionDocument) -> Vec<ExtractionRecord> {
    document
        .results
        .iter()
        .flat_map(|result| {
            result
                .extracted_data
                .iter()
                .map(move |(name, value)| ExtractionRecord {
                    document_category: result.document_category.clone(),
                    page_range: result.page_range,
                    datapoint_name: name.clone(),
                    value: value.clone(),
                })
        })
        .collect()
}

/// Equal values match, and so do two nulls. Numbers compare by value, so `5` matches `5.0`.
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

fn first_by_key(records: &[ExtractionRecord]) -> BTreeMap<RecordKey, &Value> {
    let mut map = BTreeMap::new();
    for record in records {
        map.entry(record.key()).or_insert(&record.value);
    }
    map
}

/// Inner join of actual and expected records on (category, page range, datapoint).
///
/// Keys present on only one side are dropped, so a datapoint missing from either
/// extraction never shows up as a mismatch. Rows come back ordered by key.
pub fn diff(
    actual: &[ExtractionRecord],
    expected: &[ExtractionRecord],
    loan: &str,
) -> Vec<ComparisonRow> {
    let expected = first_by_key(expected);

    first_by_key(actual)
        .into_iter()
        .filter_map(|(key, actual_value)| {
            let expected_value = expected.get(&key)?;
            let (document_category, page_range, datapoint_name) = key;
            Some(ComparisonRow {
                document_category,
                page_range,
                datapoint_name,
                actual: actual_value.clone(),
                expected: (*expected_value).clone(),
                matched: values_match(actual_value, expected_value),
                loan: loan.to_string(),
            })
        })
        .collect()
}

/// Attaches to every row the match rate of all rows sharing its datapoint name,
/// across every loan and document category.
pub fn aggregate_accuracy(rows: Vec<ComparisonRow>) -> Vec<ScoredRow> {
    let mut tallies: HashMap<String, (usize, usize)> = HashMap::new();
    for row in &rows {
        let tally = tallies.entry(row.datapoint_name.clone()).or_default();
        tally.1 += 1;
        if row.matched {
            tally.0 += 1;
        }
    }

    rows.into_iter()
        .map(|row| {
            let (matched, total) = tallies[&row.datapoint_name];
            ScoredRow {
                accuracy: matched as f64 / total as f64,
                row,
                category_uid: None,
            }
        })
        .collect()
}

/// Loads a loan's actual and expected extractions and compares them.
pub fn compare_loan(loan: &str, actual_path: &Path, expected_path: &Path) -> Result<Vec<ComparisonRow>> {
    let actual = flatten(&load_extraction(actual_path)?);
    let expected = flatten(&load_extraction(expected_path)?);
    let rows = diff(&actual, &expected, loan);
    debug!(
        "Loan {}: {} actual, {} expected, {} compared",
        loan,
        actual.len(),
        expected.len(),
        rows.len()
    );
    Ok(rows)
}
