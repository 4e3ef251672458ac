use csv::{ReaderBuilder, Trim, Writer};
use log::info;
use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::schema::{value_text, ImprovementResult, Loan, PromptAccuracyRow};

/// Reads the loan list; only the `Loan Num` and `Harvester UID` columns are used.
pub fn read_loans(path: &Path) -> Result<Vec<Loan>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(path)?;
    let loans = reader
        .deserialize()
        .collect::<std::result::Result<Vec<Loan>, csv::Error>>()?;
    info!("Loaded {} loans from {}", loans.len(), path.display());
    Ok(loans)
}

#[derive(Serialize)]
struct PromptReportRow<'a> {
    #[serde(rename = "Document Category")]
    document_category: &'a str,
    #[serde(rename = "dataPointName")]
    datapoint_name: &'a str,
    prompt: &'a str,
    #[serde(rename = "useVisualLlm")]
    use_visual_llm: bool,
    #[serde(rename = "dataPointType")]
    datapoint_type: &'a str,
    #[serde(rename = "Page Range")]
    page_range: Option<String>,
    #[serde(rename = "Actual")]
    actual: Option<String>,
    #[serde(rename = "Expected")]
    expected: Option<String>,
    #[serde(rename = "Match")]
    matched: Option<bool>,
    #[serde(rename = "Loan")]
    loan: Option<&'a str>,
    #[serde(rename = "Accuracy")]
    accuracy: Option<f64>,
    #[serde(rename = "UID")]
    uid: &'a str,
}

impl<'a> From<&'a PromptAccuracyRow> for PromptReportRow<'a> {
    fn from(row: &'a PromptAccuracyRow) -> Self {
        let scored = row.scored.as_ref();
        Self {
            document_category: &row.prompt.document_category,
            datapoint_name: &row.prompt.datapoint_name,
            prompt: &row.prompt.prompt,
            use_visual_llm: row.prompt.use_visual_llm,
            datapoint_type: &row.prompt.datapoint_type,
            page_range: scored.map(|s| s.row.page_range.to_string()),
            actual: scored.map(|s| value_text(&s.row.actual)),
            expected: scored.map(|s| value_text(&s.row.expected)),
            matched: scored.map(|s| s.row.matched),
            loan: scored.map(|s| s.row.loan.as_str()),
            accuracy: scored.map(|s| s.accuracy),
            uid: &row.prompt.category_uid,
        }
    }
}

/// Writes every configured prompt with its measured rows (`prompts.csv`).
pub fn write_prompt_report(path: &Path, rows: &[PromptAccuracyRow]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for row in rows {
        writer.serialize(PromptReportRow::from(row))?;
    }
    writer.flush()?;
    info!("Wrote {} prompt rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes the rewritten prompts (`prompt_out.csv`).
pub fn write_improvements(path: &Path, results: &[ImprovementResult]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;
    info!("Wrote {} improved prompts to {}", results.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ComparisonRow, PageRange, PromptEntry, ScoredRow};
    use serde_json::json;
    use std::fs;

    fn prompt(name: &str) -> PromptEntry {
        PromptEntry {
            document_category: "Note".to_string(),
            datapoint_name: name.to_string(),
            prompt: "Find it, then return it".to_string(),
            use_visual_llm: true,
            datapoint_type: "text".to_string(),
            category_uid: "uid-note".to_string(),
        }
    }

    #[test]
    fn test_read_loans_maps_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loans.csv");
        fs::write(
            &path,
            "Loan Num,Harvester UID,Notes\n100234, 7f3a-11 ,first\n100235,8b2c-22,\n",
        )
        .unwrap();

        let loans = read_loans(&path).unwrap();
        assert_eq!(
            loans,
            vec![
                Loan {
                    loan_number: "100234".to_string(),
                    upload_id: "7f3a-11".to_string()
                },
                Loan {
                    loan_number: "100235".to_string(),
                    upload_id: "8b2c-22".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_read_loans_requires_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loans.csv");
        fs::write(&path, "Loan,Upload\n1,2\n").unwrap();
        assert!(read_loans(&path).unwrap_err().is_fatal());
    }

    #[test]
    fn test_prompt_report_leaves_unmeasured_cells_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.csv");
        let rows = vec![
            PromptAccuracyRow {
                prompt: prompt("Rate"),
                scored: Some(ScoredRow {
                    row: ComparisonRow {
                        document_category: "Note".to_string(),
                        page_range: PageRange(1, 2),
                        datapoint_name: "Rate".to_string(),
                        actual: json!("6%"),
                        expected: json!("6.5%"),
                        matched: false,
                        loan: "100234".to_string(),
                    },
                    accuracy: 0.5,
                    category_uid: Some("uid-note".to_string()),
                }),
            },
            PromptAccuracyRow {
                prompt: prompt("Term"),
                scored: None,
            },
        ];

        write_prompt_report(&path, &rows).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "Document Category,dataPointName,prompt,useVisualLlm,dataPointType,Page Range,Actual,Expected,Match,Loan,Accuracy,UID"
        );
        assert_eq!(
            lines[1],
            "Note,Rate,\"Find it, then return it\",true,text,\"[1, 2]\",6%,6.5%,false,100234,0.5,uid-note"
        );
        assert_eq!(
            lines[2],
            "Note,Term,\"Find it, then return it\",true,text,,,,,,,uid-note"
        );
    }

    #[test]
    fn test_improvements_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt_out.csv");
        write_improvements(
            &path,
            &[ImprovementResult {
                document: "Note".to_string(),
                datapoint: "Rate".to_string(),
                new_prompt: "Return the note rate".to_string(),
                old_prompt: "Rate?".to_string(),
                old_accuracy: 0.5,
                new_accuracy: 1.0,
                attempts: 2,
            }],
        )
        .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("Document,datapoint,new_prompt,old_prompt,old_accuracy,new_accuracy,attempts")
        );
        assert_eq!(lines.next(), Some("Note,Rate,Return the note rate,Rate?,0.5,1.0,2"));
    }
}
