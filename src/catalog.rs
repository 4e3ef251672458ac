use log::{info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::api::IdpApi;
use crate::error::Result;
use crate::schema::{CategoryCatalog, FailingPrompt, PromptAccuracyRow, PromptEntry, ScoredRow};

/// Fetches the configured datapoints of one document category.
pub async fn retrieve_prompts<A>(api: &A, document_category: &str, category_uid: &str) -> Result<Vec<PromptEntry>>
where
    A: IdpApi + ?Sized,
{
    let points = api.list_prompts(category_uid).await?;
    info!(
        "Retrieved {} prompts for category '{}'",
        points.len(),
        document_category
    );

    Ok(points
        .into_iter()
        .map(|point| PromptEntry {
            document_category: document_category.to_string(),
            datapoint_name: point.data_point_name,
            prompt: point.llm_prompt,
            use_visual_llm: point.use_visual_llm,
            datapoint_type: point.data_point_type,
            category_uid: category_uid.to_string(),
        })
        .collect())
}

/// Tags every row with the UID of its document category, when the catalog knows it.
pub fn attach_category_uids(rows: &mut [ScoredRow], catalog: &CategoryCatalog) {
    let uids: HashMap<&str, &str> = catalog
        .categories
        .iter()
        .map(|c| (c.document_category.as_str(), c.uid.as_str()))
        .collect();

    for row in rows.iter_mut() {
        row.category_uid = uids
            .get(row.row.document_category.as_str())
            .map(|uid| uid.to_string());
    }
}

/// Distinct (category, UID) pairs present in the scored rows, ordered by category.
///
/// Categories without a UID are reported and left out.
pub fn categories_to_query(rows: &[ScoredRow]) -> Vec<(String, String)> {
    let mut categories: BTreeMap<String, Option<String>> = BTreeMap::new();
    for row in rows {
        categories
            .entry(row.row.document_category.clone())
            .or_insert_with(|| row.category_uid.clone());
    }

    categories
        .into_iter()
        .filter_map(|(category, uid)| match uid {
            Some(uid) => Some((category, uid)),
            None => {
                warn!("Category '{}' is not in the catalog; skipping its prompts", category);
                None
            }
        })
        .collect()
}

/// Left join of prompts with scored rows on (category, datapoint name).
///
/// A prompt matching several rows yields one output row per match; a prompt
/// matching none yields a single row without accuracy.
pub fn merge_prompts(prompts: &[PromptEntry], scored: &[ScoredRow]) -> Vec<PromptAccuracyRow> {
    let mut by_key: HashMap<(&str, &str), Vec<&ScoredRow>> = HashMap::new();
    for row in scored {
        by_key
            .entry((
                row.row.document_category.as_str(),
                row.row.datapoint_name.as_str(),
            ))
            .or_default()
            .push(row);
    }

    let mut merged = Vec::new();
    for prompt in prompts {
        let key = (
            prompt.document_category.as_str(),
            prompt.datapoint_name.as_str(),
        );
        match by_key.get(&key) {
            Some(rows) => merged.extend(rows.iter().map(|row| PromptAccuracyRow {
                prompt: prompt.clone(),
                scored: Some((*row).clone()),
            })),
            None => merged.push(PromptAccuracyRow {
                prompt: prompt.clone(),
                scored: None,
            }),
        }
    }
    merged
}

/// Prompts whose accuracy is at or below `threshold`, one per (category, datapoint).
///
/// The first merged row of each pair becomes its example. Prompts that were never
/// measured are not selected.
pub fn select_failing(rows: &[PromptAccuracyRow], threshold: f64) -> Vec<FailingPrompt> {
    let mut seen = HashSet::new();
    let mut failing = Vec::new();

    for row in rows {
        let Some(scored) = &row.scored else {
            continue;
        };
        if scored.accuracy > threshold {
            continue;
        }
        let key = (
            row.prompt.document_category.clone(),
            row.prompt.datapoint_name.clone(),
        );
        if seen.insert(key) {
            failing.push(FailingPrompt {
                prompt: row.prompt.clone(),
                example: scored.clone(),
            });
        }
    }

    info!(
        "{} prompts at or below accuracy threshold {}",
        failing.len(),
        threshold
    );
    failing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DataPoint;
    use crate::schema::{CategoryEntry, ComparisonRow, PageRange};
    use crate::testing::FakeIdp;
    use serde_json::json;

    fn scored(category: &str, name: &str, loan: &str, accuracy: f64) -> ScoredRow {
        ScoredRow {
            row: ComparisonRow {
                document_category: category.to_string(),
                page_range: PageRange(1, 2),
                datapoint_name: name.to_string(),
                actual: json!("a"),
                expected: json!("b"),
                matched: false,
                loan: loan.to_string(),
            },
            accuracy,
            category_uid: None,
        }
    }

    fn prompt(category: &str, name: &str) -> PromptEntry {
        PromptEntry {
            document_category: category.to_string(),
            datapoint_name: name.to_string(),
            prompt: format!("Extract the {}", name),
            use_visual_llm: false,
            datapoint_type: "text".to_string(),
            category_uid: format!("uid-{}", category),
        }
    }

    #[tokio::test]
    async fn test_retrieve_prompts_tags_category() {
        let mut api = FakeIdp::new();
        api.prompts.insert(
            "uid-note".to_string(),
            vec![DataPoint {
                data_point_name: "Interest Rate".to_string(),
                llm_prompt: "What is the note rate?".to_string(),
                use_visual_llm: true,
                data_point_type: "percent".to_string(),
            }],
        );

        let prompts = retrieve_prompts(&api, "Note", "uid-note").await.unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].document_category, "Note");
        assert_eq!(prompts[0].category_uid, "uid-note");
        assert_eq!(prompts[0].prompt, "What is the note rate?");
        assert!(prompts[0].use_visual_llm);
    }

    #[test]
    fn test_attach_uids_and_categories_to_query() {
        let catalog = CategoryCatalog {
            categories: vec![CategoryEntry {
                document_category: "Note".to_string(),
                uid: "uid-note".to_string(),
            }],
        };
        let mut rows = vec![
            scored("Note", "Rate", "1", 1.0),
            scored("Deed", "Grantor", "1", 1.0),
            scored("Note", "Term", "2", 1.0),
        ];

        attach_category_uids(&mut rows, &catalog);
        assert_eq!(rows[0].category_uid.as_deref(), Some("uid-note"));
        assert_eq!(rows[1].category_uid, None);

        assert_eq!(
            categories_to_query(&rows),
            vec![("Note".to_string(), "uid-note".to_string())]
        );
    }

    #[test]
    fn test_merge_is_a_left_join() {
        let prompts = vec![prompt("Note", "Rate"), prompt("Note", "Unmeasured")];
        let rows = vec![
            scored("Note", "Rate", "1", 0.5),
            scored("Note", "Rate", "2", 0.5),
            scored("Appraisal", "Rate", "1", 0.5),
        ];

        let merged = merge_prompts(&prompts, &rows);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].accuracy(), Some(0.5));
        assert_eq!(merged[1].scored.as_ref().unwrap().row.loan, "2");
        assert_eq!(merged[2].prompt.datapoint_name, "Unmeasured");
        assert_eq!(merged[2].accuracy(), None);
    }

    #[test]
    fn test_select_failing_uses_inclusive_threshold_and_dedupes() {
        let prompts = vec![
            prompt("Note", "Rate"),
            prompt("Note", "Term"),
            prompt("Note", "Unmeasured"),
        ];
        let rows = vec![
            scored("Note", "Rate", "1", 0.8),
            scored("Note", "Rate", "2", 0.8),
            scored("Note", "Term", "1", 0.81),
        ];
        let merged = merge_prompts(&prompts, &rows);

        let failing = select_failing(&merged, 0.8);
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].prompt.datapoint_name, "Rate");
        assert_eq!(failing[0].example.row.loan, "1");
    }
}
