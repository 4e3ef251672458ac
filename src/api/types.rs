use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::PageRange;

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: Option<String>,
}

/// A configured datapoint of a document category.
///
/// Every field tolerates being absent or null; the catalog is never rejected
/// because one point is incomplete.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_point_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub llm_prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub use_visual_llm: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_point_type: String,
}

#[derive(Debug, Deserialize)]
pub struct DataPointsResponse {
    pub points: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    pub data_point_name: String,
    pub data_point_type: String,
    pub llm_prompt: String,
}

/// Body of `POST /test-llm-prompt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTestRequest {
    pub loan_number: String,
    pub page_range: Vec<u32>,
    pub prompts: Vec<PromptSpec>,
    pub is_visual: bool,
}

impl PromptTestRequest {
    pub fn single(
        loan_number: impl Into<String>,
        page_range: PageRange,
        data_point_name: impl Into<String>,
        data_point_type: impl Into<String>,
        llm_prompt: impl Into<String>,
        is_visual: bool,
    ) -> Self {
        Self {
            loan_number: loan_number.into(),
            page_range: page_range.to_vec(),
            prompts: vec![PromptSpec {
                data_point_name: data_point_name.into(),
                data_point_type: data_point_type.into(),
                llm_prompt: llm_prompt.into(),
            }],
            is_visual,
        }
    }

    /// Datapoint whose value the test result is keyed by.
    pub fn datapoint_name(&self) -> Option<&str> {
        self.prompts.first().map(|p| p.data_point_name.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub uid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_point_defaults_for_absent_and_null_fields() {
        let parsed: DataPointsResponse = serde_json::from_value(json!({
            "points": [
                {"dataPointName": "Borrower Name", "llmPrompt": "Find the borrower", "useVisualLlm": true, "dataPointType": "text"},
                {"dataPointName": "Loan Amount"},
                {"dataPointName": "Rate", "llmPrompt": null, "useVisualLlm": null}
            ]
        }))
        .unwrap();

        assert_eq!(parsed.points.len(), 3);
        assert!(parsed.points[0].use_visual_llm);
        assert_eq!(parsed.points[1].llm_prompt, "");
        assert!(!parsed.points[1].use_visual_llm);
        assert_eq!(parsed.points[1].data_point_type, "");
        assert_eq!(parsed.points[2].llm_prompt, "");
        assert!(!parsed.points[2].use_visual_llm);
    }

    #[test]
    fn test_missing_points_array_is_an_error() {
        assert!(serde_json::from_value::<DataPointsResponse>(json!({"data": []})).is_err());
    }

    #[test]
    fn test_prompt_test_request_wire_shape() {
        let request = PromptTestRequest::single(
            "100234",
            PageRange(4, 9),
            "Loan Amount",
            "currency",
            "What is the loan amount?",
            false,
        );

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "loan_number": "100234",
                "page_range": [4, 9],
                "prompts": [{
                    "data_point_name": "Loan Amount",
                    "data_point_type": "currency",
                    "llm_prompt": "What is the loan amount?"
                }],
                "is_visual": false
            })
        );
        assert_eq!(request.datapoint_name(), Some("Loan Amount"));
    }
}
