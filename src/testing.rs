//! Scriptable in-process stand-in for the IDP service, shared by the unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::{DataPoint, IdpApi, PromptTestRequest};
use crate::error::{PromptTunerError, Result};

type Responder = Box<dyn Fn(&PromptTestRequest) -> Option<Value> + Send + Sync>;

pub(crate) struct FakeIdp {
    pub token: Option<String>,
    pub accept_auth: bool,
    pub auth_calls: AtomicUsize,
    pub extractions: HashMap<String, Vec<u8>>,
    pub categories: Vec<u8>,
    pub prompts: HashMap<String, Vec<DataPoint>>,
    pub submitted: Mutex<Vec<PromptTestRequest>>,
    pub polls: AtomicUsize,
    /// Polls of a test id answered with a 503 before anything else.
    pub failing_polls: usize,
    /// Polls of a test id answered as still processing before its result shows.
    pub pending_polls: usize,
    results: Mutex<HashMap<String, (String, Option<Value>, usize)>>,
    responder: Responder,
}

impl FakeIdp {
    pub fn new() -> Self {
        Self {
            token: None,
            accept_auth: true,
            auth_calls: AtomicUsize::new(0),
            extractions: HashMap::new(),
            categories: br#"{"categories": []}"#.to_vec(),
            prompts: HashMap::new(),
            submitted: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            failing_polls: 0,
            pending_polls: 0,
            results: Mutex::new(HashMap::new()),
            responder: Box::new(|_| None),
        }
    }

    /// Decides the value each submitted prompt test eventually produces.
    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&PromptTestRequest) -> Option<Value> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    pub fn submitted(&self) -> Vec<PromptTestRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdpApi for FakeIdp {
    fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    async fn authenticate(&self, email: &str, _password: &str) -> Result<String> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.accept_auth {
            Ok(format!("token-for-{}", email))
        } else {
            Err(PromptTunerError::AuthenticationFailed(
                "status code 401: bad credentials".to_string(),
            ))
        }
    }

    async fn fetch_extraction(&self, upload_id: &str) -> Result<Vec<u8>> {
        self.extractions
            .get(upload_id)
            .cloned()
            .ok_or_else(|| PromptTunerError::Server {
                status: 404,
                url: format!("fake://extraction/{}", upload_id),
                body: "not found".to_string(),
            })
    }

    async fn fetch_categories(&self) -> Result<Vec<u8>> {
        Ok(self.categories.clone())
    }

    async fn list_prompts(&self, category_uid: &str) -> Result<Vec<DataPoint>> {
        Ok(self.prompts.get(category_uid).cloned().unwrap_or_default())
    }

    async fn submit_prompt_test(&self, request: &PromptTestRequest) -> Result<String> {
        let mut submitted = self.submitted.lock().unwrap();
        let id = format!("test-{}", submitted.len());
        submitted.push(request.clone());

        let name = request.datapoint_name().unwrap_or_default().to_string();
        let value = (self.responder)(request);
        self.results.lock().unwrap().insert(id.clone(), (name, value, 0));
        Ok(id)
    }

    async fn fetch_prompt_test(&self, test_id: &str) -> Result<Value> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut results = self.results.lock().unwrap();
        let Some((name, value, seen)) = results.get_mut(test_id) else {
            return Ok(json!({ "status": "processing" }));
        };
        *seen += 1;

        if *seen <= self.failing_polls {
            return Err(PromptTunerError::Server {
                status: 503,
                url: format!("fake://test-llm-prompt?record_id={}", test_id),
                body: "unavailable".to_string(),
            });
        }
        match value {
            Some(value) if *seen > self.failing_polls + self.pending_polls => {
                Ok(json!({ "prompt-result": { name.as_str(): value.clone() } }))
            }
            _ => Ok(json!({ "status": "processing" })),
        }
    }
}
