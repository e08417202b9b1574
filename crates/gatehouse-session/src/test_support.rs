use crate::backend::{BackendResult, ResourceAuthorizer};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

/// Authorizer that records every token it is handed and always succeeds.
#[derive(Default)]
pub struct RecordingAuthorizer {
    tokens: Mutex<Vec<String>>,
}

impl RecordingAuthorizer {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceAuthorizer for RecordingAuthorizer {
    async fn authorize(&self, id_token: &str) -> BackendResult {
        self.tokens.lock().unwrap().push(id_token.to_string());
        BackendResult::success(200, json!({ "status": "ok" }))
    }
}
