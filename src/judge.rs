use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::constants::API_TIMEOUT_SECS;
use crate::types::{CatalogProblem, ProblemRef, Submission, UserProfile};

pub const ACCEPTED_VERDICT: &str = "OK";
pub const DEFAULT_API_BASE: &str = "https://codeforces.com/api";

/// External verification service. All calls are read-only and degrade to
/// `None`/empty on timeout or error so callers never hang or crash.
pub trait JudgeApi: Send + Sync + 'static {
    fn user_profile(&self, handle: &str) -> impl Future<Output = Option<UserProfile>> + Send;

    fn submission_history(
        &self,
        handle: &str,
        limit: usize,
    ) -> impl Future<Output = Vec<Submission>> + Send;

    fn catalog(&self) -> impl Future<Output = Vec<CatalogProblem>> + Send;
}

pub struct CfJudge {
    base_url: String,
    client: reqwest::Client,
}

impl CfJudge {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn call(&self, path: &str, params: &[(&str, String)]) -> Option<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let response = match self.client.get(&url).query(params).send().await {
            Ok(response) => response,
            Err(error) => {
                eprintln!("[judge] {path} request failed: {error}");
                return None;
            }
        };
        if !response.status().is_success() {
            eprintln!("[judge] {path} returned status {}", response.status());
            return None;
        }
        let payload: Value = match response.json().await {
            Ok(payload) => payload,
            Err(error) => {
                eprintln!("[judge] {path} returned invalid json: {error}");
                return None;
            }
        };
        if payload.get("status").and_then(Value::as_str) != Some("OK") {
            eprintln!("[judge] {path} returned non-OK status payload");
            return None;
        }
        payload.get("result").cloned()
    }
}

impl JudgeApi for CfJudge {
    async fn user_profile(&self, handle: &str) -> Option<UserProfile> {
        let result = self
            .call("user.info", &[("handles", handle.to_string())])
            .await?;
        parse_profile(&result)
    }

    async fn submission_history(&self, handle: &str, limit: usize) -> Vec<Submission> {
        let params = [
            ("handle", handle.to_string()),
            ("count", limit.to_string()),
        ];
        match self.call("user.status", &params).await {
            Some(result) => parse_submissions(&result),
            None => Vec::new(),
        }
    }

    async fn catalog(&self) -> Vec<CatalogProblem> {
        match self.call("problemset.problems", &[]).await {
            Some(result) => parse_catalog(&result),
            None => Vec::new(),
        }
    }
}

fn parse_problem_ref(value: &Value) -> Option<ProblemRef> {
    let contest_id = value.get("contestId")?.as_i64()?;
    let index = value.get("index")?.as_str()?;
    Some(ProblemRef::new(contest_id, index))
}

fn parse_profile(result: &Value) -> Option<UserProfile> {
    let entry = result.as_array()?.first()?;
    let handle = entry.get("handle")?.as_str()?.to_string();
    let rating = entry.get("rating").and_then(Value::as_i64).unwrap_or(0);
    Some(UserProfile { handle, rating })
}

fn parse_submissions(result: &Value) -> Vec<Submission> {
    let Some(entries) = result.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let problem = parse_problem_ref(entry.get("problem")?)?;
            let verdict = entry
                .get("verdict")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Submission { problem, verdict })
        })
        .collect()
}

fn parse_catalog(result: &Value) -> Vec<CatalogProblem> {
    let Some(entries) = result.get("problems").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let id = parse_problem_ref(entry)?;
            let name = entry.get("name")?.as_str()?.to_string();
            let rating = entry.get("rating").and_then(Value::as_i64);
            Some(CatalogProblem { id, name, rating })
        })
        .collect()
}
