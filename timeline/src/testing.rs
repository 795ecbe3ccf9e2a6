//! Canned-response transport shared by the unit tests.

use async_trait::async_trait;
use remote::{ApiResponse, RemoteError, RemoteResult, RequestTarget, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub(crate) const BASE_URL: &str = "https://api.github.com/";

/// Serves responses by resolved URL. A route with several responses hands them out in order and
/// keeps repeating the last one.
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn route(&self, url: &str, response: ApiResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub(crate) fn route_json(&self, url: &str, body: Value, link: Option<&str>) {
        let mut response = ApiResponse::new(url, 200, body.to_string());
        if let Some(link) = link {
            response = response.with_header("link", link);
        }
        self.route(url, response);
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, target: &RequestTarget) -> RemoteResult<ApiResponse> {
        let url = target.resolve(BASE_URL);
        self.requests.lock().unwrap().push(url.clone());

        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&url).ok_or_else(|| RemoteError::Unknown {
            message: format!("no route for {}", url),
        })?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| RemoteError::Unknown {
            message: format!("no response left for {}", url),
        })
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

pub(crate) fn tree_url(sha: &str) -> String {
    format!("{}repos/dracor-org/gerdracor/git/trees/{}", BASE_URL, sha)
}

/// A commit-listing item whose root tree is named after the commit (`root-{sha}`).
pub(crate) fn commit_json(sha: &str, date: &str) -> Value {
    json!({
        "sha": sha,
        "commit": {
            "committer": {"name": "GitHub", "date": date},
            "tree": {"sha": format!("root-{}", sha), "url": tree_url(&format!("root-{}", sha))}
        }
    })
}

pub(crate) fn blob(path: &str, size: u64) -> Value {
    json!({"path": path, "mode": "100644", "type": "blob", "sha": format!("b-{}", path), "size": size})
}

pub(crate) fn folder(path: &str, tree_sha: &str) -> Value {
    json!({"path": path, "mode": "040000", "type": "tree", "sha": tree_sha, "url": tree_url(tree_sha)})
}

pub(crate) fn tree(entries: Vec<Value>, truncated: bool) -> Value {
    json!({"tree": entries, "truncated": truncated})
}
