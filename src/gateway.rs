use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{GatewayError, Operation};
use crate::models::{Task, TaskExecution, TaskPayload};

/// The five calls the console makes against the task service.
///
/// Every call is a single attempt; callers decide what to do with failure.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<Task>, GatewayError>;

    /// Name-substring search. An empty fragment behaves as [`TaskGateway::list`].
    async fn search(&self, fragment: &str) -> Result<Vec<Task>, GatewayError>;

    async fn upsert(&self, payload: &TaskPayload) -> Result<Task, GatewayError>;

    async fn delete(&self, id: &str) -> Result<(), GatewayError>;

    /// Runs the command and resolves once the run has completed.
    async fn execute(&self, id: &str) -> Result<TaskExecution, GatewayError>;
}

#[async_trait]
impl<G: TaskGateway + ?Sized> TaskGateway for Arc<G> {
    async fn list(&self) -> Result<Vec<Task>, GatewayError> {
        (**self).list().await
    }

    async fn search(&self, fragment: &str) -> Result<Vec<Task>, GatewayError> {
        (**self).search(fragment).await
    }

    async fn upsert(&self, payload: &TaskPayload) -> Result<Task, GatewayError> {
        (**self).upsert(payload).await
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        (**self).delete(id).await
    }

    async fn execute(&self, id: &str) -> Result<TaskExecution, GatewayError> {
        (**self).execute(id).await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// What came back from one request, before it is decoded.
struct RawResponse {
    status: StatusCode,
    body: String,
}

/// REST client for the task service rooted at `base_url` (e.g. `http://localhost:8080/api/tasks`).
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<RawResponse, GatewayError> {
        let response = request.send().await.map_err(|e| {
            warn!("{} request got no response: {}", operation, e);
            GatewayError::Unreachable {
                operation,
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        // A body that cannot be read is still an answered request.
        let body = response.text().await.unwrap_or_default();
        debug!("{} -> {}", operation, status);
        Ok(RawResponse { status, body })
    }

    async fn call(
        &self,
        operation: Operation,
        method: Method,
        url: Url,
    ) -> Result<RawResponse, GatewayError> {
        debug!("{} {} {}", operation, method, url);
        self.send(operation, self.client.request(method, url)).await
    }
}

/// Turns a non-success status and its body into an [`GatewayError::OperationFailed`].
pub fn failure_from(operation: Operation, status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    warn!("{} failed with status {}", operation, status);
    GatewayError::OperationFailed {
        operation,
        status,
        message,
    }
}

fn decode<T: DeserializeOwned>(operation: Operation, raw: RawResponse) -> Result<T, GatewayError> {
    if !raw.status.is_success() {
        return Err(failure_from(operation, raw.status.as_u16(), &raw.body));
    }
    serde_json::from_str(&raw.body).map_err(|e| GatewayError::OperationFailed {
        operation,
        status: raw.status.as_u16(),
        message: Some(format!("malformed response body: {}", e)),
    })
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn list(&self) -> Result<Vec<Task>, GatewayError> {
        let raw = self.call(Operation::List, Method::GET, self.endpoint(&[])).await?;
        decode(Operation::List, raw)
    }

    async fn search(&self, fragment: &str) -> Result<Vec<Task>, GatewayError> {
        if fragment.is_empty() {
            return self.list().await;
        }
        let mut url = self.endpoint(&["search"]);
        url.query_pairs_mut().append_pair("name", fragment);
        let raw = self.call(Operation::Search, Method::GET, url).await?;
        if raw.status == StatusCode::NOT_FOUND {
            debug!("search for {:?} matched nothing", fragment);
            return Ok(Vec::new());
        }
        decode(Operation::Search, raw)
    }

    async fn upsert(&self, payload: &TaskPayload) -> Result<Task, GatewayError> {
        let url = self.endpoint(&[]);
        debug!("upsert PUT {} id={}", url, payload.id);
        let request = self.client.put(url).json(payload);
        let raw = self.send(Operation::Upsert, request).await?;
        decode(Operation::Upsert, raw)
    }

    async fn delete(&self, id: &str) -> Result<(), GatewayError> {
        let raw = self
            .call(Operation::Delete, Method::DELETE, self.endpoint(&[id]))
            .await?;
        if raw.status.is_success() {
            Ok(())
        } else {
            Err(failure_from(Operation::Delete, raw.status.as_u16(), &raw.body))
        }
    }

    async fn execute(&self, id: &str) -> Result<TaskExecution, GatewayError> {
        let raw = self
            .call(Operation::Execute, Method::PUT, self.endpoint(&[id, "execute"]))
            .await?;
        decode(Operation::Execute, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves exactly one canned HTTP response and hands back the request head it saw.
    async fn one_shot(status_line: &str, body: &str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 1024];
            // Read the head, then as much body as content-length announces.
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
                if n == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&seen).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|l| l.split_once(':'))
                        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if seen.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&seen).to_string()
        });
        let base = Url::parse(&format!("http://{}/api/tasks", addr)).unwrap();
        (base, handle)
    }

    #[tokio::test]
    async fn test_list_decodes_tasks() {
        let body = r#"[{"id":"T1","name":"Deploy","owner":"Jane","command":"echo hi","taskExecutions":[]}]"#;
        let (base, server) = one_shot("200 OK", body).await;
        let tasks = HttpGateway::new(base).list().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Deploy");
        let head = server.await.unwrap();
        assert!(head.starts_with("GET /api/tasks HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_search_not_found_is_empty() {
        let (base, server) = one_shot("404 Not Found", r#"{"message":"no tasks"}"#).await;
        let tasks = HttpGateway::new(base).search("zzz").await.unwrap();
        assert!(tasks.is_empty());
        let head = server.await.unwrap();
        assert!(head.starts_with("GET /api/tasks/search?name=zzz HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_execute_not_found_is_failure() {
        let (base, _server) = one_shot("404 Not Found", r#"{"message":"Task not found"}"#).await;
        let err = HttpGateway::new(base).execute("T9").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::OperationFailed {
                operation: Operation::Execute,
                status: 404,
                message: Some("Task not found".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_delete_encodes_id_segment() {
        let (base, server) = one_shot("200 OK", "").await;
        HttpGateway::new(base).delete("nightly backup").await.unwrap();
        let head = server.await.unwrap();
        assert!(head.starts_with("DELETE /api/tasks/nightly%20backup HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_upsert_puts_payload() {
        let body = r#"{"id":"T2","name":"Backup","owner":"Bob","command":"tar -czf a.tgz .","taskExecutions":[]}"#;
        let (base, server) = one_shot("200 OK", body).await;
        let payload = TaskPayload {
            id: "T2".to_string(),
            name: "Backup".to_string(),
            owner: "Bob".to_string(),
            command: "tar -czf a.tgz .".to_string(),
        };
        let task = HttpGateway::new(base).upsert(&payload).await.unwrap();
        assert_eq!(task.id, "T2");
        assert!(task.task_executions.is_empty());
        let head = server.await.unwrap();
        assert!(head.starts_with("PUT /api/tasks HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_failure() {
        let (base, _server) = one_shot("200 OK", "<html>proxy</html>").await;
        let err = HttpGateway::new(base).list().await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::OperationFailed { operation: Operation::List, status: 200, .. }
        ));
    }

    #[tokio::test]
    async fn test_no_listener_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = Url::parse(&format!("http://{}/api/tasks", addr)).unwrap();
        let err = HttpGateway::new(base).list().await.unwrap_err();
        assert!(err.is_unreachable());
        assert_eq!(err.operation(), Operation::List);
    }

    #[test]
    fn test_failure_from_ignores_blank_message() {
        let err = failure_from(Operation::Upsert, 400, r#"{"message":"  "}"#);
        assert_eq!(err.server_message(), None);
        let err = failure_from(Operation::Upsert, 502, "Bad Gateway");
        assert_eq!(err.server_message(), None);
    }
}
