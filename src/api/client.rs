use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::models::{ApiError, ApiResponse, ServerSummary, Transaction, TransactionQuery};
use crate::config::{AppConfig, Credentials};

/// Safety cap on pages fetched by a single `fetch_all` call
const DEFAULT_MAX_PAGES: u32 = 1000;

/// Request body: credentials followed by the flattened filter criteria
#[derive(Serialize)]
struct RequestBody<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(flatten)]
    query: &'a TransactionQuery,
}

/// Client for the investment-transactions endpoint.
///
/// One POST per page; `fetch_all` walks pages until the server reports
/// exhaustion and returns either every record or the first error, never a
/// silently-truncated prefix.
pub struct TransactionsClient {
    http_client: HttpClient,
    base_url: String,
    api_key: String,
    credentials: Credentials,
    max_pages: u32,
}

impl TransactionsClient {
    /// Create a client from the runtime configuration. Every request is
    /// bounded by the configured timeout.
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(TransactionsClient {
            http_client,
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            credentials: config.credentials.clone(),
            max_pages: DEFAULT_MAX_PAGES,
        })
    }

    /// Override the pagination safety cap (mainly for testing)
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Create default headers with the API key
    fn create_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key_value = HeaderValue::from_str(&self.api_key)
            .map_err(|e| ApiError::Transport(format!("Failed to create API key header: {}", e)))?;
        headers.insert(HeaderName::from_static("x-api-key"), key_value);

        Ok(headers)
    }

    /// Turn a non-2xx response into an `ApiError`, extracting the server's
    /// `error` field from the body when it is JSON
    async fn handle_error_response(
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> ApiError {
        let status_code = status.as_u16();
        let body_text = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<serde_json::Value>(&body_text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body_text);

        if (500..600).contains(&status_code) {
            warn!("Server error {}: {}", status_code, message);
        }

        ApiError::Server {
            status: status_code,
            body: message,
        }
    }

    /// Fetch a single page of transactions matching `query`.
    ///
    /// The query is validated before anything touches the network. Transport
    /// failures, non-2xx statuses and malformed bodies come back as distinct
    /// error variants; nothing is retried.
    pub async fn fetch_page(&self, query: &TransactionQuery) -> Result<ApiResponse, ApiError> {
        query.validate()?;

        let headers = self.create_headers()?;
        let body = RequestBody {
            email: &self.credentials.email,
            password: &self.credentials.password,
            query,
        };

        debug!(
            "Requesting page at offset {} (limit {})",
            query.offset, query.limit
        );

        let response = self
            .http_client
            .post(&self.base_url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::handle_error_response(status, response).await);
        }

        let page = response
            .json::<ApiResponse>()
            .await
            .map_err(|e| ApiError::Protocol(format!("Failed to parse response: {}", e)))?;

        if !page.success {
            return Err(ApiError::Server {
                status: 200,
                body: page
                    .error
                    .unwrap_or_else(|| "server reported failure".to_string()),
            });
        }

        Ok(page)
    }

    /// Lazy sequence of pages for `query`, starting at its offset. Callers
    /// can stop after any page without fetching the rest.
    pub fn pages(&self, query: TransactionQuery) -> Result<PageCursor<'_>, ApiError> {
        query.validate()?;
        Ok(PageCursor {
            client: self,
            query,
            pages_fetched: 0,
            done: false,
        })
    }

    /// Fetch every page matching `query` and return the accumulated records.
    ///
    /// All criteria are held constant except the offset, which advances by
    /// each page's length. The first page-level error aborts the whole fetch
    /// and discards anything accumulated so far. `cancel` is checked between
    /// pages; fetching more than the configured page cap without the server
    /// reporting exhaustion is an error rather than a silent stop.
    pub async fn fetch_all(
        &self,
        query: &TransactionQuery,
        cancel: &AtomicBool,
    ) -> Result<Vec<Transaction>, ApiError> {
        let (records, _) = self.fetch_all_with_summary(query, cancel).await?;
        Ok(records)
    }

    /// Like `fetch_all`, but also returns the server's aggregate summary
    /// block from the first page. Its `total_transactions` covers the whole
    /// filtered set, so the first page's block is the authoritative one.
    pub async fn fetch_all_with_summary(
        &self,
        query: &TransactionQuery,
        cancel: &AtomicBool,
    ) -> Result<(Vec<Transaction>, Option<ServerSummary>), ApiError> {
        let mut cursor = self.pages(query.clone())?;
        let mut records: Vec<Transaction> = Vec::new();
        let mut server_summary: Option<ServerSummary> = None;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(ApiError::Cancelled(cursor.pages_fetched()));
            }

            match cursor.next_page().await? {
                Some(page) => {
                    if server_summary.is_none() {
                        server_summary = page.summary;
                    }
                    records.extend(page.data);
                    // A completed fetch stays complete even if cancellation
                    // lands while the last page is in flight
                    if cursor.is_done() {
                        break;
                    }
                    if cursor.pages_fetched() >= self.max_pages {
                        return Err(ApiError::PageLimitExceeded(self.max_pages));
                    }
                }
                None => break,
            }
        }

        info!(
            "Fetched {} transaction(s) in {} page(s)",
            records.len(),
            cursor.pages_fetched()
        );
        if let Some(summary) = &server_summary {
            info!(
                "Server reports {} matching transaction(s), net total {:.2}",
                summary.total_transactions, summary.net_total
            );
        }
        Ok((records, server_summary))
    }
}

/// Walks the pages of one logical query, advancing the offset after each
/// successful page and stopping once the server clears the continuation flag
pub struct PageCursor<'a> {
    client: &'a TransactionsClient,
    query: TransactionQuery,
    pages_fetched: u32,
    done: bool,
}

impl PageCursor<'_> {
    /// Fetch the next page, or `None` once the server reported exhaustion
    pub async fn next_page(&mut self) -> Result<Option<ApiResponse>, ApiError> {
        if self.done {
            return Ok(None);
        }

        let page = self.client.fetch_page(&self.query).await?;
        self.pages_fetched += 1;
        self.query.offset += page.data.len() as u32;
        self.done = !page.pagination.has_more;
        Ok(Some(page))
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Offset the next page would be requested at
    pub fn offset(&self) -> u32 {
        self.query.offset
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Recorded request: raw header block and parsed JSON body
    type Recorded = (String, serde_json::Value);

    struct MockServer {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    /// Read one full HTTP request off the stream; `None` on early EOF
    async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<Recorded> {
        let mut buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                let header_text = String::from_utf8_lossy(&buf[..pos]).to_string();
                let content_length = header_text
                    .lines()
                    .find_map(|line| {
                        let line = line.to_ascii_lowercase();
                        line.strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                let body_start = pos + 4;
                while buf.len() < body_start + content_length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        return None;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body_json: serde_json::Value =
                    serde_json::from_slice(&buf[body_start..body_start + content_length]).unwrap();
                return Some((header_text, body_json));
            }
        }
    }

    fn http_response(status: u16, body: &str) -> String {
        let reason = if status == 200 { "OK" } else { "Error" };
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        )
    }

    /// Serve one canned (status, body) response per incoming connection,
    /// recording each request's headers and JSON body
    async fn spawn_server(responses: Vec<(u16, String)>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = match read_request(&mut stream).await {
                    Some(r) => r,
                    None => return,
                };
                recorded.lock().unwrap().push(request);

                let response = http_response(status, &body);
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        MockServer { addr, requests }
    }

    fn test_config(addr: SocketAddr) -> AppConfig {
        AppConfig {
            api_url: format!("http://{}", addr),
            api_key: "test-key".to_string(),
            credentials: Credentials {
                email: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            timeout: Duration::from_secs(5),
        }
    }

    fn tx_json(i: usize) -> serde_json::Value {
        serde_json::json!({
            "id": format!("tx-{}", i),
            "description": format!("Achat PEA {}", i),
            "amount": -10.0,
            "type": "expense",
            "transaction_date": "2024-03-01",
            "value_date": "2024-03-01",
            "created_at": "2024-03-01T00:00:00+00:00",
            "updated_at": null,
            "include_in_stats": true,
            "transfer_fee": null,
            "category_id": null,
            "categories": null,
            "account_id": null,
            "accounts": null
        })
    }

    fn page_body(count: usize, first_id: usize, offset: u32, total: u64, has_more: bool) -> String {
        let data: Vec<serde_json::Value> = (first_id..first_id + count).map(tx_json).collect();
        serde_json::json!({
            "success": true,
            "data": data,
            "summary": null,
            "pagination": {
                "limit": 1000,
                "offset": offset,
                "total": total,
                "returned": count,
                "has_more": has_more
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn fetch_all_walks_pages_with_advancing_offsets() {
        let server = spawn_server(vec![
            (200, page_body(1000, 0, 0, 2400, true)),
            (200, page_body(1000, 1000, 1000, 2400, true)),
            (200, page_body(400, 2000, 2000, 2400, false)),
        ])
        .await;

        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();
        let query = TransactionQuery::new()
            .with_categories(["Investissements", "PEA"])
            .with_description_filter("PEA");

        let records = client
            .fetch_all(&query, &AtomicBool::new(false))
            .await
            .unwrap();
        assert_eq!(records.len(), 2400);

        // No duplicates across page boundaries
        assert_eq!(records[999].id, "tx-999");
        assert_eq!(records[1000].id, "tx-1000");

        let requests = server.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        let offsets: Vec<u64> = requests
            .iter()
            .map(|(_, body)| body["offset"].as_u64().unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 1000, 2000]);

        // Credentials and filters travel in the body, the API key as a header
        let (headers, body) = &requests[0];
        assert!(headers.to_ascii_lowercase().contains("x-api-key: test-key"));
        assert_eq!(body["email"], "user@example.com");
        assert_eq!(body["password"], "hunter2");
        assert_eq!(body["categories"][0], "Investissements");
        assert_eq!(body["description_filter"], "PEA");
    }

    #[tokio::test]
    async fn fetch_all_discards_partial_results_on_page_error() {
        let server = spawn_server(vec![
            (200, page_body(1000, 0, 0, 2400, true)),
            (500, r#"{"error":"Failed to fetch transactions"}"#.to_string()),
        ])
        .await;

        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();
        let query = TransactionQuery::new();

        let result = client.fetch_all(&query, &AtomicBool::new(false)).await;
        match result {
            Err(ApiError::Server { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "Failed to fetch transactions");
            }
            other => panic!("expected server error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn fetch_all_fails_when_page_cap_is_exceeded() {
        // Server that never clears has_more
        let server = spawn_server(vec![
            (200, page_body(10, 0, 0, 1_000_000, true)),
            (200, page_body(10, 10, 10, 1_000_000, true)),
            (200, page_body(10, 20, 20, 1_000_000, true)),
        ])
        .await;

        let client = TransactionsClient::new(&test_config(server.addr))
            .unwrap()
            .with_max_pages(2);
        let query = TransactionQuery::new().with_limit(10);

        let result = client.fetch_all(&query, &AtomicBool::new(false)).await;
        assert!(matches!(result, Err(ApiError::PageLimitExceeded(2))));

        assert_eq!(server.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fetch_all_surfaces_first_page_server_summary() {
        let summary = serde_json::json!({
            "total_transactions": 2,
            "returned_transactions": 2,
            "expense_count": 1,
            "income_count": 1,
            "transfer_count": 0,
            "total_expenses": 250.5,
            "total_income": 1200.0,
            "total_transfers": 0.0,
            "total_transfer_fees": 0.0,
            "net_total": 949.5,
            "categories": ["Investissements"],
            "accounts": ["PEA Boursorama"]
        });
        let body = serde_json::json!({
            "success": true,
            "data": [tx_json(0), tx_json(1)],
            "summary": summary,
            "pagination": {
                "limit": 1000,
                "offset": 0,
                "total": 2,
                "returned": 2,
                "has_more": false
            }
        })
        .to_string();
        let server = spawn_server(vec![(200, body)]).await;

        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();
        let (records, summary) = client
            .fetch_all_with_summary(&TransactionQuery::new(), &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        let summary = summary.expect("summary block missing");
        assert_eq!(summary.total_transactions, 2);
        assert_eq!(summary.net_total, 949.5);
        assert_eq!(summary.categories, vec!["Investissements"]);
    }

    #[tokio::test]
    async fn completed_fetch_is_kept_when_cancel_lands_during_final_page() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = Arc::new(AtomicBool::new(false));

        // The flag flips after the request is read but before the final page
        // is sent, so it is guaranteed set by the time the fetch loop could
        // check it again
        let flag = Arc::clone(&cancel);
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await.unwrap();
            flag.store(true, Ordering::SeqCst);

            let response = http_response(200, &page_body(10, 0, 0, 10, false));
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });

        let client = TransactionsClient::new(&test_config(addr)).unwrap();
        let records = client
            .fetch_all(&TransactionQuery::new().with_limit(10), &cancel)
            .await
            .unwrap();
        assert_eq!(records.len(), 10);
    }

    #[tokio::test]
    async fn fetch_all_honors_cancellation_before_any_request() {
        let server = spawn_server(vec![(200, page_body(10, 0, 0, 10, false))]).await;
        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();

        let cancelled = AtomicBool::new(true);
        let result = client.fetch_all(&TransactionQuery::new(), &cancelled).await;

        assert!(matches!(result, Err(ApiError::Cancelled(0))));
        assert!(server.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_limit_is_rejected_before_any_request() {
        let server = spawn_server(vec![]).await;
        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();

        let query = TransactionQuery::new().with_limit(6000);
        let result = client.fetch_page(&query).await;

        assert!(matches!(result, Err(ApiError::InvalidQuery(_))));
        assert!(server.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_cursor_supports_early_stop() {
        let server = spawn_server(vec![
            (200, page_body(10, 0, 0, 20, true)),
            (200, page_body(10, 10, 10, 20, false)),
        ])
        .await;

        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();
        let mut cursor = client.pages(TransactionQuery::new().with_limit(10)).unwrap();

        let page = cursor.next_page().await.unwrap().unwrap();
        assert_eq!(page.data.len(), 10);
        assert!(page.pagination.has_more);
        assert_eq!(cursor.offset(), 10);
        assert_eq!(cursor.pages_fetched(), 1);
        assert!(!cursor.is_done());

        // Dropping the cursor here leaves the second page unfetched
        drop(cursor);
        assert_eq!(server.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_surfaces_as_protocol_error() {
        let server = spawn_server(vec![(200, "not json at all".to_string())]).await;
        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();

        let result = client.fetch_page(&TransactionQuery::new()).await;
        assert!(matches!(result, Err(ApiError::Protocol(_))));
    }

    #[tokio::test]
    async fn unauthorized_status_carries_server_message() {
        let server = spawn_server(vec![(
            401,
            r#"{"error":"Unauthorized - Invalid API key"}"#.to_string(),
        )])
        .await;
        let client = TransactionsClient::new(&test_config(server.addr)).unwrap();

        let result = client.fetch_page(&TransactionQuery::new()).await;
        match result {
            Err(ApiError::Server { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "Unauthorized - Invalid API key");
            }
            other => panic!("expected server error, got {:?}", other.map(|p| p.data.len())),
        }
    }
}
