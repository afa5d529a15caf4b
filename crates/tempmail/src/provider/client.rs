//! mail.tm compatible HTTP client
//!
//! Uses synchronous HTTP (ureq) with one agent per client. Every request is
//! bounded by the agent's global timeout and is attempted exactly once.

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::json;
use ureq::Agent;
use ureq::http::Response;

use super::api::{Domain, Listing, MessageDetail, MessageSummary, ProviderAccount, TokenResponse};
use super::{MailProvider, ProviderError};

/// Client for the mail.tm REST API
pub struct MailTmClient {
    agent: Agent,
    base_url: String,
}

impl MailTmClient {
    /// Public mail.tm endpoint
    pub const DEFAULT_BASE_URL: &'static str = "https://api.mail.tm";

    /// Upper bound applied to every request
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// JSON-LD answers carry the `hydra:member` collections
    const ACCEPT: &'static str = "application/ld+json";

    /// Create a client for `base_url` with the given request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }
}

impl Default for MailTmClient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL, Self::DEFAULT_TIMEOUT)
    }
}

impl MailProvider for MailTmClient {
    fn list_domains(&self) -> Result<Vec<Domain>, ProviderError> {
        let response = self
            .agent
            .get(&self.url("/domains"))
            .header("Accept", Self::ACCEPT)
            .call()
            .map_err(unavailable)?;

        let mut response = expect_success(response, ProviderError::Unavailable)?;
        let domains = read_json::<Listing<Domain>>(&mut response)?.into_items();

        Ok(domains.into_iter().filter(|d| d.is_active).collect())
    }

    fn create_account(
        &self,
        address: &str,
        password: &str,
    ) -> Result<ProviderAccount, ProviderError> {
        let response = self
            .agent
            .post(&self.url("/accounts"))
            .header("Accept", Self::ACCEPT)
            .send_json(json!({ "address": address, "password": password }))
            .map_err(unavailable)?;

        let mut response = expect_success(response, ProviderError::AccountCreationFailed)?;
        read_json(&mut response)
    }

    fn acquire_token(&self, address: &str, password: &str) -> Result<String, ProviderError> {
        let mut response = self
            .agent
            .post(&self.url("/token"))
            .header("Accept", Self::ACCEPT)
            .send_json(json!({ "address": address, "password": password }))
            .map_err(unavailable)?;

        if response.status().as_u16() != 200 {
            return Err(ProviderError::AuthenticationFailed(describe(response)));
        }

        let token: TokenResponse = read_json(&mut response)?;
        Ok(token.token)
    }

    fn list_messages(&self, token: &str) -> Result<Vec<MessageSummary>, ProviderError> {
        let response = self
            .agent
            .get(&self.url("/messages"))
            .header("Accept", Self::ACCEPT)
            .header("Authorization", &Self::bearer(token))
            .call()
            .map_err(unavailable)?;

        let mut response = expect_success(response, ProviderError::Unavailable)?;
        Ok(read_json::<Listing<MessageSummary>>(&mut response)?.into_items())
    }

    fn fetch_message(
        &self,
        token: &str,
        message_id: &str,
    ) -> Result<Option<MessageDetail>, ProviderError> {
        let url = self.url(&format!("/messages/{}", urlencoding::encode(message_id)));
        let mut response = self
            .agent
            .get(&url)
            .header("Accept", Self::ACCEPT)
            .header("Authorization", &Self::bearer(token))
            .call()
            .map_err(unavailable)?;

        if response.status().as_u16() != 200 {
            debug!(
                "Message {} not retrievable (HTTP {})",
                message_id,
                response.status().as_u16()
            );
            return Ok(None);
        }

        read_json(&mut response).map(Some)
    }
}

type HttpResponse = Response<ureq::Body>;

fn unavailable(err: ureq::Error) -> ProviderError {
    ProviderError::Unavailable(err.to_string())
}

/// Pass 2xx responses through, map anything else with `failure`
fn expect_success(
    response: HttpResponse,
    failure: fn(String) -> ProviderError,
) -> Result<HttpResponse, ProviderError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(failure(describe(response)))
    }
}

/// Status plus whatever body the provider sent back
fn describe(mut response: HttpResponse) -> String {
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    }
}

fn read_json<T: DeserializeOwned>(response: &mut HttpResponse) -> Result<T, ProviderError> {
    response
        .body_mut()
        .read_json()
        .map_err(|e| ProviderError::Unavailable(format!("Invalid response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    /// Answer exactly one HTTP request, returning the request text
    fn serve_once(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/ld+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request
        });

        (format!("http://{}", addr), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut request = String::new();
        let mut content_length = 0usize;
        let mut chunked = false;

        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                request.push_str("\r\n");
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                chunked = true;
            }
            request.push_str(&line);
        }

        if chunked {
            loop {
                let mut size_line = String::new();
                reader.read_line(&mut size_line).unwrap();
                let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
                let mut chunk = vec![0; size + 2];
                reader.read_exact(&mut chunk).unwrap();
                if size == 0 {
                    break;
                }
                request.push_str(&String::from_utf8_lossy(&chunk[..size]));
            }
        } else {
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();
            request.push_str(&String::from_utf8_lossy(&body));
        }

        request
    }

    /// JSON body of a captured request
    fn request_json(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn client(base_url: &str) -> MailTmClient {
        MailTmClient::new(base_url, Duration::from_secs(10))
    }

    #[test]
    fn test_list_domains_keeps_active_only() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"hydra:member": [
                {"id": "1", "domain": "dollicons.com", "isActive": true},
                {"id": "2", "domain": "retired.example", "isActive": false}
            ]}"#,
        );

        let domains = client(&url).list_domains().unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("GET /domains "));
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].domain, "dollicons.com");
    }

    #[test]
    fn test_list_domains_server_error_is_unavailable() {
        let (url, server) = serve_once("503 Service Unavailable", "");
        let result = client(&url).list_domains();
        server.join().unwrap();

        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_create_account_success() {
        let (url, server) = serve_once(
            "201 Created",
            r#"{"id": "acc1", "address": "abc@dollicons.com", "quota": 40000000, "used": 0}"#,
        );

        let account = client(&url)
            .create_account("abc@dollicons.com", "secret")
            .unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /accounts "));
        let body = request_json(&request);
        assert_eq!(body["address"], "abc@dollicons.com");
        assert_eq!(body["password"], "secret");
        assert_eq!(account.id, "acc1");
        assert_eq!(account.address, "abc@dollicons.com");
    }

    #[test]
    fn test_create_account_rejected() {
        let (url, server) = serve_once(
            "422 Unprocessable Entity",
            r#"{"detail": "address: This value is already used."}"#,
        );

        let result = client(&url).create_account("taken@dollicons.com", "secret");
        server.join().unwrap();

        match result {
            Err(ProviderError::AccountCreationFailed(message)) => {
                assert!(message.contains("422"));
                assert!(message.contains("already used"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_acquire_token() {
        let (url, server) = serve_once("200 OK", r#"{"id": "acc1", "token": "jwt-token"}"#);

        let token = client(&url).acquire_token("abc@dollicons.com", "secret").unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("POST /token "));
        assert_eq!(request_json(&request)["address"], "abc@dollicons.com");
        assert_eq!(token, "jwt-token");
    }

    #[test]
    fn test_acquire_token_rejected() {
        let (url, server) = serve_once("401 Unauthorized", r#"{"message": "Invalid credentials."}"#);

        let result = client(&url).acquire_token("abc@dollicons.com", "wrong");
        server.join().unwrap();

        assert!(matches!(result, Err(ProviderError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_list_messages_sends_bearer() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"hydra:member": [
                {"id": "m1", "from": {"address": "a@b.c", "name": "A"}, "subject": "One"},
                {"id": "m2", "from": {"address": "d@e.f", "name": ""}, "subject": "Two"}
            ]}"#,
        );

        let messages = client(&url).list_messages("tok123").unwrap();
        let request = server.join().unwrap().to_ascii_lowercase();

        assert!(request.contains("authorization: bearer tok123"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].subject, "Two");
    }

    #[test]
    fn test_fetch_message_not_found_is_none() {
        let (url, server) = serve_once("404 Not Found", "");

        let result = client(&url).fetch_message("tok", "missing").unwrap();
        let request = server.join().unwrap();

        assert!(request.starts_with("GET /messages/missing "));
        assert!(result.is_none());
    }

    #[test]
    fn test_fetch_message() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"id": "m1", "from": {"address": "a@b.c"}, "to": [{"address": "me@x.com"}],
                "subject": "Hello", "text": "Body", "html": []}"#,
        );

        let message = client(&url).fetch_message("tok", "m1").unwrap().unwrap();
        server.join().unwrap();

        assert_eq!(message.subject, "Hello");
        assert_eq!(message.body(), "Body");
    }

    #[test]
    fn test_unreachable_host_is_unavailable() {
        // Grab a free port, then close it so nothing is listening
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let result = client(&format!("http://127.0.0.1:{}", port)).list_domains();
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client("https://api.mail.tm/");
        assert_eq!(client.base_url(), "https://api.mail.tm");
        assert_eq!(client.url("/domains"), "https://api.mail.tm/domains");
    }
}
