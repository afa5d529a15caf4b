//! Integration tests for the tempmail crate
//!
//! These tests drive the session against real storage backends and a
//! scripted HTTP provider.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tempmail::models::NewReceivedEmail;
use tempmail::storage::{AccountStore, BackendKind, LocalFileStore, Storage};
use tempmail::{ConnectionManager, DatabaseConfig, MailTmClient, ProbeReason, Session, TempmailConfig};

/// Scripted provider: answers `requests` connections, routing on "METHOD /path"
fn serve_routes(
    routes: Vec<(&'static str, &'static str, String)>,
    requests: usize,
) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let routes: HashMap<&'static str, (&'static str, String)> = routes
        .into_iter()
        .map(|(route, status, body)| (route, (status, body)))
        .collect();

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..requests {
            let (mut stream, _) = listener.accept().unwrap();
            let request_line = read_request(&mut stream);
            let route = request_line
                .split_whitespace()
                .take(2)
                .collect::<Vec<_>>()
                .join(" ");

            let (status, body) = routes
                .get(route.as_str())
                .cloned()
                .unwrap_or(("404 Not Found", "{}".to_string()));
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/ld+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            seen.push(route);
        }
        seen
    });

    (format!("http://{}", addr), handle)
}

/// Consume one request, returning its request line
fn read_request(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line == "\r\n" || line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap();
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
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
        }
    } else {
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
    }

    request_line
}

fn message_json(id: &str) -> String {
    format!(
        r#"{{"id":"{id}","from":{{"address":"news@example.org","name":"News"}},"to":[{{"address":"box@example.com","name":""}}],"subject":"Hello {id}","text":"Text of {id}","html":[],"createdAt":"2024-05-01T10:00:00+00:00"}}"#
    )
}

fn summary_json(id: &str) -> String {
    format!(
        r#"{{"id":"{id}","from":{{"address":"news@example.org","name":"News"}},"to":[],"subject":"Hello {id}","intro":"","seen":false,"createdAt":"2024-05-01T10:00:00+00:00"}}"#
    )
}

#[test]
fn test_local_file_upsert_keeps_single_record() {
    let dir = TempDir::new().unwrap();
    let store = LocalFileStore::new(dir.path().join("accounts.json"));

    store.save_account("a@x.com", "p1").unwrap();
    store.save_account("a@x.com", "p2").unwrap();

    let account = store.get_account_by_email("a@x.com").unwrap().unwrap();
    assert_eq!(account.password, "p2");
    assert_eq!(
        store
            .get_all_accounts()
            .unwrap()
            .iter()
            .filter(|a| a.email == "a@x.com")
            .count(),
        1
    );
}

#[test]
fn test_session_against_http_provider() {
    let listing = format!(
        r#"{{"hydra:member":[{},{}],"hydra:totalItems":2}}"#,
        summary_json("m1"),
        summary_json("m2")
    );
    let (base_url, server) = serve_routes(
        vec![
            (
                "GET /domains",
                "200 OK",
                r#"{"hydra:member":[{"id":"d1","domain":"example.com","isActive":true,"isPrivate":false}]}"#.to_string(),
            ),
            (
                "POST /accounts",
                "201 Created",
                r#"{"id":"a1","address":"box@example.com","quota":40000000,"used":0,"isDisabled":false}"#.to_string(),
            ),
            ("POST /token", "200 OK", r#"{"id":"a1","token":"jwt-1"}"#.to_string()),
            ("GET /messages", "200 OK", listing),
            ("GET /messages/m1", "200 OK", message_json("m1")),
            // m2 answers 404 and is skipped
        ],
        6,
    );

    let dir = TempDir::new().unwrap();
    let client = MailTmClient::new(base_url, Duration::from_secs(10));
    let session = Session::new(client, Storage::local_file(dir.path().join("accounts.json")));

    let created = session.create_account().unwrap();
    assert_eq!(created.account.address, "box@example.com");
    assert_eq!(created.token.as_deref(), Some("jwt-1"));

    let stats = session.fetch_and_store_messages(created.account_id).unwrap();
    assert_eq!(stats.listed, 2);
    assert_eq!(stats.stored, 1);
    assert_eq!(stats.failed, 1);

    let seen = server.join().unwrap();
    assert_eq!(
        seen,
        vec![
            "GET /domains",
            "POST /accounts",
            "POST /token",
            "GET /messages",
            "GET /messages/m1",
            "GET /messages/m2",
        ]
    );

    // A fresh handle on the same file sees everything
    let reopened = LocalFileStore::new(dir.path().join("accounts.json"));
    let emails = reopened
        .get_received_emails_by_account(created.account_id)
        .unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, "Hello m1");
    assert_eq!(emails[0].body, "Text of m1");
    assert_eq!(emails[0].recipient.as_deref(), Some("box@example.com"));
    assert_eq!(
        reopened.get_valid_token(created.account_id).unwrap().as_deref(),
        Some("jwt-1")
    );
}

#[test]
fn test_sqlite_storage_fetch_is_idempotent() {
    let listing = format!(
        "[{}]",
        ["m1", "m2", "m3", "m4", "m5"]
            .iter()
            .map(|id| summary_json(id))
            .collect::<Vec<_>>()
            .join(",")
    );
    // One listing plus three detail requests
    let (base_url, server) = serve_routes(
        vec![
            ("GET /messages", "200 OK", listing),
            ("GET /messages/m3", "200 OK", message_json("m3")),
            ("GET /messages/m4", "200 OK", message_json("m4")),
            ("GET /messages/m5", "200 OK", message_json("m5")),
        ],
        4,
    );

    let dir = TempDir::new().unwrap();
    let manager = ConnectionManager::new(Some(DatabaseConfig::Sqlite {
        path: dir.path().join("tempmail.db"),
    }));
    let storage = Storage::open(&manager, dir.path().join("accounts.json"), true);
    assert_eq!(storage.backend_kind(), BackendKind::Sqlite);

    let id = storage.save_account("box@example.com", "pw").unwrap();
    storage.save_token(id, "jwt", 24).unwrap();
    for mid in ["m1", "m2"] {
        storage
            .save_received_email(NewReceivedEmail::new(id, "s", "x", "y").message_id(mid))
            .unwrap();
    }

    let session = Session::new(MailTmClient::new(base_url, Duration::from_secs(10)), storage);
    let stats = session.fetch_and_store_messages(id).unwrap();
    assert_eq!(stats.stored, 3);
    assert_eq!(stats.skipped, 2);
    assert_eq!(server.join().unwrap().len(), 4);

    let emails = session.store().get_received_emails_by_account(id).unwrap();
    assert_eq!(emails.len(), 5);
    assert!(!dir.path().join("accounts.json").exists());
}

#[test]
fn test_backend_choice_survives_database_coming_up() {
    let dir = TempDir::new().unwrap();
    let manager = ConnectionManager::new(Some(DatabaseConfig::Sqlite {
        path: dir.path().join("later").join("tempmail.db"),
    }));

    let storage = Storage::open(&manager, dir.path().join("accounts.json"), false);
    assert_eq!(storage.backend_kind(), BackendKind::LocalFile);
    assert_eq!(
        storage.problem().unwrap().reason,
        Some(ProbeReason::DriverError)
    );

    storage.save_account("a@x.com", "p").unwrap();
    let first = storage.get_all_accounts().unwrap();

    std::fs::create_dir(dir.path().join("later")).unwrap();
    assert!(manager.acquire_connection().is_ok());

    let second = storage.get_all_accounts().unwrap();
    assert_eq!(first, second);
    assert_eq!(storage.backend_kind(), BackendKind::LocalFile);
}

#[test]
fn test_open_session_from_config() {
    let dir = TempDir::new().unwrap();
    let data_file = dir.path().join("store.json");
    let config = TempmailConfig {
        data_file: Some(data_file.clone()),
        ..TempmailConfig::default()
    };

    let (session, manager) = tempmail::open_session(&config).unwrap();
    assert!(manager.database().is_none());
    assert_eq!(session.store().backend_kind(), BackendKind::LocalFile);

    session.store().save_account("a@x.com", "p").unwrap();
    assert!(data_file.exists());
}
