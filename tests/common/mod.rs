//! Common test utilities for Kindred integration tests
//!
//! Provides a stub CoreNLP server, fixture corpora and helpers for
//! launching throwaway "server" processes.

#![allow(dead_code)]

pub mod stub_corenlp;

pub use stub_corenlp::{flat_annotation, StubCoreNlp};

use kindred::{Document, Entity, ServerConfig, Span};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

pub const ERLOTINIB_TEXT: &str = "Erlotinib is a common treatment for NSCLC.";

/// CoreNLP output for `ERLOTINIB_TEXT`
pub fn erlotinib_annotation() -> Value {
    serde_json::from_str(include_str!("../fixtures/erlotinib.json")).unwrap()
}

pub fn erlotinib_document() -> Document {
    Document::new(ERLOTINIB_TEXT)
        .with_source("erlotinib.txt")
        .with_entity(Entity::new(1, "drug", Span::new(0, 9)))
        .with_entity(Entity::new(2, "cancer", Span::new(36, 41)))
}

/// A port nothing is listening on
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Server config that runs `sh -c <script>` instead of Java and polls `port`.
/// The trailing CoreNLP flags become positional parameters of the script.
pub fn shell_server(script: &str, port: u16) -> ServerConfig {
    ServerConfig {
        program: "sh".to_string(),
        runtime_args: vec!["-c".to_string(), script.to_string()],
        main_class: "corenlp-stub".to_string(),
        ..ServerConfig::default()
    }
    .with_port(port)
    .with_health_check(5, Duration::from_millis(50))
    .with_startup_grace(Duration::from_millis(10))
}

/// Only one managed server may exist per process, so tests that launch one
/// take turns.
pub async fn server_slot() -> tokio::sync::MutexGuard<'static, ()> {
    static SLOT: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();
    SLOT.get_or_init(|| tokio::sync::Mutex::new(())).lock().await
}
