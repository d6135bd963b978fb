//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use live_preview::compile::{CompileOptions, CompileResult, CompileStats, Compiler};
use live_preview::{ServerConfig, ServerHandle};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Wraps the script in a document. A script containing `BROKEN` fails to compile.
#[derive(Debug, Default)]
pub struct FakeCompiler {
    pub compiles: AtomicUsize,
    pub released: AtomicUsize,
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, options: &CompileOptions) -> CompileResult {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let script = match tokio::fs::read_to_string(&options.input).await {
            Ok(script) => script,
            Err(e) => return CompileResult::failure(e.to_string()),
        };
        if script.contains("BROKEN") {
            return CompileResult {
                warnings: vec!["script is broken".to_string()],
                ..CompileResult::failure("unexpected token at line 1")
            };
        }

        let html = format!("<html><body>{}</body></html>", script.trim());
        if let Err(e) = tokio::fs::write(&options.output, &html).await {
            return CompileResult::failure(e.to_string());
        }
        CompileResult {
            success: true,
            output_path: Some(options.output.clone()),
            stats: Some(CompileStats {
                scene_count: 1,
                output_size: html.len() as u64,
                ..CompileStats::default()
            }),
            ..CompileResult::default()
        }
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestServer {
    pub handle: ServerHandle,
    pub compiler: Arc<FakeCompiler>,
    pub script: PathBuf,
    pub dir: TempDir,
}

impl TestServer {
    /// Start a server on an ephemeral port around a script containing `content`.
    pub async fn start(content: &str, configure: impl FnOnce(&mut ServerConfig, &TempDir)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.yaml");
        std::fs::write(&script, content).unwrap();

        let mut config = ServerConfig::from(script.as_path());
        config.listener.port = 0;
        config.watch.enabled = false;
        config.compiler.output_dir = Some(dir.path().to_path_buf());
        configure(&mut config, &dir);

        let compiler = Arc::new(FakeCompiler::default());
        let validator = live_preview::validator::from_config(&config.validator);
        let handle = live_preview::start(config, compiler.clone(), validator)
            .await
            .unwrap();

        Self {
            handle,
            compiler,
            script,
            dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.handle.local_addr(), path)
    }

    pub async fn connect(&self) -> Client {
        let url = format!("ws://{}/ws", self.handle.local_addr());
        let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        client
    }

    pub async fn status(&self) -> Value {
        reqwest::get(self.url("/api/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Poll `/api/status` until `clients` reaches `n`.
    pub async fn wait_for_clients(&self, n: u64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if self.status().await["clients"] == n {
                return;
            }
            assert!(tokio::time::Instant::now() < deadline, "never saw {} clients", n);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn force_reload(&self) {
        let response = reqwest::Client::new()
            .post(self.url("/api/reload"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}

/// Next JSON event other than a heartbeat ping.
pub async fn next_event(client: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let event: Value = serde_json::from_str(text.as_str()).unwrap();
                    if event["type"] != "ping" {
                        return event;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended while waiting for an event: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}
