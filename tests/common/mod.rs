#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    /// Spawn the server on the in-memory store with extra environment
    pub async fn start(envs: &[(&str, &str)]) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_mws-api"));
        cmd.env("MWS_API_PORT", port.to_string())
            .env("MWS_STORE_BACKEND", "memory")
            .env("MWS_COOKIE_SECRET", "integration-test-secret")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn().context("failed to spawn server binary")?;
        let server = Self { port, base_url, child };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A client that keeps cookies, like a browser tab
    pub fn browser(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("failed to build http client")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// GET with the JSON payload as the query string, the way the browser shell sends it
pub async fn get_json(client: &reqwest::Client, url: &str, payload: &Value) -> Result<reqwest::Response> {
    let url = format!("{}?{}", url, url::form_urlencoded::byte_serialize(payload.to_string().as_bytes()).collect::<String>());
    Ok(client.get(url).send().await?)
}

pub async fn create_workspace(server: &TestServer, client: &reqwest::Client) -> Result<String> {
    let body: Value = client.post(server.url("/mws/")).send().await?.json().await?;
    body["res_id"]
        .as_str()
        .map(str::to_string)
        .with_context(|| format!("no res_id in {}", body))
}
