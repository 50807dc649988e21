//! Client for the confidential-compute endpoint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::EnclaveError;

pub const PROCESS_DATA_PATH: &str = "process_data";

#[derive(Debug, Serialize)]
struct ProcessDataRequest<'a> {
    encrypted_data_b64: String,
    blob_id: &'a str,
}

/// Forwards ciphertext to an enclave for processing.
#[derive(Debug, Clone)]
pub struct EnclaveClient {
    pub remote: Url,
    client: Client,
}

impl EnclaveClient {
    pub fn new(remote: &Url) -> Result<Self, EnclaveError> {
        let client = Client::builder().build()?;
        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    /// `POST /process_data` with the base64 ciphertext and the blob it came from.
    ///
    /// A non-2xx answer is surfaced with its status and literal body.
    pub async fn process(
        &self,
        encrypted: &[u8],
        blob_id: &str,
    ) -> Result<serde_json::Value, EnclaveError> {
        let joined = format!(
            "{}/{}",
            self.remote.as_str().trim_end_matches('/'),
            PROCESS_DATA_PATH
        );
        let url =
            Url::parse(&joined).map_err(|e| EnclaveError::Transport(format!("{joined}: {e}")))?;

        tracing::debug!(%url, blob_id, size = encrypted.len(), "forwarding to enclave");

        let response = self
            .client
            .post(url)
            .json(&ProcessDataRequest {
                encrypted_data_b64: STANDARD.encode(encrypted),
                blob_id,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(EnclaveError::Status {
                status: status.as_u16(),
                body: response.text().await?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn test_process_echoes_json() {
        let router = Router::new().route(
            "/process_data",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "blob": body["blob_id"],
                    "len": body["encrypted_data_b64"].as_str().map(str::len),
                }))
            }),
        );
        let client = EnclaveClient::new(&serve(router).await).unwrap();

        let out = client.process(b"abc", "blob-1").await.unwrap();
        assert_eq!(out["blob"], "blob-1");
        assert_eq!(out["len"], 4);
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let router = Router::new().route(
            "/process_data",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "enclave busy") }),
        );
        let client = EnclaveClient::new(&serve(router).await).unwrap();

        let err = client.process(b"abc", "blob-1").await.unwrap_err();
        match &err {
            EnclaveError::Status { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "enclave busy");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let err = EnclaveClient::new(&url)
            .unwrap()
            .process(b"abc", "blob-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EnclaveError::Transport(_)));
    }
}
