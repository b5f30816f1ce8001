// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! reqwest-backed health probe and inference client.

use std::time::Duration;

use async_trait::async_trait;
use evaluator_core::{HealthProbe, InferenceClient, Payload, PayloadEncoding, TransportError};
use reqwest::multipart::{Form, Part};
use reqwest::Client;

fn transport_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::TimedOut { after: timeout }
    } else if e.is_connect() {
        TransportError::Connect {
            reason: e.to_string(),
        }
    } else {
        TransportError::Request {
            reason: e.to_string(),
        }
    }
}

/// `GET` against the health endpoint.
#[derive(Clone)]
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        Ok(response.status().as_u16())
    }
}

/// `POST` of the payload to the model's prediction endpoint. The response
/// body is read to completion so the measured time covers the whole exchange.
#[derive(Clone)]
pub struct HttpInferenceClient {
    client: Client,
}

impl HttpInferenceClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn infer(
        &self,
        url: &str,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let request = self.client.post(url).timeout(timeout);
        let request = match &payload.encoding {
            PayloadEncoding::Multipart { field } => {
                let part = Part::bytes(payload.bytes.clone()).file_name(payload.file_name.clone());
                request.multipart(Form::new().part(field.clone(), part))
            }
            PayloadEncoding::Raw => request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(payload.bytes.clone()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let status = response.status().as_u16();
        response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use std::net::SocketAddr;

    async fn predict(headers: HeaderMap, body: Bytes) -> (StatusCode, &'static str) {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let body = String::from_utf8_lossy(&body);

        let multipart_ok =
            content_type.starts_with("multipart/form-data") && body.contains("name=\"data\"");
        let raw_ok = content_type == "application/octet-stream" && body == "PIXELS";
        if multipart_ok || raw_ok {
            (StatusCode::OK, r#"{"tabby": 0.93}"#)
        } else {
            (StatusCode::BAD_REQUEST, "bad payload")
        }
    }

    async fn spawn_server() -> SocketAddr {
        let app = Router::new()
            .route("/ping", get(|| async { "Healthy" }))
            .route("/busy", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/predictions/{model}", post(predict));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn payload(encoding: PayloadEncoding) -> Payload {
        Payload::new(b"PIXELS".to_vec(), "sample.png", encoding)
    }

    #[tokio::test]
    async fn test_probe_reports_status() {
        let addr = spawn_server().await;
        let probe = HttpHealthProbe::new().unwrap();
        let timeout = Duration::from_secs(5);

        let status = probe
            .probe(&format!("http://{}/ping", addr), timeout)
            .await
            .unwrap();
        assert_eq!(status, 200);

        let status = probe
            .probe(&format!("http://{}/busy", addr), timeout)
            .await
            .unwrap();
        assert_eq!(status, 503);
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpHealthProbe::new()
            .unwrap()
            .probe(&format!("http://{}/ping", addr), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_inference_multipart_and_raw() {
        let addr = spawn_server().await;
        let client = HttpInferenceClient::new().unwrap();
        let url = format!("http://{}/predictions/resnet50", addr);
        let timeout = Duration::from_secs(5);

        let status = client
            .infer(&url, &payload(PayloadEncoding::default()), timeout)
            .await
            .unwrap();
        assert_eq!(status, 200);

        let status = client
            .infer(&url, &payload(PayloadEncoding::Raw), timeout)
            .await
            .unwrap();
        assert_eq!(status, 200);

        let wrong_field = PayloadEncoding::Multipart {
            field: "image".to_string(),
        };
        let status = client
            .infer(&url, &payload(wrong_field), timeout)
            .await
            .unwrap();
        assert_eq!(status, 400);
    }
}
