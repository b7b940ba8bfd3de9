use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{DeviceInfo, WalletProviderClient};
use crate::http_request::Request;
use crate::jose::{b64_decode, b64_encode, PublicJwk};
use crate::provider::ProviderKind;
use crate::{
    CustodyError, CustodyResult, KeyAttestation, KeyType, WalletInstanceCredentials,
    WalletProviderConfig,
};

#[derive(Serialize)]
struct ActivateRequest<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct AttestKeyRequest<'a> {
    key_id: &'a str,
    key_type: KeyType,
    public_jwk: &'a PublicJwk,
}

#[derive(Deserialize)]
struct AttestKeyResponse {
    attestation: String,
}

#[derive(Serialize)]
struct GenerateKeyRequest {
    key_type: KeyType,
}

#[derive(Deserialize)]
struct GenerateKeyResponse {
    key_id: String,
    attestation: String,
    key_type: KeyType,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    attestation: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Deserialize)]
struct SupportsKeyResponse {
    supported: bool,
}

/// [`WalletProviderClient`] over JSON/HTTPS.
pub struct HttpWalletProviderClient {
    base_url: String,
    request: Request,
}

impl HttpWalletProviderClient {
    /// Creates a client for the service described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidInput`] if the base URL is not HTTPS.
    pub fn new(config: &WalletProviderConfig) -> CustodyResult<Self> {
        config.validate()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request: Request::new(config),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> CustodyResult<Response> {
        log::debug!("wallet-provider request {path}");
        let response = self.request.handle(builder).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Unknown error"));
        Err(CustodyError::NetworkError {
            url: path.to_string(),
            status: Some(status.as_u16()),
            error,
        })
    }

    async fn parse<T: DeserializeOwned + Send>(response: Response, path: &str) -> CustodyResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| CustodyError::SerializationError {
            error: format!("failed to parse {path} response: {e}"),
        })
    }
}

fn authenticated(builder: RequestBuilder, credentials: &WalletInstanceCredentials) -> RequestBuilder {
    builder.basic_auth(&credentials.instance_id, Some(&credentials.instance_secret))
}

#[async_trait]
impl WalletProviderClient for HttpWalletProviderClient {
    async fn register_instance(
        &self,
        device_info: &DeviceInfo,
    ) -> CustodyResult<WalletInstanceCredentials> {
        let path = "/wallet-instances";
        let builder = self.request.post(&self.url(path)).json(device_info);
        let response = self.send(builder, path).await?;
        Self::parse(response, path).await
    }

    async fn activate_instance(
        &self,
        token: &str,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<()> {
        let path = format!("/wallet-instances/{}/activate", credentials.instance_id);
        let builder = authenticated(self.request.post(&self.url(&path)), credentials)
            .json(&ActivateRequest { token });
        self.send(builder, &path).await?;
        Ok(())
    }

    async fn attest_key(
        &self,
        key_id: &str,
        key_type: KeyType,
        public_jwk: &PublicJwk,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<String> {
        let path = "/keys/attestations";
        let builder = authenticated(self.request.post(&self.url(path)), credentials).json(
            &AttestKeyRequest {
                key_id,
                key_type,
                public_jwk,
            },
        );
        let response = self.send(builder, path).await?;
        let body: AttestKeyResponse = Self::parse(response, path).await?;
        Ok(body.attestation)
    }

    async fn generate_key(
        &self,
        key_type: KeyType,
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<KeyAttestation> {
        let path = "/keys";
        let builder = authenticated(self.request.post(&self.url(path)), credentials)
            .json(&GenerateKeyRequest { key_type });
        let response = self.send(builder, path).await?;
        let body: GenerateKeyResponse = Self::parse(response, path).await?;
        if body.key_type != key_type {
            return Err(CustodyError::InvalidAttestation {
                reason: format!(
                    "requested a {key_type} key, service returned {}",
                    body.key_type
                ),
            });
        }
        Ok(KeyAttestation {
            key_id: body.key_id,
            attestation: body.attestation,
            key_type: body.key_type,
            provider: ProviderKind::Remote,
        })
    }

    async fn sign(
        &self,
        attestation: &KeyAttestation,
        data: &[u8],
        credentials: &WalletInstanceCredentials,
    ) -> CustodyResult<Vec<u8>> {
        let path = format!("/keys/{}/signatures", attestation.key_id);
        let builder = authenticated(self.request.post(&self.url(&path)), credentials).json(
            &SignRequest {
                attestation: &attestation.attestation,
                data: b64_encode(data),
            },
        );

        let response = match self.send(builder, &path).await {
            Err(CustodyError::NetworkError {
                status: Some(status),
                ..
            }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Err(CustodyError::AttestationNotFound {
                    key_id: attestation.key_id.clone(),
                });
            }
            other => other?,
        };
        let body: SignResponse = Self::parse(response, &path).await?;
        b64_decode(&body.signature)
    }

    async fn supports_key(&self, key_type: KeyType) -> CustodyResult<bool> {
        let path = format!("/keys/types/{key_type}");
        let response = self.send(self.request.get(&self.url(&path)), &path).await?;
        let body: SupportsKeyResponse = Self::parse(response, &path).await?;
        Ok(body.supported)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    fn credentials() -> WalletInstanceCredentials {
        WalletInstanceCredentials {
            instance_id: "instance-1".to_string(),
            instance_secret: "s3cret".to_string(),
        }
    }

    // base64("instance-1:s3cret")
    const BASIC_AUTH: &str = "Basic aW5zdGFuY2UtMTpzM2NyZXQ=";

    fn client(server: &Server) -> HttpWalletProviderClient {
        let mut config = WalletProviderConfig::new(server.url());
        config.max_retries = 0;
        HttpWalletProviderClient::new(&config).expect("loopback url is accepted")
    }

    #[tokio::test]
    async fn test_register_instance() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/wallet-instances")
            .match_body(Matcher::PartialJson(json!({"platform": "android"})))
            .with_status(201)
            .with_body(r#"{"instance_id": "instance-1", "instance_secret": "s3cret"}"#)
            .create_async()
            .await;

        let device = DeviceInfo {
            platform: "android".to_string(),
            os_version: "15".to_string(),
            app_version: "1.0.0".to_string(),
            model: None,
        };
        let registered = client(&server).register_instance(&device).await.unwrap();
        assert_eq!(registered, credentials());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_attest_key_sends_public_jwk_with_basic_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/keys/attestations")
            .match_header("authorization", BASIC_AUTH)
            .match_body(Matcher::Json(json!({
                "key_id": "k1",
                "key_type": "EC",
                "public_jwk": {"kty": "EC", "crv": "P-256", "x": "eA", "y": "eQ"}
            })))
            .with_status(200)
            .with_body(r#"{"attestation": "a.b.c"}"#)
            .create_async()
            .await;

        let jwk = PublicJwk::Ec {
            crv: "P-256".to_string(),
            x: "eA".to_string(),
            y: "eQ".to_string(),
        };
        let attestation = client(&server)
            .attest_key("k1", KeyType::Ec, &jwk, &credentials())
            .await
            .unwrap();
        assert_eq!(attestation, "a.b.c");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_key() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/keys")
            .match_body(Matcher::Json(json!({"key_type": "RSA"})))
            .with_status(200)
            .with_body(r#"{"key_id": "remote-1", "attestation": "a.b.c", "key_type": "RSA"}"#)
            .create_async()
            .await;

        let attestation = client(&server)
            .generate_key(KeyType::Rsa, &credentials())
            .await
            .unwrap();
        assert_eq!(attestation.key_id, "remote-1");
        assert_eq!(attestation.key_type, KeyType::Rsa);
        assert_eq!(attestation.provider, ProviderKind::Remote);
    }

    #[tokio::test]
    async fn test_key_generation_is_sent_once_on_server_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/keys")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let mut config = WalletProviderConfig::new(server.url());
        config.max_retries = 3;
        let err = HttpWalletProviderClient::new(&config)
            .unwrap()
            .generate_key(KeyType::Ec, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::NetworkError {
                status: Some(503),
                ..
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_key_rejects_mismatched_type() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/keys")
            .with_status(200)
            .with_body(r#"{"key_id": "remote-1", "attestation": "a.b.c", "key_type": "EC"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .generate_key(KeyType::Rsa, &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::InvalidAttestation { .. }));
    }

    #[tokio::test]
    async fn test_sign_round_trips_base64url() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/keys/remote-1/signatures")
            .match_header("authorization", BASIC_AUTH)
            .match_body(Matcher::Json(json!({"attestation": "a.b.c", "data": "AQID"})))
            .with_status(200)
            .with_body(r#"{"signature": "BAUG"}"#)
            .create_async()
            .await;

        let attestation = KeyAttestation {
            key_id: "remote-1".to_string(),
            attestation: "a.b.c".to_string(),
            key_type: KeyType::Ec,
            provider: ProviderKind::Remote,
        };
        let signature = client(&server)
            .sign(&attestation, &[1, 2, 3], &credentials())
            .await
            .unwrap();
        assert_eq!(signature, vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn test_sign_unknown_key_is_attestation_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/keys/gone/signatures")
            .with_status(404)
            .create_async()
            .await;

        let attestation = KeyAttestation {
            key_id: "gone".to_string(),
            attestation: "a.b.c".to_string(),
            key_type: KeyType::Ec,
            provider: ProviderKind::Remote,
        };
        let err = client(&server)
            .sign(&attestation, b"data", &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::AttestationNotFound { ref key_id } if key_id == "gone"));
    }

    #[tokio::test]
    async fn test_supports_key() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/keys/types/RSA")
            .with_status(200)
            .with_body(r#"{"supported": false}"#)
            .create_async()
            .await;

        assert!(!client(&server).supports_key(KeyType::Rsa).await.unwrap());
    }

    #[tokio::test]
    async fn test_error_status_surfaces_as_network_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/wallet-instances/instance-1/activate")
            .with_status(401)
            .with_body("bad credentials")
            .create_async()
            .await;

        let err = client(&server)
            .activate_instance("token", &credentials())
            .await
            .unwrap_err();
        match err {
            CustodyError::NetworkError { url, status, error } => {
                assert_eq!(url, "/wallet-instances/instance-1/activate");
                assert_eq!(status, Some(401));
                assert_eq!(error, "bad credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_serialization_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/keys/types/EC")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client(&server).supports_key(KeyType::Ec).await.unwrap_err();
        assert!(matches!(err, CustodyError::SerializationError { .. }));
    }
}
