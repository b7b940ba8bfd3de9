use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};

use crate::{CustodyError, CustodyResult, WalletProviderConfig};

/// A thin wrapper on an HTTP client. Sets the timeout and user-agent, and retries
/// transient failures (connect errors, timeouts, 429 and 5xx responses) of
/// idempotent requests.
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    /// Initializes a new `Request` from the wallet-provider settings.
    pub(crate) fn new(config: &WalletProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("keycustody-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    /// Creates a POST request builder with defaults applied.
    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `req`/`get`/`post`.
    ///
    /// Only idempotent methods are retried. A `POST` that times out or gets a
    /// 5xx may still have taken effect (a key generated, an instance
    /// registered), so it is sent exactly once and the failure is returned.
    pub(crate) async fn handle(&self, request_builder: RequestBuilder) -> CustodyResult<Response> {
        let (client, request) = request_builder.build_split();
        let request = request.map_err(|err| {
            RequestHandleError::permanent(
                err.url()
                    .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
                None,
                format!("request build failed: {err}"),
            )
        })?;

        if !request.method().is_idempotent() {
            return execute_request(&client, request).await.map_err(Into::into);
        }
        let Some(template) = request.try_clone() else {
            return execute_request(&client, request).await.map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request = template.try_clone().ok_or_else(|| {
                RequestHandleError::permanent(
                    template.url().to_string(),
                    None,
                    "request body cannot be replayed".to_string(),
                )
            })?;
            execute_request(&client, request).await
        })
        .retry(backoff)
        .when(RequestHandleError::is_retryable)
        .notify(|err: &RequestHandleError, delay: Duration| {
            log::debug!("retrying {} in {delay:?} after: {}", err.url, err.error);
        })
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug)]
struct RequestHandleError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl RequestHandleError {
    const fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<RequestHandleError> for CustodyError {
    fn from(value: RequestHandleError) -> Self {
        Self::NetworkError {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute_request(
    client: &reqwest::Client,
    request: reqwest::Request,
) -> Result<Response, RequestHandleError> {
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(RequestHandleError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(RequestHandleError::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }

            Err(RequestHandleError::permanent(
                url,
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::Server;

    use super::*;

    fn request(max_retries: u32) -> Request {
        Request::new(&WalletProviderConfig {
            base_url: "http://127.0.0.1".to_string(),
            timeout_secs: 5,
            max_retries,
        })
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_exhausted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let req = request(2);
        let err = req
            .handle(req.get(&format!("{}/flaky", server.url())))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CustodyError::NetworkError { status: Some(503), .. }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_posts_are_sent_once_even_on_server_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/wallet-instances")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let req = request(3);
        let err = req
            .handle(req.post(&format!("{}/wallet-instances", server.url())))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CustodyError::NetworkError { status: Some(503), .. }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/keys")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let req = request(3);
        let resp = req
            .handle(req.post(&format!("{}/keys", server.url())))
            .await
            .expect("4xx responses are returned to the caller");

        assert_eq!(resp.status().as_u16(), 400);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_user_agent_is_set() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .match_header(
                "user-agent",
                format!("keycustody-core/{}", env!("CARGO_PKG_VERSION")).as_str(),
            )
            .with_status(200)
            .create_async()
            .await;

        let req = request(0);
        req.handle(req.get(&format!("{}/ping", server.url())))
            .await
            .expect("ok");
        mock.assert_async().await;
    }
}
