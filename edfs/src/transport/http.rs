use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio_retry::{strategy::ExponentialBackoff, RetryIf};
use tracing::{debug, instrument, warn};
use url::Url;

use super::BrickTransport;
use crate::{security::SecurityContext, B3Digest, Error};

/// Tunables for [HttpBrickTransport], parsed from the endpoint's query
/// string (`http://host/?retries=5&timeout_secs=10`).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HttpTransportConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,

    /// How often a transient failure (connection error, 5xx) is retried.
    pub retries: usize,

    /// Base of the exponential backoff between retries, in milliseconds.
    /// Delays are capped at 5 seconds.
    pub backoff_millis: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
            backoff_millis: 50,
        }
    }
}

impl HttpTransportConfig {
    fn from_url(url: &Url) -> Result<Self, Error> {
        serde_qs::from_str(url.query().unwrap_or_default())
            .map_err(|e| Error::InvalidRequest(format!("invalid http transport options: {}", e)))
    }
}

/// Talks the brick HTTP protocol served by [crate::http::gen_router]:
/// `HEAD`, `GET` and `PUT` on `bricks/<hex digest>` relative to the base url.
#[derive(Clone)]
pub struct HttpBrickTransport {
    endpoint: Url,
    base_url: Url,
    http_client: reqwest::Client,
    bearer_token: Option<String>,
    config: HttpTransportConfig,
}

/// Outcome of a single attempt, telling [RetryIf] whether to try again.
enum AttemptError {
    Transient(String),
    Fatal(Error),
}

impl From<reqwest::Error> for AttemptError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_connect() || value.is_timeout() {
            AttemptError::Transient(value.without_url().to_string())
        } else {
            AttemptError::Fatal(value.into())
        }
    }
}

impl HttpBrickTransport {
    /// Constructs a new transport for the given endpoint.
    /// Options are read from the query string, see [HttpTransportConfig].
    pub fn from_url(url: &Url, security_context: &SecurityContext) -> Result<Self, Error> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::InvalidRequest(format!(
                    "unsupported scheme for http transport: {}",
                    scheme
                )))
            }
        }
        if !url.has_host() {
            return Err(Error::InvalidRequest("http transport needs a host".into()));
        }

        let config = HttpTransportConfig::from_url(url)?;

        // Url::join treats the last path segment as a file unless it ends
        // with a slash.
        let mut base_url = url.clone();
        base_url.set_query(None);
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: url.clone(),
            base_url,
            http_client,
            bearer_token: security_context.bearer_token().map(ToOwned::to_owned),
            config,
        })
    }

    fn brick_url(&self, digest: &B3Digest) -> Result<Url, Error> {
        self.base_url
            .join(&format!("bricks/{}", digest.to_hex()))
            .map_err(|e| {
                warn!(e = %e, "unable to join URL");
                Error::InvalidRequest("unable to join url".into())
            })
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Sends the request built by `mk_req`, retrying transient failures with
    /// exponential backoff. Responses with status 404 are returned as-is,
    /// other non-success statuses are turned into errors.
    async fn send<F>(&self, mk_req: F) -> Result<Response, Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let strategy = ExponentialBackoff::from_millis(self.config.backoff_millis)
            .max_delay(Duration::from_secs(5))
            .take(self.config.retries);

        RetryIf::spawn(
            strategy,
            || async {
                let resp = self.authorize(mk_req()).send().await?;
                let status = resp.status();
                if status.is_success() || status == StatusCode::NOT_FOUND {
                    Ok(resp)
                } else if status.is_server_error() {
                    debug!(status = %status, "transient server error");
                    Err(AttemptError::Transient(format!("server responded {}", status)))
                } else {
                    Err(AttemptError::Fatal(Error::Transport(format!(
                        "server responded {}",
                        status
                    ))))
                }
            },
            |e: &AttemptError| matches!(e, AttemptError::Transient(_)),
        )
        .await
        .map_err(|e| match e {
            AttemptError::Transient(msg) => {
                warn!(err = %msg, "giving up after retries");
                Error::Transport(msg)
            }
            AttemptError::Fatal(e) => e,
        })
    }
}

#[async_trait]
impl BrickTransport for HttpBrickTransport {
    #[instrument(skip_all, err, fields(brick.digest=%digest))]
    async fn has(&self, digest: &B3Digest) -> Result<bool, Error> {
        let url = self.brick_url(digest)?;
        let resp = self.send(|| self.http_client.head(url.clone())).await?;
        Ok(resp.status() != StatusCode::NOT_FOUND)
    }

    #[instrument(skip_all, err, fields(brick.digest=%digest, brick.size=data.len()))]
    async fn store_brick(&self, digest: &B3Digest, data: Bytes) -> Result<(), Error> {
        let url = self.brick_url(digest)?;
        let resp = self
            .send(|| self.http_client.put(url.clone()).body(data.clone()))
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::Transport(format!("no brick endpoint at {}", url)));
        }
        Ok(())
    }

    #[instrument(skip_all, err, fields(brick.digest=%digest))]
    async fn fetch_brick(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        let url = self.brick_url(digest)?;
        let resp = self.send(|| self.http_client.get(url.clone())).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.bytes().await?))
    }

    fn endpoint(&self) -> Url {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Router};
    use rstest::rstest;
    use url::Url;

    use super::{HttpBrickTransport, HttpTransportConfig};
    use crate::transport::BrickTransport;
    use crate::{fixtures::HELLO_DIGEST, security::SecurityContext, Error};

    /// Answers the first `failures` requests with `status`, then 200.
    struct Flaky {
        status: StatusCode,
        failures: usize,
        requests: AtomicUsize,
    }

    async fn flaky(State(flaky): State<Arc<Flaky>>) -> StatusCode {
        if flaky.requests.fetch_add(1, Ordering::SeqCst) < flaky.failures {
            flaky.status
        } else {
            StatusCode::OK
        }
    }

    async fn spawn_flaky(status: StatusCode, failures: usize) -> (Url, Arc<Flaky>) {
        let state = Arc::new(Flaky {
            status,
            failures,
            requests: AtomicUsize::new(0),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new().fallback(flaky).with_state(state.clone());
        tokio::spawn(async move { axum::serve(listener, app).await });

        (Url::parse(&format!("http://{}/", addr)).unwrap(), state)
    }

    #[rstest]
    #[case::recovers(StatusCode::SERVICE_UNAVAILABLE, 2, 3, true, 3)]
    #[case::retries_exhausted(StatusCode::SERVICE_UNAVAILABLE, 5, 2, false, 3)]
    #[case::no_retries(StatusCode::INTERNAL_SERVER_ERROR, 1, 0, false, 1)]
    #[case::client_error(StatusCode::BAD_REQUEST, 1, 3, false, 1)]
    #[tokio::test]
    async fn retry_policy(
        #[case] status: StatusCode,
        #[case] failures: usize,
        #[case] retries: usize,
        #[case] ok: bool,
        #[case] expected_requests: usize,
    ) {
        let (mut url, flaky) = spawn_flaky(status, failures).await;
        url.set_query(Some(&format!("retries={}&backoff_millis=1", retries)));
        let transport = HttpBrickTransport::from_url(&url, &SecurityContext::default()).unwrap();

        let res = transport.has(&HELLO_DIGEST).await;
        if ok {
            assert!(res.expect("must succeed"));
        } else {
            assert!(matches!(res, Err(Error::Transport(_))));
        }
        assert_eq!(expected_requests, flaky.requests.load(Ordering::SeqCst));
    }

    #[rstest]
    #[case::defaults("http://localhost:8000/", HttpTransportConfig::default())]
    #[case::options(
        "http://localhost:8000/?retries=0&timeout_secs=1",
        HttpTransportConfig { retries: 0, timeout_secs: 1, ..Default::default() }
    )]
    fn parse_options(#[case] uri: &str, #[case] expected: HttpTransportConfig) {
        let url = Url::parse(uri).unwrap();
        let transport = HttpBrickTransport::from_url(&url, &SecurityContext::default())
            .expect("must parse");
        assert_eq!(expected, transport.config);
        assert_eq!(url, transport.endpoint);
    }

    #[test]
    fn unknown_option_rejected() {
        let url = Url::parse("http://localhost:8000/?colour=blue").unwrap();
        assert!(HttpBrickTransport::from_url(&url, &SecurityContext::default()).is_err());
    }

    #[rstest]
    #[case::root("http://localhost:8000", "http://localhost:8000/bricks/")]
    #[case::nested("http://localhost:8000/edfs", "http://localhost:8000/edfs/bricks/")]
    #[case::nested_slash("http://localhost:8000/edfs/?retries=1", "http://localhost:8000/edfs/bricks/")]
    fn brick_url(#[case] uri: &str, #[case] prefix: &str) {
        let transport =
            HttpBrickTransport::from_url(&Url::parse(uri).unwrap(), &SecurityContext::default())
                .unwrap();
        assert_eq!(
            format!("{}{}", prefix, HELLO_DIGEST.to_hex()),
            transport.brick_url(&HELLO_DIGEST).unwrap().as_str()
        );
    }
}
