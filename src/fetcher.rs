use crate::status::{Status, StatusSink};
use crate::types::{FetchOutcome, Provider, Record};
use crate::{LeadConfig, LeadError, Result};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Upstream bodies quoted in errors are cut to this many characters.
const MAX_ERROR_BODY: usize = 200;

/// One provider request, built once and resent on every attempt.
#[derive(Debug, Clone)]
pub struct LeadRequest {
    /// The URL the payload is posted to.
    pub url: String,
    /// Extra headers, e.g. the API key.
    pub headers: Vec<(&'static str, String)>,
    /// The JSON payload.
    pub body: Value,
}

/// Sends a request and returns the response body of a successful answer.
///
/// Implementations report timeouts as `LeadError::Timeout` so the fetcher can retry them.
pub trait Transport: Send + Sync {
    fn send(&self, request: &LeadRequest) -> impl Future<Output = Result<String>> + Send;
}

/// Waits between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// The `HttpTransport` struct posts requests with `reqwest`, bounded by the configured timeout.
pub struct HttpTransport {
    /// The HTTP client used for making requests.
    client: Client,
}

impl HttpTransport {
    /// Creates a new `HttpTransport` with the timeout and user agent from `config`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the transport, or an error if the client could not be created.
    pub fn new(config: &LeadConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &LeadRequest) -> Result<String> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            // The status decides the error; a body that fails to arrive is only lost context.
            let body = response.text().await.unwrap_or_default();
            return Err(LeadError::UpstreamStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// The `LeadFetcher` struct queries one provider and normalizes its answer into records.
///
/// Timeouts are retried with linear backoff: after failed attempt `n` the fetcher
/// waits `n * base_delay`. Any other failure ends the fetch at once.
pub struct LeadFetcher<T = HttpTransport, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    provider: Provider,
    endpoint: String,
    api_key: String,
    region: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl LeadFetcher {
    /// Creates a fetcher for `provider` that talks HTTP and sleeps on the tokio timer.
    pub fn new(config: &LeadConfig, provider: Provider) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_parts(config, provider, transport, TokioSleeper))
    }
}

impl<T: Transport, S: Sleeper> LeadFetcher<T, S> {
    /// Creates a fetcher with a custom transport and sleeper.
    pub fn with_parts(config: &LeadConfig, provider: Provider, transport: T, sleeper: S) -> Self {
        let provider_config = match provider {
            Provider::Maps => &config.maps,
            Provider::Profiles => &config.profiles,
        };

        Self {
            transport,
            sleeper,
            provider,
            endpoint: provider_config.endpoint.clone(),
            api_key: provider_config.api_key.clone(),
            region: config.region.clone(),
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Fetches up to `limit` records using the configured number of attempts.
    pub async fn fetch(&self, query: &str, limit: usize, sink: &dyn StatusSink) -> FetchOutcome {
        self.fetch_with_attempts(query, limit, self.max_attempts, sink)
            .await
    }

    /// Fetches up to `limit` records, sending the request at most `max_attempts` times.
    ///
    /// Emits a start message, one message per retry, and exactly one terminal message.
    #[instrument(skip(self, sink), fields(provider = %self.provider))]
    pub async fn fetch_with_attempts(
        &self,
        query: &str,
        limit: usize,
        max_attempts: u32,
        sink: &dyn StatusSink,
    ) -> FetchOutcome {
        if let Err(e) = check_arguments(query, limit, max_attempts) {
            sink.notify(Status::error(format!("{} error: {}", self.provider, e)));
            return FetchOutcome::Failure(e);
        }

        sink.notify(Status::info(format!(
            "Starting {} search for: '{}'",
            self.provider, query
        )));

        match self.try_fetch(query, limit, max_attempts, sink).await {
            Ok(records) if records.is_empty() => {
                sink.notify(Status::warning(format!("No results found on {}", self.provider)));
                FetchOutcome::Empty
            }
            Ok(records) => {
                sink.notify(Status::success(format!(
                    "Found {} {} leads",
                    records.len(),
                    self.provider
                )));
                FetchOutcome::Ok {
                    records,
                    truncated_to: limit,
                }
            }
            Err(e) => {
                error!("{} fetch failed: {}", self.provider, e);
                sink.notify(Status::error(format!("{} error: {}", self.provider, e)));
                FetchOutcome::Failure(e)
            }
        }
    }

    async fn try_fetch(
        &self,
        query: &str,
        limit: usize,
        max_attempts: u32,
        sink: &dyn StatusSink,
    ) -> Result<Vec<Record>> {
        let request = self.build_request(query, limit);
        let body = self.send_with_retry(&request, max_attempts, sink).await?;
        self.provider.extract(&body, limit)
    }

    fn build_request(&self, query: &str, limit: usize) -> LeadRequest {
        let mut headers = Vec::new();
        if !self.api_key.is_empty() {
            headers.push(self.provider.auth_header(&self.api_key));
        }

        LeadRequest {
            url: self.endpoint.clone(),
            headers,
            body: self.provider.request_body(query, limit, &self.region),
        }
    }

    async fn send_with_retry(
        &self,
        request: &LeadRequest,
        max_attempts: u32,
        sink: &dyn StatusSink,
    ) -> Result<String> {
        let mut attempt = 1;

        loop {
            debug!(attempt, url = %request.url, "Sending request");

            match self.transport.send(request).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let wait = self.base_delay.saturating_mul(attempt);
                    warn!(attempt, ?wait, "Request timed out, backing off");
                    sink.notify(Status::progress(format!(
                        "Timeout occurred, retrying in {:?}...",
                        wait
                    )));
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn check_arguments(query: &str, limit: usize, max_attempts: u32) -> Result<()> {
    if query.trim().is_empty() {
        return Err(LeadError::InvalidInput("query must not be empty".to_string()));
    }
    if limit == 0 {
        return Err(LeadError::InvalidInput("limit must be at least 1".to_string()));
    }
    if max_attempts == 0 {
        return Err(LeadError::InvalidInput(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{MessageLog, StatusLevel};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers each send with the next scripted reply; timeouts once the script runs out.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<String>>>,
        sent: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                sent: AtomicUsize::new(0),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, _request: &LeadRequest) -> impl Future<Output = Result<String>> + Send {
            self.sent.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LeadError::Timeout));
            async move { reply }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.slept.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    fn fetcher(replies: Vec<Result<String>>) -> LeadFetcher<ScriptedTransport, RecordingSleeper> {
        LeadFetcher::with_parts(
            &LeadConfig::default(),
            Provider::Maps,
            ScriptedTransport::new(replies),
            RecordingSleeper::default(),
        )
    }

    fn places(count: usize) -> String {
        let places: Vec<_> = (0..count)
            .map(|i| serde_json::json!({ "title": format!("Place {}", i) }))
            .collect();
        serde_json::json!({ "places": places }).to_string()
    }

    fn terminal_messages(log: &MessageLog) -> usize {
        log.snapshot()
            .iter()
            .filter(|s| {
                matches!(
                    s.level,
                    StatusLevel::Success | StatusLevel::Warning | StatusLevel::Error
                )
            })
            .count()
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_attempts_with_linear_backoff() {
        let fetcher = fetcher(vec![]);
        let log = MessageLog::new();

        let outcome = fetcher.fetch_with_attempts("dentists", 10, 3, &log).await;

        assert!(matches!(outcome, FetchOutcome::Failure(LeadError::Timeout)));
        assert_eq!(fetcher.transport.sent.load(Ordering::SeqCst), 3);
        assert_eq!(
            *fetcher.sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(terminal_messages(&log), 1);
    }

    #[tokio::test]
    async fn test_backoff_grows_with_attempt_count() {
        let fetcher = fetcher(vec![]);

        let outcome = fetcher.fetch_with_attempts("dentists", 10, 5, &crate::status::NoopSink).await;

        assert!(matches!(outcome, FetchOutcome::Failure(LeadError::Timeout)));
        assert_eq!(fetcher.transport.sent.load(Ordering::SeqCst), 5);
        let expected: Vec<_> = (1..5).map(|n| Duration::from_secs(5 * n)).collect();
        assert_eq!(*fetcher.sleeper.slept.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_huge_backoff_saturates_instead_of_overflowing() {
        let config = LeadConfig {
            base_delay_secs: u64::MAX,
            ..LeadConfig::default()
        };
        let fetcher = LeadFetcher::with_parts(
            &config,
            Provider::Maps,
            ScriptedTransport::default(),
            RecordingSleeper::default(),
        );

        let outcome = fetcher.fetch_with_attempts("dentists", 10, 3, &crate::status::NoopSink).await;

        assert!(matches!(outcome, FetchOutcome::Failure(LeadError::Timeout)));
        assert_eq!(
            *fetcher.sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(u64::MAX), Duration::MAX]
        );
    }

    #[tokio::test]
    async fn test_non_timeout_error_is_not_retried() {
        let fetcher = fetcher(vec![Err(LeadError::UpstreamStatus {
            status: 403,
            body: "quota exceeded".to_string(),
        })]);
        let log = MessageLog::new();

        let outcome = fetcher.fetch_with_attempts("dentists", 10, 3, &log).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failure(LeadError::UpstreamStatus { status: 403, .. })
        ));
        assert_eq!(fetcher.transport.sent.load(Ordering::SeqCst), 1);
        assert!(fetcher.sleeper.slept.lock().unwrap().is_empty());
        assert_eq!(terminal_messages(&log), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let fetcher = fetcher(vec![Err(LeadError::Timeout), Ok(places(3))]);
        let log = MessageLog::new();

        let outcome = fetcher.fetch("dentists", 10, &log).await;

        assert_eq!(outcome.records().len(), 3);
        assert_eq!(fetcher.transport.sent.load(Ordering::SeqCst), 2);
        assert_eq!(
            *fetcher.sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(5)]
        );
        let retries = log
            .snapshot()
            .iter()
            .filter(|s| s.level == StatusLevel::Progress)
            .count();
        assert_eq!(retries, 1);
    }

    #[tokio::test]
    async fn test_result_is_truncated_to_limit() {
        let fetcher = fetcher(vec![Ok(places(7))]);

        match fetcher.fetch("dentists", 4, &crate::status::NoopSink).await {
            FetchOutcome::Ok {
                records,
                truncated_to,
            } => {
                assert_eq!(truncated_to, 4);
                let names: Vec<_> = records.iter().filter_map(|r| r.get("Name")).collect();
                assert_eq!(names, vec!["Place 0", "Place 1", "Place 2", "Place 3"]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_result_is_not_a_failure() {
        let fetcher = fetcher(vec![Ok(r#"{"places": []}"#.to_string())]);
        let log = MessageLog::new();

        let outcome = fetcher.fetch("nothing here", 10, &log).await;

        assert!(matches!(outcome, FetchOutcome::Empty));
        let last = log.snapshot().pop().unwrap();
        assert_eq!(last.level, StatusLevel::Warning);
        assert_eq!(terminal_messages(&log), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_failure() {
        let fetcher = fetcher(vec![Ok("<html>busy</html>".to_string())]);

        let outcome = fetcher.fetch("dentists", 10, &crate::status::NoopSink).await;

        assert!(matches!(
            outcome,
            FetchOutcome::Failure(LeadError::MalformedResponse(_))
        ));
        assert_eq!(fetcher.transport.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_send_nothing() {
        let fetcher = fetcher(vec![Ok(places(1))]);
        let log = MessageLog::new();

        let outcome = fetcher.fetch_with_attempts("  ", 10, 3, &log).await;
        assert!(matches!(outcome, FetchOutcome::Failure(LeadError::InvalidInput(_))));

        let outcome = fetcher.fetch_with_attempts("dentists", 0, 3, &log).await;
        assert!(matches!(outcome, FetchOutcome::Failure(LeadError::InvalidInput(_))));

        let outcome = fetcher.fetch_with_attempts("dentists", 10, 0, &log).await;
        assert!(matches!(outcome, FetchOutcome::Failure(LeadError::InvalidInput(_))));

        assert_eq!(fetcher.transport.sent.load(Ordering::SeqCst), 0);
        assert_eq!(terminal_messages(&log), 3);
    }

    #[test]
    fn test_request_carries_key_and_region() {
        let mut config = LeadConfig::default();
        config.maps.api_key = "k".to_string();
        config.region = "us".to_string();
        let fetcher = LeadFetcher::with_parts(
            &config,
            Provider::Maps,
            ScriptedTransport::default(),
            RecordingSleeper::default(),
        );

        let request = fetcher.build_request("plumbers", 5);

        assert_eq!(request.url, "https://google.serper.dev/places");
        assert_eq!(request.headers, vec![("X-API-KEY", "k".to_string())]);
        assert_eq!(request.body, serde_json::json!({ "q": "plumbers", "gl": "us" }));
    }
}
