pub mod error;

use core::future::Future;
use http_body_util::{BodyExt, Empty};
use hyper::{
    body::Bytes,
    header::{HeaderValue, ACCEPT},
    Request, Uri,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client as HttpClient},
    rt::TokioExecutor,
};

pub use model::{Difficulty, Kind, Question, QuestionSet};

pub const APPLICATION_JSON: &str = "application/json";

/// Public endpoint of the Open Trivia Database.
pub const DEFAULT_ENDPOINT: &str = "https://opentdb.com/api.php";

/// Anything that can hand out a fresh set of trivia questions.
pub trait Source: Send + Sync + 'static {
    fn fetch(&self, count: u8) -> impl Future<Output = error::Result<QuestionSet>> + Send;
}

/// Builds the request URI for `count` questions. Every text field is requested
/// with RFC 3986 percent-encoding so that the model can decode it losslessly.
fn question_uri(endpoint: &str, count: u8) -> error::Result<Uri> {
    let uri = format!("{endpoint}?amount={count}&encode=url3986").parse()?;
    Ok(uri)
}

/// Rejects sets that the bank flagged as failed or that carry no questions.
pub fn check(set: QuestionSet) -> error::Result<QuestionSet> {
    if !set.is_success() {
        return Err(error::Error::ResponseCode(set.response_code));
    }

    if set.results.is_empty() {
        return Err(error::Error::Empty);
    }

    Ok(set)
}

/// HTTPS client for the question bank.
pub struct Client {
    http: HttpClient<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    endpoint: Box<str>,
}

impl Client {
    pub fn new(endpoint: &str) -> error::Result<Self> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_only()
            .enable_http1()
            .build();
        let http = HttpClient::builder(TokioExecutor::new()).build(connector);

        // Fail early on a bad endpoint rather than on the first game.
        question_uri(endpoint, 1)?;
        Ok(Self { http, endpoint: endpoint.into() })
    }
}

impl Source for Client {
    async fn fetch(&self, count: u8) -> error::Result<QuestionSet> {
        let uri = question_uri(&self.endpoint, count)?;
        log::debug!("fetching {count} questions from {uri}");

        let request =
            Request::get(uri).header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON)).body(Empty::new())?;
        let response = self.http.request(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error::Error::Status(status.as_u16()));
        }

        let body = response.into_body().collect().await?.to_bytes();
        let set = serde_json::from_slice(&body)?;
        check(set)
    }
}
