use anyhow::Context;
use reqwest::blocking::{
    Client,
    Response,
};
use reqwest::header::{
    HeaderMap,
    HeaderValue,
    AUTHORIZATION,
};
use serde_derive::{
    Deserialize,
    Serialize,
};

use crate::config::ApiConfig;
use crate::error::Error;

/// Moderation verdict for a submitted assignment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum Verdict {
    Accepted,
    Rejected,
}

impl std::str::FromStr for Verdict {
    type Err = serde_plain::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_plain::from_str(&s.to_ascii_uppercase())
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", match self {
            Verdict::Accepted => "ACCEPTED",
            Verdict::Rejected => "REJECTED",
        })
    }
}

#[derive(Serialize, Debug)]
struct VerdictRequest<'a> {
    status: Verdict,
    public_comment: &'a str,
}

pub(crate) const ACCEPT_COMMENT: &str = "good job";

/// Blocking client for the labeling platform's REST API.
pub(crate) struct ApiClient {
    client: Client,
    host: String,
}

impl ApiClient {
    pub(crate) fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        match &config.token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&format!("OAuth {}", token))
                    .context("API token is not a valid header value")?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            None => tracing::warn!("No API token configured, requests will be anonymous"),
        }

        let client = Client::builder().default_headers(headers).build()?;

        Ok(ApiClient {
            client,
            host: config.host.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, url_suffix: &str) -> String {
        format!("{}/{}", self.host, url_suffix.trim_start_matches('/'))
    }

    pub(crate) fn get(&self, url_suffix: &str, params: &[(String, String)]) -> reqwest::Result<Response> {
        let url = self.url(url_suffix);
        tracing::debug!(%url, "GET");
        self.client.get(&url).query(params).send()
    }

    pub(crate) fn post<B: serde::Serialize + ?Sized>(&self, url_suffix: &str, data: &B) -> reqwest::Result<Response> {
        let url = self.url(url_suffix);
        tracing::debug!(%url, "POST");
        self.client.post(&url).json(data).send()
    }

    pub(crate) fn patch<B: serde::Serialize + ?Sized>(&self, url_suffix: &str, data: &B) -> reqwest::Result<Response> {
        let url = self.url(url_suffix);
        tracing::debug!(%url, "PATCH");
        self.client.patch(&url).json(data).send()
    }

    pub(crate) fn download_attachment(&self, attachment: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self.get(&format!("api/v1/attachments/{}/download", attachment), &[])?;
        let resp = Error::check_status("GET", resp)?;

        Ok(resp.bytes()?.to_vec())
    }

    pub(crate) fn make_verdict(
        &self,
        assignment_id: &str,
        verdict: Verdict,
        comment: &str,
    ) -> anyhow::Result<Response> {
        let request_body = VerdictRequest {
            status: verdict,
            public_comment: comment,
        };

        let resp = self.patch(&format!("api/v1/assignments/{}", assignment_id), &request_body)?;
        tracing::info!("{} {} {} -> {}", assignment_id, verdict, comment, resp.status());

        Ok(Error::check_status("PATCH", resp)?)
    }

    pub(crate) fn accept(&self, assignment_id: &str) -> anyhow::Result<Response> {
        self.make_verdict(assignment_id, Verdict::Accepted, ACCEPT_COMMENT)
    }

    pub(crate) fn reject(&self, assignment_id: &str, comment: &str) -> anyhow::Result<Response> {
        self.make_verdict(assignment_id, Verdict::Rejected, comment)
    }
}
