use std::collections::HashMap;

use chrono::{
    DateTime,
    Utc,
};
use hmac::{
    Hmac,
    Mac,
};
use reqwest::blocking::Client;
use sha2::{
    Digest,
    Sha256,
};

use crate::config::StorageConfig;
use crate::error::Error;

pub(crate) const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub(crate) const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub(crate) const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

#[derive(Clone)]
pub(crate) struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish()
    }
}

impl Credentials {
    pub(crate) fn from_env<F: Fn(&str) -> Option<String>>(var: F) -> Result<Self, Error> {
        let non_empty = |name| var(name).filter(|v: &String| !v.is_empty());

        Ok(Credentials {
            access_key_id: non_empty(ACCESS_KEY_ENV).ok_or(Error::MissingCredentials(ACCESS_KEY_ENV))?,
            secret_access_key: non_empty(SECRET_KEY_ENV)
                .ok_or(Error::MissingCredentials(SECRET_KEY_ENV))?,
            session_token: non_empty(SESSION_TOKEN_ENV),
        })
    }
}

/// Single-request uploads to an S3 bucket.
pub(crate) struct S3Storage {
    client: Client,
    config: StorageConfig,
    credentials: Result<Credentials, Error>,
}

impl S3Storage {
    /// Missing credentials only fail once something is uploaded.
    pub(crate) fn new(config: StorageConfig, credentials: Result<Credentials, Error>) -> anyhow::Result<Self> {
        Ok(S3Storage {
            client: Client::builder().build()?,
            config,
            credentials,
        })
    }

    pub(crate) fn public_url(&self, key: &str) -> anyhow::Result<String> {
        let mut vars = HashMap::new();
        vars.insert("bucket".to_owned(), self.config.bucket.clone());
        vars.insert("region".to_owned(), self.config.region.clone());
        vars.insert("key".to_owned(), key.to_owned());

        strfmt::strfmt(&self.config.url_template, &vars).map_err(|e| {
            Error::config(format!(
                "Bad storage.url_template {:?}: {}",
                self.config.url_template, e
            ))
            .into()
        })
    }

    /// Returns `(url, host, canonical path)` for the object.
    fn object_location(&self, key: &str) -> anyhow::Result<(String, String, String)> {
        let encoded_key = uri_encode(key, false);
        match &self.config.endpoint {
            Some(endpoint) => {
                let parsed = reqwest::Url::parse(endpoint)
                    .map_err(|e| Error::config(format!("Bad storage.endpoint {:?}: {}", endpoint, e)))?;
                let host = match (parsed.host_str(), parsed.port()) {
                    (Some(host), Some(port)) => format!("{}:{}", host, port),
                    (Some(host), None) => host.to_owned(),
                    (None, _) => {
                        return Err(Error::config(format!("storage.endpoint has no host: {}", endpoint)).into())
                    }
                };
                let path = format!("/{}/{}", self.config.bucket, encoded_key);
                let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
                Ok((url, host, path))
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", self.config.bucket, self.config.region);
                let path = format!("/{}", encoded_key);
                Ok((format!("https://{}{}", host, path), host, path))
            }
        }
    }

    pub(crate) fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        let credentials = match &self.credentials {
            Ok(credentials) => credentials,
            Err(Error::MissingCredentials(name)) => return Err(Error::MissingCredentials(*name).into()),
            Err(e) => anyhow::bail!("No usable storage credentials: {}", e),
        };
        let (url, host, path) = self.object_location(key)?;

        let mut headers = vec![("host".to_owned(), host)];
        sign_request(
            "PUT",
            &path,
            &mut headers,
            &sha256_hex(&body),
            Utc::now(),
            &self.config.region,
            credentials,
        );

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        for (name, value) in headers.into_iter().filter(|(name, _)| name != "host") {
            request = request.header(name, value);
        }

        tracing::debug!(%url, "PUT");
        Error::check_status("PUT", request.send()?)?;

        Ok(())
    }
}

/// Sign a request with AWS Signature Version 4 for the `s3` service.
///
/// `headers` must hold lowercase names and include `host`; the `x-amz-*`
/// headers and `authorization` are appended. The query string is empty.
pub(crate) fn sign_request(
    method: &str,
    canonical_uri: &str,
    headers: &mut Vec<(String, String)>,
    payload_hash: &str,
    now: DateTime<Utc>,
    region: &str,
    credentials: &Credentials,
) {
    let datestamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    headers.push(("x-amz-content-sha256".to_owned(), payload_hash.to_owned()));
    headers.push(("x-amz-date".to_owned(), amz_date.clone()));
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_owned(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", datestamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        datestamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    headers.push((
        "authorization".to_owned(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key_id, credential_scope, signed_headers, signature
        ),
    ));
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode everything but unreserved characters (and `/` unless
/// `encode_slash`).
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }

    out
}
