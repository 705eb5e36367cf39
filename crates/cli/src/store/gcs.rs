//! Google Cloud Storage backend over the JSON API.
//!
//! Counting lists every object under the prefix (no delimiter) and sums
//! page sizes; identifier enumeration lists with a delimiter and collects
//! the returned `prefixes`. Both follow `nextPageToken` to the end.

use std::time::Duration;

use tally_recon::{ObjectStore, StoreError};

// ── Constants ───────────────────────────────────────────────────────

pub const GCS_API_BASE: &str = "https://storage.googleapis.com";
pub const DEFAULT_TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";
const PAGE_SIZE: u32 = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

// ── Client ──────────────────────────────────────────────────────────

pub struct GcsStore {
    http: reqwest::blocking::Client,
    name: String,
    bucket: String,
    token: Option<String>,
    base_url: String,
}

/// One page of an object listing, reduced to what we use.
struct Page {
    items: u64,
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

impl GcsStore {
    pub fn new(bucket: &str, token: Option<String>) -> Result<Self, StoreError> {
        Self::with_base_url(bucket, token, GCS_API_BASE.to_string())
    }

    pub fn with_base_url(bucket: &str, token: Option<String>, base_url: String) -> Result<Self, StoreError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            name: format!("gs://{bucket}"),
            bucket: bucket.to_string(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<char>,
        page_token: Option<&str>,
    ) -> Result<Page, StoreError> {
        let url = format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket);
        let mut query: Vec<(&str, String)> = vec![
            ("prefix", prefix.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        match delimiter {
            Some(d) => {
                query.push(("delimiter", d.to_string()));
                query.push(("fields", "prefixes,nextPageToken".into()));
            }
            None => query.push(("fields", "items(name),nextPageToken".into())),
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let mut req = self.http.get(&url).query(&query);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .map_err(|e| StoreError::Transport(format!("{}: {e}", self.name)))?;
        let status = resp.status().as_u16();
        let body: serde_json::Value = if status >= 400 {
            resp.json().unwrap_or(serde_json::Value::Null)
        } else {
            resp.json()
                .map_err(|e| StoreError::Malformed(format!("{}: invalid listing JSON: {e}", self.name)))?
        };

        if status >= 400 {
            return Err(StoreError::Status {
                status,
                message: extract_gcs_error(&body, status),
            });
        }
        parse_page(&body)
    }

    /// Walk every page, feeding each to `visit`.
    fn walk(
        &self,
        prefix: &str,
        delimiter: Option<char>,
        mut visit: impl FnMut(Page),
    ) -> Result<(), StoreError> {
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let page = self.list_page(prefix, delimiter, page_token.as_deref())?;
            pages += 1;
            let next = page.next_page_token.clone();
            visit(page);
            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        log::trace!("{}: listed '{prefix}' in {pages} page(s)", self.name);
        Ok(())
    }
}

impl ObjectStore for GcsStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut total = 0u64;
        self.walk(prefix, None, |page| total += page.items)?;
        Ok(total)
    }

    fn list_prefixes(&self, root: &str, delimiter: char) -> Result<Vec<String>, StoreError> {
        let mut prefixes = Vec::new();
        self.walk(root, Some(delimiter), |page| prefixes.extend(page.prefixes))?;
        Ok(prefixes)
    }
}

// ── Response parsing ────────────────────────────────────────────────

fn parse_page(body: &serde_json::Value) -> Result<Page, StoreError> {
    if !body.is_object() {
        return Err(StoreError::Malformed("listing response is not a JSON object".into()));
    }
    // Empty pages omit both arrays entirely.
    let items = match &body["items"] {
        serde_json::Value::Null => 0,
        serde_json::Value::Array(items) => items.len() as u64,
        _ => return Err(StoreError::Malformed("'items' is not an array".into())),
    };
    let prefixes = match &body["prefixes"] {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(prefixes) => prefixes
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::Malformed("non-string entry in 'prefixes'".into()))
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(StoreError::Malformed("'prefixes' is not an array".into())),
    };
    let next_page_token = body["nextPageToken"].as_str().map(str::to_string);
    Ok(Page { items, prefixes, next_page_token })
}

/// `{"error": {"code": 403, "message": "..."}}`
fn extract_gcs_error(body: &serde_json::Value, status: u16) -> String {
    body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
