use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::formats::{BrowseResponse, InteriorImage, ItemDetailResponse, SessionResponse};

const SESSION_ENDPOINT: &str = "session/get";
const BROWSE_ENDPOINT: &str = "browse/get";
const DETAIL_ENDPOINT: &str = "title/getItem";

/// The remote catalog as seen by the pipeline phases.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn acquire_session(&self) -> Result<String, ApiError>;
    async fn browse(
        &self,
        session: &str,
        offset: u64,
        limit: u64,
    ) -> Result<BrowseResponse, ApiError>;
    async fn item_detail(&self, session: &str, id: &str) -> Result<ItemDetailResponse, ApiError>;
    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    fn cover_url(&self, id: &str, cache: &str) -> String;
    fn interior_url(&self, id: &str, image: &InteriorImage) -> String;
}

#[derive(Debug, Clone)]
pub struct BookManagerClient {
    http: reqwest::Client,
    config: ApiConfig,
    image_endpoint: Url,
}

impl BookManagerClient {
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build catalog http client")?;
        let image_endpoint = Url::parse(&format!("{}/i/m", config.cdn_base))
            .with_context(|| format!("invalid cdn base url: {}", config.cdn_base))?;
        Ok(Self {
            http,
            config,
            image_endpoint,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{endpoint}?_cb={}",
            self.config.api_base, self.config.cache_buster
        )
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, ApiError> {
        params.push(("uuid", uuid::Uuid::new_v4().to_string()));
        params.push(("store_id", self.config.store_id.clone()));

        let response = self
            .http
            .post(self.endpoint_url(endpoint))
            .header(USER_AGENT, "bookharvest/0.1")
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_owned(),
                source,
            })?;

        let response = check_status(endpoint, response)?;
        let body = response.bytes().await.map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_owned(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Malformed {
            endpoint: endpoint.to_owned(),
            source,
        })
    }
}

fn check_status(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized {
            endpoint: endpoint.to_owned(),
            status,
        });
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint: endpoint.to_owned(),
            status,
        });
    }
    Ok(response)
}

#[async_trait]
impl CatalogApi for BookManagerClient {
    async fn acquire_session(&self) -> Result<String, ApiError> {
        let response: SessionResponse = self.post_form(SESSION_ENDPOINT, Vec::new()).await?;
        Ok(response.session_id)
    }

    async fn browse(
        &self,
        session: &str,
        offset: u64,
        limit: u64,
    ) -> Result<BrowseResponse, ApiError> {
        let params = vec![
            ("session_id", session.to_owned()),
            ("o", offset.to_string()),
            ("l", limit.to_string()),
            ("t", "filter".to_owned()),
            ("a", self.config.category.clone()),
            ("k", String::new()),
        ];
        self.post_form(BROWSE_ENDPOINT, params).await
    }

    async fn item_detail(&self, session: &str, id: &str) -> Result<ItemDetailResponse, ApiError> {
        let params = vec![("session_id", session.to_owned()), ("eisbn", id.to_owned())];
        self.post_form(DETAIL_ENDPOINT, params).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, "bookharvest/0.1")
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: url.to_owned(),
                source,
            })?;
        let response = check_status(url, response)?;
        let bytes = response.bytes().await.map_err(|source| ApiError::Transport {
            endpoint: url.to_owned(),
            source,
        })?;
        Ok(bytes.to_vec())
    }

    fn cover_url(&self, id: &str, cache: &str) -> String {
        image_url(&self.image_endpoint, &[("b", id), ("cb", cache)])
    }

    fn interior_url(&self, id: &str, image: &InteriorImage) -> String {
        let mut params = vec![
            ("b", id),
            ("imgp", image.key.as_str()),
            ("cb", image.cache.as_str()),
        ];
        if let Some(b2b) = image.b2b.as_deref() {
            params.push(("b2b", b2b));
        }
        image_url(&self.image_endpoint, &params)
    }
}

fn image_url(endpoint: &Url, params: &[(&str, &str)]) -> String {
    let mut url = endpoint.clone();
    url.query_pairs_mut().extend_pairs(params);
    url.to_string()
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory catalog used by the phase tests.

    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    use super::*;
    use crate::formats::RawInteriorObject;

    #[derive(Debug, Default)]
    pub struct Calls {
        pub sessions: usize,
        pub browse_offsets: Vec<u64>,
        pub details: Vec<String>,
        pub downloads: Vec<String>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Failure {
        Unauthorized,
        Status(u16),
        Malformed,
    }

    #[derive(Default)]
    pub struct FakeCatalog {
        pub max_offset: u64,
        pub pages: HashMap<u64, Vec<serde_json::Value>>,
        pub details: HashMap<String, Vec<RawInteriorObject>>,
        pub browse_failures: Mutex<HashMap<u64, VecDeque<Failure>>>,
        pub detail_failures: Mutex<HashMap<String, VecDeque<Failure>>>,
        pub broken_downloads: Mutex<HashSet<String>>,
        pub calls: Mutex<Calls>,
    }

    pub fn row(id: &str) -> serde_json::Value {
        serde_json::json!({
            "eisbn": id,
            "title": format!("Title {id}"),
            "cover_image_cache": format!("cb-{id}"),
        })
    }

    pub fn interior(key: &str) -> RawInteriorObject {
        RawInteriorObject {
            key: key.to_owned(),
            cb: Some(format!("cb-{key}")),
            b2b: None,
        }
    }

    fn to_error(endpoint: &str, failure: Failure) -> ApiError {
        match failure {
            Failure::Unauthorized => ApiError::Unauthorized {
                endpoint: endpoint.to_owned(),
                status: StatusCode::UNAUTHORIZED,
            },
            Failure::Status(code) => ApiError::Status {
                endpoint: endpoint.to_owned(),
                status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            },
            Failure::Malformed => ApiError::Malformed {
                endpoint: endpoint.to_owned(),
                source: serde_json::from_str::<serde_json::Value>("{\"truncated\":")
                    .expect_err("truncated json"),
            },
        }
    }

    impl FakeCatalog {
        pub fn with_ids(ids: &[&str], page_size: u64) -> Self {
            let mut fake = Self {
                max_offset: ids.len() as u64,
                ..Default::default()
            };
            for (index, chunk) in ids.chunks(page_size as usize).enumerate() {
                fake.pages.insert(
                    index as u64 * page_size,
                    chunk.iter().map(|id| row(id)).collect(),
                );
            }
            fake
        }

        pub fn fail_browse(&self, offset: u64, failure: Failure) {
            self.browse_failures
                .lock()
                .unwrap()
                .entry(offset)
                .or_default()
                .push_back(failure);
        }

        pub fn fail_detail(&self, id: &str, failure: Failure) {
            self.detail_failures
                .lock()
                .unwrap()
                .entry(id.to_owned())
                .or_default()
                .push_back(failure);
        }

        pub fn break_download(&self, url: &str) {
            self.broken_downloads.lock().unwrap().insert(url.to_owned());
        }

        pub fn repair_downloads(&self) {
            self.broken_downloads.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn acquire_session(&self) -> Result<String, ApiError> {
            let mut calls = self.calls.lock().unwrap();
            calls.sessions += 1;
            Ok(format!("session-{}", calls.sessions))
        }

        async fn browse(
            &self,
            _session: &str,
            offset: u64,
            _limit: u64,
        ) -> Result<BrowseResponse, ApiError> {
            self.calls.lock().unwrap().browse_offsets.push(offset);
            let failure = self
                .browse_failures
                .lock()
                .unwrap()
                .get_mut(&offset)
                .and_then(VecDeque::pop_front);
            if let Some(failure) = failure {
                return Err(to_error(BROWSE_ENDPOINT, failure));
            }
            Ok(BrowseResponse {
                rows: self.pages.get(&offset).cloned().unwrap_or_default(),
                max_offset: Some(self.max_offset),
            })
        }

        async fn item_detail(
            &self,
            _session: &str,
            id: &str,
        ) -> Result<ItemDetailResponse, ApiError> {
            self.calls.lock().unwrap().details.push(id.to_owned());
            let failure = self
                .detail_failures
                .lock()
                .unwrap()
                .get_mut(id)
                .and_then(VecDeque::pop_front);
            if let Some(failure) = failure {
                return Err(to_error(DETAIL_ENDPOINT, failure));
            }
            Ok(ItemDetailResponse {
                interior_objects: self.details.get(id).cloned().unwrap_or_default(),
            })
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            self.calls.lock().unwrap().downloads.push(url.to_owned());
            if self.broken_downloads.lock().unwrap().contains(url) {
                return Err(to_error(url, Failure::Status(500)));
            }
            Ok(url.as_bytes().to_vec())
        }

        fn cover_url(&self, id: &str, cache: &str) -> String {
            format!("fake://{id}/cover?cb={cache}")
        }

        fn interior_url(&self, id: &str, image: &InteriorImage) -> String {
            format!("fake://{id}/{}?cb={}", image.key, image.cache)
        }
    }
}
