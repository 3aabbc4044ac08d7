use crate::utils::error::{EtlError, Result};
use crate::utils::rate_limiter::RateLimiter;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.inaturalist.org/v2";

/// Field selection for `GET /v2/taxa/{ids}`; v2 returns only what is asked for.
pub const TAXA_FIELDS: &str = "(preferred_common_name:!t,extinct:!t,observations_count:!t,\
wikipedia_url:!t,wikipedia_summary:!t,conservation_status:(status:!t,status_name:!t),\
ancestors:(name:!t,rank:!t),taxon_photos:(photo:(attribution:!t,license_code:!t,large_url:!t)))";

/// Ranks kept when building a taxonomy path from ancestors.
pub const TAXONOMY_RANKS: [&str; 6] = ["kingdom", "phylum", "class", "order", "family", "genus"];

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonResult {
    pub id: u64,
    pub preferred_common_name: Option<String>,
    pub extinct: Option<bool>,
    pub observations_count: Option<u64>,
    pub wikipedia_url: Option<String>,
    pub wikipedia_summary: Option<String>,
    pub conservation_status: Option<ConservationStatus>,
    #[serde(default)]
    pub ancestors: Vec<Ancestor>,
    #[serde(default)]
    pub taxon_photos: Vec<TaxonPhoto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConservationStatus {
    pub status: Option<String>,
    pub status_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ancestor {
    pub name: Option<String>,
    pub rank: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonPhoto {
    pub photo: Photo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Photo {
    pub attribution: Option<String>,
    pub license_code: Option<String>,
    pub large_url: Option<String>,
}

impl TaxonResult {
    /// `<img src="...">|attribution|license` per photo, joined by `;;`.
    pub fn images_html(&self) -> String {
        self.taxon_photos
            .iter()
            .filter_map(|p| {
                let url = p.photo.large_url.as_deref()?;
                Some(format!(
                    "<img src=\"{}\">|{}|{}",
                    url,
                    p.photo.attribution.as_deref().unwrap_or(""),
                    p.photo.license_code.as_deref().unwrap_or("")
                ))
            })
            .collect::<Vec<_>>()
            .join(";;")
    }

    pub fn conservation_label(&self) -> String {
        self.conservation_status
            .as_ref()
            .and_then(|s| s.status_name.clone().or_else(|| s.status.clone()))
            .unwrap_or_default()
    }

    /// Major-rank ancestor names joined with `::`, spaces turned into `-`.
    pub fn taxonomy_path(&self) -> String {
        self.ancestors
            .iter()
            .filter(|a| {
                a.rank
                    .as_deref()
                    .is_some_and(|rank| TAXONOMY_RANKS.contains(&rank))
            })
            .filter_map(|a| a.name.as_deref())
            .map(crate::utils::text::tag_token)
            .collect::<Vec<_>>()
            .join("::")
    }
}

pub struct InaturalistClient {
    client: Client,
    endpoint: String,
    limiter: RateLimiter,
}

impl InaturalistClient {
    pub fn new(endpoint: &str, limiter: RateLimiter, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("species-deck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    pub fn taxa_url(&self, ids: &[String]) -> String {
        format!("{}/taxa/{}", self.endpoint, ids.join(","))
    }

    /// One throttled call for a batch of taxon ids. A non-success status or
    /// a body without `results` is an error; nothing is retried.
    pub async fn fetch_taxa(&self, ids: &[String]) -> Result<Vec<TaxonResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.limiter.acquire().await;

        let url = self.taxa_url(ids);
        tracing::debug!("Requesting {} taxa from {}", ids.len(), url);

        let per_page = ids.len().to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("fields", TAXA_FIELDS), ("per_page", per_page.as_str())])
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("iNaturalist response status: {}", status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut payload: serde_json::Value = response.json().await?;
        let results = match payload.get_mut("results") {
            Some(results) => results.take(),
            None => {
                let mut snippet = payload.to_string();
                snippet.truncate(200);
                return Err(EtlError::UnexpectedResponse {
                    message: format!("missing 'results' in {}", snippet),
                });
            }
        };

        Ok(serde_json::from_value(results)?)
    }
}
