use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::NO_MATCHES;

pub const ID: &str = "ithome";
pub const NAME: &str = "IT之家";
pub const ICON: &str = "https://www.ithome.com/favicon.ico";

const ENDPOINT: &str = "https://m.ithome.com/rankm/";
const MAX_ITEMS: usize = 12;

static ARTICLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<a href="(https://m\.ithome\.com/html/\d+\.htm)"[^>]*>[\s\S]*?<p class="plc-title">([^<]+)</p>"#,
    )
    .unwrap()
});

/// IT Home mobile ranking, first 12 articles
pub struct Ithome {
    client: HttpClient,
    endpoint: String,
}

impl Ithome {
    pub fn new(client: HttpClient) -> Self {
        Self::with_endpoint(client, ENDPOINT)
    }

    pub fn with_endpoint(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

fn parse(page: &str) -> Vec<NormalizedRecord> {
    ARTICLE_RE
        .captures_iter(page)
        .take(MAX_ITEMS)
        .enumerate()
        .map(|(i, c)| NormalizedRecord::new(i as u32 + 1, &c[2], &c[1]))
        .collect()
}

#[async_trait]
impl Fetcher for Ithome {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let page = self.client.get_text(&self.endpoint, &[]).await?;
        let items = parse(&page);
        if items.is_empty() {
            return Ok(FetchResult::empty_upstream(NO_MATCHES, ICON));
        }
        Ok(FetchResult::success(ID, ICON, items))
    }
}
