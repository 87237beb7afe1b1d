use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{format_wan, lenient_number, EMPTY_PAYLOAD};

pub const ID: &str = "douban";
pub const NAME: &str = "豆瓣";
pub const ICON: &str = "https://img3.doubanio.com/favicon.ico";

const ENDPOINT: &str = "https://m.douban.com/rexxar/api/v2/chart/hot_search_board?count=10&start=0";
const HEADERS: &[(&str, &str)] = &[("Referer", "https://www.douban.com/gallery/")];

const APP_SEARCH_PREFIX: &str = "douban://douban.com/search/result";
const WEB_SEARCH: &str = "https://www.douban.com/search";

#[derive(Deserialize)]
struct BoardEntry {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default, deserialize_with = "lenient_number")]
    score: f64,
}

/// Douban hot search board
pub struct Douban {
    client: HttpClient,
    endpoint: String,
}

impl Douban {
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

/// App deep links to a search page are rewritten to the web search page,
/// keeping the query string.
fn web_url(uri: &str) -> String {
    if !uri.starts_with(APP_SEARCH_PREFIX) {
        return uri.to_string();
    }
    match uri.find('?') {
        Some(q) => format!("{}{}", WEB_SEARCH, &uri[q..]),
        None => WEB_SEARCH.to_string(),
    }
}

#[async_trait]
impl Fetcher for Douban {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let entries: Vec<BoardEntry> = self.client.get_json(&self.endpoint, HEADERS).await?;
        if entries.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                let record = NormalizedRecord::new(i as u32 + 1, e.name, web_url(&e.uri));
                if e.score > 0.0 {
                    record.with_hot_value(format_wan(e.score, 2))
                } else {
                    record
                }
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}
