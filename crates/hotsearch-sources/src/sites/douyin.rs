use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{format_wan, lenient_number, search_url, EMPTY_PAYLOAD};

pub const ID: &str = "douyin";
pub const NAME: &str = "抖音";
pub const ICON: &str =
    "https://s16.douyinstatic.com/ies/resource/mandown/ies/aweme_resource/dy_favicon.ico";

const ENDPOINT: &str = "https://www.iesdouyin.com/web/api/v2/hotsearch/billboard/word/";
const SEARCH_BASE: &str = "https://www.douyin.com/search/";

#[derive(Deserialize)]
struct Billboard {
    #[serde(default)]
    word_list: Vec<Word>,
}

#[derive(Deserialize)]
struct Word {
    word: String,
    #[serde(default, deserialize_with = "lenient_number")]
    hot_value: f64,
}

/// Douyin hot search billboard
pub struct Douyin {
    client: HttpClient,
    endpoint: String,
}

impl Douyin {
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

#[async_trait]
impl Fetcher for Douyin {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let board: Billboard = self.client.get_json(&self.endpoint, &[]).await?;
        if board.word_list.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = board
            .word_list
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                let url = search_url(SEARCH_BASE, &w.word);
                let record = NormalizedRecord::new(i as u32 + 1, w.word, url);
                if w.hot_value > 0.0 {
                    record.with_hot_value(format_wan(w.hot_value, 2))
                } else {
                    record
                }
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}
