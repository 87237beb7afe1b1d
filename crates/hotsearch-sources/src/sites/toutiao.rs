use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{format_wan, lenient_number, EMPTY_PAYLOAD};

pub const ID: &str = "toutiao";
pub const NAME: &str = "今日头条";
pub const ICON: &str = "https://sf1-ttcdn-tos.pstatp.com/img/mosaic-legacy/3793/245327~180x180.ico";

const ENDPOINT: &str = "https://www.toutiao.com/hot-event/hot-board/?origin=toutiao_pc";

#[derive(Deserialize)]
struct HotBoard {
    #[serde(default)]
    data: Vec<HotEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HotEvent {
    title: String,
    url: String,
    #[serde(default, deserialize_with = "lenient_number")]
    hot_value: f64,
}

/// Toutiao hot board
pub struct Toutiao {
    client: HttpClient,
    endpoint: String,
}

impl Toutiao {
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
impl Fetcher for Toutiao {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let board: HotBoard = self.client.get_json(&self.endpoint, &[]).await?;
        if board.data.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = board
            .data
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                NormalizedRecord::new(i as u32 + 1, e.title, e.url)
                    .with_hot_value(format_wan(e.hot_value, 1))
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}
