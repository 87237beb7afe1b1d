use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::EMPTY_PAYLOAD;

pub const ID: &str = "bilibili";
pub const NAME: &str = "哔哩哔哩";
pub const ICON: &str = "https://static.hdslb.com/mobile/img/512.png";

const ENDPOINT: &str = "https://api.bilibili.com/x/web-interface/ranking";
const VIDEO_BASE: &str = "https://www.bilibili.com/video/";

#[derive(Deserialize, Default)]
struct RankingResponse {
    #[serde(default)]
    data: RankingData,
}

#[derive(Deserialize, Default)]
struct RankingData {
    #[serde(default)]
    list: Vec<RankedVideo>,
}

#[derive(Deserialize)]
struct RankedVideo {
    title: String,
    bvid: String,
}

/// Video ranking from the bilibili web API
pub struct Bilibili {
    client: HttpClient,
    endpoint: String,
}

impl Bilibili {
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
impl Fetcher for Bilibili {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let resp: RankingResponse = self.client.get_json(&self.endpoint, &[]).await?;
        if resp.data.list.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = resp
            .data
            .list
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                NormalizedRecord::new(i as u32 + 1, v.title, format!("{}{}", VIDEO_BASE, v.bvid))
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}
