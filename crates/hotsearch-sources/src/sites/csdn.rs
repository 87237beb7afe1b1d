use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::EMPTY_PAYLOAD;

pub const ID: &str = "csdn";
pub const NAME: &str = "CSDN";
pub const ICON: &str = "https://g.csdnimg.cn/static/logo/favicon32.ico";

const ENDPOINT: &str = "https://blog.csdn.net/phoenix/web/blog/hotRank?&pageSize=100";

#[derive(Deserialize)]
struct HotRank {
    #[serde(default)]
    data: Vec<Article>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    article_title: String,
    article_detail_url: String,
    #[serde(default)]
    pc_hot_rank_score: String,
}

/// CSDN blog hot ranking
pub struct Csdn {
    client: HttpClient,
    endpoint: String,
}

impl Csdn {
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
impl Fetcher for Csdn {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let rank: HotRank = self.client.get_json(&self.endpoint, &[]).await?;
        if rank.data.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = rank
            .data
            .into_iter()
            .enumerate()
            .map(|(i, a)| {
                NormalizedRecord::new(i as u32 + 1, a.article_title, a.article_detail_url)
                    .with_hot_value(a.pc_hot_rank_score)
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}
