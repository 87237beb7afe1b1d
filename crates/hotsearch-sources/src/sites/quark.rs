use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{format_wan, lenient_number, EMPTY_PAYLOAD};

pub const ID: &str = "quark";
pub const NAME: &str = "夸克";
pub const ICON: &str = "https://quark.sm.cn/res/static/img/favicon.ico";

const ENDPOINT: &str = "https://biz.quark.cn/api/trending/ranking/getNewsRanking?modules=hotNews\
    &uc_param_str=dnfrpfbivessbtbmnilauputogpintnwmtsvcppcprsnnnchmicckpgixsnx";

#[derive(Deserialize, Default)]
struct RankingResponse {
    #[serde(default)]
    data: RankingData,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RankingData {
    #[serde(default)]
    hot_news: HotNews,
}

#[derive(Deserialize, Default)]
struct HotNews {
    #[serde(default)]
    item: Vec<NewsItem>,
}

#[derive(Deserialize)]
struct NewsItem {
    title: String,
    url: String,
    #[serde(default, deserialize_with = "lenient_number")]
    hot: f64,
}

/// Quark news ranking
pub struct Quark {
    client: HttpClient,
    endpoint: String,
}

impl Quark {
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
impl Fetcher for Quark {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let resp: RankingResponse = self.client.get_json(&self.endpoint, &[]).await?;
        let news = resp.data.hot_news.item;
        if news.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = news
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                NormalizedRecord::new(i as u32 + 1, n.title, n.url)
                    .with_hot_value(format_wan(n.hot, 1))
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TIMEOUT;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_hot_news_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "data": {"hotNews": {"item": [
                    {"title": "q1", "url": "https://quark.cn/1", "hot": "52000"}
                ]}}
            })))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let result = Quark::with_endpoint(client, server.uri()).fetch().await.unwrap();
        assert_eq!(result.message, "quark");
        assert_eq!(result.items[0].hot_value.as_deref(), Some("5.2万"));
    }

    #[tokio::test]
    async fn test_missing_module_is_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {}})))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let result = Quark::with_endpoint(client, server.uri()).fetch().await.unwrap();
        assert_eq!(result.code, 500);
    }
}
