use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{format_wan, lenient_number, search_url, EMPTY_PAYLOAD};

pub const ID: &str = "360search";
pub const NAME: &str = "360搜索";
pub const ICON: &str = "https://ss.360tres.com/static/121a1737750aa53d.ico";

const ENDPOINT: &str = "https://ranks.hao.360.com/mbsug-api/hotnewsquery?type=news&realhot_limit=50";
const SEARCH_BASE: &str = "https://www.so.com/s?q=";

#[derive(Deserialize)]
struct HotQuery {
    #[serde(default)]
    title: String,
    #[serde(default)]
    long_title: String,
    #[serde(default, deserialize_with = "lenient_number")]
    score: f64,
}

impl HotQuery {
    fn display_title(self) -> String {
        if self.long_title.is_empty() {
            self.title
        } else {
            self.long_title
        }
    }
}

/// 360 search trending news queries.
///
/// The upstream carries its own rank field; positions are still assigned by
/// array order so they are always contiguous.
pub struct Search360 {
    client: HttpClient,
    endpoint: String,
}

impl Search360 {
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
impl Fetcher for Search360 {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let queries: Vec<HotQuery> = self.client.get_json(&self.endpoint, &[]).await?;
        if queries.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = queries
            .into_iter()
            .enumerate()
            .map(|(i, q)| {
                let hot = format_wan(q.score, 1);
                let title = q.display_title();
                let url = search_url(SEARCH_BASE, &title);
                NormalizedRecord::new(i as u32 + 1, title, url).with_hot_value(hot)
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
    async fn test_long_title_preferred_and_rank_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"title": "short", "long_title": "the long title", "score": "123000", "rank": "5"},
                {"title": "only short", "long_title": "", "score": "abc", "rank": "9"}
            ])))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let result = Search360::with_endpoint(client, server.uri()).fetch().await.unwrap();
        assert_eq!(result.items[0].title, "the long title");
        assert_eq!(result.items[0].position, 1);
        assert_eq!(result.items[0].hot_value.as_deref(), Some("12.3万"));
        assert_eq!(result.items[0].url, "https://www.so.com/s?q=the+long+title");
        assert_eq!(result.items[1].title, "only short");
        assert_eq!(result.items[1].position, 2);
        assert_eq!(result.items[1].hot_value.as_deref(), Some("0.0万"));
    }
}
