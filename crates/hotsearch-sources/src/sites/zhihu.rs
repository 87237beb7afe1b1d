use async_trait::async_trait;
use serde::Deserialize;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{search_url, EMPTY_PAYLOAD};

pub const ID: &str = "zhihu";
pub const NAME: &str = "知乎";
pub const ICON: &str = "https://static.zhihu.com/static/favicon.ico";

const ENDPOINT: &str = "https://www.zhihu.com/api/v4/search/recommend_query/v2";
const SEARCH_BASE: &str = "https://www.zhihu.com/search?q=";

const HEADERS: &[(&str, &str)] = &[
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
    ("Referer", "https://www.zhihu.com/"),
];

#[derive(Deserialize, Default)]
struct RecommendResponse {
    #[serde(default)]
    recommend_queries: RecommendQueries,
}

#[derive(Deserialize, Default)]
struct RecommendQueries {
    #[serde(default)]
    queries: Vec<Query>,
}

#[derive(Deserialize)]
struct Query {
    query: String,
}

/// Recommended search queries from zhihu
pub struct Zhihu {
    client: HttpClient,
    endpoint: String,
}

impl Zhihu {
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
impl Fetcher for Zhihu {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let resp: RecommendResponse = self.client.get_json(&self.endpoint, HEADERS).await?;
        let queries = resp.recommend_queries.queries;
        if queries.is_empty() {
            return Ok(FetchResult::empty_upstream(EMPTY_PAYLOAD, ICON));
        }

        let items = queries
            .into_iter()
            .enumerate()
            .map(|(i, q)| {
                let url = search_url(SEARCH_BASE, &q.query);
                NormalizedRecord::new(i as u32 + 1, q.query, url)
            })
            .collect();
        Ok(FetchResult::success(ID, ICON, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TIMEOUT;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_queries_become_search_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("referer", "https://www.zhihu.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recommend_queries": {"queries": [{"query": "rust 异步"}, {"query": "tokio"}]}
            })))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let result = Zhihu::with_endpoint(client, server.uri()).fetch().await.unwrap();
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].title, "rust 异步");
        assert!(result.items[0].url.starts_with("https://www.zhihu.com/search?q=rust+"));
        assert_eq!(result.items[1].position, 2);
    }

    #[tokio::test]
    async fn test_http_error_is_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let err = Zhihu::with_endpoint(client, server.uri()).fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 403, .. }));
    }
}
