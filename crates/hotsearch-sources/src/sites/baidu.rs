use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::{search_url, NO_MATCHES};

pub const ID: &str = "baidu";
pub const NAME: &str = "百度";
pub const ICON: &str = "https://www.baidu.com/favicon.ico";

const ENDPOINT: &str = "https://top.baidu.com/board?tab=realtime";
const SEARCH_BASE: &str = "https://www.baidu.com/s?wd=";

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<div\sclass="c-single-text-ellipsis">(.*?)</div?"#).unwrap());

/// Baidu realtime board, scraped from HTML
pub struct Baidu {
    client: HttpClient,
    endpoint: String,
}

impl Baidu {
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
    TITLE_RE
        .captures_iter(page)
        .map(|c| c[1].trim().to_string())
        .filter(|title| !title.is_empty())
        .enumerate()
        .map(|(i, title)| {
            let url = search_url(SEARCH_BASE, &title);
            NormalizedRecord::new(i as u32 + 1, title, url)
        })
        .collect()
}

#[async_trait]
impl Fetcher for Baidu {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let page = self.client.get_text(&self.endpoint, &[]).await?;
        let items = parse(&page);
        if items.is_empty() {
            return Ok(FetchResult::empty_upstream(NO_MATCHES, ICON));
        }
        Ok(FetchResult::success(ID, ICON, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TIMEOUT;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <div class="category-wrap_iQLoo">
          <div class="c-single-text-ellipsis"> 第一条热搜 </div>
          <div class="c-single-text-ellipsis">第二条</div>
          <div class="c-single-text-ellipsis">   </div>
        </div>"#;

    #[test]
    fn test_parse_trims_and_skips_blank() {
        let items = parse(PAGE);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "第一条热搜");
        assert_eq!(items[1].position, 2);
        assert!(items[1].url.starts_with(SEARCH_BASE));
    }

    #[tokio::test]
    async fn test_unrecognised_page_is_soft_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let result = Baidu::with_endpoint(client, server.uri()).fetch().await.unwrap();
        assert_eq!(result.code, 500);
        assert_eq!(result.message, NO_MATCHES);
        assert_eq!(result.icon, ICON);
    }
}
