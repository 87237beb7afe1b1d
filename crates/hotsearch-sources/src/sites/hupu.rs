use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::NO_MATCHES;

pub const ID: &str = "hupu";
pub const NAME: &str = "虎扑";
pub const ICON: &str = "https://www.hupu.com/favicon.ico";

const SITE: &str = "https://www.hupu.com";

/// Link, then a numbered div, then the title div
static POST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<a\s+href="([^"]+)"[^>]+>\s*<div[^>]+>\s*<div[^>]+>\d+</div>\s*<div[^>]+>(.*?)</div>"#,
    )
    .unwrap()
});

/// Hupu front page hot posts
pub struct Hupu {
    client: HttpClient,
    endpoint: String,
}

impl Hupu {
    pub fn new(client: HttpClient) -> Self {
        Self::with_endpoint(client, format!("{}/", SITE))
    }

    pub fn with_endpoint(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

fn parse(page: &str) -> Vec<NormalizedRecord> {
    POST_RE
        .captures_iter(page)
        .enumerate()
        .map(|(i, c)| {
            let href = &c[1];
            let url = if href.starts_with('/') {
                format!("{}{}", SITE, href)
            } else {
                href.to_string()
            };
            NormalizedRecord::new(i as u32 + 1, &c[2], url)
        })
        .collect()
}

#[async_trait]
impl Fetcher for Hupu {
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

    #[test]
    fn test_relative_links_prefixed() {
        let page = r#"
            <a href="/bbs/123.html" class="list-item">
              <div class="item-wrap">
                <div class="rank">1</div>
                <div class="title">湖人赢了</div>
              </div>
            </a>
            <a href="https://bbs.hupu.com/456.html" class="list-item">
              <div class="item-wrap"><div class="rank">2</div><div class="title">第二</div></div>
            </a>"#;
        let items = parse(page);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://www.hupu.com/bbs/123.html");
        assert_eq!(items[0].title, "湖人赢了");
        assert_eq!(items[1].url, "https://bbs.hupu.com/456.html");
    }
}
