use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::NO_MATCHES;

pub const ID: &str = "v2ex";
pub const NAME: &str = "V2EX";
pub const ICON: &str = "https://www.v2ex.com/static/favicon.ico";

const SITE: &str = "https://www.v2ex.com";

static TOPIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class="item_hot_topic_title">\s*<a href="(.*?)">(.*?)</a>\s*</span>"#)
        .unwrap()
});

/// Hot topics from the V2EX front page sidebar
pub struct V2ex {
    client: HttpClient,
    endpoint: String,
}

impl V2ex {
    pub fn new(client: HttpClient) -> Self {
        Self::with_endpoint(client, SITE)
    }

    pub fn with_endpoint(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

fn parse(page: &str) -> Vec<NormalizedRecord> {
    TOPIC_RE
        .captures_iter(page)
        .enumerate()
        .map(|(i, c)| NormalizedRecord::new(i as u32 + 1, &c[2], format!("{}{}", SITE, &c[1])))
        .collect()
}

#[async_trait]
impl Fetcher for V2ex {
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
    fn test_links_are_absolute() {
        let page = r#"
            <span class="item_hot_topic_title">
                <a href="/t/1001">第一个话题</a>
            </span>
            <span class="item_hot_topic_title"><a href="/t/1002">second</a></span>"#;
        let items = parse(page);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://www.v2ex.com/t/1001");
        assert_eq!(items[1].title, "second");
        assert_eq!(items[1].position, 2);
    }
}
