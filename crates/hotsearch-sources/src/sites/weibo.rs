use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::NO_MATCHES;

pub const ID: &str = "weibo";
pub const NAME: &str = "微博";
pub const ICON: &str = "https://weibo.com/favicon.ico";

const ENDPOINT: &str = "https://s.weibo.com/top/summary";
const SITE: &str = "https://s.weibo.com";

const HEADERS: &[(&str, &str)] = &[
    ("Cookie", "SUB=_2AkMasdasdqadTy2Pna4Rl77p7cJZAXC"),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
    ("Referer", "https://s.weibo.com/"),
];

/// Link, title and heat span of a ranked row
static ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a href="(/weibo\?q=[^"]+)"[^>]*target="_blank">([^<]+)</a>\s*<span>([^<]*)?</span>"#)
        .unwrap()
});

/// Looser patterns tried in order when the row pattern finds nothing.
/// These carry no heat value.
static FALLBACK_RES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r#"<a href="(/weibo\?q=[^"]+)"[^>]*>([^<]+)</a>"#).unwrap(),
        Regex::new(r#"class="td-02".*?<a href="(/weibo\?q=[^"]+)"[^>]*>([^<]+)</a>"#).unwrap(),
    ]
});

static NON_DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Weibo hot search summary, scraped from HTML
pub struct Weibo {
    client: HttpClient,
    endpoint: String,
}

impl Weibo {
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
    let items: Vec<NormalizedRecord> = ROW_RE
        .captures_iter(page)
        .enumerate()
        .map(|(i, c)| {
            let hot = c
                .get(3)
                .map(|m| NON_DIGIT_RE.replace_all(m.as_str(), "").into_owned())
                .unwrap_or_default();
            NormalizedRecord::new(i as u32 + 1, c[2].trim(), format!("{}{}", SITE, &c[1]))
                .with_hot_value(hot)
        })
        .collect();
    if !items.is_empty() {
        return items;
    }

    for re in FALLBACK_RES.iter() {
        let items: Vec<NormalizedRecord> = re
            .captures_iter(page)
            .enumerate()
            .map(|(i, c)| {
                NormalizedRecord::new(i as u32 + 1, c[2].trim(), format!("{}{}", SITE, &c[1]))
            })
            .collect();
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}

#[async_trait]
impl Fetcher for Weibo {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        let page = self.client.get_text(&self.endpoint, HEADERS).await?;
        let items = parse(&page);
        if items.is_empty() {
            return Ok(FetchResult::empty_upstream(NO_MATCHES, ICON));
        }
        Ok(FetchResult::success(ID, ICON, items))
    }
}
