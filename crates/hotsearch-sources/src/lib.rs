//! Site-specific fetchers and the default source registry.
//!
//! JSON sources decode the upstream API with serde; HTML sources are
//! scraped with precompiled regexes. Every fetcher numbers its rows 1..n in
//! upstream order and turns "reachable but nothing usable" into a code-500
//! result instead of an error.

pub mod client;
pub mod sites;

use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use hotsearch::{FetcherRegistry, RegistryError};

pub use client::{HttpClient, DEFAULT_TIMEOUT};

/// Reason carried by a JSON source that decoded but had no rows
pub(crate) const EMPTY_PAYLOAD: &str = "upstream returned no data";
/// Reason carried by an HTML source whose pattern matched nothing
pub(crate) const NO_MATCHES: &str = "no entries matched, page layout may have changed";

/// Build the registry of every built-in source, in display order, plus the
/// `kuake` alias for quark.
pub fn default_registry(client: HttpClient) -> Result<FetcherRegistry, RegistryError> {
    use sites::*;

    let mut registry = FetcherRegistry::new();
    registry.register(
        search360::ID,
        search360::NAME,
        search360::ICON,
        Arc::new(search360::Search360::new(client.clone())),
    )?;
    registry.register(
        baidu::ID,
        baidu::NAME,
        baidu::ICON,
        Arc::new(baidu::Baidu::new(client.clone())),
    )?;
    registry.register(
        bilibili::ID,
        bilibili::NAME,
        bilibili::ICON,
        Arc::new(bilibili::Bilibili::new(client.clone())),
    )?;
    registry.register(
        csdn::ID,
        csdn::NAME,
        csdn::ICON,
        Arc::new(csdn::Csdn::new(client.clone())),
    )?;
    registry.register(
        douban::ID,
        douban::NAME,
        douban::ICON,
        Arc::new(douban::Douban::new(client.clone())),
    )?;
    registry.register(
        douyin::ID,
        douyin::NAME,
        douyin::ICON,
        Arc::new(douyin::Douyin::new(client.clone())),
    )?;
    registry.register(
        github::ID,
        github::NAME,
        github::ICON,
        Arc::new(github::Github::new(client.clone())),
    )?;
    registry.register(
        hupu::ID,
        hupu::NAME,
        hupu::ICON,
        Arc::new(hupu::Hupu::new(client.clone())),
    )?;
    registry.register(
        ithome::ID,
        ithome::NAME,
        ithome::ICON,
        Arc::new(ithome::Ithome::new(client.clone())),
    )?;
    registry.register(
        quark::ID,
        quark::NAME,
        quark::ICON,
        Arc::new(quark::Quark::new(client.clone())),
    )?;
    registry.register(
        toutiao::ID,
        toutiao::NAME,
        toutiao::ICON,
        Arc::new(toutiao::Toutiao::new(client.clone())),
    )?;
    registry.register(
        v2ex::ID,
        v2ex::NAME,
        v2ex::ICON,
        Arc::new(v2ex::V2ex::new(client.clone())),
    )?;
    registry.register(
        weibo::ID,
        weibo::NAME,
        weibo::ICON,
        Arc::new(weibo::Weibo::new(client.clone())),
    )?;
    registry.register(
        zhihu::ID,
        zhihu::NAME,
        zhihu::ICON,
        Arc::new(zhihu::Zhihu::new(client)),
    )?;

    registry.alias("kuake", quark::ID)?;
    Ok(registry)
}

/// Format a raw heat score in units of 10,000 ("万").
pub fn format_wan(value: f64, decimals: usize) -> String {
    format!("{:.*}万", decimals, value / 10_000.0)
}

/// `base` with `query` form-encoded onto the end.
pub(crate) fn search_url(base: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    format!("{}{}", base, encoded)
}

/// Heat scores arrive as numbers from some APIs and numeric strings from
/// others. Anything unparseable reads as zero.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.trim().parse().unwrap_or(0.0),
        Raw::Other(_) => 0.0,
    })
}
