use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use hotsearch::{FetchError, FetchResult, Fetcher, NormalizedRecord};

use crate::client::HttpClient;
use crate::NO_MATCHES;

pub const ID: &str = "github";
pub const NAME: &str = "GitHub";
pub const ICON: &str = "https://github.githubassets.com/favicons/favicon.png";

const ENDPOINT: &str = "https://github.com/trending";
const SITE: &str = "https://github.com/";

/// Owner span, repository name, then the description paragraph
static REPO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"<span\s+data-view-component="true"\s+class="text-normal">\s*([^<]+)\s*</span>\s*([^<]+)</a>\s*</h2>\s*"#,
        r#"<p\sclass="col-9 color-fg-muted my-1 pr-4">\s*([^<]+)\s*</p>"#,
    ))
    .unwrap()
});

/// GitHub trending repositories
pub struct Github {
    client: HttpClient,
    endpoint: String,
}

impl Github {
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
    REPO_RE
        .captures_iter(page)
        .enumerate()
        .map(|(i, c)| {
            // "owner /" + "repo" with the markup whitespace removed
            let full_name: String = format!("{}{}", c[1].trim(), c[2].trim())
                .chars()
                .filter(|ch| *ch != ' ')
                .collect();
            let url = format!("{}{}", SITE, full_name);
            NormalizedRecord::new(i as u32 + 1, full_name, url).with_description(c[3].trim())
        })
        .collect()
}

#[async_trait]
impl Fetcher for Github {
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
      <h2 class="h3 lh-condensed">
        <a href="/tokio-rs/tokio">
          <span data-view-component="true" class="text-normal">
            tokio-rs /
          </span>
          tokio
        </a>
      </h2>
      <p class="col-9 color-fg-muted my-1 pr-4">
        A runtime for writing reliable asynchronous applications with Rust.
      </p>"#;

    #[test]
    fn test_parse_repo_with_description() {
        let items = parse(PAGE);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "tokio-rs/tokio");
        assert_eq!(items[0].url, "https://github.com/tokio-rs/tokio");
        assert_eq!(
            items[0].description.as_deref(),
            Some("A runtime for writing reliable asynchronous applications with Rust.")
        );
    }

    #[tokio::test]
    async fn test_fetch_trending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trending"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let client = HttpClient::new(DEFAULT_TIMEOUT).unwrap();
        let fetcher = Github::with_endpoint(client, format!("{}/trending", server.uri()));
        let result = fetcher.fetch().await.unwrap();
        assert_eq!(result.message, "github");
        assert_eq!(result.items.len(), 1);
    }
}
