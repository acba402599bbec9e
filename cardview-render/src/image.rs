//! Card image sources and the loading chain.
//!
//! Loading tries an ordered list of [`ImageStrategy`] values and stops at the
//! first success. The default chain is a direct load with cross-origin
//! credentials, a direct load without them, and a fetch that inlines the
//! bytes as a `data:` URI. When everything fails the card shows a
//! placeholder naming the source.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cardview_core::config::LayoutParams;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;

use crate::errors::{RenderError, RenderResult};
use crate::format::markdown_image;
use crate::value::{LinkRef, PropertyValue};

/// Where a card image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "src", rename_all = "snake_case")]
pub enum ImageSource {
    /// Absolute `http(s)://` or `data:` URL.
    External(String),
    /// Path inside the vault, resolved by the host.
    Vault(String),
}

impl ImageSource {
    /// Parse a bare path, URL, wiki-link or markdown image.
    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some((src, _)) = markdown_image(text) {
            return Self::from_text(&src);
        }
        if let Some(link) = LinkRef::from_wikilink(text) {
            return Some(Self::Vault(link.path));
        }
        if is_external(text) {
            return Some(Self::External(text.to_string()));
        }
        Some(Self::Vault(text.to_string()))
    }

    /// Image source from a property value. Lists use their first usable item.
    pub fn from_value(value: &PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::String(text) => Self::from_text(text),
            PropertyValue::Link(link) => Some(Self::Vault(link.path.clone())),
            PropertyValue::List(items) => items.iter().find_map(Self::from_value),
            PropertyValue::Object(row) => row
                .get("path")
                .and_then(PropertyValue::as_str)
                .and_then(Self::from_text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::External(url) | Self::Vault(url) => url,
        }
    }
}

fn is_external(text: &str) -> bool {
    text.starts_with("data:")
        || Url::parse(text).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Whether a direct load sends cross-origin credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Include,
    Omit,
}

/// The host side of image loading.
#[async_trait::async_trait]
pub trait ImageHost: Send + Sync {
    /// URL the host serves a vault file under, if the file exists.
    fn resource_url(&self, path: &str) -> Option<String>;

    /// Load `url` into an image element.
    async fn load(&self, url: &str, credentials: Credentials) -> RenderResult<()>;
}

/// One step of the loading chain. Returns the `src` to display.
#[async_trait::async_trait]
pub trait ImageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn load(&self, host: &dyn ImageHost, url: &str) -> RenderResult<String>;
}

#[derive(Debug, Clone, Copy)]
pub struct DirectLoad {
    pub credentials: Credentials,
}

#[async_trait::async_trait]
impl ImageStrategy for DirectLoad {
    fn name(&self) -> &'static str {
        match self.credentials {
            Credentials::Include => "direct-credentials",
            Credentials::Omit => "direct",
        }
    }

    async fn load(&self, host: &dyn ImageHost, url: &str) -> RenderResult<String> {
        host.load(url, self.credentials).await?;
        Ok(url.to_string())
    }
}

/// Fetch the image bytes and inline them as a `data:` URI.
#[derive(Debug, Clone)]
pub struct FetchInline {
    client: reqwest::Client,
}

impl FetchInline {
    pub fn new(timeout: Duration) -> RenderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Image(e.to_string()))?;
        Ok(Self { client })
    }

    fn mime_from_extension(url: &Url) -> &'static str {
        let ext = url
            .path()
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "svg" => "image/svg+xml",
            "bmp" => "image/bmp",
            "avif" => "image/avif",
            _ => "image/jpeg",
        }
    }
}

#[async_trait::async_trait]
impl ImageStrategy for FetchInline {
    fn name(&self) -> &'static str {
        "fetch-inline"
    }

    async fn load(&self, host: &dyn ImageHost, url: &str) -> RenderResult<String> {
        let parsed = Url::parse(url).map_err(|e| RenderError::Image(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RenderError::Image(format!("{url}: cannot fetch {} URLs", parsed.scheme())));
        }

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| RenderError::Image(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(RenderError::Image(format!("{url}: HTTP {}", response.status())));
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or_else(|| Self::mime_from_extension(&parsed).to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Image(format!("{url}: {e}")))?;
        let data_uri = format!("data:{mime};base64,{}", STANDARD.encode(&bytes));

        host.load(&data_uri, Credentials::Omit).await?;
        Ok(data_uri)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImageOutcome {
    Loaded { src: String, strategy: String },
    /// Every strategy failed; `source` names what was tried.
    Placeholder { source: String },
}

/// Host-side visibility tracking for lazy images.
pub trait ViewportObserver: Send + Sync {
    /// Start watching `target`. The receiver fires once the target comes
    /// within `margin_px` of the viewport.
    fn observe(&self, target: &str, margin_px: u32) -> oneshot::Receiver<()>;

    fn disconnect(&self, target: &str);
}

pub struct ImageLoader {
    strategies: Vec<Box<dyn ImageStrategy>>,
}

impl ImageLoader {
    pub fn new(strategies: Vec<Box<dyn ImageStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct with credentials, direct without, then fetch-and-inline.
    pub fn with_default_chain(fetch_timeout: Duration) -> RenderResult<Self> {
        Ok(Self::new(vec![
            Box::new(DirectLoad {
                credentials: Credentials::Include,
            }),
            Box::new(DirectLoad {
                credentials: Credentials::Omit,
            }),
            Box::new(FetchInline::new(fetch_timeout)?),
        ]))
    }

    pub async fn load(&self, host: &dyn ImageHost, source: &ImageSource) -> ImageOutcome {
        let placeholder = || ImageOutcome::Placeholder {
            source: source.as_str().to_string(),
        };

        let url = match source {
            ImageSource::External(url) => url.clone(),
            ImageSource::Vault(path) => match host.resource_url(path) {
                Some(url) => url,
                None => {
                    tracing::debug!(path = %path, "image not found in vault");
                    return placeholder();
                }
            },
        };

        for strategy in &self.strategies {
            match strategy.load(host, &url).await {
                Ok(src) => {
                    return ImageOutcome::Loaded {
                        src,
                        strategy: strategy.name().to_string(),
                    };
                }
                Err(err) => {
                    tracing::debug!(strategy = strategy.name(), error = %err, "image strategy failed");
                }
            }
        }
        placeholder()
    }

    /// Wait until `target` is near the viewport, then run the chain. The
    /// observer is disconnected after it fires.
    pub async fn load_when_visible(
        &self,
        host: &dyn ImageHost,
        observer: &dyn ViewportObserver,
        target: &str,
        margin_px: u32,
        source: &ImageSource,
    ) -> ImageOutcome {
        let visible = observer.observe(target, margin_px).await;
        observer.disconnect(target);
        if visible.is_err() {
            tracing::debug!(card = %target, "viewport observer dropped before image became visible");
            return ImageOutcome::Placeholder {
                source: source.as_str().to_string(),
            };
        }
        self.load(host, source).await
    }

    /// Load `source` for a card laid out with `layout`: deferred until
    /// visible when lazy loading is on, immediately otherwise.
    pub async fn load_for_layout(
        &self,
        host: &dyn ImageHost,
        observer: &dyn ViewportObserver,
        layout: &LayoutParams,
        target: &str,
        source: &ImageSource,
    ) -> ImageOutcome {
        if layout.lazy_load {
            self.load_when_visible(host, observer, target, layout.lazy_load_margin, source)
                .await
        } else {
            self.load(host, source).await
        }
    }
}
