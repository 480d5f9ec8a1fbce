//! Turning content ids that are not directly playable into stream URLs.

use async_trait::async_trait;
use url::Url;

use crate::error::ResolverError;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub url: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_live_stream: bool,
}

/// Resolves pages of a media site into something a receiver can play.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Whether `content_id` has to go through this resolver before loading.
    fn accepts(&self, content_id: &str) -> bool;

    async fn resolve(
        &self,
        content_id: &str,
        quality: Option<&str>,
    ) -> Result<ResolvedMedia, ResolverError>;
}

const YOUTUBE_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

pub fn is_youtube_url(content_id: &str) -> bool {
    let Ok(url) = Url::parse(content_id) else {
        return false;
    };
    matches!(url.scheme(), "http" | "https")
        && url
            .host_str()
            .is_some_and(|host| YOUTUBE_HOSTS.contains(&host.to_ascii_lowercase().as_str()))
}
