use std::time::Duration;

use crate::api::{News, NewsCategory};

pub const MAX_IMAGE_RETRIES: u32 = 8;

/// Picture shown when an article has no image, or its image keeps failing
pub fn backup_image(category: Option<NewsCategory>) -> &'static str {
    match category {
        Some(NewsCategory::Technology) => "https://images.unsplash.com/photo-1518770660439-4636190af475?auto=format&fit=crop&w=1200&q=80",
        Some(NewsCategory::Telecom) => "https://images.unsplash.com/photo-1546027658-7aa750153465?auto=format&fit=crop&w=1200&q=80",
        Some(NewsCategory::Media) => "https://images.unsplash.com/photo-1626812754718-79351472df4f?auto=format&fit=crop&w=1200&q=80",
        Some(NewsCategory::Entertainment) => "https://images.unsplash.com/photo-1603190287605-e6ade32fa852?auto=format&fit=crop&w=1200&q=80",
        Some(NewsCategory::Trending) => "https://images.unsplash.com/photo-1460925895917-afdab827c52f?auto=format&fit=crop&w=1200&q=80",
        Some(NewsCategory::New) | None => "https://images.unsplash.com/photo-1504711434969-e33886168f5c?auto=format&fit=crop&w=1200&q=80",
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageStep {
    /// Load [`ImageLoader::url`] again once this delay has elapsed
    RetryAfter(Duration),

    /// Give up and show [`ImageLoader::url`], now the backup image
    Fallback,
}

/// Retry schedule for the picture of one news card
#[derive(Clone, Debug)]
pub struct ImageLoader {
    image_url: Option<String>,
    category: Option<NewsCategory>,
    retries: u32,
    gave_up: bool,
}

impl ImageLoader {
    pub fn for_news(news: &News) -> ImageLoader {
        ImageLoader {
            image_url: news.image_url.clone().filter(|u| !u.is_empty()),
            category: news.primary_category(),
            retries: 0,
            gave_up: false,
        }
    }

    pub fn url(&self) -> &str {
        match (&self.image_url, self.gave_up) {
            (Some(url), false) => url.as_str(),
            _ => backup_image(self.category),
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn on_error(&mut self) -> ImageStep {
        if self.gave_up || self.image_url.is_none() {
            self.gave_up = true;
            return ImageStep::Fallback;
        }
        if self.retries < MAX_IMAGE_RETRIES {
            let delay = Duration::from_millis(1000 + 500 * u64::from(self.retries));
            self.retries += 1;
            return ImageStep::RetryAfter(delay);
        }
        tracing::error!(
            url = ?self.image_url,
            retries = self.retries,
            "giving up on news image"
        );
        self.gave_up = true;
        ImageStep::Fallback
    }
}
