use crate::{Record, Time, Uuid};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct NewsId(pub Uuid);

impl std::fmt::Display for NewsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsCategory {
    Technology,
    Telecom,
    Media,
    Entertainment,
    Trending,
    New,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 6] = [
        NewsCategory::Technology,
        NewsCategory::Telecom,
        NewsCategory::Media,
        NewsCategory::Entertainment,
        NewsCategory::Trending,
        NewsCategory::New,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NewsCategory::Technology => "technology",
            NewsCategory::Telecom => "telecom",
            NewsCategory::Media => "media",
            NewsCategory::Entertainment => "entertainment",
            NewsCategory::Trending => "trending",
            NewsCategory::New => "new",
        }
    }
}

impl std::fmt::Display for NewsCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for NewsCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<NewsCategory> {
        NewsCategory::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown news category {s:?}"))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum NewsTag {
    #[serde(rename = "M&A")]
    MergersAndAcquisitions,
    #[serde(rename = "funding")]
    Funding,
    #[serde(rename = "new tech")]
    NewTech,
    #[serde(rename = "product launch")]
    ProductLaunch,
    #[serde(rename = "earnings")]
    Earnings,
    #[serde(rename = "regulation")]
    Regulation,
    #[serde(rename = "interview")]
    Interview,
    #[serde(rename = "opinion")]
    Opinion,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CategoryFilter {
    All,
    Only(NewsCategory),
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct News {
    pub id: NewsId,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub source_image_url: Option<String>,
    pub news_date: Time,
    pub created_at: Time,

    #[serde(default)]
    pub categories: Vec<NewsCategory>,
    #[serde(default)]
    pub tags: Vec<NewsTag>,

    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub shares_count: i64,

    #[serde(default)]
    pub metadata: Option<Record>,
}

impl News {
    pub fn primary_category(&self) -> Option<NewsCategory> {
        self.categories.first().copied()
    }
}
