//! One posting run: scan the catalog, pick released VR titles, publish up to
//! the post limit, recent titles first.

use crate::catalog::{CatalogError, CatalogSource, fetch_all_pages};
use crate::config::Settings;
use crate::description::{DescriptionResolver, PageFetcher};
use crate::filters::{released_vr_newest_first, split_recent_and_backlog};
use crate::models::CatalogItem;
use crate::post::{PostDraft, affiliate_link, collect_tags, render_body};
use crate::publish::{PostPublisher, PublishError};
use chrono::{DateTime, FixedOffset};
use std::fmt;
use tracing::{error, info, instrument, warn};

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub fetched: usize,
    pub eligible: usize,
    pub recent: usize,
    pub backlog: usize,
    pub posted: usize,
    pub already_published: usize,
    pub no_images: usize,
    pub failed: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "posted {} (already published {}, no images {}, failed {}) from {} eligible of {} fetched",
            self.posted,
            self.already_published,
            self.no_images,
            self.failed,
            self.eligible,
            self.fetched
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ItemOutcome {
    Posted(String),
    AlreadyPublished,
    NoImages,
}

pub struct BatchJob<'a, C, P, F> {
    catalog: C,
    publisher: P,
    resolver: DescriptionResolver<'a, F>,
    settings: &'a Settings,
}

impl<'a, C, P, F> BatchJob<'a, C, P, F>
where
    C: CatalogSource,
    P: PostPublisher,
    F: PageFetcher,
{
    pub fn new(catalog: C, publisher: P, fetcher: F, settings: &'a Settings) -> Self {
        Self {
            catalog,
            publisher,
            resolver: DescriptionResolver::new(fetcher, &settings.resolver),
            settings,
        }
    }

    /// Run once against the clock `now`.
    ///
    /// Only a catalog failure is an error; publishing problems are counted
    /// per item and the run moves on.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self, now: DateTime<FixedOffset>) -> Result<BatchSummary, CatalogError> {
        let catalog = &self.settings.catalog;
        let limit = self.settings.batch.post_limit;

        let items = fetch_all_pages(&self.catalog, catalog.max_pages, catalog.hits).await?;
        let mut summary = BatchSummary {
            fetched: items.len(),
            ..BatchSummary::default()
        };

        let eligible = released_vr_newest_first(items, now);
        summary.eligible = eligible.len();
        let (recent, backlog) =
            split_recent_and_backlog(eligible, now, self.settings.batch.recent_days);
        summary.recent = recent.len();
        summary.backlog = backlog.len();
        info!(
            recent = summary.recent,
            backlog = summary.backlog,
            recent_days = self.settings.batch.recent_days,
            "Eligible items split"
        );

        for item in recent.iter().chain(backlog.iter()) {
            if summary.posted >= limit {
                break;
            }
            match self.publish_item(item).await {
                Ok(ItemOutcome::Posted(post_id)) => {
                    summary.posted += 1;
                    info!(title = %item.title, %post_id, posted = summary.posted, limit, "Posted");
                }
                Ok(ItemOutcome::AlreadyPublished) => {
                    summary.already_published += 1;
                    info!(title = %item.title, "Already published; skipping");
                }
                Ok(ItemOutcome::NoImages) => {
                    summary.no_images += 1;
                    info!(title = %item.title, "No sample images; skipping");
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(title = %item.title, error = %e, "Publishing failed; moving on");
                }
            }
        }

        if summary.posted == 0 {
            info!("No new posts (nothing eligible or everything already published)");
        }
        Ok(summary)
    }

    #[instrument(level = "info", skip_all, fields(title = %item.title))]
    async fn publish_item(&self, item: &CatalogItem) -> Result<ItemOutcome, PublishError> {
        if self.publisher.already_published(&item.title).await? {
            return Ok(ItemOutcome::AlreadyPublished);
        }

        let images = item.sample_image_urls();
        let Some(lead) = images.first() else {
            return Ok(ItemOutcome::NoImages);
        };

        let thumbnail_id = match self.publisher.upload_image(lead).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(url = %lead, error = %e, "Thumbnail upload failed; posting without one");
                None
            }
        };

        let link = affiliate_link(&item.url, &self.settings.catalog.affiliate_id);
        let description = self.resolver.resolve(item, &item.url).await;
        info!(tier = %description.tier, chars = description.text.chars().count(), "Description ready");

        let draft = PostDraft {
            title: item.title.clone(),
            content: render_body(&item.title, &link, &description.text, images),
            category: self.settings.publish.category.clone(),
            tags: collect_tags(item),
            thumbnail_id,
        };
        let post_id = self.publisher.create_post(&draft).await?;
        Ok(ItemOutcome::Posted(post_id))
    }
}
