//! Paginated search and per-user listings on top of the search index.

use std::sync::Arc;

use tracing::debug;

use crate::{
    domain::{Enrollment, Page, Record, UserId},
    ports::SearchIndex,
    search_cache::{normalize_query, SearchResultCache},
    views::page_count,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListPage {
    pub query: String,
    /// 1-based.
    pub page: usize,
    pub pages: usize,
    pub total: u64,
    pub records: Vec<Record>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinePage {
    pub page: usize,
    pub pages: usize,
    pub total: u64,
    pub records: Vec<Record>,
    pub enrollments: Vec<Enrollment>,
}

pub struct ListingService {
    index: Arc<dyn SearchIndex>,
    cache: SearchResultCache,
    classifications: Vec<String>,
    page_size: usize,
}

impl ListingService {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        cache: SearchResultCache,
        classifications: Vec<String>,
        page_size: usize,
    ) -> Self {
        Self {
            index,
            cache,
            classifications,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Configured classification matching `query`, ignoring case.
    pub fn classification_for(&self, query: &str) -> Option<&str> {
        let query = query.trim();
        self.classifications
            .iter()
            .find(|c| c.eq_ignore_ascii_case(query))
            .map(String::as_str)
    }

    /// One page of results. Classification names search by classification,
    /// anything else by keyword. Served from the cache when possible.
    pub async fn search(&self, query: &str, page: usize) -> Result<ListPage> {
        let page = page.max(1);
        let offset = (page - 1) * self.page_size;
        let normalized = normalize_query(query);

        let (records, total) = match self.cache.get(&normalized, offset) {
            Some(hit) => {
                debug!(query = %normalized, offset, "Search cache hit");
                (hit.records, hit.total)
            }
            None => {
                let found = match self.classification_for(&normalized) {
                    Some(class) => {
                        self.index
                            .search_by_classification(class, offset, self.page_size)
                            .await?
                    }
                    None => {
                        self.index
                            .search_by_keyword(&normalized, offset, self.page_size)
                            .await?
                    }
                };
                self.cache
                    .put(&normalized, offset, found.items.clone(), found.total);
                (found.items, found.total)
            }
        };

        Ok(ListPage {
            query: normalized,
            page,
            pages: page_count(total, self.page_size),
            total,
            records,
        })
    }

    /// The user's records first, then their enrollments filling the rest of
    /// the page.
    pub async fn mine(&self, user: UserId, page: usize) -> Result<MinePage> {
        let page = page.max(1);
        let size = self.page_size;
        let offset = (page - 1) * size;

        let records = self.index.search_by_creator(user, offset, size).await?;
        let record_total = records.total as usize;

        let enrollments = if records.items.len() >= size {
            // Totals are still needed for the page count.
            let e = self.index.enrollments_by_creator(user, 0, 0).await?;
            Page {
                items: Vec::new(),
                total: e.total,
            }
        } else {
            let e_offset = offset.saturating_sub(record_total);
            let e_limit = size - records.items.len();
            self.index
                .enrollments_by_creator(user, e_offset, e_limit)
                .await?
        };

        let total = records.total + enrollments.total;
        Ok(MinePage {
            page,
            pages: page_count(total, size),
            total,
            records: records.items,
            enrollments: enrollments.items,
        })
    }
}
