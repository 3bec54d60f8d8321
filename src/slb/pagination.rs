//! Paged enumeration of a region's load balancers.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{ApiError, Result};

use super::api::SlbApi;
use super::types::{ListQuery, LoadBalancer};

/// Hard cap on the number of pages one listing may request.
pub const MAX_PAGES: u32 = 1_000;

/// Lazy, finite sequence of listing pages.
///
/// Each call to [`Paginator::next_page`] issues exactly one list call. The
/// sequence ends on a short or empty page, and once ended it stays ended.
pub struct Paginator<'a> {
    api: &'a dyn SlbApi,
    region: String,
    page_size: u32,
    next_page: u32,
    calls: u32,
    exhausted: bool,
    seen: HashSet<String>,
}

impl<'a> Paginator<'a> {
    /// Creates a paginator starting at page 1.
    #[must_use]
    pub fn new(api: &'a dyn SlbApi, region: impl Into<String>, page_size: u32) -> Self {
        Self {
            api,
            region: region.into(),
            page_size: page_size.max(1),
            next_page: 1,
            calls: 0,
            exhausted: false,
            seen: HashSet::new(),
        }
    }

    /// Number of list calls issued so far.
    #[must_use]
    pub const fn calls(&self) -> u32 {
        self.calls
    }

    /// Returns true once the sequence has ended.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next page, or `None` once the sequence has ended.
    ///
    /// Records already yielded by an earlier page are dropped from the batch.
    ///
    /// # Errors
    ///
    /// Returns the list call's error unchanged, or `InvalidResponse` if the
    /// listing runs past [`MAX_PAGES`].
    pub async fn next_page(&mut self) -> Result<Option<Vec<LoadBalancer>>> {
        if self.exhausted {
            return Ok(None);
        }

        if self.next_page > MAX_PAGES {
            self.exhausted = true;
            return Err(ApiError::InvalidResponse {
                message: format!(
                    "listing of region {} did not terminate within {MAX_PAGES} pages",
                    self.region
                ),
            }
            .into());
        }

        let query = ListQuery {
            region: self.region.clone(),
            page_size: self.page_size,
            page_number: self.next_page,
        };

        self.calls += 1;
        let batch = self.api.list(&query).await?;
        let full = u32::try_from(batch.len()).unwrap_or(u32::MAX) >= self.page_size;

        let fresh: Vec<LoadBalancer> = batch
            .into_iter()
            .filter(|record| self.seen.insert(record.id.clone()))
            .collect();

        debug!(
            "Listed page {} of {}: {} new record(s)",
            query.page_number,
            self.region,
            fresh.len()
        );

        if !full {
            self.exhausted = true;
        } else if fresh.is_empty() {
            warn!(
                "Page {} of {} repeated earlier records, ending listing",
                query.page_number, self.region
            );
            self.exhausted = true;
            return Ok(None);
        }

        self.next_page += 1;

        if fresh.is_empty() && self.exhausted {
            return Ok(None);
        }
        Ok(Some(fresh))
    }

    /// Drains the sequence into one de-duplicated list.
    ///
    /// # Errors
    ///
    /// Returns the first listing error; no partial result is returned.
    pub async fn collect_all(&mut self) -> Result<Vec<LoadBalancer>> {
        let mut records = Vec::new();
        while let Some(batch) = self.next_page().await? {
            records.extend(batch);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slb::memory::MemorySlb;
    use crate::slb::types::{AddressType, CreateLoadBalancerRequest};

    async fn seed(api: &MemorySlb, count: usize) {
        for i in 0..count {
            let request = CreateLoadBalancerRequest {
                client_token: format!("token-{i}"),
                name: Some(format!("lb-{i}")),
                address_type: AddressType::Internet,
                vswitch_id: None,
                master_zone_id: None,
                slave_zone_id: None,
                address_ip_version: Default::default(),
                delete_protection: Default::default(),
                resource_group_id: None,
                specification: None,
                tags: Default::default(),
            };
            api.create(&request).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_short_last_page_ends_listing() {
        let api = MemorySlb::new("cn-test");
        seed(&api, 7).await;

        let mut pages = Paginator::new(&api, "cn-test", 3);
        let records = pages.collect_all().await.unwrap();

        assert_eq!(records.len(), 7);
        assert_eq!(pages.calls(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_costs_one_extra_call() {
        let api = MemorySlb::new("cn-test");
        seed(&api, 6).await;

        let mut pages = Paginator::new(&api, "cn-test", 3);
        let records = pages.collect_all().await.unwrap();

        assert_eq!(records.len(), 6);
        assert_eq!(pages.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_region_costs_one_call() {
        let api = MemorySlb::new("cn-test");

        let mut pages = Paginator::new(&api, "cn-test", 50);
        assert!(pages.collect_all().await.unwrap().is_empty());
        assert_eq!(pages.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_sequence_stays_exhausted() {
        let api = MemorySlb::new("cn-test");
        seed(&api, 2).await;

        let mut pages = Paginator::new(&api, "cn-test", 5);
        assert_eq!(pages.next_page().await.unwrap().map(|b| b.len()), Some(2));
        assert!(pages.is_exhausted());
        assert!(pages.next_page().await.unwrap().is_none());
        assert!(pages.next_page().await.unwrap().is_none());
        assert_eq!(pages.calls(), 1);
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let api = MemorySlb::new("cn-test");
        seed(&api, 4).await;
        api.fail_next("list", ApiError::PermissionDenied {
            message: String::from("denied"),
        });

        let mut pages = Paginator::new(&api, "cn-test", 2);
        let err = pages.collect_all().await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::SlbError::Api(ApiError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_records_are_unique() {
        let api = MemorySlb::new("cn-test");
        seed(&api, 10).await;

        let records = Paginator::new(&api, "cn-test", 4).collect_all().await.unwrap();
        let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 10);
    }
}
