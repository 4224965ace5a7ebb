//! Extraction stage
//!
//! Pages requisitions out of the relational source and candidates and
//! communications out of the document source, validates every record, and
//! caches the assembled bundle. A failure on any page aborts the extraction and
//! nothing is cached.

use std::future::Future;
use std::sync::Arc;

use recruit_common::DateRange;
use tracing::{debug, info, instrument};

use crate::cache::TtlCache;
use crate::error::{EtlError, EtlResult};
use crate::models::{
    decode_document, CandidateDocument, CandidateRecord, CommunicationRecord, ExtractFilters,
    PageRequest, RawExtractBundle, RequisitionRecord,
};
use crate::stores::{Collection, DocumentSource, RequisitionSource};

pub type ExtractCache = TtlCache<String, Arc<RawExtractBundle>>;

pub struct Extractor {
    requisitions: Arc<dyn RequisitionSource>,
    documents: Arc<dyn DocumentSource>,
    cache: Arc<ExtractCache>,
}

/// Fetch pages until one comes back short
async fn collect_pages<T, F, Fut>(page_size: u64, mut fetch: F) -> EtlResult<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = EtlResult<Vec<T>>>,
{
    let mut page = PageRequest::first(page_size);
    let mut all = Vec::new();
    loop {
        let batch = fetch(page).await?;
        let returned = batch.len() as u64;
        all.extend(batch);
        if returned < page_size {
            break;
        }
        page = page.next();
    }
    Ok(all)
}

impl Extractor {
    pub fn new(
        requisitions: Arc<dyn RequisitionSource>,
        documents: Arc<dyn DocumentSource>,
        cache: Arc<ExtractCache>,
    ) -> Self {
        Self {
            requisitions,
            documents,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ExtractCache> {
        &self.cache
    }

    pub fn cache_key(range: &DateRange, filters: &ExtractFilters) -> String {
        format!("recruitment_data_{}_{}", range.cache_key(), filters.cache_key())
    }

    #[instrument(skip(self, range, filters), fields(range = %range))]
    pub async fn extract(
        &self,
        range: &DateRange,
        page_size: usize,
        filters: &ExtractFilters,
    ) -> EtlResult<Arc<RawExtractBundle>> {
        if page_size == 0 {
            return Err(EtlError::validation("page_size must be greater than 0"));
        }

        let key = Self::cache_key(range, filters);
        if let Some(bundle) = self.cache.get(&key) {
            info!(records = bundle.record_count(), "Extraction served from cache");
            return Ok(bundle);
        }

        let page_size = page_size as u64;
        let (requisitions, candidates, communications) = tokio::try_join!(
            self.fetch_requisitions(range, filters, page_size),
            self.fetch_candidates(range, filters, page_size),
            self.fetch_communications(range, page_size),
        )?;

        let bundle = Arc::new(RawExtractBundle {
            requisitions,
            candidates,
            communications,
        });

        info!(
            requisitions = bundle.requisitions.len(),
            candidates = bundle.candidates.len(),
            communications = bundle.communications.len(),
            "Extraction complete"
        );

        self.cache.insert(key, Arc::clone(&bundle));
        Ok(bundle)
    }

    async fn fetch_requisitions(
        &self,
        range: &DateRange,
        filters: &ExtractFilters,
        page_size: u64,
    ) -> EtlResult<Vec<RequisitionRecord>> {
        let rows = collect_pages(page_size, |page| {
            self.requisitions.fetch_requisitions(range, filters, page)
        })
        .await?;
        debug!(rows = rows.len(), "Fetched requisition rows");

        rows.into_iter().map(RequisitionRecord::try_from).collect()
    }

    async fn fetch_candidates(
        &self,
        range: &DateRange,
        filters: &ExtractFilters,
        page_size: u64,
    ) -> EtlResult<Vec<CandidateRecord>> {
        let docs = collect_pages(page_size, |page| {
            self.documents.scan(Collection::Candidates, range, page)
        })
        .await?;

        let mut candidates = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc: CandidateDocument = decode_document(Collection::Candidates.name(), doc)?;
            let candidate = CandidateRecord::try_from(doc)?;
            if filters.matches_candidate(&candidate) {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    async fn fetch_communications(
        &self,
        range: &DateRange,
        page_size: u64,
    ) -> EtlResult<Vec<CommunicationRecord>> {
        let docs = collect_pages(page_size, |page| {
            self.documents.scan(Collection::Communications, range, page)
        })
        .await?;

        docs.into_iter()
            .map(|doc| decode_document(Collection::Communications.name(), doc))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_pages_stops_on_short_page() {
        let mut calls = Vec::new();
        let items = collect_pages(10, |page| {
            calls.push(page);
            let n = if page.offset < 20 { 10 } else { 3 };
            async move { Ok((0..n).map(|i| page.offset + i).collect::<Vec<u64>>()) }
        })
        .await
        .unwrap();

        assert_eq!(items.len(), 23);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], PageRequest { offset: 20, limit: 10 });
    }

    #[tokio::test]
    async fn test_collect_pages_exact_multiple_needs_empty_page() {
        let mut calls = 0;
        let items = collect_pages(5, |page| {
            calls += 1;
            let n = if page.offset < 10 { 5 } else { 0 };
            async move { Ok(vec![(); n]) }
        })
        .await
        .unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_failure() {
        let result: EtlResult<Vec<u8>> = collect_pages(5, |page| async move {
            if page.offset == 0 {
                Ok(vec![0; 5])
            } else {
                Err(EtlError::extraction("connection reset"))
            }
        })
        .await;
        assert!(matches!(result, Err(EtlError::Extraction(_))));
    }

    #[test]
    fn test_cache_key_includes_filters() {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let range = DateRange::new(start, end).unwrap();

        let plain = Extractor::cache_key(&range, &ExtractFilters::default());
        let filtered = Extractor::cache_key(&range, &ExtractFilters::for_client("c-1"));
        assert!(plain.starts_with("recruitment_data_2024-01-01T00:00:00+00:00_"));
        assert_ne!(plain, filtered);
    }
}
