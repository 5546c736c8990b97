//! Incremental acquisition controller.
//!
//! [`Harvester::acquire`] reconciles a requested target (N items with M
//! feedback entries each) against what the store already holds, and does
//! only the remaining work:
//!
//! 1. Ask the store which references are already satisfied and which
//!    identifiers are known at all.
//! 2. `deficit = N - |satisfied|`; nothing to do when it is zero.
//! 3. Inflate the deficit by the error margin to get the candidate budget.
//! 4. Walk listing pages, admitting unsatisfied references up to the budget.
//! 5. For each candidate, in listing order: extract, screen, check that
//!    both stores agree on the identifier, load the stored record if it
//!    exists, collect only the feedback still needed, and persist through
//!    the dual-write coordinator. A stored item that gains no feedback is
//!    skipped rather than returned.
//!
//! When a candidate is skipped and the queue can no longer cover the
//! deficit, one more reference is pulled from the listing.
//!
//! A `Harvester` owns one session and runs strictly sequentially.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dedup::ReferenceFilter;
use crate::error::Result;
use crate::feedback::collect_feedback;
use crate::models::ItemRecord;
use crate::policy::{HarvestPolicy, SkipReason};
use crate::progress::{AcquireEvent, NoProgress, ProgressReporter};
use crate::source::{Extraction, FeedbackExtractor, ItemExtractor, PageSource};
use crate::store::mirrored::{MirroredStore, Presence};
use crate::store::ItemStore;

/// Counters for one `acquire` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireStats {
    /// Items already meeting the feedback target before the run.
    pub satisfied: usize,
    pub deficit: usize,
    pub budget: usize,
    pub pages: usize,
    /// Candidate references handed to the item extractor.
    pub candidates: usize,
    pub skipped: usize,
    /// Items written for the first time.
    pub created: usize,
    /// Known items that only received feedback.
    pub augmented: usize,
    pub feedback_written: usize,
}

/// Result of one `acquire` call.
#[derive(Debug, Clone)]
pub struct Acquisition {
    /// Items newly written or augmented in this call, in listing order.
    ///
    /// For augmented items the record carries the stored attributes and
    /// only the feedback collected in this call.
    pub items: Vec<ItemRecord>,
    pub stats: AcquireStats,
}

enum Outcome {
    Acquired { record: ItemRecord, created: bool },
    Skipped(SkipReason),
}

/// Pulls admitted references from a page source on demand.
struct CandidateQueue {
    filter: ReferenceFilter,
    buffer: VecDeque<String>,
    started: bool,
    exhausted: bool,
    pages: usize,
}

impl CandidateQueue {
    fn new(filter: ReferenceFilter) -> Self {
        Self {
            filter,
            buffer: VecDeque::new(),
            started: false,
            exhausted: false,
            pages: 0,
        }
    }

    async fn next(
        &mut self,
        source: &mut (dyn PageSource + '_),
        step_timeout: Duration,
        page_load_wait: Duration,
    ) -> Result<Option<String>> {
        loop {
            while let Some(reference) = self.buffer.pop_front() {
                if let Some(normalized) = self.filter.admit(&reference) {
                    return Ok(Some(normalized));
                }
            }
            if self.exhausted {
                return Ok(None);
            }
            if self.started {
                match tokio::time::timeout(step_timeout, source.advance_page()).await {
                    Ok(result) => {
                        if !result? {
                            self.exhausted = true;
                            continue;
                        }
                    }
                    Err(_) => {
                        warn!(pages = self.pages, "timed out turning listing page");
                        self.exhausted = true;
                        continue;
                    }
                }
                if !page_load_wait.is_zero() {
                    tokio::time::sleep(page_load_wait).await;
                }
            }
            self.started = true;
            self.pages += 1;
            match tokio::time::timeout(step_timeout, source.current_page_references()).await {
                Ok(result) => self.buffer.extend(result?),
                Err(_) => warn!(page = self.pages, "timed out reading listing page"),
            }
        }
    }
}

/// The acquisition controller.
pub struct Harvester {
    pages: Box<dyn PageSource>,
    items: Box<dyn ItemExtractor>,
    feedback: Box<dyn FeedbackExtractor>,
    store: MirroredStore,
    policy: HarvestPolicy,
    progress: Box<dyn ProgressReporter>,
}

impl Harvester {
    pub fn new(
        pages: Box<dyn PageSource>,
        items: Box<dyn ItemExtractor>,
        feedback: Box<dyn FeedbackExtractor>,
        store: MirroredStore,
        policy: HarvestPolicy,
    ) -> Self {
        Self {
            pages,
            items,
            feedback,
            store,
            policy,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &MirroredStore {
        &self.store
    }

    pub fn policy(&self) -> &HarvestPolicy {
        &self.policy
    }

    /// Top the store up to `target_count` items with `feedback_per_item`
    /// feedback entries each.
    ///
    /// Returns the items written or augmented by this call. A shortfall
    /// (too few references, items skipped, feedback pages running out) is
    /// not an error. Storage failures and dual-store mismatches are.
    pub async fn acquire(
        &mut self,
        target_count: usize,
        feedback_per_item: usize,
    ) -> Result<Acquisition> {
        let mut stats = AcquireStats::default();

        let satisfied = self.store.satisfied_references(feedback_per_item).await?;
        stats.satisfied = satisfied.len();
        stats.deficit = target_count.saturating_sub(satisfied.len());
        if stats.deficit == 0 {
            info!(
                target_count,
                feedback_per_item,
                satisfied = stats.satisfied,
                "target already satisfied"
            );
            return Ok(Acquisition {
                items: Vec::new(),
                stats,
            });
        }
        stats.budget = self.policy.budget(stats.deficit);

        let mut known = self.store.known_identifiers().await?;
        let step_timeout = self.policy.navigation_timeout();
        let page_load_wait = self.policy.page_load_wait();

        let mut queue = CandidateQueue::new(ReferenceFilter::new(&satisfied));
        let mut pending: VecDeque<String> = VecDeque::new();
        while pending.len() < stats.budget {
            match queue
                .next(self.pages.as_mut(), step_timeout, page_load_wait)
                .await?
            {
                Some(reference) => pending.push_back(reference),
                None => break,
            }
        }
        self.progress.report(AcquireEvent::Discovering {
            pages: queue.pages,
            candidates: pending.len(),
        });
        info!(
            deficit = stats.deficit,
            budget = stats.budget,
            candidates = pending.len(),
            known = known.len(),
            "starting acquisition"
        );

        let mut produced: HashSet<String> = HashSet::new();
        let mut results: Vec<ItemRecord> = Vec::new();

        while let Some(reference) = pending.pop_front() {
            stats.candidates += 1;
            match self
                .harvest_one(&reference, feedback_per_item, &mut known, &mut produced)
                .await?
            {
                Outcome::Acquired { record, created } => {
                    if created {
                        stats.created += 1;
                    } else {
                        stats.augmented += 1;
                    }
                    stats.feedback_written += record.feedback.len();
                    self.progress.report(AcquireEvent::Harvesting {
                        identifier: record.item.identifier.clone(),
                        n: stats.candidates,
                        total: stats.candidates + pending.len(),
                    });
                    info!(
                        identifier = %record.item.identifier,
                        new_feedback = record.feedback.len(),
                        remaining = pending.len(),
                        "acquired item"
                    );
                    results.push(record);
                }
                Outcome::Skipped(reason) => {
                    stats.skipped += 1;
                    debug!(reference = %reference, %reason, "skipped candidate");
                    self.progress.report(AcquireEvent::Skipped {
                        reference: reference.clone(),
                        reason,
                    });
                }
            }

            while results.len() + pending.len() < stats.deficit {
                match queue
                    .next(self.pages.as_mut(), step_timeout, page_load_wait)
                    .await?
                {
                    Some(extra) => pending.push_back(extra),
                    None => break,
                }
            }
        }
        stats.pages = queue.pages;

        if results.len() < stats.deficit {
            info!(
                acquired = results.len(),
                deficit = stats.deficit,
                "listing exhausted before target was met"
            );
        }

        Ok(Acquisition {
            items: results,
            stats,
        })
    }

    async fn harvest_one(
        &mut self,
        reference: &str,
        feedback_per_item: usize,
        known: &mut HashSet<String>,
        produced: &mut HashSet<String>,
    ) -> Result<Outcome> {
        let step_timeout = self.policy.navigation_timeout();

        let extraction =
            match tokio::time::timeout(step_timeout, self.items.extract(reference)).await {
                Ok(result) => result?,
                Err(_) => Extraction::Skip(SkipReason::Timeout),
            };
        let mut item = match extraction {
            Extraction::Item(item) => item,
            Extraction::Skip(reason) => return Ok(Outcome::Skipped(reason)),
        };
        item.source_reference = reference.to_string();
        item.sanitize();

        // Rejected items never reach feedback extraction.
        if let Some(reason) = self.policy.screen(&item) {
            return Ok(Outcome::Skipped(reason));
        }
        if !produced.insert(item.identifier.clone()) {
            return Ok(Outcome::Skipped(SkipReason::Duplicate));
        }

        // Both sides must agree before the item counts as new or stored.
        let stored = match self.store.verify(&item.identifier).await? {
            Presence::Both => self.store.load_item(&item.identifier).await?,
            Presence::Neither => None,
        };
        let created = stored.is_none();
        let item = match stored {
            Some(stored) => {
                known.insert(item.identifier.clone());
                stored.item
            }
            None => item,
        };

        let known_authors = self.store.known_feedback_authors(&item.identifier).await?;
        let feedback = collect_feedback(
            self.feedback.as_mut(),
            &item.identifier,
            Some(reference),
            &known_authors,
            feedback_per_item,
            step_timeout,
        )
        .await?;

        if !created && feedback.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoNewFeedback));
        }

        let record = ItemRecord::new(item, feedback);
        self.store.save_item(&record, known).await?;

        if created {
            if let Some(uri) = record.item.cover_image_reference.as_deref() {
                if let Err(e) = self
                    .store
                    .save_cover_asset(uri, &record.item.identifier)
                    .await
                {
                    warn!(identifier = %record.item.identifier, error = %e, "cover asset not saved");
                }
            }
        }

        Ok(Outcome::Acquired { record, created })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarvestError;
    use crate::models::{FeedbackEntry, Item};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // ─── Scripted session ───────────────────────────────────────────

    #[derive(Default)]
    struct Script {
        pages: Vec<Vec<String>>,
        /// reference → item; absent references are "element not found".
        items: HashMap<String, Item>,
        /// identifier → feedback pages
        feedback: HashMap<String, Vec<Vec<FeedbackEntry>>>,
    }

    #[derive(Default)]
    struct Calls {
        listing_reads: usize,
        extracted: Vec<String>,
        feedback_for: Vec<String>,
    }

    struct Pages {
        script: Arc<Script>,
        calls: Arc<Mutex<Calls>>,
        cursor: usize,
    }

    #[async_trait]
    impl PageSource for Pages {
        async fn current_page_references(&mut self) -> Result<Vec<String>> {
            self.calls.lock().unwrap().listing_reads += 1;
            Ok(self.script.pages.get(self.cursor).cloned().unwrap_or_default())
        }

        async fn advance_page(&mut self) -> Result<bool> {
            if self.cursor + 1 < self.script.pages.len() {
                self.cursor += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    struct Items {
        script: Arc<Script>,
        calls: Arc<Mutex<Calls>>,
    }

    #[async_trait]
    impl ItemExtractor for Items {
        async fn extract(&mut self, reference: &str) -> Result<Extraction> {
            self.calls.lock().unwrap().extracted.push(reference.to_string());
            Ok(match self.script.items.get(reference) {
                Some(item) => {
                    let mut item = item.clone();
                    item.uuid = uuid::Uuid::new_v4();
                    Extraction::Item(item)
                }
                None => Extraction::Skip(SkipReason::ElementNotFound("product title".into())),
            })
        }
    }

    struct Reviews {
        script: Arc<Script>,
        calls: Arc<Mutex<Calls>>,
        current: Option<String>,
        page: usize,
    }

    #[async_trait]
    impl FeedbackExtractor for Reviews {
        async fn goto_first_page(&mut self, locator: Option<&str>) -> Result<()> {
            let locator = locator.ok_or_else(|| HarvestError::Config("no session".into()))?;
            let id = self
                .script
                .items
                .get(locator)
                .map(|i| i.identifier.clone())
                .unwrap_or_default();
            self.calls.lock().unwrap().feedback_for.push(id.clone());
            self.current = Some(id);
            self.page = 0;
            Ok(())
        }

        async fn extract_page(
            &mut self,
            _identifier: &str,
            exclude_authors: &HashSet<String>,
        ) -> Result<Vec<FeedbackEntry>> {
            let id = self.current.clone().unwrap_or_default();
            Ok(self
                .script
                .feedback
                .get(&id)
                .and_then(|pages| pages.get(self.page))
                .map(|page| {
                    page.iter()
                        .filter(|e| !exclude_authors.contains(&e.author))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn advance_page(&mut self) -> Result<bool> {
            let id = self.current.clone().unwrap_or_default();
            let total = self.script.feedback.get(&id).map(|p| p.len()).unwrap_or(0);
            if self.page + 1 < total {
                self.page += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    fn reference(name: &str) -> String {
        format!("https://shop.example/dp/{}", name)
    }

    /// Listing of `pages`, every reference resolving to an English item
    /// `isbn-<name>` with `reviews` feedback entries spread two per page.
    fn script(pages: &[&[&str]], reviews: usize) -> Script {
        let mut s = Script::default();
        for page in pages {
            let mut refs = Vec::new();
            for name in page.iter() {
                let r = reference(name);
                refs.push(format!("{}/ref=sr_1_1?qid=42", r));
                let id = format!("isbn-{}", name);
                let mut item = Item::new(&id, format!("Book {}", name), &r);
                item.language = Some("English".to_string());
                item.cover_image_reference = Some(format!("https://img.example/{}.jpg", name));
                s.items.insert(r, item);
                let entries: Vec<FeedbackEntry> = (0..reviews)
                    .map(|i| FeedbackEntry::new(format!("{}-reader-{}", name, i), "good", Some(4)))
                    .collect();
                s.feedback
                    .insert(id, entries.chunks(2).map(|c| c.to_vec()).collect());
            }
            s.pages.push(refs);
        }
        s
    }

    fn policy() -> HarvestPolicy {
        HarvestPolicy {
            page_load_wait_ms: 0,
            ..Default::default()
        }
    }

    fn harvester(
        script: &Arc<Script>,
        store: MirroredStore,
        policy: HarvestPolicy,
    ) -> (Harvester, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let h = Harvester::new(
            Box::new(Pages {
                script: script.clone(),
                calls: calls.clone(),
                cursor: 0,
            }),
            Box::new(Items {
                script: script.clone(),
                calls: calls.clone(),
            }),
            Box::new(Reviews {
                script: script.clone(),
                calls: calls.clone(),
                current: None,
                page: 0,
            }),
            store,
            policy,
        );
        (h, calls)
    }

    fn ids(acq: &Acquisition) -> Vec<String> {
        acq.items.iter().map(|r| r.item.identifier.clone()).collect()
    }

    // ─── Properties ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_order_preserved_across_pages() {
        let s = Arc::new(script(&[&["a", "b", "c", "d"], &["e", "f"]], 3));
        let store = Arc::new(InMemoryStore::new());
        let (mut h, _) = harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());

        let acq = h.acquire(5, 2).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-a", "isbn-b", "isbn-c", "isbn-d", "isbn-e"]);
        assert_eq!(acq.stats.created, 5);
        assert_eq!(acq.stats.pages, 2);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_skip_pulls_extra_reference() {
        let mut raw = script(&[&["a", "b", "c", "d"]], 2);
        raw.items.remove(&reference("b"));
        let s = Arc::new(raw);
        let (mut h, calls) = harvester(
            &s,
            MirroredStore::single(Box::new(InMemoryStore::new())),
            policy(),
        );

        let acq = h.acquire(3, 1).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-a", "isbn-c", "isbn-d"]);
        assert_eq!(acq.stats.skipped, 1);
        assert_eq!(calls.lock().unwrap().extracted.len(), 4);
    }

    #[tokio::test]
    async fn test_shortfall_is_not_an_error() {
        let s = Arc::new(script(&[&["a", "b"]], 1));
        let (mut h, _) = harvester(
            &s,
            MirroredStore::single(Box::new(InMemoryStore::new())),
            policy(),
        );
        let acq = h.acquire(10, 1).await.unwrap();
        assert_eq!(acq.items.len(), 2);
        assert_eq!(acq.stats.deficit, 10);
        assert_eq!(acq.stats.budget, 10);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let s = Arc::new(script(&[&["a", "b", "c"], &["d"]], 4));
        let store = Arc::new(InMemoryStore::new());

        let (mut first, _) = harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        assert_eq!(first.acquire(3, 2).await.unwrap().items.len(), 3);
        let satisfied_after_first = store.satisfied_references(2).await.unwrap();

        let (mut second, calls) =
            harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        let acq = second.acquire(3, 2).await.unwrap();
        assert!(acq.items.is_empty());
        assert_eq!(calls.lock().unwrap().listing_reads, 0);
        assert_eq!(store.satisfied_references(2).await.unwrap(), satisfied_after_first);
    }

    #[tokio::test]
    async fn test_top_up_preserves_identity_and_adds_new_authors_only() {
        let s = Arc::new(script(&[&["a", "b"]], 6));
        let store = Arc::new(InMemoryStore::new());

        let (mut first, _) = harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        let before = first.acquire(2, 1).await.unwrap();
        let uuids: Vec<_> = before.items.iter().map(|r| r.item.uuid).collect();

        let (mut second, _) =
            harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        let after = second.acquire(2, 4).await.unwrap();
        assert_eq!(ids(&after), vec!["isbn-a", "isbn-b"]);
        assert_eq!(after.stats.augmented, 2);
        assert_eq!(after.stats.created, 0);
        for (record, uuid) in after.items.iter().zip(uuids) {
            assert_eq!(record.item.uuid, uuid);
            assert_eq!(record.feedback.len(), 3);
            let stored = store.load_item(&record.item.identifier).await.unwrap().unwrap();
            assert_eq!(stored.item.uuid, uuid);
            assert_eq!(stored.feedback.len(), 4);
            let authors: HashSet<_> = stored.feedback.iter().map(|e| e.author.clone()).collect();
            assert_eq!(authors.len(), stored.feedback.len());
        }
    }

    #[tokio::test]
    async fn test_existing_item_example() {
        let s = Arc::new(script(&[&["101"]], 5));
        let store = Arc::new(InMemoryStore::new());
        let mut seeded = s.items[&reference("101")].clone();
        seeded.uuid = uuid::Uuid::new_v4();
        let original_uuid = seeded.uuid;
        store
            .save_item(
                &ItemRecord::new(seeded, vec![FeedbackEntry::new("101-reader-0", "ok", Some(3))]),
                &HashSet::new(),
            )
            .await
            .unwrap();

        let (mut h, calls) = harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        assert!(h.acquire(1, 1).await.unwrap().items.is_empty());
        assert!(calls.lock().unwrap().extracted.is_empty());

        let acq = h.acquire(1, 3).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-101"]);
        let record = &acq.items[0];
        assert_eq!(record.item.uuid, original_uuid);
        assert_eq!(record.feedback.len(), 2);
        assert!(record.feedback.iter().all(|e| e.author != "101-reader-0"));
        assert_eq!(store.feedback_count("isbn-101"), 3);
    }

    #[tokio::test]
    async fn test_banned_item_never_reaches_feedback() {
        let mut raw = script(&[&["a", "b", "c"]], 2);
        raw.items.get_mut(&reference("b")).unwrap().title = "Dungeons and Dragons Manual".into();
        let s = Arc::new(raw);
        let policy = HarvestPolicy {
            banned_titles: vec!["Dungeons and Dragons".to_string()],
            ..policy()
        };
        let (mut h, calls) = harvester(
            &s,
            MirroredStore::single(Box::new(InMemoryStore::new())),
            policy,
        );

        let acq = h.acquire(2, 1).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-a", "isbn-c"]);
        assert_eq!(calls.lock().unwrap().feedback_for, vec!["isbn-a", "isbn-c"]);
    }

    #[tokio::test]
    async fn test_wrong_language_is_skipped() {
        let mut raw = script(&[&["a", "b"]], 1);
        raw.items.get_mut(&reference("a")).unwrap().language = Some("German".into());
        let s = Arc::new(raw);
        let (mut h, _) = harvester(
            &s,
            MirroredStore::single(Box::new(InMemoryStore::new())),
            policy(),
        );
        let acq = h.acquire(2, 1).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-b"]);
        assert_eq!(acq.stats.skipped, 1);
    }

    #[tokio::test]
    async fn test_cover_saved_for_new_items() {
        let s = Arc::new(script(&[&["a"]], 1));
        let store = Arc::new(InMemoryStore::new());
        let (mut h, _) = harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        h.acquire(1, 1).await.unwrap();
        assert_eq!(
            store.cover_for("isbn-a").as_deref(),
            Some("https://img.example/a.jpg")
        );
    }

    #[tokio::test]
    async fn test_mirror_mismatch_halts_run() {
        let s = Arc::new(script(&[&["a"]], 3));
        let primary = Arc::new(InMemoryStore::named("local"));
        let mirror = Arc::new(InMemoryStore::named("sqlite"));
        let mut seeded = s.items[&reference("a")].clone();
        seeded.uuid = uuid::Uuid::new_v4();
        // Present on the read side only: a half-finished earlier write.
        mirror
            .save_item(&ItemRecord::new(seeded, vec![]), &HashSet::new())
            .await
            .unwrap();

        let store = MirroredStore::new(Box::new(primary.clone()), Some(Box::new(mirror.clone())));
        let (mut h, _) = harvester(&s, store, policy());
        let err = h.acquire(1, 2).await.unwrap_err();
        assert!(err.is_integrity());
        assert!(primary.is_empty());
    }

    #[tokio::test]
    async fn test_primary_only_record_halts_run() {
        let s = Arc::new(script(&[&["a"]], 3));
        let primary = Arc::new(InMemoryStore::named("local"));
        let mirror = Arc::new(InMemoryStore::named("sqlite"));
        let mut seeded = s.items[&reference("a")].clone();
        seeded.uuid = uuid::Uuid::new_v4();
        let original_uuid = seeded.uuid;
        // Present on the write-only side: the mirror write never landed.
        primary
            .save_item(&ItemRecord::new(seeded, vec![]), &HashSet::new())
            .await
            .unwrap();

        let store = MirroredStore::new(Box::new(primary.clone()), Some(Box::new(mirror.clone())));
        let (mut h, calls) = harvester(&s, store, policy());
        let err = h.acquire(1, 2).await.unwrap_err();
        assert!(err.is_integrity());
        assert!(mirror.is_empty());
        assert!(calls.lock().unwrap().feedback_for.is_empty());
        let kept = primary.load_item("isbn-a").await.unwrap().unwrap();
        assert_eq!(kept.item.uuid, original_uuid);
    }

    #[tokio::test]
    async fn test_stored_item_without_new_feedback_is_not_returned() {
        let s = Arc::new(script(&[&["a"]], 1));
        let store = Arc::new(InMemoryStore::new());
        let (mut h, _) = harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
        assert_eq!(h.acquire(1, 1).await.unwrap().stats.created, 1);

        for _ in 0..2 {
            let (mut again, calls) =
                harvester(&s, MirroredStore::single(Box::new(store.clone())), policy());
            let acq = again.acquire(1, 3).await.unwrap();
            assert!(acq.items.is_empty());
            assert_eq!(acq.stats.augmented, 0);
            assert_eq!(acq.stats.skipped, 1);
            assert_eq!(acq.stats.feedback_written, 0);
            assert_eq!(calls.lock().unwrap().feedback_for, vec!["isbn-a"]);
        }
        assert_eq!(store.feedback_count("isbn-a"), 1);
    }

    // ─── Timeouts ───────────────────────────────────────────────────

    const STALL: Duration = Duration::from_secs(3600);

    /// Item extractor that never answers for the given references.
    struct StallingItems {
        inner: Items,
        stall: HashSet<String>,
    }

    #[async_trait]
    impl ItemExtractor for StallingItems {
        async fn extract(&mut self, reference: &str) -> Result<Extraction> {
            if self.stall.contains(reference) {
                tokio::time::sleep(STALL).await;
            }
            self.inner.extract(reference).await
        }
    }

    /// Listing whose page turn never completes.
    struct StallingPages(Pages);

    #[async_trait]
    impl PageSource for StallingPages {
        async fn current_page_references(&mut self) -> Result<Vec<String>> {
            self.0.current_page_references().await
        }

        async fn advance_page(&mut self) -> Result<bool> {
            tokio::time::sleep(STALL).await;
            self.0.advance_page().await
        }
    }

    fn reviews(script: &Arc<Script>, calls: &Arc<Mutex<Calls>>) -> Box<Reviews> {
        Box::new(Reviews {
            script: script.clone(),
            calls: calls.clone(),
            current: None,
            page: 0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timeout_is_a_skip() {
        let s = Arc::new(script(&[&["a", "b", "c"]], 2));
        let calls = Arc::new(Mutex::new(Calls::default()));
        let store = Arc::new(InMemoryStore::new());
        let mut h = Harvester::new(
            Box::new(Pages {
                script: s.clone(),
                calls: calls.clone(),
                cursor: 0,
            }),
            Box::new(StallingItems {
                inner: Items {
                    script: s.clone(),
                    calls: calls.clone(),
                },
                stall: HashSet::from([reference("b")]),
            }),
            reviews(&s, &calls),
            MirroredStore::single(Box::new(store.clone())),
            policy(),
        );

        let acq = h.acquire(2, 1).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-a", "isbn-c"]);
        assert_eq!(acq.stats.skipped, 1);
        assert_eq!(
            calls.lock().unwrap().extracted,
            vec![reference("a"), reference("c")]
        );
        assert!(store.load_item("isbn-b").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_timeout_ends_pagination() {
        let s = Arc::new(script(&[&["a"], &["b"]], 1));
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut h = Harvester::new(
            Box::new(StallingPages(Pages {
                script: s.clone(),
                calls: calls.clone(),
                cursor: 0,
            })),
            Box::new(Items {
                script: s.clone(),
                calls: calls.clone(),
            }),
            reviews(&s, &calls),
            MirroredStore::single(Box::new(InMemoryStore::new())),
            policy(),
        );

        let acq = h.acquire(2, 1).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-a"]);
        assert_eq!(acq.stats.pages, 1);
        assert_eq!(calls.lock().unwrap().listing_reads, 1);
    }

    struct FailingStore;

    #[async_trait]
    impl ItemStore for FailingStore {
        fn backend_name(&self) -> &str {
            "failing"
        }
        async fn save_item(&self, _r: &ItemRecord, _k: &HashSet<String>) -> Result<()> {
            Err(HarvestError::storage("failing", anyhow::anyhow!("disk full")))
        }
        async fn save_cover_asset(&self, _uri: &str, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn satisfied_references(&self, _t: usize) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn known_identifiers(&self) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn known_feedback_authors(&self, _id: &str) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn load_item(&self, _id: &str) -> Result<Option<ItemRecord>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_critical_write_failure_propagates() {
        let s = Arc::new(script(&[&["a", "b"]], 1));
        let (mut h, _) = harvester(&s, MirroredStore::single(Box::new(FailingStore)), policy());
        let err = h.acquire(2, 1).await.unwrap_err();
        assert!(matches!(err, HarvestError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_listing_entries_extracted_once() {
        let mut raw = script(&[&["a", "b"]], 1);
        let dup = raw.pages[0][0].replace("sr_1_1", "sr_9_9");
        raw.pages[0].insert(1, dup);
        let s = Arc::new(raw);
        let (mut h, calls) = harvester(
            &s,
            MirroredStore::single(Box::new(InMemoryStore::new())),
            policy(),
        );
        let acq = h.acquire(5, 1).await.unwrap();
        assert_eq!(ids(&acq), vec!["isbn-a", "isbn-b"]);
        assert_eq!(calls.lock().unwrap().extracted.len(), 2);
    }
}
