use std::time::Duration;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use anyhow::Result;
use tracing::{info, warn, error};

use crate::database::repo::{InsertPolicy, Store};
use crate::ingest::fetcher::Fetch;
use crate::ingest::parser::ListingParser;
use crate::registry::galleries::{Gallery, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub inserted: usize,
}

/// Walks every registered gallery once per cycle: fetch, parse, store.
/// Owns the only writing connection; readers see its work through the store.
pub struct Collector<F: Fetch> {
    registry: Registry,
    fetcher: F,
    parser: ListingParser,
    store: Store,
    policy: InsertPolicy,
    state: CollectorState,
}

impl<F: Fetch> Collector<F> {
    pub fn new(registry: Registry, fetcher: F, parser: ListingParser, store: Store, policy: InsertPolicy) -> Self {
        Self {
            registry,
            fetcher,
            parser,
            store,
            policy,
            state: CollectorState::Idle,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// One pass over the registry in order. Per-gallery failures are logged
    /// and counted, never propagated.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.transition(CollectorState::Collecting);
        let mut report = CycleReport::default();

        // Cloned so collect_gallery can borrow self mutably while we iterate.
        let galleries: Vec<Gallery> = self.registry.iter().cloned().collect();
        for gallery in &galleries {
            report.attempted += 1;
            match self.collect_gallery(gallery) {
                Ok(inserted) => {
                    report.succeeded += 1;
                    report.inserted += inserted;
                    info!("Gallery {} ({}): stored {} posts", gallery.id, gallery.name, inserted);
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Gallery {} ({}) failed this cycle: {:#}", gallery.id, gallery.name, e);
                }
            }
        }

        info!(
            "Cycle finished: {}/{} galleries ok, {} posts stored",
            report.succeeded, report.attempted, report.inserted
        );
        self.transition(CollectorState::Idle);
        report
    }

    fn collect_gallery(&mut self, gallery: &Gallery) -> Result<usize> {
        let markup = self.fetcher.fetch(&gallery.url)?;
        let posts = self.parser.parse(gallery.id, &markup);
        // An empty page is not an error; the site may be in maintenance.
        if posts.is_empty() {
            warn!("Gallery {} ({}): listing yielded no posts", gallery.id, gallery.name);
        }
        self.store.insert_posts(&posts, self.policy)
    }

    /// Runs cycles until `shutdown` receives a message or disconnects.
    /// The first cycle starts immediately. Returns the number of completed cycles.
    pub fn run(mut self, interval: Duration, shutdown: Receiver<()>) -> usize {
        let mut cycles = 0;
        loop {
            self.run_cycle();
            cycles += 1;

            // The inter-cycle sleep doubles as the shutdown wait.
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("Collector stopping after {} cycles", cycles);
                    return cycles;
                }
            }
        }
    }

    fn transition(&mut self, next: CollectorState) {
        info!("Collector {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    #[cfg(test)]
    fn store(&self) -> &Store {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::thread;
    use crossbeam::channel::bounded;
    use crate::ingest::fetcher::TransportError;
    use crate::ingest::parser::DEFAULT_ORIGIN;

    struct FixtureFetcher {
        pages: HashMap<String, String>,
    }

    impl Fetch for FixtureFetcher {
        fn fetch(&self, url: &str) -> Result<String, TransportError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError::Status { url: url.to_string(), status: 404 })
        }
    }

    /// Answers 503 the first time each url in `flaky` is requested.
    struct FlakyFetcher {
        inner: FixtureFetcher,
        flaky: RefCell<HashSet<String>>,
    }

    impl Fetch for FlakyFetcher {
        fn fetch(&self, url: &str) -> Result<String, TransportError> {
            if self.flaky.borrow_mut().remove(url) {
                return Err(TransportError::Status { url: url.to_string(), status: 503 });
            }
            self.inner.fetch(url)
        }
    }

    fn listing(links: &[&str]) -> String {
        let rows: Vec<String> = links
            .iter()
            .map(|link| {
                format!(
                    r#"<tr class="ub-content"><td class="gall_num">1</td>
                       <td class="gall_tit"><a href="{}">post</a></td>
                       <td class="gall_count">4</td></tr>"#,
                    link
                )
            })
            .collect();
        format!("<table><tbody>{}</tbody></table>", rows.concat())
    }

    fn gallery(id: i64, url: &str) -> Gallery {
        Gallery { id, name: format!("g{}", id), url: url.to_string() }
    }

    fn collector(policy: InsertPolicy) -> Result<Collector<FixtureFetcher>> {
        let registry = Registry::new(vec![
            gallery(1, "https://site/a"),
            gallery(2, "https://site/missing"),
            gallery(3, "https://site/c"),
        ])?;
        let mut pages = HashMap::new();
        pages.insert("https://site/a".to_string(), listing(&["/a/1", "/a/2"]));
        pages.insert("https://site/c".to_string(), listing(&["/c/1"]));

        Ok(Collector::new(
            registry,
            FixtureFetcher { pages },
            ListingParser::new(DEFAULT_ORIGIN)?,
            Store::open_in_memory()?,
            policy,
        ))
    }

    #[test]
    fn test_failed_gallery_does_not_abort_cycle() -> Result<()> {
        let mut collector = collector(InsertPolicy::Append)?;
        let report = collector.run_cycle();

        assert_eq!(report, CycleReport { attempted: 3, succeeded: 2, failed: 1, inserted: 3 });
        assert_eq!(collector.state(), CollectorState::Idle);

        let posts = collector.store().all_posts()?;
        let ids: Vec<_> = posts.iter().map(|p| p.gallery_id).collect();
        assert_eq!(ids, vec![1, 1, 3]);
        Ok(())
    }

    #[test]
    fn test_post_count_matches_stored_rows_per_gallery() -> Result<()> {
        let mut collector = collector(InsertPolicy::Append)?;
        collector.run_cycle();
        collector.run_cycle();

        let posts = collector.store().all_posts()?;
        assert_eq!(posts.iter().filter(|p| p.gallery_id == 1).count(), 4);
        assert_eq!(posts.iter().filter(|p| p.gallery_id == 3).count(), 2);
        Ok(())
    }

    #[test]
    fn test_skip_existing_prevents_duplicate_growth() -> Result<()> {
        let mut collector = collector(InsertPolicy::SkipExisting)?;
        collector.run_cycle();
        let second = collector.run_cycle();

        assert_eq!(second.inserted, 0);
        assert_eq!(collector.store().all_posts()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_cycle_feeds_scoring() -> Result<()> {
        let mut collector = collector(InsertPolicy::Append)?;
        collector.run_cycle();

        let posts = collector.store().all_posts()?;
        let ranking = crate::scoring::engine::score(&posts, collector.registry.as_slice());
        let ids: Vec<_> = ranking.iter().map(|r| r.gallery_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(ranking[0].post_count, 2);
        assert_eq!(ranking[0].total_score, 200.0);
        Ok(())
    }

    #[test]
    fn test_late_gallery_keeps_registry_tie_order() -> Result<()> {
        let registry = Registry::new(vec![gallery(1, "https://site/a"), gallery(2, "https://site/b")])?;
        let mut pages = HashMap::new();
        pages.insert("https://site/a".to_string(), listing(&["/a/1"]));
        pages.insert("https://site/b".to_string(), listing(&["/b/1"]));
        let fetcher = FlakyFetcher {
            inner: FixtureFetcher { pages },
            flaky: RefCell::new(HashSet::from(["https://site/a".to_string()])),
        };
        let mut collector = Collector::new(
            registry,
            fetcher,
            ListingParser::new(DEFAULT_ORIGIN)?,
            Store::open_in_memory()?,
            InsertPolicy::SkipExisting,
        );

        let first = collector.run_cycle();
        assert_eq!((first.succeeded, first.failed), (1, 1));
        collector.run_cycle();

        let posts = collector.store().all_posts()?;
        assert_eq!(posts.iter().map(|p| p.gallery_id).collect::<Vec<_>>(), vec![2, 1]);

        let ranking = crate::scoring::engine::score(&posts, collector.registry.as_slice());
        let order: Vec<_> = ranking.iter().map(|r| (r.gallery_id, r.total_score)).collect();
        assert_eq!(order, vec![(1, 0.0), (2, 0.0)]);
        Ok(())
    }

    #[test]
    fn test_run_stops_on_shutdown_signal() -> Result<()> {
        let collector = collector(InsertPolicy::Append)?;
        let (tx, rx) = bounded::<()>(1);

        let handle = thread::spawn(move || collector.run(Duration::from_millis(10), rx));
        thread::sleep(Duration::from_millis(50));
        tx.send(())?;

        let cycles = handle.join().expect("collector thread panicked");
        assert!(cycles >= 1);
        Ok(())
    }

    #[test]
    fn test_run_stops_when_sender_dropped() -> Result<()> {
        let collector = collector(InsertPolicy::Append)?;
        let (tx, rx) = bounded::<()>(1);
        drop(tx);

        assert_eq!(collector.run(Duration::from_secs(3600), rx), 1);
        Ok(())
    }
}
