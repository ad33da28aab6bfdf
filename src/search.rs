//! Multi-threaded nonce search over independent sessions.
//!
//! Every worker creates its own [`Session`] from the shared provider, so no
//! engine state is shared between threads. Workers take nonces from one
//! [`NonceSource`], write them into a copy of the template and report hits to
//! the calling thread over a bounded channel.
use crate::engine::EngineProvider;
use crate::error::Error;
use crate::session::Session;
use crate::stream::{NonceSource, StopFlag};
use crate::types::{HeaderAndNonce, MinimalSolution};
use derive_builder::Builder;
use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn, Span};

/// Serializable search configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub threads: usize,
    pub target_solutions: usize,
    pub start_nonce: u64,
    pub nonce_limit: Option<u64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            threads: 1,
            target_solutions: 1,
            start_nonce: 0,
            nonce_limit: None,
        }
    }
}

impl SearchSettings {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Validated search with fresh progress and stop handles.
    pub fn into_search(self) -> Result<ParallelSearch, Error> {
        let mut builder = ParallelSearchBuilder::default()
            .threads(self.threads)
            .target_solutions(self.target_solutions)
            .start_nonce(self.start_nonce);
        if let Some(limit) = self.nonce_limit {
            builder = builder.nonce_limit(limit);
        }
        builder.build_validated()
    }
}

#[derive(Builder, Debug)]
#[builder(pattern = "owned")]
pub struct ParallelSearch {
    #[builder(default = "1")]
    pub threads: usize,
    /// Distinct hits to collect before stopping.
    #[builder(default = "1")]
    pub target_solutions: usize,
    #[builder(default)]
    pub start_nonce: u64,
    /// Stop after this many nonces even if the target was not reached.
    #[builder(setter(strip_option), default)]
    pub nonce_limit: Option<u64>,
    /// Number of hits collected so far.
    #[builder(default = "Arc::new(AtomicU64::new(0))")]
    pub progress: Arc<AtomicU64>,
    /// Raised by the caller to cancel the search. Workers notice it between
    /// `find_solutions` calls.
    #[builder(default = "Arc::new(StopFlag::new())")]
    pub stop: Arc<StopFlag>,
}

impl ParallelSearch {
    fn validate(&self) -> Result<(), Error> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be >= 1".into()));
        }
        if self.target_solutions == 0 {
            return Err(Error::InvalidConfig("target_solutions must be >= 1".into()));
        }
        if self.nonce_limit == Some(0) {
            return Err(Error::InvalidConfig("nonce_limit must be >= 1".into()));
        }
        Ok(())
    }

    /// Handle for cancelling from another thread.
    pub fn stop_handle(&self) -> Arc<StopFlag> {
        self.stop.clone()
    }

    /// Search nonces from `start_nonce` on, using one session per worker.
    pub fn run<P>(&self, provider: &P, template: &HeaderAndNonce) -> Result<SearchReport, Error>
    where
        P: EngineProvider + Sync,
    {
        self.validate()?;
        let started = Instant::now();
        let nonces = match self.nonce_limit {
            Some(limit) => NonceSource::bounded(self.start_nonce, limit),
            None => NonceSource::new(self.start_nonce),
        };
        let done = StopFlag::new();
        let tried = AtomicU64::new(0);
        let (tx, rx) = flume::bounded::<HitResult>(self.threads * 2);

        // Worker events nest under the caller's span.
        let span = Span::current();
        let (collected, panicked) = thread::scope(|scope| {
            let mut joins = Vec::with_capacity(self.threads);
            for worker in 0..self.threads {
                let ctx = Worker {
                    id: worker,
                    provider,
                    template: *template,
                    nonces: &nonces,
                    done: &done,
                    cancel: &self.stop,
                    tried: &tried,
                    span: span.clone(),
                };
                let worker_tx = tx.clone();
                joins.push(scope.spawn(move || ctx.run(worker_tx)));
            }
            drop(tx);

            let collected = self.collect(&rx, &done);
            done.force_stop();
            // Unblocks workers waiting on a full channel.
            drop(rx);
            let panicked = joins
                .into_iter()
                .map(|handle| handle.join().is_err())
                .filter(|&failed| failed)
                .count();
            (collected, panicked)
        });

        let mut hits = collected?;
        if panicked > 0 && hits.len() < self.target_solutions {
            warn!(panicked, "search workers exited without reporting");
            return Err(Error::ChannelClosed);
        }
        hits.sort_by(|a, b| {
            a.nonce
                .cmp(&b.nonce)
                .then_with(|| a.solution.cmp(&b.solution))
        });
        hits.truncate(self.target_solutions);
        let report = SearchReport {
            cancelled: hits.len() < self.target_solutions && self.stop.should_stop(),
            nonces_tried: tried.load(Ordering::SeqCst),
            hits,
        };
        info!(
            hits = report.hits.len(),
            nonces_tried = report.nonces_tried,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(report)
    }

    fn collect(&self, rx: &Receiver<HitResult>, done: &StopFlag) -> Result<Vec<Hit>, Error> {
        let target = self.target_solutions;
        let mut hits = Vec::with_capacity(target);
        let mut seen = HashSet::with_capacity(target * 2);
        while hits.len() < target {
            match rx.recv() {
                Ok(Ok(hit)) => {
                    if !seen.insert((hit.nonce, hit.solution)) {
                        continue;
                    }
                    hits.push(hit);
                    self.progress.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Err(err)) => {
                    done.force_stop();
                    return Err(err);
                }
                // Every worker exited: nonces ran out or the search was cancelled.
                Err(_) => break,
            }
        }
        Ok(hits)
    }
}

impl ParallelSearchBuilder {
    pub fn build_validated(self) -> Result<ParallelSearch, Error> {
        let search = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        search.validate()?;
        Ok(search)
    }
}

/// One solution and the nonce it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub nonce: u64,
    pub input: HeaderAndNonce,
    pub solution: MinimalSolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Sorted by nonce, then by solution bytes.
    pub hits: Vec<Hit>,
    /// Nonces whose `find_solutions` call completed.
    pub nonces_tried: u64,
    /// The caller's stop flag ended the search before the target was reached.
    pub cancelled: bool,
}

type HitResult = Result<Hit, Error>;

struct Worker<'a, P> {
    id: usize,
    provider: &'a P,
    template: HeaderAndNonce,
    nonces: &'a NonceSource,
    done: &'a StopFlag,
    cancel: &'a StopFlag,
    tried: &'a AtomicU64,
    span: Span,
}

impl<P: EngineProvider> Worker<'_, P> {
    fn run(self, tx: Sender<HitResult>) {
        let _enter = self.span.enter();
        let mut session = match Session::create(self.provider) {
            Ok(session) => session,
            Err(err) => {
                let _ = tx.send(Err(err));
                self.done.force_stop();
                return;
            }
        };
        debug!(worker = self.id, session = %session.id(), "search worker started");

        while !self.done.should_stop() && !self.cancel.should_stop() {
            let Some(nonce) = self.nonces.fetch() else {
                break;
            };
            let input = self.template.with_simple_nonce(nonce);
            match session.find_solutions(&input) {
                Ok(solutions) => {
                    self.tried.fetch_add(1, Ordering::SeqCst);
                    for solution in solutions {
                        let hit = Hit {
                            nonce,
                            input,
                            solution,
                        };
                        if tx.send(Ok(hit)).is_err() {
                            self.done.force_stop();
                            return;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                    self.done.force_stop();
                    return;
                }
            }
        }
        debug!(worker = self.id, "search worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::error::EngineFailure;
    use crate::types::HEADER_AND_NONCE_LEN;
    use tracing_test::traced_test;

    fn nonce_of(input: &HeaderAndNonce) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&input.as_bytes()[HEADER_AND_NONCE_LEN - 8..]);
        u64::from_le_bytes(raw)
    }

    /// Finds one "solution" at every third nonce, filled with the nonce byte.
    #[derive(Clone, Default)]
    struct EveryThird {
        fail_at: Option<u64>,
        panic_at: Option<u64>,
        /// Raised once this nonce is reached, as a caller would.
        cancel_at: Option<(u64, Arc<StopFlag>)>,
    }

    impl Engine for EveryThird {
        fn find_solutions(
            &mut self,
            input: &HeaderAndNonce,
            _max_solutions: usize,
        ) -> Result<Vec<MinimalSolution>, EngineFailure> {
            let nonce = nonce_of(input);
            if self.fail_at == Some(nonce) {
                return Err(EngineFailure::new("table corrupted"));
            }
            if self.panic_at == Some(nonce) {
                panic!("worker crashed at nonce {nonce}");
            }
            if let Some((at, stop)) = &self.cancel_at {
                if nonce >= *at {
                    stop.force_stop();
                }
                return Ok(Vec::new());
            }
            if nonce % 3 == 0 {
                Ok(vec![MinimalSolution::from([nonce as u8; 1344])])
            } else {
                Ok(Vec::new())
            }
        }

        fn validate_solution(
            &mut self,
            _input: &HeaderAndNonce,
            _solution: &MinimalSolution,
        ) -> Result<bool, EngineFailure> {
            Ok(true)
        }
    }

    impl EngineProvider for EveryThird {
        type Engine = EveryThird;

        fn create_engine(&self) -> Result<EveryThird, Error> {
            Ok(self.clone())
        }
    }

    struct Unavailable;

    impl EngineProvider for Unavailable {
        type Engine = EveryThird;

        fn create_engine(&self) -> Result<EveryThird, Error> {
            Err(Error::Allocation("no scratch memory".into()))
        }
    }

    fn template() -> HeaderAndNonce {
        HeaderAndNonce::filled(0xee)
    }

    #[test]
    fn single_thread_is_deterministic() {
        let search = ParallelSearchBuilder::default()
            .target_solutions(3)
            .build_validated()
            .expect("search");
        let provider = EveryThird::default();
        let report = search.run(&provider, &template()).expect("run");
        let nonces: Vec<u64> = report.hits.iter().map(|h| h.nonce).collect();
        assert_eq!(nonces, vec![0, 3, 6]);
        assert!(report.nonces_tried >= 7);
        assert!(!report.cancelled);
        assert_eq!(search.progress.load(Ordering::SeqCst), 3);
        for hit in &report.hits {
            assert_eq!(hit.input, template().with_simple_nonce(hit.nonce));
        }
    }

    #[test]
    fn many_threads_reach_target() {
        let search = ParallelSearchBuilder::default()
            .threads(4)
            .target_solutions(5)
            .start_nonce(30)
            .build_validated()
            .expect("search");
        let provider = EveryThird::default();
        let report = search.run(&provider, &template()).expect("run");
        assert_eq!(report.hits.len(), 5);
        assert!(report.hits.windows(2).all(|w| w[0].nonce < w[1].nonce));
        assert!(report.hits[0].nonce >= 30);
        assert!(report.hits.iter().all(|h| h.nonce % 3 == 0));
        assert!(report.nonces_tried >= 5);
    }

    #[test]
    fn nonce_limit_ends_search() {
        let search = ParallelSearchBuilder::default()
            .threads(2)
            .target_solutions(100)
            .nonce_limit(5)
            .build_validated()
            .expect("search");
        let provider = EveryThird::default();
        let report = search.run(&provider, &template()).expect("run");
        let nonces: Vec<u64> = report.hits.iter().map(|h| h.nonce).collect();
        assert_eq!(nonces, vec![0, 3]);
        assert_eq!(report.nonces_tried, 5);
        assert!(!report.cancelled);
    }

    #[test]
    fn stop_before_run_does_nothing() {
        let search = ParallelSearchBuilder::default()
            .threads(3)
            .build_validated()
            .expect("search");
        search.stop_handle().force_stop();
        let provider = EveryThird::default();
        let report = search.run(&provider, &template()).expect("run");
        assert!(report.hits.is_empty());
        assert_eq!(report.nonces_tried, 0);
        assert!(report.cancelled);
    }

    #[test]
    fn stop_during_run_cancels() {
        let search = ParallelSearchBuilder::default()
            .threads(2)
            .build_validated()
            .expect("search");
        let provider = EveryThird {
            cancel_at: Some((50, search.stop_handle())),
            ..EveryThird::default()
        };
        let report = search.run(&provider, &template()).expect("run");
        assert!(report.cancelled);
        assert!(report.hits.is_empty());
        assert!(report.nonces_tried >= 51);
    }

    #[test]
    fn engine_failure_stops_search() {
        let search = ParallelSearchBuilder::default()
            .threads(2)
            .target_solutions(1000)
            .build_validated()
            .expect("search");
        let provider = EveryThird {
            fail_at: Some(8),
            ..EveryThird::default()
        };
        let err = search
            .run(&provider, &template())
            .expect_err("engine fails");
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn vanished_worker_is_reported() {
        let search = ParallelSearchBuilder::default()
            .target_solutions(5)
            .build_validated()
            .expect("search");
        let provider = EveryThird {
            panic_at: Some(4),
            ..EveryThird::default()
        };
        let err = search.run(&provider, &template()).expect_err("worker gone");
        assert_eq!(err, Error::ChannelClosed);
    }

    #[test]
    fn provider_failure_is_returned() {
        let search = ParallelSearchBuilder::default()
            .threads(2)
            .build_validated()
            .expect("search");
        let err = search
            .run(&Unavailable, &template())
            .expect_err("no engine");
        assert!(matches!(err, Error::Allocation(_)));
    }

    #[test]
    fn builder_rejects_zero_values() {
        for builder in [
            ParallelSearchBuilder::default().threads(0),
            ParallelSearchBuilder::default().target_solutions(0),
            ParallelSearchBuilder::default().nonce_limit(0),
        ] {
            let err = builder.build_validated().expect_err("invalid");
            assert!(matches!(err, Error::InvalidConfig(_)));
        }
    }

    #[test]
    fn settings_load_from_json() {
        let json = r#"{"threads": 2, "target_solutions": 4, "nonce_limit": 64}"#;
        let settings = SearchSettings::from_json_str(json).expect("parse");
        assert_eq!(settings.start_nonce, 0);
        let search = settings.into_search().expect("valid");
        assert_eq!(search.threads, 2);
        assert_eq!(search.target_solutions, 4);
        assert_eq!(search.nonce_limit, Some(64));

        let err = SearchSettings::from_json_str(r#"{"threads": "many"}"#).expect_err("bad type");
        assert!(matches!(err, Error::InvalidConfig(_)));
        let err = SearchSettings::from_json_str(r#"{"threads": 0}"#)
            .and_then(SearchSettings::into_search)
            .expect_err("zero threads");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    #[traced_test]
    fn worker_events_reach_caller_span() {
        let search = ParallelSearchBuilder::default()
            .threads(2)
            .build_validated()
            .expect("search");
        let provider = EveryThird::default();
        search.run(&provider, &template()).expect("run");
        assert!(logs_contain("search finished"));
        assert!(logs_contain("search worker started"));
        assert!(logs_contain("worker=0"));
        assert!(logs_contain("worker=1"));
    }
}
