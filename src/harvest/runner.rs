use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::adapter::RenderAdapter;
use crate::harvest::accumulator::Accumulator;
use crate::harvest::parser::CardParser;
use crate::harvest::record::ParsedRecord;
use crate::harvest::retry::{with_retry, RetryPolicy};
use crate::harvest::segment::SegmentDiscoverer;
use crate::harvest::slots::scan_from;
use crate::harvest::state::{should_stop, Checkpoint, HarvestState};
use crate::harvest::view::{LocatorScheme, RenderView};

/// Why a harvest run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    LimitReached,
    Exhausted,
    Aborted,
}

/// Everything one harvest run is allowed to vary, validated once at the job
/// boundary and immutable from then on.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Maximum records to accept. 0 means unbounded.
    pub limit: usize,

    /// Consecutive cycles without a newly-accepted record before the feed
    /// is declared exhausted. Must be at least 1.
    pub max_dead_cycles: u32,

    /// Consecutive absent slot indices tolerated before a segment scan ends.
    pub gap_tolerance: u32,

    /// Scroll distance requested per cycle.
    pub scroll_pixels: i64,

    /// Settle delay range (min, max) in milliseconds after each scroll.
    pub settle_ms: (u64, u64),

    /// Retry policy applied at the adapter boundary.
    pub retry: RetryPolicy,

    /// State to resume from, if continuing an earlier run.
    pub resume_from: Option<Checkpoint>,

    /// Where to persist a checkpoint after each cycle. None disables it.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for HarvestRequest {
    fn default() -> Self {
        Self {
            limit: 0,
            max_dead_cycles: 2,
            gap_tolerance: 2,
            scroll_pixels: 1800,
            settle_ms: (1200, 2400),
            retry: RetryPolicy::default(),
            resume_from: None,
            checkpoint_path: None,
        }
    }
}

impl HarvestRequest {
    /// Validate the request, returning it unchanged when well-formed.
    pub fn validated(self) -> Result<Self> {
        if self.max_dead_cycles == 0 {
            bail!("max_dead_cycles must be at least 1");
        }
        if self.scroll_pixels <= 0 {
            bail!("scroll_pixels must be positive");
        }
        if self.settle_ms.0 > self.settle_ms.1 {
            bail!(
                "settle_ms range is inverted: {} > {}",
                self.settle_ms.0,
                self.settle_ms.1
            );
        }
        Ok(self)
    }
}

/// Final output of one harvest run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    /// Accepted records in acceptance order, pairwise-distinct identities.
    pub records: Vec<ParsedRecord>,
    pub reason: CompletionReason,
    /// Failure description when `reason` is `Aborted`.
    pub failure: Option<String>,
    pub cycles: u64,
    pub parse_failures: u64,
    pub finished_at: DateTime<Utc>,
}

/// Drives one harvest run over one render adapter.
///
/// The run is single-threaded cooperative: scroll, discover, count and
/// parse are strictly sequential against the one surface the adapter owns.
/// Cancellation is checked at the top of each cycle, never mid-parse.
pub struct Harvester<A: RenderAdapter> {
    adapter: A,
    scheme: LocatorScheme,
    parser: CardParser,
    discoverer: SegmentDiscoverer,
    request: HarvestRequest,
    cancel: Option<watch::Receiver<bool>>,
}

impl<A: RenderAdapter> Harvester<A> {
    pub fn new(adapter: A, scheme: LocatorScheme, parser: CardParser, request: HarvestRequest) -> Self {
        Self {
            adapter,
            scheme,
            parser,
            discoverer: SegmentDiscoverer::default(),
            request,
            cancel: None,
        }
    }

    /// Attach a cooperative cancellation signal.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, |rx| *rx.borrow())
    }

    /// Run the harvest to completion.
    ///
    /// Never discards accumulated records: an aborted run returns whatever
    /// was accepted before the failure, with `reason = Aborted`.
    pub async fn run(mut self) -> HarvestResult {
        let mut state = HarvestState::default();
        let mut accumulator = Accumulator::new(self.request.limit);
        let mut parse_failures: u64 = 0;

        if let Some(checkpoint) = self.request.resume_from.take() {
            accumulator.preload(checkpoint.seen_keys.iter().cloned(), checkpoint.total);
            state.restore(&checkpoint);
        }

        // A resumed checkpoint may already satisfy the limit.
        if accumulator.is_full() {
            info!("Resumed checkpoint already satisfies the limit");
            return self.finish(state, accumulator, parse_failures, CompletionReason::LimitReached, None);
        }

        loop {
            if self.cancelled() {
                info!("Cancellation requested, stopping before next cycle");
                self.write_checkpoint(&mut state, &accumulator);
                return self.finish(
                    state,
                    accumulator,
                    parse_failures,
                    CompletionReason::Aborted,
                    Some("cancelled".to_string()),
                );
            }

            state.cycles += 1;
            debug!("Harvest cycle {} starting", state.cycles);

            // (a) request more content
            let scroll = with_retry(
                || self.adapter.scroll(self.request.scroll_pixels),
                self.request.retry,
            )
            .await;
            if let Err(e) = scroll {
                warn!("Scroll failed after retries: {}", e);
                self.write_checkpoint(&mut state, &accumulator);
                return self.finish(
                    state,
                    accumulator,
                    parse_failures,
                    CompletionReason::Aborted,
                    Some(e.to_string()),
                );
            }

            // (b) allow asynchronous rendering to settle
            self.settle().await;

            // (c) one logical snapshot feeds discovery and counting alike
            let view = RenderView::new(&self.adapter, &self.scheme);
            let segments = match self.discoverer.discover(&view).await {
                Ok(segments) => segments,
                Err(e) => {
                    warn!("Segment discovery failed: {}", e);
                    self.write_checkpoint(&mut state, &accumulator);
                    return self.finish(
                        state,
                        accumulator,
                        parse_failures,
                        CompletionReason::Aborted,
                        Some(e.to_string()),
                    );
                }
            };
            state.note_segments(&segments);

            // (d)-(e) scan each segment past its watermark, parse new slots
            let mut batch: Vec<ParsedRecord> = Vec::new();
            for segment in &segments {
                if accumulator.is_full() {
                    break;
                }

                let start = state.scan_start(segment.id());
                let scan = match scan_from(&view, segment, start, self.request.gap_tolerance).await
                {
                    Ok(scan) => scan,
                    Err(e) => {
                        warn!(segment = segment.id(), "Slot scan failed: {}", e);
                        self.write_checkpoint(&mut state, &accumulator);
                        return self.finish(
                            state,
                            accumulator,
                            parse_failures,
                            CompletionReason::Aborted,
                            Some(e.to_string()),
                        );
                    }
                };

                for index in &scan.present {
                    match self.parser.parse(&view, segment, *index).await {
                        Ok(record) => batch.push(record),
                        Err(e) if e.is_fatal() => {
                            warn!(
                                segment = segment.id(),
                                slot = *index,
                                "Fatal adapter failure while parsing: {}",
                                e
                            );
                            self.write_checkpoint(&mut state, &accumulator);
                            return self.finish(
                                state,
                                accumulator,
                                parse_failures,
                                CompletionReason::Aborted,
                                Some(e.to_string()),
                            );
                        }
                        Err(e) => {
                            parse_failures += 1;
                            warn!(
                                segment = segment.id(),
                                slot = *index,
                                "Skipping unparseable slot: {}",
                                e
                            );
                        }
                    }
                }

                if let Some(watermark) = scan.watermark {
                    state.advance_watermark(segment.id(), watermark);
                }
            }

            // (f)-(g) merge and track growth
            let accepted = accumulator.accept(batch);
            if accepted > 0 {
                state.dead_cycles = 0;
            } else {
                state.dead_cycles += 1;
            }
            state.total = accumulator.total();

            debug!(
                "Cycle {} done: {} accepted, total {}, dead cycles {}",
                state.cycles, accepted, state.total, state.dead_cycles
            );

            self.write_checkpoint(&mut state, &accumulator);

            // (h) stop policy
            if should_stop(&state, self.request.limit, self.request.max_dead_cycles) {
                let reason = if self.request.limit > 0 && state.total >= self.request.limit {
                    CompletionReason::LimitReached
                } else {
                    CompletionReason::Exhausted
                };
                return self.finish(state, accumulator, parse_failures, reason, None);
            }
        }
    }

    async fn settle(&self) {
        let (min, max) = self.request.settle_ms;
        let pause = if min == max {
            min
        } else {
            thread_rng().gen_range(min..=max)
        };
        sleep(Duration::from_millis(pause)).await;
    }

    fn write_checkpoint(&self, state: &mut HarvestState, accumulator: &Accumulator) {
        let Some(path) = &self.request.checkpoint_path else {
            return;
        };
        state.total = accumulator.total();
        let checkpoint = state.checkpoint(accumulator.seen_keys().cloned().collect());
        if let Err(e) = checkpoint.save(path) {
            warn!("Failed to write checkpoint: {}", e);
        }
    }

    fn finish(
        &self,
        state: HarvestState,
        accumulator: Accumulator,
        parse_failures: u64,
        reason: CompletionReason,
        failure: Option<String>,
    ) -> HarvestResult {
        let records = accumulator.into_records();
        info!(
            "Harvest finished: {} record(s), reason {:?}, {} cycle(s), {} parse failure(s)",
            records.len(),
            reason,
            state.cycles,
            parse_failures
        );

        HarvestResult {
            records,
            reason,
            failure,
            cycles: state.cycles,
            parse_failures,
            finished_at: Utc::now(),
        }
    }
}
