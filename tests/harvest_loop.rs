mod common;

use scroll_harvester::harvest::record::{LinkTarget, RecordStatus};
use scroll_harvester::harvest::runner::{CompletionReason, Harvester, HarvestRequest};
use scroll_harvester::harvest::state::Checkpoint;
use tokio::sync::watch;

use common::{parser, request, scheme, FakeAdapter, FakeCard, FakeSegment};

fn single_segment(cards: Vec<FakeCard>) -> Vec<FakeSegment> {
    let mut segment = FakeSegment::new(2, 4);
    for (index, card) in cards.into_iter().enumerate() {
        segment = segment.with_card(index as u32, card);
    }
    vec![segment]
}

fn cards(ids: &[&str]) -> Vec<FakeCard> {
    ids.iter().map(|id| FakeCard::new(id)).collect()
}

fn identities(records: &[scroll_harvester::harvest::record::ParsedRecord]) -> Vec<&str> {
    records.iter().map(|r| r.identity.as_str()).collect()
}

#[tokio::test]
async fn limit_is_a_hard_ceiling_across_the_run() {
    let adapter = FakeAdapter::new(single_segment(cards(&[
        "A-0", "A-1", "A-2", "A-3", "A-4", "A-5",
    ])));

    let result = Harvester::new(adapter, scheme(), parser(), request(4, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::LimitReached);
    assert_eq!(identities(&result.records), vec!["A-0", "A-1", "A-2", "A-3"]);
    assert!(result.failure.is_none());
}

#[tokio::test]
async fn duplicate_identities_are_emitted_once() {
    let mut segment = FakeSegment::new(2, 4);
    segment = segment.with_card(0, FakeCard::new("A-0"));
    segment = segment.with_card(1, FakeCard::new("A-0"));
    segment = segment.with_card(2, FakeCard::new("A-1"));

    let result = Harvester::new(FakeAdapter::new(vec![segment]), scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::Exhausted);
    assert_eq!(identities(&result.records), vec!["A-0", "A-1"]);
}

#[tokio::test]
async fn empty_feed_exhausts_within_dead_cycle_budget() {
    let adapter = FakeAdapter::new(vec![]);

    let result = Harvester::new(adapter, scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::Exhausted);
    assert!(result.records.is_empty());
    assert_eq!(result.cycles, 2);
}

#[tokio::test]
async fn gap_tolerance_reads_past_unrendered_slots() {
    let segments = || {
        vec![FakeSegment::new(2, 4)
            .with_card(0, FakeCard::new("A-0"))
            .with_card(1, FakeCard::new("A-1"))
            .with_card(3, FakeCard::new("A-3"))
            .with_card(4, FakeCard::new("A-4"))]
    };

    let tolerant = Harvester::new(
        FakeAdapter::new(segments()),
        scheme(),
        parser(),
        request(0, 1),
    )
    .run()
    .await;
    assert_eq!(identities(&tolerant.records), vec!["A-0", "A-1", "A-3", "A-4"]);

    let strict = Harvester::new(
        FakeAdapter::new(segments()),
        scheme(),
        parser(),
        request(0, 0),
    )
    .run()
    .await;
    assert_eq!(identities(&strict.records), vec!["A-0", "A-1"]);
}

#[tokio::test]
async fn growth_across_cycles_resumes_past_the_watermark() {
    let segment = FakeSegment::new(2, 4)
        .with_card(0, FakeCard::new("A-0"))
        .with_card(1, FakeCard::new("A-1"))
        .with_card(2, FakeCard::new("A-2"))
        .with_card(3, FakeCard::new("A-3").appearing_after(2))
        .with_card(4, FakeCard::new("A-4").appearing_after(2));

    let result = Harvester::new(FakeAdapter::new(vec![segment]), scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::Exhausted);
    assert_eq!(
        identities(&result.records),
        vec!["A-0", "A-1", "A-2", "A-3", "A-4"]
    );
    // two productive cycles, then the dead-cycle budget
    assert_eq!(result.cycles, 4);
}

#[tokio::test]
async fn limit_cuts_across_segment_boundaries() {
    let s1 = FakeSegment::new(2, 4)
        .with_card(0, FakeCard::new("S1-0"))
        .with_card(1, FakeCard::new("S1-1"))
        .with_card(2, FakeCard::new("S1-2"));
    // the second segment only renders on the second cycle
    let s2 = FakeSegment::new(3, 3)
        .with_card(0, FakeCard::new("S2-0").appearing_after(2))
        .with_card(1, FakeCard::new("S2-1").appearing_after(2));

    let result = Harvester::new(FakeAdapter::new(vec![s1, s2]), scheme(), parser(), request(4, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::LimitReached);
    assert_eq!(result.cycles, 2);
    assert_eq!(
        identities(&result.records),
        vec!["S1-0", "S1-1", "S1-2", "S2-0"]
    );
}

#[tokio::test]
async fn unparseable_slots_are_skipped_and_counted() {
    let segment = FakeSegment::new(2, 4)
        .with_card(0, FakeCard::blank())
        .with_card(1, FakeCard::new("A-1"));

    let result = Harvester::new(FakeAdapter::new(vec![segment]), scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::Exhausted);
    assert_eq!(identities(&result.records), vec!["A-1"]);
    assert_eq!(result.parse_failures, 1);
}

#[tokio::test]
async fn checkpoint_resume_never_re_emits_seen_records() {
    let path = std::env::temp_dir().join(format!(
        "harvest-resume-{}.json",
        std::process::id()
    ));

    // First run only ever sees the first two cards and stops at its limit.
    let early = FakeAdapter::new(single_segment(cards(&["A-0", "A-1"])));
    let mut first_request = request(2, 2);
    first_request.checkpoint_path = Some(path.clone());

    let first = Harvester::new(early, scheme(), parser(), first_request)
        .run()
        .await;
    assert_eq!(first.reason, CompletionReason::LimitReached);
    assert_eq!(identities(&first.records), vec!["A-0", "A-1"]);

    // Second run sees the grown feed and picks up past the watermark.
    let grown = FakeAdapter::new(single_segment(cards(&["A-0", "A-1", "A-2", "A-3"])));
    let mut second_request = request(0, 2);
    second_request.resume_from = Some(Checkpoint::load(&path).unwrap());

    let second = Harvester::new(grown, scheme(), parser(), second_request)
        .run()
        .await;
    std::fs::remove_file(&path).ok();

    assert_eq!(second.reason, CompletionReason::Exhausted);
    assert_eq!(identities(&second.records), vec!["A-2", "A-3"]);
}

#[tokio::test]
async fn resume_skips_seen_records_still_at_their_slots() {
    // No watermarks in the checkpoint, so both slots get re-scanned and
    // re-offered; only the seen-set keeps A-0 and A-1 out of the result.
    let checkpoint = Checkpoint {
        segments: vec![],
        seen_keys: vec!["A-0".to_string(), "A-1".to_string()],
        total: 2,
    };

    let adapter = FakeAdapter::new(single_segment(cards(&["A-0", "A-1", "A-2"])));
    let mut req = request(0, 2);
    req.resume_from = Some(checkpoint);

    let result = Harvester::new(adapter, scheme(), parser(), req).run().await;

    assert_eq!(result.reason, CompletionReason::Exhausted);
    assert_eq!(identities(&result.records), vec!["A-2"]);
}

#[tokio::test]
async fn resumed_total_counts_toward_the_limit() {
    let checkpoint = Checkpoint {
        segments: vec![],
        seen_keys: vec!["A-0".to_string(), "A-1".to_string()],
        total: 2,
    };

    let adapter = FakeAdapter::new(single_segment(cards(&["B-0", "B-1", "B-2"])));
    let mut req = request(3, 2);
    req.resume_from = Some(checkpoint);

    let result = Harvester::new(adapter, scheme(), parser(), req).run().await;

    assert_eq!(result.reason, CompletionReason::LimitReached);
    assert_eq!(identities(&result.records), vec!["B-0"]);
}

#[tokio::test]
async fn fatal_surface_failure_preserves_partial_records() {
    let adapter = FakeAdapter::new(single_segment(cards(&["A-0", "A-1", "A-2"])))
        .failing_scroll_after(1);

    let result = Harvester::new(adapter, scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.reason, CompletionReason::Aborted);
    assert_eq!(identities(&result.records), vec!["A-0", "A-1", "A-2"]);
    assert!(result.failure.unwrap().contains("window closed"));
}

#[tokio::test]
async fn cancellation_stops_before_the_next_cycle() {
    let adapter = FakeAdapter::new(single_segment(cards(&["A-0"])));
    let (tx, rx) = watch::channel(true);

    let result = Harvester::new(adapter, scheme(), parser(), request(0, 2))
        .with_cancel(rx)
        .run()
        .await;
    drop(tx);

    assert_eq!(result.reason, CompletionReason::Aborted);
    assert_eq!(result.failure.as_deref(), Some("cancelled"));
    assert!(result.records.is_empty());
    assert_eq!(result.cycles, 0);
}

#[tokio::test]
async fn records_carry_fields_extracted_from_the_slot() {
    let card = FakeCard {
        appear_after: 1,
        listing_id: Some("123456".to_string()),
        text: "Acme Rentals\nSponsored\nApartments downtown\nNow renting\nLearn More"
            .to_string(),
        status: Some("Active".to_string()),
        cta: None,
        page: Some((
            "Acme Rentals".to_string(),
            "https://www.facebook.com/acmerentals".to_string(),
        )),
        anchors: vec![
            (
                "https://www.facebook.com/acmerentals".to_string(),
                "Acme Rentals".to_string(),
            ),
            (
                "https://acme.example.com/listings".to_string(),
                "See listings".to_string(),
            ),
            (
                "https://facebook.com/chrome".to_string(),
                "Sponsored".to_string(),
            ),
        ],
        images: vec!["https://cdn.example.com/photo.jpg".to_string()],
    };

    let segment = FakeSegment::new(2, 4).with_card(0, card);
    let result = Harvester::new(FakeAdapter::new(vec![segment]), scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.records.len(), 1);
    let record = &result.records[0];

    assert_eq!(record.identity, "123456");
    assert_eq!(record.status, RecordStatus::Active);
    assert_eq!(record.body, "Apartments downtown\nNow renting");
    assert_eq!(record.cta.as_deref(), Some("Learn More"));
    assert_eq!(record.page.as_ref().unwrap().name, "Acme Rentals");

    // chrome-labelled anchor dropped, the rest classified by domain
    assert_eq!(record.links.len(), 2);
    assert_eq!(record.links[0].target, LinkTarget::Internal);
    assert_eq!(record.links[1].target, LinkTarget::External);

    assert_eq!(record.media, vec!["https://cdn.example.com/photo.jpg"]);
}

#[tokio::test]
async fn cta_prefers_the_rendered_element_over_raw_text() {
    // The rendered button says "Shop Now"; the text block mentions a
    // different phrase, which must lose to the rendered element.
    let mut button = FakeCard::new("C-0").with_cta("Shop Now");
    button.text = "Page Name\nSponsored\nBig sale\nLearn More".to_string();

    // No rendered element at all, so the raw-text fallback applies.
    let mut fallback = FakeCard::new("C-1");
    fallback.text = "Page Name\nSponsored\nOther sale\nLearn More".to_string();

    let segment = FakeSegment::new(2, 4)
        .with_card(0, button)
        .with_card(1, fallback);
    let result = Harvester::new(FakeAdapter::new(vec![segment]), scheme(), parser(), request(0, 2))
        .run()
        .await;

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0].cta.as_deref(), Some("Shop Now"));
    assert_eq!(result.records[1].cta.as_deref(), Some("Learn More"));
}

#[tokio::test]
async fn discovery_is_idempotent_without_an_intervening_scroll() {
    use scroll_harvester::adapter::RenderAdapter;
    use scroll_harvester::harvest::segment::SegmentDiscoverer;
    use scroll_harvester::harvest::view::RenderView;

    let s1 = FakeSegment::new(2, 4).with_card(0, FakeCard::new("A-0"));
    let s2 = FakeSegment::new(3, 3).with_card(0, FakeCard::new("B-0"));
    let adapter = FakeAdapter::new(vec![s1, s2]);
    adapter.scroll(100).await.unwrap();

    let locators = scheme();
    let view = RenderView::new(&adapter, &locators);
    let discoverer = SegmentDiscoverer::default();

    let first = discoverer.discover(&view).await.unwrap();
    let second = discoverer.discover(&view).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn unvalidated_requests_are_rejected_at_the_boundary() {
    let bad = HarvestRequest {
        max_dead_cycles: 0,
        ..request(0, 2)
    };
    assert!(bad.validated().is_err());
}
