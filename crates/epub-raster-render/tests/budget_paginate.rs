mod common;

use common::budget_alloc::BudgetAlloc;
use common::synthetic::{document, CountingSink, SyntheticDoc, SyntheticSession};
use epub_raster_render::{PaginationOptions, Paginator};

const WIDTH: u32 = 600;
const BASE: u32 = 940;
// Probes are dropped as soon as their bottom row is read, so the working set
// is one probe plus one page capture. Allow a third frame for slack.
const CAPTURE_BYTES: usize = (WIDTH * BASE) as usize;
const PAGINATE_BUDGET_BYTES: usize = 3 * CAPTURE_BYTES + 64 * 1024;

#[global_allocator]
static ALLOC: BudgetAlloc = BudgetAlloc::new();

#[test]
fn long_document_pagination_stays_within_a_few_frames() {
    let doc = document(0, "long.xhtml");
    let mut session = SyntheticSession::new();
    session.record_ops = false;
    session.add(&doc.path, SyntheticDoc::lines(40_000, 37, 22));
    let paginator =
        Paginator::new(PaginationOptions::for_display(WIDTH, BASE).with_settle_ms(0, 0)).unwrap();
    let mut sink = CountingSink::default();
    sink.heights.reserve(256);

    ALLOC.reset_peak();
    let baseline = ALLOC.current_bytes();
    let summary = paginator
        .paginate_all(&mut session, &mut sink, std::slice::from_ref(&doc))
        .unwrap_or_else(|e| panic!("paginate: {}", e));
    let peak = ALLOC.peak_bytes().saturating_sub(baseline);

    assert!(sink.count > 40, "only {} pages", sink.count);
    assert_eq!(summary.page_count, sink.count);
    assert!(
        peak <= PAGINATE_BUDGET_BYTES,
        "pagination peak over budget: {} bytes ({:.1}KB), budget: {}KB",
        peak,
        peak as f64 / 1024.0,
        PAGINATE_BUDGET_BYTES / 1024
    );
    println!(
        "paginate pages={} probes={} peak_kib={:.1}",
        sink.count,
        session.captures,
        peak as f64 / 1024.0
    );
}
