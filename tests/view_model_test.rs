//! Follow, filter and detail behavior of the view model against a live
//! aggregator.

#![allow(clippy::unwrap_used)]

use streamviz::view::TickStats;
use streamviz::{
    Aggregator, ClassifiedEvent, Limits, PreviewMode, StreamKey, TypeFilter, ViewModel,
    ViewOptions, Viewport,
};

const OUT: &str = "response.output_text.delta";
const ARGS: &str = "response.function_call_arguments.delta";

fn delta(item: &str, event_type: &str, text: &str) -> ClassifiedEvent {
    ClassifiedEvent::Delta {
        item_id: item.to_string(),
        output_index: 0,
        event_type: event_type.to_string(),
        text: text.to_string(),
    }
}

fn viewport(list_height: usize) -> Viewport {
    Viewport {
        width: 60,
        list_height,
        detail_width: 58,
        detail_height: 10,
    }
}

fn ingest(agg: &mut Aggregator, view: &mut ViewModel, item: &str, event_type: &str, text: &str) {
    agg.ingest(delta(item, event_type, text));
    view.on_ingest(agg, &StreamKey::new(item, 0));
}

fn key(item: &str) -> StreamKey {
    StreamKey::new(item, 0)
}

#[test]
fn pending_counts_changes_of_the_top_entry() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions::default());
    view.move_selection(&agg, 1);
    assert!(!view.follow());

    ingest(&mut agg, &mut view, "idA", OUT, "hi");
    assert_eq!(view.pending_updates(), 1);
    ingest(&mut agg, &mut view, "idA", OUT, " there");
    assert_eq!(view.pending_updates(), 1);
    ingest(&mut agg, &mut view, "idB", OUT, "hey");
    assert_eq!(view.pending_updates(), 2);
    assert!(view.banner_visible());

    view.jump_to_newest(&agg);
    assert!(view.follow());
    assert_eq!(view.pending_updates(), 0);
    assert_eq!(view.selected(), Some(&key("idB")));
}

#[test]
fn selection_holds_while_not_following() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions::default());
    ingest(&mut agg, &mut view, "a", OUT, "1");
    ingest(&mut agg, &mut view, "b", OUT, "2");
    view.project(&agg, viewport(20), TickStats::default());
    assert_eq!(view.selected(), Some(&key("b")));

    view.move_selection(&agg, 1);
    assert_eq!(view.selected(), Some(&key("a")));

    ingest(&mut agg, &mut view, "c", OUT, "3");
    let projection = view.project(&agg, viewport(20), TickStats::default());

    assert_eq!(view.selected(), Some(&key("a")));
    assert_eq!(projection.rows[0].key, key("c"));
    assert!(projection.rows.iter().any(|r| r.is_selected && r.key == key("a")));
}

#[test]
fn filter_hides_without_dropping() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions::default());
    ingest(&mut agg, &mut view, "fc", ARGS, "{}");
    ingest(&mut agg, &mut view, "msg", OUT, "text");

    view.cycle_filter();
    assert_eq!(view.filter(), TypeFilter::ArgsDelta);
    let projection = view.project(&agg, viewport(20), TickStats::default());

    assert_eq!(projection.visible_count, 1);
    assert_eq!(projection.rows[0].key, key("fc"));
    assert_eq!(projection.header.item_count, 2);
}

#[test]
fn selected_row_stays_inside_the_list() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions::default());
    for i in 0..10 {
        ingest(&mut agg, &mut view, &format!("item{i}"), OUT, "x");
    }
    view.project(&agg, viewport(3), TickStats::default());

    view.move_selection(&agg, 6);
    let projection = view.project(&agg, viewport(3), TickStats::default());

    let selected_pos = projection.rows.iter().position(|r| r.is_selected).unwrap();
    assert!(selected_pos < 3);
    assert!(projection.list_scroll > 0);
}

#[test]
fn detail_scroll_is_clamped_and_follows_growth() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions::default());
    ingest(&mut agg, &mut view, "m", OUT, &"x".repeat(58 * 15));
    view.project(&agg, viewport(20), TickStats::default());
    view.open_detail();

    view.scroll_end();
    let detail = view
        .project(&agg, viewport(20), TickStats::default())
        .detail
        .unwrap();
    assert_eq!(detail.full_wrapped_lines.len(), 15);
    assert_eq!(detail.scroll_offset, 5);

    ingest(&mut agg, &mut view, "m", OUT, &"y".repeat(58 * 2));
    let detail = view
        .project(&agg, viewport(20), TickStats::default())
        .detail
        .unwrap();
    assert_eq!(detail.full_wrapped_lines.len(), 17);
    assert!(detail.full_wrapped_lines.last().unwrap().starts_with('y'));

    view.scroll_home();
    let detail = view
        .project(&agg, viewport(20), TickStats::default())
        .detail
        .unwrap();
    assert_eq!(detail.scroll_offset, 0);
}

#[test]
fn evicted_detail_target_closes_with_notice() {
    let mut agg = Aggregator::new(Limits {
        max_items: 1,
        ..Limits::default()
    });
    let mut view = ViewModel::new(ViewOptions::default());
    ingest(&mut agg, &mut view, "victim", OUT, "x");
    view.project(&agg, viewport(20), TickStats::default());
    view.open_detail();

    ingest(&mut agg, &mut view, "newcomer", OUT, "y");
    let projection = view.project(&agg, viewport(20), TickStats::default());

    assert!(projection.detail.is_none());
    assert!(!view.in_detail());
    assert!(projection.notice.unwrap().contains("victim#0"));
}

#[test]
fn expanded_rows_show_more_lines() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions {
        lines_per_item: 2,
        lines_expanded: 6,
        ..ViewOptions::default()
    });
    ingest(&mut agg, &mut view, "m", OUT, &"z".repeat(500));

    let rows = view.project(&agg, viewport(20), TickStats::default()).rows;
    assert_eq!(rows[0].wrapped_lines.len(), 2);

    view.toggle_expanded();
    let rows = view.project(&agg, viewport(20), TickStats::default()).rows;
    assert!(rows[0].expanded);
    assert_eq!(rows[0].wrapped_lines.len(), 6);
}

#[test]
fn summary_preview_replaces_raw_text() {
    let mut agg = Aggregator::new(Limits::default());
    let mut view = ViewModel::new(ViewOptions::default());
    ingest(
        &mut agg,
        &mut view,
        "fc",
        ARGS,
        r#"{"command":["rg","needle"],"timeout_ms":5000}"#,
    );

    view.cycle_preview();
    assert_eq!(view.preview(), PreviewMode::Summary);
    let rows = view.project(&agg, viewport(20), TickStats::default()).rows;

    assert_eq!(rows[0].wrapped_lines.len(), 1);
    assert!(rows[0].wrapped_lines[0].contains("rg needle"));
}
