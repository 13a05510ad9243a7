use proptest::prelude::*;
use streamscope_analysis::{build_timeline, TimelineBuilder, TraceSummary};
use streamscope_shared::{EventType, TraceEvent};

fn event_strategy() -> impl Strategy<Value = TraceEvent> {
    (
        prop::sample::select(vec![
            EventType::KernelLaunch,
            EventType::KernelComplete,
            EventType::MemcpyH2D,
            EventType::MemcpyD2H,
            EventType::StreamSync,
            EventType::Marker,
        ]),
        0u64..10_000,
        0u64..2_000,
        0u32..4,
        prop::sample::select(vec!["gemm", "relu", "softmax"]),
    )
        .prop_map(|(event_type, ts, dur, stream, name)| {
            TraceEvent::new(event_type, ts)
                .with_duration(dur)
                .with_stream(stream)
                .with_name(name)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn utilization_stays_in_bounds(events in prop::collection::vec(event_strategy(), 0..64)) {
        let timeline = build_timeline(&events);

        prop_assert!((0.0..=1.0).contains(&timeline.gpu_utilization));
        prop_assert!(timeline.busy_time <= timeline.total_duration);
        prop_assert!(timeline.spans.len() <= events.len());
        if timeline.spans.iter().any(|s| !s.is_instantaneous()) {
            prop_assert!(timeline.max_concurrent_ops >= 1);
        }
        for stream in &timeline.streams {
            prop_assert!(stream.busy_time <= timeline.busy_time);
        }
    }

    #[test]
    fn builder_matches_direct_build(events in prop::collection::vec(event_strategy(), 0..32)) {
        let forward = build_timeline(&events);

        let mut builder = TimelineBuilder::new();
        builder.add_events(events.iter().cloned());
        let rebuilt = builder.build();

        prop_assert_eq!(forward.busy_time, rebuilt.busy_time);
        prop_assert_eq!(forward.max_concurrent_ops, rebuilt.max_concurrent_ops);
        prop_assert_eq!(forward.spans.len(), rebuilt.spans.len());
    }

    #[test]
    fn summary_span_covers_timeline(events in prop::collection::vec(event_strategy(), 1..64)) {
        let timeline = build_timeline(&events);
        let summary = TraceSummary::from_events(&events);

        prop_assert_eq!(summary.event_count, events.len() as u64);
        prop_assert!(timeline.total_duration <= summary.time_span);
        let counted: u64 = summary.by_type.iter().map(|t| t.count).sum();
        prop_assert_eq!(counted, summary.event_count);
    }
}

#[test]
fn sync_heavy_trace_has_idle_gaps() {
    let events = vec![
        TraceEvent::new(EventType::KernelLaunch, 0).with_duration(100),
        TraceEvent::new(EventType::StreamSync, 100),
        TraceEvent::new(EventType::KernelLaunch, 400).with_duration(100),
    ];
    let timeline = build_timeline(&events);

    assert_eq!(timeline.total_duration, 500);
    assert_eq!(timeline.busy_time, 200);
    assert!((timeline.gpu_utilization - 0.4).abs() < 1e-9);
    assert_eq!(timeline.max_concurrent_ops, 1);
    assert_eq!(timeline.streams[0].span_count, 3);
}
