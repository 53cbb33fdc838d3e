#![no_main]

use libfuzzer_sys::fuzz_target;
use rehacer::config::{ReconstructionConfig, TimeUnit};
use rehacer::engine::{ListenerError, ReconstructionEngine};
use rehacer::flow_record::FlowRecord;
use rehacer::trace_events::TraceEventRecords;

fuzz_target!(|records: Vec<FlowRecord>| {
    // Arbitrary record streams must never panic the engine, and shutdown
    // must always leave the registry empty.
    let config = ReconstructionConfig::builder()
        .max_trace_timeout(1_000, TimeUnit::Nanoseconds)
        .build()
        .unwrap();
    let engine = ReconstructionEngine::new(config);
    engine.on_valid_trace(|trace: &TraceEventRecords| -> Result<(), ListenerError> {
        assert!(trace
            .events()
            .windows(2)
            .all(|w| w[0].order_index < w[1].order_index));
        Ok(())
    });
    engine.on_invalid_trace(|_trace: &TraceEventRecords| -> Result<(), ListenerError> { Ok(()) });

    for record in records {
        let _ = engine.submit(record);
    }
    let _ = engine.shutdown();
    assert_eq!(engine.open_traces(), 0);
});
