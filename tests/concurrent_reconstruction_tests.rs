//! Concurrency scenarios: racing producers, one buffer per trace id, and
//! exactly-once emission under simultaneous completion and eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rehacer::config::{ReconstructionConfig, TimeUnit};
use rehacer::engine::{ListenerError, ReconstructionEngine};
use rehacer::flow_record::{TraceEvent, TraceMetadata};
use rehacer::trace_events::TraceEventRecords;

fn counting_engine(config: ReconstructionConfig) -> (Arc<ReconstructionEngine>, Arc<Mutex<Vec<(u64, bool)>>>) {
    let engine = Arc::new(ReconstructionEngine::new(config));
    let emissions: Arc<Mutex<Vec<(u64, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&emissions);
    engine.on_valid_trace(move |trace: &TraceEventRecords| -> Result<(), ListenerError> {
        sink.lock().unwrap().push((trace.trace_id().unwrap_or(0), true));
        Ok(())
    });
    let sink = Arc::clone(&emissions);
    engine.on_invalid_trace(move |trace: &TraceEventRecords| -> Result<(), ListenerError> {
        sink.lock().unwrap().push((trace.trace_id().unwrap_or(0), false));
        Ok(())
    });
    (engine, emissions)
}

fn complete_trace(trace_id: u64, base_timestamp: i64) -> Vec<TraceEvent> {
    vec![
        TraceEvent::before(base_timestamp, trace_id, 0, "handle()", "app.Handler"),
        TraceEvent::before(base_timestamp + 1, trace_id, 1, "query()", "app.Dao"),
        TraceEvent::after(base_timestamp + 2, trace_id, 2, "query()", "app.Dao"),
        TraceEvent::after(base_timestamp + 3, trace_id, 3, "handle()", "app.Handler"),
    ]
}

#[test]
fn test_parallel_producers_one_trace_each() {
    let (engine, emissions) = counting_engine(ReconstructionConfig::unbounded());
    let threads = 8;

    std::thread::scope(|scope| {
        for thread in 0..threads {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let trace_id = thread + 1;
                engine
                    .submit(TraceMetadata::new(trace_id, thread, "s", "h"))
                    .unwrap();
                for event in complete_trace(trace_id, 10) {
                    engine.submit(event).unwrap();
                }
            });
        }
    });

    let emissions = emissions.lock().unwrap();
    assert_eq!(emissions.len(), threads as usize);
    assert!(emissions.iter().all(|&(_, valid)| valid));
    assert_eq!(engine.open_traces(), 0);
}

#[test]
fn test_racing_producers_share_one_buffer() {
    // Events of a single trace split across threads: still exactly one
    // valid emission with the canonical order.
    let (engine, emissions) = counting_engine(ReconstructionConfig::unbounded());
    let events = complete_trace(1, 10);

    std::thread::scope(|scope| {
        for chunk in events.chunks(1) {
            let engine = Arc::clone(&engine);
            let chunk = chunk.to_vec();
            scope.spawn(move || {
                for event in chunk {
                    engine.submit(event).unwrap();
                }
            });
        }
        let engine = Arc::clone(&engine);
        scope.spawn(move || {
            engine.submit(TraceMetadata::new(1, 0, "s", "h")).unwrap();
        });
    });

    let emissions = emissions.lock().unwrap();
    assert_eq!(emissions.len(), 1);
    assert_eq!(emissions[0], (1, true));
}

#[test]
fn test_stress_interleaved_traces_emit_exactly_once() {
    // Many traces, shuffled submission order per thread, scanning active
    // but with a window no trace outlives: every trace completes and is
    // emitted valid exactly once.
    let config = ReconstructionConfig::builder()
        .max_trace_timeout(1_000_000, TimeUnit::Nanoseconds)
        .build()
        .unwrap();
    let (engine, emissions) = counting_engine(config);
    let traces_per_thread = 50u64;
    let threads = 4u64;

    std::thread::scope(|scope| {
        for thread in 0..threads {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let mut rng = rand::rngs::StdRng::seed_from_u64(thread);
                for n in 0..traces_per_thread {
                    let trace_id = thread * traces_per_thread + n + 1;
                    let base = (n as i64) * 10;
                    let mut records = complete_trace(trace_id, base);
                    records.shuffle(&mut rng);
                    engine
                        .submit(TraceMetadata::new(trace_id, thread, "s", "h"))
                        .unwrap();
                    for event in records {
                        engine.submit(event).unwrap();
                    }
                }
            });
        }
    });
    engine.shutdown().unwrap();

    let emissions = emissions.lock().unwrap();
    let mut per_trace: HashMap<u64, usize> = HashMap::new();
    for &(trace_id, valid) in emissions.iter() {
        assert!(valid, "trace {trace_id} unexpectedly invalid");
        *per_trace.entry(trace_id).or_default() += 1;
    }
    assert_eq!(per_trace.len(), (threads * traces_per_thread) as usize);
    assert!(per_trace.values().all(|&count| count == 1));
    assert_eq!(engine.open_traces(), 0);
}

#[test]
fn test_ticks_racing_submissions() {
    // A ticker thread drives aggressive eviction while a producer submits.
    // A trace whose submission an eviction cuts in half surfaces as an
    // invalid emission plus a fresh straggler buffer, so ids may surface
    // more than once; what must hold is that no id is lost and nothing
    // stays open after shutdown.
    let config = ReconstructionConfig::builder()
        .max_trace_timeout(5, TimeUnit::Nanoseconds)
        .build()
        .unwrap();
    let (engine, emissions) = counting_engine(config);
    let traces = 100u64;

    std::thread::scope(|scope| {
        let producer = Arc::clone(&engine);
        scope.spawn(move || {
            for trace_id in 1..=traces {
                let base = trace_id as i64 * 10;
                producer
                    .submit(TraceMetadata::new(trace_id, 0, "s", "h"))
                    .unwrap();
                for event in complete_trace(trace_id, base) {
                    producer.submit(event).unwrap();
                }
            }
        });
        let ticker = Arc::clone(&engine);
        scope.spawn(move || {
            for step in 0..200 {
                ticker.tick(step * 7).unwrap();
            }
        });
    });
    engine.shutdown().unwrap();

    let emissions = emissions.lock().unwrap();
    let mut per_trace: HashMap<u64, usize> = HashMap::new();
    for &(trace_id, _) in emissions.iter() {
        *per_trace.entry(trace_id).or_default() += 1;
    }
    assert_eq!(per_trace.len(), traces as usize);
    assert!(per_trace.values().all(|&count| count >= 1));
    assert_eq!(engine.open_traces(), 0);
}
