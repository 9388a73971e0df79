use criterion::{Criterion, criterion_group, criterion_main};
use domain::{ActionEvent, ElementTarget, EventTarget, WorkState, extract_action, to_dataset_key};
use serde_json::json;

fn bench_extract_from_element(c: &mut Criterion) {
    let event = ActionEvent::with_target(
        ElementTarget::new().attribute("data-action", "create-appointment"),
    );

    c.bench_function("domain/extract_from_element", |b| {
        b.iter(|| extract_action(&event, "data-action"));
    });
}

fn bench_extract_from_legacy_dataset(c: &mut Criterion) {
    let event = ActionEvent::with_src_element(EventTarget::record(json!({
        "dataset": { "bookingAction": "createAppointment" }
    })));

    c.bench_function("domain/extract_from_legacy_dataset", |b| {
        b.iter(|| extract_action(&event, "data-booking-action"));
    });
}

fn bench_dataset_key(c: &mut Criterion) {
    c.bench_function("domain/to_dataset_key", |b| {
        b.iter(|| to_dataset_key("data-calendar-booking-action"));
    });
}

fn bench_transition(c: &mut Criterion) {
    c.bench_function("domain/transition", |b| {
        b.iter(|| {
            WorkState::Init
                .transition(WorkState::InProgress)
                .and_then(|s| s.transition(WorkState::Completed))
        });
    });
}

criterion_group!(
    benches,
    bench_extract_from_element,
    bench_extract_from_legacy_dataset,
    bench_dataset_key,
    bench_transition
);
criterion_main!(benches);
