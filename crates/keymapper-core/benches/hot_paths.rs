use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keymapper_core::config::ConfigRows;
use keymapper_core::remap_helper::{apply_shortcut_remappings, apply_single_key_remappings};
use keymapper_core::{MockInput, RemapState, VirtualKey};
use serde_json::json;

const A: VirtualKey = VirtualKey(0x41);
const C: VirtualKey = VirtualKey(0x43);
const Z: VirtualKey = VirtualKey(0x5A);

fn make_state() -> RemapState {
    let doc = json!({
        "remapKeys": { "inProcess": [
            { "originalKeys": "65", "newRemapKeys": "66" },
            { "originalKeys": "20", "newRemapKeys": "256" },
            { "originalKeys": "112", "newRemapKeys": "17;16;27" }
        ]},
        "remapShortcuts": {
            "global": [
                { "originalKeys": "17;67", "newRemapKeys": "17;86" },
                { "originalKeys": "17;16;67", "newRemapKeys": "88" },
                { "originalKeys": "18;67", "newRemapKeys": "91;68" }
            ],
            "appSpecific": [
                { "originalKeys": "17;67", "newRemapKeys": "89", "targetApp": "notepad.exe" }
            ]
        }
    });
    let rows = ConfigRows::from_json(&doc);
    let state = RemapState::new();
    apply_single_key_remappings(&state, &rows.single_key);
    apply_shortcut_remappings(&state, &rows.shortcuts);
    state
}

fn bench_passthrough(c: &mut Criterion) {
    let state = make_state();
    let input = MockInput::new();
    c.bench_function("pipeline/unmapped_key_passthrough", |b| {
        b.iter(|| {
            black_box(input.press(&state, Z));
            black_box(input.release(&state, Z));
            input.reset();
        });
    });
}

fn bench_single_key_remap(c: &mut Criterion) {
    let state = make_state();
    let input = MockInput::new();
    c.bench_function("pipeline/single_key_remap", |b| {
        b.iter(|| {
            black_box(input.press(&state, A));
            black_box(input.release(&state, A));
            input.reset();
        });
    });
}

fn bench_shortcut_remap(c: &mut Criterion) {
    let state = make_state();
    let input = MockInput::new();
    c.bench_function("pipeline/ctrl_c_to_ctrl_v", |b| {
        b.iter(|| {
            black_box(input.press(&state, VirtualKey::LCONTROL));
            black_box(input.press(&state, C));
            black_box(input.release(&state, C));
            black_box(input.release(&state, VirtualKey::LCONTROL));
            input.reset();
        });
    });
}

fn bench_app_specific_remap(c: &mut Criterion) {
    let state = make_state();
    let input = MockInput::new();
    input.set_foreground_process(Some("notepad.exe"));
    c.bench_function("pipeline/app_specific_ctrl_c", |b| {
        b.iter(|| {
            black_box(input.press(&state, VirtualKey::LCONTROL));
            black_box(input.press(&state, C));
            black_box(input.release(&state, C));
            black_box(input.release(&state, VirtualKey::LCONTROL));
            input.reset();
        });
    });
}

criterion_group!(
    benches,
    bench_passthrough,
    bench_single_key_remap,
    bench_shortcut_remap,
    bench_app_specific_remap
);
criterion_main!(benches);
