#![no_main]

use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tickbox_core::{
    App, AppConfig, EditOutcome, ItemRecord, MemoryStore, STORAGE_KEY, ShowMode, load_records,
};
use tickbox_reactive::{Clock, LabClock, Runtime};
use web_time::Duration;

#[derive(Arbitrary, Debug)]
enum Op {
    Add(String),
    Edit { index: u8, title: String },
    Toggle(u8),
    ToggleAll(bool),
    Remove(u8),
    ClearCompleted,
    Mode(u8),
    Advance(u16),
}

fuzz_target!(|ops: Vec<Op>| {
    let clock = LabClock::new();
    let rt = Runtime::with_clock(Clock::Lab(clock.clone()));
    let store = Rc::new(MemoryStore::new());
    let config = AppConfig::new("fuzz").with_reporter(Rc::new(|_: &str| {}));
    let app = App::init_with_runtime(config, store.clone(), rt).expect("init");
    let list = app.list();

    for op in ops.into_iter().take(256) {
        let len = list.len();
        match op {
            Op::Add(title) => {
                let added = list.add_title(title.clone());
                let trimmed = title.trim();
                let accepted = !trimmed.is_empty() && !trimmed.contains('p');
                assert_eq!(added.is_some(), accepted);
                assert_eq!(list.len(), len + usize::from(accepted));
            }
            Op::Edit { index, title } => {
                if let Some(item) = list.get(usize::from(index)) {
                    list.edit_item(&item);
                    item.set_title(title);
                    match list.stop_editing(&item) {
                        EditOutcome::Removed => assert_eq!(list.len(), len - 1),
                        EditOutcome::Committed => assert!(!item.is_editing() && item.is_valid()),
                        EditOutcome::Rejected => assert!(item.is_editing() && !item.is_valid()),
                    }
                }
            }
            Op::Toggle(index) => {
                if let Some(item) = list.get(usize::from(index)) {
                    item.toggle();
                }
            }
            Op::ToggleAll(completed) => {
                list.set_all_completed(completed).expect("writable");
                assert_eq!(list.all_completed(), completed || len == 0);
            }
            Op::Remove(index) => {
                if let Some(item) = list.get(usize::from(index)) {
                    assert!(list.remove(&item));
                    assert_eq!(list.len(), len - 1);
                }
            }
            Op::ClearCompleted => {
                let removed = list.remove_completed();
                assert_eq!(list.len(), len - removed);
                assert_eq!(list.completed_count(), 0);
            }
            Op::Mode(mode) => {
                list.set_show_mode(ShowMode::ALL[usize::from(mode) % 3]);
            }
            Op::Advance(ms) => {
                clock.advance(Duration::from_millis(u64::from(ms)));
                app.tick();
            }
        }

        let total = list.len();
        assert_eq!(list.completed_count() + list.remaining_count(), total);
        assert_eq!(list.all_completed(), list.remaining_count() == 0);
        let shown = list.filtered_items();
        match list.show_mode() {
            ShowMode::All => assert_eq!(shown.len(), total),
            ShowMode::Active => assert_eq!(shown.len(), list.remaining_count()),
            ShowMode::Completed => assert_eq!(shown.len(), list.completed_count()),
        }
    }

    app.shutdown_flush();
    let stored: Vec<ItemRecord> = load_records(store.as_ref(), STORAGE_KEY).expect("stored");
    assert_eq!(stored, list.records());
});
