//! End-to-end persistence: app init against a file store, debounced writes
//! under a lab clock, and reload in a fresh app.

use std::rc::Rc;

use proptest::prelude::*;
use tickbox_core::{
    App, AppConfig, FileStore, ItemRecord, MemoryStore, STORAGE_KEY, ShowMode, Store,
};
use tickbox_reactive::{Clock, LabClock, Runtime};
use web_time::Duration;

fn lab_app(store: Rc<dyn Store>) -> (App, LabClock) {
    let clock = LabClock::new();
    let rt = Runtime::with_clock(Clock::Lab(clock.clone()));
    let app = App::init_with_runtime(AppConfig::new("todoapp"), store, rt).unwrap();
    (app, clock)
}

fn stored(store: &MemoryStore) -> Vec<ItemRecord> {
    serde_json::from_str(&store.get(STORAGE_KEY).unwrap()).unwrap()
}

#[test]
fn session_survives_restart_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (app, _) = lab_app(Rc::new(FileStore::new(dir.path())));
        app.list().add_title("buy milk");
        app.list().add_title("walk dog");
        app.list().get(1).unwrap().set_completed(true);
        app.navigate("/completed");
        app.shutdown_flush();
    }
    assert!(dir.path().join("todos-knockoutjs.json").exists());

    let (app, _) = lab_app(Rc::new(FileStore::new(dir.path())));
    assert_eq!(
        app.list().records(),
        vec![ItemRecord::new("buy milk", false), ItemRecord::new("walk dog", true)]
    );
    assert_eq!(app.list().show_mode(), ShowMode::All);
}

#[test]
fn editing_state_is_not_restored() {
    let store = Rc::new(MemoryStore::new());
    {
        let (app, _) = lab_app(store.clone());
        let item = app.list().add_title("draft").unwrap();
        app.list().edit_item(&item);
        app.shutdown_flush();
    }
    let (app, _) = lab_app(store);
    let item = app.list().get(0).unwrap();
    assert!(!item.is_editing());
    assert!(item.is_valid());
}

#[test]
fn quiet_list_does_not_write_again() {
    let store = Rc::new(MemoryStore::new());
    let (app, clock) = lab_app(store.clone());
    clock.advance(Duration::from_secs(10));
    app.tick();
    assert_eq!(store.save_count(), 1);
    assert!(!app.sink().is_pending());
}

proptest! {
    #[test]
    fn burst_within_window_writes_final_state_once(
        steps in proptest::collection::vec((0u64..100, "[a-oq-w]{1,6}"), 1..=4),
    ) {
        let store = Rc::new(MemoryStore::new());
        let (app, clock) = lab_app(store.clone());
        prop_assert_eq!(store.save_count(), 1);

        // Each gap is under the window, so every add re-arms it.
        for (gap, title) in &steps {
            clock.advance(Duration::from_millis(*gap));
            app.tick();
            app.list().add_title(title.clone());
        }
        prop_assert_eq!(store.save_count(), 1);

        clock.advance(Duration::from_millis(500));
        app.tick();
        prop_assert_eq!(store.save_count(), 2);
        let expected: Vec<ItemRecord> =
            steps.iter().map(|(_, title)| ItemRecord::new(title.clone(), false)).collect();
        prop_assert_eq!(stored(&store), expected);
    }
}
