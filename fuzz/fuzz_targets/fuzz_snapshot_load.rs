#![no_main]

use std::rc::Rc;

use libfuzzer_sys::fuzz_target;
use tickbox_core::{App, AppConfig, MemoryStore, STORAGE_KEY, load_records};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let store = Rc::new(MemoryStore::with_entry(STORAGE_KEY, text));
    let Ok(records) = load_records(store.as_ref(), STORAGE_KEY) else {
        return;
    };

    let config = AppConfig::new("fuzz").with_reporter(Rc::new(|_: &str| {}));
    let app = App::init(config, store.clone()).expect("loadable snapshot must init");
    assert_eq!(app.list().records(), records);
    app.shutdown_flush();

    // What was written back must load to the same records.
    let again = load_records(store.as_ref(), STORAGE_KEY).expect("written snapshot must load");
    assert_eq!(again, records);
});
