#![forbid(unsafe_code)]

//! Core: task items, title validation, the list engine, filter routing and
//! debounced persistence.
//!
//! ```
//! use std::rc::Rc;
//! use tickbox_core::{App, AppConfig, MemoryStore};
//!
//! let store = Rc::new(MemoryStore::new());
//! let app = App::init(AppConfig::new("todoapp"), store.clone()).unwrap();
//! app.list().add_title("walk the dog");
//! app.shutdown_flush();
//! assert_eq!(store.get("todos-knockoutjs").unwrap(), r#"[{"title":"walk the dog","completed":false}]"#);
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod item;
pub mod list;
pub mod persist;
pub mod router;
pub mod show_mode;
pub mod validation;

pub use app::App;
pub use config::{AppConfig, ConfigError, ReporterChoice};
pub use error::{Error, Result};
pub use item::{Item, ItemId, ItemRecord};
pub use list::{EditOutcome, TodoList};
pub use persist::{
    DEFAULT_SAVE_WINDOW, FileStore, MemoryStore, PersistenceSink, STORAGE_KEY, SaveOutcome, Store,
    StoreError, load_records,
};
pub use router::FilterRouter;
pub use show_mode::{ShowMode, UnknownShowMode};
pub use validation::{
    AlertReporter, ErrorReporter, ForbiddenChar, TitleRewrite, TitleRule, TransientReporter,
    ValidationError, ValidationPipeline,
};
