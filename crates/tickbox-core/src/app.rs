#![forbid(unsafe_code)]

//! Application wiring: config check, snapshot load, list, sink, router.
//!
//! Initialization is all-or-nothing. A missing attach point is reported
//! through the blocking [`AlertReporter`] (the configured hook is not
//! trusted yet) and nothing is built.

use std::rc::Rc;

use tickbox_reactive::Runtime;

use crate::config::{AppConfig, ReporterChoice};
use crate::error::Result;
use crate::list::TodoList;
use crate::persist::{PersistenceSink, Store, load_records};
use crate::router::FilterRouter;
use crate::show_mode::ShowMode;
use crate::validation::{AlertReporter, ErrorReporter, TransientReporter, ValidationPipeline};

#[derive(Debug)]
pub struct App {
    rt: Runtime,
    attach_point: String,
    list: TodoList,
    router: FilterRouter,
    sink: PersistenceSink,
    transient: Option<Rc<TransientReporter>>,
}

impl App {
    pub fn init(config: AppConfig, store: Rc<dyn Store>) -> Result<Self> {
        Self::init_with_runtime(config, store, Runtime::new())
    }

    /// Like [`init`](Self::init), on a caller-supplied runtime (for example
    /// one driven by a lab clock).
    pub fn init_with_runtime(config: AppConfig, store: Rc<dyn Store>, rt: Runtime) -> Result<Self> {
        let attach_point = match config.require_attach_point() {
            Ok(id) => id.to_owned(),
            Err(err) => {
                tracing::error!(error = %err, "initialization aborted");
                AlertReporter.report(&err.to_string());
                return Err(err.into());
            }
        };

        let mut transient = None;
        let reporter: Rc<dyn ErrorReporter> = match config.validation_error_handler {
            ReporterChoice::Alert => Rc::new(AlertReporter),
            ReporterChoice::Transient => {
                let reporter =
                    Rc::new(TransientReporter::new(&rt).with_clear_after(config.error_clear_after));
                transient = Some(Rc::clone(&reporter));
                reporter
            }
            ReporterChoice::Custom(reporter) => reporter,
        };

        let records = load_records(store.as_ref(), &config.storage_key)?;
        let list = TodoList::new(&rt, &records, ValidationPipeline::new(reporter));
        let sink = PersistenceSink::attach(&list, store, config.storage_key, config.save_window);
        let router = FilterRouter::new(list.show_mode_cell().clone());

        tracing::info!(
            attach_point = %attach_point,
            items = list.len(),
            key = sink.key(),
            "app initialized"
        );
        Ok(Self {
            rt,
            attach_point,
            list,
            router,
            sink,
            transient,
        })
    }

    #[must_use]
    pub fn list(&self) -> &TodoList {
        &self.list
    }

    #[must_use]
    pub fn router(&self) -> &FilterRouter {
        &self.router
    }

    #[must_use]
    pub fn sink(&self) -> &PersistenceSink {
        &self.sink
    }

    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    #[must_use]
    pub fn attach_point(&self) -> &str {
        &self.attach_point
    }

    /// Route to a `/:filter` path.
    pub fn navigate(&self, path: &str) -> ShowMode {
        self.router.navigate(path)
    }

    /// The message on display when transient error reporting is configured.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.transient.as_ref().and_then(|reporter| reporter.message())
    }

    /// Fire due timers.
    pub fn tick(&self) -> usize {
        self.rt.run_due()
    }

    /// Fire every pending timer so the last save lands. Returns how many
    /// timers fired.
    pub fn shutdown_flush(&self) -> usize {
        let fired = self.rt.scheduler().fire_all();
        if self.sink.flush() {
            tracing::debug!("final snapshot flushed");
        }
        tracing::debug!(fired, writes = self.sink.writes(), "shutdown flush");
        fired
    }
}
