use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use tickbox_core::{
    App, AppConfig, EditOutcome, ErrorReporter, FileStore, FilterRouter, Item, ReporterChoice,
    ShowMode, TodoList,
};

use crate::error::{CliError, Result};
use crate::logging;

#[derive(Debug, Parser)]
#[command(name = "tickbox", about = "A small reactive task list", version)]
pub struct Cli {
    /// Directory holding the saved list.
    #[arg(long, value_name = "DIR", default_value = ".tickbox")]
    pub store: PathBuf,

    /// Attach point identifier passed to app initialization.
    #[arg(long, value_name = "ID", default_value = "tickbox")]
    pub attach: String,

    /// JSON file with initialization options (`attachPoint`, `storageKey`, ...).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show items, optionally filtered.
    List {
        #[arg(long, value_name = "MODE", default_value_t = ShowMode::All)]
        filter: ShowMode,
    },

    /// Add an item.
    Add { title: String },

    /// Replace the title of item N.
    Edit { index: usize, title: String },

    /// Flip item N between active and completed.
    Toggle { index: usize },

    /// Mark every item completed (or active with --off).
    #[command(name = "toggle-all")]
    ToggleAll {
        #[arg(long)]
        off: bool,
    },

    /// Delete item N.
    Remove { index: usize },

    /// Delete every completed item.
    #[command(name = "clear-completed")]
    ClearCompleted,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json_logs);
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out)
}

/// Load the list, apply one command, and drain pending saves.
///
/// A command that fails leaves the stored list as it was.
pub fn execute(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let rejected: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let app = open(cli, &rejected)?;
    let list = app.list();

    match &cli.command {
        Commands::List { filter } => {
            app.navigate(FilterRouter::path_for(*filter));
            print_list(list, out)?;
        }
        Commands::Add { title } => match list.add_title(title.as_str()) {
            Some(item) => {
                let n = list.len();
                writeln!(out, "added {n}. {}", item.title())?;
            }
            None => return Err(rejection(&app, &rejected, "title is empty")),
        },
        Commands::Edit { index, title } => {
            let item = nth(list, *index)?;
            list.edit_item(&item);
            item.set_title(title.as_str());
            match list.stop_editing(&item) {
                EditOutcome::Removed => writeln!(out, "removed {index}")?,
                EditOutcome::Committed => writeln!(out, "updated {index}. {}", item.title())?,
                EditOutcome::Rejected => return Err(rejection(&app, &rejected, "title rejected")),
            }
        }
        Commands::Toggle { index } => {
            let item = nth(list, *index)?;
            item.toggle();
            writeln!(out, "{}", line(*index, &item))?;
        }
        Commands::ToggleAll { off } => {
            list.set_all_completed(!off)?;
            writeln!(
                out,
                "{} {} marked {}",
                list.len(),
                TodoList::item_label(list.len()),
                if *off { "active" } else { "completed" }
            )?;
        }
        Commands::Remove { index } => {
            let item = nth(list, *index)?;
            list.remove(&item);
            writeln!(out, "removed {index}")?;
        }
        Commands::ClearCompleted => {
            let removed = list.remove_completed();
            writeln!(out, "cleared {removed} completed {}", TodoList::item_label(removed))?;
        }
    }

    app.shutdown_flush();
    Ok(())
}

fn open(cli: &Cli, rejected: &Rc<RefCell<Option<String>>>) -> Result<App> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| CliError::ConfigFile {
                path: path.clone(),
                source,
            })?;
            AppConfig::from_json(&text)?
        }
        None => AppConfig::default(),
    };
    if config.attach_point.is_none() {
        config.attach_point = Some(cli.attach.clone());
    }

    // A configured transient reporter keeps its message on the app notice.
    if !matches!(config.validation_error_handler, ReporterChoice::Transient) {
        let slot = Rc::clone(rejected);
        let reporter: Rc<dyn ErrorReporter> = Rc::new(move |message: &str| {
            slot.replace(Some(message.to_owned()));
        });
        config = config.with_reporter(reporter);
    }
    let store = Rc::new(FileStore::new(&cli.store));
    tracing::debug!(store = %cli.store.display(), "opening list");
    Ok(App::init(config, store)?)
}

fn nth(list: &TodoList, index: usize) -> Result<Item> {
    index
        .checked_sub(1)
        .and_then(|i| list.get(i))
        .ok_or(CliError::NoSuchItem {
            index,
            len: list.len(),
        })
}

fn rejection(app: &App, slot: &Rc<RefCell<Option<String>>>, fallback: &str) -> CliError {
    let message = slot.borrow_mut().take().or_else(|| app.notice());
    CliError::rejected(message.unwrap_or_else(|| fallback.to_owned()))
}

fn line(index: usize, item: &Item) -> String {
    let mark = if item.is_completed() { 'x' } else { ' ' };
    format!("{index}. [{mark}] {}", item.title())
}

fn print_list(list: &TodoList, out: &mut impl Write) -> io::Result<()> {
    for item in list.filtered_items() {
        if let Some(position) = list.position(&item) {
            writeln!(out, "{}", line(position + 1, &item))?;
        }
    }
    let remaining = list.remaining_count();
    write!(out, "{remaining} {} left", TodoList::item_label(remaining))?;
    let completed = list.completed_count();
    if completed > 0 {
        write!(out, ", {completed} completed")?;
    }
    writeln!(out)
}
