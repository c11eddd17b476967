#![forbid(unsafe_code)]

//! Title validation and error reporting.
//!
//! A [`ValidationPipeline`] runs an ordered list of [`TitleRule`]s before a
//! title is accepted. The first failing rule is reported through the injected
//! [`ErrorReporter`] and the caller gets `false`; nothing is thrown.
//!
//! [`TitleRewrite`] is unrelated to pass/fail validation: it is the content
//! transform the task list applies to every title when any title is changed
//! to one containing the trigger character.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tickbox_reactive::{Observable, Runtime, Scheduler, TimerId};
use web_time::Duration;

// ─── Reporting ───────────────────────────────────────────────────────────────

/// Sink for human-readable validation failures.
pub trait ErrorReporter {
    fn report(&self, message: &str);
}

impl<F: Fn(&str)> ErrorReporter for F {
    fn report(&self, message: &str) {
        self(message);
    }
}

/// Default reporter: blocks on writing the message to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertReporter;

impl ErrorReporter for AlertReporter {
    fn report(&self, message: &str) {
        tracing::warn!(message, "validation alert");
        eprintln!("{message}");
    }
}

/// Non-blocking reporter: shows the message in an observable cell and clears
/// it after a fixed interval.
pub struct TransientReporter {
    message: Observable<Option<String>>,
    scheduler: Scheduler,
    clear_after: Duration,
    pending: Cell<Option<TimerId>>,
}

impl fmt::Debug for TransientReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientReporter")
            .field("message", &self.message.peek())
            .field("clear_after", &self.clear_after)
            .finish_non_exhaustive()
    }
}

impl TransientReporter {
    pub const DEFAULT_CLEAR_AFTER: Duration = Duration::from_millis(2000);

    pub fn new(rt: &Runtime) -> Self {
        Self {
            message: Observable::distinct(rt, None).labeled("errorMessage"),
            scheduler: rt.scheduler().clone(),
            clear_after: Self::DEFAULT_CLEAR_AFTER,
            pending: Cell::new(None),
        }
    }

    #[must_use]
    pub fn with_clear_after(mut self, clear_after: Duration) -> Self {
        self.clear_after = clear_after;
        self
    }

    /// The message currently on display.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.message.get()
    }

    #[must_use]
    pub fn message_cell(&self) -> &Observable<Option<String>> {
        &self.message
    }
}

impl ErrorReporter for TransientReporter {
    fn report(&self, message: &str) {
        if let Some(previous) = self.pending.take() {
            self.scheduler.cancel(previous);
        }
        self.message.set(Some(message.to_owned()));
        let cell = self.message.clone();
        let timer = self.scheduler.schedule(self.clear_after, move || cell.set(None));
        self.pending.set(Some(timer));
    }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title cannot contain a {0}!")]
    ForbiddenChar(char),

    #[error("{0}")]
    Rule(String),
}

/// One content check applied to a candidate title.
pub trait TitleRule {
    fn check(&self, title: &str) -> Result<(), ValidationError>;
}

impl<F: Fn(&str) -> Result<(), ValidationError>> TitleRule for F {
    fn check(&self, title: &str) -> Result<(), ValidationError> {
        self(title)
    }
}

/// Rejects titles containing a given character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForbiddenChar(pub char);

impl TitleRule for ForbiddenChar {
    fn check(&self, title: &str) -> Result<(), ValidationError> {
        if title.contains(self.0) {
            Err(ValidationError::ForbiddenChar(self.0))
        } else {
            Ok(())
        }
    }
}

/// Ordered rule chain gating title acceptance.
pub struct ValidationPipeline {
    rules: Vec<Box<dyn TitleRule>>,
    reporter: Rc<dyn ErrorReporter>,
}

impl fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::new(Rc::new(AlertReporter))
    }
}

impl ValidationPipeline {
    /// The standard pipeline: titles may not contain `p`.
    pub fn new(reporter: Rc<dyn ErrorReporter>) -> Self {
        Self::empty(reporter).with_rule(ForbiddenChar('p'))
    }

    /// A pipeline with no rules; every title passes.
    pub fn empty(reporter: Rc<dyn ErrorReporter>) -> Self {
        Self {
            rules: Vec::new(),
            reporter,
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: impl TitleRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn reporter(&self) -> &Rc<dyn ErrorReporter> {
        &self.reporter
    }

    /// First failing rule, without reporting it.
    pub fn check(&self, title: &str) -> Result<(), ValidationError> {
        self.rules.iter().try_for_each(|rule| rule.check(title))
    }

    /// Run every rule; report the first failure and return `false`.
    pub fn validate_title(&self, title: &str) -> bool {
        match self.check(title) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(title, error = %err, "title rejected");
                self.reporter.report(&err.to_string());
                false
            }
        }
    }
}

// ─── Cross-title rewrite ─────────────────────────────────────────────────────

/// Both candidate results of a rewrite, computed from the same original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteCandidates {
    pub swapped: String,
    pub digits: String,
}

/// Content transform fired when a title changes to one containing `trigger`.
///
/// For every title, `swap_from` becomes `swap_to` and, separately, every
/// character in `digits` becomes `digit_replacement`. Both results are
/// derived from the title as it was before the rewrite; the list writes them
/// in that order, so the digit result is what remains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRewrite {
    pub trigger: char,
    pub swap_from: char,
    pub swap_to: char,
    pub digits: Vec<char>,
    pub digit_replacement: char,
}

impl Default for TitleRewrite {
    fn default() -> Self {
        Self {
            trigger: 'x',
            swap_from: 'y',
            swap_to: 'z',
            digits: vec!['2', '5'],
            digit_replacement: 'a',
        }
    }
}

impl TitleRewrite {
    #[must_use]
    pub fn triggers(&self, title: &str) -> bool {
        title.contains(self.trigger)
    }

    #[must_use]
    pub fn rewrite(&self, original: &str) -> RewriteCandidates {
        let swapped = original.replace(self.swap_from, &self.swap_to.to_string());
        let digits = original
            .chars()
            .map(|c| {
                if self.digits.contains(&c) {
                    self.digit_replacement
                } else {
                    c
                }
            })
            .collect();
        RewriteCandidates { swapped, digits }
    }
}
