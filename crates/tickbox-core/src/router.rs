#![forbid(unsafe_code)]

//! Maps `/:filter` paths onto the list's show-mode cell.
//!
//! The task list only exposes [`ShowMode`] as a settable observable; turning
//! a location fragment into a mode is this collaborator's job.

use tickbox_reactive::Observable;

use crate::show_mode::ShowMode;

#[derive(Debug, Clone)]
pub struct FilterRouter {
    show_mode: Observable<ShowMode>,
}

impl FilterRouter {
    #[must_use]
    pub fn new(show_mode: Observable<ShowMode>) -> Self {
        Self { show_mode }
    }

    /// Resolve `path` and write the result to the show-mode cell.
    pub fn navigate(&self, path: &str) -> ShowMode {
        let mode = Self::resolve(path);
        tracing::debug!(path, %mode, "filter route");
        self.show_mode.set(mode);
        mode
    }

    /// `"#/active"`, `"/active"` and `"active"` all resolve to
    /// [`ShowMode::Active`]. Empty and unknown tokens fall back to
    /// [`ShowMode::All`].
    #[must_use]
    pub fn resolve(path: &str) -> ShowMode {
        let path = path.trim();
        let path = path.strip_prefix('#').unwrap_or(path);
        let path = path.strip_prefix('/').unwrap_or(path);
        let token = path.split(['/', '?']).next().unwrap_or_default();
        token.parse().unwrap_or_default()
    }

    #[must_use]
    pub fn path_for(mode: ShowMode) -> &'static str {
        match mode {
            ShowMode::All => "/",
            ShowMode::Active => "/active",
            ShowMode::Completed => "/completed",
        }
    }

    #[must_use]
    pub fn current(&self) -> ShowMode {
        self.show_mode.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickbox_reactive::Runtime;

    #[test]
    fn resolves_fragments() {
        assert_eq!(FilterRouter::resolve("#/active"), ShowMode::Active);
        assert_eq!(FilterRouter::resolve("/completed"), ShowMode::Completed);
        assert_eq!(FilterRouter::resolve("completed/extra"), ShowMode::Completed);
        assert_eq!(FilterRouter::resolve("/active?x=1"), ShowMode::Active);
        assert_eq!(FilterRouter::resolve("/"), ShowMode::All);
        assert_eq!(FilterRouter::resolve(""), ShowMode::All);
        assert_eq!(FilterRouter::resolve("/bogus"), ShowMode::All);
    }

    #[test]
    fn navigate_writes_cell() {
        let rt = Runtime::new();
        let mode = Observable::new(&rt, ShowMode::All);
        let router = FilterRouter::new(mode.clone());
        assert_eq!(router.navigate("#/completed"), ShowMode::Completed);
        assert_eq!(mode.get(), ShowMode::Completed);
        assert_eq!(router.current(), ShowMode::Completed);
    }

    #[test]
    fn paths_round_trip() {
        for mode in ShowMode::ALL {
            assert_eq!(FilterRouter::resolve(FilterRouter::path_for(mode)), mode);
        }
    }
}
