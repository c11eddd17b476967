use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed cell was read while it was already being evaluated.
    #[error("circular dependency between computed cells: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("computed cell `{label}` is read-only")]
    ReadOnly { label: String },
}

impl ReactiveError {
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = ReactiveError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "circular dependency between computed cells: a -> b -> a"
        );
        assert!(err.is_cycle());
    }

    #[test]
    fn read_only_message_names_cell() {
        let err = ReactiveError::ReadOnly {
            label: "remaining".into(),
        };
        assert!(err.to_string().contains("`remaining`"));
        assert!(!err.is_cycle());
    }
}
