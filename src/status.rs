use std::fmt::{Display, Formatter};

/// Outcome of a command workflow
///
/// Workflows report how they ended instead of raising; the command layer logs
/// the status and the user has already been told whatever the workflow decided
/// to tell them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// Ran to the end
    Completed,
    /// The invoker stopped answering a prompt
    Cancelled,
    /// The invoker supplied something unusable (unknown channel, bad id)
    Invalid,
    /// The platform denied the bot an action
    Forbidden,
    /// A precondition was missing or an unexpected error happened
    Failed,
}

impl Display for CommandStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Invalid => write!(f, "invalid"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(CommandStatus::Completed.to_string(), "completed");
        assert_eq!(CommandStatus::Forbidden.to_string(), "forbidden");
    }
}
