use crate::error::WorkerError;

/// Lifecycle of a single Strategy Worker.
///
/// `Idle -> Starting -> Running -> Stopping -> Stopped` is the only legal
/// forward path; `Error`/`Crashed` are terminal states reachable from any
/// non-terminal state. Enforced by [`transition`] rather than unchecked
/// field assignment, per the redesign note on the Python original's
/// `self.status = WorkerStatus.X` anywhere pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    Crashed,
}

impl WorkerStatus {
    fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Error | WorkerStatus::Crashed)
    }

    /// Validates `self -> next` and returns `next` on success.
    pub fn transition(self, next: WorkerStatus) -> Result<WorkerStatus, WorkerError> {
        let legal = match (self, next) {
            (a, b) if a == b => false,
            (from, WorkerStatus::Error | WorkerStatus::Crashed) if !from.is_terminal() => true,
            (WorkerStatus::Idle, WorkerStatus::Starting) => true,
            (WorkerStatus::Starting, WorkerStatus::Running) => true,
            (WorkerStatus::Running, WorkerStatus::Stopping) => true,
            (WorkerStatus::Stopping, WorkerStatus::Stopped) => true,
            // A crashed/errored worker restarting goes back through Idle.
            (WorkerStatus::Error, WorkerStatus::Idle) => true,
            (WorkerStatus::Stopped, WorkerStatus::Idle) => true,
            _ => false,
        };
        if legal {
            Ok(next)
        } else {
            Err(WorkerError::IllegalTransition { from: self, to: next })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle_is_legal() {
        let mut s = WorkerStatus::Idle;
        for next in [
            WorkerStatus::Starting,
            WorkerStatus::Running,
            WorkerStatus::Stopping,
            WorkerStatus::Stopped,
        ] {
            s = s.transition(next).unwrap();
        }
        assert_eq!(s, WorkerStatus::Stopped);
    }

    #[test]
    fn skipping_a_step_is_illegal() {
        assert!(WorkerStatus::Idle.transition(WorkerStatus::Running).is_err());
        assert!(WorkerStatus::Idle.transition(WorkerStatus::Stopped).is_err());
    }

    #[test]
    fn any_non_terminal_state_can_error_or_crash() {
        for s in [
            WorkerStatus::Idle,
            WorkerStatus::Starting,
            WorkerStatus::Running,
            WorkerStatus::Stopping,
        ] {
            assert!(s.transition(WorkerStatus::Error).is_ok());
            assert!(s.transition(WorkerStatus::Crashed).is_ok());
        }
    }

    #[test]
    fn terminal_states_do_not_self_transition_to_error() {
        assert!(WorkerStatus::Error.transition(WorkerStatus::Error).is_err());
        assert!(WorkerStatus::Crashed.transition(WorkerStatus::Crashed).is_err());
    }

    #[test]
    fn a_stopped_or_errored_worker_can_restart_via_idle() {
        assert!(WorkerStatus::Stopped.transition(WorkerStatus::Idle).is_ok());
        assert!(WorkerStatus::Error.transition(WorkerStatus::Idle).is_ok());
    }
}
