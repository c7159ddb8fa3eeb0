use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::JobOutcome;

/// The six states of the plotting queue.
///
/// A batch normally flows IDLE → PLOTTING → WAITING_FOR_PAPER → PLOTTING …
/// → COMPLETED, with PAUSED and ERROR as operator-resolved detours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    #[default]
    Idle,
    Plotting,
    WaitingForPaper,
    Paused,
    Completed,
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Plotting => write!(f, "PLOTTING"),
            RunState::WaitingForPaper => write!(f, "WAITING_FOR_PAPER"),
            RunState::Paused => write!(f, "PAUSED"),
            RunState::Completed => write!(f, "COMPLETED"),
            RunState::Error => write!(f, "ERROR"),
        }
    }
}

/// Inputs that can move the queue between states.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Load,
    Start,
    /// The device returned for the job at the current index.
    JobFinished { outcome: JobOutcome, has_more: bool },
    PaperLoaded,
    PauseToggle,
    Skip,
}

/// Pure transition rules. Side effects (ink, persistence, device calls)
/// belong to the orchestrator.
pub struct StateMachine;

impl StateMachine {
    /// Computes the state after `event`, or the reason it is not allowed.
    ///
    /// - `Start` is only legal from `Idle`; a paused queue must be resumed first.
    /// - A successful job leaves a paused queue paused, otherwise waits for
    ///   paper or completes. A failed job always lands in `Error`.
    /// - `PaperLoaded` is only legal while waiting for paper.
    /// - `PauseToggle` resumes to `Idle` from `Paused` and pauses from anywhere else.
    /// - `Skip` never changes state but is refused mid-plot.
    pub fn next(state: RunState, event: &Event) -> Result<RunState, String> {
        match event {
            Event::Load => Ok(RunState::Idle),
            Event::Start => match state {
                RunState::Idle => Ok(RunState::Plotting),
                RunState::Paused => Err("Queue is Paused".to_string()),
                other => Err(format!("Cannot start while {other}")),
            },
            Event::JobFinished { outcome, has_more } => Ok(match outcome {
                JobOutcome::Failure(_) => RunState::Error,
                JobOutcome::Success if state == RunState::Paused => RunState::Paused,
                JobOutcome::Success if *has_more => RunState::WaitingForPaper,
                JobOutcome::Success => RunState::Completed,
            }),
            Event::PaperLoaded => match state {
                RunState::WaitingForPaper => Ok(RunState::Plotting),
                _ => Err("Not waiting for paper".to_string()),
            },
            Event::PauseToggle => Ok(match state {
                RunState::Paused => RunState::Idle,
                _ => RunState::Paused,
            }),
            Event::Skip => match state {
                RunState::Plotting => Err("Cannot skip while plotting".to_string()),
                other => Ok(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(outcome: JobOutcome, has_more: bool) -> Event {
        Event::JobFinished { outcome, has_more }
    }

    #[test]
    fn happy_path_walks_the_queue() {
        let s = StateMachine::next(RunState::Idle, &Event::Start).unwrap();
        assert_eq!(s, RunState::Plotting);

        let s = StateMachine::next(s, &finished(JobOutcome::Success, true)).unwrap();
        assert_eq!(s, RunState::WaitingForPaper);

        let s = StateMachine::next(s, &Event::PaperLoaded).unwrap();
        assert_eq!(s, RunState::Plotting);

        let s = StateMachine::next(s, &finished(JobOutcome::Success, false)).unwrap();
        assert_eq!(s, RunState::Completed);
    }

    #[test]
    fn start_requires_idle() {
        assert_eq!(
            StateMachine::next(RunState::Paused, &Event::Start),
            Err("Queue is Paused".to_string())
        );
        for state in [
            RunState::Plotting,
            RunState::WaitingForPaper,
            RunState::Completed,
            RunState::Error,
        ] {
            assert!(StateMachine::next(state, &Event::Start).is_err());
        }
    }

    #[test]
    fn pause_holds_after_successful_job() {
        let s = StateMachine::next(RunState::Paused, &finished(JobOutcome::Success, true));
        assert_eq!(s, Ok(RunState::Paused));
    }

    #[test]
    fn failure_always_errors() {
        let failure = JobOutcome::Failure("exit status 1".into());
        for state in [RunState::Plotting, RunState::Paused] {
            let s = StateMachine::next(state, &finished(failure.clone(), true));
            assert_eq!(s, Ok(RunState::Error));
        }
    }

    #[test]
    fn paper_loaded_only_when_waiting() {
        assert!(StateMachine::next(RunState::Idle, &Event::PaperLoaded).is_err());
        assert!(StateMachine::next(RunState::Plotting, &Event::PaperLoaded).is_err());
    }

    #[test]
    fn pause_toggle_round_trip() {
        let s = StateMachine::next(RunState::Plotting, &Event::PauseToggle).unwrap();
        assert_eq!(s, RunState::Paused);
        let s = StateMachine::next(s, &Event::PauseToggle).unwrap();
        assert_eq!(s, RunState::Idle);
        let s = StateMachine::next(RunState::Error, &Event::PauseToggle).unwrap();
        assert_eq!(s, RunState::Paused);
    }

    #[test]
    fn skip_refused_while_plotting() {
        assert_eq!(
            StateMachine::next(RunState::Plotting, &Event::Skip),
            Err("Cannot skip while plotting".to_string())
        );
        assert_eq!(
            StateMachine::next(RunState::WaitingForPaper, &Event::Skip),
            Ok(RunState::WaitingForPaper)
        );
    }

    #[test]
    fn load_always_resets_to_idle() {
        assert_eq!(StateMachine::next(RunState::Error, &Event::Load), Ok(RunState::Idle));
        assert_eq!(StateMachine::next(RunState::Completed, &Event::Load), Ok(RunState::Idle));
    }

    #[test]
    fn state_display() {
        assert_eq!(RunState::Idle.to_string(), "IDLE");
        assert_eq!(RunState::WaitingForPaper.to_string(), "WAITING_FOR_PAPER");
        assert_eq!(RunState::Completed.to_string(), "COMPLETED");
        assert_eq!(
            serde_json::to_string(&RunState::WaitingForPaper).unwrap(),
            "\"WAITING_FOR_PAPER\""
        );
    }
}
