// Transition function of the orchestration graph
//
// `transition` is pure: given the current state and context it names the side
// effect the executor must perform for that state and the state that follows.
// It never touches a collaborator, so the whole decision tree is testable
// without a runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::{ExecutionContext, JobRecord};
use super::state::OrchestratorState;

/// Side effect attached to a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Choice states only inspect the context
    None,
    SubmitJob,
    /// Query the job service and overwrite `job`
    QueryJobStatus,
    /// Checkpoint and release control until the poll interval elapses
    Suspend,
    RunVisualization,
    SendNotification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrchestratorState,
    pub effect: Effect,
    pub next: OrchestratorState,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("State {state} is terminal and has no outgoing transition")]
    Terminal { state: OrchestratorState },
    #[error("State {state} requires a job record but none is present")]
    MissingJob { state: OrchestratorState },
    #[error("State {state} requires a visualization reference but none is present")]
    MissingVisualization { state: OrchestratorState },
    #[error("State {state} requires notification parameters but none are present")]
    MissingNotification { state: OrchestratorState },
    #[error("State {state} requires a start request but none is present")]
    MissingStartRequest { state: OrchestratorState },
}

fn job<'a>(
    state: OrchestratorState,
    ctx: &'a ExecutionContext,
) -> Result<&'a JobRecord, TransitionError> {
    ctx.job.as_ref().ok_or(TransitionError::MissingJob { state })
}

/// Compute the effect of `state` and the state that follows it
pub fn transition(
    state: OrchestratorState,
    ctx: &ExecutionContext,
) -> Result<Transition, TransitionError> {
    use OrchestratorState::*;

    let (effect, next) = match state {
        CheckStartRequest => {
            if ctx.start_request.is_none() {
                (Effect::None, CheckExistingJob)
            } else {
                (Effect::None, SubmitJob)
            }
        }
        CheckExistingJob => {
            if ctx.job.is_some() {
                (Effect::None, FetchJobDetails)
            } else {
                (Effect::None, Succeeded)
            }
        }
        FetchJobDetails => {
            job(state, ctx)?;
            (Effect::QueryJobStatus, CheckVisualization)
        }
        SubmitJob => {
            if ctx.start_request.is_none() {
                return Err(TransitionError::MissingStartRequest { state });
            }
            (Effect::SubmitJob, WaitForJob)
        }
        WaitForJob => (Effect::Suspend, PollJobStatus),
        PollJobStatus => {
            job(state, ctx)?;
            (Effect::QueryJobStatus, CheckJobFinished)
        }
        CheckJobFinished => {
            if job(state, ctx)?.is_finished {
                (Effect::None, CheckJobFailed)
            } else {
                (Effect::None, WaitForJob)
            }
        }
        CheckJobFailed => {
            if job(state, ctx)?.is_error {
                (Effect::None, CheckNotification)
            } else {
                (Effect::None, CheckVisualization)
            }
        }
        CheckVisualization => {
            if ctx.visualization.is_some() {
                (Effect::None, RunVisualization)
            } else {
                (Effect::None, CheckNotification)
            }
        }
        RunVisualization => {
            if ctx.visualization.is_none() {
                return Err(TransitionError::MissingVisualization { state });
            }
            (Effect::RunVisualization, CheckNotification)
        }
        CheckNotification => {
            if ctx.notification.is_some() {
                (Effect::None, SendNotification)
            } else {
                (Effect::None, CheckFinalOutcome)
            }
        }
        SendNotification => {
            if ctx.notification.is_none() {
                return Err(TransitionError::MissingNotification { state });
            }
            (Effect::SendNotification, CheckFinalOutcome)
        }
        CheckFinalOutcome => {
            if job(state, ctx)?.is_error {
                (Effect::None, Failed)
            } else {
                (Effect::None, Succeeded)
            }
        }
        Succeeded | Failed => return Err(TransitionError::Terminal { state }),
    };

    debug_assert!(state.successors().contains(&next));

    Ok(Transition {
        from: state,
        effect,
        next,
    })
}

/// Follow choice states until a state with an effect or a terminal state.
///
/// Returns the states visited, ending with the first non-choice state.
pub fn resolve_choices(
    mut state: OrchestratorState,
    ctx: &ExecutionContext,
) -> Result<Vec<OrchestratorState>, TransitionError> {
    let mut path = vec![state];
    while state.is_choice() {
        state = transition(state, ctx)?.next;
        path.push(state);
    }
    Ok(path)
}
