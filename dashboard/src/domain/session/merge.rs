//! Folding streamed chunks into the in-progress step

use agentmark::{Agent, Step, StepResult, StepType, TrackState};

use crate::core::constants::THINKING_PLACEHOLDER;

/// Whether both tracks already finished.
///
/// Only meaningful after an agent turn: a trailing user message always
/// reopens the conversation. Each track is judged by its most recent step
/// that is neither a user message nor hidden for that track.
pub fn is_terminal(steps: &[Step]) -> bool {
    let Some(last) = steps.last() else {
        return false;
    };
    if last.is_user_input() {
        return false;
    }
    let agent_steps = || steps.iter().rev().filter(|s| !s.is_user_input());

    let primary_done = agent_steps()
        .map(|s| &s.primary)
        .find(|t| !t.is_hidden)
        .is_some_and(TrackState::is_done);
    let baseline_done = agent_steps()
        .filter_map(|s| s.baseline.as_ref())
        .find(|t| !t.is_hidden)
        .is_some_and(TrackState::is_done);

    primary_done && baseline_done
}

fn pending_track(done: bool) -> TrackState {
    if done {
        TrackState {
            is_hidden: true,
            ..TrackState::default()
        }
    } else {
        TrackState {
            thought: THINKING_PLACEHOLDER.to_string(),
            ..TrackState::default()
        }
    }
}

/// Step appended while the backend works on the next turn.
///
/// A track that finished (or was already hidden) on the previous agent turn
/// stays hidden. A preceding user message reopens both tracks.
pub fn placeholder(steps: &[Step], timestamp: Option<String>) -> Step {
    let previous = steps.last().filter(|s| !s.is_user_input());
    let primary_done = previous.is_some_and(|s| s.primary.is_hidden || s.primary.is_done());
    let baseline_done = previous
        .and_then(|s| s.baseline.as_ref())
        .is_some_and(|t| t.is_hidden || t.is_done());

    Step {
        step_index: steps.len(),
        timestamp,
        primary: pending_track(primary_done),
        watermark: Default::default(),
        baseline: Some(pending_track(baseline_done)),
    }
}

pub fn track_mut(step: &mut Step, agent: Agent) -> &mut TrackState {
    match agent {
        Agent::Primary => &mut step.primary,
        Agent::Baseline => step.baseline.get_or_insert_with(TrackState::default),
    }
}

/// Replace the addressed track's structured fields with a result.
///
/// A non-empty result thought wins over the streamed one. The watermark is
/// only taken from primary results.
pub fn apply_result(step: &mut Step, agent: Agent, data: StepResult) {
    let final_answer = data.done.then(|| match data.final_answer {
        Some(answer) if !answer.is_empty() => answer,
        _ => data.thought.clone(),
    });

    let track = track_mut(step, agent);
    if !data.thought.is_empty() {
        track.thought = data.thought;
    }
    track.action = data.action;
    track.tool_details = data.observation;
    track.distribution = data.distribution;
    track.step_type = if data.done {
        StepType::Finish
    } else {
        StepType::Tool
    };
    track.final_answer = final_answer;
    track.metrics = data.metrics;

    if agent == Agent::Primary {
        step.watermark = data.watermark.unwrap_or_default();
    }
}

/// Anything beyond the placeholder arrived for this track
pub fn has_content(track: &TrackState) -> bool {
    !track.action.is_empty()
        || (!track.thought.is_empty() && track.thought != THINKING_PLACEHOLDER)
        || !track.distribution.is_empty()
        || track.is_done()
}

/// Drop the placeholder only when the turn produced nothing at all
pub fn should_rollback(step: &Step, received_result: bool) -> bool {
    !received_result
        && !has_content(&step.primary)
        && !step.baseline.as_ref().is_some_and(has_content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmark::{DistributionItem, Watermark};

    fn agent_step(primary: TrackState, baseline: TrackState) -> Step {
        Step {
            primary,
            baseline: Some(baseline),
            ..Step::default()
        }
    }

    fn finished() -> TrackState {
        TrackState {
            action: "Finish".to_string(),
            step_type: StepType::Finish,
            final_answer: Some("done".to_string()),
            ..TrackState::default()
        }
    }

    fn working() -> TrackState {
        TrackState {
            action: "Call: search".to_string(),
            ..TrackState::default()
        }
    }

    fn hidden() -> TrackState {
        TrackState {
            is_hidden: true,
            ..TrackState::default()
        }
    }

    #[test]
    fn test_terminal_requires_both_tracks() {
        assert!(!is_terminal(&[]));
        assert!(!is_terminal(&[agent_step(finished(), working())]));
        assert!(is_terminal(&[agent_step(finished(), finished())]));
    }

    #[test]
    fn test_terminal_skips_hidden_steps() {
        let steps = vec![
            agent_step(finished(), working()),
            agent_step(hidden(), finished()),
        ];
        assert!(is_terminal(&steps));
    }

    #[test]
    fn test_trailing_user_message_is_never_terminal() {
        let steps = vec![
            agent_step(finished(), finished()),
            Step::user_input(1, "and tomorrow?", None),
        ];
        assert!(!is_terminal(&steps));
    }

    #[test]
    fn test_terminal_looks_past_user_messages() {
        let steps = vec![
            agent_step(working(), working()),
            Step::user_input(1, "hurry", None),
            agent_step(finished(), finished()),
        ];
        assert!(is_terminal(&steps));
    }

    #[test]
    fn test_placeholder_hides_finished_track() {
        let steps = vec![agent_step(finished(), working())];
        let step = placeholder(&steps, Some("10:00:00".to_string()));
        assert_eq!(step.step_index, 1);
        assert!(step.primary.is_hidden);
        assert!(step.primary.thought.is_empty());
        let baseline = step.baseline.unwrap();
        assert!(!baseline.is_hidden);
        assert_eq!(baseline.thought, THINKING_PLACEHOLDER);
    }

    #[test]
    fn test_placeholder_after_user_message_reopens_tracks() {
        let steps = vec![
            agent_step(finished(), finished()),
            Step::user_input(1, "more", None),
        ];
        let step = placeholder(&steps, None);
        assert!(!step.primary.is_hidden);
        assert!(!step.baseline.unwrap().is_hidden);
    }

    #[test]
    fn test_placeholder_keeps_hidden_track_hidden() {
        let steps = vec![agent_step(hidden(), working())];
        assert!(placeholder(&steps, None).primary.is_hidden);
    }

    #[test]
    fn test_apply_result_done_sets_final_answer() {
        let mut step = placeholder(&[], None);
        apply_result(
            &mut step,
            Agent::Baseline,
            StepResult {
                thought: "Paris is sunny".to_string(),
                action: "Finish".to_string(),
                done: true,
                ..StepResult::default()
            },
        );
        let baseline = step.baseline.as_ref().unwrap();
        assert_eq!(baseline.step_type, StepType::Finish);
        assert_eq!(baseline.final_answer.as_deref(), Some("Paris is sunny"));
        assert_eq!(step.primary.thought, THINKING_PLACEHOLDER);
    }

    #[test]
    fn test_apply_result_keeps_streamed_thought_when_empty() {
        let mut step = placeholder(&[], None);
        step.primary.thought = "streamed".to_string();
        apply_result(
            &mut step,
            Agent::Primary,
            StepResult {
                action: "Call: weather".to_string(),
                observation: "22C".to_string(),
                distribution: vec![DistributionItem {
                    name: "weather".to_string(),
                    prob: 0.9,
                    is_selected: true,
                }],
                watermark: Some(Watermark {
                    bits: "11".to_string(),
                    ..Watermark::default()
                }),
                ..StepResult::default()
            },
        );
        assert_eq!(step.primary.thought, "streamed");
        assert_eq!(step.primary.tool_details, "22C");
        assert_eq!(step.primary.step_type, StepType::Tool);
        assert!(step.primary.final_answer.is_none());
        assert_eq!(step.watermark.bits, "11");
    }

    #[test]
    fn test_baseline_result_ignores_watermark() {
        let mut step = placeholder(&[], None);
        apply_result(
            &mut step,
            Agent::Baseline,
            StepResult {
                watermark: Some(Watermark {
                    bits: "01".to_string(),
                    ..Watermark::default()
                }),
                ..StepResult::default()
            },
        );
        assert!(step.watermark.bits.is_empty());
    }

    #[test]
    fn test_rollback_only_when_empty() {
        let step = placeholder(&[], None);
        assert!(should_rollback(&step, false));
        assert!(!should_rollback(&step, true));

        let mut thinking = step.clone();
        thinking.baseline.as_mut().unwrap().thought = "Let me".to_string();
        assert!(!should_rollback(&thinking, false));
    }
}
