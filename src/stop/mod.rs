//! Conditions that end an analysis activation after a model step.

/// What happened during one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: u64,
    pub tool_calls: usize,
    pub question_asked: bool,
    pub task_completed: bool,
}

/// Decides whether the loop stops after a step.
pub trait StopCondition: Send + Sync {
    fn should_stop(&self, outcome: &StepOutcome) -> bool;
}

/// Stop when the model made no tool calls.
pub struct NoToolCalls;

impl StopCondition for NoToolCalls {
    fn should_stop(&self, outcome: &StepOutcome) -> bool {
        outcome.tool_calls == 0
    }
}

/// Stop once the agent asked a clarifying question.
pub struct QuestionAsked;

impl StopCondition for QuestionAsked {
    fn should_stop(&self, outcome: &StepOutcome) -> bool {
        outcome.question_asked
    }
}

/// Stop once the task was completed without approval.
pub struct TaskCompleted;

impl StopCondition for TaskCompleted {
    fn should_stop(&self, outcome: &StepOutcome) -> bool {
        outcome.task_completed
    }
}

/// Stop when any inner condition fires.
pub struct AnyOf(Vec<Box<dyn StopCondition>>);

impl AnyOf {
    pub fn new(conditions: Vec<Box<dyn StopCondition>>) -> Self {
        Self(conditions)
    }
}

impl StopCondition for AnyOf {
    fn should_stop(&self, outcome: &StepOutcome) -> bool {
        self.0.iter().any(|c| c.should_stop(outcome))
    }
}

/// The loop's stop rule: no tool calls, a question, or a completed task.
pub fn default_stop_condition() -> AnyOf {
    AnyOf::new(vec![
        Box::new(NoToolCalls),
        Box::new(QuestionAsked),
        Box::new(TaskCompleted),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_going_while_tools_are_called() {
        let stop = default_stop_condition();
        let outcome = StepOutcome {
            step: 1,
            tool_calls: 2,
            ..Default::default()
        };
        assert!(!stop.should_stop(&outcome));
    }

    #[test]
    fn stops_on_text_only_step() {
        assert!(default_stop_condition().should_stop(&StepOutcome::default()));
    }

    #[test]
    fn stops_on_question_even_with_other_calls() {
        let outcome = StepOutcome {
            step: 3,
            tool_calls: 2,
            question_asked: true,
            task_completed: false,
        };
        assert!(default_stop_condition().should_stop(&outcome));
        assert!(!NoToolCalls.should_stop(&outcome));
    }

    #[test]
    fn stops_on_completion() {
        let outcome = StepOutcome {
            step: 1,
            tool_calls: 1,
            task_completed: true,
            ..Default::default()
        };
        assert!(TaskCompleted.should_stop(&outcome));
    }
}
