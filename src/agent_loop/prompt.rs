//! Prompts sent to the model.

use crate::types::{Question, Task};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a software engineering agent working inside a single project directory.
Use the tools to inspect the project and propose the changes needed to finish the task.
All paths are relative to the project directory; paths outside it are rejected.
Changes to files, shell commands and task completion may be held for user approval.
When a tool result says a change was proposed, treat it as pending and continue planning.
If the task is ambiguous, call askQuestion and stop; you will be resumed with the answer.
When the work is done, call completeTask with a short summary.";

/// First user turn of every activation.
pub fn task_prompt(task: &Task) -> String {
    match task.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => {
            format!("Task: {}\n\n{}", task.title, description)
        }
        _ => format!("Task: {}", task.title),
    }
}

/// Single user turn carrying every answered question, used on resume.
pub fn answers_prompt(questions: &[Question]) -> Option<String> {
    let answered: Vec<String> = questions
        .iter()
        .filter_map(|q| {
            q.response
                .as_deref()
                .map(|response| format!("Q: {}\nA: {}", q.question, response))
        })
        .collect();
    if answered.is_empty() {
        return None;
    }
    Some(format!(
        "Answers to your earlier questions:\n\n{}\n\nContinue with the task.",
        answered.join("\n\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn task_prompt_includes_description() {
        let task = Task::new("t1", "p1", "Add logging").with_description("Use tracing.");
        assert_eq!(task_prompt(&task), "Task: Add logging\n\nUse tracing.");
        assert_eq!(task_prompt(&Task::new("t2", "p1", "Bare")), "Task: Bare");
    }

    #[test]
    fn answers_prompt_lists_answered_pairs_only() {
        let execution_id = Uuid::new_v4();
        let mut answered = Question::new(execution_id, "Which port?", None);
        answered.answer("8080");
        let pending = Question::new(execution_id, "Which DB?", None);

        let prompt = answers_prompt(&[answered, pending.clone()]).unwrap();
        assert!(prompt.contains("Q: Which port?\nA: 8080"));
        assert!(!prompt.contains("Which DB?"));
        assert!(answers_prompt(&[pending]).is_none());
    }
}
