//! Assembles a retrieval selection into the compact structured context
//! object returned to callers (spec §4.10).

use serde::Serialize;

use crate::memory::retriever::{Item, RetrievalResult};

#[derive(Debug, Clone, Serialize, Default)]
pub struct Runbook {
    pub steps: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct WorkingSet {
    pub mission: String,
    pub constraints: Vec<String>,
    pub focus_decisions: Vec<String>,
    pub focus_tasks: Vec<String>,
    pub runbook: Runbook,
    pub artifacts: Vec<String>,
    pub citations: Vec<String>,
    pub open_questions: Vec<String>,
    pub token_estimate: u32,
}

/// `per_section_budget` applies a second, section-level cap (spec §4.10):
/// item bodies are trimmed before whole items are dropped.
pub fn build(result: &RetrievalResult, purpose: &str, per_section_budget: usize) -> WorkingSet {
    let mut constraints = Vec::new();
    let mut focus_decisions = Vec::new();
    let mut focus_tasks = Vec::new();
    let mut open_questions = Vec::new();
    let mut citations = Vec::new();

    for scored in &result.scored {
        if let Item::Semantic(row) = &scored.item {
            let body = trim_to_budget(&row.body, per_section_budget);
            match row.kind.as_str() {
                "decision" => focus_decisions.push(body),
                "constraint" => constraints.push(body),
                "open_question" => open_questions.push(body),
                "task" => focus_tasks.push(body),
                _ => {}
            }
            citations.push(row.id.clone());
        }
    }

    focus_tasks.sort();

    WorkingSet {
        mission: purpose.to_string(),
        constraints,
        focus_decisions,
        focus_tasks,
        runbook: Runbook::default(),
        artifacts: result.artifact_refs.clone(),
        citations,
        open_questions,
        token_estimate: result.token_estimate,
    }
}

fn trim_to_budget(body: &str, budget: usize) -> String {
    if body.len() <= budget {
        body.to_string()
    } else {
        format!("{}…", &body[..budget.min(body.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::context_items::SemanticItemRow;
    use crate::memory::retriever::ScoredItem;
    use chrono::Utc;

    #[test]
    fn decisions_are_grouped_into_focus_decisions() {
        let row = SemanticItemRow {
            id: "S1".to_string(),
            thread_id: "t1".to_string(),
            kind: "decision".to_string(),
            title: "use postgres".to_string(),
            body: "use postgres for storage".to_string(),
            status: "active".to_string(),
            tags: vec![],
            links: vec![],
            salience: 0.6,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let result = RetrievalResult {
            focus_ids: vec!["S1".to_string()],
            artifact_refs: vec![],
            scored: vec![ScoredItem { item: Item::Semantic(row), score: 0.5, token_estimate: 6 }],
            token_estimate: 6,
        };
        let working_set = build(&result, "choose database", 200);
        assert_eq!(working_set.focus_decisions, vec!["use postgres for storage".to_string()]);
        assert!(working_set.focus_decisions[0].contains("Postgres") || working_set.focus_decisions[0].contains("postgres"));
    }

    #[test]
    fn long_bodies_are_trimmed_rather_than_dropped() {
        let trimmed = trim_to_budget(&"x".repeat(100), 10);
        assert_eq!(trimmed.chars().count(), 11);
    }
}
