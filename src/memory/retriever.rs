//! Multi-signal scoring and greedy selection under a token budget (spec
//! §4.9). `Item` is the tagged variant referenced in the design notes —
//! semantic, episodic, and artifact rows share one `Scored` view.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    repository::{context_items::{ArtifactRow, EpisodicItemRow, SemanticItemRow}, ContextItemRepository},
    state::AppState,
};

const RECENCY_TAU_DAYS: f64 = 14.0;

#[derive(Debug, Clone)]
pub enum Item {
    Semantic(SemanticItemRow),
    Episodic(EpisodicItemRow),
    Artifact(ArtifactRow),
}

impl Item {
    pub fn id(&self) -> &str {
        match self {
            Item::Semantic(row) => &row.id,
            Item::Episodic(row) => &row.id,
            Item::Artifact(row) => &row.artifact_ref,
        }
    }

    fn text(&self) -> &str {
        match self {
            Item::Semantic(row) => &row.body,
            Item::Episodic(row) => &row.snippet,
            Item::Artifact(row) => &row.artifact_ref,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Item::Semantic(row) => row.updated_at,
            Item::Episodic(row) => row.created_at,
            Item::Artifact(_) => Utc::now(),
        }
    }

    fn salience(&self) -> f64 {
        match self {
            Item::Semantic(row) => row.salience,
            Item::Episodic(row) => row.salience,
            Item::Artifact(_) => 0.5,
        }
    }

    fn is_decision(&self) -> bool {
        matches!(self, Item::Semantic(row) if row.kind == "decision" && matches!(row.status.as_str(), "accepted" | "active"))
    }

    fn is_failure_signal(&self) -> bool {
        matches!(self, Item::Episodic(row) if matches!(row.kind.as_str(), "incident" | "test_failure"))
    }

    fn graph_links(&self) -> usize {
        match self {
            Item::Semantic(row) => row.links.len(),
            Item::Episodic(row) => row.neighbors.len(),
            Item::Artifact(row) => row.neighbors.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: Item,
    pub score: f64,
    pub token_estimate: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub focus_ids: Vec<String>,
    pub artifact_refs: Vec<String>,
    pub scored: Vec<ScoredItem>,
    pub token_estimate: u32,
}

/// ~4 characters per token, matching `upstream::streaming::estimate_tokens`.
fn token_estimate(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil() as u32
}

fn term_overlap(a: &str, b: &str) -> f64 {
    let a_terms: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let b_terms: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if a_terms.is_empty() || b_terms.is_empty() {
        return 0.0;
    }
    let intersection = a_terms.intersection(&b_terms).count() as f64;
    let union = a_terms.union(&b_terms).count() as f64;
    intersection / union
}

pub async fn retrieve(
    state: &AppState,
    workspace: &str,
    thread_id: &str,
    purpose: &str,
    token_budget: Option<u32>,
) -> Result<RetrievalResult> {
    let db = state
        .db()
        .await
        .ok_or_else(|| crate::error::Error::Internal("database unavailable".to_string()))?;
    let repo = ContextItemRepository::new(&db);

    let mut candidates: Vec<Item> = Vec::new();
    candidates.extend(repo.semantic_for_thread(thread_id).await?.into_iter().map(Item::Semantic));
    candidates.extend(repo.episodic_for_thread(thread_id).await?.into_iter().map(Item::Episodic));
    candidates.extend(repo.artifacts_for_thread(thread_id).await?.into_iter().map(Item::Artifact));

    let item_ids: Vec<String> = candidates.iter().map(|item| item.id().to_string()).collect();
    let usage_counts = repo.usage_counts_for_items(workspace, &item_ids).await?;

    let budget = token_budget.unwrap_or(state.config().memory.default_token_budget);
    let max_items = state.config().memory.max_context_items as usize;

    Ok(select(candidates, purpose, budget, max_items, &usage_counts))
}

/// Pure scoring/selection, split out from `retrieve` so it is testable
/// without a database. `usage_counts` maps item id to its total
/// clicks+references+expansions; absent entries score as unused.
pub fn select(
    candidates: Vec<Item>,
    purpose: &str,
    token_budget: u32,
    max_items: usize,
    usage_counts: &HashMap<String, i64>,
) -> RetrievalResult {
    let now = Utc::now();
    let max_usage = usage_counts.values().copied().max().unwrap_or(0).max(1) as f64;

    let mut scored: Vec<ScoredItem> = candidates
        .into_iter()
        .map(|item| {
            let task_rel = if purpose.is_empty() { 0.0 } else { term_overlap(purpose, item.text()) };
            let decision = if item.is_decision() { 1.0 } else { 0.0 };
            let age_days = (now - item.created_at()).num_seconds().max(0) as f64 / 86_400.0;
            let recency = (-age_days / RECENCY_TAU_DAYS).exp();
            let graph_degree = (item.graph_links() as f64 / 10.0).min(1.0);
            let failure_impact = if item.is_failure_signal() { 1.0 } else { 0.0 };
            let usage = usage_counts.get(item.id()).copied().unwrap_or(0).max(0) as f64;
            let usage_freq = usage.ln_1p() / max_usage.ln_1p().max(1.0);

            let score = 0.28 * task_rel + 0.22 * decision + 0.16 * recency + 0.12 * graph_degree
                + 0.12 * failure_impact
                + 0.08 * usage_freq;
            let tokens = token_estimate(item.text());

            ScoredItem { item, score, token_estimate: tokens }
        })
        .collect();

    if purpose.is_empty() {
        scored.sort_by(|a, b| {
            b.item
                .created_at()
                .cmp(&a.item.created_at())
                .then(b.item.salience().partial_cmp(&a.item.salience()).unwrap_or(std::cmp::Ordering::Equal))
        });
    } else {
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    }

    let mut selected: Vec<ScoredItem> = Vec::new();
    let mut running_tokens = 0u32;

    for candidate in scored {
        if selected.len() >= max_items {
            break;
        }

        let redundancy = selected
            .iter()
            .map(|s| term_overlap(item_text(&s.item), item_text(&candidate.item)))
            .fold(0.0_f64, f64::max);
        let adjusted_score = candidate.score - 0.06 * redundancy;

        if running_tokens + candidate.token_estimate > token_budget && !selected.is_empty() {
            continue;
        }

        running_tokens += candidate.token_estimate;
        selected.push(ScoredItem { score: adjusted_score, ..candidate });

        if running_tokens >= token_budget {
            break;
        }
    }

    selected.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.item.salience().partial_cmp(&a.item.salience()).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.item.created_at().cmp(&a.item.created_at()))
            .then_with(|| a.item.id().cmp(b.item.id()))
    });

    let focus_ids = selected
        .iter()
        .filter(|s| !matches!(s.item, Item::Artifact(_)))
        .map(|s| s.item.id().to_string())
        .collect();
    let artifact_refs = selected
        .iter()
        .filter_map(|s| match &s.item {
            Item::Artifact(row) => Some(row.artifact_ref.clone()),
            _ => None,
        })
        .collect();

    RetrievalResult {
        focus_ids,
        artifact_refs,
        token_estimate: running_tokens,
        scored: selected,
    }
}

fn item_text(item: &Item) -> &str {
    item.text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn semantic(id: &str, body: &str, status: &str) -> Item {
        Item::Semantic(SemanticItemRow {
            id: id.to_string(),
            thread_id: "t1".to_string(),
            kind: "decision".to_string(),
            title: "use postgres".to_string(),
            body: body.to_string(),
            status: status.to_string(),
            tags: vec![],
            links: vec![],
            salience: 0.6,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn empty_purpose_orders_by_recency_and_salience() {
        let items = vec![semantic("S1", "use postgres for storage", "active")];
        let result = select(items, "", 8000, 40, &HashMap::new());
        assert_eq!(result.focus_ids, vec!["S1".to_string()]);
    }

    #[test]
    fn token_estimate_never_exceeds_budget_for_single_item_selection() {
        let items = vec![semantic("S1", "use postgres for storage and caching layers", "active")];
        let result = select(items, "choose database", 4, 40, &HashMap::new());
        assert!(result.token_estimate <= 4 || result.scored.len() == 1);
    }

    #[test]
    fn items_with_higher_usage_counts_score_above_otherwise_identical_items() {
        let low = semantic("S1", "deploy the service to staging", "active");
        let high = semantic("S2", "deploy the service to staging", "active");
        let mut usage = HashMap::new();
        usage.insert("S1".to_string(), 0);
        usage.insert("S2".to_string(), 50);

        let result = select(vec![low, high], "deploy service", 8000, 40, &usage);
        assert_eq!(result.scored[0].item.id(), "S2");
    }

    #[test]
    fn decision_status_gate_excludes_non_active_decisions_from_the_decision_bonus() {
        let active = semantic("S1", "use postgres", "active");
        let rejected = semantic("S2", "use postgres", "rejected");
        assert!(active.is_decision());
        assert!(!rejected.is_decision());
    }
}
