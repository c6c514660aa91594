//! Redaction and extraction of candidate items from raw materials (spec
//! §4.7). The extractor never persists anything — it hands candidates to
//! `memory::consolidator`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ids::{artifact_ref, episodic_id, semantic_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Chat,
    Diff,
    Log,
}

pub struct Material<'a> {
    pub kind: MaterialKind,
    pub text: &'a str,
}

#[derive(Debug, Clone)]
pub struct CandidateSemantic {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct CandidateEpisodic {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct CandidateArtifact {
    pub artifact_ref: String,
    pub role: String,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub semantic: Vec<CandidateSemantic>,
    pub episodic: Vec<CandidateEpisodic>,
    pub artifacts: Vec<CandidateArtifact>,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap());
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:sk|pk|key|token)[-_][A-Za-z0-9]{16,}\b").unwrap());
static LONG_HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{32,}\b").unwrap());
static LONG_B64_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9+/]{40,}={0,2}\b").unwrap());
static DECISION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:we (?:decided|will use|chose)|decision:|let's use)\b").unwrap()
});
static CONSTRAINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:must|must not|required to|constraint:)\b").unwrap());
static OPEN_QUESTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:open question:|tbd|unclear whether)\b").unwrap());
static FILE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_./-]+\.[A-Za-z0-9]+)#L(\d+)-L(\d+)").unwrap());

/// Scrubs secrets, emails, API keys, and long hex/base64 blobs before any
/// extraction runs. Idempotent: `redact(redact(x)) = redact(x)`.
pub fn redact(text: &str) -> String {
    let text = EMAIL_RE.replace_all(text, "[REDACTED_EMAIL]");
    let text = API_KEY_RE.replace_all(&text, "[REDACTED_KEY]");
    let text = LONG_HEX_RE.replace_all(&text, "[REDACTED_HEX]");
    let text = LONG_B64_RE.replace_all(&text, "[REDACTED_B64]");
    text.into_owned()
}

/// Runs redaction then all three extraction passes over one thread's
/// materials.
pub fn extract(thread_id: &str, materials: &[Material<'_>]) -> Extraction {
    let mut out = Extraction::default();

    for material in materials {
        let clean = redact(material.text);

        if material.kind == MaterialKind::Chat {
            extract_semantic(&clean, &mut out);
        }

        extract_episodic(thread_id, material.kind, &clean, &mut out);
        extract_artifacts(&clean, &mut out);
    }

    out
}

fn extract_semantic(text: &str, out: &mut Extraction) {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let kind = if DECISION_RE.is_match(trimmed) {
            "decision"
        } else if CONSTRAINT_RE.is_match(trimmed) {
            "constraint"
        } else if OPEN_QUESTION_RE.is_match(trimmed) {
            "open_question"
        } else {
            continue;
        };

        let title = normalise_title(trimmed);
        out.semantic.push(CandidateSemantic {
            id: semantic_id(kind, &title),
            kind: kind.to_string(),
            title,
            body: trimmed.to_string(),
        });
    }
}

fn extract_episodic(thread_id: &str, kind: MaterialKind, text: &str, out: &mut Extraction) {
    let source = match kind {
        MaterialKind::Chat => "chat",
        MaterialKind::Diff => "diff",
        MaterialKind::Log => "log",
    };

    for chunk in chunk_by_boundary(kind, text) {
        if chunk.trim().is_empty() {
            continue;
        }
        let hash_input = format!("{thread_id}\u{1}{chunk}");
        let id = episodic_id(&hash_input);
        out.episodic.push(CandidateEpisodic {
            id,
            kind: source.to_string(),
            title: chunk.lines().next().unwrap_or("").chars().take(80).collect(),
            snippet: chunk.to_string(),
            source: source.to_string(),
            hash: content_hash(&chunk),
        });
    }
}

fn chunk_by_boundary(kind: MaterialKind, text: &str) -> Vec<String> {
    match kind {
        MaterialKind::Chat => text.split("\n\n").map(str::to_string).collect(),
        MaterialKind::Diff => text
            .split("\n@@")
            .map(|s| s.trim_start_matches("@@").to_string())
            .collect(),
        MaterialKind::Log => text.lines().map(str::to_string).collect(),
    }
}

fn extract_artifacts(text: &str, out: &mut Extraction) {
    for cap in FILE_REF_RE.captures_iter(text) {
        let path = &cap[1];
        if path.split('/').any(|segment| segment == "..") {
            continue;
        }
        let start: u32 = cap[2].parse().unwrap_or(0);
        let end: u32 = cap[3].parse().unwrap_or(start);
        out.artifacts.push(CandidateArtifact {
            artifact_ref: artifact_ref(path, start, end),
            role: "reference".to_string(),
        });
    }
}

fn normalise_title(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .take(12)
        .collect::<Vec<_>>()
        .join(" ")
}

fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_is_idempotent() {
        let text = "contact jane@example.com with key sk-abcdef1234567890";
        assert_eq!(redact(text), redact(&redact(text)));
    }

    #[test]
    fn redact_scrubs_email_and_key() {
        let text = "contact jane@example.com with key sk-abcdef1234567890";
        let scrubbed = redact(text);
        assert!(!scrubbed.contains("jane@example.com"));
        assert!(!scrubbed.contains("sk-abcdef1234567890"));
    }

    #[test]
    fn extracts_decision_from_chat() {
        let materials = [Material {
            kind: MaterialKind::Chat,
            text: "We decided to use Postgres for storage.",
        }];
        let extraction = extract("thread-1", &materials);
        assert_eq!(extraction.semantic.len(), 1);
        assert_eq!(extraction.semantic[0].kind, "decision");
        assert!(extraction.semantic[0].body.contains("Postgres"));
    }

    #[test]
    fn extracts_artifact_reference() {
        let materials = [Material {
            kind: MaterialKind::Chat,
            text: "see src/lib.rs#L10-L20 for the implementation",
        }];
        let extraction = extract("thread-1", &materials);
        assert_eq!(extraction.artifacts.len(), 1);
        assert_eq!(extraction.artifacts[0].artifact_ref, "CODE:src/lib.rs#L10-L20");
    }

    #[test]
    fn rejects_path_traversal_in_artifact() {
        let materials = [Material {
            kind: MaterialKind::Chat,
            text: "see ../../etc/passwd#L1-L2",
        }];
        let extraction = extract("thread-1", &materials);
        assert!(extraction.artifacts.is_empty());
    }

    #[test]
    fn reingesting_identical_material_yields_same_ids() {
        let materials = [Material {
            kind: MaterialKind::Chat,
            text: "We decided to use Postgres for storage.",
        }];
        let first = extract("thread-1", &materials);
        let second = extract("thread-1", &materials);
        assert_eq!(first.semantic[0].id, second.semantic[0].id);
    }
}
