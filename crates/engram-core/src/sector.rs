//! Rule-Based Sector Classifier
//!
//! Assigns a memory to 1-3 of the five cognitive sectors from light text
//! features: tense and temporal anchors, first-person markers, imperative
//! and how-to cues, and an affect lexicon. No model, no network, and the
//! same input always yields the same assignment.

use serde::{Deserialize, Serialize};

use crate::memory::Sector;

/// Score a secondary sector must reach to be assigned alongside the primary.
const SECONDARY_THRESHOLD: f32 = 0.4;

/// At most this many sectors per memory (primary included).
const MAX_SECTORS: usize = 3;

/// Temporal anchors that signal an episodic memory.
const TEMPORAL_CUES: &[&str] = &[
    "yesterday",
    "today",
    "tomorrow",
    "last week",
    "last month",
    "last year",
    "this morning",
    "tonight",
    "ago",
    "on monday",
    "on tuesday",
    "on wednesday",
    "on thursday",
    "on friday",
    "on saturday",
    "on sunday",
    "at the meeting",
    "when i",
    "when we",
];

/// Imperative / how-to cues that signal procedural knowledge.
const PROCEDURAL_CUES: &[&str] = &[
    "how to",
    "step",
    "first,",
    "then ",
    "finally",
    "install",
    "run ",
    "click",
    "configure",
    "make sure",
    "in order to",
    "you need to",
    "use the",
    "always",
    "never",
    "should",
    "recipe",
    "procedure",
    "instructions",
];

/// Affect lexicon for the emotional sector.
const AFFECT_CUES: &[&str] = &[
    "love",
    "hate",
    "fear",
    "afraid",
    "happy",
    "sad",
    "angry",
    "furious",
    "excited",
    "anxious",
    "worried",
    "frustrat",
    "delight",
    "thrilled",
    "terrible",
    "wonderful",
    "amazing",
    "awful",
    "scared",
    "proud",
    "ashamed",
    "grateful",
    "upset",
];

/// Reflection cues for the reflective sector.
const REFLECTIVE_CUES: &[&str] = &[
    "i think",
    "i believe",
    "i realize",
    "i realized",
    "i learned",
    "i wonder",
    "looking back",
    "in retrospect",
    "i should have",
    "i feel like",
    "lesson",
    "my takeaway",
    "i noticed",
    "it seems to me",
];

/// First-person markers (episodic/reflective signal).
const FIRST_PERSON: &[&str] = &["i ", "my ", "me ", "we ", "our ", "i'", "mine "];

// ============================================================================
// CLASSIFIER
// ============================================================================

/// The classifier's output: primary sector first, plus any secondaries that
/// crossed the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorAssignment {
    pub primary: Sector,
    /// All assigned sectors, primary included, primary first.
    pub sectors: Vec<Sector>,
    /// Raw per-sector scores in classifier preference order.
    pub scores: Vec<(Sector, f32)>,
}

/// Deterministic rule-based sector classifier.
#[derive(Debug, Clone, Default)]
pub struct SectorClassifier;

impl SectorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a memory's content. Ties between sectors resolve by the
    /// fixed preference order semantic > episodic > procedural > reflective
    /// > emotional.
    pub fn classify(&self, content: &str) -> SectorAssignment {
        let text = content.to_lowercase();
        let padded = format!(" {text} ");

        let first_person = count_cues(&padded, FIRST_PERSON);
        let temporal = count_cues(&padded, TEMPORAL_CUES);
        let past_tense = count_past_tense(&text);
        let procedural = count_cues(&padded, PROCEDURAL_CUES);
        let affect = count_cues(&padded, AFFECT_CUES);
        let reflective = count_cues(&padded, REFLECTIVE_CUES);

        // Saturating feature scores; each cue counts, with diminishing value.
        let episodic_score = saturate(temporal as f32 * 0.45 + past_tense as f32 * 0.2)
            * if first_person > 0 { 1.0 } else { 0.75 };
        let procedural_score = saturate(procedural as f32 * 0.35);
        let emotional_score = saturate(affect as f32 * 0.5);
        let reflective_score =
            saturate(reflective as f32 * 0.5 + (first_person.min(2) as f32) * 0.1);

        // Declarative content with no stronger signal lands in semantic.
        let cue_mass = episodic_score + procedural_score + emotional_score + reflective_score;
        let semantic_score = (0.55 - cue_mass * 0.25).max(0.15);

        // Preference order doubles as the tie-break: iterate in order and
        // keep the first argmax.
        let scores = vec![
            (Sector::Semantic, semantic_score),
            (Sector::Episodic, episodic_score),
            (Sector::Procedural, procedural_score),
            (Sector::Reflective, reflective_score),
            (Sector::Emotional, emotional_score),
        ];

        let mut primary = Sector::Semantic;
        let mut best = f32::MIN;
        for &(sector, score) in &scores {
            if score > best {
                best = score;
                primary = sector;
            }
        }

        let mut sectors = vec![primary];
        for &(sector, score) in &scores {
            if sectors.len() >= MAX_SECTORS {
                break;
            }
            if sector != primary && score >= SECONDARY_THRESHOLD {
                sectors.push(sector);
            }
        }

        SectorAssignment {
            primary,
            sectors,
            scores,
        }
    }
}

fn saturate(x: f32) -> f32 {
    x.min(1.0)
}

fn count_cues(padded_text: &str, cues: &[&str]) -> usize {
    cues.iter().filter(|cue| padded_text.contains(*cue)).count()
}

/// Crude past-tense detector: counts regular "-ed" word endings plus a few
/// frequent irregulars.
fn count_past_tense(text: &str) -> usize {
    const IRREGULAR: &[&str] = &[
        "was", "were", "went", "met", "saw", "did", "had", "said", "told", "got", "came", "took",
        "found", "made",
    ];
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| (w.len() > 3 && w.ends_with("ed")) || IRREGULAR.contains(w))
        .count()
}

// ============================================================================
// TESTS
// ============================================================================
