use shared::DetectionLabel;

/// Labels that indicate deer or deer-adjacent wildlife.
const DEER_VOCABULARY: [&str; 9] = [
    "deer",
    "buck",
    "doe",
    "fawn",
    "antler",
    "white-tailed deer",
    "animal",
    "wildlife",
    "mammal",
];

/// Narrow subset that can justify a positive verdict on its own. Broad
/// context terms like "animal" or "wildlife" are kept as supporting
/// evidence but never flip the boolean.
const DECISIVE_LABELS: [&str; 5] = ["deer", "buck", "doe", "fawn", "white-tailed deer"];

pub const MIN_CONFIDENCE: u8 = 60;

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub deer_labels: Vec<DetectionLabel>,
    pub confidence: u8,
    pub is_deer: bool,
}

/// Decides deer relevance for one image from its detected labels.
/// Total function: an empty label set classifies as not-deer with zero
/// confidence.
pub fn classify(labels: &[DetectionLabel]) -> Classification {
    let deer_labels: Vec<DetectionLabel> = labels
        .iter()
        .filter(|label| DEER_VOCABULARY.contains(&label.name.to_lowercase().as_str()))
        .cloned()
        .collect();

    let confidence = deer_labels
        .iter()
        .map(|label| label.confidence)
        .max()
        .unwrap_or(0);

    let is_deer = deer_labels.iter().any(|label| {
        DECISIVE_LABELS.contains(&label.name.to_lowercase().as_str())
            && label.confidence >= MIN_CONFIDENCE
    });

    Classification {
        deer_labels,
        confidence,
        is_deer,
    }
}
