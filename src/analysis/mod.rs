use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A classified unit of generative work derived from a request's prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    MelodyGeneration,
    ChordProgression,
    RhythmGeneration,
    Orchestration,
    StyleTransfer,
}

impl TaskKind {
    /// The task whose output supplies the finished artifact when it succeeds.
    pub const PRIMARY: TaskKind = TaskKind::MelodyGeneration;

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::MelodyGeneration => "melody_generation",
            TaskKind::ChordProgression => "chord_progression",
            TaskKind::RhythmGeneration => "rhythm_generation",
            TaskKind::Orchestration => "orchestration",
            TaskKind::StyleTransfer => "style_transfer",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceType {
    Female,
    Male,
    Unspecified,
}

impl VoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceType::Female => "female",
            VoiceType::Male => "male",
            VoiceType::Unspecified => "unspecified",
        }
    }
}

/// The ordered set of tasks identified in a prompt plus extracted musical
/// attributes. Insertion order doubles as base priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBreakdown {
    pub tasks: Vec<TaskKind>,
    pub attributes: HashMap<String, String>,
}

impl TaskBreakdown {
    fn new() -> Self {
        Self {
            tasks: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Appends a task kind unless it is already present.
    fn push_unique(&mut self, kind: TaskKind) {
        if !self.tasks.contains(&kind) {
            self.tasks.push(kind);
        }
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.tasks.contains(&kind)
    }
}

struct TaskPattern {
    kind: TaskKind,
    keywords: Vec<&'static str>,
}

/// Classifies a free-text generation prompt into a [`TaskBreakdown`].
///
/// Pure keyword matching: no model calls, no side effects. Calling
/// [`analyze`](PromptAnalyzer::analyze) twice on the same text yields an
/// identical breakdown.
pub struct PromptAnalyzer {
    patterns: Vec<TaskPattern>,
    voice_keywords: Vec<&'static str>,
    female_keywords: Vec<&'static str>,
    male_keywords: Vec<&'static str>,
    genre_keywords: Vec<&'static str>,
    mood_keywords: Vec<&'static str>,
    bpm_pattern: Regex,
}

impl PromptAnalyzer {
    pub fn new() -> Self {
        Self {
            patterns: vec![
                TaskPattern {
                    kind: TaskKind::MelodyGeneration,
                    keywords: vec![
                        "melody",
                        "melodies",
                        "melodic",
                        "tune",
                        "tunes",
                        "theme",
                        "motif",
                        "lead line",
                    ],
                },
                TaskPattern {
                    kind: TaskKind::ChordProgression,
                    keywords: vec![
                        "chord",
                        "chords",
                        "harmony",
                        "harmonies",
                        "progression",
                        "progressions",
                    ],
                },
                TaskPattern {
                    kind: TaskKind::RhythmGeneration,
                    keywords: vec![
                        "rhythm",
                        "rhythms",
                        "beat",
                        "beats",
                        "drum",
                        "drums",
                        "percussion",
                        "groove",
                    ],
                },
                TaskPattern {
                    kind: TaskKind::Orchestration,
                    keywords: vec![
                        "orchestra",
                        "orchestration",
                        "orchestral",
                        "instrument",
                        "instruments",
                        "arrangement",
                        "arrange",
                        "ensemble",
                    ],
                },
                TaskPattern {
                    kind: TaskKind::StyleTransfer,
                    keywords: vec!["style of", "in the style", "sounds like", "cover", "remix"],
                },
            ],
            voice_keywords: vec![
                "voice",
                "voices",
                "vocal",
                "vocals",
                "sing",
                "singer",
                "singers",
                "singing",
                "choir",
                "a cappella",
            ],
            female_keywords: vec!["female", "woman", "women", "soprano", "alto", "girl"],
            male_keywords: vec!["male", "man", "men", "tenor", "baritone", "boy"],
            genre_keywords: vec![
                "jazz",
                "classical",
                "rock",
                "pop",
                "electronic",
                "blues",
                "folk",
                "country",
                "hip hop",
                "ambient",
                "metal",
            ],
            mood_keywords: vec![
                "happy",
                "sad",
                "upbeat",
                "melancholic",
                "melancholy",
                "energetic",
                "calm",
                "dark",
                "dreamy",
                "romantic",
            ],
            bpm_pattern: Regex::new(r"(\d{2,3})\s*bpm").expect("static bpm pattern"),
        }
    }

    /// Classifies `prompt` into an ordered, de-duplicated task list and a
    /// set of musical attributes. Never returns an empty breakdown: when no
    /// keyword set matches, the breakdown defaults to melody generation.
    pub fn analyze(&self, prompt: &str) -> TaskBreakdown {
        let lower = prompt.to_lowercase();
        let words = tokenize(&lower);
        let mut breakdown = TaskBreakdown::new();

        for pattern in &self.patterns {
            if pattern
                .keywords
                .iter()
                .any(|k| keyword_matches(&lower, &words, k))
            {
                breakdown.push_unique(pattern.kind);
            }
        }

        // A vocal request always implies melody work, whatever else matched.
        if self
            .voice_keywords
            .iter()
            .any(|k| keyword_matches(&lower, &words, k))
        {
            breakdown.push_unique(TaskKind::MelodyGeneration);
            let voice = self.classify_voice(&words);
            breakdown
                .attributes
                .insert("voice_type".to_string(), voice.as_str().to_string());
        }

        if breakdown.tasks.is_empty() {
            breakdown.tasks.push(TaskKind::MelodyGeneration);
        }

        self.extract_attributes(&lower, &words, &mut breakdown.attributes);

        breakdown
    }

    // Precedence: female sub-keywords win over male; anything else is
    // unspecified.
    fn classify_voice(&self, words: &HashSet<&str>) -> VoiceType {
        if self.female_keywords.iter().any(|k| words.contains(k)) {
            VoiceType::Female
        } else if self.male_keywords.iter().any(|k| words.contains(k)) {
            VoiceType::Male
        } else {
            VoiceType::Unspecified
        }
    }

    fn extract_attributes(
        &self,
        lower: &str,
        words: &HashSet<&str>,
        attributes: &mut HashMap<String, String>,
    ) {
        if let Some(genre) = self
            .genre_keywords
            .iter()
            .find(|k| keyword_matches(lower, words, k))
        {
            attributes.insert("genre".to_string(), genre.to_string());
        }

        if let Some(mood) = self
            .mood_keywords
            .iter()
            .find(|k| keyword_matches(lower, words, k))
        {
            attributes.insert("mood".to_string(), mood.to_string());
        }

        if let Some(caps) = self.bpm_pattern.captures(lower) {
            attributes.insert("tempo_bpm".to_string(), caps[1].to_string());
        }
        if words.contains("fast") || words.contains("uptempo") {
            attributes.insert("tempo_feel".to_string(), "fast".to_string());
        } else if words.contains("slow") || words.contains("slowly") {
            attributes.insert("tempo_feel".to_string(), "slow".to_string());
        }
    }
}

impl Default for PromptAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(lower: &str) -> HashSet<&str> {
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect()
}

// Single-word keywords match whole words only ("beat" must not fire on
// "upbeat", "man" must not fire on "romantic"); phrases fall back to
// substring matching.
fn keyword_matches(lower: &str, words: &HashSet<&str>, keyword: &str) -> bool {
    if keyword.contains(' ') {
        lower.contains(keyword)
    } else {
        words.contains(keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_task_when_nothing_matches() {
        let analyzer = PromptAnalyzer::new();
        let breakdown = analyzer.analyze("please make something nice");
        assert_eq!(breakdown.tasks, vec![TaskKind::MelodyGeneration]);
    }

    #[test]
    fn matches_are_unique_and_ordered() {
        let analyzer = PromptAnalyzer::new();
        let breakdown =
            analyzer.analyze("a melody with rich chords, a catchy melody and a driving beat");
        assert_eq!(
            breakdown.tasks,
            vec![
                TaskKind::MelodyGeneration,
                TaskKind::ChordProgression,
                TaskKind::RhythmGeneration,
            ]
        );
    }

    #[test]
    fn voice_keyword_forces_melody() {
        let analyzer = PromptAnalyzer::new();
        let breakdown = analyzer.analyze("drums with a soprano vocal on top");
        assert!(breakdown.contains(TaskKind::MelodyGeneration));
        assert_eq!(
            breakdown.attributes.get("voice_type").map(String::as_str),
            Some("female")
        );
    }

    #[test]
    fn voice_precedence_female_over_male() {
        let analyzer = PromptAnalyzer::new();
        let breakdown = analyzer.analyze("a duet for female and male singers");
        assert_eq!(
            breakdown.attributes.get("voice_type").map(String::as_str),
            Some("female")
        );
    }

    #[test]
    fn voice_without_gender_is_unspecified() {
        let analyzer = PromptAnalyzer::new();
        let breakdown = analyzer.analyze("add some vocals");
        assert_eq!(
            breakdown.attributes.get("voice_type").map(String::as_str),
            Some("unspecified")
        );
    }

    #[test]
    fn analyze_is_idempotent() {
        let analyzer = PromptAnalyzer::new();
        let prompt = "an upbeat jazz tune at 120 bpm with walking chords";
        assert_eq!(analyzer.analyze(prompt), analyzer.analyze(prompt));
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let analyzer = PromptAnalyzer::new();
        // "upbeat" must not register as a rhythm request, and "romantic"
        // must not read as a male voice.
        let breakdown = analyzer.analyze("an upbeat romantic tune with vocals");
        assert!(!breakdown.contains(TaskKind::RhythmGeneration));
        assert_eq!(
            breakdown.attributes.get("voice_type").map(String::as_str),
            Some("unspecified")
        );
    }

    #[test]
    fn extracts_musical_attributes() {
        let analyzer = PromptAnalyzer::new();
        let breakdown = analyzer.analyze("a sad classical melody at 72 bpm, slow");
        assert_eq!(
            breakdown.attributes.get("genre").map(String::as_str),
            Some("classical")
        );
        assert_eq!(
            breakdown.attributes.get("mood").map(String::as_str),
            Some("sad")
        );
        assert_eq!(
            breakdown.attributes.get("tempo_bpm").map(String::as_str),
            Some("72")
        );
        assert_eq!(
            breakdown.attributes.get("tempo_feel").map(String::as_str),
            Some("slow")
        );
    }
}
