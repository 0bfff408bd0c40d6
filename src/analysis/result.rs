use serde::{Deserialize, Serialize};

/// Something said, with how it was said
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbalCue {
    pub timestamp: String,
    pub speaker: String,
    pub spoken_text: String,
    pub tone_analysis: String,
    pub intent_or_meaning: String,
}

/// Expression or posture observed at a point in the recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonverbalCue {
    pub timestamp: String,
    pub person: String,
    pub expression: String,
    pub body_language: String,
    pub inferred_emotion: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionSample {
    pub timestamp: String,
    pub emotion: String,
    pub confidence: f64,
    /// "Audio", "Visual" or "Both"
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationDynamics {
    pub dominance_or_control: String,
    pub rapport_level: String,
    pub conflict_points: String,
    pub supportive_behaviors: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentContext {
    pub setting_description: String,
    pub comfort_or_discomfort_signals: String,
}

/// Structured report returned by the analysis service
///
/// Every field is optional on the wire and defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub summary: String,
    pub verbal_cues: Vec<VerbalCue>,
    pub nonverbal_cues: Vec<NonverbalCue>,
    pub emotions_over_time: Vec<EmotionSample>,
    pub conversation_dynamics: ConversationDynamics,
    pub environment_context: EnvironmentContext,
    pub overall_sentiment: String,
}

impl AnalysisResult {
    /// A usable report names a summary or an overall sentiment
    pub fn has_content(&self) -> bool {
        !self.summary.trim().is_empty() || !self.overall_sentiment.trim().is_empty()
    }

    /// Fixed example report used whenever the service cannot produce one
    pub fn fallback() -> Self {
        Self {
            summary: "Sample report: the analysis service was not reachable, so this placeholder \
                      stands in. It shows a participant settling into the conversation and \
                      describing steadier days alongside some remaining unease about work."
                .to_string(),
            verbal_cues: vec![
                VerbalCue {
                    timestamp: "01:40".to_string(),
                    speaker: "Participant".to_string(),
                    spoken_text: "This week went better than I expected.".to_string(),
                    tone_analysis: "Even, relaxed".to_string(),
                    intent_or_meaning: "Reporting improvement".to_string(),
                },
                VerbalCue {
                    timestamp: "06:05".to_string(),
                    speaker: "Participant".to_string(),
                    spoken_text: "Mondays are still hard though.".to_string(),
                    tone_analysis: "Quieter, hesitant".to_string(),
                    intent_or_meaning: "Naming a lingering stressor".to_string(),
                },
            ],
            nonverbal_cues: vec![
                NonverbalCue {
                    timestamp: "01:40".to_string(),
                    person: "Participant".to_string(),
                    expression: "Slight smile".to_string(),
                    body_language: "Leaning back, arms uncrossed".to_string(),
                    inferred_emotion: "Contentment".to_string(),
                    confidence: 0.88,
                },
                NonverbalCue {
                    timestamp: "06:05".to_string(),
                    person: "Participant".to_string(),
                    expression: "Furrowed brow".to_string(),
                    body_language: "Gaze lowered".to_string(),
                    inferred_emotion: "Concern".to_string(),
                    confidence: 0.8,
                },
            ],
            emotions_over_time: vec![
                EmotionSample {
                    timestamp: "00:00".to_string(),
                    emotion: "Neutral".to_string(),
                    confidence: 0.75,
                    source: "Visual".to_string(),
                },
                EmotionSample {
                    timestamp: "06:00".to_string(),
                    emotion: "Uneasy".to_string(),
                    confidence: 0.6,
                    source: "Audio".to_string(),
                },
                EmotionSample {
                    timestamp: "12:00".to_string(),
                    emotion: "Calm".to_string(),
                    confidence: 0.85,
                    source: "Both".to_string(),
                },
            ],
            conversation_dynamics: ConversationDynamics {
                dominance_or_control: "Shared evenly".to_string(),
                rapport_level: "Warm".to_string(),
                conflict_points: "None observed".to_string(),
                supportive_behaviors: "Listener reflected feelings back and encouraged detail.".to_string(),
            },
            environment_context: EnvironmentContext {
                setting_description: "Quiet indoor room".to_string(),
                comfort_or_discomfort_signals: "Participant appears at ease".to_string(),
            },
            overall_sentiment: "Positive".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let result: AnalysisResult = serde_json::from_str(r#"{"summary":"short"}"#).unwrap();
        assert_eq!(result.summary, "short");
        assert!(result.verbal_cues.is_empty());
        assert_eq!(result.conversation_dynamics, ConversationDynamics::default());
    }

    #[test]
    fn test_fallback_is_populated() {
        let fallback = AnalysisResult::fallback();
        assert!(!fallback.summary.is_empty());
        assert_eq!(fallback.overall_sentiment, "Positive");
        assert!(!fallback.emotions_over_time.is_empty());
        assert!(fallback.has_content());
        assert!(!AnalysisResult::default().has_content());
    }
}
