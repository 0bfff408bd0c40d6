//! Hand-off of finalized recordings to the analysis service

pub mod client;
pub mod result;

pub use client::{decode_response, strip_code_fence, AnalysisClient, AnalysisError};
pub use result::{
    AnalysisResult, ConversationDynamics, EmotionSample, EnvironmentContext, NonverbalCue, VerbalCue,
};
