use std::fmt::Display;

use anyhow::Context;

use crate::{backend::Backend, task::AnswerSource};

/// Average share of answers judged valid, per source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub sqa3d: f64,
    pub llm: f64,
}

impl ScoreSummary {
    pub async fn fetch(backend: &impl Backend) -> anyhow::Result<Self> {
        let sqa3d = backend
            .average_score(AnswerSource::Sqa3d)
            .await
            .context("Failed to fetch SQA3D average")?;
        let llm = backend
            .average_score(AnswerSource::Gemini)
            .await
            .context("Failed to fetch LLM average")?;
        Ok(Self {
            sqa3d: sqa3d.unwrap_or(0.0),
            llm: llm.unwrap_or(0.0),
        })
    }

    pub fn percentage(score: f64) -> String {
        format!("{:.1}%", score * 100.0)
    }
}

impl Display for ScoreSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Average scores")?;
        writeln!(
            f,
            "  {:<6} {:>7}",
            AnswerSource::Sqa3d.display_name(),
            Self::percentage(self.sqa3d)
        )?;
        write!(
            f,
            "  {:<6} {:>7}",
            AnswerSource::Gemini.display_name(),
            Self::percentage(self.llm)
        )
    }
}
