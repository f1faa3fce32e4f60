use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerSource {
    #[serde(rename = "sqa3d")]
    Sqa3d,

    #[serde(rename = "gemini")]
    Gemini,
}

impl AnswerSource {
    /// Value the backend expects for `source_param`.
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Sqa3d => "sqa3d",
            Self::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Sqa3d => "SQA3D",
            Self::Gemini => "LLM",
        }
    }
}

impl Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A situation/question/answer triplet as stored in the `sqa_tasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub sceneid: String,
    pub situation: String,
    pub question: String,
    pub answer: String,
    pub source: String,
    pub split: String,
    pub score: f64,
    pub votes: u32,
    pub tested: bool,
}

/// Everything in a [`TaskRecord`] except its key, i.e. the body of a row update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskUpdate<'a> {
    pub sceneid: &'a str,
    pub situation: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub source: &'a str,
    pub split: &'a str,
    pub score: f64,
    pub votes: u32,
    pub tested: bool,
}

impl<'a> From<&'a TaskRecord> for TaskUpdate<'a> {
    fn from(value: &'a TaskRecord) -> Self {
        Self {
            sceneid: &value.sceneid,
            situation: &value.situation,
            question: &value.question,
            answer: &value.answer,
            source: &value.source,
            split: &value.split,
            score: value.score,
            votes: value.votes,
            tested: value.tested,
        }
    }
}

impl TaskRecord {
    /// Counts one "valid" vote into the running average score.
    pub fn apply_vote(&mut self) {
        let votes = f64::from(self.votes);
        self.score = (self.score * votes + 1.0) / (votes + 1.0);
        self.votes += 1;
        self.tested = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub sceneid: String,

    #[serde(default)]
    pub tasks_ids: Vec<String>,

    #[serde(default)]
    pub videourl: Option<String>,

    #[serde(default)]
    pub imageurl: Option<String>,
}
