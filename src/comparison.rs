use std::fmt::Display;

use log::debug;
use rand::Rng;
use thiserror::Error;

use crate::{
    progress::ProgressIndicator,
    task::{AnswerSource, TaskRecord},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("Task {index} does not exist; this scene has {total} tasks")]
    TaskOutOfRange { index: usize, total: usize },

    #[error("The votes for this comparison have already been submitted")]
    AlreadyFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskJudgment {
    pub sqa3d_valid: bool,
    pub llm_valid: bool,
}

impl TaskJudgment {
    pub fn is_valid(&self, source: AnswerSource) -> bool {
        match source {
            AnswerSource::Sqa3d => self.sqa3d_valid,
            AnswerSource::Gemini => self.llm_valid,
        }
    }

    fn set_valid(&mut self, source: AnswerSource, valid: bool) {
        match source {
            AnswerSource::Sqa3d => self.sqa3d_valid = valid,
            AnswerSource::Gemini => self.llm_valid = valid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    BothGood,
    LeftBetter,
    RightBetter,
    BothBad,
}

impl Verdict {
    pub fn of(judgment: TaskJudgment, sqa3d_on_left: bool) -> Self {
        match (judgment.sqa3d_valid, judgment.llm_valid) {
            (true, true) => Self::BothGood,
            (true, false) if sqa3d_on_left => Self::LeftBetter,
            (true, false) => Self::RightBetter,
            (false, true) if sqa3d_on_left => Self::RightBetter,
            (false, true) => Self::LeftBetter,
            (false, false) => Self::BothBad,
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BothGood => "Both are good!",
            Self::LeftBetter => "Left is better!",
            Self::RightBetter => "Right is better!",
            Self::BothBad => "Both are bad!",
        })
    }
}

/// One answer card as shown to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerPanel<'a> {
    pub source: AnswerSource,
    pub model_name: &'static str,
    pub situation: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub valid: bool,
}

/// Draws one placement per task; `true` puts the SQA3D answer on the left.
pub fn random_placements(count: usize, rng: &mut impl Rng) -> Vec<bool> {
    (0..count).map(|_| rng.gen_bool(0.5)).collect()
}

/// A blind side-by-side evaluation of the SQA3D and LLM answers for one scene.
#[derive(Debug, Clone)]
pub struct ComparisonSession {
    scene_id: String,
    sqa3d: Vec<TaskRecord>,
    llm: Vec<TaskRecord>,
    placements: Vec<bool>,
    judgments: Vec<TaskJudgment>,
    current: usize,
    finished: bool,
}

impl ComparisonSession {
    /// Only the first `min(sqa3d.len(), llm.len())` tasks of each batch are compared. Missing
    /// placements default to SQA3D on the left.
    pub fn new(
        scene_id: impl Into<String>,
        mut sqa3d: Vec<TaskRecord>,
        mut llm: Vec<TaskRecord>,
        mut placements: Vec<bool>,
    ) -> Self {
        let total = sqa3d.len().min(llm.len());
        sqa3d.truncate(total);
        llm.truncate(total);
        placements.resize(total, true);
        Self {
            scene_id: scene_id.into(),
            sqa3d,
            llm,
            placements,
            judgments: vec![TaskJudgment::default(); total],
            current: 0,
            finished: false,
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn total_tasks(&self) -> usize {
        self.judgments.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.total_tasks()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn judgment(&self, index: usize) -> Option<TaskJudgment> {
        self.judgments.get(index).copied()
    }

    pub fn sqa3d_on_left(&self, index: usize) -> bool {
        self.placements.get(index).copied().unwrap_or(true)
    }

    pub fn progress(&self) -> ProgressIndicator {
        ProgressIndicator::new(self.current, self.total_tasks())
    }

    pub fn previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    pub fn next(&mut self) -> usize {
        if !self.is_last() {
            self.current += 1;
        }
        self.current
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize, EvaluationError> {
        if index >= self.total_tasks() {
            return Err(EvaluationError::TaskOutOfRange {
                index,
                total: self.total_tasks(),
            });
        }
        self.current = index;
        Ok(index)
    }

    fn source_on(&self, side: Side) -> AnswerSource {
        match (side, self.sqa3d_on_left(self.current)) {
            (Side::Left, true) | (Side::Right, false) => AnswerSource::Sqa3d,
            (Side::Left, false) | (Side::Right, true) => AnswerSource::Gemini,
        }
    }

    /// Flips the validity of the answer shown on `side` for the current task.
    pub fn toggle(&mut self, side: Side) -> Option<bool> {
        let source = self.source_on(side);
        let valid = !self.judgments.get(self.current)?.is_valid(source);
        self.set_validity(source, valid)?;
        Some(valid)
    }

    pub fn set_validity(&mut self, source: AnswerSource, valid: bool) -> Option<()> {
        self.judgments.get_mut(self.current)?.set_valid(source, valid);
        Some(())
    }

    pub fn verdict(&self, index: usize) -> Verdict {
        let judgment = self.judgment(index).unwrap_or_default();
        Verdict::of(judgment, self.sqa3d_on_left(index))
    }

    fn panel(&self, source: AnswerSource) -> Option<AnswerPanel<'_>> {
        let record = match source {
            AnswerSource::Sqa3d => self.sqa3d.get(self.current)?,
            AnswerSource::Gemini => self.llm.get(self.current)?,
        };
        Some(AnswerPanel {
            source,
            model_name: source.display_name(),
            situation: &record.situation,
            question: &record.question,
            answer: &record.answer,
            valid: self.judgments.get(self.current)?.is_valid(source),
        })
    }

    /// Left and right answer cards for the current task.
    pub fn panels(&self) -> Option<(AnswerPanel<'_>, AnswerPanel<'_>)> {
        Some((
            self.panel(self.source_on(Side::Left))?,
            self.panel(self.source_on(Side::Right))?,
        ))
    }

    /// Closes the session and returns every record whose score changed.
    pub fn finish(&mut self) -> Result<Vec<TaskRecord>, EvaluationError> {
        if self.finished {
            return Err(EvaluationError::AlreadyFinished);
        }
        self.finished = true;

        let mut updated = Vec::new();
        for (index, judgment) in self.judgments.iter().enumerate() {
            if judgment.sqa3d_valid {
                let mut record = self.sqa3d[index].clone();
                record.apply_vote();
                updated.push(record);
            }
            if judgment.llm_valid {
                let mut record = self.llm[index].clone();
                record.apply_vote();
                updated.push(record);
            }
        }
        debug!(
            "Finished comparison of scene {} with {} positive votes",
            self.scene_id,
            updated.len()
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use crate::task::tests::task;

    use super::*;

    fn session(placements: Vec<bool>) -> ComparisonSession {
        ComparisonSession::new(
            "scene0000_00",
            vec![
                task(1, AnswerSource::Sqa3d, 0.5, 1),
                task(2, AnswerSource::Sqa3d, 0.0, 0),
                task(3, AnswerSource::Sqa3d, 1.0, 3),
            ],
            vec![
                task(11, AnswerSource::Gemini, 0.0, 0),
                task(12, AnswerSource::Gemini, 0.5, 2),
                task(13, AnswerSource::Gemini, 1.0, 1),
            ],
            placements,
        )
    }

    #[test]
    fn should_derive_verdicts() {
        let cases = [
            (false, false, true, Verdict::BothBad),
            (false, false, false, Verdict::BothBad),
            (true, true, true, Verdict::BothGood),
            (true, true, false, Verdict::BothGood),
            (true, false, true, Verdict::LeftBetter),
            (true, false, false, Verdict::RightBetter),
            (false, true, true, Verdict::RightBetter),
            (false, true, false, Verdict::LeftBetter),
        ];
        for (sqa3d_valid, llm_valid, sqa3d_on_left, expected) in cases {
            let judgment = TaskJudgment {
                sqa3d_valid,
                llm_valid,
            };
            assert_eq!(Verdict::of(judgment, sqa3d_on_left), expected);
        }
        assert_eq!(Verdict::BothBad.to_string(), "Both are bad!");
        assert_eq!(Verdict::LeftBetter.to_string(), "Left is better!");
    }

    #[test]
    fn should_compare_only_paired_tasks() {
        // given
        let sqa3d = vec![
            task(1, AnswerSource::Sqa3d, 0.0, 0),
            task(2, AnswerSource::Sqa3d, 0.0, 0),
        ];
        let llm = vec![task(11, AnswerSource::Gemini, 0.0, 0)];

        // when
        let session = ComparisonSession::new("scene", sqa3d, llm, Vec::new());

        // then
        assert_eq!(session.total_tasks(), 1);
        assert!(session.is_last());
        assert!(session.sqa3d_on_left(0));
    }

    #[test]
    fn should_saturate_navigation() {
        // given
        let mut session = session(vec![true; 3]);

        // when / then
        assert_eq!(session.previous(), 0);
        assert_eq!(session.next(), 1);
        assert_eq!(session.next(), 2);
        assert_eq!(session.next(), 2);
        assert!(session.is_last());
        assert_eq!(session.go_to(0), Ok(0));
        assert_eq!(
            session.go_to(3),
            Err(EvaluationError::TaskOutOfRange { index: 3, total: 3 })
        );
        assert_eq!(session.current(), 0);
    }

    #[test]
    fn should_toggle_answer_on_clicked_side() {
        // given
        let mut session = session(vec![false, true, true]);

        // when
        let valid = session.toggle(Side::Left);

        // then
        assert_eq!(valid, Some(true));
        assert_eq!(
            session.judgment(0),
            Some(TaskJudgment {
                sqa3d_valid: false,
                llm_valid: true
            })
        );
        assert_eq!(session.verdict(0), Verdict::LeftBetter);

        // when
        session.toggle(Side::Right);

        // then
        assert_eq!(session.verdict(0), Verdict::BothGood);

        // when
        session.toggle(Side::Left);

        // then
        assert_eq!(session.verdict(0), Verdict::RightBetter);
    }

    #[test]
    fn should_lay_out_panels_by_placement() {
        // given
        let mut session = session(vec![false, true, true]);

        // when
        let (left, right) = session.panels().unwrap();

        // then
        assert_eq!(left.source, AnswerSource::Gemini);
        assert_eq!(left.model_name, "LLM");
        assert_eq!(left.answer, "answer 11");
        assert_eq!(right.source, AnswerSource::Sqa3d);
        assert_eq!(right.answer, "answer 1");

        // when
        session.next();
        let (left, _) = session.panels().unwrap();

        // then
        assert_eq!(left.source, AnswerSource::Sqa3d);
        assert_eq!(left.answer, "answer 2");
    }

    #[test]
    fn should_submit_only_valid_answers() {
        // given
        let mut session = session(vec![true; 3]);
        session.set_validity(AnswerSource::Sqa3d, true);
        session.go_to(2).unwrap();
        session.set_validity(AnswerSource::Gemini, true);

        // when
        let updated = session.finish().unwrap();

        // then
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].id, 1);
        assert_eq!(updated[0].score, 0.75);
        assert_eq!(updated[0].votes, 2);
        assert_eq!(updated[1].id, 13);
        assert_eq!(updated[1].score, 1.0);
        assert_eq!(updated[1].votes, 2);
        assert!(updated.iter().all(|record| record.tested));
    }

    #[test]
    fn should_finish_only_once() {
        // given
        let mut session = session(vec![true; 3]);
        assert!(!session.is_finished());
        session.finish().unwrap();

        // when
        let result = session.finish();

        // then
        assert!(session.is_finished());
        assert_eq!(result, Err(EvaluationError::AlreadyFinished));
    }

    #[test]
    fn should_draw_one_placement_per_task() {
        let mut rng = StdRng::seed_from_u64(42);
        let placements = random_placements(64, &mut rng);
        assert_eq!(placements.len(), 64);
        assert!(placements.iter().any(|left| *left));
        assert!(placements.iter().any(|left| !*left));
    }
}
