use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Completed,
    Current,
    Upcoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub label: usize,
    pub state: StepState,
    /// Whether the connector leading into this step is filled. The first step has none.
    pub connector_filled: Option<bool>,
}

/// Horizontal stepper over the tasks of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressIndicator {
    current: usize,
    total: usize,
}

impl ProgressIndicator {
    pub fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }

    pub fn steps(&self) -> impl Iterator<Item = Step> + '_ {
        (0..self.total).map(|index| Step {
            index,
            label: index + 1,
            state: match index.cmp(&self.current) {
                std::cmp::Ordering::Less => StepState::Completed,
                std::cmp::Ordering::Equal => StepState::Current,
                std::cmp::Ordering::Greater => StepState::Upcoming,
            },
            connector_filled: (index > 0).then_some(index <= self.current),
        })
    }

    pub fn select(&self, index: usize) -> Option<usize> {
        (index < self.total).then_some(index)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in self.steps() {
            match step.connector_filled {
                Some(true) => out.push_str("==="),
                Some(false) => out.push_str("---"),
                None => {}
            }
            // Writing into a String cannot fail.
            let _ = match step.state {
                StepState::Completed => write!(out, "({}*)", step.label),
                StepState::Current => write!(out, "[{}]", step.label),
                StepState::Upcoming => write!(out, "({})", step.label),
            };
        }
        out
    }
}
