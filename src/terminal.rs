//! Line-oriented terminal front end for the comparison screen.

use std::{fmt::Write, str::FromStr};

use anyhow::{anyhow, bail, Context};

use crate::{
    comparison::{AnswerPanel, ComparisonSession, Side},
    player::{PlayerCommand, PlayerPhase, PlayerView},
};

pub const HELP: &str = "\
Video:       play | fwd | back | seek <0..1> | vol <0..1> | mute | fs
Answers:     left | right   (toggle whether the answer on that side is valid)
Navigation:  prev | next | goto <task number>
Session:     finish | quit | help";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// One or more commands forwarded to the video player, in order.
    Player(Vec<PlayerCommand>),
    Toggle(Side),
    Previous,
    Next,
    /// Zero-based task index.
    GoTo(usize),
    Finish,
    Quit,
    Help,
}

fn parse_unit(arg: Option<&str>, name: &str) -> anyhow::Result<f64> {
    let arg = arg.with_context(|| format!("`{name}` needs a value between 0 and 1"))?;
    arg.parse()
        .with_context(|| format!("`{arg}` is not a number"))
}

impl Input {
    pub fn parse_with_step(line: &str, seek_step_secs: f64) -> anyhow::Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("Empty command"))?;
        let arg = words.next();
        let input = match command.to_ascii_lowercase().as_str() {
            "play" | "pause" | "p" => Self::Player(vec![PlayerCommand::TogglePlayback]),
            "fwd" | "f" => Self::Player(vec![PlayerCommand::SeekRelative(seek_step_secs)]),
            "back" | "b" => Self::Player(vec![PlayerCommand::SeekRelative(-seek_step_secs)]),
            "seek" => Self::Player(vec![
                PlayerCommand::BeginScrub,
                PlayerCommand::SeekToFraction(parse_unit(arg, "seek")?),
                PlayerCommand::EndScrub,
            ]),
            "vol" | "volume" => {
                Self::Player(vec![PlayerCommand::SetVolume(parse_unit(arg, "vol")?)])
            }
            "mute" | "m" => Self::Player(vec![PlayerCommand::ToggleMute]),
            "fs" | "fullscreen" => Self::Player(vec![PlayerCommand::ToggleFullscreen]),
            "left" | "l" => Self::Toggle(Side::Left),
            "right" | "r" => Self::Toggle(Side::Right),
            "prev" => Self::Previous,
            "next" | "n" => Self::Next,
            "goto" | "g" => {
                let number: usize = arg
                    .context("`goto` needs a task number")?
                    .parse()
                    .context("Task number must be a positive integer")?;
                if number == 0 {
                    bail!("Task numbers start at 1");
                }
                Self::GoTo(number - 1)
            }
            "finish" | "submit" => Self::Finish,
            "quit" | "q" | "exit" => Self::Quit,
            "help" | "h" | "?" => Self::Help,
            other => bail!("Unknown command `{other}`; type `help` for a list"),
        };
        Ok(input)
    }
}

impl FromStr for Input {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_step(s, 10.0)
    }
}

pub fn render_player(view: &PlayerView) -> String {
    match &view.phase {
        PlayerPhase::Uninitialized => "[video] no source".to_string(),
        PlayerPhase::Loading => "[video] loading...".to_string(),
        PlayerPhase::Failed(err) => format!("[video] unavailable: {err}"),
        PlayerPhase::Ready => {
            let state = &view.state;
            let mut line = format!(
                "[video] {} {} / {}  vol {:.0}%",
                if state.is_playing { "playing" } else { "paused " },
                view.elapsed,
                view.duration,
                state.volume * 100.0
            );
            if state.is_fullscreen {
                line.push_str("  [fullscreen]");
            }
            if !state.controls_visible {
                line.push_str("  (controls hidden)");
            }
            line
        }
    }
}

fn render_panel(out: &mut String, side: &str, panel: &AnswerPanel<'_>) {
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "{side} [{}]\n  Situation: {}\n  Question:  {}\n  Answer:    {}",
        if panel.valid { "x" } else { " " },
        panel.situation,
        panel.question,
        panel.answer
    );
}

pub fn render_task(session: &ComparisonSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Scene {}", session.scene_id());
    let _ = writeln!(out, "{}", session.progress().render());
    let Some((left, right)) = session.panels() else {
        out.push_str("No tasks to compare.\n");
        return out;
    };
    render_panel(&mut out, "Left ", &left);
    render_panel(&mut out, "Right", &right);
    let _ = writeln!(out, "{}", session.verdict(session.current()));
    out
}
