//! Blind side-by-side evaluation of SQA3D and LLM answers for 3D scenes.
//!
//! The [`player`] module is a headless video player; [`comparison`], [`progress`] and
//! [`results`] model the evaluation screens; [`backend`] talks to the hosted database.

pub mod app;
pub mod backend;
pub mod comparison;
pub mod config;
pub mod player;
pub mod progress;
pub mod results;
pub mod scores;
pub mod task;
pub mod terminal;
pub mod utils;
