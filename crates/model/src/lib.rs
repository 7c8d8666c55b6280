#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod error;
mod question;

pub use question::{Difficulty, Kind, Question, QuestionSet};
