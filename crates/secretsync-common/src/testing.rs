//! Scripted console for tests

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{Console, ConsoleError};

/// Console that replays queued answers and records everything it was told
///
/// Running out of answers yields [`ConsoleError::Interrupted`], which makes an
/// unexpected prompt fail the test instead of hanging.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: Mutex<VecDeque<String>>,
    notices: Mutex<Vec<String>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console that will answer with `answers` in order
    pub fn with_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let console = Self::new();
        console
            .answers
            .lock()
            .extend(answers.into_iter().map(Into::into));
        console
    }

    pub fn push_answer(&self, answer: impl Into<String>) {
        self.answers.lock().push_back(answer.into());
    }

    /// All notices printed so far
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }

    /// All questions asked so far
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers.lock().len()
    }

    fn next_answer(&self, question: &str) -> Result<String, ConsoleError> {
        self.questions.lock().push(question.to_string());
        self.answers
            .lock()
            .pop_front()
            .ok_or(ConsoleError::Interrupted)
    }
}

impl Console for ScriptedConsole {
    fn notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }

    fn ask(&self, question: &str) -> Result<String, ConsoleError> {
        self.next_answer(question)
    }

    fn ask_hidden(&self, question: &str) -> Result<String, ConsoleError> {
        self.next_answer(question)
    }

    fn choose(&self, question: &str, options: &[String]) -> Result<usize, ConsoleError> {
        let answer = self.next_answer(question)?;
        options
            .iter()
            .position(|option| *option == answer)
            .or_else(|| answer.parse().ok().filter(|i| *i < options.len()))
            .ok_or_else(|| ConsoleError::Other(format!("'{answer}' is not one of {options:?}")))
    }
}
