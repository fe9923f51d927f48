//! User-facing prompt and notice provider
//!
//! The reconciliation engine writes its decision log through [`Console::notice`]
//! and asks its questions through the other methods, so that the terminal
//! implementation and test doubles share one surface.

use crate::ConsoleError;

/// Answer to a push/pull/skip conflict question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    Push,
    Pull,
    Skip,
}

impl ConflictChoice {
    /// Parse a typed answer (`u`/`push`, `d`/`pull`, `n`/`skip`)
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "u" | "push" => Some(ConflictChoice::Push),
            "d" | "pull" => Some(ConflictChoice::Pull),
            "n" | "skip" => Some(ConflictChoice::Skip),
            _ => None,
        }
    }
}

/// Prompt provider
pub trait Console: Send + Sync {
    /// Print one line of the decision log
    fn notice(&self, message: &str);

    /// Ask a free-form question and return the trimmed answer
    fn ask(&self, question: &str) -> Result<String, ConsoleError>;

    /// Ask for a value without echoing it
    fn ask_hidden(&self, question: &str) -> Result<String, ConsoleError>;

    /// Let the user pick one of `options`, returning its index
    fn choose(&self, question: &str, options: &[String]) -> Result<usize, ConsoleError>;

    /// Yes/no question; an empty answer picks `default`
    fn confirm(&self, question: &str, default: bool) -> Result<bool, ConsoleError> {
        let hint = if default { "(Y/n)" } else { "(y/N)" };
        loop {
            let answer = self.ask(&format!("{question} {hint}"))?;
            match answer.trim().to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.notice("Please answer 'y' or 'n'"),
            }
        }
    }

    /// Three-way conflict question
    fn choose_resolution(&self) -> Result<ConflictChoice, ConsoleError> {
        loop {
            let answer = self.ask("Push (u), pull (d), or skip (n)?")?;
            match ConflictChoice::parse(&answer) {
                Some(choice) => return Ok(choice),
                None => self.notice("Please answer 'u', 'd' or 'n'"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_choice_parse() {
        assert_eq!(ConflictChoice::parse("u"), Some(ConflictChoice::Push));
        assert_eq!(ConflictChoice::parse(" Pull "), Some(ConflictChoice::Pull));
        assert_eq!(ConflictChoice::parse("skip"), Some(ConflictChoice::Skip));
        assert_eq!(ConflictChoice::parse("x"), None);
    }
}
