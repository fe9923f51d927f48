//! Prompt provider backed by the terminal

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use secretsync_common::{Console, ConsoleError};

const PROMPT: &str = "\x1b[36m  › \x1b[0m";

/// Console writing to stdout and reading from the terminal
///
/// Colors are only emitted when `color` is set, so piped output stays plain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConsole {
    color: bool,
}

impl TerminalConsole {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn print_question(&self, question: &str) -> Result<(), ConsoleError> {
        let mut stdout = io::stdout();
        if self.color {
            execute!(
                stdout,
                SetForegroundColor(Color::White),
                SetAttribute(Attribute::Bold),
                Print(question),
                SetAttribute(Attribute::Reset),
                ResetColor,
                Print("\n"),
            )?;
        } else {
            writeln!(stdout, "{question}")?;
        }
        Ok(())
    }

    fn read_line(&self) -> Result<String, ConsoleError> {
        let config = Config::builder().auto_add_history(false).build();
        let mut editor: Editor<(), DefaultHistory> =
            Editor::with_config(config).map_err(readline_error)?;

        let prompt = if self.color { PROMPT } else { "  › " };
        editor
            .readline(prompt)
            .map(|line| line.trim().to_string())
            .map_err(readline_error)
    }
}

impl Console for TerminalConsole {
    fn notice(&self, message: &str) {
        let mut stdout = io::stdout();
        let result = match notice_color(message).filter(|_| self.color) {
            Some(color) => execute!(
                stdout,
                SetForegroundColor(color),
                Print(message),
                ResetColor,
                Print("\n"),
            ),
            None => writeln!(stdout, "{message}"),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Failed to print notice");
        }
    }

    fn ask(&self, question: &str) -> Result<String, ConsoleError> {
        self.print_question(question)?;
        self.read_line()
    }

    fn ask_hidden(&self, question: &str) -> Result<String, ConsoleError> {
        self.print_question(question)?;
        let mut stdout = io::stdout();
        write!(stdout, "  › ")?;
        stdout.flush()?;

        terminal::enable_raw_mode()?;
        let result = read_hidden_line();
        terminal::disable_raw_mode()?;
        writeln!(stdout)?;

        result
    }

    fn choose(&self, question: &str, options: &[String]) -> Result<usize, ConsoleError> {
        if options.is_empty() {
            return Err(ConsoleError::Other(format!(
                "nothing to choose from for '{question}'"
            )));
        }

        self.print_question(question)?;
        let mut stdout = io::stdout();
        for (i, option) in options.iter().enumerate() {
            if self.color {
                execute!(
                    stdout,
                    SetForegroundColor(Color::Blue),
                    Print(format!("  [{}] ", i + 1)),
                    ResetColor,
                    Print(option),
                    Print("\n"),
                )?;
            } else {
                writeln!(stdout, "  [{}] {option}", i + 1)?;
            }
        }

        loop {
            let answer = self.read_line()?;
            match parse_choice(&answer, options) {
                Some(index) => return Ok(index),
                None => self.notice(&format!(
                    "Please enter a number between 1 and {}",
                    options.len()
                )),
            }
        }
    }
}

/// Read keys in raw mode until Enter, without echoing them
fn read_hidden_line() -> Result<String, ConsoleError> {
    let mut input = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) = event::read()?
        else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }

        match code {
            KeyCode::Enter => return Ok(input),
            KeyCode::Char('c' | 'd') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(ConsoleError::Interrupted)
            }
            KeyCode::Esc => return Err(ConsoleError::Interrupted),
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) => input.push(c),
            _ => {}
        }
    }
}

fn readline_error(e: ReadlineError) -> ConsoleError {
    match e {
        ReadlineError::Interrupted | ReadlineError::Eof => ConsoleError::Interrupted,
        ReadlineError::Io(e) => ConsoleError::Io(e),
        other => ConsoleError::Other(other.to_string()),
    }
}

/// Accept a 1-based number or an option label (case-insensitive)
fn parse_choice(answer: &str, options: &[String]) -> Option<usize> {
    match answer.parse::<usize>() {
        Ok(n) => (1..=options.len()).contains(&n).then(|| n - 1),
        Err(_) => options
            .iter()
            .position(|option| option.eq_ignore_ascii_case(answer)),
    }
}

fn notice_color(message: &str) -> Option<Color> {
    if message.starts_with("Warning:") {
        return Some(Color::Yellow);
    }
    if message.starts_with("info:") {
        return Some(Color::DarkGrey);
    }
    match message.trim_start() {
        "done" | "pulled" | "pushed" | "deleted" => Some(Color::Green),
        "skipped" => Some(Color::DarkGrey),
        _ => None,
    }
}
