use crate::maint::error::{MaintError, Result};
use std::io::{self, BufRead, Write};
use tracing::warn;

/// Source of operator answers. The console implementation blocks on stdin;
/// tests script the answers.
pub trait Confirmer {
    /// Shows `prompt` and returns one line of input without the line ending.
    /// End of input yields an empty answer.
    fn ask(&mut self, prompt: &str) -> io::Result<String>;
}

#[derive(Debug, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        let mut out = io::stdout().lock();
        write!(out, "{prompt} ")?;
        out.flush()?;
        drop(out);

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// `true` without asking when `auto_confirmed`; otherwise only an explicit
/// `y`/`yes` (any case, surrounding blanks ignored) confirms.
pub fn confirm(console: &mut dyn Confirmer, prompt: &str, auto_confirmed: bool) -> bool {
    if auto_confirmed {
        return true;
    }
    match console.ask(prompt) {
        Ok(answer) => is_yes(&answer),
        Err(e) => {
            warn!("attempt=confirm outcome=input_error err={e}");
            false
        }
    }
}

fn is_yes(answer: &str) -> bool {
    let t = answer.trim();
    t.eq_ignore_ascii_case("y") || t.eq_ignore_ascii_case("yes")
}

/// Prints `candidates` as a 1-based list under `heading` and returns the
/// 0-based index the operator picked.
pub fn select<T: AsRef<str>>(
    console: &mut dyn Confirmer,
    heading: &str,
    candidates: &[T],
) -> Result<usize> {
    println!("{heading}");
    for (i, c) in candidates.iter().enumerate() {
        println!("  [{}] {}", i + 1, c.as_ref());
    }
    let answer = console
        .ask(&format!("Select 1-{}:", candidates.len()))
        .map_err(MaintError::Console)?;
    parse_selection(&answer, candidates.len())
}

fn parse_selection(answer: &str, len: usize) -> Result<usize> {
    let invalid = || MaintError::InvalidSelection {
        input: answer.trim().to_string(),
        max: len,
    };
    let n: usize = answer.trim().parse().map_err(|_| invalid())?;
    if n == 0 || n > len {
        return Err(invalid());
    }
    Ok(n - 1)
}
