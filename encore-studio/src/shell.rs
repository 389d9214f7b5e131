use std::borrow::Cow::{self, Borrowed, Owned};

use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use crate::app::{Flow, Line, LineKind, StudioEvent, StudioModel, COMMANDS};

/// Completion, highlighting and hints for slash commands.
#[derive(Clone)]
struct ShellHelper {
    commands: Vec<String>,
}

impl ShellHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for ShellHelper {}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, vec![]));
        }
        let candidates = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd.clone(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Highlighter for ShellHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for ShellHelper {}

pub fn print_lines(lines: &[Line]) {
    for line in lines {
        match line.kind {
            LineKind::Heading => println!("{}", line.text.bright_magenta().bold()),
            LineKind::Info => println!("{}", line.text.bright_black()),
            LineKind::Clip => println!("{}", line.text.green()),
            LineKind::Error => eprintln!("{}", line.text.red()),
        }
    }
}

/// Read commands until `/quit` or end of input.
pub fn run(mut model: StudioModel) -> Result<()> {
    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHelper::new()));

    model.render_header();
    model.start_session()?;
    print_lines(&model.take_output());
    println!("{}", "Type a description to generate, /help for commands.".bright_black());
    println!();

    loop {
        match rl.readline("encore> ") {
            Ok(line) => {
                let event = match StudioEvent::parse(&line) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(message) => {
                        eprintln!("{}", message.yellow());
                        continue;
                    }
                };
                let _ = rl.add_history_entry(line.as_str());

                let flow = model.event(event);
                print_lines(&model.take_output());
                match flow {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => {
                        log::error!("{:#}", e);
                        eprintln!("{}", format!("Error: {:#}", e).red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type /quit to exit.".yellow());
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    println!("{}", "Goodbye!".bright_green());
    Ok(())
}
