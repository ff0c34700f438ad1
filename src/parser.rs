//! Building commands and pipelines from raw lines.

use crate::command::{Command, Pipeline};
use crate::error::ParseError;
use crate::lexer::{self, Delimiters};

/// Redirection operator recognised inside a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RedirectKind {
    /// `<`: read standard input from a file.
    Input,
    /// `>`: write standard output to a file, truncating it.
    Output,
    /// `>>`: write standard output to a file, appending to it.
    Append,
}

impl RedirectKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            ">>" => Some(RedirectKind::Append),
            _ => None,
        }
    }
}

/// Builds one [`Command`] from a single pipeline stage.
///
/// The first word is the program. A redirection operator consumes the word
/// after it as its path; an operator with nothing after it is dropped.
/// Returns `None` when the stage has no words at all.
pub fn parse_command(stage: &str) -> Option<Command> {
    let mut words = lexer::tokenize(stage, Delimiters::Field).into_iter();
    let program = words.next()?.to_string();

    let mut command = Command {
        program: program.clone(),
        argv: vec![program],
        input_path: None,
        output_path: None,
        append: false,
    };

    while let Some(word) = words.next() {
        let Some(kind) = RedirectKind::from_token(word) else {
            command.argv.push(word.to_string());
            continue;
        };
        let Some(path) = words.next() else {
            break;
        };
        match kind {
            RedirectKind::Input => command.input_path = Some(path.to_string()),
            RedirectKind::Output | RedirectKind::Append => {
                command.output_path = Some(path.to_string());
                command.append = kind == RedirectKind::Append;
            }
        }
    }

    Some(command)
}

/// Parses a full input line into a [`Pipeline`].
///
/// Returns `Ok(None)` for a blank line. A pipe-delimited segment without any
/// words is rejected with [`ParseError::EmptyStage`].
pub fn parse_line(line: &str) -> Result<Option<Pipeline>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let stages = lexer::tokenize(line, Delimiters::Stage);
    let expected = line.matches('|').count() + 1;
    if stages.len() != expected {
        return Err(ParseError::EmptyStage {
            index: first_empty_stage(line),
        });
    }

    let mut commands = Vec::with_capacity(stages.len());
    for (index, stage) in stages.into_iter().enumerate() {
        commands.push(parse_command(stage).ok_or(ParseError::EmptyStage { index })?);
    }
    Ok(Pipeline::new(commands))
}

fn first_empty_stage(line: &str) -> usize {
    line.split('|')
        .position(|segment| segment.trim().is_empty())
        .unwrap_or(0)
}
