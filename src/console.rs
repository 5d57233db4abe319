// src/console.rs
//! Line-oriented front-end: reads operator commands from stdin and hands
//! them to the engine thread.
use std::io::BufRead;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{error, info, warn};

use crate::types::*;
use crate::waveform::WaveformTable;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(DriverCommand),
    SelectSheet(String),
    List,
    Quit,
    Empty,
}

/// Parses one input line. Test numbers are 1-based, as printed on the sheet.
pub fn parse_command(line: &str, current_sheet: &str) -> Result<ConsoleInput, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));
    let input = match word.to_ascii_lowercase().as_str() {
        "" => ConsoleInput::Empty,
        "stop" => ConsoleInput::Command(DriverCommand::Stop),
        "verify" => ConsoleInput::Command(DriverCommand::StartVerify),
        "unverify" => ConsoleInput::Command(DriverCommand::StopVerify),
        "list" => ConsoleInput::List,
        "quit" | "exit" => ConsoleInput::Quit,
        "sheet" if !rest.is_empty() => ConsoleInput::SelectSheet(rest.to_string()),
        "run" => {
            // sheet names may contain spaces; the test number is the last word
            let (sheet, number) = rest
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| "usage: run <sheet> <test>".to_string())?;
            run(sheet.trim(), number)?
        }
        _ if word.chars().all(|c| c.is_ascii_digit()) && rest.is_empty() => {
            run(current_sheet, word)?
        }
        _ => return Err(format!("unknown command `{line}`")),
    };
    Ok(input)
}
fn run(sheet: &str, number: &str) -> Result<ConsoleInput, String> {
    let number: usize = number
        .parse()
        .map_err(|_| format!("`{number}` is not a test number"))?;
    if number == 0 {
        return Err("tests are numbered from 1".to_string());
    }
    Ok(ConsoleInput::Command(DriverCommand::Run(TestId::new(
        sheet,
        number - 1,
    ))))
}

/// Prints the sheet overview and, for the main sheet, its notes.
fn print_sheets(table: &WaveformTable, current: &str) {
    for name in table.sheet_names() {
        let marker = if name == current { "*" } else { " " };
        println!("{marker} {name}: {} test(s)", table.test_count(name));
    }
    for note in table.notes(current) {
        println!("  {}", note.label());
    }
}

/// Reads commands until `quit` or end of input, then asks the engine to shut
/// down.
pub fn run_console<R: BufRead>(
    input: R,
    table: &WaveformTable,
    commands: &Sender<DriverCommand>,
) -> Result<()> {
    let mut current = table.main_sheet().unwrap_or_default().to_string();
    if let Some(main) = table.main_sheet() {
        for note in table.notes(main) {
            println!("{}", note.label());
        }
    }
    println!("commands: <n> | run <sheet> <n> | sheet <name> | stop | verify | unverify | list | quit");
    for line in input.lines() {
        let line = line.context("failed to read console input")?;
        match parse_command(&line, &current) {
            Ok(ConsoleInput::Empty) => {}
            Ok(ConsoleInput::Quit) => break,
            Ok(ConsoleInput::List) => print_sheets(table, &current),
            Ok(ConsoleInput::SelectSheet(name)) => {
                if table.has_sheet(&name) {
                    info!("sheet `{name}` selected");
                    current = name;
                } else {
                    println!("no sheet named `{name}`");
                }
            }
            Ok(ConsoleInput::Command(command)) => {
                if let DriverCommand::Run(id) = &command {
                    if let Some(note) = table.note_for(&id.sheet, id.index) {
                        println!("{note}");
                    }
                }
                commands
                    .send(command)
                    .context("driver engine is no longer running")?
            }
            Err(message) => println!("{message}"),
        }
    }
    commands.send(DriverCommand::Shutdown).ok();
    Ok(())
}

pub fn report(message: &DriverMessage) {
    match message {
        DriverMessage::Log(text) => info!("{text}"),
        DriverMessage::State(DriverState::Idle) => info!("driver idle"),
        DriverMessage::State(DriverState::Transmitting(id)) => info!("driver running {id}"),
        DriverMessage::State(DriverState::Verifying) => info!("driver verifying actuators"),
        DriverMessage::Status(line) => info!("controller: {line}"),
        DriverMessage::WriteFailed(advice) => error!("{advice}"),
        DriverMessage::Error(text) => warn!("{text}"),
    }
}

/// Logs engine messages until the engine drops its sender.
pub fn spawn_reporter(rx: Receiver<DriverMessage>) -> JoinHandle<()> {
    thread::spawn(move || {
        for message in rx {
            report(&message);
        }
    })
}
