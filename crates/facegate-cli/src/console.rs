//! Manual lock control over standard input.
//!
//! Runs beside the recognition loop and talks to the same
//! [`LockController`], so an operator can open or close the door at any
//! time. Commands are accepted in English and Portuguese.

use std::io::{self, Write};
use std::str::FromStr;

use facegate_controller::LockController;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Transitions shown by `history`.
const HISTORY_LINES: usize = 10;

const HELP: &str = "\
Commands:
  open   | abrir   | m   open the lock (relocks after the dwell time)
  close  | fechar        close the lock now
  status                 show the lock state
  history                show recent lock transitions
  help   | ajuda         show this help
  quit   | sair          stop facegate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open,
    Close,
    Status,
    History,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "open" | "abrir" | "m" => Ok(Self::Open),
            "close" | "fechar" => Ok(Self::Close),
            "status" => Ok(Self::Status),
            "history" | "historico" => Ok(Self::History),
            "help" | "ajuda" | "?" => Ok(Self::Help),
            "quit" | "exit" | "sair" | "q" => Ok(Self::Quit),
            other => Err(format!("Unknown command '{other}', type 'help' for commands")),
        }
    }
}

/// Forward stdin lines into a channel from a dedicated thread.
///
/// Blocking reads stay off the runtime, so shutdown never waits for the
/// operator to press enter. The thread ends with stdin or when the receiver
/// is dropped.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Interactive console bound to a lock controller.
#[derive(Debug)]
pub struct Console<W> {
    controller: LockController,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(controller: LockController, out: W) -> Self {
        Self { controller, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Read commands until `quit`, end of input, or cancellation.
    ///
    /// `quit` cancels `cancel`, which stops the rest of the process too.
    pub async fn run(
        &mut self,
        mut lines: mpsc::Receiver<String>,
        cancel: &CancellationToken,
    ) -> io::Result<()> {
        writeln!(self.out, "Manual control ready, type 'help' for commands.")?;
        self.out.flush()?;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.recv() => line,
            };
            let Some(line) = line else {
                debug!("Console input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<ConsoleCommand>() {
                Ok(ConsoleCommand::Quit) => {
                    writeln!(self.out, "Shutting down...")?;
                    self.out.flush()?;
                    cancel.cancel();
                    break;
                }
                Ok(command) => self.execute(command).await?,
                Err(message) => {
                    writeln!(self.out, "{message}")?;
                    self.out.flush()?;
                }
            }
        }
        Ok(())
    }

    /// Carry out one command and print the outcome.
    pub async fn execute(&mut self, command: ConsoleCommand) -> io::Result<()> {
        match command {
            ConsoleCommand::Open => match self.controller.manual_open().await {
                Ok(transition) if transition.command_delivered => {
                    writeln!(self.out, "Lock opened.")?
                }
                Ok(_) => writeln!(self.out, "Lock opened (actuator not reached).")?,
                Err(e) => writeln!(self.out, "Not opened: {e}.")?,
            },
            ConsoleCommand::Close => match self.controller.manual_close().await {
                Ok(transition) if transition.command_delivered => {
                    writeln!(self.out, "Lock closed.")?
                }
                Ok(_) => writeln!(self.out, "Lock closed (actuator not reached).")?,
                Err(e) => writeln!(self.out, "Not closed: {e}.")?,
            },
            ConsoleCommand::Status => writeln!(self.out, "Lock is {}.", self.controller.state())?,
            ConsoleCommand::History => match self.controller.history(HISTORY_LINES).await {
                Ok(transitions) if transitions.is_empty() => {
                    writeln!(self.out, "No lock transitions yet.")?
                }
                Ok(transitions) => {
                    for transition in transitions {
                        writeln!(self.out, "  {transition}")?;
                    }
                }
                Err(e) => writeln!(self.out, "History unavailable: {e}.")?,
            },
            ConsoleCommand::Help => writeln!(self.out, "{HELP}")?,
            ConsoleCommand::Quit => {}
        }
        self.out.flush()
    }
}
