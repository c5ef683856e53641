//! Command dispatch.
//!
//! A [`Session`] runs either one command given on the command line, or an interactive loop
//! reading commands from its [`LineSource`]. The `ask` command opens a nested loop in which
//! each non-blank line is sent to the model and the answer is streamed back.

use anyhow::Result;
use colored::Colorize;
use futures::StreamExt;
use std::str::FromStr;
use tracing::debug;

use crate::api::{FragmentStream, ResponseStreamer};
use crate::config::ConfigStore;
use crate::console::Console;
use crate::error::{Error, UnknownCommand};
use crate::input::LineSource;
use crate::spinner::Spinner;

const USAGE: &str = "Usage: gemini-cli [setkey | ask | resetkey | help]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetKey,
    Ask,
    ResetKey,
    Help,
    /// `quit` or `exit`; only meaningful inside a loop.
    Quit,
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "setkey" => Ok(Command::SetKey),
            "ask" => Ok(Command::Ask),
            "resetkey" => Ok(Command::ResetKey),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(UnknownCommand(s.trim().to_string())),
        }
    }
}

/// How the program was asked to run, decided from its positional arguments.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    Interactive,
    Once(Command),
    Usage(String),
}

impl Invocation {
    pub fn from_args(args: &[String]) -> Self {
        match args {
            [] => Invocation::Interactive,
            [word] => match word.parse::<Command>() {
                Ok(Command::Quit) => Invocation::Usage(UnknownCommand(word.clone()).to_string()),
                Ok(command) => Invocation::Once(command),
                Err(e) => Invocation::Usage(e.to_string()),
            },
            _ => Invocation::Usage(format!("Expected a single command, got {}.", args.len())),
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct Session<S, L> {
    store: ConfigStore,
    streamer: S,
    input: L,
    console: Console,
}

impl<S: ResponseStreamer, L: LineSource> Session<S, L> {
    pub fn new(store: ConfigStore, streamer: S, input: L, console: Console) -> Self {
        Session {
            store,
            streamer,
            input,
            console,
        }
    }

    pub async fn run(&mut self, args: &[String]) -> Result<()> {
        match Invocation::from_args(args) {
            Invocation::Interactive => self.interactive().await,
            Invocation::Once(command) => self.execute(command).await.map(|_| ()),
            Invocation::Usage(message) => {
                self.console.error(message);
                self.console.line(USAGE);
                Ok(())
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<Flow> {
        debug!("executing {:?}", command);
        match command {
            Command::SetKey => self.set_api_key()?,
            Command::Ask => self.ask_questions().await?,
            Command::ResetKey => self.reset_api_key()?,
            Command::Help => self.help(),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Reads commands until `quit`, `exit` or end of input.
    pub async fn interactive(&mut self) -> Result<()> {
        self.console
            .heading("Gemini CLI. Type 'help' for a list of commands, 'quit' to leave.");
        let prompt = format!("{} ", "gemini>".cyan().bold());

        while let Some(line) = self.input.read_line(&prompt)? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if let Flow::Quit = self.execute(command).await? {
                        break;
                    }
                }
                Err(e) => self.console.error(e),
            }
        }

        self.console.notice("Goodbye!");
        Ok(())
    }

    /// The ask sub-loop: every non-blank line is one request to the model.
    pub async fn ask_questions(&mut self) -> Result<()> {
        self.console
            .heading("Ask your questions (type 'exit' or 'quit' to stop):");
        let prompt = format!("{} ", ">".cyan().bold());

        loop {
            self.console.blank();
            let Some(line) = self.input.read_line(&prompt)? else {
                break;
            };
            if matches!(line.parse::<Command>(), Ok(Command::Quit)) {
                break;
            }
            if line.trim().is_empty() {
                self.console.error("Please enter a valid prompt.");
                continue;
            }
            self.generate_response(&line).await?;
        }

        self.console.notice("Exiting...");
        Ok(())
    }

    pub fn set_api_key(&mut self) -> Result<()> {
        let prompt = format!("{} ", "Please enter your Gemini API key:".yellow().bold());
        let Some(key) = self.input.read_line(&prompt)? else {
            self.console.notice("No API key entered.");
            return Ok(());
        };

        let key = key.trim();
        if key.is_empty() {
            self.console.error("API key cannot be empty.");
            return Ok(());
        }

        self.store.set_api_key(key)?;
        self.console.success("API key saved!");
        Ok(())
    }

    pub fn reset_api_key(&self) -> Result<()> {
        if self.store.reset_api_key()? {
            self.console.notice("API key reset!");
        } else {
            self.console.error("No API key found to reset.");
        }
        Ok(())
    }

    pub fn help(&self) {
        let commands = [
            ("setkey", "Save your Gemini API key to the config file"),
            ("ask", "Ask questions; type 'exit' or 'quit' to stop"),
            ("resetkey", "Remove the saved API key"),
            ("help", "Show this help message"),
        ];

        self.console.heading("Gemini CLI");
        self.console.line(USAGE);
        self.console.blank();
        self.console.line("Commands:".bold());
        for (name, description) in commands {
            self.console
                .line(format!("  {}  {}", format!("{:<9}", name).cyan(), description));
        }
        self.console.blank();
        self.console.line(format!(
            "Run without a command for interactive mode, where the same commands are read from\n\
             a prompt and 'quit' leaves. The API key is stored in {}.",
            self.store.path().display()
        ));
    }

    /// Sends one prompt and renders the answer. Problems with the remote service are shown
    /// to the user and swallowed; a broken config file is returned to the caller.
    pub async fn generate_response(&self, prompt: &str) -> Result<()> {
        let config = self.store.load()?;
        let Some(api_key) = config.api_key.filter(|key| !key.trim().is_empty()) else {
            self.console.error(Error::MissingApiKey);
            return Ok(());
        };

        if let Err(e) = self.stream_to_console(prompt, &api_key).await {
            debug!("generation failed: {:?}", e);
            self.console.error(format!("Error: {}", e));
        }
        Ok(())
    }

    async fn stream_to_console(&self, prompt: &str, api_key: &str) -> Result<(), Error> {
        let spinner = Spinner::start(self.console.clone(), "Loading...");
        let opened = self.open_stream(prompt, api_key).await;
        spinner.stop().await;

        let (first, mut rest) = opened?;
        let mut rendered = 0;
        if let Some(fragment) = first {
            self.console.fragment(&fragment);
            rendered += 1;
        }
        while let Some(fragment) = rest.next().await {
            self.console.fragment(&fragment?);
            rendered += 1;
        }
        debug!("rendered {} fragments", rendered);
        Ok(())
    }

    /// Starts the request and waits for the first fragment, which is how long the spinner runs.
    async fn open_stream(
        &self,
        prompt: &str,
        api_key: &str,
    ) -> Result<(Option<String>, FragmentStream), Error> {
        let mut fragments = self.streamer.stream_response(prompt, api_key).await?;
        let first = fragments.next().await.transpose()?;
        Ok((first, fragments))
    }
}
