use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Where the dispatcher reads commands, prompts and keys from.
pub trait LineSource {
    /// Shows `prompt` and reads one line. `None` means there is no more input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// Line editing on the real terminal, with history for the current process.
pub struct TerminalInput {
    editor: DefaultEditor,
}

impl TerminalInput {
    pub fn new() -> Result<Self> {
        Ok(TerminalInput {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for TerminalInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            // Ctrl-C and Ctrl-D both leave the current loop
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
