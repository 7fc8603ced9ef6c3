use crate::core::message::{Message, Role};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends settled exchanges to a plain-text transcript file.
pub struct TranscriptLog {
    file_path: Option<PathBuf>,
    is_active: bool,
}

impl TranscriptLog {
    pub fn disabled() -> Self {
        Self {
            file_path: None,
            is_active: false,
        }
    }

    /// Start logging to `path`, failing early if it cannot be written.
    pub fn to_file(path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let path = path.into();
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file_path: Some(path),
            is_active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn pause(&mut self) {
        self.is_active = false;
    }

    pub fn resume(&mut self) {
        self.is_active = self.file_path.is_some();
    }

    pub fn log_message(&self, message: &Message) -> Result<(), std::io::Error> {
        let Some(file_path) = self.file_path.as_ref().filter(|_| self.is_active) else {
            return Ok(());
        };
        if message.is_agent() && message.content.is_empty() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        let prefix = match message.role {
            Role::User => "You: ",
            Role::Agent => "",
            Role::System => "## ",
        };
        for (i, line) in message.content.lines().enumerate() {
            if i == 0 {
                writeln!(writer, "{prefix}{line}")?;
            } else {
                writeln!(writer, "{line}")?;
            }
        }
        // Blank line between messages
        writeln!(writer)?;
        writer.flush()
    }

    pub fn log_messages<'a>(
        &self,
        messages: impl IntoIterator<Item = &'a Message>,
    ) -> Result<(), std::io::Error> {
        for message in messages {
            self.log_message(message)?;
        }
        Ok(())
    }
}
