//! Decoded command invocations.

use bytes::Bytes;

/// One client request: a command name followed by positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Upper-cased command name
    name: String,
    /// Arguments in the order the client sent them
    args: Vec<Bytes>,
}

impl Command {
    /// Builds a command from the decoded frame elements.
    ///
    /// The first element names the command and is normalised to upper case.
    /// Returns `None` when there are no elements.
    pub fn from_elements(elements: Vec<Bytes>) -> Option<Self> {
        let mut elements = elements.into_iter();
        let name = elements.next()?;
        Some(Self {
            name: String::from_utf8_lossy(&name).to_ascii_uppercase(),
            args: elements.collect(),
        })
    }

    pub fn new(name: &str, args: Vec<Bytes>) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}
