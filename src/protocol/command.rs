//! Decoded client commands.

use bytes::Bytes;
use std::fmt;

/// An ordered sequence of arguments sent by a client, e.g.
/// `["SET", "k", "v", "PX", "100"]`.
///
/// Arguments are binary-safe. A command is immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command from already-split arguments.
    pub fn new(args: Vec<Bytes>) -> Self {
        Self { args }
    }

    /// The verb, if any arguments were sent.
    pub fn name(&self) -> Option<&[u8]> {
        self.args.first().map(|b| b.as_ref())
    }

    /// Argument at `index`, counting the verb as index 0.
    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    /// All arguments including the verb.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of arguments including the verb.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl<T: Into<Bytes>> FromIterator<T> for Command {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}
