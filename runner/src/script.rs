use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::Path,
};

pub const DEFAULT_INTERPRETER: &str = "#!/bin/bash";

/// Run script template.
///
/// The rendered script is always: interpreter line, preambles, engine
/// invocation, postambles. Sections are separated by a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScript {
    interpreter: String,
    preambles: Vec<String>,
    invocation: Vec<String>,
    postambles: Vec<String>,
}

impl Default for RunScript {
    fn default() -> Self {
        Self::new()
    }
}

impl RunScript {
    pub fn new() -> Self {
        Self {
            interpreter: String::from(DEFAULT_INTERPRETER),
            preambles: Vec::new(),
            invocation: Vec::new(),
            postambles: Vec::new(),
        }
    }

    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn preambles<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preambles.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn invocation<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn postambles<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.postambles.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn render(&self) -> String {
        let mut script = format!("{}\n", self.interpreter);

        for section in [&self.preambles, &self.invocation, &self.postambles] {
            if section.is_empty() {
                continue;
            }

            script.push('\n');
            for line in section {
                script.push_str(line);
                script.push('\n');
            }
        }

        script
    }

    /// write the script to `path` and mark it executable
    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render())?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }
}
