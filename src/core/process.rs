//! Subprocess command builder: an immutable, additive builder so that a
//! partially-applied command (`let sudo = Command::new("sudo");`) can be
//! reused and extended safely.

use std::collections::BTreeMap;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use crate::spi::types::RecipeError;

/// Data passed to the child process's stdin.
#[derive(Debug, Clone)]
enum Stdin {
    Inherit,
    Data(Vec<u8>),
}

/// An immutable, additive subprocess command builder. Every setter
/// consumes `&self` and returns a new value; the receiver is left
/// untouched, so a base command can be "stemmed" into several variants.
#[derive(Debug, Clone)]
pub struct Command {
    args: Vec<String>,
    env: BTreeMap<String, String>,
    workdir: Option<PathBuf>,
    stdin: Stdin,
}

impl Command {
    /// Start a new command with a single leading argument (the program
    /// name).
    pub fn new(program: impl Into<String>) -> Command {
        Command {
            args: vec![program.into()],
            env: BTreeMap::new(),
            workdir: None,
            stdin: Stdin::Inherit,
        }
    }

    /// Build a `$SHELL -c <command>` invocation, falling back to `/bin/sh`
    /// if `SHELL` is unset.
    pub fn shell(command: impl Into<String>) -> Command {
        let shell = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Command::new(shell).args(vec!["-c".to_string(), command.into()])
    }

    /// Append additional arguments, returning a new command.
    pub fn args<I, S>(&self, extra: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.args.extend(extra.into_iter().map(Into::into));
        next
    }

    /// Set an environment variable, returning a new command.
    pub fn env(&self, key: impl Into<String>, value: impl Into<String>) -> Command {
        let mut next = self.clone();
        next.env.insert(key.into(), value.into());
        next
    }

    /// Set the working directory, returning a new command.
    pub fn workdir(&self, dir: impl Into<PathBuf>) -> Command {
        let mut next = self.clone();
        next.workdir = Some(dir.into());
        next
    }

    /// Feed `data` to the child's stdin instead of inheriting the parent's.
    pub fn stdin_data(&self, data: impl Into<Vec<u8>>) -> Command {
        let mut next = self.clone();
        next.stdin = Stdin::Data(data.into());
        next
    }

    fn to_std(&self, capture_stdout: bool) -> std::process::Command {
        let mut std_cmd = std::process::Command::new(&self.args[0]);
        std_cmd.args(&self.args[1..]);
        std_cmd.envs(&self.env);
        if let Some(dir) = &self.workdir {
            std_cmd.current_dir(dir);
        }
        std_cmd.stdin(match self.stdin {
            Stdin::Inherit => Stdio::inherit(),
            Stdin::Data(_) => Stdio::piped(),
        });
        if capture_stdout {
            std_cmd.stdout(Stdio::piped());
        }
        std_cmd
    }

    /// Run the command, waiting for it to exit. A non-zero exit code is
    /// reported as `RecipeError::Rule`.
    pub fn run(&self) -> Result<(), RecipeError> {
        self.status()?;
        Ok(())
    }

    /// Run the command and return its exit status without treating a
    /// non-zero code as an error.
    pub fn status(&self) -> Result<std::process::ExitStatus, RecipeError> {
        let mut child = self.to_std(false).spawn()?;
        if let Stdin::Data(data) = &self.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(data)?;
            }
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(RecipeError::Rule(format!(
                "command {:?} exited with {status}",
                self.args
            )));
        }
        Ok(status)
    }

    /// Run the command and capture its stdout, erroring on a non-zero exit
    /// code.
    pub fn output(&self) -> Result<Vec<u8>, RecipeError> {
        let mut child = self.to_std(true).spawn()?;
        if let Stdin::Data(data) = &self.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(data)?;
            }
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(RecipeError::Rule(format!(
                "command {:?} exited with {}",
                self.args, output.status
            )));
        }
        Ok(output.stdout)
    }
}
