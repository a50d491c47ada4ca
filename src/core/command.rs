use serde::{Serialize, Deserialize};
use std::path::Path;
use std::process::Command;

/// An external program plus argument list with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Substitute every `{key}` occurrence in the arguments.
    ///
    /// Unknown placeholders are left untouched so that literal braces in a
    /// shell snippet survive.
    pub fn expand(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }

    pub fn to_command(&self, vars: &[(&str, &str)], cwd: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.expand(vars)).current_dir(cwd);
        command
    }

    /// Render the command line for diagnostics.
    pub fn display(&self, vars: &[(&str, &str)]) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.expand(vars));
        parts.join(" ")
    }
}
