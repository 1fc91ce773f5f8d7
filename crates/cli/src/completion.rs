//! Shell completion scripts for the `xpulumi` binary.

use std::io;

use clap::CommandFactory;
use clap_complete::Shell;
use xpulumi_core::{Error, Result};

use crate::commands::Cli;

/// Print the completion script for `shell` to stdout.
pub fn generate(shell: &str) -> Result<()> {
    let shell: Shell = shell.parse().map_err(|_| {
        Error::configuration(format!(
            "unsupported shell '{shell}'; expected one of bash, zsh, fish, powershell, elvish"
        ))
    })?;
    write_completion(shell, &mut io::stdout());
    Ok(())
}

fn write_completion(shell: Shell, writer: &mut dyn io::Write) {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "xpulumi", writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_mentions_the_binary() {
        let mut buffer = Vec::new();
        write_completion(Shell::Bash, &mut buffer);
        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("xpulumi"));
    }

    #[test]
    fn unknown_shell_is_rejected() {
        let err = generate("tcsh").unwrap_err();
        assert!(err.to_string().contains("unsupported shell"));
    }
}
