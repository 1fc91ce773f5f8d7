//! Global options shared by every subcommand.

use std::path::PathBuf;
use std::sync::Arc;

use xpulumi_backend::Context;
use xpulumi_config::ConfigLoader;
use xpulumi_core::paths::{abs_join, expand_user};
use xpulumi_core::{EnvironmentVariables, Error, Result};

/// When to decorate output with ANSI escape codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    /// Whether stderr decoration (banners, log output) should use color.
    #[must_use]
    pub fn stderr_ansi(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => atty::is(atty::Stream::Stderr),
        }
    }
}

/// Resolved global options plus a snapshot of the process environment.
///
/// The working directory is absolutized up front so that `-C` behaves the
/// same whether a command touches the filesystem directly or goes through
/// the config loader.
pub struct GlobalArgs {
    pub cwd: PathBuf,
    pub config_path: Option<PathBuf>,
    pub compact: bool,
    pub color: ColorMode,
    pub env: EnvironmentVariables,
}

impl GlobalArgs {
    pub fn new(
        cwd: Option<PathBuf>,
        config_path: Option<PathBuf>,
        compact: bool,
        color: ColorMode,
    ) -> Result<Self> {
        let current = std::env::current_dir()
            .map_err(|e| Error::file_system(".", "determine current directory", e))?;
        let cwd = match cwd {
            Some(dir) => abs_join(&current, &expand_user(&dir.to_string_lossy())),
            None => current,
        };
        Ok(Self {
            cwd,
            config_path,
            compact,
            color,
            env: EnvironmentVariables::from_os(),
        })
    }

    /// Load the configuration and wrap it in a fresh [`Context`].
    pub async fn context(&self) -> Result<Arc<Context>> {
        let mut loader = ConfigLoader::new()
            .starting_dir(&self.cwd)
            .env(self.env.clone());
        if let Some(path) = &self.config_path {
            loader = loader.config_path(path);
        }
        let config = Arc::new(loader.load().await?);
        Ok(Arc::new(Context::new(
            config,
            self.cwd.clone(),
            self.env.clone(),
        )))
    }
}
