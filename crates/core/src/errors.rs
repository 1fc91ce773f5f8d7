use std::path::PathBuf;

/// Result type alias for xpulumi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for xpulumi operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// No xpulumi config file could be located
    #[error("no xpulumi configuration found in '{start_dir}' or any parent directory")]
    ConfigNotFound { start_dir: PathBuf },

    /// Environment variable related errors
    #[error("environment variable '{variable}' error: {message}")]
    Environment { variable: String, message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// YAML serialization/deserialization errors
    #[error("YAML error: {message}")]
    Yaml {
        message: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Command execution errors
    #[error("{}", format_command_error(.command, .args, .message, .exit_code))]
    CommandExecution {
        command: String,
        args: Vec<String>,
        message: String,
        exit_code: Option<i32>,
    },

    /// Backend definition or access errors
    #[error("backend '{backend}' error: {message}")]
    Backend { backend: String, message: String },

    /// Project definition or access errors
    #[error("project '{project}' error: {message}")]
    Project { project: String, message: String },

    /// Stack errors other than the not-found / not-deployed states
    #[error("stack '{stack}' error: {message}")]
    Stack { stack: String, message: String },

    /// The stack has never been initialized in its backend
    #[error("stack '{stack}' does not exist in the backend")]
    StackNotFound { stack: String },

    /// The stack exists in the backend but has never been deployed
    #[error("stack '{stack}' exists but has not yet been deployed")]
    StackNotDeployed { stack: String },

    /// Secret resolution errors
    #[error("failed to resolve secret '{reference}': {message}")]
    SecretResolution { reference: String, message: String },

    /// The supplied passphrase does not match the stack's salt state
    #[error("incorrect passphrase for Pulumi secrets provider")]
    IncorrectPassphrase,

    /// Malformed encrypted state or a crypto-layer failure
    #[error("secrets cipher error: {message}")]
    Cipher { message: String },

    /// Malformed or unsupported URL errors
    #[error("invalid URL '{url}': {message}")]
    Url { url: String, message: String },

    /// Network-related errors
    #[error("network error for '{endpoint}': {message}")]
    Network { endpoint: String, message: String },

    /// An HTTP error response from the Pulumi service REST API
    #[error("pulumi api error {status} for '{endpoint}': {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Pulumi CLI installation errors
    #[error("pulumi install error: {message}")]
    Install { message: String },

    /// Pulumi help text that does not match the expected Cobra layout
    #[error("failed to parse pulumi help for '{topic}': {message}")]
    HelpParse { topic: String, message: String },

    /// Unsupported operation errors
    #[error("unsupported feature '{feature}': {message}")]
    Unsupported { feature: String, message: String },
}

fn format_command_error(
    command: &str,
    args: &[String],
    message: &str,
    exit_code: &Option<i32>,
) -> String {
    let args_str = args.join(" ");
    match exit_code {
        Some(code) => {
            if args_str.is_empty() {
                format!("command '{command}' failed with exit code {code}: {message}")
            } else {
                format!("command '{command} {args_str}' failed with exit code {code}: {message}")
            }
        }
        None => {
            if args_str.is_empty() {
                format!("command '{command}' failed: {message}")
            } else {
                format!("command '{command} {args_str}' failed: {message}")
            }
        }
    }
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::Yaml {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create an environment variable error
    #[must_use]
    pub fn environment(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Environment {
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a command execution error
    #[must_use]
    pub fn command_execution(
        command: impl Into<String>,
        args: Vec<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Error::CommandExecution {
            command: command.into(),
            args,
            message: message.into(),
            exit_code,
        }
    }

    /// Create a backend error
    #[must_use]
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a project error
    #[must_use]
    pub fn project(project: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Project {
            project: project.into(),
            message: message.into(),
        }
    }

    /// Create a stack error
    #[must_use]
    pub fn stack(stack: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Stack {
            stack: stack.into(),
            message: message.into(),
        }
    }

    /// Create a secret resolution error
    #[must_use]
    pub fn secret_resolution(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SecretResolution {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a cipher error
    #[must_use]
    pub fn cipher(message: impl Into<String>) -> Self {
        Error::Cipher {
            message: message.into(),
        }
    }

    /// Create a URL error
    #[must_use]
    pub fn url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Url {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a network error
    #[must_use]
    pub fn network(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Network {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a pulumi api error
    #[must_use]
    pub fn api(endpoint: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }

    /// Create an install error
    #[must_use]
    pub fn install(message: impl Into<String>) -> Self {
        Error::Install {
            message: message.into(),
        }
    }

    /// Create a help parse error
    #[must_use]
    pub fn help_parse(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Error::HelpParse {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported feature error
    #[must_use]
    pub fn unsupported(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Unsupported {
            feature: feature.into(),
            message: message.into(),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", message.into(), base_error),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", f(), base_error),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_includes_args_and_exit_code() {
        let err = Error::command_execution(
            "secret-kv",
            vec!["-r".to_string(), "get".to_string()],
            "no such key",
            Some(2),
        );
        let msg = err.to_string();
        assert!(msg.contains("secret-kv -r get"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("no such key"));
    }

    #[test]
    fn stack_state_errors_are_distinguishable() {
        let not_found = Error::StackNotFound {
            stack: "dev".to_string(),
        };
        let not_deployed = Error::StackNotDeployed {
            stack: "dev".to_string(),
        };
        assert!(not_found.to_string().contains("does not exist"));
        assert!(not_deployed.to_string().contains("not yet been deployed"));
    }

    #[test]
    fn context_wraps_underlying_error() {
        let io_err: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io_err.context("reading backend config").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("reading backend config"));
        assert!(msg.contains("missing"));
    }
}
