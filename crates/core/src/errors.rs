use std::path::PathBuf;

/// Result type alias for kindling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for graph generation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed repository configuration
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Schema validation failure at a transform checkpoint
    #[error("schema validation failed for {descriptor}: {message}")]
    Schema { descriptor: String, message: String },

    /// Unknown loader reference, broken tasks-from path, duplicate task name
    #[error("loader error in kind '{kind}': {message}")]
    Loader { kind: String, message: String },

    /// A transform failed; carries kind and task label context
    #[error("transform error in kind '{kind}'{}: {message}", format_label(.label))]
    Transform {
        kind: String,
        label: Option<String>,
        message: String,
    },

    /// Unresolved or cyclic dependency
    #[error("dependency error: {message}")]
    Dependency { message: String },

    /// An optimization strategy failed; treated as "cannot optimize" by the engine
    #[error("optimizer error for '{label}' using strategy '{strategy}': {message}")]
    Optimizer {
        label: String,
        strategy: String,
        message: String,
    },

    /// Execution-platform API failure, after retries were exhausted
    #[error("platform error for '{endpoint}': {message}")]
    Platform { endpoint: String, message: String },

    /// Missing or ill-typed parameter
    #[error("parameter error: {message}")]
    Parameter { message: String },

    /// Version control introspection failure
    #[error("vcs error: {message}")]
    Vcs { message: String },

    /// Duplicate registration in a process-wide registry
    #[error("'{name}' is already registered as a {registry}")]
    Registry { registry: String, name: String },

    /// File system operations
    #[error("file system {operation} failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse errors
    #[error("failed to parse YAML from '{path}': {message}")]
    Yaml { path: PathBuf, message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

fn format_label(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(" (task '{label}')"),
        None => String::new(),
    }
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn schema(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            descriptor: descriptor.into(),
            message: message.into(),
        }
    }

    pub fn loader(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Loader {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn transform(
        kind: impl Into<String>,
        label: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Transform {
            kind: kind.into(),
            label,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Error::Dependency {
            message: message.into(),
        }
    }

    pub fn optimizer(
        label: impl Into<String>,
        strategy: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Optimizer {
            label: label.into(),
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    pub fn platform(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Platform {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Error::Parameter {
            message: message.into(),
        }
    }

    pub fn vcs(message: impl Into<String>) -> Self {
        Error::Vcs {
            message: message.into(),
        }
    }

    pub fn registry(registry: impl Into<String>, name: impl Into<String>) -> Self {
        Error::Registry {
            registry: registry.into(),
            name: name.into(),
        }
    }

    pub fn file_system(path: impl Into<PathBuf>, operation: &str, source: std::io::Error) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.to_string(),
            source,
        }
    }

    pub fn yaml(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Yaml {
            path: path.into(),
            message: message.into(),
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

impl miette::Diagnostic for Error {}
