//! Launch settings
//!
//! Names of the files that make a directory launchable and the programs used
//! to run them. Defaults target Node.js bots.

use serde::{Deserialize, Serialize};

/// How bots are launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSettings {
    /// Entry script run directly by the interpreter
    #[serde(default = "default_entry_script")]
    pub entry_script: String,

    /// Package manifest used when there is no entry script
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Runtime interpreter for the entry script
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Package manager that runs the manifest's start command
    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Arguments passed to the package manager
    #[serde(default = "default_start_args")]
    pub start_args: Vec<String>,
}

fn default_entry_script() -> String {
    "index.js".to_string()
}

fn default_manifest() -> String {
    "package.json".to_string()
}

fn default_interpreter() -> String {
    "node".to_string()
}

fn default_package_manager() -> String {
    // npm is a batch script on Windows and cannot be spawned without a shell
    // under its bare name
    if cfg!(windows) {
        "npm.cmd".to_string()
    } else {
        "npm".to_string()
    }
}

fn default_start_args() -> Vec<String> {
    vec!["start".to_string()]
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            entry_script: default_entry_script(),
            manifest: default_manifest(),
            interpreter: default_interpreter(),
            package_manager: default_package_manager(),
            start_args: default_start_args(),
        }
    }
}

impl LaunchSettings {
    /// Create settings with the Node.js defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry script name
    pub fn with_entry_script(mut self, name: impl Into<String>) -> Self {
        self.entry_script = name.into();
        self
    }

    /// Set the manifest name
    pub fn with_manifest(mut self, name: impl Into<String>) -> Self {
        self.manifest = name.into();
        self
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, program: impl Into<String>) -> Self {
        self.interpreter = program.into();
        self
    }

    /// Set the package manager
    pub fn with_package_manager(mut self, program: impl Into<String>) -> Self {
        self.package_manager = program.into();
        self
    }

    /// Set the package manager arguments
    pub fn with_start_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_args = args.into_iter().map(Into::into).collect();
        self
    }
}
