//! Launch plan selection
//!
//! Decides from a bot directory's contents how the bot is started. The
//! directory is inspected on every start, so a bot that gains an entry script
//! between runs switches strategy on its next launch.

use crate::config::LaunchSettings;
use crate::{FleetError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Suppresses the console window of child processes on Windows
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Which file made the directory launchable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchKind {
    /// Interpreter runs the entry script directly
    EntryScript,
    /// Package manager runs the manifest's start command
    Manifest,
}

/// A resolved command line for one bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub kind: LaunchKind,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchPlan {
    /// Build the process command.
    ///
    /// No shell is involved. stdout and stderr are piped for the readers,
    /// stdin is closed, and the child is killed if its handle is dropped.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }

    /// Command line as a single string, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Choose how to launch the bot rooted at `root`.
///
/// Prefers the entry script, falls back to the manifest, and fails with
/// [`FleetError::NoLaunchTarget`] when neither file exists.
pub fn select_launch_plan(root: &Path, settings: &LaunchSettings) -> Result<LaunchPlan> {
    if root.join(&settings.entry_script).is_file() {
        return Ok(LaunchPlan {
            kind: LaunchKind::EntryScript,
            program: settings.interpreter.clone(),
            args: vec![settings.entry_script.clone()],
            working_dir: root.to_path_buf(),
        });
    }

    if root.join(&settings.manifest).is_file() {
        return Ok(LaunchPlan {
            kind: LaunchKind::Manifest,
            program: settings.package_manager.clone(),
            args: settings.start_args.clone(),
            working_dir: root.to_path_buf(),
        });
    }

    Err(FleetError::NoLaunchTarget {
        root: root.to_path_buf(),
        entry_script: settings.entry_script.clone(),
        manifest: settings.manifest.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_entry_script_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.js"), "console.log('hi')").unwrap();

        let plan = select_launch_plan(dir.path(), &LaunchSettings::default()).unwrap();
        assert_eq!(plan.kind, LaunchKind::EntryScript);
        assert_eq!(plan.program, "node");
        assert_eq!(plan.args, vec!["index.js"]);
        assert_eq!(plan.working_dir, dir.path());
    }

    #[test]
    fn test_entry_script_preferred_over_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.js"), "").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let plan = select_launch_plan(dir.path(), &LaunchSettings::default()).unwrap();
        assert_eq!(plan.kind, LaunchKind::EntryScript);
    }

    #[test]
    fn test_manifest_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let settings = LaunchSettings::default().with_package_manager("npm");
        let plan = select_launch_plan(dir.path(), &settings).unwrap();
        assert_eq!(plan.kind, LaunchKind::Manifest);
        assert_eq!(plan.command_line(), "npm start");
    }

    #[test]
    fn test_no_launch_target() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let result = select_launch_plan(dir.path(), &LaunchSettings::default());
        assert!(matches!(result, Err(FleetError::NoLaunchTarget { .. })));
    }

    #[test]
    fn test_directory_named_like_entry_script_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("index.js")).unwrap();

        let result = select_launch_plan(dir.path(), &LaunchSettings::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_reevaluated_each_time() {
        let dir = TempDir::new().unwrap();
        let settings = LaunchSettings::default();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let first = select_launch_plan(dir.path(), &settings).unwrap();
        assert_eq!(first.kind, LaunchKind::Manifest);

        fs::write(dir.path().join("index.js"), "").unwrap();
        let second = select_launch_plan(dir.path(), &settings).unwrap();
        assert_eq!(second.kind, LaunchKind::EntryScript);
    }

    #[test]
    fn test_custom_settings() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bot.sh"), "echo hi").unwrap();

        let settings = LaunchSettings::default()
            .with_entry_script("bot.sh")
            .with_interpreter("sh");
        let plan = select_launch_plan(dir.path(), &settings).unwrap();
        assert_eq!(plan.command_line(), "sh bot.sh");
    }
}
