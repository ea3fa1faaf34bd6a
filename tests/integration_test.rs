//! Integration tests for botfleet
//!
//! These tests drive real child processes through the fleet controller, using
//! `sh` in place of the Node.js interpreter.

use ansi_segments::{Color, Segment};
use botfleet::config::{BotStore, LaunchSettings};
use botfleet::fleet::{
    Applied, BotId, BotState, ExitDisposition, FleetController, FleetEvent, OutputStream,
    RestartOutcome, StartOutcome,
};
use botfleet::FleetError;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

/// Helper to create a bot directory whose entry script is `script`
fn create_bot(parent: &TempDir, name: &str, script: &str) -> PathBuf {
    let dir = parent.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("index.js"), script).unwrap();
    dir
}

fn sh_settings() -> LaunchSettings {
    LaunchSettings::default().with_interpreter("sh")
}

/// Apply messages until an exit has been handled
async fn next_exit(fleet: &mut FleetController) -> (BotId, ExitDisposition) {
    loop {
        let applied = tokio::time::timeout(WAIT, fleet.process_next())
            .await
            .expect("timed out waiting for an exit")
            .expect("message channel closed");
        if let Applied::Exit(bot, disposition) = applied {
            return (bot, disposition);
        }
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_fleet_survives_reload() {
        let temp = TempDir::new().unwrap();
        let store = BotStore::new(temp.path().join("bots.json"));

        let mut fleet = FleetController::with_store(store.clone(), sh_settings());
        fleet.add_bot(create_bot(&temp, "alpha", "")).unwrap();
        fleet.add_bot(create_bot(&temp, "beta", "")).unwrap();

        let reloaded = FleetController::load(store, sh_settings());
        let names: Vec<_> = reloaded.bots().map(|b| b.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_saved_file_is_json_array_of_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bots.json");
        let mut fleet = FleetController::with_store(BotStore::new(&path), sh_settings());
        let dir = create_bot(&temp, "alpha", "");
        fleet.add_bot(&dir).unwrap();

        let saved: Vec<PathBuf> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, vec![dir]);
    }

    #[test]
    fn test_removed_directory_is_skipped_but_kept() {
        let temp = TempDir::new().unwrap();
        let store = BotStore::new(temp.path().join("bots.json"));
        let alpha = create_bot(&temp, "alpha", "");
        let beta = create_bot(&temp, "beta", "");
        store.save(&[alpha, beta.clone()]).unwrap();

        fs::remove_dir_all(&beta).unwrap();

        let fleet = FleetController::load(store.clone(), sh_settings());
        assert_eq!(fleet.len(), 1);
        assert_eq!(store.load().unwrap().len(), 2);
    }
}

mod segment_tests {
    use super::*;
    use ansi_segments::{segment_line, strip};

    #[test]
    fn test_error_line_scenario() {
        let (segments, color) = segment_line("\x1B[31mERROR\x1B[0m ok", Color::Default);
        assert_eq!(
            segments,
            vec![
                Segment::new("ERROR", Color::Red),
                Segment::new(" ok", Color::Default)
            ]
        );
        assert_eq!(color, Color::Default);
    }

    #[test]
    fn test_concatenation_matches_stripped_line() {
        let line = "\x1B[33mwarn:\x1B[99m still amber \x1B[36mcyan\x1B[37m";
        let (segments, color) = segment_line(line, Color::Default);
        let joined: String = segments.iter().map(|s| s.text.as_str()).collect();

        assert_eq!(joined, strip(line));
        assert_eq!(joined, "warn: still amber cyan");
        assert_eq!(color, Color::Default);
    }
}

#[cfg(unix)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_all_signals_every_bot_first() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        for i in 0..5 {
            fleet
                .add_bot(create_bot(&temp, &format!("bot{}", i), "exec sleep 30\n"))
                .unwrap();
        }

        assert_eq!(fleet.start_all(), 5);
        assert!(fleet.any_running());
        assert!(!fleet.any_stopped());

        // Every kill is out before a single exit has been applied
        assert_eq!(fleet.stop_all(), 5);
        assert!(fleet
            .bots()
            .all(|b| b.state() == BotState::StoppingByRequest));

        for _ in 0..5 {
            let (_, disposition) = next_exit(&mut fleet).await;
            assert_eq!(disposition, ExitDisposition::Stopped);
        }

        assert!(!fleet.any_running());
        assert!(fleet.bots().all(|b| b.restarts() == 0));
    }

    #[tokio::test]
    async fn test_crash_is_restarted_with_fresh_process() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        let mut events = fleet.subscribe();
        let id = fleet.add_bot(create_bot(&temp, "flaky", "exit 7\n")).unwrap();

        assert!(matches!(
            fleet.start(id).unwrap(),
            StartOutcome::Started { .. }
        ));

        let (bot, disposition) = next_exit(&mut fleet).await;
        assert_eq!(bot, id);
        assert_eq!(disposition, ExitDisposition::Restarted { relaunched: true });
        assert!(fleet.get(id).unwrap().is_running());
        assert_eq!(fleet.get(id).unwrap().restarts(), 1);

        fleet.stop(id).unwrap();
        let (_, disposition) = next_exit(&mut fleet).await;
        assert_eq!(disposition, ExitDisposition::Stopped);

        let mut supervisor_lines = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let FleetEvent::Line { line, .. } = event {
                if line.stream == OutputStream::Supervisor {
                    supervisor_lines.push(line.text());
                }
            }
        }
        assert_eq!(
            supervisor_lines,
            vec![
                "[ERROR] Bot process exited (code 7). Restarting...".to_string(),
                "[INFO] Bot process stopped by user.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_colored_output_reaches_subscribers() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        let mut events = fleet.subscribe();
        let id = fleet
            .add_bot(create_bot(
                &temp,
                "talker",
                "printf '\\033[32mready\\033[0m\\n'\nexec sleep 30\n",
            ))
            .unwrap();

        fleet.start(id).unwrap();

        loop {
            let applied = tokio::time::timeout(WAIT, fleet.process_next())
                .await
                .unwrap()
                .unwrap();
            if applied == Applied::Output(id) {
                break;
            }
        }

        let line = loop {
            match events.try_recv().unwrap() {
                FleetEvent::Line { line, .. } if line.stream == OutputStream::Stdout => break line,
                _ => continue,
            }
        };
        assert_eq!(line.segments, vec![Segment::new("ready", Color::Green)]);

        fleet.stop(id).unwrap();
        next_exit(&mut fleet).await;
    }

    #[tokio::test]
    async fn test_remove_refused_while_running() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        let id = fleet
            .add_bot(create_bot(&temp, "busy", "exec sleep 30\n"))
            .unwrap();

        fleet.start(id).unwrap();
        assert!(matches!(
            fleet.remove_bot(id),
            Err(FleetError::BotRunning(_))
        ));

        fleet.stop(id).unwrap();
        next_exit(&mut fleet).await;
        assert!(fleet.remove_bot(id).is_ok());
    }

    #[tokio::test]
    async fn test_restart_all_mixes_kill_and_start() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        let running = fleet
            .add_bot(create_bot(&temp, "running", "exec sleep 30\n"))
            .unwrap();
        let idle = fleet
            .add_bot(create_bot(&temp, "idle", "exec sleep 30\n"))
            .unwrap();

        fleet.start(running).unwrap();
        assert_eq!(fleet.restart_all(), 2);
        assert!(fleet.get(idle).unwrap().is_running());

        let (bot, disposition) = next_exit(&mut fleet).await;
        assert_eq!(bot, running);
        assert_eq!(disposition, ExitDisposition::Restarted { relaunched: true });

        fleet.stop_all();
        next_exit(&mut fleet).await;
        next_exit(&mut fleet).await;
        assert!(!fleet.any_running());
    }

    #[tokio::test]
    async fn test_restart_idle_bot_starts_it() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        let id = fleet
            .add_bot(create_bot(&temp, "idle", "exec sleep 30\n"))
            .unwrap();

        assert!(matches!(
            fleet.restart(id).unwrap(),
            RestartOutcome::Started(StartOutcome::Started { .. })
        ));

        fleet.stop(id).unwrap();
        next_exit(&mut fleet).await;
    }

    #[tokio::test]
    async fn test_shutdown_suppresses_restart() {
        let temp = TempDir::new().unwrap();
        let mut fleet = FleetController::new(sh_settings());
        let id = fleet
            .add_bot(create_bot(&temp, "alpha", "exec sleep 30\n"))
            .unwrap();

        fleet.start(id).unwrap();
        fleet.shutdown();

        let (_, disposition) = next_exit(&mut fleet).await;
        assert_eq!(disposition, ExitDisposition::Ignored);
        assert_eq!(fleet.get(id).unwrap().restarts(), 0);
        assert_eq!(fleet.start(id).unwrap(), StartOutcome::ShuttingDown);
    }

    #[tokio::test]
    async fn test_manifest_launch() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("packaged");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), "{}").unwrap();
        fs::write(dir.join("start.sh"), "exec sleep 30\n").unwrap();

        let settings = LaunchSettings::default()
            .with_package_manager("sh")
            .with_start_args(["start.sh"]);
        let mut fleet = FleetController::new(settings);
        let id = fleet.add_bot(&dir).unwrap();

        assert!(matches!(
            fleet.start(id).unwrap(),
            StartOutcome::Started { pid: Some(_) }
        ));

        fleet.stop(id).unwrap();
        let (_, disposition) = next_exit(&mut fleet).await;
        assert_eq!(disposition, ExitDisposition::Stopped);
    }
}
