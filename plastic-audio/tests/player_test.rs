#![cfg(unix)]

use plastic_audio::wav::write_pcm16;
use plastic_audio::{CommandAudioOutput, PlayerConfig};
use plastic_core::{AudioOutput, PlaybackError};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// Fake `aplay` that records its arguments and then runs `body`.
fn fake_player(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("aplay");
    let log = dir.join("args.log");
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> {}\n{}\n",
        log.display(),
        body
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn output_with(dir: &Path, body: &str) -> CommandAudioOutput {
    CommandAudioOutput::new(Some(PlayerConfig {
        player_bin: Some(fake_player(dir, body)),
        temp_dir: dir.to_path_buf(),
    }))
}

fn tone() -> Vec<u8> {
    write_pcm16(1, 16_000, &[0u8; 320])
}

fn wav_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .map(|e| e.path().extension().map_or(false, |x| x == "wav"))
                .unwrap_or(false)
        })
        .count()
}

#[tokio::test]
async fn plays_on_requested_device() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_with(dir.path(), "exit 0");

    output.play(&tone(), "hw:1,0", 0.5, -1.0).await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
    assert!(log.starts_with("-q -D hw:1,0 "), "args were: {}", log);
    assert_eq!(wav_files(dir.path()), 0, "temp audio is cleaned up");
}

#[tokio::test]
async fn failing_player_reports_unavailable_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_with(dir.path(), "echo 'no such device' >&2; exit 1");

    let err = output.play(&tone(), "usb-left", 1.0, 0.0).await.unwrap_err();
    match err {
        PlaybackError::OutputUnavailable { output_id, reason } => {
            assert_eq!(output_id, "usb-left");
            assert!(reason.contains("no such device"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn missing_player_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = CommandAudioOutput::new(Some(PlayerConfig {
        player_bin: None,
        temp_dir: dir.path().to_path_buf(),
    }));
    assert!(matches!(
        output.play(&tone(), "default", 1.0, 0.0).await,
        Err(PlaybackError::NoPlayer)
    ));
}

#[tokio::test]
async fn stop_ends_playback_early() {
    let dir = tempfile::tempdir().unwrap();
    let output = Arc::new(output_with(dir.path(), "sleep 30"));

    let player = Arc::clone(&output);
    let task = tokio::spawn(async move { player.play(&tone(), "hw:2", 1.0, 0.0).await });

    let started = {
        let mut ok = false;
        for _ in 0..200 {
            if output.busy_outputs().contains(&"hw:2".to_string()) {
                ok = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ok
    };
    assert!(started, "player never started");

    output.stop("hw:2").await;
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("stop should end playback")
        .unwrap();
    assert!(result.is_ok());
    assert!(output.busy_outputs().is_empty());
}

#[tokio::test]
async fn stop_on_idle_output_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let output = output_with(dir.path(), "exit 0");
    output.stop("nothing-here").await;
    output.stop("nothing-here").await;
    assert!(output.busy_outputs().is_empty());

    // Still usable afterwards
    output.play(&tone(), "nothing-here", 1.0, 0.0).await.unwrap();
    assert!(output.busy_outputs().is_empty());
}
