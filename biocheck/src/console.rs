//! Terminal presenter: draws flow views on stderr and turns typed commands
//! (or nothing at all, in unattended mode) into user actions.

use async_channel::{Receiver, Sender};
use biocheck_flow::{CapturePhase, FlowView, Page, UserAction};
use log::debug;
use std::io::BufRead;
use std::thread;

pub fn render(view: &FlowView) -> String {
    match view.page {
        Page::Loading => view
            .loading_message
            .clone()
            .unwrap_or_else(|| "Loading...".to_string()),
        Page::Capturing => match view.capture_phase {
            Some(CapturePhase::CountingDown) => "Hold still...".to_string(),
            Some(CapturePhase::Submitting) => "Validating...".to_string(),
            Some(CapturePhase::PopupRetry) => format!(
                "{}\n[Enter] try again  [q] cancel",
                view.popup.as_deref().unwrap_or("Validation failed")
            ),
            _ if view.capture_enabled => format!(
                "Camera ready ({}/{} attempts used). [Enter] capture  [q] cancel",
                view.attempts, view.max_attempts
            ),
            _ => "Waiting for camera...".to_string(),
        },
        Page::Success => {
            let attributes = view
                .result
                .as_ref()
                .and_then(|r| serde_json::to_string_pretty(&r.biometric_data).ok())
                .unwrap_or_default();
            format!("Identity validated.\n{}\n[y] confirm  [q] cancel", attributes)
        }
        Page::Failure => format!(
            "Validation failed: {}\n[r] retry  [g] give up  [q] cancel",
            view.failure_message.as_deref().unwrap_or("unknown error")
        ),
        Page::Finished => "Done.".to_string(),
    }
}

pub fn parse_action(line: &str) -> Option<UserAction> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "c" | "capture" => Some(UserAction::StartCapture),
        "q" | "cancel" => Some(UserAction::Cancel),
        "r" | "retry" => Some(UserAction::RetryFromFailure),
        "y" | "ok" | "confirm" => Some(UserAction::Confirm),
        "g" | "giveup" | "give up" => Some(UserAction::GiveUp),
        _ => None,
    }
}

/// What an unattended run does when a view appears.
pub fn auto_action(view: &FlowView) -> Option<UserAction> {
    match view.page {
        Page::Capturing if view.capture_enabled => Some(UserAction::StartCapture),
        Page::Success => Some(UserAction::Confirm),
        Page::Failure => Some(UserAction::GiveUp),
        _ => None,
    }
}

/// Reads commands from stdin on a plain thread. End of input drops the
/// sender, which the session treats as a cancel.
pub fn spawn_stdin_reader(actions: Sender<UserAction>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_action(&line) {
                Some(action) => {
                    if actions.send_blocking(action).is_err() {
                        break;
                    }
                }
                None => eprintln!("Unknown command: {}", line.trim()),
            }
        }
        debug!("Stdin closed");
    });
}

pub async fn present(views: Receiver<FlowView>, auto: Option<Sender<UserAction>>) {
    while let Ok(view) = views.recv().await {
        eprintln!("{}", render(&view));

        if let Some(actions) = &auto {
            if let Some(action) = auto_action(&view) {
                debug!("Auto: {:?}", action);
                let _ = actions.send(action).await;
            }
        }
    }
}
