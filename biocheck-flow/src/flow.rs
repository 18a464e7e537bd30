//! The capture/validation state machine.
//!
//! `FlowController` owns all mutable flow state and never performs I/O. Every
//! input arrives as an [`Event`]; every side effect leaves as an [`Effect`]
//! for the session driver to carry out. Events that no longer match the
//! current state (a timer that fired after cancel, a response for an old
//! attempt) are dropped here.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Duration;

use crate::config::{FlowSettings, SessionConfig};
use crate::error::{CameraError, ErrorCode, FlowError, SubmitError, TokenError};
use crate::report::{Attributes, Outcome, ValidationResult};
use crate::retry::{RetryDecision, RetryPolicy};

pub const REQUESTING_TOKEN: &str = "Requesting token...";
pub const STARTING_CAMERA: &str = "Starting camera...";
pub const RESTARTING: &str = "Restarting...";

/// Identifies one scheduled timer or one outstanding submission.
pub type Ticket = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Loading,
    Capturing,
    Success,
    Failure,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    CountingDown,
    Submitting,
    PopupRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    CameraWarmup,
    Countdown,
    Notice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    StartCapture,
    Cancel,
    RetryFromFailure,
    Confirm,
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TokenFetched(Result<String, TokenError>),
    TimerElapsed { timer: TimerKind, ticket: Ticket },
    CameraStarted,
    CameraFailed(CameraError),
    FrameValidated {
        ticket: Ticket,
        captured_at: DateTime<Utc>,
        result: Result<Attributes, SubmitError>,
    },
    User(UserAction),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestToken,
    Schedule {
        timer: TimerKind,
        ticket: Ticket,
        after: Duration,
    },
    CancelTimers,
    AcquireCamera,
    ReleaseCamera,
    CaptureAndSubmit { ticket: Ticket, token: String },
    Report(Outcome),
}

/// What a presenter needs to draw the current page.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowView {
    pub page: Page,
    pub capture_phase: Option<CapturePhase>,
    pub loading_message: Option<String>,
    pub capture_enabled: bool,
    pub popup: Option<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub failure_message: Option<String>,
    pub result: Option<ValidationResult>,
}

#[derive(Debug)]
enum Phase {
    Created,
    Loading(&'static str),
    Capturing(CapturePhase),
    Success(ValidationResult),
    Failure,
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct Timings {
    countdown: Duration,
    notice: Duration,
    camera_warmup: Duration,
}

#[derive(Debug)]
pub struct FlowController {
    session: SessionConfig,
    retry: RetryPolicy,
    timings: Timings,
    phase: Phase,
    token: Option<String>,
    attempts: u32,
    failure_message: Option<String>,
    popup: Option<String>,
    camera_live: bool,
    pending: Option<Ticket>,
    next_ticket: Ticket,
}

impl FlowController {
    pub fn new(session: SessionConfig, settings: &FlowSettings) -> Self {
        Self {
            session,
            retry: RetryPolicy::new(settings.max_attempts),
            timings: Timings {
                countdown: settings.countdown(),
                notice: settings.notice(),
                camera_warmup: settings.camera_warmup(),
            },
            phase: Phase::Created,
            token: None,
            attempts: 0,
            failure_message: None,
            popup: None,
            camera_live: false,
            pending: None,
            next_ticket: 0,
        }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn page(&self) -> Page {
        match self.phase {
            Phase::Created | Phase::Loading(_) => Page::Loading,
            Phase::Capturing(_) => Page::Capturing,
            Phase::Success(_) => Page::Success,
            Phase::Failure => Page::Failure,
            Phase::Finished => Page::Finished,
        }
    }

    pub fn capture_phase(&self) -> Option<CapturePhase> {
        match self.phase {
            Phase::Capturing(phase) => Some(phase),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    pub fn view(&self) -> FlowView {
        let capture_enabled = self.camera_live
            && matches!(
                self.phase,
                Phase::Capturing(CapturePhase::Idle | CapturePhase::PopupRetry)
            );

        FlowView {
            page: self.page(),
            capture_phase: self.capture_phase(),
            loading_message: match self.phase {
                Phase::Loading(message) => Some(message.to_string()),
                _ => None,
            },
            capture_enabled,
            popup: self.popup.clone(),
            attempts: self.attempts,
            max_attempts: self.retry.max_attempts(),
            failure_message: self.failure_message.clone(),
            result: match &self.phase {
                Phase::Success(result) => Some(result.clone()),
                _ => None,
            },
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::TokenFetched(result) => self.on_token_result(result),
            Event::TimerElapsed { timer, ticket } => {
                if self.pending != Some(ticket) {
                    debug!("Dropping stale {:?} timer #{}", timer, ticket);
                    return Vec::new();
                }
                match timer {
                    TimerKind::CameraWarmup => self.on_camera_warmup_elapsed(),
                    TimerKind::Countdown => self.on_timer_expired(),
                    TimerKind::Notice => self.on_notice_elapsed(),
                }
            }
            Event::CameraStarted => self.on_camera_started(),
            Event::CameraFailed(err) => self.on_camera_failed(err),
            Event::FrameValidated { ticket, captured_at, result } => {
                self.on_validation_result(ticket, captured_at, result)
            }
            Event::User(UserAction::StartCapture) => self.on_start_capture(),
            Event::User(UserAction::Cancel) => self.cancel(),
            Event::User(UserAction::RetryFromFailure) => self.retry_from_failure(),
            Event::User(UserAction::Confirm) => self.confirm(),
            Event::User(UserAction::GiveUp) => self.give_up(),
        }
    }

    pub fn start(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Created) {
            return Vec::new();
        }

        if let Err(err) = self.session.validate() {
            warn!("Refusing to start: {}", err.message);
            return self.finish(Outcome::Failure(err));
        }

        info!("Starting validation flow for {}", self.session.subject_id);
        self.phase = Phase::Loading(REQUESTING_TOKEN);
        vec![Effect::RequestToken]
    }

    pub fn on_token_result(&mut self, result: Result<String, TokenError>) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Loading(_)) || self.token.is_some() {
            debug!("Dropping token result outside of token acquisition");
            return Vec::new();
        }

        match result {
            Ok(token) => {
                debug!("Token stored ({} chars)", token.len());
                self.token = Some(token);
                self.phase = Phase::Loading(STARTING_CAMERA);
                let ticket = self.issue_ticket();
                vec![Effect::Schedule {
                    timer: TimerKind::CameraWarmup,
                    ticket,
                    after: self.timings.camera_warmup,
                }]
            }
            Err(err) => {
                warn!("Token acquisition failed: {}", err);
                self.finish(Outcome::Failure(err.into()))
            }
        }
    }

    fn on_camera_warmup_elapsed(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Loading(_)) || self.token.is_none() {
            return Vec::new();
        }

        self.pending = None;
        self.popup = None;
        self.phase = Phase::Capturing(CapturePhase::Idle);
        vec![Effect::AcquireCamera]
    }

    fn on_camera_started(&mut self) -> Vec<Effect> {
        if let Phase::Capturing(_) = self.phase {
            self.camera_live = true;
            Vec::new()
        } else {
            warn!("Camera came up outside of capture; releasing it");
            vec![Effect::ReleaseCamera]
        }
    }

    fn on_camera_failed(&mut self, err: CameraError) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }

        warn!("Camera acquisition failed: {}", err);
        self.finish(Outcome::Failure(FlowError::new(
            ErrorCode::CameraError,
            err.to_string(),
        )))
    }

    pub fn on_start_capture(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::Capturing(CapturePhase::Idle | CapturePhase::PopupRetry) if self.camera_live => {
                self.phase = Phase::Capturing(CapturePhase::CountingDown);
                self.popup = None;
                let ticket = self.issue_ticket();
                info!("Capture countdown started ({:?})", self.timings.countdown);
                vec![Effect::Schedule {
                    timer: TimerKind::Countdown,
                    ticket,
                    after: self.timings.countdown,
                }]
            }
            _ => {
                debug!("Ignoring capture request on {:?} page", self.page());
                Vec::new()
            }
        }
    }

    /// The camera is live here: every path that stops the stream (cancel,
    /// success, hard failure) leaves CountingDown and clears the pending
    /// ticket, so a countdown that fires afterwards is dropped in `handle`.
    fn on_timer_expired(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Capturing(CapturePhase::CountingDown)) {
            return Vec::new();
        }
        self.pending = None;

        let Some(token) = self.token.clone() else {
            return self.finish(Outcome::Failure(TokenError::Missing.into()));
        };

        self.attempts += 1;
        self.phase = Phase::Capturing(CapturePhase::Submitting);
        let ticket = self.issue_ticket();
        info!("Submitting attempt {}/{}", self.attempts, self.retry.max_attempts());
        vec![Effect::CaptureAndSubmit { ticket, token }]
    }

    pub fn on_validation_result(
        &mut self,
        ticket: Ticket,
        captured_at: DateTime<Utc>,
        result: Result<Attributes, SubmitError>,
    ) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Capturing(CapturePhase::Submitting))
            || self.pending != Some(ticket)
        {
            debug!("Dropping validation result #{}", ticket);
            return Vec::new();
        }
        self.pending = None;

        let err = match result {
            Ok(biometric_data) => {
                self.camera_live = false;
                self.phase = Phase::Success(ValidationResult {
                    access_token: self.token.clone().unwrap_or_default(),
                    biometric_data,
                    timestamp: captured_at,
                });
                info!("Biometric validation passed on attempt {}", self.attempts);
                return vec![Effect::ReleaseCamera];
            }
            Err(err) => err,
        };

        let message = err.to_string();
        self.failure_message = Some(message.clone());

        match self.retry.evaluate(self.attempts) {
            RetryDecision::Soft { attempt, max_attempts } => {
                info!("Attempt {}/{} failed: {}", attempt, max_attempts, message);
                self.popup = Some(format!("{}\nAttempt {}/{}", message, attempt, max_attempts));
                self.phase = Phase::Capturing(CapturePhase::PopupRetry);
                let ticket = self.issue_ticket();
                vec![Effect::Schedule {
                    timer: TimerKind::Notice,
                    ticket,
                    after: self.timings.notice,
                }]
            }
            RetryDecision::Hard => {
                warn!("Attempt limit reached: {}", message);
                self.camera_live = false;
                self.popup = None;
                self.phase = Phase::Failure;
                vec![Effect::ReleaseCamera]
            }
        }
    }

    fn on_notice_elapsed(&mut self) -> Vec<Effect> {
        if let Phase::Capturing(CapturePhase::PopupRetry) = self.phase {
            self.pending = None;
            self.popup = None;
            self.phase = Phase::Capturing(CapturePhase::Idle);
        }
        Vec::new()
    }

    pub fn cancel(&mut self) -> Vec<Effect> {
        if self.is_finished() {
            return Vec::new();
        }
        info!("Flow cancelled on {:?} page", self.page());
        self.finish(Outcome::Cancelled)
    }

    /// Starts capture over with a fresh attempt budget. The token is kept.
    pub fn retry_from_failure(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Failure) {
            debug!("Retry ignored on {:?} page", self.page());
            return Vec::new();
        }

        info!("Restarting capture after failure");
        self.attempts = 0;
        self.failure_message = None;
        self.popup = None;
        self.phase = Phase::Loading(RESTARTING);
        let ticket = self.issue_ticket();
        vec![Effect::Schedule {
            timer: TimerKind::CameraWarmup,
            ticket,
            after: self.timings.camera_warmup,
        }]
    }

    pub fn confirm(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Success(_)) {
            return Vec::new();
        }

        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Success(result) => self.finish(Outcome::Success(result)),
            _ => Vec::new(),
        }
    }

    pub fn give_up(&mut self) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Failure) {
            return Vec::new();
        }

        let message = self
            .failure_message
            .clone()
            .unwrap_or_else(|| "Validation failed".to_string());
        self.finish(Outcome::Failure(FlowError::new(ErrorCode::ValidationFailed, message)))
    }

    fn finish(&mut self, outcome: Outcome) -> Vec<Effect> {
        self.phase = Phase::Finished;
        self.pending = None;
        self.popup = None;
        self.camera_live = false;
        vec![
            Effect::CancelTimers,
            Effect::ReleaseCamera,
            Effect::Report(outcome),
        ]
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.pending = Some(self.next_ticket);
        self.next_ticket
    }
}
