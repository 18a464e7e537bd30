use async_channel::{Receiver, Sender};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::auth::{HttpTokenClient, TokenProvider};
use crate::camera::{CameraController, StreamHandle, VideoSource};
use crate::config::{SessionConfig, Settings};
use crate::error::{CameraError, SubmitError};
use crate::flow::{Effect, Event, FlowController, FlowView, Ticket, UserAction};
use crate::report::{Outcome, ResultReporter};
use crate::timer::Timers;
use crate::validation::{BiometricValidator, FrameSubmission, HttpValidationClient};

/// Drives one flow: feeds events to the controller one at a time and carries
/// out the effects it returns.
///
/// Network calls run on the blocking pool and come back as events on the
/// same channel as timers, so the controller never sees two events at once.
/// User actions are polled first, which lets a cancel win over a timer or
/// response that is ready in the same turn.
pub struct Session {
    controller: FlowController,
    camera: CameraController,
    stream: Option<StreamHandle>,
    tokens: Arc<dyn TokenProvider>,
    validator: Arc<dyn BiometricValidator>,
    timers: Timers,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    actions: Receiver<UserAction>,
    observer: Option<Sender<FlowView>>,
    last_view: Option<FlowView>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        settings: &Settings,
        source: Box<dyn VideoSource>,
        actions: Receiver<UserAction>,
    ) -> Self {
        let (events_tx, events_rx) = async_channel::unbounded();

        Self {
            controller: FlowController::new(config, &settings.flow),
            camera: CameraController::new(source),
            stream: None,
            tokens: Arc::new(HttpTokenClient::new(&settings.http)),
            validator: Arc::new(HttpValidationClient::new(&settings.http)),
            timers: Timers::new(),
            events_tx,
            events_rx,
            actions,
            observer: None,
            last_view: None,
        }
    }

    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn BiometricValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Receives a snapshot whenever the visible state changes.
    pub fn with_observer(mut self, observer: Sender<FlowView>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn run(mut self) -> Outcome {
        let effects = self.controller.start();
        if let Some(outcome) = self.apply(effects) {
            return outcome;
        }

        let mut actions_open = true;
        loop {
            let event = tokio::select! {
                biased;
                action = self.actions.recv(), if actions_open => match action {
                    Ok(action) => Event::User(action),
                    Err(_) => {
                        warn!("Host closed the action channel; cancelling");
                        actions_open = false;
                        Event::User(UserAction::Cancel)
                    }
                },
                event = self.events_rx.recv() => match event {
                    Ok(event) => event,
                    Err(_) => Event::User(UserAction::Cancel),
                },
            };

            let effects = self.controller.handle(event);
            if let Some(outcome) = self.apply(effects) {
                return outcome;
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) -> Option<Outcome> {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::RequestToken => self.request_token(),
                Effect::Schedule { timer, ticket, after } => {
                    self.timers.schedule(timer, ticket, after, self.events_tx.clone())
                }
                Effect::CancelTimers => self.timers.cancel_all(),
                Effect::AcquireCamera => {
                    let event = match self.camera.acquire() {
                        Ok(handle) => {
                            self.stream = Some(handle);
                            Event::CameraStarted
                        }
                        Err(err) => Event::CameraFailed(err),
                    };
                    queue.extend(self.controller.handle(event));
                }
                Effect::ReleaseCamera => self.release_camera(),
                Effect::CaptureAndSubmit { ticket, token } => {
                    if let Some(event) = self.capture_and_submit(ticket, token) {
                        queue.extend(self.controller.handle(event));
                    }
                }
                Effect::Report(outcome) => {
                    self.timers.cancel_all();
                    self.publish_view();
                    let stream = self.stream.take();
                    return Some(ResultReporter::new(&mut self.camera).finish(stream, outcome));
                }
            }
        }

        self.publish_view();
        None
    }

    fn request_token(&self) {
        let tokens = Arc::clone(&self.tokens);
        let session = self.controller.session().clone();
        let events = self.events_tx.clone();

        tokio::task::spawn_blocking(move || {
            let result = tokens.fetch_token(
                &session.token_endpoint,
                &session.username,
                &session.password,
            );
            let _ = events.send_blocking(Event::TokenFetched(result));
        });
    }

    fn capture_and_submit(&mut self, ticket: Ticket, token: String) -> Option<Event> {
        let captured_at = Utc::now();
        let frame = match &self.stream {
            Some(handle) => self.camera.capture_frame(handle),
            None => Err(CameraError::NotStreaming),
        };

        let jpeg = match frame {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!("Frame capture failed: {}", err);
                return Some(Event::FrameValidated {
                    ticket,
                    captured_at,
                    result: Err(SubmitError::CameraInactive),
                });
            }
        };

        let validator = Arc::clone(&self.validator);
        let session = self.controller.session().clone();
        let events = self.events_tx.clone();

        tokio::task::spawn_blocking(move || {
            let submission = FrameSubmission {
                endpoint: &session.validation_endpoint,
                subject_id: &session.subject_id,
                secondary_id: &session.secondary_id,
                jpeg: &jpeg,
                token: &token,
            };
            let result = validator.submit(&submission);
            let _ = events.send_blocking(Event::FrameValidated { ticket, captured_at, result });
        });

        None
    }

    fn release_camera(&mut self) {
        if let Some(handle) = self.stream.take() {
            self.camera.release(&handle);
        }
    }

    fn publish_view(&mut self) {
        let Some(observer) = &self.observer else {
            return;
        };

        let view = self.controller.view();
        if self.last_view.as_ref() == Some(&view) {
            return;
        }

        if self.last_view.as_ref().map_or(true, |v| v.page != view.page) {
            info!("Page: {:?}", view.page);
        }
        debug!("View: {:?} {:?}", view.page, view.capture_phase);
        if observer.try_send(view.clone()).is_err() {
            debug!("View observer is gone");
        }
        self.last_view = Some(view);
    }
}
