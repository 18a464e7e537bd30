use async_channel::Sender;
use log::debug;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::flow::{Event, Ticket, TimerKind};

/// Runs the flow's timers (camera warm-up, capture countdown, failure notice)
/// as sleeping tasks that report back as events.
#[derive(Default)]
pub struct Timers {
    running: Vec<JoinHandle<()>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, timer: TimerKind, ticket: Ticket, after: Duration, events: Sender<Event>) {
        self.running.retain(|handle| !handle.is_finished());

        debug!("Scheduling {:?} timer #{} in {:?}", timer, ticket, after);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(Event::TimerElapsed { timer, ticket }).await;
        });
        self.running.push(handle);
    }

    pub fn cancel_all(&mut self) {
        for handle in self.running.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_timer_reports_its_ticket() {
        let (tx, rx) = async_channel::unbounded();
        let mut timers = Timers::new();

        timers.schedule(TimerKind::Countdown, 7, Duration::from_millis(5), tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event::TimerElapsed { timer: TimerKind::Countdown, ticket: 7 });
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, rx) = async_channel::unbounded();
        let mut timers = Timers::new();

        timers.schedule(TimerKind::Notice, 1, Duration::from_millis(20), tx.clone());
        timers.cancel_all();
        timers.schedule(TimerKind::Countdown, 2, Duration::from_millis(40), tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event::TimerElapsed { timer: TimerKind::Countdown, ticket: 2 });
        assert!(rx.try_recv().is_err());
    }
}
