//! Debounced loudness publication
//!
//! Raw loudness arrives every sampler tick; the number shown to the user
//! should not jitter at that rate. `debounce` groups values into bursts: a
//! burst opens with the first value and collects every value arriving within
//! `window` of that opening. Each burst emits exactly one value, its latest
//! member, once `window` has passed without a newer member.
//!
//! With a 500 ms window, inputs at 0, 100, 200 and 600 ms emit the 200 ms
//! value at 700 ms and the 600 ms value at 1100 ms.
//!
//! Closing the input or aborting the task discards anything still pending,
//! so nothing stale is emitted after the sampler stops.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Default debounce window
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

struct Pending<T> {
    value: T,
    due: Instant,
}

/// Running debounce task
pub struct Debounced<T> {
    task: JoinHandle<()>,
    output: UnboundedReceiver<T>,
}

impl<T> Debounced<T> {
    /// Next emitted value; `None` once the input closed and the task exited
    pub async fn recv(&mut self) -> Option<T> {
        self.output.recv().await
    }

    /// Split into the task handle and the output stream
    pub fn into_parts(self) -> (JoinHandle<()>, UnboundedReceiver<T>) {
        (self.task, self.output)
    }

    /// Cancel the task and any pending emission
    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Spawn a debounce task over `input`. Must be called within a tokio runtime.
pub fn debounce<T: Send + 'static>(window: Duration, input: UnboundedReceiver<T>) -> Debounced<T> {
    let (tx, output) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(window, input, tx));
    Debounced { task, output }
}

/// Plain trailing debounce: every value restarts the window, and only the
/// value that is still latest when the window runs out is emitted. Steady
/// input shorter than `window` apart emits nothing until it pauses.
pub fn debounce_trailing<T: Send + 'static>(
    window: Duration,
    input: UnboundedReceiver<T>,
) -> Debounced<T> {
    let (tx, output) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_trailing(window, input, tx));
    Debounced { task, output }
}

async fn run_trailing<T>(
    window: Duration,
    mut input: UnboundedReceiver<T>,
    output: UnboundedSender<T>,
) {
    let mut pending: Option<Pending<T>> = None;

    loop {
        let next_due = pending.as_ref().map(|p| p.due);

        tokio::select! {
            biased;

            received = input.recv() => {
                let Some(value) = received else {
                    return;
                };
                pending = Some(Pending { value, due: Instant::now() + window });
            }

            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                if let Some(ready) = pending.take() {
                    if output.send(ready.value).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

async fn run<T>(window: Duration, mut input: UnboundedReceiver<T>, output: UnboundedSender<T>) {
    let mut pending: VecDeque<Pending<T>> = VecDeque::new();
    let mut burst_opened: Option<Instant> = None;

    loop {
        let next_due = pending.front().map(|p| p.due);

        tokio::select! {
            biased;

            received = input.recv() => {
                let Some(value) = received else {
                    if !pending.is_empty() {
                        tracing::debug!("Smoother: input closed, dropping {} pending value(s)", pending.len());
                    }
                    return;
                };

                let now = Instant::now();
                let joins_burst = burst_opened.is_some_and(|opened| now < opened + window);
                match pending.back_mut() {
                    Some(last) if joins_burst => {
                        last.value = value;
                        last.due = now + window;
                    }
                    _ => {
                        burst_opened = Some(now);
                        pending.push_back(Pending { value, due: now + window });
                    }
                }
            }

            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                if let Some(ready) = pending.pop_front() {
                    if output.send(ready.value).is_err() {
                        return;
                    }
                }
            }
        }
    }
}
