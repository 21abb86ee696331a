//! Observer sinks for run events.
//!
//! A run talks to the outside world only through an `Observer`: ordered
//! progress events followed by exactly one completion notice.

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{Completion, Phase, ProgressEvent};

/// Receives run events in production order
pub trait Observer: Send {
    fn on_progress(&mut self, event: ProgressEvent);

    fn on_complete(&mut self, completion: &Completion);
}

/// Event as delivered over a channel
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Finished(Completion),
}

/// Forwards events to an unbounded channel; the producer never blocks
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            debug!("Observer channel closed, dropping event");
        }
    }
}

impl Observer for ChannelObserver {
    fn on_progress(&mut self, event: ProgressEvent) {
        self.send(PipelineEvent::Progress(event));
    }

    fn on_complete(&mut self, completion: &Completion) {
        self.send(PipelineEvent::Finished(completion.clone()));
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<ProgressEvent>,
    pub completions: Vec<Completion>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phases in order of first appearance, consecutive repeats collapsed
    pub fn phases(&self) -> Vec<Phase> {
        let mut phases: Vec<Phase> = Vec::new();
        for event in &self.events {
            if phases.last() != Some(&event.phase) {
                phases.push(event.phase);
            }
        }
        phases
    }

    pub fn messages(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.message.as_str()).collect()
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completions.last()
    }
}

impl Observer for RecordingObserver {
    fn on_progress(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }

    fn on_complete(&mut self, completion: &Completion) {
        self.completions.push(completion.clone());
    }
}
