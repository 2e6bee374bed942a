use std::collections::BTreeMap;

use log::{debug, info};
use machine_learning::training::EpochEnd;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::client::ClientId;

/// The metrics of one epoch of a client's local training.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub client_id: ClientId,
    pub epoch: usize,
    pub val_accuracy: f32,
    pub loss: f32,
    pub val_loss: f32,
}

/// The accuracy of the global model produced in a round, rounds are counted from 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundRecord {
    pub round: usize,
    pub accuracy: f32,
}

/// Everything a metrics sink is told, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsEvent {
    Epoch(EpochRecord),
    Round(RoundRecord),
    Reset,
}

/// Observes the recorded metrics, for instance to draw them.
pub trait MetricsSink: Send + Sync {
    fn on_epoch(&self, record: &EpochRecord);
    fn on_round(&self, record: &RoundRecord);
    fn on_reset(&self);
}

/// Writes every record to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn on_epoch(&self, record: &EpochRecord) {
        debug!(
            client_id = record.client_id, epoch = record.epoch;
            "val_accuracy={:.4} loss={:.4} val_loss={:.4}",
            record.val_accuracy, record.loss, record.val_loss
        );
    }

    fn on_round(&self, record: &RoundRecord) {
        info!(round = record.round; "global accuracy {:.4}", record.accuracy);
    }

    fn on_reset(&self) {
        info!("metrics cleared");
    }
}

/// Forwards every record through a channel, for a UI running elsewhere.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MetricsEvent>,
}

impl ChannelSink {
    /// Creates a new `ChannelSink`.
    ///
    /// # Returns
    /// The sink and the receiving end of its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MetricsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    // A closed receiver only means nobody is watching anymore.
    fn send(&self, event: MetricsEvent) {
        let _ = self.tx.send(event);
    }
}

impl MetricsSink for ChannelSink {
    fn on_epoch(&self, record: &EpochRecord) {
        self.send(MetricsEvent::Epoch(*record));
    }

    fn on_round(&self, record: &RoundRecord) {
        self.send(MetricsEvent::Round(*record));
    }

    fn on_reset(&self) {
        self.send(MetricsEvent::Reset);
    }
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn on_epoch(&self, _: &EpochRecord) {}
    fn on_round(&self, _: &RoundRecord) {}
    fn on_reset(&self) {}
}

/// Keeps the per-epoch and per-round histories, notifying the sink of every change.
pub struct MetricsRecorder {
    epochs: Mutex<BTreeMap<ClientId, Vec<EpochRecord>>>,
    rounds: Mutex<Vec<RoundRecord>>,
    sink: Box<dyn MetricsSink>,
}

impl MetricsRecorder {
    pub fn new(sink: Box<dyn MetricsSink>) -> Self {
        Self {
            epochs: Mutex::new(BTreeMap::new()),
            rounds: Mutex::new(Vec::new()),
            sink,
        }
    }

    pub fn record_epoch(&self, client_id: ClientId, end: &EpochEnd) -> EpochRecord {
        let record = EpochRecord {
            client_id,
            epoch: end.epoch,
            val_accuracy: end.val_accuracy,
            loss: end.loss,
            val_loss: end.val_loss,
        };

        self.epochs.lock().entry(client_id).or_default().push(record);
        self.sink.on_epoch(&record);
        record
    }

    /// Appends the accuracy of a new round.
    ///
    /// # Returns
    /// The record, numbered after the rounds recorded since the last reset.
    pub fn record_round(&self, accuracy: f32) -> RoundRecord {
        let record = {
            let mut rounds = self.rounds.lock();
            let record = RoundRecord {
                round: rounds.len() + 1,
                accuracy,
            };
            rounds.push(record);
            record
        };

        self.sink.on_round(&record);
        record
    }

    /// The round the next recorded accuracy will get.
    pub fn next_round(&self) -> usize {
        self.rounds.lock().len() + 1
    }

    pub fn reset_all(&self) {
        self.epochs.lock().clear();
        self.rounds.lock().clear();
        self.sink.on_reset();
    }

    pub fn client_epochs(&self, client_id: ClientId) -> Vec<EpochRecord> {
        self.epochs
            .lock()
            .get(&client_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn rounds(&self) -> Vec<RoundRecord> {
        self.rounds.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(epoch: usize) -> EpochEnd {
        EpochEnd {
            epoch,
            loss: 1.,
            val_loss: 1.5,
            val_accuracy: 0.5,
        }
    }

    #[test]
    fn rounds_are_numbered_from_one_after_every_reset() {
        let recorder = MetricsRecorder::new(Box::new(NullSink));

        assert_eq!(recorder.record_round(0.2).round, 1);
        assert_eq!(recorder.record_round(0.4).round, 2);
        assert_eq!(recorder.next_round(), 3);

        recorder.reset_all();
        assert!(recorder.rounds().is_empty());
        assert_eq!(recorder.record_round(0.6).round, 1);
    }

    #[test]
    fn epochs_are_kept_per_client() {
        let recorder = MetricsRecorder::new(Box::new(NullSink));
        recorder.record_epoch(2, &end(1));
        recorder.record_epoch(2, &end(2));
        recorder.record_epoch(3, &end(1));

        let epochs: Vec<_> = recorder.client_epochs(2).iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
        assert!(recorder.client_epochs(1).is_empty());
    }

    #[test]
    fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let recorder = MetricsRecorder::new(Box::new(sink));

        let epoch = recorder.record_epoch(1, &end(1));
        let round = recorder.record_round(0.9);
        recorder.reset_all();

        assert_eq!(rx.try_recv().unwrap(), MetricsEvent::Epoch(epoch));
        assert_eq!(rx.try_recv().unwrap(), MetricsEvent::Round(round));
        assert_eq!(rx.try_recv().unwrap(), MetricsEvent::Reset);
    }
}
