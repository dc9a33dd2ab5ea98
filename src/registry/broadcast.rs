//! Fan-out outcome types

/// Result of delivering one payload to one viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to the viewer's transport session
    Delivered,
    /// Viewer was already inactive; nothing sent
    Skipped,
    /// Send failed; the viewer has deactivated itself
    Failed,
}

/// Per-viewer outcomes of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Skipped => self.skipped += 1,
            DeliveryOutcome::Failed => self.failed += 1,
        }
    }

    /// Number of viewers in the broadcast snapshot
    pub fn targeted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

impl FromIterator<DeliveryOutcome> for BroadcastReport {
    fn from_iter<I: IntoIterator<Item = DeliveryOutcome>>(iter: I) -> Self {
        let mut report = Self::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

/// Result of a publisher handing a datagram to its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Fanned out to the channel's viewers
    Broadcast(BroadcastReport),
    /// Sender no longer occupies the publisher slot; datagram dropped
    NotPublisher,
    /// Publisher session is not active; datagram dropped
    Inactive,
}

impl RelayOutcome {
    pub fn report(&self) -> Option<&BroadcastReport> {
        match self {
            RelayOutcome::Broadcast(report) => Some(report),
            _ => None,
        }
    }
}
