use pulse_core::SinkFailure;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Posted { blocks: usize },
    /// Nothing worth posting, e.g. an error poll that found nothing.
    Skipped { reason: String },
    DeliveryFailed { failure: SinkFailure },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::DeliveryFailed { .. })
    }
}
