//! Capturing sinks

use parking_lot::Mutex;
use vigil_core::{VigilError, VigilResult};
use vigil_recovery::{RecoveryReceipt, SecretSink};

/// Records every delivery.
#[derive(Debug, Default)]
pub struct CapturingSecretSink {
    deliveries: Mutex<Vec<(RecoveryReceipt, Vec<u8>)>>,
}

impl CapturingSecretSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(RecoveryReceipt, Vec<u8>)> {
        self.deliveries.lock().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Secret from the only delivery; panics otherwise.
    pub fn single_secret(&self) -> Vec<u8> {
        let deliveries = self.deliveries.lock();
        assert_eq!(deliveries.len(), 1, "expected exactly one delivery");
        deliveries[0].1.clone()
    }
}

impl SecretSink for CapturingSecretSink {
    fn deliver(&self, receipt: &RecoveryReceipt, secret: &[u8]) -> VigilResult<()> {
        self.deliveries
            .lock()
            .push((receipt.clone(), secret.to_vec()));
        Ok(())
    }
}

/// Rejects every delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSecretSink;

impl SecretSink for FailingSecretSink {
    fn deliver(&self, _receipt: &RecoveryReceipt, _secret: &[u8]) -> VigilResult<()> {
        Err(VigilError::internal("delivery channel unavailable"))
    }
}
