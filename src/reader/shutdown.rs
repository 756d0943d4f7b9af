use tokio_util::sync::CancellationToken;

/// One-shot "has stopped" flag shared between a teardown task and its waiters
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    has_stopped: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark teardown as finished and wake every waiter
    pub fn trigger_has_stopped(&self) {
        self.has_stopped.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.has_stopped.is_cancelled()
    }

    /// Wait until teardown has finished
    pub async fn has_stopped(&self) {
        self.has_stopped.cancelled().await;
    }
}
