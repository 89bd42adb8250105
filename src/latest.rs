use std::sync::Arc;

use parking_lot::RwLock;

use crate::posture::PostureResult;

/// Most recent classification, written by the capture loop and read by any number of
/// consumers. Reads return an owned copy.
#[derive(Debug, Clone, Default)]
pub struct LatestResult {
    inner: Arc<RwLock<Option<PostureResult>>>,
}

impl LatestResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, result: PostureResult) {
        *self.inner.write() = Some(result);
    }

    pub fn snapshot(&self) -> Option<PostureResult> {
        self.inner.read().clone()
    }
}
