use std::sync::Arc;

use async_trait::async_trait;

use crate::api::SinkError;
use crate::relay::{RelayStore, TabId};
use crate::sinks::{EventSink, SinkMessage};

/// Records everything intercepted in one tab into the shared relay store.
#[derive(Clone)]
pub struct RelaySink {
    tab: TabId,
    store: Arc<RelayStore>,
}

impl RelaySink {
    pub fn new(tab: TabId, store: Arc<RelayStore>) -> Self {
        Self { tab, store }
    }
}

#[async_trait]
impl EventSink for RelaySink {
    async fn publish(&self, message: SinkMessage) -> Result<(), SinkError> {
        self.store.record(self.tab, message);
        Ok(())
    }
}
