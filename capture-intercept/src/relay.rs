//! Per-tab history of intercepted messages
//!
//! Each tab keeps a bounded log of its most recent events and the latest known user
//! data. The store is owned by whoever relays messages to the consumers, and sinks write
//! into it through [`crate::sinks::relay::RelaySink`].

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::event::{CanonicalEvent, IdentityUpdate};
use crate::sinks::SinkMessage;

pub type TabId = u64;

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub distinct_id: Option<String>,
    pub properties: Map<String, Value>,
    pub properties_set_once: Map<String, Value>,
    pub timestamp: i64,
}

impl From<IdentityUpdate> for UserData {
    fn from(update: IdentityUpdate) -> Self {
        Self {
            distinct_id: update.distinct_id,
            properties: update.properties,
            properties_set_once: update.properties_set_once,
            timestamp: update.timestamp,
        }
    }
}

impl UserData {
    // Later values win, a missing distinct id keeps the known one
    fn merge(&mut self, update: IdentityUpdate) {
        if update.distinct_id.is_some() {
            self.distinct_id = update.distinct_id;
        }
        self.properties.extend(update.properties);
        self.properties_set_once.extend(update.properties_set_once);
        self.timestamp = update.timestamp;
    }
}

#[derive(Debug, Default)]
struct TabState {
    events: VecDeque<CanonicalEvent>,
    user: Option<UserData>,
}

pub struct RelayStore {
    tabs: DashMap<TabId, TabState>,
    capacity: usize,
}

impl Default for RelayStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RelayStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            tabs: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, tab: TabId, message: SinkMessage) {
        let mut state = self.tabs.entry(tab).or_default();
        match message {
            SinkMessage::Capture(event) => {
                state.events.push_back(event);
                while state.events.len() > self.capacity {
                    state.events.pop_front();
                }
            }
            SinkMessage::Identify(update) => state.user = Some(update.into()),
            SinkMessage::SetPersonProperties(update) => match state.user.as_mut() {
                Some(user) => user.merge(update),
                None => state.user = Some(update.into()),
            },
        }
    }

    /// Events recorded for `tab`, oldest first.
    pub fn events(&self, tab: TabId) -> Vec<CanonicalEvent> {
        self.tabs
            .get(&tab)
            .map(|state| state.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user(&self, tab: TabId) -> Option<UserData> {
        self.tabs.get(&tab).and_then(|state| state.user.clone())
    }

    pub fn clear(&self, tab: TabId) {
        if let Some(mut state) = self.tabs.get_mut(&tab) {
            debug!(tab, "clearing tab history");
            state.events.clear();
            state.user = None;
        }
    }

    pub fn remove_tab(&self, tab: TabId) {
        self.tabs.remove(&tab);
    }
}
