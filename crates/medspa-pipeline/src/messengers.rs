// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel reply messengers.

use std::collections::HashMap;
use std::sync::Arc;

use medspa_core::{Channel, ReplyMessenger};

/// Reply messengers keyed by channel. A channel without a messenger gets no
/// outbound replies; the worker logs the skip.
#[derive(Clone, Default)]
pub struct MessengerRegistry {
    by_channel: HashMap<Channel, Arc<dyn ReplyMessenger>>,
}

impl MessengerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, messenger: Arc<dyn ReplyMessenger>) -> Self {
        self.register(channel, messenger);
        self
    }

    pub fn register(&mut self, channel: Channel, messenger: Arc<dyn ReplyMessenger>) {
        self.by_channel.insert(channel, messenger);
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ReplyMessenger>> {
        self.by_channel.get(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.by_channel.keys().copied()
    }
}
