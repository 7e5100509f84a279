//! Dispatch router
//!
//! Owns the one open [`Channel`] and decides, per request, which kind of
//! terminal handles it. The decision is made synchronously when a request
//! is accepted and is never revisited for that request.

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, VIRTUAL_PORT};
use crate::error::LinkError;
use crate::state::{ChannelId, SimulatorStatus};

/// Where a request is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Hardware terminal on a serial line
    Serial,
    /// In-process simulated terminal
    Simulator,
}

/// Owner of the active channel
#[derive(Debug)]
pub struct DispatchRouter {
    active: Option<Channel>,
    next_id: u32,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self {
            active: None,
            next_id: 1,
        }
    }

    /// Allocate an id for a channel about to be opened
    pub fn next_channel_id(&mut self) -> ChannelId {
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Pick the route for a new request
    ///
    /// The simulator wins whenever it is the active channel.
    pub fn route(&self) -> Result<Route, LinkError> {
        match &self.active {
            Some(channel) if channel.is_simulated() => Ok(Route::Simulator),
            Some(_) => Ok(Route::Serial),
            None => Err(LinkError::NotConnected),
        }
    }

    /// Make `channel` the active one, returning the channel it replaces
    ///
    /// The caller must close the returned channel.
    #[must_use]
    pub fn install(&mut self, channel: Channel) -> Option<Channel> {
        self.active.replace(channel)
    }

    /// Remove the active channel
    pub fn take_active(&mut self) -> Option<Channel> {
        self.active.take()
    }

    pub fn active(&self) -> Option<&Channel> {
        self.active.as_ref()
    }

    /// Check whether `id` is the active channel
    pub fn is_active(&self, id: ChannelId) -> bool {
        self.active.as_ref().is_some_and(|c| c.id() == id)
    }

    pub fn simulator_running(&self) -> bool {
        self.active.as_ref().is_some_and(Channel::is_simulated)
    }

    pub fn simulator_status(&self) -> SimulatorStatus {
        let running = self.simulator_running();
        SimulatorStatus {
            running,
            transport_identifier: running.then(|| VIRTUAL_PORT.to_string()),
        }
    }
}

impl Default for DispatchRouter {
    fn default() -> Self {
        Self::new()
    }
}
