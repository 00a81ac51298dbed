//! Channel registry: the set of live channels for the active household.

use std::rc::Rc;

use familyplanner_shared::HouseholdId;
use url::Url;

use super::connection::{Channel, ChannelId, ChannelKind, ConnectionState, TransportFactory};
use super::reconnect::ReconnectPolicy;
use super::scheduler::Scheduler;

/// Owns one [`Channel`] per configured kind, all bound to the same household.
///
/// Switching household tears every channel down before the new ones are
/// opened, so no socket for the previous household outlives the switch.
pub struct ChannelRegistry {
    ws_base: Url,
    kinds: Vec<ChannelKind>,
    policy: ReconnectPolicy,
    scheduler: Rc<dyn Scheduler>,
    transports: Rc<dyn TransportFactory>,
    household: Option<HouseholdId>,
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn new(
        ws_base: Url,
        policy: ReconnectPolicy,
        scheduler: Rc<dyn Scheduler>,
        transports: Rc<dyn TransportFactory>,
    ) -> Self {
        Self {
            ws_base,
            kinds: ChannelKind::ALL.to_vec(),
            policy,
            scheduler,
            transports,
            household: None,
            channels: Vec::new(),
        }
    }

    /// Restrict the registry to a subset of channel kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ChannelKind>) -> Self {
        let mut kinds: Vec<ChannelKind> = kinds.into_iter().collect();
        kinds.sort();
        kinds.dedup();
        self.kinds = kinds;
        self
    }

    pub fn household(&self) -> Option<HouseholdId> {
        self.household
    }

    /// Build and open a channel of every kind for `household`.
    ///
    /// Returns `false` without touching anything when that household is
    /// already active.
    pub fn activate(&mut self, household: HouseholdId) -> bool {
        if self.household == Some(household) && !self.channels.is_empty() {
            tracing::debug!(%household, "household already active");
            return false;
        }
        self.deactivate();

        tracing::info!(%household, "activating channels");
        for &kind in &self.kinds {
            let id = ChannelId::new(kind, household);
            let channel = Channel::new(
                id,
                id.endpoint(&self.ws_base),
                self.transports.create(&id),
                self.policy.clone(),
                Rc::clone(&self.scheduler),
            );
            self.channels.push(channel);
        }
        self.household = Some(household);
        for channel in &self.channels {
            channel.open();
        }
        true
    }

    /// Close and forget every channel.
    pub fn deactivate(&mut self) {
        if let Some(household) = self.household.take() {
            tracing::info!(%household, "deactivating channels");
        }
        for channel in self.channels.drain(..) {
            channel.dispose();
        }
    }

    /// Force every channel through close and open with a fresh retry budget.
    pub fn reconnect_all(&self) {
        for channel in &self.channels {
            channel.reconnect();
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id().kind == kind)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// True only when every channel is connected.
    pub fn is_connected(&self) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(Channel::is_connected)
    }

    pub fn states(&self) -> Vec<(ChannelId, ConnectionState)> {
        self.channels.iter().map(|c| (c.id(), c.state())).collect()
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransportFactory, ManualScheduler};

    fn registry() -> (ChannelRegistry, Rc<FakeTransportFactory>) {
        let factory = FakeTransportFactory::new();
        let registry = ChannelRegistry::new(
            Url::parse("ws://planner.test").expect("url"),
            ReconnectPolicy::default(),
            ManualScheduler::new(),
            factory.clone(),
        );
        (registry, factory)
    }

    #[test]
    fn activate_opens_one_channel_per_kind() {
        let (mut registry, factory) = registry();
        assert!(registry.activate(HouseholdId(3)));

        assert_eq!(registry.channels().len(), 3);
        for kind in ChannelKind::ALL {
            let transport = factory.latest(kind);
            assert_eq!(
                transport.last_url(),
                Some(format!("ws://planner.test/ws/{kind}/3/"))
            );
            assert_eq!(
                registry.channel(kind).map(Channel::state),
                Some(ConnectionState::Connecting)
            );
        }
    }

    #[test]
    fn activating_the_same_household_is_a_no_op() {
        let (mut registry, factory) = registry();
        registry.activate(HouseholdId(3));
        assert!(!registry.activate(HouseholdId(3)));
        assert_eq!(factory.created(ChannelKind::Weather), 1);
    }

    #[test]
    fn switching_household_closes_old_channels_first() {
        let (mut registry, factory) = registry();
        registry.activate(HouseholdId(3));
        let old = factory.latest(ChannelKind::Dashboard);
        old.accept();

        registry.activate(HouseholdId(4));
        assert_eq!(old.close_count(), 1);
        assert_eq!(registry.household(), Some(HouseholdId(4)));
        assert_eq!(
            factory.latest(ChannelKind::Dashboard).last_url().as_deref(),
            Some("ws://planner.test/ws/dashboard/4/")
        );
    }

    #[test]
    fn connected_only_when_every_channel_is() {
        let (mut registry, factory) = registry();
        assert!(!registry.is_connected());
        registry.activate(HouseholdId(3));

        factory.latest(ChannelKind::Dashboard).accept();
        factory.latest(ChannelKind::Weather).accept();
        assert!(!registry.is_connected());

        factory.latest(ChannelKind::Calendar).accept();
        assert!(registry.is_connected());
        assert!(registry
            .states()
            .iter()
            .all(|(_, state)| *state == ConnectionState::Connected));
    }

    #[test]
    fn reconnect_all_cycles_every_channel() {
        let (mut registry, factory) = registry();
        registry.activate(HouseholdId(3));
        for kind in ChannelKind::ALL {
            factory.latest(kind).accept();
        }

        registry.reconnect_all();
        for kind in ChannelKind::ALL {
            let transport = factory.latest(kind);
            assert_eq!(transport.close_count(), 1);
            assert_eq!(transport.open_count(), 2);
        }
    }

    #[test]
    fn deactivate_clears_everything() {
        let (mut registry, factory) = registry();
        registry.activate(HouseholdId(3));
        factory.latest(ChannelKind::Calendar).accept();

        registry.deactivate();
        assert!(registry.channels().is_empty());
        assert_eq!(registry.household(), None);
        assert_eq!(factory.latest(ChannelKind::Calendar).close_count(), 1);
    }

    #[test]
    fn kinds_can_be_restricted() {
        let factory = FakeTransportFactory::new();
        let mut registry = ChannelRegistry::new(
            Url::parse("ws://planner.test").expect("url"),
            ReconnectPolicy::default(),
            ManualScheduler::new(),
            factory.clone(),
        )
        .with_kinds([ChannelKind::Weather]);
        registry.activate(HouseholdId(9));
        assert_eq!(registry.channels().len(), 1);
        assert!(registry.channel(ChannelKind::Dashboard).is_none());
    }
}
