//! Awareness: ephemeral, non-CRDT presence state (cursor position,
//! selection, user name/color, online indicator) shared out-of-band from
//! document content. Deliberately not modeled as a shared type:
//! state here is last-writer-wins per client and expires on a timer, neither
//! of which the document CRDT's convergence machinery in `transaction.rs` is
//! built for, so it gets its own small protocol instead.

use crate::id::ClientID;
use crate::utils::{ObserverFn, Subscription};
use lib0::any::Any;
use lib0::decoding::{Cursor, Read};
use lib0::encoding::Write;
use lib0::Error as Lib0Error;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// How long a remote client's state is kept after its last update before
/// `Awareness::remove_stale_states` considers it gone.
pub const EXPIRY_TIMEOUT_MILLIS: u64 = 30_000;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct ClientState {
    /// `None` once the client has explicitly cleared its state; the meta
    /// entry (and clock) is kept around so a late-arriving update with a
    /// stale clock is still rejected rather than resurrecting it.
    state: Option<Any>,
    clock: u32,
    last_updated: u64,
}

/// Which client ids were newly seen, which had their state replaced, and
/// which were removed (explicitly or by timeout) since the last change.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AwarenessEvent {
    pub added: Vec<ClientID>,
    pub updated: Vec<ClientID>,
    pub removed: Vec<ClientID>,
}

impl AwarenessEvent {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// The decoded form of an awareness wire message: a batch of per-client
/// `(clock, state)` pairs || {varUint(client),
/// varUint(clock), varString(json-state)}*`; an empty string decodes to "no
/// state", i.e. a removal).
pub struct AwarenessUpdate {
    pub clients: HashMap<ClientID, (u32, Option<Any>)>,
}

impl AwarenessUpdate {
    pub fn encode_v1(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_var(self.clients.len() as u64);
        for (client, (clock, state)) in &self.clients {
            buf.write_var(*client);
            buf.write_var(*clock as u64);
            match state {
                Some(any) => {
                    let mut payload = Vec::new();
                    any.encode(&mut payload);
                    buf.write_buf(&payload);
                }
                None => buf.write_buf(&[]),
            }
        }
        buf
    }

    pub fn decode_v1(bytes: &[u8]) -> Result<AwarenessUpdate, Lib0Error> {
        let mut cursor = Cursor::new(bytes);
        let n: u64 = cursor.read_var()?;
        let mut clients = HashMap::with_capacity(n as usize);
        for _ in 0..n {
            let client: ClientID = cursor.read_var()?;
            let clock: u32 = cursor.read_var()?;
            let payload = cursor.read_buf()?;
            let state = if payload.is_empty() {
                None
            } else {
                let mut inner = Cursor::new(payload);
                Some(Any::decode(&mut inner)?)
            };
            clients.insert(client, (clock, state));
        }
        Ok(AwarenessUpdate { clients })
    }
}

/// Tracks every replica's ephemeral presence state. Each client publishes an
/// opaque `Any` blob tagged with a clock only that client ever increments;
/// an incoming update for a client is accepted only if its clock is strictly
/// greater, or equal with a `None` state — an explicit removal always wins a
/// tie against a stale resend.
pub struct Awareness {
    client_id: ClientID,
    states: HashMap<ClientID, ClientState>,
    events: ObserverFn<AwarenessEvent>,
}

impl Awareness {
    pub fn new(client_id: ClientID) -> Self {
        Awareness {
            client_id,
            states: HashMap::new(),
            events: ObserverFn::default(),
        }
    }

    pub fn client_id(&self) -> ClientID {
        self.client_id
    }

    /// This replica's own published state, if any.
    pub fn local_state(&self) -> Option<&Any> {
        self.states.get(&self.client_id).and_then(|s| s.state.as_ref())
    }

    /// Publishes (or replaces) this replica's own state, bumping its clock.
    pub fn set_local_state(&mut self, state: Any) {
        self.update_client(self.client_id, Some(state));
    }

    /// Explicitly clears this replica's own state (e.g. on clean
    /// disconnect) — a real remove, not a timeout.
    pub fn clear_local_state(&mut self) {
        self.update_client(self.client_id, None);
    }

    pub fn state(&self, client: ClientID) -> Option<&Any> {
        self.states.get(&client).and_then(|s| s.state.as_ref())
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientID> + '_ {
        self.states.iter().filter(|(_, s)| s.state.is_some()).map(|(c, _)| *c)
    }

    fn update_client(&mut self, client: ClientID, state: Option<Any>) {
        let clock = self.states.get(&client).map(|s| s.clock + 1).unwrap_or(0);
        let added = !self.states.contains_key(&client);
        self.states.insert(
            client,
            ClientState { state, clock, last_updated: now_millis() },
        );
        let mut event = AwarenessEvent::default();
        if added {
            event.added.push(client);
        } else {
            event.updated.push(client);
        }
        self.fire(event);
    }

    /// Folds a remote update in: each client entry is applied
    /// only if it advances that client's clock, or ties it while clearing
    /// the state.
    pub fn apply_update(&mut self, update: AwarenessUpdate) -> AwarenessEvent {
        let mut event = AwarenessEvent::default();
        for (client, (clock, state)) in update.clients {
            let accept = match self.states.get(&client) {
                None => true,
                Some(existing) => clock > existing.clock || (clock == existing.clock && state.is_none()),
            };
            if !accept {
                continue;
            }
            let added = !self.states.contains_key(&client);
            let removed = state.is_none();
            self.states.insert(
                client,
                ClientState { state, clock, last_updated: now_millis() },
            );
            if added {
                event.added.push(client);
            } else if removed {
                event.removed.push(client);
            } else {
                event.updated.push(client);
            }
        }
        if !event.is_empty() {
            self.fire(event.clone());
        }
        event
    }

    /// Encodes every known client's current state (or just `clients`, when
    /// only a subset needs broadcasting).
    pub fn encode_update(&self) -> AwarenessUpdate {
        let clients = self
            .states
            .iter()
            .map(|(client, s)| (*client, (s.clock, s.state.clone())))
            .collect();
        AwarenessUpdate { clients }
    }

    pub fn encode_update_for(&self, clients: &[ClientID]) -> AwarenessUpdate {
        let clients = clients
            .iter()
            .filter_map(|c| self.states.get(c).map(|s| (*c, (s.clock, s.state.clone()))))
            .collect();
        AwarenessUpdate { clients }
    }

    /// Drops any *other* client's state untouched for longer than `timeout`
    /// millis, as if it had sent an explicit removal. Never evicts this replica's own local state.
    pub fn remove_stale_states(&mut self, timeout: u64) -> AwarenessEvent {
        let now = now_millis();
        let local = self.client_id;
        let stale: Vec<ClientID> = self
            .states
            .iter()
            .filter(|(client, s)| **client != local && s.state.is_some() && now.saturating_sub(s.last_updated) > timeout)
            .map(|(c, _)| *c)
            .collect();
        let mut event = AwarenessEvent::default();
        for client in stale {
            if let Some(s) = self.states.get_mut(&client) {
                s.state = None;
                s.clock += 1;
                s.last_updated = now;
                event.removed.push(client);
            }
        }
        if !event.is_empty() {
            self.fire(event.clone());
        }
        event
    }

    pub fn on_update<F>(&self, f: F) -> Subscription
    where
        F: Fn(&AwarenessEvent) + 'static,
    {
        self.events.subscribe_fn(f)
    }

    fn fire(&self, event: AwarenessEvent) {
        if let Some(callbacks) = self.events.callbacks() {
            for cb in callbacks {
                (cb)(&event);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn local_state_publishes_and_bumps_clock() {
        let mut awareness = Awareness::new(1);
        awareness.set_local_state(Any::from("online".to_string()));
        assert_eq!(awareness.local_state(), Some(&Any::from("online".to_string())));
        awareness.set_local_state(Any::from("away".to_string()));
        assert_eq!(awareness.local_state(), Some(&Any::from("away".to_string())));
    }

    #[test]
    fn remote_update_with_lower_clock_is_rejected() {
        let mut a = Awareness::new(1);
        let mut update = HashMap::new();
        update.insert(2, (5u32, Some(Any::from("first".to_string()))));
        a.apply_update(AwarenessUpdate { clients: update });
        assert_eq!(a.state(2), Some(&Any::from("first".to_string())));

        let mut stale = HashMap::new();
        stale.insert(2, (3u32, Some(Any::from("stale".to_string()))));
        a.apply_update(AwarenessUpdate { clients: stale });
        assert_eq!(a.state(2), Some(&Any::from("first".to_string())));
    }

    #[test]
    fn equal_clock_with_null_state_wins_as_explicit_removal() {
        let mut a = Awareness::new(1);
        let mut update = HashMap::new();
        update.insert(2, (5u32, Some(Any::from("online".to_string()))));
        a.apply_update(AwarenessUpdate { clients: update });

        let mut removal = HashMap::new();
        removal.insert(2, (5u32, None));
        let event = a.apply_update(AwarenessUpdate { clients: removal });
        assert_eq!(event.removed, vec![2]);
        assert_eq!(a.state(2), None);
    }

    #[test]
    fn wire_roundtrip_preserves_clients_and_state() {
        let mut a = Awareness::new(1);
        a.set_local_state(Any::from("hi".to_string()));
        let bytes = a.encode_update().encode_v1();
        let decoded = AwarenessUpdate::decode_v1(&bytes).unwrap();
        assert_eq!(decoded.clients.len(), 1);
        let (_, state) = decoded.clients.get(&1).unwrap();
        assert_eq!(state, &Some(Any::from("hi".to_string())));
    }

    #[test]
    fn stale_remote_state_is_evicted_after_timeout() {
        let mut a = Awareness::new(1);
        let mut update = HashMap::new();
        update.insert(2, (0u32, Some(Any::from("online".to_string()))));
        a.apply_update(AwarenessUpdate { clients: update });
        // force staleness by rewinding last_updated directly
        a.states.get_mut(&2).unwrap().last_updated = 0;
        let event = a.remove_stale_states(EXPIRY_TIMEOUT_MILLIS);
        assert_eq!(event.removed, vec![2]);
        assert_eq!(a.state(2), None);
    }

    #[test]
    fn local_client_is_never_evicted_by_stale_sweep() {
        let mut a = Awareness::new(1);
        a.set_local_state(Any::from("online".to_string()));
        a.states.get_mut(&1).unwrap().last_updated = 0;
        let event = a.remove_stale_states(EXPIRY_TIMEOUT_MILLIS);
        assert!(event.removed.is_empty());
        assert!(a.local_state().is_some());
    }
}
