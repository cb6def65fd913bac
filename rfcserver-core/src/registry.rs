//! Registry of function handlers registered with the backend
//!
//! Registration is keyed by (system id, function name). A second registration
//! of the same key is a no-op detected before the backend is asked to
//! register anything. The registry is handed to the server's pending
//! references as a single disposable and releases every token on dispose.

use crate::references::{Disposable, RegistrationToken};
use parking_lot::Mutex;
use rfcserver_types::{FunctionName, SystemId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

type RegistryKey = (SystemId, FunctionName);

#[derive(Default)]
struct RegistryState {
    keys: HashSet<RegistryKey>,
    tokens: Vec<(RegistryKey, RegistrationToken)>,
    released: bool,
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The token was stored
    Created,
    /// The key was already registered; the existing token is kept
    AlreadyRegistered,
    /// The registry has been released; nothing is stored
    Released,
}

/// Function registrations per logical system
#[derive(Default)]
pub struct FunctionRegistry {
    state: Mutex<RegistryState>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, system_id: &SystemId, name: &FunctionName) -> bool {
        self.state
            .lock()
            .keys
            .contains(&(system_id.clone(), name.clone()))
    }

    /// Record a registration token
    ///
    /// The first token for a key is kept. A token that is not stored, either
    /// because the key is taken or because the registry has been released,
    /// is released right away so its backend registration does not leak.
    pub fn register(&self, system_id: &SystemId, name: &FunctionName, token: RegistrationToken) -> Registration {
        let key = (system_id.clone(), name.clone());
        let outcome = {
            let mut state = self.state.lock();
            if state.released {
                Registration::Released
            } else if state.keys.contains(&key) {
                Registration::AlreadyRegistered
            } else {
                state.keys.insert(key.clone());
                state.tokens.push((key, token));
                return Registration::Created;
            }
        };

        debug!(system_id = %system_id, function = %name, ?outcome, "releasing unused registration token");
        token.dispose();
        outcome
    }

    /// Register a function unless it is already registered
    ///
    /// `create` runs only for a new key, while the registry is locked, so two
    /// concurrent registrations of the same key call the backend once. The
    /// lock is held for the duration of `create`: `is_registered` and other
    /// registrations wait behind a slow backend call. Nothing is created once
    /// the registry has been released.
    pub fn register_with<E, F>(&self, system_id: &SystemId, name: &FunctionName, create: F) -> Result<Registration, E>
    where
        F: FnOnce() -> Result<RegistrationToken, E>,
    {
        let mut state = self.state.lock();
        if state.released {
            return Ok(Registration::Released);
        }
        let key = (system_id.clone(), name.clone());
        if state.keys.contains(&key) {
            debug!(system_id = %system_id, function = %name, "function already registered");
            return Ok(Registration::AlreadyRegistered);
        }

        let token = create()?;
        state.keys.insert(key.clone());
        state.tokens.push((key, token));
        Ok(Registration::Created)
    }

    /// Registered function names for a system, in registration order
    pub fn functions(&self, system_id: &SystemId) -> Vec<FunctionName> {
        self.state
            .lock()
            .tokens
            .iter()
            .filter(|((sys, _), _)| sys == system_id)
            .map(|((_, name), _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every stored token in registration order
    ///
    /// Keys stay marked as registered so nothing re-registers against a
    /// destroyed server. Returns the number of tokens released.
    pub fn release_all(&self) -> usize {
        let tokens = {
            let mut state = self.state.lock();
            state.released = true;
            std::mem::take(&mut state.tokens)
        };

        let count = tokens.len();
        for ((system_id, name), token) in tokens {
            debug!(system_id = %system_id, function = %name, "releasing function registration");
            token.dispose();
        }
        count
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

/// Disposable handle that releases a shared registry
pub struct RegistryReference(pub Arc<FunctionRegistry>);

impl Disposable for RegistryReference {
    fn dispose(self: Box<Self>) {
        self.0.release_all();
    }

    fn describe(&self) -> String {
        "function registry".to_string()
    }
}
