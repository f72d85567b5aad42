//! In-memory directory used by the unit tests in this crate.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::Secret;
use directory::{BoxFuture, DirectoryClient, Error, Principal, Result, SecretRecord};
use time::OffsetDateTime;

pub const OBJECT_ID: &str = "object-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedSecret {
    pub display_name: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Default)]
struct State {
    secrets: Vec<(String, String)>,
    removed: Vec<String>,
    added: Vec<AddedSecret>,
}

/// Directory holding one application with configurable failure modes.
pub struct StubDirectory {
    principal: Option<Principal>,
    application_exists: bool,
    remove_fails: bool,
    returns_material: bool,
    state: Mutex<State>,
    resolve_calls: AtomicUsize,
    principal_calls: AtomicUsize,
    list_calls: AtomicUsize,
    remove_attempts: AtomicUsize,
}

impl StubDirectory {
    pub fn new() -> Self {
        Self {
            principal: Some(Principal {
                id: "p1".into(),
                label: "Ada Lovelace".into(),
            }),
            application_exists: true,
            remove_fails: false,
            returns_material: true,
            state: Mutex::new(State::default()),
            resolve_calls: AtomicUsize::new(0),
            principal_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            remove_attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_removals(mut self) -> Self {
        self.remove_fails = true;
        self
    }

    pub fn without_application(mut self) -> Self {
        self.application_exists = false;
        self
    }

    pub fn without_material(mut self) -> Self {
        self.returns_material = false;
        self
    }

    pub fn without_principal(mut self) -> Self {
        self.principal = None;
        self
    }

    pub fn seed(&self, key_id: &str, display_name: &str) {
        self.state
            .lock()
            .unwrap()
            .secrets
            .push((key_id.to_string(), display_name.to_string()));
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn remaining_keys(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.secrets.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn added(&self) -> Vec<AddedSecret> {
        self.state.lock().unwrap().added.clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn remove_attempts(&self) -> usize {
        self.remove_attempts.load(Ordering::SeqCst)
    }

    /// Every call made against the directory, of any kind.
    pub fn total_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
            + self.principal_calls.load(Ordering::SeqCst)
            + self.list_calls.load(Ordering::SeqCst)
            + self.remove_attempts.load(Ordering::SeqCst)
            + self.state.lock().unwrap().added.len()
    }
}

impl DirectoryClient for StubDirectory {
    fn resolve_object_id<'a>(&'a self, client_id: &'a str) -> BoxFuture<'a, Result<String>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.application_exists {
            Ok(OBJECT_ID.to_string())
        } else {
            Err(Error::NotFound(format!("no application with appId {client_id}")))
        };
        Box::pin(async move { result })
    }

    fn list_secrets<'a>(&'a self, object_id: &'a str) -> BoxFuture<'a, Result<Vec<SecretRecord>>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(object_id, OBJECT_ID);
        let records = self
            .state
            .lock()
            .unwrap()
            .secrets
            .iter()
            .map(|(key_id, name)| SecretRecord {
                key_id: key_id.clone(),
                display_name: Some(name.clone()),
                expires_at: None,
                material: None,
            })
            .collect();
        Box::pin(async move { Ok(records) })
    }

    fn add_secret<'a>(
        &'a self,
        object_id: &'a str,
        display_name: &'a str,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'a, Result<SecretRecord>> {
        assert_eq!(object_id, OBJECT_ID);
        let mut state = self.state.lock().unwrap();
        state.added.push(AddedSecret {
            display_name: display_name.to_string(),
            expires_at,
        });
        let key_id = format!("new-{}", state.added.len());
        state.secrets.push((key_id.clone(), display_name.to_string()));
        drop(state);

        let material = self
            .returns_material
            .then(|| Secret::from(format!("material-for-{key_id}")));
        let record = SecretRecord {
            key_id,
            display_name: Some(display_name.to_string()),
            expires_at: Some(expires_at),
            material,
        };
        Box::pin(async move { Ok(record) })
    }

    fn remove_secret<'a>(&'a self, object_id: &'a str, key_id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.remove_attempts.fetch_add(1, Ordering::SeqCst);
        assert_eq!(object_id, OBJECT_ID);
        let result = if self.remove_fails {
            Err(Error::Status {
                status: 403,
                body: "Insufficient privileges".into(),
            })
        } else {
            let mut state = self.state.lock().unwrap();
            state.secrets.retain(|(k, _)| k != key_id);
            state.removed.push(key_id.to_string());
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn resolve_current_principal(&self) -> BoxFuture<'_, Result<Principal>> {
        self.principal_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.principal.clone().ok_or_else(|| {
            Error::PrincipalResolutionFailed("no identity signed in".into())
        });
        Box::pin(async move { result })
    }
}
