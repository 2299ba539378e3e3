//! Scripted backend that replays canned delta pages
//!
//! Each credential maps to a `LinkScript`. Delta requests are answered by
//! cursor position: no cursor returns the first page, the `next_cursor` of
//! page N returns page N+1, and the final cursor returns an empty page.
//! Failures can be injected per credential and cursor, and fire once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{AccountSnapshot, DeltaPage, LinkMetadata};

use super::ProviderBackend;

/// Canned responses for one link
#[derive(Debug, Clone, Default)]
pub struct LinkScript {
    pub accounts: Vec<AccountSnapshot>,
    pub pages: Vec<DeltaPage>,
    pub metadata: LinkMetadata,
}

/// Failure to inject into a scripted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Transient outage (`Error::ProviderUnavailable`)
    Unavailable,
    /// Credential refused (`Error::ProviderRejected`)
    Rejected,
}

impl ScriptedFailure {
    fn into_error(self, context: &str) -> Error {
        match self {
            ScriptedFailure::Unavailable => {
                Error::ProviderUnavailable(format!("scripted outage at {}", context))
            }
            ScriptedFailure::Rejected => {
                Error::ProviderRejected(format!("ITEM_LOGIN_REQUIRED at {}", context))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Accounts,
    Delta(Option<String>),
    Metadata,
}

#[derive(Debug)]
struct PendingFailure {
    credential: String,
    call: Call,
    failure: ScriptedFailure,
}

#[derive(Debug, Default)]
struct State {
    scripts: Vec<(String, LinkScript)>,
    failures: Vec<PendingFailure>,
    delta_log: Vec<(String, Option<String>, u32)>,
}

/// Scripted provider for tests and demo data
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the script answered for `credential`
    pub fn with_link(self, credential: &str, script: LinkScript) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.scripts.retain(|(c, _)| c != credential);
            state.scripts.push((credential.to_string(), script));
        }
        self
    }

    /// Delay every delta response (for deadline tests)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next delta request for `credential` at `cursor`
    pub fn fail_delta_at(&self, credential: &str, cursor: Option<&str>, failure: ScriptedFailure) {
        self.push_failure(credential, Call::Delta(cursor.map(str::to_string)), failure);
    }

    /// Fail the next accounts request for `credential`
    pub fn fail_accounts(&self, credential: &str, failure: ScriptedFailure) {
        self.push_failure(credential, Call::Accounts, failure);
    }

    /// Fail the next metadata request for `credential`
    pub fn fail_metadata(&self, credential: &str, failure: ScriptedFailure) {
        self.push_failure(credential, Call::Metadata, failure);
    }

    /// Every delta request so far as `(credential, cursor, count)`
    pub fn delta_requests(&self) -> Vec<(String, Option<String>, u32)> {
        self.state
            .lock()
            .map(|s| s.delta_log.clone())
            .unwrap_or_default()
    }

    fn push_failure(&self, credential: &str, call: Call, failure: ScriptedFailure) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push(PendingFailure {
                credential: credential.to_string(),
                call,
                failure,
            });
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::InvalidData("Scripted provider state poisoned".into()))
    }

    /// Consume an injected failure matching this call, if any
    fn take_failure(state: &mut State, credential: &str, call: &Call) -> Option<ScriptedFailure> {
        let index = state
            .failures
            .iter()
            .position(|f| f.credential == credential && &f.call == call)?;
        Some(state.failures.remove(index).failure)
    }

    fn script<'a>(state: &'a State, credential: &str) -> Result<&'a LinkScript> {
        state
            .scripts
            .iter()
            .find(|(c, _)| c == credential)
            .map(|(_, s)| s)
            .ok_or_else(|| Error::ProviderRejected("INVALID_ACCESS_TOKEN".to_string()))
    }
}

fn page_after(script: &LinkScript, cursor: Option<&str>) -> Result<DeltaPage> {
    let Some(cursor) = cursor else {
        // An empty script has nothing to backfill and issues no cursor
        return Ok(script.pages.first().cloned().unwrap_or_default());
    };

    if script.pages.is_empty() {
        return Ok(DeltaPage {
            next_cursor: cursor.to_string(),
            ..Default::default()
        });
    }

    let position = script
        .pages
        .iter()
        .position(|p| p.next_cursor == cursor)
        .ok_or_else(|| Error::ProviderRejected(format!("INVALID_CURSOR: {}", cursor)))?;

    Ok(script.pages.get(position + 1).cloned().unwrap_or_else(|| DeltaPage {
        next_cursor: cursor.to_string(),
        ..Default::default()
    }))
}

#[async_trait]
impl ProviderBackend for ScriptedProvider {
    async fn fetch_accounts(&self, credential: &str) -> Result<Vec<AccountSnapshot>> {
        let mut state = self.lock()?;
        if let Some(failure) = Self::take_failure(&mut state, credential, &Call::Accounts) {
            return Err(failure.into_error("/accounts/get"));
        }
        Ok(Self::script(&state, credential)?.accounts.clone())
    }

    async fn fetch_transaction_delta(
        &self,
        credential: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<DeltaPage> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock()?;
        state
            .delta_log
            .push((credential.to_string(), cursor.map(str::to_string), count));

        let call = Call::Delta(cursor.map(str::to_string));
        if let Some(failure) = Self::take_failure(&mut state, credential, &call) {
            return Err(failure.into_error("/transactions/sync"));
        }

        page_after(Self::script(&state, credential)?, cursor)
    }

    async fn fetch_link_metadata(&self, credential: &str) -> Result<LinkMetadata> {
        let mut state = self.lock()?;
        if let Some(failure) = Self::take_failure(&mut state, credential, &Call::Metadata) {
            return Err(failure.into_error("/item/get"));
        }
        Ok(Self::script(&state, credential)?.metadata.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
