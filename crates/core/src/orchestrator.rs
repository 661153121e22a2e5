//! The synchronization orchestrator.
//!
//! Drives one attempt end to end: resolve the target reference, normalize
//! the payload, select the request method, dispatch, and apply the retry
//! policy for ambiguous transport failures.

use crate::intent::{normalize_payload, WriteDraft, WriteIntent};
use crate::locks::ReferenceLocks;
use crate::transport::{Transport, WriteOutcome};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracker::{MetadataCache, Reference, RequestMethod, RetryConfig};

/// Orchestrator construction parameters, resolved once at startup.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether the target system contract requires idempotent upsert for
    /// unresolved references instead of plain create.
    pub upsert_required: bool,
    /// Retry policy for re-dispatch after ambiguous transport failures.
    pub dispatch_retry: RetryConfig,
}

/// States one synchronization attempt moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttemptState {
    Resolving,
    Normalizing,
    MethodSelected,
    Dispatched,
}

/// Why an attempt failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The payload cannot be normalized; needs a manual fix.
    Payload(String),
    /// Metadata resolution failed after bounded retries.
    Resolution(String),
    /// The transport outcome is unknown and the method forbids blind
    /// retry, or retries ran out; needs manual reconciliation.
    Ambiguous,
    /// The remote definitely rejected the write.
    Definite(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Payload(message) => write!(f, "payload: {}", message),
            FailureKind::Resolution(message) => write!(f, "resolution: {}", message),
            FailureKind::Ambiguous => f.write_str("ambiguous transport outcome"),
            FailureKind::Definite(message) => write!(f, "definite: {}", message),
        }
    }
}

/// Terminal state of one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The write was confirmed; `reference` identifies the remote object.
    Completed { reference: Reference },
    /// The attempt failed; `kind` says how.
    Failed { kind: FailureKind },
}

/// Result of one synchronization attempt.
///
/// Carries the target reference, the chosen method and the failure kind,
/// so a failed attempt can be reconciled manually without re-deriving
/// state.
#[derive(Clone, Debug)]
pub struct SyncReport {
    /// Reference the attempt targeted.
    pub reference: Reference,
    /// Method chosen for dispatch; empty when the attempt failed before
    /// method selection.
    pub method: Option<RequestMethod>,
    /// Terminal outcome.
    pub outcome: SyncOutcome,
}

impl SyncReport {
    fn failed(reference: Reference, method: Option<RequestMethod>, kind: FailureKind) -> Self {
        Self {
            reference,
            method,
            outcome: SyncOutcome::Failed { kind },
        }
    }

    /// True when the attempt completed successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Completed { .. })
    }
}

/// Drives synchronization attempts against one remote collection.
pub struct SyncOrchestrator {
    cache: Arc<MetadataCache>,
    transport: Arc<dyn Transport>,
    locks: ReferenceLocks,
    config: SyncConfig,
}

impl SyncOrchestrator {
    /// Create an orchestrator over the given cache and transport.
    pub fn new(
        cache: Arc<MetadataCache>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            cache,
            transport,
            locks: ReferenceLocks::new(),
            config,
        }
    }

    /// Runs one synchronization attempt.
    ///
    /// Attempts for the same reference serialize on a per-reference
    /// exclusion scope held for the duration of the attempt; attempts for
    /// different references run concurrently.
    ///
    /// Cancellation: dropping the returned future between states cancels
    /// the attempt and releases the exclusion scope. A caller that cancels
    /// after dispatch with unknown outcome must treat the attempt exactly
    /// like an ambiguous transport failure, never as success.
    pub async fn synchronize(&self, draft: WriteDraft) -> SyncReport {
        let target = draft.target.clone();
        let _attempt_scope = self.locks.acquire(&target).await;

        let mut state = AttemptState::Resolving;
        tracing::debug!(reference = %target, ?state, "synchronization attempt started");
        let resolved = match self.cache.find_by_reference(&target).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(reference = %target, error = %err, "metadata resolution failed");
                return SyncReport::failed(target, None, FailureKind::Resolution(err.to_string()));
            }
        };

        state = AttemptState::Normalizing;
        tracing::debug!(reference = %target, ?state, resolved = resolved.is_some(), "normalizing payload");
        let payload = match normalize_payload(&draft.payload, resolved.as_deref()) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(reference = %target, error = %err, "payload normalization failed");
                return SyncReport::failed(target, None, FailureKind::Payload(err.to_string()));
            }
        };

        state = AttemptState::MethodSelected;
        let method = RequestMethod::resolve(resolved.is_some(), self.config.upsert_required);
        tracing::debug!(reference = %target, ?state, %method, "request method selected");
        let intent = WriteIntent {
            target: target.clone(),
            resource_type: draft.resource_type,
            resolved_id: resolved.as_ref().map(|record| record.id.clone()),
            method,
            body: payload.to_wire(),
        };

        let retry = &self.config.dispatch_retry;
        let mut delay = Duration::from_millis(retry.initial_delay_ms);
        let mut attempt = 1u32;
        loop {
            state = AttemptState::Dispatched;
            tracing::debug!(reference = %target, ?state, attempt, "dispatching write intent");
            match self.transport.execute(&intent).await {
                Ok(WriteOutcome::Success { reference }) => {
                    self.refresh_after_write(&target).await;
                    tracing::info!(
                        reference = %target,
                        %method,
                        resulting = %reference,
                        "synchronization attempt completed"
                    );
                    return SyncReport {
                        reference: target,
                        method: Some(method),
                        outcome: SyncOutcome::Completed { reference },
                    };
                }
                Ok(WriteOutcome::AmbiguousFailure { message }) => {
                    if method.is_blind_retry_safe() && attempt < retry.max_attempts {
                        tracing::warn!(
                            reference = %target,
                            %method,
                            attempt,
                            message = %message,
                            "ambiguous transport failure, re-dispatching"
                        );
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_millis(retry.max_delay_ms));
                        attempt += 1;
                        continue;
                    }
                    tracing::warn!(
                        reference = %target,
                        %method,
                        message = %message,
                        "ambiguous transport failure, surfacing for manual reconciliation"
                    );
                    return SyncReport::failed(target, Some(method), FailureKind::Ambiguous);
                }
                Ok(WriteOutcome::DefiniteFailure { message }) => {
                    tracing::warn!(reference = %target, %method, message = %message, "write rejected");
                    return SyncReport::failed(target, Some(method), FailureKind::Definite(message));
                }
                Err(err) => {
                    tracing::warn!(reference = %target, %method, error = %err, "dispatch failed");
                    return SyncReport::failed(
                        target,
                        Some(method),
                        FailureKind::Definite(err.to_string()),
                    );
                }
            }
        }
    }

    /// After a confirmed success, force a re-fetch when the cache holds a
    /// stale or absent entry for the target, so later attempts in the same
    /// run see the now-existing object.
    async fn refresh_after_write(&self, target: &Reference) {
        if self.cache.needs_refresh(target).await {
            if let Err(err) = self.cache.find_refreshed_by_reference(target).await {
                tracing::warn!(reference = %target, error = %err, "post-write cache refresh failed");
            }
        }
    }
}
