//! Engine ranking, availability probing and runtime failover.
//!
//! [`EngineSelector`] holds the configured adapters ranked by fixed engine
//! priority. Availability is probed once at construction; [`reprobe`] is the
//! only way to refresh it, so an utterance never thrashes between engines.
//!
//! [`reprobe`]: EngineSelector::reprobe

use super::{EngineAdapter, EngineDescriptor, EngineKind};
use crate::error::{FalaError, Result};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Ordered engine chain with probed availability.
pub struct EngineSelector {
    /// Adapters, highest priority first.
    adapters: Vec<Arc<dyn EngineAdapter>>,
    /// Descriptors parallel to `adapters`.
    descriptors: RwLock<Vec<EngineDescriptor>>,
}

impl EngineSelector {
    /// Rank `adapters` by priority and probe each one.
    ///
    /// # Errors
    ///
    /// Returns [`FalaError::Config`] if no `TextOnly` adapter is configured:
    /// the chain would have no terminal fallback.
    pub async fn probe(mut adapters: Vec<Arc<dyn EngineAdapter>>) -> Result<Self> {
        if !adapters.iter().any(|a| a.kind() == EngineKind::TextOnly) {
            return Err(FalaError::Config(
                "engine chain has no text_only fallback".into(),
            ));
        }
        adapters.sort_by_key(|a| std::cmp::Reverse(a.kind().priority()));
        adapters.dedup_by_key(|a| a.kind());

        let descriptors = probe_all(&adapters).await;
        Ok(Self {
            adapters,
            descriptors: RwLock::new(descriptors),
        })
    }

    /// Explicitly re-run every adapter's probe.
    pub async fn reprobe(&self) {
        info!("re-probing TTS engines");
        let fresh = probe_all(&self.adapters).await;
        *self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// All configured engines, highest priority first.
    pub fn descriptors(&self) -> Vec<EngineDescriptor> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Available engines in fallback order.
    pub fn fallback_chain(&self) -> Vec<EngineDescriptor> {
        self.descriptors()
            .into_iter()
            .filter(|d| d.available)
            .collect()
    }

    /// The highest-priority available engine.
    pub fn current(&self) -> EngineDescriptor {
        let descriptors = self.descriptors.read().unwrap_or_else(PoisonError::into_inner);
        descriptors
            .iter()
            .find(|d| d.available)
            .or_else(|| descriptors.last())
            .cloned()
            .unwrap_or_else(text_only_descriptor)
    }

    /// Next available engine of lower priority than `failed`.
    ///
    /// Returns `None` once `failed` is `TextOnly`.
    pub fn next_fallback(&self, failed: EngineKind) -> Option<EngineDescriptor> {
        if failed == EngineKind::TextOnly {
            return None;
        }
        let floor = failed.priority();
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.available && d.priority < floor)
            .cloned()
    }

    /// Adapter for `kind`, if configured.
    pub fn adapter(&self, kind: EngineKind) -> Option<Arc<dyn EngineAdapter>> {
        self.adapters.iter().find(|a| a.kind() == kind).cloned()
    }
}

fn text_only_descriptor() -> EngineDescriptor {
    EngineDescriptor {
        kind: EngineKind::TextOnly,
        priority: EngineKind::TextOnly.priority(),
        available: true,
        locale_support: Default::default(),
    }
}

async fn probe_all(adapters: &[Arc<dyn EngineAdapter>]) -> Vec<EngineDescriptor> {
    let mut descriptors = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let kind = adapter.kind();
        let available = if kind == EngineKind::TextOnly {
            // No external dependency: available by construction.
            true
        } else {
            match adapter.probe().await {
                Ok(()) => {
                    info!(engine = %kind, "TTS engine available");
                    true
                }
                Err(e) => {
                    warn!(engine = %kind, error = %e, "TTS engine unavailable");
                    false
                }
            }
        };
        descriptors.push(EngineDescriptor {
            kind,
            priority: kind.priority(),
            available,
            locale_support: adapter.locales(),
        });
    }
    descriptors
}
