//! Parameter name standardization against the mapping store.
//!
//! Lookups are cached per process. Misses create a `custom` mapping through
//! the store's atomic insert-if-absent, so concurrent datasets racing on the
//! same raw name end up sharing whichever row was written first.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use obs_common::{derive_standard_code, normalize_raw_name, Mapping, Namespace};
use storage::{MappingStore, StoreResult};

/// Minimum length for a substring match to count.
const MIN_SUBSTRING_LEN: usize = 3;

/// Resolves raw parameter names to standard codes.
pub struct ParameterStandardizer {
    store: Arc<dyn MappingStore>,
    cache: RwLock<HashMap<String, Mapping>>,
    persist: bool,
    created: AtomicU64,
}

impl ParameterStandardizer {
    /// Standardizer that persists fallback mappings on a miss.
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            persist: true,
            created: AtomicU64::new(0),
        }
    }

    /// Standardizer for dry runs: misses return the fallback without writing.
    pub fn read_only(store: Arc<dyn MappingStore>) -> Self {
        Self {
            persist: false,
            ..Self::new(store)
        }
    }

    /// Mappings this instance created in the store.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Resolve `raw_name` to its mapping.
    ///
    /// `declared_unit` is only used when a fallback has to be created.
    /// `namespace_hint` is advisory: stored mappings keep their namespace,
    /// fallbacks are always `custom`, and a mismatch is only logged.
    pub async fn standardize(
        &self,
        raw_name: &str,
        declared_unit: Option<&str>,
        namespace_hint: Option<Namespace>,
    ) -> StoreResult<Mapping> {
        let key = normalize_raw_name(raw_name);

        if let Some(mapping) = self.cache.read().await.get(&key) {
            return Ok(mapping.clone());
        }

        let mapping = match self.store.get(&key).await? {
            Some(mapping) => mapping,
            None => self.create_fallback(&key, declared_unit).await?,
        };

        if let Some(hint) = namespace_hint {
            if hint != mapping.namespace {
                debug!(
                    raw_name = %key,
                    hint = %hint,
                    namespace = %mapping.namespace,
                    "Stored mapping namespace differs from dataset hint"
                );
            }
        }

        self.cache.write().await.insert(key, mapping.clone());
        Ok(mapping)
    }

    async fn create_fallback(&self, key: &str, declared_unit: Option<&str>) -> StoreResult<Mapping> {
        let fallback = Mapping::fallback(key, declared_unit);
        if !self.persist {
            return Ok(fallback);
        }

        let outcome = self.store.insert_if_absent(&fallback).await?;
        if outcome.created {
            self.created.fetch_add(1, Ordering::Relaxed);
            info!(
                raw_name = %key,
                standard_code = %outcome.mapping.standard_code,
                unit = %outcome.mapping.unit,
                "Created custom parameter mapping"
            );
        }
        Ok(outcome.mapping)
    }

    /// Rank stored mappings as suggestions for an unmapped raw name.
    pub async fn suggest(&self, raw_name: &str) -> StoreResult<Vec<Suggestion>> {
        let mappings = self.store.all().await?;
        Ok(suggest(raw_name, &mappings))
    }
}

/// How well a stored mapping matches a raw name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// One side contains the other after normalization.
    Substring,
    /// Same code, raw name or label after normalization.
    Exact,
}

/// A ranked candidate mapping for curators. Never applied automatically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub confidence: MatchConfidence,
    pub mapping: Mapping,
}

/// Rank `mappings` against `raw_name`: exact matches first, then substring
/// matches, each group ordered by raw name. Non-matching mappings are left out.
pub fn suggest(raw_name: &str, mappings: &[Mapping]) -> Vec<Suggestion> {
    let wanted = match_key(raw_name);
    let wanted_code = derive_standard_code(raw_name);
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut suggestions: Vec<Suggestion> = mappings
        .iter()
        .filter_map(|mapping| {
            let labels: Vec<String> = std::iter::once(mapping.raw_name.as_str())
                .chain(std::iter::once(mapping.standard_code.as_str()))
                .chain(mapping.description.as_deref())
                .map(match_key)
                .filter(|l| !l.is_empty())
                .collect();

            let confidence = if mapping.standard_code.eq_ignore_ascii_case(&wanted_code)
                || labels.iter().any(|l| *l == wanted)
            {
                MatchConfidence::Exact
            } else if labels.iter().any(|l| is_substring_match(l, &wanted)) {
                MatchConfidence::Substring
            } else {
                return None;
            };
            Some(Suggestion {
                confidence,
                mapping: mapping.clone(),
            })
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| a.mapping.raw_name.cmp(&b.mapping.raw_name))
    });
    suggestions
}

/// Lower-case with `_` and `-` read as spaces, whitespace collapsed.
fn match_key(text: &str) -> String {
    normalize_raw_name(&text.replace(['_', '-'], " "))
}

fn is_substring_match(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_SUBSTRING_LEN && long.contains(short)
}
