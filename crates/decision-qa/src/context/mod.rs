//! Context Router
//!
//! Decides, per turn, whether to proceed, ask for clarification, or resolve
//! references against the previous answer. Reads session state through the
//! [`SessionStore`] and writes it back in [`ContextRouter::commit_turn`].
//! Also owns the response cache and its invalidation rules.

pub mod cache;

pub use cache::ResponseCache;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::QaResult;
use crate::format::FormattedResponse;
use crate::intent::PriorContext;
use crate::session::{SessionState, SessionStore};
use crate::types::{
    ClarificationType, ExtractedEntities, Intent, Lang, Reference, ResultRef, Route, Slot, Turn,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub route: Route,
    pub resolved_entities: ExtractedEntities,
    /// Query text rewritten around a resolved reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enriched_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_type: Option<ClarificationType>,
    /// Whether the answer may be served from or written to the cache.
    pub cacheable: bool,
    /// Critical slots that changed relative to session state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_slots: Vec<Slot>,
}

impl RouteDecision {
    fn clarify(kind: ClarificationType, entities: &ExtractedEntities) -> Self {
        Self {
            route: Route::Clarify,
            resolved_entities: entities.clone(),
            enriched_query: None,
            clarification_type: Some(kind),
            cacheable: false,
            changed_slots: Vec::new(),
        }
    }
}

/// A cached answer with the records it showed. Serving it from the cache
/// makes those records the session's result list again.
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub response: FormattedResponse,
    pub results: Option<Vec<ResultRef>>,
}

pub struct ContextRouter {
    store: Arc<dyn SessionStore>,
    cache: Arc<ResponseCache<CachedAnswer>>,
    sticky_slots: Vec<Slot>,
    threshold: f32,
    max_turns: usize,
}

impl ContextRouter {
    pub fn new(
        store: Arc<dyn SessionStore>,
        cache: Arc<ResponseCache<CachedAnswer>>,
        threshold: f32,
    ) -> Self {
        Self {
            store,
            cache,
            sticky_slots: Vec::new(),
            threshold,
            max_turns: 50,
        }
    }

    pub fn with_sticky_slots(mut self, slots: Vec<Slot>) -> Self {
        self.sticky_slots = slots;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ResponseCache<CachedAnswer>> {
        &self.cache
    }

    /// What the classifier may know about this session.
    pub async fn prior_context(&self, session_id: &str) -> QaResult<PriorContext> {
        let state = self.store.get(session_id).await?;
        Ok(PriorContext {
            result_count: state.map(|s| s.last_results.len()).unwrap_or(0),
        })
    }

    pub async fn route(
        &self,
        session_id: &str,
        text: &str,
        intent: Intent,
        confidence: f32,
        entities: &ExtractedEntities,
    ) -> QaResult<RouteDecision> {
        let state = self
            .store
            .get(session_id)
            .await?
            .unwrap_or_else(|| SessionState::new(session_id));

        let mut decision = decide(
            &state,
            text,
            intent,
            confidence,
            entities,
            self.threshold,
            &self.sticky_slots,
        );

        if decision.route != Route::Clarify {
            decision.changed_slots = decision
                .resolved_entities
                .changed_critical_slots(&state.last_entities);
            if !decision.changed_slots.is_empty() {
                let dropped = self.cache.invalidate_session(session_id);
                tracing::debug!(
                    session_id = %session_id,
                    changed = ?decision.changed_slots,
                    dropped = dropped,
                    "Critical slot changed, cache invalidated"
                );
            }
        }

        tracing::info!(
            session_id = %session_id,
            route = ?decision.route,
            clarification = ?decision.clarification_type,
            cacheable = decision.cacheable,
            "Routed turn"
        );
        Ok(decision)
    }

    /// Cached answer for a cacheable turn, if one was computed under the
    /// same critical slots.
    pub fn cached_response(
        &self,
        session_id: &str,
        text: &str,
        decision: &RouteDecision,
    ) -> Option<CachedAnswer> {
        if !decision.cacheable {
            return None;
        }
        let fingerprint = decision.resolved_entities.critical_fingerprint();
        self.cache.get(session_id, text, &fingerprint)
    }

    pub fn cache_response(
        &self,
        session_id: &str,
        text: &str,
        decision: &RouteDecision,
        response: &FormattedResponse,
        results: Option<&[ResultRef]>,
    ) {
        if !decision.cacheable {
            return;
        }
        let fingerprint = decision.resolved_entities.critical_fingerprint();
        let answer = CachedAnswer {
            response: response.clone(),
            results: results.map(<[ResultRef]>::to_vec),
        };
        self.cache.put(session_id, text, &fingerprint, answer);
    }

    /// Append the finalized turn. `results` replaces the stored result list
    /// when the turn produced one.
    pub async fn commit_turn(
        &self,
        session_id: &str,
        turn: Turn,
        results: Option<Vec<ResultRef>>,
    ) -> QaResult<SessionState> {
        let max_turns = self.max_turns;
        self.store
            .update(
                session_id,
                Box::new(move |state| {
                    if turn.route != Route::Clarify {
                        state.last_entities = turn.resolved_entities.clone();
                    }
                    if let Some(results) = results {
                        state.last_results = results;
                    }
                    state.push_turn(turn, max_turns);
                }),
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Routing rules
// ---------------------------------------------------------------------------

/// Pure routing decision over a session snapshot. Rules run in order.
pub fn decide(
    state: &SessionState,
    text: &str,
    intent: Intent,
    confidence: f32,
    entities: &ExtractedEntities,
    threshold: f32,
    sticky_slots: &[Slot],
) -> RouteDecision {
    if intent == Intent::Unclear {
        let kind = if confidence < threshold {
            ClarificationType::LowConfidence
        } else {
            ClarificationType::VagueIntent
        };
        return RouteDecision::clarify(kind, entities);
    }

    // Whatever label the classifier sent, a low-confidence turn never reaches
    // the store. Result references are exempt: they always resolve.
    if confidence < threshold && intent != Intent::ResultRef {
        return RouteDecision::clarify(ClarificationType::LowConfidence, entities);
    }

    if let (Some(from), Some(to)) = (entities.date_from, entities.date_to) {
        if from > to {
            return RouteDecision::clarify(ClarificationType::AmbiguousTimeRange, entities);
        }
    }

    // An explicit identifier overrides any reference to prior results.
    let needs_resolution = entities.decision_number.is_none()
        && (intent == Intent::ResultRef || entities.is_context_dependent());
    if needs_resolution {
        return resolve_reference(state, text, entities);
    }

    if intent == Intent::Analysis && entities.decision_number.is_none() {
        return RouteDecision::clarify(ClarificationType::MissingEntity, entities);
    }

    if entities.decision_number.is_none()
        && entities.government_number.is_none()
        && !entities.ambiguous_numbers.is_empty()
    {
        return RouteDecision::clarify(ClarificationType::MultipleInterpretations, entities);
    }

    let mut resolved = entities.clone();
    let explicit_identifier =
        entities.decision_number.is_some() || entities.government_number.is_some();
    if !explicit_identifier {
        for slot in sticky_slots {
            if !resolved.is_set(*slot) && state.last_entities.is_set(*slot) {
                resolved.inherit(*slot, &state.last_entities);
            }
        }
    }

    RouteDecision {
        route: Route::Proceed,
        resolved_entities: resolved,
        enriched_query: None,
        clarification_type: None,
        cacheable: !entities.is_context_dependent(),
        changed_slots: Vec::new(),
    }
}

fn resolve_reference(state: &SessionState, text: &str, entities: &ExtractedEntities) -> RouteDecision {
    let results = &state.last_results;

    let target: Option<ResultRef> = match entities.reference {
        Some(Reference::Ordinal(n)) => {
            if n == 0 || n > results.len() {
                return RouteDecision::clarify(ClarificationType::MissingEntity, entities);
            }
            results.get(n - 1).cloned()
        }
        Some(Reference::Latest) => match results.last() {
            Some(last) => Some(last.clone()),
            None => return RouteDecision::clarify(ClarificationType::MissingEntity, entities),
        },
        Some(Reference::Demonstrative) | None => {
            if results.len() == 1 {
                results.first().cloned()
            } else if let Some(decision) = state.last_entities.decision_number {
                Some(ResultRef {
                    decision_number: Some(decision.to_string()),
                    government_number: state.last_entities.government_number.map(i64::from),
                    title: None,
                })
            } else if results.is_empty() {
                return RouteDecision::clarify(ClarificationType::MissingEntity, entities);
            } else {
                return RouteDecision::clarify(ClarificationType::MultipleInterpretations, entities);
            }
        }
    };

    let Some(target) = target else {
        return RouteDecision::clarify(ClarificationType::MissingEntity, entities);
    };
    let Some(decision_number) = target.numeric_decision() else {
        return RouteDecision::clarify(ClarificationType::MissingEntity, entities);
    };

    let mut resolved = entities.clone();
    resolved.reference = None;
    resolved.decision_number = Some(decision_number);
    // Newly stated government wins; otherwise take the referenced record's.
    if resolved.government_number.is_none() {
        resolved.government_number = target
            .government_number
            .and_then(|g| u32::try_from(g).ok());
    }

    let enriched = enriched_query(Lang::detect(text), decision_number, resolved.government_number);
    RouteDecision {
        route: Route::ResolveReferences,
        resolved_entities: resolved,
        enriched_query: Some(enriched),
        clarification_type: None,
        cacheable: false,
        changed_slots: Vec::new(),
    }
}

fn enriched_query(lang: Lang, decision: u32, government: Option<u32>) -> String {
    match (lang, government) {
        (Lang::Hebrew, Some(g)) => format!("החלטה מספר {} של ממשלה {}", decision, g),
        (Lang::Hebrew, None) => format!("החלטה מספר {}", decision),
        (Lang::English, Some(g)) => format!("decision number {} of government {}", decision, g),
        (Lang::English, None) => format!("decision number {}", decision),
    }
}
