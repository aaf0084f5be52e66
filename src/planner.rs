//! Search orchestration: quiz step, candidate search, catalog filter, ranking.
//!
//! The collaborator is the only suspension point outside the engine. Every
//! call to it is bounded by a timeout and any failure is answered locally,
//! so a slow or broken search service never fails a request.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collaborator::{CollaboratorError, QuizOutcome, SearchCollaborator, SearchHit, fallback_quiz};
use crate::engine::{Engine, EngineError};
use crate::model::{EstablishmentId, Offer};
use crate::observability;
use crate::params::{self, ParamMap, SearchParams};

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Ask the caller for one more parameter.
    NeedsInput {
        key: String,
        question: String,
        options: Vec<String>,
        params: ParamMap,
    },
    /// Ranked offers for the completed parameter map.
    Offers(Vec<Offer>),
}

pub struct Planner {
    engine: Arc<Engine>,
    collaborator: Option<Arc<dyn SearchCollaborator>>,
    timeout: Duration,
}

impl Planner {
    pub fn new(engine: Arc<Engine>, collaborator: Option<Arc<dyn SearchCollaborator>>, timeout: Duration) -> Self {
        Self {
            engine,
            collaborator,
            timeout,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn process(&self, prompt: &str, current: &ParamMap) -> Result<PlanOutcome, EngineError> {
        let quiz = self.quiz(prompt, current).await;
        let mut merged = current.clone();
        merged.extend(quiz.params.clone());

        if !quiz.completed {
            // A service that forgets to name the key still gets a usable question.
            let quiz = if quiz.key_to_collect.is_some() {
                quiz
            } else {
                fallback_quiz(prompt, &merged)
            };
            if let Some(key) = quiz.key_to_collect {
                return Ok(PlanOutcome::NeedsInput {
                    question: quiz.question.unwrap_or_else(|| format!("Please provide {key}")),
                    key,
                    options: quiz.options.unwrap_or_default(),
                    params: merged,
                });
            }
        }

        let search = SearchParams::from_map(&merged)?;
        let candidates = self.candidates(&merged).await;
        Ok(PlanOutcome::Offers(self.engine.search(&search, &candidates).await))
    }

    async fn quiz(&self, prompt: &str, current: &ParamMap) -> QuizOutcome {
        let Some(collaborator) = &self.collaborator else {
            return fallback_quiz(prompt, current);
        };
        match self.bounded("generate_quiz", collaborator.generate_quiz(prompt, current)).await {
            Some(outcome) => outcome,
            None => fallback_quiz(prompt, current),
        }
    }

    /// Candidate ids from semantic search, deduplicated in result order.
    /// Empty means "no hint": the catalog then scans by city.
    async fn candidates(&self, params: &ParamMap) -> Vec<EstablishmentId> {
        let Some(collaborator) = &self.collaborator else {
            return Vec::new();
        };
        let mut outbound = params.clone();
        if let Some(city) = params::text(params, params::CITY) {
            outbound.insert(params::CITY.into(), self.engine.cities().display_name(&city).into());
        }
        let hits: Vec<SearchHit> = self
            .bounded("rag_search", collaborator.rag_search(&outbound))
            .await
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let ids: Vec<EstablishmentId> = hits
            .into_iter()
            .map(|h| h.establishment_id)
            .filter(|id| !id.trim().is_empty() && seen.insert(id.clone()))
            .collect();
        debug!(candidates = ids.len(), "semantic search returned candidates");
        ids
    }

    async fn bounded<T>(
        &self,
        call: &'static str,
        fut: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Option<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(CollaboratorError::Timeout),
        };
        metrics::histogram!(observability::COLLABORATOR_DURATION_SECONDS, "call" => call)
            .record(started.elapsed().as_secs_f64());
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(call, error = %e, "search collaborator failed, using local fallback");
                metrics::counter!(observability::COLLABORATOR_FALLBACKS_TOTAL, "call" => call).increment(1);
                None
            }
        }
    }
}
