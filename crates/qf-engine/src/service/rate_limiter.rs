//! Complexity-scored rate limiter
//!
//! Three gates, checked in order:
//! 1. count gate: active filterables must not exceed `max_filters`
//! 2. complexity gate: the weighted score must not exceed `max_complexity`
//! 3. throttle gate: sliding window keyed by caller and filter type
//!
//! A request passing all three registers a hit whose decay scales with its
//! score: `decay = window × max(1, ceil(score / decay_divisor))`. Without a
//! store only the first two gates run.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::complexity::ComplexityScorer;
use crate::domain::config::RateLimitConfig;
use crate::ports::outbound::RateLimitStore;
use crate::ports::strategy::{RateLimitRequest, RateLimitVerdict, RateLimiter, Rejection};

/// Default [`RateLimiter`] over a [`RateLimitStore`]
pub struct ComplexityRateLimiter {
    store: Option<Arc<dyn RateLimitStore>>,
    config: RateLimitConfig,
}

impl ComplexityRateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig) -> Self {
        Self {
            store: Some(store),
            config,
        }
    }

    /// Count and complexity gates only
    pub fn gates_only(config: RateLimitConfig) -> Self {
        Self {
            store: None,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Throttle key: `filter:{caller}:{type}`, plus `:{principal}` when keyed per principal
    pub fn throttle_key(&self, request: &RateLimitRequest<'_>) -> String {
        let mut key = format!("filter:{}:{}", request.caller, request.filter_type);
        if self.config.per_principal {
            if let Some(principal) = &request.principal {
                key.push(':');
                key.push_str(principal);
            }
        }
        key
    }

    /// Window multiplier for a score
    pub fn decay_multiplier(&self, score: u32) -> u32 {
        let divisor = self.config.decay_divisor.max(1);
        score.div_ceil(divisor).max(1)
    }

    pub fn decay_for(&self, score: u32) -> Duration {
        self.config.window.saturating_mul(self.decay_multiplier(score))
    }
}

impl RateLimiter for ComplexityRateLimiter {
    fn check(&self, request: &RateLimitRequest<'_>) -> RateLimitVerdict {
        let scorer =
            ComplexityScorer::with_weights(request.weights.clone()).overridden_by(&self.config.weights);
        let score = scorer.score(request.filterables);
        let count = request.filterables.len();

        if count > self.config.max_filters {
            return RateLimitVerdict::reject(
                Rejection::TooManyFilters {
                    count,
                    max: self.config.max_filters,
                },
                score,
                count,
            );
        }

        if score > self.config.max_complexity {
            return RateLimitVerdict::reject(
                Rejection::TooComplex {
                    score,
                    max: self.config.max_complexity,
                },
                score,
                count,
            );
        }

        let Some(store) = &self.store else {
            return RateLimitVerdict::allow(score, count);
        };
        let key = self.throttle_key(request);
        if store.too_many_attempts(&key, self.config.max_attempts, self.config.window) {
            return RateLimitVerdict::reject(
                Rejection::Throttled {
                    attempts: store.attempts(&key),
                    max: self.config.max_attempts,
                },
                score,
                count,
            );
        }

        store.hit(&key, self.decay_for(score));
        RateLimitVerdict::allow(score, count)
    }
}
