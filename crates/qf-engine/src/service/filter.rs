//! Filter orchestrator
//!
//! A [`Filter`] is one bound use of a [`FilterDefinition`] against one query.
//! It owns the lifecycle state machine and runs the apply pipeline:
//!
//! ```text
//!  1. performance start          [performance]
//!  2. principal scoping
//!  3. permission filtering       [permissions]
//!  4. pre-filters
//!  5. validation                 [validation]       error returned to caller
//!  6. rate-limit check           [rateLimit]        advisory, recorded
//!  7. value transformation       [valueTransformation]
//!  8. predicate dispatch
//!  9. filter chaining            [filterChaining]
//! 10. optimization hints         [optimization]
//! 11. performance end            [performance]
//! ```
//!
//! The feature set is snapshotted when `apply` starts; toggling features
//! afterwards only affects execution (`get`, `count`, streaming) and the next
//! lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::cache_key::{CacheKey, CacheKeyBuilder, SmartCachePolicy};
use crate::domain::config::FilterDefaults;
use crate::domain::definition::{FilterDefinition, PreFilterFn};
use crate::domain::features::{Feature, FeatureSet};
use crate::domain::query::{Direction, Operator, QueryShape};
use crate::domain::resolver::resolve;
use crate::domain::state::FilterState;
use crate::domain::value::{as_integer, scalar_string, stable_encode, FilterValue, Filterables, Options};
use crate::error::{FilterError, FilterResult, Reason};
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use crate::ports::inbound::FilterApi;
use crate::ports::outbound::{CacheStore, FilterLogger, InputSource, Principal, QueryBuilder, RateLimitStore};
use crate::ports::strategy::{
    CachePolicy, PermissionPolicy, RateLimitRequest, RateLimitVerdict, RateLimiter,
    ValueTransformer, Validator,
};
use crate::service::cache::{CacheOutcome, CacheStrategy};
use crate::service::rate_limiter::ComplexityRateLimiter;
use crate::service::strategies::{DeclaredPermissions, DeclaredTransforms, RuleValidator};
use crate::service::streaming::{collect_chunked, LazyRows, MIN_CHUNK_SIZE};

/// Option key for column selection
pub const OPTION_SELECT: &str = "select";
/// Option key for eager-load hints
pub const OPTION_WITH: &str = "with";
/// Option key for the index hint
pub const OPTION_USE_INDEX: &str = "use_index";
/// Option key for the streaming chunk size
pub const OPTION_CHUNK_SIZE: &str = "chunk_size";

/// Caller identity used for throttling when none is set
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Input source shared with the filter
pub type SharedInput = Arc<dyn InputSource + Send + Sync>;

/// Predicate queued through the chaining API
pub enum ChainedPredicate<Q> {
    Where {
        column: String,
        operator: Operator,
        value: FilterValue,
    },
    WhereIn {
        column: String,
        values: Vec<FilterValue>,
    },
    WhereBetween {
        column: String,
        low: FilterValue,
        high: FilterValue,
    },
    OrderBy {
        column: String,
        direction: Direction,
    },
    Custom(PreFilterFn<Q>),
}

impl<Q: QueryBuilder> ChainedPredicate<Q> {
    fn apply_to(&self, query: &mut Q) -> FilterResult<()> {
        match self {
            ChainedPredicate::Where {
                column,
                operator,
                value,
            } => query.where_op(column, *operator, value)?,
            ChainedPredicate::WhereIn { column, values } => query.where_in(column, values)?,
            ChainedPredicate::WhereBetween { column, low, high } => {
                query.where_between(column, low, high)?
            }
            ChainedPredicate::OrderBy { column, direction } => query.order_by(column, *direction)?,
            ChainedPredicate::Custom(predicate) => predicate(query)?,
        }
        Ok(())
    }
}

impl<Q> fmt::Debug for ChainedPredicate<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainedPredicate::Where {
                column,
                operator,
                value,
            } => write!(f, "where {} {} {}", column, operator, value),
            ChainedPredicate::WhereIn { column, values } => {
                write!(f, "where {} in ({} values)", column, values.len())
            }
            ChainedPredicate::WhereBetween { column, low, high } => {
                write!(f, "where {} between {} and {}", column, low, high)
            }
            ChainedPredicate::OrderBy { column, direction } => {
                write!(f, "order by {} {}", column, direction)
            }
            ChainedPredicate::Custom(_) => f.write_str("custom"),
        }
    }
}

/// Timing of one `apply`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub started_at: DateTime<Utc>,
    pub duration_us: u64,
    pub filter_count: usize,
    pub dispatched: usize,
    pub chained: usize,
}

/// Serializable snapshot of an instance, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub instance_id: Uuid,
    pub filter_type: String,
    pub state: FilterState,
    pub features: Vec<&'static str>,
    pub filterables: Filterables,
    pub options: Options,
    pub applied_keys: Vec<String>,
    pub removed_keys: Vec<String>,
    pub chained: Vec<String>,
    pub failure: Option<String>,
    pub rate_limit: Option<RateLimitVerdict>,
    pub cache_key: CacheKey,
    pub query: Option<QueryShape>,
    pub performance: Option<PerformanceReport>,
}

#[derive(Debug, Clone)]
struct CacheSettings {
    force: Option<bool>,
    cache_count: bool,
    ttl: Duration,
    count_ttl: Duration,
    tags: Vec<String>,
}

enum Level {
    Info,
    Debug,
    Warning,
}

/// Builder for [`Filter`]
///
/// Supplying a cache store enables `caching`; supplying a logger enables
/// `logging`. Everything else starts from the defaults' feature flags.
pub struct FilterBuilder<Q: QueryBuilder> {
    definition: Arc<FilterDefinition<Q>>,
    defaults: Option<Arc<FilterDefaults>>,
    features: Vec<(Feature, bool)>,
    input: Option<SharedInput>,
    cache_store: Option<Arc<dyn CacheStore>>,
    cache_policy: Option<Arc<dyn CachePolicy>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    rate_limit_store: Option<Arc<dyn RateLimitStore>>,
    logger: Option<Arc<dyn FilterLogger>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    validator: Option<Arc<dyn Validator>>,
    permissions: Option<Arc<dyn PermissionPolicy>>,
    transformer: Option<Arc<dyn ValueTransformer>>,
    principal: Option<Arc<dyn Principal>>,
    caller: Option<String>,
}

impl<Q: QueryBuilder> FilterBuilder<Q> {
    fn new(definition: Arc<FilterDefinition<Q>>) -> Self {
        Self {
            definition,
            defaults: None,
            features: Vec::new(),
            input: None,
            cache_store: None,
            cache_policy: None,
            rate_limiter: None,
            rate_limit_store: None,
            logger: None,
            metrics: None,
            validator: None,
            permissions: None,
            transformer: None,
            principal: None,
            caller: None,
        }
    }

    /// Defaults to read instead of the process-wide snapshot
    pub fn defaults(mut self, defaults: Arc<FilterDefaults>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn feature(mut self, feature: Feature, enabled: bool) -> Self {
        self.features.push((feature, enabled));
        self
    }

    pub fn input(mut self, input: impl InputSource + Send + Sync + 'static) -> Self {
        self.input = Some(Arc::new(input));
        self
    }

    pub fn shared_input(mut self, input: SharedInput) -> Self {
        self.input = Some(input);
        self
    }

    pub fn cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn cache_policy(mut self, policy: Arc<dyn CachePolicy>) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    /// Replace the complexity limiter entirely
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Throttle store for the default complexity limiter
    pub fn rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn FilterLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn permission_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.permissions = Some(policy);
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn ValueTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn principal(mut self, principal: Arc<dyn Principal>) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn build(self) -> Filter<Q> {
        let defaults = self.defaults.unwrap_or_else(FilterDefaults::shared);

        let mut features = defaults.feature_set();
        if self.cache_store.is_some() {
            features.enable(Feature::Caching);
        }
        if self.logger.is_some() {
            features.enable(Feature::Logging);
        }
        for (feature, enabled) in self.features {
            features.set(feature, enabled);
        }

        let cache = self.cache_store.map(|store| {
            let policy = self
                .cache_policy
                .unwrap_or_else(|| Arc::new(SmartCachePolicy::default()));
            CacheStrategy::new(store, policy)
        });

        let rate_limiter = self.rate_limiter.unwrap_or_else(|| {
            let config = defaults.rate_limit.clone();
            let limiter = match self.rate_limit_store {
                Some(store) => ComplexityRateLimiter::new(store, config),
                None => ComplexityRateLimiter::gates_only(config),
            };
            Arc::new(limiter)
        });

        let cache_settings = CacheSettings {
            force: None,
            cache_count: defaults.cache.cache_count,
            ttl: defaults.cache.ttl,
            count_ttl: defaults.cache.count_ttl,
            tags: Vec::new(),
        };

        Filter {
            instance_id: Uuid::new_v4(),
            definition: self.definition,
            state: FilterState::Initialized,
            features,
            query: None,
            pending_options: Options::new(),
            configured_options: Options::new(),
            options: Options::new(),
            appended: Filterables::new(),
            active: Filterables::new(),
            input: self.input,
            principal: self.principal,
            caller: self.caller,
            cache,
            cache_settings,
            rate_limiter,
            logger: self.logger,
            metrics: self.metrics.unwrap_or_else(|| Arc::new(NoOpMetrics)),
            validator: self.validator.unwrap_or_else(|| Arc::new(RuleValidator)),
            permissions: self
                .permissions
                .unwrap_or_else(|| Arc::new(DeclaredPermissions)),
            transformer: self
                .transformer
                .unwrap_or_else(|| Arc::new(DeclaredTransforms)),
            chained: Vec::new(),
            applied: Vec::new(),
            removed: Vec::new(),
            failure: None,
            rate_limit: None,
            performance: None,
            defaults,
        }
    }
}

/// One filter instance
pub struct Filter<Q: QueryBuilder> {
    instance_id: Uuid,
    definition: Arc<FilterDefinition<Q>>,
    defaults: Arc<FilterDefaults>,
    state: FilterState,
    features: FeatureSet,

    query: Option<Q>,
    /// Options stored with `attach_query` for finalize-on-demand
    pending_options: Options,
    /// Options set through the optimization setters
    configured_options: Options,
    /// Options in effect for the current lifecycle
    options: Options,

    appended: Filterables,
    active: Filterables,
    input: Option<SharedInput>,
    principal: Option<Arc<dyn Principal>>,
    caller: Option<String>,

    cache: Option<CacheStrategy>,
    cache_settings: CacheSettings,
    rate_limiter: Arc<dyn RateLimiter>,
    logger: Option<Arc<dyn FilterLogger>>,
    metrics: Arc<dyn MetricsRecorder>,
    validator: Arc<dyn Validator>,
    permissions: Arc<dyn PermissionPolicy>,
    transformer: Arc<dyn ValueTransformer>,

    chained: Vec<ChainedPredicate<Q>>,
    applied: Vec<String>,
    removed: Vec<String>,
    failure: Option<String>,
    rate_limit: Option<RateLimitVerdict>,
    performance: Option<PerformanceReport>,
}

impl<Q: QueryBuilder> Filter<Q> {
    pub fn builder(definition: impl Into<Arc<FilterDefinition<Q>>>) -> FilterBuilder<Q> {
        FilterBuilder::new(definition.into())
    }

    /// Instance with default collaborators and no input source
    pub fn new(definition: impl Into<Arc<FilterDefinition<Q>>>) -> Self {
        Self::builder(definition).build()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run the pipeline against `query`
    ///
    /// Valid only from `initialized`. Validation and dispatch errors are
    /// returned after the instance moves to `failed`; any other pipeline error
    /// is recorded and surfaces from [`Filter::get`]. The returned query may be
    /// partially mutated when the pipeline failed.
    pub fn apply(&mut self, query: Q, options: Options) -> FilterResult<&Q> {
        if self.state != FilterState::Initialized {
            return Err(FilterError::Reapplication { state: self.state });
        }
        self.state.transition_to(FilterState::Applying)?;
        let features = self.features;

        let started = features
            .contains(Feature::Performance)
            .then(|| (Utc::now(), Instant::now()));

        self.options = self.merge_options(options);
        self.active = resolve(self.read_input(), &self.appended);
        self.applied.clear();
        self.removed.clear();
        self.failure = None;
        self.rate_limit = None;
        self.performance = None;

        let mut query = query;
        let outcome = self.run_pipeline(&mut query, features);
        self.query = Some(query);

        if let Some((started_at, clock)) = started {
            let elapsed = clock.elapsed();
            self.performance = Some(PerformanceReport {
                started_at,
                duration_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                filter_count: self.active.len(),
                dispatched: self.applied.len(),
                chained: if features.contains(Feature::FilterChaining) {
                    self.chained.len()
                } else {
                    0
                },
            });
            self.metrics.record_apply(elapsed, outcome.is_err());
        }

        match outcome {
            Ok(()) => {
                self.state.transition_to(FilterState::Applied)?;
                self.log(
                    features,
                    Level::Info,
                    "Filter applied",
                    json!({
                        "applied": self.applied,
                        "performance": self.performance,
                    }),
                );
            }
            Err(err) => {
                self.state.transition_to(FilterState::Failed)?;
                let reason = Reason(&err).to_string();
                self.log(
                    features,
                    Level::Warning,
                    "Filter application failed",
                    json!({ "reason": reason }),
                );
                self.failure = Some(reason);
                if err.propagates_from_pipeline() {
                    return Err(err);
                }
            }
        }

        self.query.as_ref().ok_or(FilterError::MissingQuery)
    }

    /// Store a query and options to be applied on first streaming use
    pub fn attach_query(&mut self, query: Q, options: Options) -> FilterResult<()> {
        if self.state != FilterState::Initialized {
            return Err(FilterError::Reapplication { state: self.state });
        }
        self.query = Some(query);
        self.pending_options = options;
        Ok(())
    }

    /// Apply the attached query if still `initialized`; fail if `failed`
    pub fn finalize(&mut self) -> FilterResult<()> {
        if self.state == FilterState::Initialized {
            let query = self.query.take().ok_or(FilterError::MissingQuery)?;
            let options = std::mem::take(&mut self.pending_options);
            self.apply(query, options)?;
        }
        self.applied_query().map(|_| ())
    }

    /// Back to `initialized`
    ///
    /// Clears the query, the active filterables, the failure reason and the
    /// per-apply records. Appended filterables, queued chain predicates and
    /// configured options survive.
    pub fn reset(&mut self) {
        // Every state may return to initialized
        self.state = FilterState::Initialized;
        self.query = None;
        self.pending_options.clear();
        self.options.clear();
        self.active.clear();
        self.applied.clear();
        self.removed.clear();
        self.failure = None;
        self.rate_limit = None;
        self.performance = None;
    }

    /// Execute the filtered query
    ///
    /// With `memoryManagement` rows are fetched in chunks; otherwise with
    /// `caching` the result goes through the read-through cache when the
    /// query is worth caching.
    pub fn get(&self) -> FilterResult<Vec<Q::Row>> {
        let query = self.applied_query()?;

        if self.features.contains(Feature::MemoryManagement) {
            return collect_chunked(query, self.chunk_size());
        }

        if let Some(cache) = self.active_cache() {
            if cache.should_cache(
                &query.shape(),
                self.cache_settings.force,
                self.defaults.cache.smart,
            ) {
                let key = self.cache_key();
                let (rows, outcome): (Vec<Q::Row>, CacheOutcome) =
                    cache.remember(&key, self.cache_settings.ttl, &self.effective_tags(), || {
                        Ok(query.get()?)
                    })?;
                self.record_cache_outcome(outcome, &key);
                return Ok(rows);
            }
            self.record_cache_outcome(CacheOutcome::Direct, &self.cache_key());
        }

        Ok(query.get()?)
    }

    /// Count the filtered rows, cached under `{key}:count` when enabled
    pub fn count(&self) -> FilterResult<u64> {
        let query = self.applied_query()?;

        if let Some(cache) = self.active_cache() {
            if self.cache_settings.cache_count && self.cache_settings.force != Some(false) {
                let key = self.cache_key().count_key();
                let (count, outcome): (u64, CacheOutcome) = cache.remember(
                    &key,
                    self.cache_settings.count_ttl,
                    &self.effective_tags(),
                    || Ok(query.count()?),
                )?;
                self.record_cache_outcome(outcome, &key);
                return Ok(count);
            }
        }

        Ok(query.count()?)
    }

    // ------------------------------------------------------------------
    // Inputs and features
    // ------------------------------------------------------------------

    /// Add a filterable that wins over the input source
    pub fn append_filterable(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.appended.insert(key.into(), value.into());
        self
    }

    /// Scope the query to a principal and key caches by it
    pub fn for_principal(&mut self, principal: Arc<dyn Principal>) -> &mut Self {
        self.principal = Some(principal);
        self
    }

    /// Caller identity used for throttling
    pub fn for_caller(&mut self, caller: impl Into<String>) -> &mut Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn set_input(&mut self, input: impl InputSource + Send + Sync + 'static) -> &mut Self {
        self.input = Some(Arc::new(input));
        self
    }

    pub fn enable_feature(&mut self, feature: Feature) -> FilterResult<()> {
        self.set_feature(feature, true)
    }

    pub fn disable_feature(&mut self, feature: Feature) -> FilterResult<()> {
        self.set_feature(feature, false)
    }

    pub fn enable_features(&mut self, features: &[Feature]) -> FilterResult<()> {
        features.iter().try_for_each(|f| self.set_feature(*f, true))
    }

    pub fn set_feature(&mut self, feature: Feature, enabled: bool) -> FilterResult<()> {
        if self.state == FilterState::Applying {
            return Err(FilterError::FeaturesLocked);
        }
        self.features.set(feature, enabled);
        Ok(())
    }

    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    // ------------------------------------------------------------------
    // Chaining
    // ------------------------------------------------------------------

    pub fn chain_where(
        &mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<FilterValue>,
    ) -> &mut Self {
        self.chained.push(ChainedPredicate::Where {
            column: column.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn chain_where_in(&mut self, column: impl Into<String>, values: Vec<FilterValue>) -> &mut Self {
        self.chained.push(ChainedPredicate::WhereIn {
            column: column.into(),
            values,
        });
        self
    }

    pub fn chain_where_between(
        &mut self,
        column: impl Into<String>,
        low: impl Into<FilterValue>,
        high: impl Into<FilterValue>,
    ) -> &mut Self {
        self.chained.push(ChainedPredicate::WhereBetween {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        });
        self
    }

    pub fn chain_order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        self.chained.push(ChainedPredicate::OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn chain<F>(&mut self, predicate: F) -> &mut Self
    where
        F: Fn(&mut Q) -> FilterResult<()> + Send + Sync + 'static,
    {
        self.chained.push(ChainedPredicate::Custom(Arc::new(predicate)));
        self
    }

    pub fn chained(&self) -> &[ChainedPredicate<Q>] {
        &self.chained
    }

    pub fn clear_chain(&mut self) -> &mut Self {
        self.chained.clear();
        self
    }

    // ------------------------------------------------------------------
    // Optimization
    // ------------------------------------------------------------------

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_list_option(OPTION_SELECT, columns)
    }

    pub fn with_relations<I, S>(&mut self, relations: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_list_option(OPTION_WITH, relations)
    }

    pub fn use_index(&mut self, index: impl Into<String>) -> &mut Self {
        self.configured_options
            .insert(OPTION_USE_INDEX.to_string(), Value::String(index.into()));
        self
    }

    pub fn chunk_size_option(&mut self, size: usize) -> &mut Self {
        self.configured_options
            .insert(OPTION_CHUNK_SIZE.to_string(), json!(size.max(MIN_CHUNK_SIZE)));
        self
    }

    /// Rows per chunk for streaming: option, else configured default
    pub fn chunk_size(&self) -> usize {
        self.options
            .get(OPTION_CHUNK_SIZE)
            .or_else(|| self.configured_options.get(OPTION_CHUNK_SIZE))
            .and_then(as_integer)
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(self.defaults.streaming.chunk_size)
            .max(MIN_CHUNK_SIZE)
    }

    fn set_list_option<I, S>(&mut self, key: &str, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<Value> = items.into_iter().map(|s| Value::String(s.into())).collect();
        self.configured_options
            .insert(key.to_string(), Value::Array(items));
        self
    }

    // ------------------------------------------------------------------
    // Cache controls
    // ------------------------------------------------------------------

    /// Force caching on or off, bypassing the smart heuristic
    pub fn cache_results(&mut self, enabled: bool) -> &mut Self {
        self.cache_settings.force = Some(enabled);
        self
    }

    pub fn cache_count(&mut self, enabled: bool) -> &mut Self {
        self.cache_settings.cache_count = enabled;
        self
    }

    pub fn cache_ttl(&mut self, ttl: Duration) -> &mut Self {
        self.cache_settings.ttl = ttl;
        self
    }

    pub fn cache_tags<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_settings.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Key for the current active filterables and principal
    pub fn cache_key(&self) -> CacheKey {
        let principal = self.principal.as_ref().map(|p| p.identifier());
        CacheKeyBuilder::new(self.definition.name()).build(&self.active, principal.as_ref())
    }

    /// Forget this instance's result and count entries
    pub fn clear_cache(&self) -> bool {
        match &self.cache {
            Some(cache) => cache.forget(&self.cache_key()),
            None => false,
        }
    }

    /// Flush every entry sharing this filter's tags
    ///
    /// Falls back to forgetting this instance's own entries when the store has
    /// no tag support.
    pub fn clear_related_caches(&self) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        match cache.flush_tags(&self.effective_tags()) {
            Some(flushed) => flushed,
            None => usize::from(cache.forget(&self.cache_key())),
        }
    }

    /// Filter type, declared tags and per-instance tags
    fn effective_tags(&self) -> Vec<String> {
        let tags: BTreeSet<String> = std::iter::once(self.definition.name().to_string())
            .chain(self.definition.cache_tags().iter().cloned())
            .chain(self.cache_settings.tags.iter().cloned())
            .collect();
        tags.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Restartable lazy sequence over the filtered rows
    pub fn lazy(&mut self) -> FilterResult<LazyRows<'_, Q>> {
        self.finalize()?;
        let chunk_size = self.chunk_size();
        let query = self.query.as_ref().ok_or(FilterError::MissingQuery)?;
        Ok(LazyRows::new(query, chunk_size))
    }

    pub fn lazy_map<'a, U, F>(
        &'a mut self,
        f: F,
    ) -> FilterResult<impl Iterator<Item = FilterResult<U>> + 'a>
    where
        U: 'a,
        F: FnMut(Q::Row) -> U + 'a,
    {
        Ok(self.lazy()?.map(f))
    }

    pub fn lazy_filter<'a, F>(
        &'a mut self,
        predicate: F,
    ) -> FilterResult<impl Iterator<Item = FilterResult<Q::Row>> + 'a>
    where
        F: FnMut(&Q::Row) -> bool + 'a,
    {
        Ok(self.lazy()?.filter(predicate))
    }

    pub fn lazy_reduce<A, F>(&mut self, init: A, f: F) -> FilterResult<A>
    where
        F: FnMut(A, Q::Row) -> A,
    {
        self.lazy()?.reduce(init, f)
    }

    pub fn lazy_each<F>(&mut self, f: F) -> FilterResult<usize>
    where
        F: FnMut(Q::Row),
    {
        self.lazy()?.for_each(f)
    }

    /// Every row, accumulated chunk by chunk
    pub fn collect_chunked(&mut self) -> FilterResult<Vec<Q::Row>> {
        self.finalize()?;
        let query = self.query.as_ref().ok_or(FilterError::MissingQuery)?;
        collect_chunked(query, self.chunk_size())
    }

    /// Visit rows in chunks of `size`; `false` from the callback stops early
    pub fn chunk<F>(&mut self, size: usize, callback: F) -> FilterResult<bool>
    where
        F: FnMut(Vec<Q::Row>) -> bool,
    {
        self.finalize()?;
        let query = self.query.as_ref().ok_or(FilterError::MissingQuery)?;
        Ok(query.chunk(size.max(MIN_CHUNK_SIZE), callback)?)
    }

    /// Single-pass cursor over the rows
    pub fn cursor(&mut self) -> FilterResult<Box<dyn Iterator<Item = Q::Row> + '_>> {
        self.finalize()?;
        let query = self.query.as_ref().ok_or(FilterError::MissingQuery)?;
        Ok(query.cursor()?)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn definition(&self) -> &FilterDefinition<Q> {
        &self.definition
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn query(&self) -> Option<&Q> {
        self.query.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn active_filterables(&self) -> &Filterables {
        &self.active
    }

    /// Keys dispatched by the last `apply`, in dispatch order
    pub fn applied_keys(&self) -> &[String] {
        &self.applied
    }

    /// Keys removed by permission filtering in the last `apply`
    pub fn removed_keys(&self) -> &[String] {
        &self.removed
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn rate_limit_verdict(&self) -> Option<&RateLimitVerdict> {
        self.rate_limit.as_ref()
    }

    /// Outcome of the advisory rate-limit check, if it ran
    pub fn rate_limit_passed(&self) -> Option<bool> {
        self.rate_limit.as_ref().map(|v| v.allowed)
    }

    pub fn performance(&self) -> Option<&PerformanceReport> {
        self.performance.as_ref()
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            instance_id: self.instance_id,
            filter_type: self.definition.name().to_string(),
            state: self.state,
            features: self.features.names(),
            filterables: self.active.clone(),
            options: self.options.clone(),
            applied_keys: self.applied.clone(),
            removed_keys: self.removed.clone(),
            chained: self.chained.iter().map(|c| format!("{:?}", c)).collect(),
            failure: self.failure.clone(),
            rate_limit: self.rate_limit.clone(),
            cache_key: self.cache_key(),
            query: self.query.as_ref().map(QueryBuilder::shape),
            performance: self.performance.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    fn run_pipeline(&mut self, query: &mut Q, features: FeatureSet) -> FilterResult<()> {
        let definition = Arc::clone(&self.definition);

        if let Some(principal) = &self.principal {
            query.where_eq(definition.principal_column(), &principal.identifier())?;
        }

        if features.contains(Feature::Permissions) {
            self.removed = self.permissions.restrict(
                &mut self.active,
                definition.permissions(),
                self.principal.as_deref(),
            );
            if !self.removed.is_empty() {
                self.log(
                    features,
                    Level::Debug,
                    "Filterables removed by permissions",
                    json!({ "removed": self.removed }),
                );
            }
        }

        for pre_filter in definition.pre_filters() {
            pre_filter(query)?;
        }

        if features.contains(Feature::Validation) {
            self.validator
                .validate(definition.rules(), &self.active)
                .map_err(FilterError::Validation)?;
        }

        if features.contains(Feature::RateLimit) {
            self.check_rate_limit(features);
        }

        if features.contains(Feature::ValueTransformation) {
            self.transformer
                .transform(definition.transforms(), &mut self.active);
        }

        for (key, value) in &self.active {
            let method = definition.method_name(key);
            let predicate = definition
                .predicate(&method)
                .ok_or_else(|| FilterError::BadDispatch {
                    key: key.clone(),
                    method: method.clone(),
                })?;
            predicate(query, value)?;
            self.applied.push(key.clone());
            if features.contains(Feature::Performance) {
                self.metrics.record_dispatch();
            }
        }

        if features.contains(Feature::FilterChaining) {
            for chained in &self.chained {
                chained.apply_to(query)?;
            }
        }

        if features.contains(Feature::Optimization) {
            self.apply_optimizations(query)?;
        }

        Ok(())
    }

    fn check_rate_limit(&mut self, features: FeatureSet) {
        let principal = self.principal.as_ref().map(|p| {
            let id = p.identifier();
            scalar_string(&id).unwrap_or_else(|| stable_encode(&id))
        });
        let request = RateLimitRequest {
            filter_type: self.definition.name(),
            caller: self.caller.as_deref().unwrap_or(ANONYMOUS_CALLER),
            principal,
            filterables: &self.active,
            weights: self.definition.weights(),
        };
        let verdict = self.rate_limiter.check(&request);

        if let Some(rejection) = &verdict.rejection {
            if features.contains(Feature::Performance) {
                self.metrics.record_rate_limit_rejection();
            }
            self.log(
                features,
                Level::Warning,
                "Filter rate limit exceeded",
                json!({
                    "rejection": rejection,
                    "message": rejection.to_string(),
                    "score": verdict.score,
                    "filter_count": verdict.filter_count,
                }),
            );
        }
        self.rate_limit = Some(verdict);
    }

    fn apply_optimizations(&self, query: &mut Q) -> FilterResult<()> {
        if let Some(columns) = self.options.get(OPTION_SELECT).map(string_list) {
            if !columns.is_empty() {
                query.select(&columns)?;
            }
        }
        if let Some(relations) = self.options.get(OPTION_WITH).map(string_list) {
            if !relations.is_empty() {
                query.with_relations(&relations)?;
            }
        }
        if let Some(index) = self.options.get(OPTION_USE_INDEX).and_then(scalar_string) {
            query.use_index(&index)?;
        }
        Ok(())
    }

    /// Defaults, then setter options, then per-call options
    fn merge_options(&self, call: Options) -> Options {
        let mut merged = self.defaults.options.clone();
        merged.extend(self.configured_options.clone());
        merged.extend(call);
        merged
    }

    fn read_input(&self) -> Filterables {
        match &self.input {
            Some(input) => input.only(&self.definition.filterable_keys()),
            None => Filterables::new(),
        }
    }

    fn applied_query(&self) -> FilterResult<&Q> {
        match self.state {
            FilterState::Applied => self.query.as_ref().ok_or(FilterError::MissingQuery),
            FilterState::Failed => Err(FilterError::Failed {
                reason: self.failure.clone().unwrap_or_default(),
            }),
            FilterState::Initialized | FilterState::Applying => Err(FilterError::NotApplied),
        }
    }

    fn active_cache(&self) -> Option<&CacheStrategy> {
        if self.features.contains(Feature::Caching) {
            self.cache.as_ref()
        } else {
            None
        }
    }

    fn record_cache_outcome(&self, outcome: CacheOutcome, key: &CacheKey) {
        if self.features.contains(Feature::Performance) {
            match outcome {
                CacheOutcome::Hit => self.metrics.record_cache_lookup(true),
                CacheOutcome::Miss => self.metrics.record_cache_lookup(false),
                CacheOutcome::Direct => self.metrics.record_direct_execution(),
            }
        }
        self.log(
            self.features,
            Level::Debug,
            "Filter cache lookup",
            json!({ "outcome": outcome, "key": key }),
        );
    }

    fn log(&self, features: FeatureSet, level: Level, message: &str, context: Value) {
        if !features.contains(Feature::Logging) {
            return;
        }
        let Some(logger) = &self.logger else {
            return;
        };
        let mut context = match context {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("context".into(), other);
                map
            }
        };
        context.insert("filter".into(), json!(self.definition.name()));
        context.insert("instance".into(), json!(self.instance_id.to_string()));
        let context = Value::Object(context);

        match level {
            Level::Info => logger.info(message, &context),
            Level::Debug => logger.debug(message, &context),
            Level::Warning => logger.warning(message, &context),
        }
    }
}

impl<Q: QueryBuilder> FilterApi<Q> for Filter<Q> {
    fn apply(&mut self, query: Q, options: Options) -> FilterResult<&Q> {
        Filter::apply(self, query, options)
    }

    fn get(&self) -> FilterResult<Vec<Q::Row>> {
        Filter::get(self)
    }

    fn count(&self) -> FilterResult<u64> {
        Filter::count(self)
    }

    fn reset(&mut self) {
        Filter::reset(self)
    }

    fn state(&self) -> FilterState {
        self.state
    }
}

impl<Q: QueryBuilder> fmt::Debug for Filter<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("instance_id", &self.instance_id)
            .field("filter_type", &self.definition.name())
            .field("state", &self.state)
            .field("features", &self.features.names())
            .field("active", &self.active)
            .field("failure", &self.failure)
            .finish()
    }
}

/// Array of strings, or a comma-separated string
fn string_list(value: &FilterValue) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
