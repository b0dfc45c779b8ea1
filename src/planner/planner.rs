//! Query planner facade
//!
//! Compiles a resolved query against a catalog snapshot:
//!
//! 1. resolve FROM tables and WHERE equality bindings
//! 2. validate query shape and ORDER BY targets
//! 3. classify distribution
//! 4. assemble the single-node plan, or run the distributed planner
//! 5. check the merge invariant and compute the determinism verdict
//!
//! Planning is a pure function of (query, catalog, config): the same inputs
//! always produce the same plan.

use super::assembler::Assembler;
use super::config::PlannerConfig;
use super::context::PlanningContext;
use super::distributed::{classify, LocalPlanned};
use super::errors::PlannerResult;
use super::order::analyze_determinism;
use crate::catalog::Catalog;
use crate::observability::{ObservationScope, PlannerMetrics};
use crate::plan::{CompiledPlan, Distribution, PLAN_FORMAT_VERSION};
use crate::query::{validate_order_by, validate_structure, ResolvedQuery};

/// Query planner over an immutable catalog snapshot
pub struct QueryPlanner<'a> {
    catalog: &'a Catalog,
    config: &'a PlannerConfig,
    metrics: Option<&'a PlannerMetrics>,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a PlannerConfig) -> Self {
        Self {
            catalog,
            config,
            metrics: None,
        }
    }

    /// Counts compilations and planner decisions into `metrics`
    pub fn with_metrics(mut self, metrics: &'a PlannerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Plans a query, returning an immutable plan or the first rule
    /// violation. No partial plan is ever returned.
    pub fn plan(&self, query: &ResolvedQuery) -> PlannerResult<CompiledPlan> {
        let scope = self.config.log_decisions.then(|| ObservationScope::new("PLAN"));

        match self.compile(query) {
            Ok(plan) => {
                if let Some(metrics) = self.metrics {
                    metrics.increment_plans_compiled();
                }
                if let Some(scope) = scope {
                    scope.complete_with_fields(&[
                        ("distribution", plan.distribution.as_str()),
                        ("determinism", plan.determinism.as_str()),
                    ]);
                }
                Ok(plan)
            }
            Err(err) => {
                if let Some(metrics) = self.metrics {
                    metrics.increment_plans_rejected();
                }
                if let Some(scope) = scope {
                    scope.fail(err.code().code());
                }
                Err(err)
            }
        }
    }

    fn compile(&self, query: &ResolvedQuery) -> PlannerResult<CompiledPlan> {
        let mut ctx = PlanningContext::new(query, self.catalog, self.config)?;
        if let Some(metrics) = self.metrics {
            ctx = ctx.with_metrics(metrics);
        }

        validate_structure(query, ctx.tables())?;
        validate_order_by(query)?;

        let distribution = classify(&ctx)?;
        let (partition, coordinator, aggregate_pushdown) = match distribution {
            Distribution::SingleNode | Distribution::SinglePartition => {
                (Assembler::new(&ctx).assemble()?, None, None)
            }
            Distribution::MultiPartition => {
                let built = LocalPlanned::plan(&ctx)?
                    .check_mergeability(&ctx)
                    .build_coordinator(&ctx)?;
                built.check_merge_invariant(ctx.bindings())?;
                (built.partition, Some(built.coordinator), built.aggregate_pushdown)
            }
        };

        let determinism = analyze_determinism(query, ctx.tables(), &ctx.reduced_order(), ctx.bindings());

        Ok(CompiledPlan {
            format_version: PLAN_FORMAT_VERSION,
            distribution,
            partition,
            coordinator,
            determinism,
            aggregate_pushdown,
        })
    }
}
