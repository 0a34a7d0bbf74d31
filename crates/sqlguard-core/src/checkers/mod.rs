//! Rule Checker Bank (spec §4.4): stateless, composable prevention checkers.
//!
//! Each checker is a small value type implementing [`Checker`]. None holds
//! mutable instance state, so the same checker instance is shared across
//! every concurrent `validate()` call.

mod access_control;
mod dummy_condition;
mod pagination;
mod security;

pub use access_control::{BlacklistFieldChecker, ReadOnlyTableChecker, WhitelistFieldChecker};
pub use dummy_condition::DummyConditionChecker;
pub use pagination::{DeepPaginationChecker, LargePageSizeChecker, LogicalPaginationChecker, MissingOrderByChecker, NoPaginationChecker};
pub use security::{
    CallStatementChecker, DangerousFunctionChecker, DdlOperationChecker, DeniedTableChecker, IntoOutfileChecker, MetadataStatementChecker,
    MultiStatementChecker, NoWhereClauseChecker, SetOperationChecker, SetStatementChecker, SqlCommentChecker,
};

use std::collections::BTreeMap;

use crate::{config::CheckerConfigSet, context::SqlContext, result::Violation, visitor::StatementVisitor};

/// Split a comma-separated threshold value (e.g. `"sys_,tmp_"`) into owned
/// entries, trimming whitespace and dropping empties.
fn split_csv(thresholds: &BTreeMap<String, String>, key: &str) -> Vec<String> {
    thresholds
        .get(key)
        .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// One rule in the prevention bank.
///
/// `check` is the entry point the engine calls; the default implementation
/// dispatches through [`crate::visitor::dispatch`] so a checker that only
/// needs `visit_update`/`visit_delete` (say) never has to match on the
/// statement variant itself.
pub trait Checker: StatementVisitor + Send + Sync {
    /// Stable identifier, matches the `Checker` column in the rule bank table
    /// and the key used in `CheckerConfig`.
    fn id(&self) -> &'static str;

    /// `false` for checkers that only need regex/text inspection and can
    /// still run when the statement failed to parse (spec §4.6 step 2).
    fn requires_ast(&self) -> bool {
        true
    }

    /// Run this checker against `ctx`. `statement` is `None` exactly when
    /// parsing failed; AST-dependent checkers should return no findings in
    /// that case (the engine already appended the "analysis failed"
    /// violation) rather than re-deriving structure from raw text.
    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        match ctx.statement.as_ref().and_then(|h| h.first()) {
            Some(statement) => crate::visitor::dispatch(self, ctx, statement),
            None => Vec::new(),
        }
    }
}

/// Priority-ordered, config-filtered bank of checkers.
///
/// Order is the iteration order of `checkers` — the engine runs them in
/// exactly this sequence for every call (spec §4.6 "Ordering guarantee").
pub struct CheckerBank {
    checkers: Vec<Box<dyn Checker>>,
}

impl CheckerBank {
    #[must_use]
    pub fn new(checkers: Vec<Box<dyn Checker>>) -> Self {
        Self { checkers }
    }

    /// The full default bank, in the priority order implied by severity in
    /// the rule table (spec §4.4): statement-shape dangers first, then
    /// access-control rules, then pagination hygiene.
    #[must_use]
    pub fn default_bank() -> Self {
        Self::new(vec![
            Box::new(NoWhereClauseChecker),
            Box::new(MultiStatementChecker),
            Box::new(SetOperationChecker),
            Box::new(SqlCommentChecker),
            Box::new(IntoOutfileChecker),
            Box::new(DdlOperationChecker),
            Box::new(DangerousFunctionChecker),
            Box::new(CallStatementChecker),
            Box::new(MetadataStatementChecker),
            Box::new(SetStatementChecker),
            Box::new(DeniedTableChecker::default()),
            Box::new(DummyConditionChecker::default()),
            Box::new(BlacklistFieldChecker::default()),
            Box::new(WhitelistFieldChecker::default()),
            Box::new(ReadOnlyTableChecker::default()),
            Box::new(LogicalPaginationChecker),
            Box::new(DeepPaginationChecker::default()),
            Box::new(LargePageSizeChecker::default()),
            Box::new(MissingOrderByChecker),
            Box::new(NoPaginationChecker::default()),
        ])
    }

    /// Build the bank from a `CheckerConfigSet`, using per-checker
    /// thresholds/lists where configured and falling back to the default
    /// otherwise. Called at startup and again whenever the config watch
    /// channel fires (spec §5: config updates swap the whole value).
    #[must_use]
    pub fn from_config(config: &CheckerConfigSet) -> Self {
        let denied_table_patterns = config
            .get("DeniedTable")
            .map(|c| split_csv(&c.thresholds, "patterns"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DeniedTableChecker::default().patterns().to_vec());

        let dummy_condition_aggressive =
            config.get("DummyCondition").map(|c| c.threshold_flag("aggressive", false)).unwrap_or(false);

        let blacklist_fields = config
            .get("BlacklistField")
            .map(|c| split_csv(&c.thresholds, "fields"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| BlacklistFieldChecker::default().fields().to_vec());
        // spec.md's BlacklistField severity is "Medium/High" (§4.4): a lone
        // blacklisted field stays High, combining this many distinct
        // blacklisted fields downgrades to Medium (see DESIGN.md).
        let blacklist_medium_threshold = config.get("BlacklistField").map(|c| c.threshold_or("medium_when_fields_at_least", 2)).unwrap_or(2);

        let whitelist_tables = config.get("WhitelistField").map(|c| split_csv(&c.thresholds, "tables")).unwrap_or_default();
        let read_only_tables = config.get("ReadOnlyTable").map(|c| split_csv(&c.thresholds, "tables")).unwrap_or_default();
        let large_tables = config.get("NoPagination").map(|c| split_csv(&c.thresholds, "tables")).unwrap_or_default();

        let deep_pagination_offset = config.get("DeepPagination").map(|c| c.threshold_or("max_offset", 10_000)).unwrap_or(10_000);
        let max_page_size = config.get("LargePageSize").map(|c| c.threshold_or("max_limit", 1_000)).unwrap_or(1_000);

        Self::new(vec![
            Box::new(NoWhereClauseChecker),
            Box::new(MultiStatementChecker),
            Box::new(SetOperationChecker),
            Box::new(SqlCommentChecker),
            Box::new(IntoOutfileChecker),
            Box::new(DdlOperationChecker),
            Box::new(DangerousFunctionChecker),
            Box::new(CallStatementChecker),
            Box::new(MetadataStatementChecker),
            Box::new(SetStatementChecker),
            Box::new(DeniedTableChecker::new(denied_table_patterns)),
            Box::new(DummyConditionChecker::new(dummy_condition_aggressive)),
            Box::new(BlacklistFieldChecker::new(blacklist_fields).with_medium_threshold(blacklist_medium_threshold)),
            Box::new(WhitelistFieldChecker::new(whitelist_tables)),
            Box::new(ReadOnlyTableChecker::new(read_only_tables)),
            Box::new(LogicalPaginationChecker),
            Box::new(DeepPaginationChecker::new(deep_pagination_offset)),
            Box::new(LargePageSizeChecker::new(max_page_size)),
            Box::new(MissingOrderByChecker),
            Box::new(NoPaginationChecker::new(large_tables)),
        ])
    }

    /// Run every enabled checker, in priority order, and collect their
    /// findings. `config` gates which checkers run; a checker absent from
    /// the config set defaults to enabled.
    #[must_use]
    pub fn run(&self, ctx: &SqlContext, config: &CheckerConfigSet) -> Vec<Violation> {
        self.checkers
            .iter()
            .filter(|c| config.is_enabled(c.id()))
            .filter(|c| ctx.statement.is_some() || !c.requires_ast())
            .flat_map(|c| c.check(ctx))
            .collect()
    }
}
