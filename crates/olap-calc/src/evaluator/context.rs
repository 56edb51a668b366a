use super::{CellReader, Evaluator, Savepoint};
use crate::calc::Calc;
use crate::config::EvaluatorSettings;
use crate::error::{CalcResult, EvalError};
use ahash::{AHashMap, AHashSet};
use log::warn;
use olap_model::{DimensionId, HierarchyId, MemberId, MemberKind, Schema, Value};
use std::sync::Arc;

/// Evaluator over a [`Schema`] and a [`CellReader`].
///
/// Holds one current member per hierarchy plus an undo log of context changes; a savepoint is a
/// position in that log. Calculated members are evaluated in place of a stored cell whenever one
/// of them is current.
///
/// Cloning is cheap and yields an independent context over the same cube, which is how a compiled
/// tree is evaluated from several threads at once.
#[derive(Clone)]
pub struct ContextEvaluator {
    schema: Arc<Schema>,
    cells: Arc<dyn CellReader>,
    settings: EvaluatorSettings,
    current: Vec<MemberId>,
    undo: Vec<(HierarchyId, MemberId)>,
    calculated: Arc<AHashMap<MemberId, Calc>>,
    related_dimensions: Option<Arc<AHashSet<DimensionId>>>,
    depth: usize,
}

impl std::fmt::Debug for ContextEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEvaluator")
            .field("schema", &self.schema.name())
            .field("current", &self.current)
            .field("undo_depth", &self.undo.len())
            .field("calculated_members", &self.calculated.len())
            .finish()
    }
}

impl ContextEvaluator {
    /// Start with every hierarchy at its default member.
    pub fn new(schema: Arc<Schema>, cells: Arc<dyn CellReader>, settings: EvaluatorSettings) -> Self {
        let current = schema
            .hierarchy_ids()
            .map(|h| schema.default_member(h))
            .collect();
        Self {
            schema,
            cells,
            settings,
            current,
            undo: Vec::new(),
            calculated: Arc::new(AHashMap::new()),
            related_dimensions: None,
            depth: 0,
        }
    }

    /// Register a calculated member: whenever `member` is current, cells are computed by `calc`
    /// instead of being read from storage.
    pub fn with_calculated_member(mut self, member: MemberId, calc: Calc) -> Self {
        Arc::make_mut(&mut self.calculated).insert(member, calc);
        self
    }

    /// Restrict the dimensions the cube joins to. Cells addressed by a non-all member of any
    /// other dimension are null unless unrelated dimensions are ignored.
    pub fn with_related_dimensions(mut self, dimensions: impl IntoIterator<Item = DimensionId>) -> Self {
        self.related_dimensions = Some(Arc::new(dimensions.into_iter().collect()));
        self
    }

    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    fn is_unrelated(&self, member: MemberId) -> bool {
        let Some(related) = &self.related_dimensions else {
            return false;
        };
        let m = self.schema.member(member);
        m.kind() == MemberKind::Regular && !related.contains(&self.schema.member_dimension(member))
    }

    fn calculated_in_context(&self) -> Option<Calc> {
        if self.calculated.is_empty() {
            return None;
        }
        self.current
            .iter()
            .find_map(|m| self.calculated.get(m).cloned())
    }
}

impl Evaluator for ContextEvaluator {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn context_member(&self, hierarchy: HierarchyId) -> MemberId {
        self.current[hierarchy.index()]
    }

    fn context(&self) -> Vec<MemberId> {
        self.current.clone()
    }

    fn set_context(&mut self, member: MemberId) -> MemberId {
        let hierarchy = self.schema.member(member).hierarchy();
        let previous = self.current[hierarchy.index()];
        if previous != member {
            self.undo.push((hierarchy, previous));
            self.current[hierarchy.index()] = member;
        }
        previous
    }

    fn savepoint(&mut self) -> Savepoint {
        Savepoint::new(self.undo.len())
    }

    fn restore(&mut self, savepoint: Savepoint) {
        while self.undo.len() > savepoint.depth() {
            if let Some((hierarchy, member)) = self.undo.pop() {
                self.current[hierarchy.index()] = member;
            }
        }
    }

    fn evaluate_current(&mut self) -> CalcResult<Value> {
        if self.need_to_return_null_for_unrelated_dimension(&self.current) {
            return Ok(Value::Null);
        }
        let Some(calc) = self.calculated_in_context() else {
            return self.cells.cell_value(&self.schema, &self.current);
        };
        if self.depth >= self.settings.max_evaluation_depth {
            warn!(
                "calculated member evaluation exceeded depth {}",
                self.settings.max_evaluation_depth
            );
            return Err(EvalError::Recursion(self.settings.max_evaluation_depth));
        }
        self.depth += 1;
        let savepoint = self.savepoint();
        let result = calc.evaluate_scalar(self);
        self.restore(savepoint);
        self.depth -= 1;
        result
    }

    fn need_to_return_null_for_unrelated_dimension(&self, members: &[MemberId]) -> bool {
        !self.settings.ignore_unrelated_dimensions && members.iter().any(|m| self.is_unrelated(*m))
    }

    fn might_return_null_for_unrelated_dimension(&self) -> bool {
        if self.settings.ignore_unrelated_dimensions {
            return false;
        }
        match &self.related_dimensions {
            Some(related) => self.schema.dimension_ids().any(|d| !related.contains(&d)),
            None => false,
        }
    }
}
