use crate::compiler::{
    BaseCompiler, CompileCx, DecoratingCompiler, ExpCompiler, Profile, ProfilingHook,
    RefinedCompiler, TracingHook,
};
use crate::evaluator::Evaluator;
use olap_model::Schema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which coercion policy the compiler stack is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerFlavor {
    /// [`BaseCompiler`].
    Base,
    /// [`RefinedCompiler`]: default-member tuples and always-copied mutable lists.
    Refined,
}

impl Default for CompilerFlavor {
    fn default() -> Self {
        Self::Base
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    pub flavor: CompilerFlavor,
    /// Log every compiled node at `trace` level.
    pub trace_compilation: bool,
    /// Count evaluations and time of every compiled node.
    pub profiling: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            flavor: CompilerFlavor::Base,
            trace_compilation: false,
            profiling: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    /// Read cells addressed by members of dimensions the cube does not join to as if those
    /// members were absent, instead of returning null.
    pub ignore_unrelated_dimensions: bool,
    /// Nesting limit for calculated members that reference other calculated members.
    pub max_evaluation_depth: usize,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            ignore_unrelated_dimensions: false,
            max_evaluation_depth: 64,
        }
    }
}

/// Compiler and evaluator settings, as loaded from a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub compiler: CompilerSettings,
    pub evaluator: EvaluatorSettings,
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A compiler stack built from [`CompilerSettings`].
pub struct CompilerStack {
    compiler: Box<dyn ExpCompiler>,
    profile: Option<Arc<Profile>>,
}

impl CompilerStack {
    pub fn compiler(&self) -> &dyn ExpCompiler {
        &*self.compiler
    }

    /// Context for compiling with the whole stack.
    pub fn cx(&self) -> CompileCx<'_> {
        CompileCx::new(&*self.compiler)
    }

    /// Counters of the profiling layer, when profiling is enabled.
    pub fn profile(&self) -> Option<&Arc<Profile>> {
        self.profile.as_ref()
    }
}

impl std::fmt::Debug for CompilerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerStack")
            .field("profiling", &self.profile.is_some())
            .finish()
    }
}

/// Build the compiler stack `settings` describe.
///
/// Profiling sits below tracing, so traced nodes are the profiled ones.
pub fn build_compiler(
    settings: &CompilerSettings,
    schema: Arc<Schema>,
    evaluator: &dyn Evaluator,
) -> CompilerStack {
    let base = BaseCompiler::new(schema.clone(), evaluator);
    let mut compiler: Box<dyn ExpCompiler> = match settings.flavor {
        CompilerFlavor::Base => Box::new(base),
        CompilerFlavor::Refined => Box::new(RefinedCompiler::new(base)),
    };
    let mut profile = None;
    if settings.profiling {
        let hook = ProfilingHook::new(schema.clone());
        profile = Some(hook.profile().clone());
        compiler = Box::new(DecoratingCompiler::new(compiler, hook));
    }
    if settings.trace_compilation {
        compiler = Box::new(DecoratingCompiler::new(compiler, TracingHook::new(schema)));
    }
    CompilerStack { compiler, profile }
}
