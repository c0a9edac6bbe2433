//! The IO runner: a trampoline interpreter for `IoAction`s.
//!
//! `run` keeps an explicit continuation stack instead of recursing, so the
//! native stack stays flat however deep the `map`/`join` nesting goes.

use std::sync::Arc;

use ioexec_host::{Error, EvalState, Function, LazyValue, Pos, Result, Value};

use crate::action::{describe, force_io, IoAction};
use crate::config::RunnerConfig;
use crate::loader::{ModuleCache, ModuleLoader};

/// What to do with the value the current action eventually yields.
enum Frame {
    /// Apply `function` to it. `over` is the action being mapped over.
    Apply {
        function: LazyValue,
        pos: Pos,
        over: LazyValue,
    },
    /// Run it as an action. `over` is the action being joined.
    Join { pos: Pos, over: LazyValue },
}

impl Frame {
    /// One line of causal context for an error that passed through this
    /// frame. Only called when tracing is enabled.
    fn annotation(&self) -> String {
        match self {
            Frame::Apply { function, pos, over } => match function.peek() {
                Some(Value::Function(Function::Lambda(lambda))) => format!(
                    "while mapping {} over {}, at {}:",
                    lambda.show_name_pos(),
                    describe(over),
                    pos
                ),
                Some(Value::Function(f)) => format!(
                    "while mapping primop {} over {}, at {}:",
                    f.primop().map(|op| op.name.as_str()).unwrap_or("<unknown>"),
                    describe(over),
                    pos
                ),
                _ => format!("while mapping {} over {}, at {}:", function, describe(over), pos),
            },
            Frame::Join { pos, over } => {
                format!("while joining {}, at {}:", describe(over), pos)
            }
        }
    }
}

/// A join whose yielded action is still running.
///
/// Every frame at index `depth` or above belongs to that action. Only
/// tracked when tracing is enabled.
struct ActiveJoin {
    depth: usize,
    frame: Frame,
}

/// Result of forcing one action during descent.
enum Step {
    /// Keep descending into this action, requested at this position.
    Descend(LazyValue, Pos),
    /// The action produced a value; start ascending with it.
    Yield(LazyValue),
}

/// Runs IO actions against an evaluator.
///
/// A runner owns the module cache used by native calls, so handles opened
/// by one runner are never visible to another.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ioexec::{action, Runner, RunnerConfig, StaticLoader};
/// use ioexec_host::{EvalState, MemoryStore, Pos, Value};
///
/// let state = EvalState::new(Arc::new(MemoryStore::new()));
/// let runner = Runner::new(StaticLoader::new(), RunnerConfig::default());
///
/// let program = action::join(action::unit(action::unit(Value::Int(42))));
/// let result = runner.run(&state, &program, &Pos::none()).unwrap();
/// assert_eq!(state.force(&result).unwrap().as_int(), Some(42));
/// ```
pub struct Runner {
    modules: ModuleCache,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(loader: impl ModuleLoader + 'static, config: RunnerConfig) -> Self {
        Self {
            modules: ModuleCache::new(Arc::new(loader)),
            config,
        }
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `action` to completion and return the value it yields, forced.
    ///
    /// `pos` is where the run was requested; it is used when `action`
    /// itself turns out not to be an IO action.
    pub fn run(&self, state: &EvalState, action: &LazyValue, pos: &Pos) -> Result<LazyValue> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut joins: Vec<ActiveJoin> = Vec::new();
        let mut current = action.clone();
        let mut current_pos = pos.clone();

        loop {
            // Descend through maps and joins until something yields a value.
            let mut carried = loop {
                let step = self
                    .step(state, &current, &current_pos, &mut stack)
                    .map_err(|e| self.annotate(e, &stack, &joins, None))?;
                match step {
                    Step::Descend(next, pos) => {
                        current = next;
                        current_pos = pos;
                    }
                    Step::Yield(value) => break value,
                }
            };

            // Ascend, applying pending functions until a join marker asks
            // for the carried value to be run.
            loop {
                // Joins whose action has now yielded are finished.
                while joins.last().is_some_and(|join| join.depth >= stack.len()) {
                    joins.pop();
                }
                match stack.pop() {
                    None => {
                        state
                            .force(&carried)
                            .map_err(|e| self.annotate(e, &stack, &joins, None))?;
                        return Ok(carried);
                    }
                    Some(Frame::Join { pos, over }) => {
                        tracing::trace!(depth = stack.len(), "join resumes descent");
                        if self.config.show_trace {
                            joins.push(ActiveJoin {
                                depth: stack.len(),
                                frame: Frame::Join {
                                    pos: pos.clone(),
                                    over,
                                },
                            });
                        }
                        current = carried;
                        current_pos = pos;
                        break;
                    }
                    Some(Frame::Apply {
                        function,
                        pos,
                        over,
                    }) => {
                        carried = match state.call_function(&function, carried, &pos) {
                            Ok(value) => value,
                            Err(e) => {
                                let failed = Frame::Apply {
                                    function,
                                    pos,
                                    over,
                                };
                                return Err(self.annotate(e, &stack, &joins, Some(&failed)));
                            }
                        };
                    }
                }
            }
        }
    }

    /// Force `current` and handle one action.
    fn step(
        &self,
        state: &EvalState,
        current: &LazyValue,
        pos: &Pos,
        stack: &mut Vec<Frame>,
    ) -> Result<Step> {
        match force_io(state, current, pos)? {
            IoAction::Unit { value } => {
                tracing::trace!(depth = stack.len(), "unit");
                state.force(value)?;
                Ok(Step::Yield(value.clone()))
            }
            IoAction::Map {
                function,
                action,
                pos,
            } => {
                tracing::trace!(depth = stack.len(), "map");
                state.force_function(function, pos)?;
                stack.push(Frame::Apply {
                    function: function.clone(),
                    pos: pos.clone(),
                    over: action.clone(),
                });
                Ok(Step::Descend(action.clone(), pos.clone()))
            }
            IoAction::Join { action, pos } => {
                tracing::trace!(depth = stack.len(), "join");
                stack.push(Frame::Join {
                    pos: pos.clone(),
                    over: action.clone(),
                });
                Ok(Step::Descend(action.clone(), pos.clone()))
            }
            IoAction::NativeCall {
                library,
                symbol,
                args,
                pos,
            } => {
                tracing::trace!(depth = stack.len(), "native call");
                let result = self.modules.invoke(state, pos, library, symbol, args)?;
                Ok(Step::Yield(result))
            }
        }
    }

    /// Attach causal context from `failed`, every pending frame and every
    /// join still running its action, innermost first. A no-op unless
    /// tracing is enabled.
    fn annotate(
        &self,
        mut err: Error,
        stack: &[Frame],
        joins: &[ActiveJoin],
        failed: Option<&Frame>,
    ) -> Error {
        if !self.config.show_trace {
            return err;
        }
        if let Some(frame) = failed {
            err = err.with_frame(frame.annotation());
        }
        let mut pending = stack.iter().enumerate().rev().peekable();
        let mut running = joins.iter().rev().peekable();
        loop {
            let join_is_inner = match (pending.peek(), running.peek()) {
                (Some((index, _)), Some(join)) => *index < join.depth,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => return err,
            };
            let frame = if join_is_inner {
                running.next().map(|join| &join.frame)
            } else {
                pending.next().map(|(_, frame)| frame)
            };
            if let Some(frame) = frame {
                err = err.with_frame(frame.annotation());
            }
        }
    }
}
