//! Statement lowering.
//!
//! Statements are rewritten bottom-up into [`Expr`] sequences. Control-flow
//! statements cannot be finished in one pass: a `break` deep inside a loop
//! body must patch flag assignments into an expression that only exists once
//! the enclosing loop has been assembled. Those placeholder bodies live in an
//! arena and appear in the output as [`Expr::Interrupt`] handles until
//! [`lower_program`] resolves them at the very end.
//!
//! Suites drain through an explicit stack of pending frames rather than
//! native recursion, so statement nesting is bounded only by memory.

use ruff_python_ast::{self as ast, Expr as AstExpr, ModModule, Stmt};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    config::{Config, ExprWrapper, IfStyle},
    error::ConvertError,
    expressions::{
        BoolOperator, Comprehension, Expr, FStringPart, InterruptId, Keyword, LambdaParams,
        Literal, Operator, Param,
    },
    names::{NameGenerator, SynthName},
    namespace::{NamespaceId, NamespaceKind, Namespaces},
    parse::SourceMap,
    presets,
    scope::{ScopeId, ScopeTree},
    transform::{convert_operator, Transformer},
};

/// Arena handle for an in-progress loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopId(pub u32);

impl LoopId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
enum LoopKind {
    While { break_flag: String },
    For { adapter: String },
}

/// Bookkeeping for one loop statement, alive while its body lowers.
#[derive(Debug)]
struct LoopState {
    kind: LoopKind,
    interrupt_flag: String,
    /// Set once a branch guard actually reads the flag.
    interrupt_used: bool,
    /// `break`, `continue` and `return` statements that cut this loop short.
    interrupt_cnt: usize,
    break_cnt: usize,
    interrupt_bodies: Vec<InterruptId>,
}

/// Which counter a branch watches to decide where to split guard segments.
#[derive(Clone, Copy)]
enum Tracker {
    Loop(LoopId),
    Function(NamespaceId),
    None,
}

/// One suite in mid-lowering. Statements after a possible interruption are
/// fenced behind guards, so the frame splits its output into segments
/// whenever the watched interrupt counter moves.
struct BranchFrame<'a> {
    ns: NamespaceId,
    stmts: &'a [Stmt],
    next: usize,
    tracker: Tracker,
    seen: usize,
    segments: Vec<Vec<Expr>>,
    /// Set after an unconditional jump; the rest of the suite is unreachable.
    halted: bool,
}

impl BranchFrame<'_> {
    fn extend_segment(&mut self, exprs: Vec<Expr>) {
        if let Some(segment) = self.segments.last_mut() {
            segment.extend(exprs);
        }
    }
}

struct IfFrame<'a> {
    ns: NamespaceId,
    stmt: &'a ast::StmtIf,
    test: Expr,
    body: Option<Vec<Expr>>,
    /// Test of the elif clause whose body is currently lowering.
    pending_test: Option<Expr>,
    clauses: Vec<(Option<Expr>, Vec<Expr>)>,
}

struct WhileFrame<'a> {
    ns: NamespaceId,
    stmt: &'a ast::StmtWhile,
    loop_id: LoopId,
    body: Option<Vec<Expr>>,
}

struct ForFrame<'a> {
    ns: NamespaceId,
    stmt: &'a ast::StmtFor,
    loop_id: LoopId,
    target: Expr,
    body: Option<Vec<Expr>>,
}

struct FunctionFrame<'a> {
    ns: NamespaceId,
    def: &'a ast::StmtFunctionDef,
    fn_ns: NamespaceId,
    scope: ScopeId,
    params: LambdaParams,
}

struct ClassFrame<'a> {
    ns: NamespaceId,
    def: &'a ast::StmtClassDef,
    cls_ns: NamespaceId,
    bases: Vec<Expr>,
    keywords: Vec<Keyword>,
    metaclass: Option<Expr>,
}

/// Pending conversion work. Compound statements park here while their
/// suites lower, so statement nesting consumes heap instead of call stack.
enum Frame<'a> {
    Branch(BranchFrame<'a>),
    If(IfFrame<'a>),
    While(WhileFrame<'a>),
    For(ForFrame<'a>),
    Function(FunctionFrame<'a>),
    Class(ClassFrame<'a>),
}

fn take_suite(delivered: &mut Option<Vec<Expr>>) -> Result<Vec<Expr>, ConvertError> {
    delivered
        .take()
        .ok_or_else(|| ConvertError::internal("conversion frame resumed without its suite"))
}

struct Lowerer<'a> {
    tree: &'a ScopeTree,
    namespaces: Namespaces,
    names: NameGenerator,
    map: &'a SourceMap,
    config: &'a Config,
    loops: Vec<LoopState>,
    /// Interrupt bodies, indexed by [`InterruptId`]. Loops and functions keep
    /// appending flag assignments here until they assemble.
    interrupts: Vec<Vec<Expr>>,
    use_itertools: bool,
    use_importlib: bool,
    /// Class name of the `break`-aware iterator adapter, once needed.
    adapter_class: Option<String>,
    /// Runner lambda for the chained-call wrapper, once needed.
    runner: Option<String>,
}

/// Rewrites a resolved module into a single expression.
pub fn lower_program(
    module: &ModModule,
    tree: &mut ScopeTree,
    config: &Config,
    map: &SourceMap,
) -> Result<Expr, ConvertError> {
    let mut names = NameGenerator::new(tree.take_used_names());
    let namespaces = Namespaces::build(tree, &mut names);
    let mut lowerer = Lowerer {
        tree,
        namespaces,
        names,
        map,
        config,
        loops: vec![],
        interrupts: vec![],
        use_itertools: false,
        use_importlib: false,
        adapter_class: None,
        runner: None,
    };
    let module_ns = lowerer.namespaces.module();
    let mut body = lowerer.lower_suite(module_ns, &module.body)?;
    if lowerer.use_itertools {
        body.insert(0, import_prelude("itertools"));
    }
    if lowerer.use_importlib {
        body.insert(0, import_prelude("importlib"));
    }
    if let Some(class_name) = lowerer.adapter_class.clone() {
        body.insert(0, presets::iter_wrapper(&class_name));
    }
    let mut result = lowerer.wrap_exprs(body);
    resolve_interrupts(&mut result, &lowerer.interrupts);
    Ok(result)
}

/// `lib := __import__('lib')`
fn import_prelude(lib: &str) -> Expr {
    Expr::named(
        lib,
        Expr::call(Expr::name("__import__"), vec![Expr::str_literal(lib)]),
    )
}

/// `setattr(obj, 'attr', value)`
fn setattr_call(obj: Expr, attr: &str, value: Expr) -> Expr {
    Expr::call(
        Expr::name("setattr"),
        vec![obj, Expr::str_literal(attr), value],
    )
}

fn int_literal(value: i64) -> Expr {
    Expr::Literal(Literal::Int(value.to_string().into()))
}

/// `...` for nothing, the expression itself for one, a list display
/// otherwise.
fn list_wrapper(mut exprs: Vec<Expr>) -> Expr {
    match exprs.len() {
        0 => Expr::ellipsis(),
        1 => exprs.remove(0),
        _ => Expr::List(exprs),
    }
}

/// `target.__iop__(value) if hasattr(target, '__iop__') else fallback`
fn aug_expr(target: Expr, op: Operator, value: Expr, fallback: Expr) -> Expr {
    let dunder = op.inplace_dunder();
    Expr::if_exp(
        Expr::call(
            Expr::name("hasattr"),
            vec![target.clone(), Expr::str_literal(dunder)],
        ),
        Expr::call(Expr::attr(target, dunder), vec![value]),
        fallback,
    )
}

impl<'a> Lowerer<'a> {
    fn unsupported(
        &self,
        msg: impl Into<std::borrow::Cow<'static, str>>,
        range: TextRange,
    ) -> ConvertError {
        ConvertError::unsupported(msg, self.map.convert_range(range))
    }

    fn transform_expr(&self, ns: NamespaceId, expr: &AstExpr) -> Result<Expr, ConvertError> {
        let mut transformer = Transformer::new(self.tree, &self.namespaces, ns, self.map);
        transformer.expr(expr)
    }

    fn load_name(&self, ns: NamespaceId, name: &str) -> Result<Expr, ConvertError> {
        self.namespaces.load(self.tree, ns, name)
    }

    fn store_name(&self, ns: NamespaceId, name: &str, value: Expr) -> Result<Expr, ConvertError> {
        self.namespaces.store(self.tree, ns, name, value)
    }

    fn new_interrupt(&mut self, body: Vec<Expr>) -> InterruptId {
        let id = InterruptId(self.interrupts.len() as u32);
        self.interrupts.push(body);
        id
    }

    fn wrap_exprs(&mut self, exprs: Vec<Expr>) -> Expr {
        match self.config.expr_wrapper {
            ExprWrapper::PlainSequence => list_wrapper(exprs),
            ExprWrapper::ChainedCall => {
                if exprs.len() <= 1 {
                    return list_wrapper(exprs);
                }
                let runner = if let Some(runner) = &self.runner {
                    runner.clone()
                } else {
                    let runner = self.names.fresh(SynthName::Runner);
                    self.runner = Some(runner.clone());
                    runner
                };
                // (runner := lambda arg: runner)(e1)(e2)... evaluates every
                // argument left to right and stays callable throughout.
                let runner_lambda = Expr::named(
                    runner.clone(),
                    Expr::lambda(one_param("arg"), Expr::name(runner)),
                );
                let mut chain = runner_lambda;
                for expr in exprs {
                    chain = Expr::call(chain, vec![expr]);
                }
                chain
            }
        }
    }

    /// The interruption tracker active at this position. The innermost loop
    /// wins over the enclosing function.
    fn tracker(&self, ns: NamespaceId) -> Tracker {
        let namespace = self.namespaces.get(ns);
        if let Some(&loop_id) = namespace.loop_stack.last() {
            return Tracker::Loop(loop_id);
        }
        match &namespace.kind {
            NamespaceKind::Function(_) => Tracker::Function(ns),
            _ => Tracker::None,
        }
    }

    fn tracker_count(&self, tracker: Tracker) -> usize {
        match tracker {
            Tracker::Loop(loop_id) => self.loops[loop_id.index()].interrupt_cnt,
            Tracker::Function(ns) => match &self.namespaces.get(ns).kind {
                NamespaceKind::Function(state) => state.return_cnt,
                _ => 0,
            },
            Tracker::None => 0,
        }
    }

    /// The flag expression that tells whether the tracked interruption has
    /// fired, marking the flag as used.
    fn guard_flag(&mut self, tracker: Tracker) -> Result<Expr, ConvertError> {
        match tracker {
            Tracker::Loop(loop_id) => {
                let state = &mut self.loops[loop_id.index()];
                state.interrupt_used = true;
                Ok(Expr::name(state.interrupt_flag.clone()))
            }
            Tracker::Function(ns) => {
                let state = self.namespaces.get_mut(ns).function_state_mut()?;
                state.ret_flag_used = true;
                Ok(Expr::name(state.ret_flag_name.clone()))
            }
            Tracker::None => Err(ConvertError::internal(
                "interrupt guard requested outside any loop or function",
            )),
        }
    }

    /// Lowers a suite and everything nested inside it, driving an explicit
    /// stack of pending frames. A compound statement parks its frame on the
    /// stack while its suites lower; a finished suite is delivered to the
    /// frame below it, so nesting depth is bounded by memory alone.
    fn lower_suite<'s>(
        &mut self,
        ns: NamespaceId,
        stmts: &'s [Stmt],
    ) -> Result<Vec<Expr>, ConvertError> {
        let mut stack = vec![Frame::Branch(self.open_branch(ns, stmts))];
        let mut delivered: Option<Vec<Expr>> = None;
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Branch(mut branch) => {
                    if let Some(exprs) = delivered.take() {
                        branch.extend_segment(exprs);
                    }
                    match self.step_branch(&mut branch)? {
                        Some(stmt) => {
                            let ns = branch.ns;
                            stack.push(Frame::Branch(branch));
                            self.open_compound(&mut stack, ns, stmt)?;
                        }
                        None => delivered = Some(self.close_branch(branch)?),
                    }
                }
                Frame::If(mut frame) => {
                    let suite = take_suite(&mut delivered)?;
                    if frame.body.is_none() {
                        frame.body = Some(suite);
                    } else {
                        frame.clauses.push((frame.pending_test.take(), suite));
                    }
                    let done = frame.clauses.len();
                    if let Some(clause) = frame.stmt.elif_else_clauses.get(done) {
                        frame.pending_test = clause
                            .test
                            .as_ref()
                            .map(|test| self.transform_expr(frame.ns, test))
                            .transpose()?;
                        let branch = self.open_branch(frame.ns, &clause.body);
                        stack.push(Frame::If(frame));
                        stack.push(Frame::Branch(branch));
                    } else {
                        delivered = Some(self.finish_if(frame));
                    }
                }
                Frame::While(mut frame) => {
                    let suite = take_suite(&mut delivered)?;
                    if frame.body.is_none() {
                        self.namespaces.get_mut(frame.ns).loop_stack.pop();
                        frame.body = Some(suite);
                        let branch = self.open_branch(frame.ns, &frame.stmt.orelse);
                        stack.push(Frame::While(frame));
                        stack.push(Frame::Branch(branch));
                    } else {
                        delivered = Some(self.finish_while(frame, suite)?);
                    }
                }
                Frame::For(mut frame) => {
                    let suite = take_suite(&mut delivered)?;
                    if frame.body.is_none() {
                        self.namespaces.get_mut(frame.ns).loop_stack.pop();
                        frame.body = Some(suite);
                        let branch = self.open_branch(frame.ns, &frame.stmt.orelse);
                        stack.push(Frame::For(frame));
                        stack.push(Frame::Branch(branch));
                    } else {
                        delivered = Some(self.finish_for(frame, suite)?);
                    }
                }
                Frame::Function(frame) => {
                    let suite = take_suite(&mut delivered)?;
                    delivered = Some(self.finish_function(frame, suite)?);
                }
                Frame::Class(frame) => {
                    let suite = take_suite(&mut delivered)?;
                    delivered = Some(self.finish_class(frame, suite)?);
                }
            }
        }
        Ok(delivered.unwrap_or_default())
    }

    fn open_branch<'s>(&mut self, ns: NamespaceId, stmts: &'s [Stmt]) -> BranchFrame<'s> {
        let tracker = self.tracker(ns);
        BranchFrame {
            ns,
            stmts,
            next: 0,
            tracker,
            seen: self.tracker_count(tracker),
            segments: vec![vec![]],
            halted: false,
        }
    }

    /// Advances a suite across its leaf statements. Returns the next compound
    /// statement for the driver to open, or `None` once the suite is done.
    fn step_branch<'s>(
        &mut self,
        branch: &mut BranchFrame<'s>,
    ) -> Result<Option<&'s Stmt>, ConvertError> {
        let stmts = branch.stmts;
        while !branch.halted && branch.next < stmts.len() {
            let stmt = &stmts[branch.next];
            branch.next += 1;
            let count = self.tracker_count(branch.tracker);
            if count > branch.seen {
                branch.segments.push(vec![]);
                branch.seen = count;
            }
            match stmt {
                Stmt::If(_)
                | Stmt::While(_)
                | Stmt::For(_)
                | Stmt::FunctionDef(_)
                | Stmt::ClassDef(_) => return Ok(Some(stmt)),
                _ => {
                    let converted = self.lower_leaf(branch.ns, stmt)?;
                    branch.extend_segment(converted);
                    // Anything after an unconditional jump is unreachable.
                    if matches!(stmt, Stmt::Break(_) | Stmt::Continue(_) | Stmt::Return(_)) {
                        branch.halted = true;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Folds the guard segments, innermost last: statements after a possible
    /// interruption are fenced behind `... if flag else segment` guards so
    /// they are skipped once the interruption fires.
    fn close_branch(&mut self, branch: BranchFrame<'_>) -> Result<Vec<Expr>, ConvertError> {
        let mut segments = branch.segments;
        while segments.len() > 1 {
            let Some(segment) = segments.pop() else { break };
            let flag = self.guard_flag(branch.tracker)?;
            let wrapped = self.wrap_exprs(segment);
            let guarded = Expr::if_exp(Expr::not(flag), wrapped, Expr::ellipsis());
            if let Some(outer) = segments.last_mut() {
                outer.push(guarded);
            }
        }
        Ok(segments.pop().unwrap_or_default())
    }

    fn lower_leaf(&mut self, ns: NamespaceId, stmt: &Stmt) -> Result<Vec<Expr>, ConvertError> {
        match stmt {
            Stmt::Pass(_) | Stmt::Global(_) | Stmt::Nonlocal(_) => Ok(vec![]),
            Stmt::Expr(expr_stmt) => Ok(vec![self.transform_expr(ns, &expr_stmt.value)?]),
            Stmt::Break(break_stmt) => self.lower_break(ns, break_stmt.range),
            Stmt::Continue(continue_stmt) => self.lower_continue(ns, continue_stmt.range),
            Stmt::Return(return_stmt) => self.lower_return(ns, return_stmt),
            Stmt::Import(import) => self.lower_import(ns, import),
            Stmt::ImportFrom(import) => self.lower_import_from(ns, import),
            Stmt::Assign(assign) => self.lower_assign(ns, assign),
            Stmt::AnnAssign(ann) => self.lower_ann_assign(ns, ann),
            Stmt::AugAssign(aug) => self.lower_aug_assign(ns, aug),
            // Scope resolution already rejected everything else.
            other => Err(ConvertError::internal(format!(
                "statement at byte {} survived scope resolution unhandled",
                u32::from(other.range().start()),
            ))),
        }
    }

    fn open_loop(&mut self, ns: NamespaceId, kind: LoopKind) -> LoopId {
        let interrupt_flag = self.names.fresh(SynthName::InterruptFlag);
        let loop_id = LoopId(self.loops.len() as u32);
        self.loops.push(LoopState {
            kind,
            interrupt_flag,
            interrupt_used: false,
            interrupt_cnt: 0,
            break_cnt: 0,
            interrupt_bodies: vec![],
        });
        self.namespaces.get_mut(ns).loop_stack.push(loop_id);
        loop_id
    }

    /// Pushes the frame for one compound statement plus the branch frame of
    /// its first suite, after the work that must precede the suite: loop
    /// bookkeeping, and subexpressions that evaluate in the defining scope.
    fn open_compound<'s>(
        &mut self,
        stack: &mut Vec<Frame<'s>>,
        ns: NamespaceId,
        stmt: &'s Stmt,
    ) -> Result<(), ConvertError> {
        match stmt {
            Stmt::If(if_stmt) => {
                let test = self.transform_expr(ns, &if_stmt.test)?;
                let branch = self.open_branch(ns, &if_stmt.body);
                stack.push(Frame::If(IfFrame {
                    ns,
                    stmt: if_stmt,
                    test,
                    body: None,
                    pending_test: None,
                    clauses: vec![],
                }));
                stack.push(Frame::Branch(branch));
            }
            Stmt::While(while_stmt) => {
                let break_flag = self.names.fresh(SynthName::BreakFlag);
                let loop_id = self.open_loop(ns, LoopKind::While { break_flag });
                self.use_itertools = true;
                let branch = self.open_branch(ns, &while_stmt.body);
                stack.push(Frame::While(WhileFrame {
                    ns,
                    stmt: while_stmt,
                    loop_id,
                    body: None,
                }));
                stack.push(Frame::Branch(branch));
            }
            Stmt::For(for_stmt) => {
                let adapter = self.names.fresh(SynthName::Iterator);
                let loop_id = self.open_loop(ns, LoopKind::For { adapter });
                let target = {
                    let mut transformer =
                        Transformer::new(self.tree, &self.namespaces, ns, self.map);
                    transformer.comp_target(&for_stmt.target)?
                };
                let branch = self.open_branch(ns, &for_stmt.body);
                stack.push(Frame::For(ForFrame {
                    ns,
                    stmt: for_stmt,
                    loop_id,
                    target,
                    body: None,
                }));
                stack.push(Frame::Branch(branch));
            }
            Stmt::FunctionDef(def) => {
                let scope = self.tree.scope_for_node(def.range)?;
                let fn_ns = self
                    .namespaces
                    .for_scope(scope)
                    .ok_or_else(|| ConvertError::internal("function scope has no namespace"))?;
                // Defaults and decorators evaluate in the defining scope.
                let params = {
                    let mut transformer =
                        Transformer::new(self.tree, &self.namespaces, ns, self.map);
                    transformer.lambda_params(&def.parameters)?
                };
                let branch = self.open_branch(fn_ns, &def.body);
                stack.push(Frame::Function(FunctionFrame {
                    ns,
                    def,
                    fn_ns,
                    scope,
                    params,
                }));
                stack.push(Frame::Branch(branch));
            }
            Stmt::ClassDef(def) => {
                let scope = self.tree.scope_for_node(def.range)?;
                let cls_ns = self
                    .namespaces
                    .for_scope(scope)
                    .ok_or_else(|| ConvertError::internal("class scope has no namespace"))?;
                let mut bases = vec![];
                let mut keywords = vec![];
                let mut metaclass = None;
                if let Some(arguments) = &def.arguments {
                    for base in &arguments.args {
                        bases.push(self.transform_expr(ns, base)?);
                    }
                    for keyword in &arguments.keywords {
                        let value = self.transform_expr(ns, &keyword.value)?;
                        match &keyword.arg {
                            Some(arg) if arg.id.as_str() == "metaclass" => metaclass = Some(value),
                            arg => keywords.push(Keyword {
                                arg: arg.as_ref().map(|identifier| identifier.id.to_string()),
                                value,
                            }),
                        }
                    }
                }
                let branch = self.open_branch(cls_ns, &def.body);
                stack.push(Frame::Class(ClassFrame {
                    ns,
                    def,
                    cls_ns,
                    bases,
                    keywords,
                    metaclass,
                }));
                stack.push(Frame::Branch(branch));
            }
            other => {
                return Err(ConvertError::internal(format!(
                    "statement at byte {} is not a compound statement",
                    u32::from(other.range().start()),
                )));
            }
        }
        Ok(())
    }

    fn make_if(&mut self, test: Expr, body: Vec<Expr>, orelse: Vec<Expr>) -> Expr {
        match self.config.if_style {
            IfStyle::ConditionalExpr => {
                let body = self.wrap_exprs(body);
                let orelse = self.wrap_exprs(orelse);
                Expr::if_exp(test, body, orelse)
            }
            IfStyle::ShortCircuit => {
                let body = self.wrap_exprs(body);
                if orelse.is_empty() {
                    return Expr::BoolOp {
                        op: BoolOperator::And,
                        values: vec![test, body],
                    };
                }
                let orelse = self.wrap_exprs(orelse);
                // `body or 1` keeps the chain truthy even when the body
                // evaluates to a falsy value.
                let taken = Expr::BoolOp {
                    op: BoolOperator::And,
                    values: vec![
                        test,
                        Expr::BoolOp {
                            op: BoolOperator::Or,
                            values: vec![body, int_literal(1)],
                        },
                    ],
                };
                Expr::BoolOp {
                    op: BoolOperator::Or,
                    values: vec![taken, orelse],
                }
            }
        }
    }

    /// Clauses lowered in source order so synthesized names number the way
    /// the source reads; the chain itself folds from the back.
    fn finish_if(&mut self, frame: IfFrame<'_>) -> Vec<Expr> {
        let body = frame.body.unwrap_or_default();
        let mut orelse: Vec<Expr> = vec![];
        for (clause_test, clause_body) in frame.clauses.into_iter().rev() {
            orelse = match clause_test {
                Some(test) => vec![self.make_if(test, clause_body, orelse)],
                None => clause_body,
            };
        }
        vec![self.make_if(frame.test, body, orelse)]
    }

    fn finish_while(
        &mut self,
        frame: WhileFrame<'_>,
        orelse: Vec<Expr>,
    ) -> Result<Vec<Expr>, ConvertError> {
        let WhileFrame {
            ns,
            stmt,
            loop_id,
            body,
        } = frame;
        let mut body = body.unwrap_or_default();
        let state = &self.loops[loop_id.index()];
        let break_cnt = state.break_cnt;
        let interrupt_used = state.interrupt_used;
        let interrupt_flag = state.interrupt_flag.clone();
        let interrupt_bodies = state.interrupt_bodies.clone();
        let LoopKind::While { break_flag } = &state.kind else {
            return Err(ConvertError::internal("while loop state changed kind"));
        };
        let break_flag = break_flag.clone();

        let mut out = vec![];
        if break_cnt > 0 {
            out.push(Expr::named(break_flag.clone(), Expr::bool_literal(false)));
        }
        if interrupt_used {
            body.insert(
                0,
                Expr::named(interrupt_flag.clone(), Expr::bool_literal(false)),
            );
            for id in interrupt_bodies {
                self.interrupts[id.0 as usize]
                    .push(Expr::named(interrupt_flag.clone(), Expr::bool_literal(true)));
            }
        }
        let mut test = self.transform_expr(ns, &stmt.test)?;
        if break_cnt > 0 {
            test = Expr::BoolOp {
                op: BoolOperator::And,
                values: vec![Expr::not(Expr::name(break_flag.clone())), test],
            };
        }
        let elt = self.wrap_exprs(body);
        out.push(Expr::ListComp {
            elt: Box::new(elt),
            generators: vec![Comprehension {
                target: Expr::name("_"),
                iter: takewhile(test),
                ifs: vec![],
                is_async: false,
            }],
        });
        if !orelse.is_empty() {
            let wrapped = self.wrap_exprs(orelse);
            out.push(if break_cnt > 0 {
                Expr::if_exp(
                    Expr::not(Expr::name(break_flag)),
                    wrapped,
                    Expr::ellipsis(),
                )
            } else {
                wrapped
            });
        }
        Ok(out)
    }

    fn finish_for(
        &mut self,
        frame: ForFrame<'_>,
        orelse: Vec<Expr>,
    ) -> Result<Vec<Expr>, ConvertError> {
        let ForFrame {
            ns,
            stmt,
            loop_id,
            target,
            body,
        } = frame;
        let mut body = body.unwrap_or_default();
        let state = &self.loops[loop_id.index()];
        let break_cnt = state.break_cnt;
        let interrupt_cnt = state.interrupt_cnt;
        let interrupt_used = state.interrupt_used;
        let interrupt_flag = state.interrupt_flag.clone();
        let interrupt_bodies = state.interrupt_bodies.clone();
        let LoopKind::For { adapter } = &state.kind else {
            return Err(ConvertError::internal("for loop state changed kind"));
        };
        let adapter = adapter.clone();

        let iter = self.transform_expr(ns, &stmt.iter)?;
        if interrupt_cnt == 0 && orelse.is_empty() {
            let elt = self.wrap_exprs(body);
            return Ok(vec![Expr::ListComp {
                elt: Box::new(elt),
                generators: vec![Comprehension {
                    target,
                    iter,
                    ifs: vec![],
                    is_async: false,
                }],
            }]);
        }

        if interrupt_used {
            body.insert(
                0,
                Expr::named(interrupt_flag.clone(), Expr::bool_literal(false)),
            );
            for id in interrupt_bodies {
                self.interrupts[id.0 as usize]
                    .push(Expr::named(interrupt_flag.clone(), Expr::bool_literal(true)));
            }
        }
        let mut out = vec![];
        let comp_iter = if break_cnt > 0 {
            // `break` cannot stop the comprehension itself, so the iterator
            // goes through an adapter whose `_break` attribute makes every
            // later `__next__` raise StopIteration.
            let class_name = if let Some(class_name) = &self.adapter_class {
                class_name.clone()
            } else {
                let class_name = self.names.fresh(SynthName::IterAdapter);
                self.adapter_class = Some(class_name.clone());
                class_name
            };
            out.push(Expr::named(
                adapter.clone(),
                Expr::call(Expr::name(class_name), vec![iter]),
            ));
            Expr::name(adapter.clone())
        } else {
            iter
        };
        let elt = self.wrap_exprs(body);
        out.push(Expr::ListComp {
            elt: Box::new(elt),
            generators: vec![Comprehension {
                target,
                iter: comp_iter,
                ifs: vec![],
                is_async: false,
            }],
        });
        if !orelse.is_empty() {
            let wrapped = self.wrap_exprs(orelse);
            out.push(if break_cnt > 0 {
                Expr::if_exp(
                    Expr::not(Expr::attr(Expr::name(adapter), "_break")),
                    wrapped,
                    Expr::ellipsis(),
                )
            } else {
                wrapped
            });
        }
        Ok(out)
    }

    fn lower_break(&mut self, ns: NamespaceId, range: TextRange) -> Result<Vec<Expr>, ConvertError> {
        let Some(&loop_id) = self.namespaces.get(ns).loop_stack.last() else {
            return Err(ConvertError::scope(
                "'break' is not inside a loop",
                self.map.convert_range(range),
            ));
        };
        let state = &mut self.loops[loop_id.index()];
        state.break_cnt += 1;
        state.interrupt_cnt += 1;
        let body = vec![match &state.kind {
            LoopKind::While { break_flag } => {
                Expr::named(break_flag.clone(), Expr::bool_literal(true))
            }
            LoopKind::For { adapter } => {
                setattr_call(Expr::name(adapter.clone()), "_break", Expr::bool_literal(true))
            }
        }];
        let id = self.new_interrupt(body);
        self.loops[loop_id.index()].interrupt_bodies.push(id);
        Ok(vec![Expr::Interrupt(id)])
    }

    fn lower_continue(
        &mut self,
        ns: NamespaceId,
        range: TextRange,
    ) -> Result<Vec<Expr>, ConvertError> {
        let Some(&loop_id) = self.namespaces.get(ns).loop_stack.last() else {
            return Err(ConvertError::scope(
                "'continue' is not inside a loop",
                self.map.convert_range(range),
            ));
        };
        self.loops[loop_id.index()].interrupt_cnt += 1;
        let id = self.new_interrupt(vec![]);
        self.loops[loop_id.index()].interrupt_bodies.push(id);
        Ok(vec![Expr::Interrupt(id)])
    }

    fn lower_return(
        &mut self,
        ns: NamespaceId,
        stmt: &ast::StmtReturn,
    ) -> Result<Vec<Expr>, ConvertError> {
        let namespace = self.namespaces.get(ns);
        if !matches!(namespace.kind, NamespaceKind::Function(_)) {
            return Err(ConvertError::scope(
                "'return' outside function",
                self.map.convert_range(stmt.range),
            ));
        }
        let loop_ids = namespace.loop_stack.clone();
        let retv_name = {
            let state = self.namespaces.get_mut(ns).function_state_mut()?;
            state.return_cnt += 1;
            state.retv_name.clone()
        };
        // A return also terminates every loop it sits inside.
        for &loop_id in &loop_ids {
            let state = &mut self.loops[loop_id.index()];
            state.break_cnt += 1;
            state.interrupt_cnt += 1;
        }
        let mut body = vec![];
        if let Some(value) = &stmt.value {
            let value = self.transform_expr(ns, value)?;
            body.push(Expr::named(retv_name, value));
        }
        for &loop_id in &loop_ids {
            body.push(match &self.loops[loop_id.index()].kind {
                LoopKind::While { break_flag } => {
                    Expr::named(break_flag.clone(), Expr::bool_literal(true))
                }
                LoopKind::For { adapter } => {
                    setattr_call(Expr::name(adapter.clone()), "_break", Expr::bool_literal(true))
                }
            });
        }
        let id = self.new_interrupt(body);
        for &loop_id in &loop_ids {
            self.loops[loop_id.index()].interrupt_bodies.push(id);
        }
        self.namespaces
            .get_mut(ns)
            .function_state_mut()?
            .return_bodies
            .push(id);
        Ok(vec![Expr::Interrupt(id)])
    }

    fn finish_function(
        &mut self,
        frame: FunctionFrame<'_>,
        converted: Vec<Expr>,
    ) -> Result<Vec<Expr>, ConvertError> {
        let FunctionFrame {
            ns,
            def,
            fn_ns,
            scope,
            params,
        } = frame;
        let needs_box = self.tree.scope(scope).needs_box();
        let (retv_name, ret_flag_name, ret_flag_used, return_bodies, box_name, boxed_params, is_method, uses_class_cell) = {
            let state = self.namespaces.get(fn_ns).function_state()?;
            (
                state.retv_name.clone(),
                state.ret_flag_name.clone(),
                state.ret_flag_used,
                state.return_bodies.clone(),
                state.box_name.clone(),
                state.boxed_params.clone(),
                state.is_method,
                state.uses_class_cell,
            )
        };

        let mut body = vec![Expr::named(retv_name.clone(), Expr::none())];
        if uses_class_cell {
            // Reading the enclosing loader's `__class__` binding here turns
            // it into a closure variable of the lambda.
            body.push(Expr::name("__class__"));
        }
        if ret_flag_used {
            body.push(Expr::named(ret_flag_name.clone(), Expr::bool_literal(false)));
            for id in return_bodies {
                self.interrupts[id.0 as usize]
                    .push(Expr::named(ret_flag_name.clone(), Expr::bool_literal(true)));
            }
        }
        if needs_box {
            let keys = boxed_params
                .iter()
                .map(|param| Some(Expr::str_literal(param.as_str())))
                .collect();
            let values = boxed_params.iter().map(Expr::name).collect();
            body.push(Expr::named(box_name, Expr::Dict { keys, values }));
        }
        match self.config.expr_wrapper {
            ExprWrapper::PlainSequence => body.extend(converted),
            ExprWrapper::ChainedCall => {
                let wrapped = self.wrap_exprs(converted);
                body.push(wrapped);
            }
        }
        body.push(Expr::name(retv_name));

        let mut func = Expr::lambda(params, Expr::last_item(Expr::List(body)));
        for decorator in def.decorator_list.iter().rev() {
            let decorator = self.transform_expr(ns, &decorator.expression)?;
            func = Expr::call(decorator, vec![func]);
        }
        // Implicit classmethod; the class statement would have applied it.
        if is_method && def.name.id.as_str() == "__init_subclass__" {
            func = Expr::call(Expr::name("classmethod"), vec![func]);
        }
        Ok(vec![self.store_name(ns, def.name.id.as_str(), func)?])
    }

    fn finish_class(
        &mut self,
        frame: ClassFrame<'_>,
        converted: Vec<Expr>,
    ) -> Result<Vec<Expr>, ConvertError> {
        let ClassFrame {
            ns,
            def,
            cls_ns,
            bases,
            keywords,
            metaclass,
        } = frame;
        let member_dict = match &self.namespaces.get(cls_ns).kind {
            NamespaceKind::Class { member_dict_name } => member_dict_name.clone(),
            _ => return Err(ConvertError::internal("class scope with non-class namespace")),
        };

        let name = def.name.id.as_str();
        let metaclass = metaclass.unwrap_or_else(|| Expr::name("type"));
        let mut out = vec![];
        // The empty class object exists first so methods can close over it.
        out.push(self.store_name(
            ns,
            name,
            Expr::Call {
                func: Box::new(metaclass),
                args: vec![
                    Expr::str_literal(name),
                    Expr::Tuple(bases),
                    Expr::Dict {
                        keys: vec![],
                        values: vec![],
                    },
                ],
                keywords,
            },
        )?);

        let loader = self.names.fresh(SynthName::ClassLoader);
        let mut class_body = vec![
            Expr::named("__class__", self.load_name(ns, name)?),
            Expr::named(
                member_dict.clone(),
                Expr::Dict {
                    keys: vec![],
                    values: vec![],
                },
            ),
        ];
        class_body.extend(converted);
        class_body.push(Expr::name(member_dict));
        out.push(Expr::named(
            loader.clone(),
            Expr::lambda(
                LambdaParams::default(),
                Expr::last_item(Expr::List(class_body)),
            ),
        ));
        // Copy the collected member dict onto the class object.
        out.push(Expr::ListComp {
            elt: Box::new(Expr::call(
                Expr::name("setattr"),
                vec![self.load_name(ns, name)?, Expr::name("k"), Expr::name("v")],
            )),
            generators: vec![Comprehension {
                target: Expr::Tuple(vec![Expr::name("k"), Expr::name("v")]),
                iter: Expr::call(
                    Expr::attr(Expr::call(Expr::name(loader), vec![]), "items"),
                    vec![],
                ),
                ifs: vec![],
                is_async: false,
            }],
        });
        for decorator in def.decorator_list.iter().rev() {
            let decorator = self.transform_expr(ns, &decorator.expression)?;
            let decorated = Expr::call(decorator, vec![self.load_name(ns, name)?]);
            out.push(self.store_name(ns, name, decorated)?);
        }
        Ok(out)
    }

    fn lower_import(
        &mut self,
        ns: NamespaceId,
        import: &ast::StmtImport,
    ) -> Result<Vec<Expr>, ConvertError> {
        self.use_importlib = true;
        let mut out = vec![];
        for alias in &import.names {
            let full = alias.name.id.as_str();
            let import_call = import_module(full);
            match &alias.asname {
                Some(asname) => out.push(self.store_name(ns, asname.id.as_str(), import_call)?),
                None => match full.split_once('.') {
                    // `import a.b` loads the submodule but binds only `a`.
                    Some((top, _)) => {
                        out.push(import_call);
                        out.push(self.store_name(ns, top, import_module(top))?);
                    }
                    None => out.push(self.store_name(ns, full, import_call)?),
                },
            }
        }
        Ok(out)
    }

    fn lower_import_from(
        &mut self,
        ns: NamespaceId,
        import: &ast::StmtImportFrom,
    ) -> Result<Vec<Expr>, ConvertError> {
        let module = import.module.as_ref().map_or("", |module| module.id.as_str());
        let mut from_list = vec![];
        for alias in &import.names {
            if alias.name.id.as_str() == "*" {
                return Err(self.unsupported(
                    "'from ... import *' is not convertible",
                    alias.range,
                ));
            }
            from_list.push(Expr::str_literal(alias.name.id.as_str()));
        }
        let tmp = self.names.fresh(SynthName::ImportTmp);
        let mut out = vec![Expr::named(
            tmp.clone(),
            Expr::call(
                Expr::name("__import__"),
                vec![
                    Expr::str_literal(module),
                    Expr::call(Expr::name("globals"), vec![]),
                    Expr::call(Expr::name("locals"), vec![]),
                    Expr::List(from_list),
                    int_literal(i64::from(import.level)),
                ],
            ),
        )];
        for alias in &import.names {
            let bound = match &alias.asname {
                Some(asname) => asname.id.as_str(),
                None => alias.name.id.as_str(),
            };
            let value = Expr::attr(Expr::name(tmp.clone()), alias.name.id.as_str());
            out.push(self.store_name(ns, bound, value)?);
        }
        Ok(out)
    }

    /// Index expression usable as a plain call argument. Slice syntax only
    /// parses inside brackets, so slices become `slice(...)` calls.
    fn subscript_index(&self, ns: NamespaceId, index: &AstExpr) -> Result<Expr, ConvertError> {
        if let AstExpr::Slice(slice) = index {
            let part = |expr: &Option<Box<AstExpr>>| -> Result<Expr, ConvertError> {
                match expr {
                    Some(expr) => self.transform_expr(ns, expr),
                    None => Ok(Expr::none()),
                }
            };
            return Ok(Expr::call(
                Expr::name("slice"),
                vec![part(&slice.lower)?, part(&slice.upper)?, part(&slice.step)?],
            ));
        }
        self.transform_expr(ns, index)
    }

    /// Emits the expressions that bind `value` to one assignment target,
    /// recursing through tuple and list destructuring.
    fn assign_auto(
        &mut self,
        ns: NamespaceId,
        target: &AstExpr,
        value: Expr,
        out: &mut Vec<Expr>,
    ) -> Result<(), ConvertError> {
        match target {
            AstExpr::Name(name) => {
                let stored = self.store_name(ns, name.id.as_str(), value)?;
                out.push(stored);
            }
            AstExpr::Attribute(attribute) => {
                let obj = self.transform_expr(ns, &attribute.value)?;
                out.push(setattr_call(obj, attribute.attr.id.as_str(), value));
            }
            AstExpr::Subscript(subscript) => {
                let obj = self.transform_expr(ns, &subscript.value)?;
                let index = self.subscript_index(ns, &subscript.slice)?;
                out.push(Expr::setitem(obj, index, value));
            }
            AstExpr::Tuple(ast::ExprTuple { elts, .. })
            | AstExpr::List(ast::ExprList { elts, .. }) => {
                let len = elts.len() as i64;
                let mut star_seen = false;
                for (position, element) in elts.iter().enumerate() {
                    let position = position as i64;
                    if let AstExpr::Starred(starred) = element {
                        if star_seen {
                            return Err(ConvertError::scope(
                                "multiple starred expressions in assignment",
                                self.map.convert_range(starred.range),
                            ));
                        }
                        star_seen = true;
                        let upper = position - len + 1;
                        let slice = Expr::Slice {
                            lower: Some(Box::new(int_literal(position))),
                            upper: (upper != 0).then(|| Box::new(int_literal(upper))),
                            step: None,
                        };
                        let piece = Expr::call(
                            Expr::name("list"),
                            vec![Expr::subscript(value.clone(), slice)],
                        );
                        self.assign_auto(ns, &starred.value, piece, out)?;
                    } else {
                        let index = if star_seen { position - len } else { position };
                        let piece = Expr::subscript(value.clone(), int_literal(index));
                        self.assign_auto(ns, element, piece, out)?;
                    }
                }
            }
            AstExpr::Starred(starred) => {
                return Err(ConvertError::scope(
                    "starred assignment target must be in a list or tuple",
                    self.map.convert_range(starred.range),
                ));
            }
            other => {
                return Err(self.unsupported(
                    "this assignment target form is not convertible",
                    other.range(),
                ));
            }
        }
        Ok(())
    }

    fn lower_assign(
        &mut self,
        ns: NamespaceId,
        assign: &ast::StmtAssign,
    ) -> Result<Vec<Expr>, ConvertError> {
        let value = self.transform_expr(ns, &assign.value)?;
        let mut out = vec![];
        match assign.targets.as_slice() {
            [target] if !matches!(target, AstExpr::Tuple(_) | AstExpr::List(_)) => {
                self.assign_auto(ns, target, value, &mut out)?;
            }
            targets => {
                // Destructuring reads the value more than once, so it goes
                // through a temporary first.
                let tmp = self.names.fresh(SynthName::AssignTmp);
                out.push(Expr::named(tmp.clone(), value));
                for target in targets {
                    self.assign_auto(ns, target, Expr::name(tmp.clone()), &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn lower_ann_assign(
        &mut self,
        ns: NamespaceId,
        ann: &ast::StmtAnnAssign,
    ) -> Result<Vec<Expr>, ConvertError> {
        let Some(value) = &ann.value else {
            // A bare annotation has no runtime effect.
            return Ok(vec![]);
        };
        let value = self.transform_expr(ns, value)?;
        let mut out = vec![];
        self.assign_auto(ns, &ann.target, value, &mut out)?;
        Ok(out)
    }

    fn lower_aug_assign(
        &mut self,
        ns: NamespaceId,
        aug: &ast::StmtAugAssign,
    ) -> Result<Vec<Expr>, ConvertError> {
        let op = convert_operator(aug.op);
        let value = self.transform_expr(ns, &aug.value)?;
        let tmp_target = self.names.fresh(SynthName::AugTmp);
        match aug.target.as_ref() {
            AstExpr::Name(name) => {
                let load = self.load_name(ns, name.id.as_str())?;
                let fallback = self.store_name(
                    ns,
                    name.id.as_str(),
                    Expr::BinOp {
                        left: Box::new(load.clone()),
                        op,
                        right: Box::new(value.clone()),
                    },
                )?;
                Ok(vec![aug_expr(load, op, value, fallback)])
            }
            AstExpr::Subscript(subscript) => {
                let parent = self.transform_expr(ns, &subscript.value)?;
                let tmp_slice = self.names.fresh(SynthName::AugSliceTmp);
                let index = self.subscript_index(ns, &subscript.slice)?;
                let fallback = Expr::named(
                    tmp_target.clone(),
                    Expr::BinOp {
                        left: Box::new(Expr::name(tmp_target.clone())),
                        op,
                        right: Box::new(value.clone()),
                    },
                );
                Ok(vec![
                    Expr::named(tmp_slice.clone(), index),
                    Expr::named(
                        tmp_target.clone(),
                        Expr::subscript(parent.clone(), Expr::name(tmp_slice.clone())),
                    ),
                    Expr::setitem(
                        parent,
                        Expr::name(tmp_slice),
                        aug_expr(Expr::name(tmp_target), op, value, fallback),
                    ),
                ])
            }
            AstExpr::Attribute(attribute) => {
                let parent = self.transform_expr(ns, &attribute.value)?;
                let attr = attribute.attr.id.as_str();
                let fallback = Expr::named(
                    tmp_target.clone(),
                    Expr::BinOp {
                        left: Box::new(Expr::name(tmp_target.clone())),
                        op,
                        right: Box::new(value.clone()),
                    },
                );
                Ok(vec![
                    Expr::named(tmp_target.clone(), Expr::attr(parent.clone(), attr)),
                    setattr_call(
                        parent,
                        attr,
                        aug_expr(Expr::name(tmp_target), op, value, fallback),
                    ),
                ])
            }
            other => Err(self.unsupported(
                "this assignment target form is not convertible",
                other.range(),
            )),
        }
    }
}

/// `itertools.takewhile(lambda _: test, itertools.count())`
fn takewhile(test: Expr) -> Expr {
    Expr::call(
        Expr::attr(Expr::name("itertools"), "takewhile"),
        vec![
            Expr::lambda(one_param("_"), test),
            Expr::call(Expr::attr(Expr::name("itertools"), "count"), vec![]),
        ],
    )
}

fn one_param(name: &str) -> LambdaParams {
    LambdaParams {
        args: vec![Param::plain(name)],
        ..Default::default()
    }
}

/// Replaces every [`Expr::Interrupt`] placeholder with the finalized body
/// from the arena, as a list display. Worklist walk, since the tree can be
/// as deep as the program was nested.
fn resolve_interrupts(root: &mut Expr, arena: &[Vec<Expr>]) {
    let mut stack: Vec<&mut Expr> = vec![root];
    while let Some(expr) = stack.pop() {
        if let Expr::Interrupt(id) = expr {
            let body = arena[id.0 as usize].clone();
            *expr = Expr::List(body);
            continue;
        }
        match expr {
            Expr::Literal(_) | Expr::Name(_) | Expr::Interrupt(_) => {}
            Expr::Tuple(elts) | Expr::List(elts) | Expr::Set(elts) => {
                stack.extend(elts.iter_mut());
            }
            Expr::Dict { keys, values } => {
                stack.extend(keys.iter_mut().flatten());
                stack.extend(values.iter_mut());
            }
            Expr::Starred(value)
            | Expr::Attribute { value, .. }
            | Expr::YieldFrom(value)
            | Expr::Await(value) => stack.push(value),
            Expr::Subscript { value, index } => {
                stack.push(value);
                stack.push(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    stack.push(part);
                }
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                stack.push(func);
                stack.extend(args.iter_mut());
                stack.extend(keywords.iter_mut().map(|keyword| &mut keyword.value));
            }
            Expr::BinOp { left, right, .. } => {
                stack.push(left);
                stack.push(right);
            }
            Expr::BoolOp { values, .. } => stack.extend(values.iter_mut()),
            Expr::UnaryOp { operand, .. } => stack.push(operand),
            Expr::Compare {
                left, comparators, ..
            } => {
                stack.push(left);
                stack.extend(comparators.iter_mut());
            }
            Expr::IfExp { test, body, orelse } => {
                stack.push(test);
                stack.push(body);
                stack.push(orelse);
            }
            Expr::Named { value, .. } => stack.push(value),
            Expr::Lambda { params, body } => {
                for param in params
                    .posonly
                    .iter_mut()
                    .chain(&mut params.args)
                    .chain(&mut params.kwonly)
                {
                    if let Some(default) = &mut param.default {
                        stack.push(default);
                    }
                }
                stack.push(body);
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::Generator { elt, generators } => {
                stack.push(elt);
                push_generator_exprs(generators, &mut stack);
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                stack.push(key);
                stack.push(value);
                push_generator_exprs(generators, &mut stack);
            }
            Expr::FString(parts) => push_fstring_exprs(parts, &mut stack),
            Expr::Yield(value) => {
                if let Some(value) = value {
                    stack.push(value);
                }
            }
        }
    }
}

fn push_generator_exprs<'a>(generators: &'a mut [Comprehension], stack: &mut Vec<&'a mut Expr>) {
    for generator in generators {
        stack.push(&mut generator.target);
        stack.push(&mut generator.iter);
        stack.extend(generator.ifs.iter_mut());
    }
}

fn push_fstring_exprs<'a>(parts: &'a mut [FStringPart], stack: &mut Vec<&'a mut Expr>) {
    for part in parts {
        if let FStringPart::Interpolation {
            value, format_spec, ..
        } = part
        {
            stack.push(value);
            if let Some(spec) = format_spec {
                push_fstring_exprs(spec, stack);
            }
        }
    }
}

/// `importlib.import_module('name')`
fn import_module(name: &str) -> Expr {
    Expr::call(
        Expr::attr(Expr::name("importlib"), "import_module"),
        vec![Expr::str_literal(name)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse, scope};
    use pretty_assertions::assert_eq;

    fn lower_source(code: &str) -> Result<Expr, ConvertError> {
        lower_with(code, &Config::default())
    }

    fn lower_with(code: &str, config: &Config) -> Result<Expr, ConvertError> {
        let map = parse::SourceMap::new(code);
        let module = parse::parse_program(code, &map)?;
        let mut tree = scope::resolve_program(&module, &map)?;
        lower_program(&module, &mut tree, config, &map)
    }

    #[test]
    fn empty_module_becomes_ellipsis() {
        assert_eq!(lower_source("pass").ok(), Some(Expr::ellipsis()));
    }

    #[test]
    fn simple_assignment_becomes_named_expression() {
        assert_eq!(
            lower_source("a = 1").ok(),
            Some(Expr::named("a", int_literal(1))),
        );
    }

    #[test]
    fn module_statements_collect_into_a_list() {
        let config = Config {
            expr_wrapper: ExprWrapper::PlainSequence,
            ..Config::default()
        };
        assert_eq!(
            lower_with("a = 1\nb = 2", &config).ok(),
            Some(Expr::List(vec![
                Expr::named("a", int_literal(1)),
                Expr::named("b", int_literal(2)),
            ])),
        );
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let err = match lower_source("break") {
            Err(err) => err,
            Ok(expr) => panic!("lowered to {expr:?}"),
        };
        assert_eq!(err.message(), "'break' is not inside a loop");
    }

    #[test]
    fn return_outside_function_is_rejected() {
        let err = match lower_source("return 1") {
            Err(err) => err,
            Ok(expr) => panic!("lowered to {expr:?}"),
        };
        assert_eq!(err.message(), "'return' outside function");
    }

    #[test]
    fn loop_free_for_uses_a_plain_comprehension() {
        let lowered = lower_source("for x in xs:\n    f(x)");
        let expected = Expr::ListComp {
            elt: Box::new(Expr::call(Expr::name("f"), vec![Expr::name("x")])),
            generators: vec![Comprehension {
                target: Expr::name("x"),
                iter: Expr::name("xs"),
                ifs: vec![],
                is_async: false,
            }],
        };
        assert_eq!(lowered.ok(), Some(expected));
    }

    #[test]
    fn bare_annotation_vanishes() {
        assert_eq!(lower_source("x: int").ok(), Some(Expr::ellipsis()));
    }
}
