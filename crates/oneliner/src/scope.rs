//! Lexical scope resolution.
//!
//! Walks the syntax tree once, producing an arena of scopes with per-name
//! binding-kind classification and cross-scope capture edges. The tree is
//! read-only input to the lowering engine afterward.

use std::ops::{BitOr, BitOrAssign};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use ruff_python_ast::{
    self as ast, Expr as AstExpr, ExprContext, ExprLambda, InterpolatedStringElement, ModModule, Stmt,
    StmtClassDef, StmtFunctionDef,
};
use ruff_text_size::{Ranged, TextRange};

use crate::{
    error::ConvertError,
    parse::SourceMap,
};

/// How a name is bound or used within one scope.
///
/// At the end of analysis every name has exactly one kind; `NONLOCAL_SRC`
/// is a flag layered on top of `LOCAL`/`PARAMETER` when a descendant scope
/// captures and may rebind the name.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolFlags(u16);

impl SymbolFlags {
    pub const REFERENCED_GLOBAL: Self = Self(1);
    pub const LOCAL: Self = Self(1 << 1);
    pub const GLOBAL: Self = Self(1 << 2);
    pub const NONLOCAL_SRC: Self = Self(1 << 3);
    pub const NONLOCAL_DST: Self = Self(1 << 4);
    pub const FREE: Self = Self(1 << 5);
    pub const PARAMETER: Self = Self(1 << 6);
    pub const COMPREHENSION_TARGET: Self = Self(1 << 7);
    pub const COMPREHENSION_REFERENCE: Self = Self(1 << 8);
    pub const COMPREHENSION_ASSIGNMENT: Self = Self(1 << 9);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SymbolFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SymbolFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for SymbolFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(SymbolFlags, &str); 10] = [
            (SymbolFlags::REFERENCED_GLOBAL, "REFERENCED_GLOBAL"),
            (SymbolFlags::LOCAL, "LOCAL"),
            (SymbolFlags::GLOBAL, "GLOBAL"),
            (SymbolFlags::NONLOCAL_SRC, "NONLOCAL_SRC"),
            (SymbolFlags::NONLOCAL_DST, "NONLOCAL_DST"),
            (SymbolFlags::FREE, "FREE"),
            (SymbolFlags::PARAMETER, "PARAMETER"),
            (SymbolFlags::COMPREHENSION_TARGET, "COMPREHENSION_TARGET"),
            (SymbolFlags::COMPREHENSION_REFERENCE, "COMPREHENSION_REFERENCE"),
            (SymbolFlags::COMPREHENSION_ASSIGNMENT, "COMPREHENSION_ASSIGNMENT"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "(empty)")?;
        }
        Ok(())
    }
}

/// Arena handle for a [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Class,
    Lambda,
    Comprehension,
}

impl ScopeKind {
    /// Scopes that participate in closure capture lookup.
    #[must_use]
    pub fn is_function_like(self) -> bool {
        matches!(self, Self::Function | Self::Lambda)
    }
}

/// One lexical block and its name-binding table.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Insertion-ordered so boxed parameters and class members keep their
    /// source order in generated code.
    pub symbols: IndexMap<String, SymbolFlags>,
    /// Captured name -> the ancestor scope owning the binding.
    pub captures: IndexMap<String, ScopeId>,
    /// The scope references `super` or `__class__`, so a method body needs
    /// the class object synthesized as a captured binding.
    pub uses_class_cell: bool,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            children: vec![],
            symbols: IndexMap::new(),
            captures: IndexMap::new(),
            uses_class_cell: false,
        }
    }

    #[must_use]
    pub fn flags(&self, name: &str) -> Option<SymbolFlags> {
        self.symbols.get(name).copied()
    }

    /// Whether this scope needs a boxed mapping for captured mutable bindings.
    #[must_use]
    pub fn needs_box(&self) -> bool {
        self.symbols
            .values()
            .any(|flags| flags.contains(SymbolFlags::NONLOCAL_SRC))
    }
}

/// The fully resolved scope tree of one program.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    /// Scope-introducing syntax node (by byte range) -> its scope.
    by_node: AHashMap<(u32, u32), ScopeId>,
    /// Every identifier occurring anywhere in the program; feeds the
    /// synthetic-name generator.
    used_names: AHashSet<String>,
}

impl ScopeTree {
    #[must_use]
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// The scope introduced by the given def/class/lambda/comprehension node.
    pub fn scope_for_node(&self, range: TextRange) -> Result<ScopeId, ConvertError> {
        self.by_node
            .get(&node_key(range))
            .copied()
            .ok_or_else(|| ConvertError::internal("no scope recorded for a scope-introducing node"))
    }

    /// Consumes the used-identifier set, for seeding a name generator.
    #[must_use]
    pub fn take_used_names(&mut self) -> AHashSet<String> {
        std::mem::take(&mut self.used_names)
    }
}

fn node_key(range: TextRange) -> (u32, u32) {
    (range.start().to_u32(), range.end().to_u32())
}

/// What a deferred child scope will analyze.
enum ScopeNode<'a> {
    Function(&'a StmtFunctionDef),
    Class(&'a StmtClassDef),
    Lambda(&'a ExprLambda),
    Comp(CompNode<'a>),
}

struct CompNode<'a> {
    generators: &'a [ast::Comprehension],
    body: CompBody<'a>,
}

enum CompBody<'a> {
    Elt(&'a AstExpr),
    KeyValue(&'a AstExpr, &'a AstExpr),
}

/// Whether a store-context name registers as an ordinary assignment or as
/// a comprehension loop target.
#[derive(Clone, Copy, PartialEq, Eq)]
enum AssignMode {
    Normal,
    CompTarget,
}

/// Resolves the whole program into a [`ScopeTree`].
pub fn resolve_program(module: &ModModule, map: &SourceMap) -> Result<ScopeTree, ConvertError> {
    let mut resolver = Resolver {
        tree: ScopeTree {
            scopes: vec![Scope::new(ScopeKind::Module, None)],
            by_node: AHashMap::new(),
            used_names: AHashSet::new(),
        },
        queue: vec![],
        map,
    };

    resolver.analyze_block(ScopeId(0), &module.body)?;

    // Children are queued during their parent's analysis, so a scope is
    // always complete before any of its descendants runs its own pass.
    let mut next = 0;
    while next < resolver.queue.len() {
        let (sid, node) = std::mem::replace(&mut resolver.queue[next], (ScopeId(0), None));
        let node = node.ok_or_else(|| ConvertError::internal("scope work item consumed twice"))?;
        resolver.analyze_scope(sid, node)?;
        next += 1;
    }

    let mut tree = resolver.tree;
    mark_capture_sources(&mut tree);
    Ok(tree)
}

/// Final pass: flag NONLOCAL_SRC on the owner entry of every capture edge.
/// Function and lambda scopes always do; a class scope only for its own
/// explicit nonlocal declarations.
fn mark_capture_sources(tree: &mut ScopeTree) {
    let mut pending: Vec<(ScopeId, String)> = vec![];
    for scope in &tree.scopes {
        for (name, owner) in &scope.captures {
            let applies = match scope.kind {
                ScopeKind::Function | ScopeKind::Lambda => true,
                ScopeKind::Class => scope.flags(name) == Some(SymbolFlags::NONLOCAL_DST),
                ScopeKind::Module | ScopeKind::Comprehension => false,
            };
            // Comprehension and lambda owners stay unboxed; those scopes
            // survive lowering as real runtime scopes, so plain closure
            // capture of the bare name still works.
            if applies
                && !matches!(
                    tree.scope(*owner).kind,
                    ScopeKind::Comprehension | ScopeKind::Lambda
                )
            {
                pending.push((*owner, name.clone()));
            }
        }
    }
    for (owner, name) in pending {
        if let Some(flags) = tree.scope_mut(owner).symbols.get_mut(&name) {
            *flags |= SymbolFlags::NONLOCAL_SRC;
        }
    }
}

struct Resolver<'a> {
    tree: ScopeTree,
    /// Work queue of deferred child scopes; `Option` so items can be taken
    /// out without cloning the borrowed node.
    queue: Vec<(ScopeId, Option<ScopeNode<'a>>)>,
    map: &'a SourceMap,
}

impl<'a> Resolver<'a> {
    fn scope_error(&self, msg: String, range: TextRange) -> ConvertError {
        ConvertError::scope(msg, self.map.convert_range(range))
    }

    fn defer(&mut self, parent: ScopeId, kind: ScopeKind, range: TextRange, node: ScopeNode<'a>) {
        let id = ScopeId(u32::try_from(self.tree.scopes.len()).unwrap_or(u32::MAX));
        self.tree.scopes.push(Scope::new(kind, Some(parent)));
        self.tree.scope_mut(parent).children.push(id);
        self.tree.by_node.insert(node_key(range), id);
        self.queue.push((id, Some(node)));
    }

    fn note_name(&mut self, name: &str) {
        if !self.tree.used_names.contains(name) {
            self.tree.used_names.insert(name.to_owned());
        }
    }

    fn analyze_scope(&mut self, sid: ScopeId, node: ScopeNode<'a>) -> Result<(), ConvertError> {
        match node {
            ScopeNode::Function(def) => {
                self.register_parameters(sid, &def.parameters);
                self.analyze_block(sid, &def.body)
            }
            ScopeNode::Class(def) => self.analyze_block(sid, &def.body),
            ScopeNode::Lambda(lambda) => {
                if let Some(parameters) = &lambda.parameters {
                    self.register_parameters(sid, parameters);
                }
                self.analyze_expr(sid, &lambda.body, AssignMode::Normal)
            }
            ScopeNode::Comp(comp) => {
                // Loop targets first, so later phases can detect rebinding.
                for generator in comp.generators {
                    self.analyze_expr(sid, &generator.target, AssignMode::CompTarget)?;
                }
                for generator in comp.generators {
                    self.analyze_expr(sid, &generator.iter, AssignMode::Normal)?;
                    for guard in &generator.ifs {
                        self.analyze_expr(sid, guard, AssignMode::Normal)?;
                    }
                }
                match comp.body {
                    CompBody::Elt(elt) => self.analyze_expr(sid, elt, AssignMode::Normal),
                    CompBody::KeyValue(key, value) => {
                        self.analyze_expr(sid, key, AssignMode::Normal)?;
                        self.analyze_expr(sid, value, AssignMode::Normal)
                    }
                }
            }
        }
    }

    fn register_parameters(&mut self, sid: ScopeId, parameters: &ast::Parameters) {
        for param in parameters.posonlyargs.iter().chain(&parameters.args).chain(&parameters.kwonlyargs) {
            let name = param.parameter.name.id.as_str();
            self.note_name(name);
            self.tree
                .scope_mut(sid)
                .symbols
                .insert(name.to_owned(), SymbolFlags::PARAMETER);
        }
        for param in parameters.vararg.iter().chain(&parameters.kwarg) {
            let name = param.name.id.as_str();
            self.note_name(name);
            self.tree
                .scope_mut(sid)
                .symbols
                .insert(name.to_owned(), SymbolFlags::PARAMETER);
        }
    }

    fn analyze_block(&mut self, sid: ScopeId, body: &'a [Stmt]) -> Result<(), ConvertError> {
        let mut stack: Vec<&'a Stmt> = body.iter().rev().collect();
        while let Some(stmt) = stack.pop() {
            match stmt {
                Stmt::FunctionDef(def) => {
                    if def.is_async {
                        return Err(ConvertError::unsupported(
                            "'async def' statements are not convertible",
                            self.map.convert_range(def.range),
                        ));
                    }
                    self.assign_symbol(sid, def.name.id.as_str(), def.range)?;
                    for decorator in &def.decorator_list {
                        self.analyze_expr(sid, &decorator.expression, AssignMode::Normal)?;
                    }
                    for param in def
                        .parameters
                        .posonlyargs
                        .iter()
                        .chain(&def.parameters.args)
                        .chain(&def.parameters.kwonlyargs)
                    {
                        if let Some(default) = &param.default {
                            self.analyze_expr(sid, default, AssignMode::Normal)?;
                        }
                    }
                    self.defer(sid, ScopeKind::Function, def.range, ScopeNode::Function(def));
                }
                Stmt::ClassDef(def) => {
                    self.assign_symbol(sid, def.name.id.as_str(), def.range)?;
                    for decorator in &def.decorator_list {
                        self.analyze_expr(sid, &decorator.expression, AssignMode::Normal)?;
                    }
                    if let Some(arguments) = &def.arguments {
                        for base in &arguments.args {
                            self.analyze_expr(sid, base, AssignMode::Normal)?;
                        }
                        for keyword in &arguments.keywords {
                            self.analyze_expr(sid, &keyword.value, AssignMode::Normal)?;
                        }
                    }
                    self.defer(sid, ScopeKind::Class, def.range, ScopeNode::Class(def));
                }
                Stmt::Expr(expr_stmt) => {
                    self.analyze_expr(sid, &expr_stmt.value, AssignMode::Normal)?;
                }
                Stmt::If(if_stmt) => {
                    self.analyze_expr(sid, &if_stmt.test, AssignMode::Normal)?;
                    let mut tail: Vec<&'a Stmt> = vec![];
                    for clause in &if_stmt.elif_else_clauses {
                        if let Some(test) = &clause.test {
                            self.analyze_expr(sid, test, AssignMode::Normal)?;
                        }
                        tail.extend(&clause.body);
                    }
                    stack.extend(tail.into_iter().rev());
                    stack.extend(if_stmt.body.iter().rev());
                }
                Stmt::While(while_stmt) => {
                    self.analyze_expr(sid, &while_stmt.test, AssignMode::Normal)?;
                    stack.extend(while_stmt.orelse.iter().rev());
                    stack.extend(while_stmt.body.iter().rev());
                }
                Stmt::For(for_stmt) => {
                    if for_stmt.is_async {
                        return Err(ConvertError::unsupported(
                            "'async for' statements are not convertible",
                            self.map.convert_range(for_stmt.range),
                        ));
                    }
                    self.analyze_expr(sid, &for_stmt.target, AssignMode::Normal)?;
                    self.analyze_expr(sid, &for_stmt.iter, AssignMode::Normal)?;
                    stack.extend(for_stmt.orelse.iter().rev());
                    stack.extend(for_stmt.body.iter().rev());
                }
                Stmt::Break(_) | Stmt::Continue(_) | Stmt::Pass(_) => {}
                Stmt::Return(return_stmt) => {
                    if let Some(value) = &return_stmt.value {
                        self.analyze_expr(sid, value, AssignMode::Normal)?;
                    }
                }
                Stmt::AugAssign(aug) => {
                    self.analyze_expr(sid, &aug.target, AssignMode::Normal)?;
                    self.analyze_expr(sid, &aug.value, AssignMode::Normal)?;
                }
                Stmt::AnnAssign(ann) => {
                    // A bare annotation binds nothing.
                    if let Some(value) = &ann.value {
                        self.analyze_expr(sid, &ann.target, AssignMode::Normal)?;
                        self.analyze_expr(sid, value, AssignMode::Normal)?;
                    }
                }
                Stmt::Assign(assign) => {
                    self.analyze_expr(sid, &assign.value, AssignMode::Normal)?;
                    for target in &assign.targets {
                        self.analyze_expr(sid, target, AssignMode::Normal)?;
                    }
                }
                Stmt::Global(global) => {
                    for name in &global.names {
                        self.bind_global(sid, name.id.as_str(), global.range)?;
                    }
                }
                Stmt::Nonlocal(nonlocal) => {
                    for name in &nonlocal.names {
                        self.bind_nonlocal(sid, name.id.as_str(), nonlocal.range)?;
                    }
                }
                Stmt::Import(import) => {
                    for alias in &import.names {
                        let bound = match &alias.asname {
                            Some(asname) => asname.id.as_str(),
                            // A dotted import without an alias binds the
                            // top-level package name.
                            None => alias.name.id.split('.').next().unwrap_or(alias.name.id.as_str()),
                        };
                        self.assign_symbol(sid, bound, alias.range)?;
                    }
                }
                Stmt::ImportFrom(import) => {
                    for alias in &import.names {
                        if alias.name.id.as_str() == "*" {
                            // Rejected during lowering with a clearer message.
                            continue;
                        }
                        let bound = match &alias.asname {
                            Some(asname) => asname.id.as_str(),
                            None => alias.name.id.as_str(),
                        };
                        self.assign_symbol(sid, bound, alias.range)?;
                    }
                }
                other => {
                    return Err(ConvertError::unsupported(
                        format!("'{}' statements are not convertible", stmt_keyword(other)),
                        self.map.convert_range(other.range()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn analyze_expr(&mut self, sid: ScopeId, root: &'a AstExpr, mode: AssignMode) -> Result<(), ConvertError> {
        let mut stack: Vec<&'a AstExpr> = vec![root];
        while let Some(expr) = stack.pop() {
            match expr {
                AstExpr::Name(name) => match name.ctx {
                    ExprContext::Load => self.reference_symbol(sid, name.id.as_str(), name.range)?,
                    ExprContext::Store => match mode {
                        AssignMode::Normal => self.assign_symbol(sid, name.id.as_str(), name.range)?,
                        AssignMode::CompTarget => self.assign_comp_target(sid, name.id.as_str()),
                    },
                    ExprContext::Del | ExprContext::Invalid => {}
                },
                AstExpr::Named(named) => {
                    if let AstExpr::Name(target) = &*named.target {
                        self.assign_symbol(sid, target.id.as_str(), named.range)?;
                    } else {
                        return Err(ConvertError::internal(
                            "inline assignment target is not a plain name",
                        ));
                    }
                    stack.push(&named.value);
                }
                AstExpr::Lambda(lambda) => {
                    if let Some(parameters) = &lambda.parameters {
                        for param in parameters
                            .posonlyargs
                            .iter()
                            .chain(&parameters.args)
                            .chain(&parameters.kwonlyargs)
                        {
                            if let Some(default) = &param.default {
                                stack.push(default);
                            }
                        }
                    }
                    self.defer(sid, ScopeKind::Lambda, lambda.range, ScopeNode::Lambda(lambda));
                }
                AstExpr::ListComp(comp) => self.defer(
                    sid,
                    ScopeKind::Comprehension,
                    comp.range,
                    ScopeNode::Comp(CompNode {
                        generators: &comp.generators,
                        body: CompBody::Elt(&comp.elt),
                    }),
                ),
                AstExpr::SetComp(comp) => self.defer(
                    sid,
                    ScopeKind::Comprehension,
                    comp.range,
                    ScopeNode::Comp(CompNode {
                        generators: &comp.generators,
                        body: CompBody::Elt(&comp.elt),
                    }),
                ),
                AstExpr::DictComp(comp) => {
                    let key = comp.key.as_deref().ok_or_else(|| {
                        ConvertError::internal("dict comprehension without a key")
                    })?;
                    self.defer(
                        sid,
                        ScopeKind::Comprehension,
                        comp.range,
                        ScopeNode::Comp(CompNode {
                            generators: &comp.generators,
                            body: CompBody::KeyValue(key, &comp.value),
                        }),
                    );
                }
                AstExpr::Generator(comp) => self.defer(
                    sid,
                    ScopeKind::Comprehension,
                    comp.range,
                    ScopeNode::Comp(CompNode {
                        generators: &comp.generators,
                        body: CompBody::Elt(&comp.elt),
                    }),
                ),
                AstExpr::BoolOp(e) => stack.extend(e.values.iter().rev()),
                AstExpr::BinOp(e) => {
                    stack.push(&e.right);
                    stack.push(&e.left);
                }
                AstExpr::UnaryOp(e) => stack.push(&e.operand),
                AstExpr::If(e) => {
                    stack.push(&e.orelse);
                    stack.push(&e.test);
                    stack.push(&e.body);
                }
                AstExpr::Dict(e) => {
                    for item in e.items.iter().rev() {
                        stack.push(&item.value);
                        if let Some(key) = &item.key {
                            stack.push(key);
                        }
                    }
                }
                AstExpr::Set(e) => stack.extend(e.elts.iter().rev()),
                AstExpr::List(e) => stack.extend(e.elts.iter().rev()),
                AstExpr::Tuple(e) => stack.extend(e.elts.iter().rev()),
                AstExpr::Await(e) => stack.push(&e.value),
                AstExpr::Yield(e) => {
                    if let Some(value) = &e.value {
                        stack.push(value);
                    }
                }
                AstExpr::YieldFrom(e) => stack.push(&e.value),
                AstExpr::Compare(e) => {
                    stack.extend(e.comparators.iter().rev());
                    stack.push(&e.left);
                }
                AstExpr::Call(e) => {
                    for keyword in e.arguments.keywords.iter().rev() {
                        stack.push(&keyword.value);
                    }
                    stack.extend(e.arguments.args.iter().rev());
                    stack.push(&e.func);
                }
                AstExpr::FString(e) => {
                    for part in &e.value {
                        if let ast::FStringPart::FString(fstring) = part {
                            for element in &fstring.elements {
                                if let InterpolatedStringElement::Interpolation(interp) = element {
                                    self.analyze_expr(sid, &interp.expression, AssignMode::Normal)?;
                                    if let Some(spec) = &interp.format_spec {
                                        for spec_element in &spec.elements {
                                            if let InterpolatedStringElement::Interpolation(nested) = spec_element {
                                                self.analyze_expr(sid, &nested.expression, AssignMode::Normal)?;
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                AstExpr::Attribute(e) => stack.push(&e.value),
                AstExpr::Subscript(e) => {
                    stack.push(&e.slice);
                    stack.push(&e.value);
                }
                AstExpr::Starred(e) => stack.push(&e.value),
                AstExpr::Slice(e) => {
                    for part in [&e.step, &e.upper, &e.lower] {
                        if let Some(part) = part {
                            stack.push(part);
                        }
                    }
                }
                AstExpr::StringLiteral(_)
                | AstExpr::BytesLiteral(_)
                | AstExpr::NumberLiteral(_)
                | AstExpr::BooleanLiteral(_)
                | AstExpr::NoneLiteral(_)
                | AstExpr::EllipsisLiteral(_) => {}
                other => {
                    return Err(ConvertError::unsupported(
                        "this expression form is not convertible",
                        self.map.convert_range(other.range()),
                    ));
                }
            }
        }
        Ok(())
    }

    fn assign_symbol(&mut self, sid: ScopeId, name: &str, range: TextRange) -> Result<(), ConvertError> {
        self.note_name(name);
        match self.tree.scope(sid).kind {
            ScopeKind::Module => {
                self.tree
                    .scope_mut(sid)
                    .symbols
                    .insert(name.to_owned(), SymbolFlags::GLOBAL);
                Ok(())
            }
            ScopeKind::Function | ScopeKind::Class | ScopeKind::Lambda => {
                self.assign_symbol_local(sid, name);
                Ok(())
            }
            ScopeKind::Comprehension => self.assign_symbol_comp(sid, name, range),
        }
    }

    fn assign_symbol_local(&mut self, sid: ScopeId, name: &str) {
        let scope = self.tree.scope_mut(sid);
        if let Some(flags) = scope.flags(name) {
            if flags == SymbolFlags::REFERENCED_GLOBAL {
                // becomes a plain local below
            } else if flags == SymbolFlags::FREE {
                scope.captures.shift_remove(name);
            } else {
                return;
            }
        }
        scope.symbols.insert(name.to_owned(), SymbolFlags::LOCAL);
    }

    fn assign_comp_target(&mut self, sid: ScopeId, name: &str) {
        self.note_name(name);
        self.tree
            .scope_mut(sid)
            .symbols
            .insert(name.to_owned(), SymbolFlags::COMPREHENSION_TARGET);
    }

    /// Inline assignment inside a comprehension escapes to the nearest
    /// non-comprehension enclosing scope.
    fn assign_symbol_comp(&mut self, sid: ScopeId, name: &str, range: TextRange) -> Result<(), ConvertError> {
        let mut outer = sid;
        loop {
            let scope = self.tree.scope(outer);
            if scope.kind != ScopeKind::Comprehension {
                break;
            }
            if scope
                .flags(name)
                .is_some_and(|flags| flags.contains(SymbolFlags::COMPREHENSION_TARGET))
            {
                return Err(self.scope_error(
                    format!("assignment expression cannot rebind comprehension iteration variable '{name}'"),
                    range,
                ));
            }
            outer = scope
                .parent
                .ok_or_else(|| ConvertError::internal("comprehension scope without a parent"))?;
        }

        match self.tree.scope(outer).kind {
            ScopeKind::Module => {
                self.tree
                    .scope_mut(sid)
                    .symbols
                    .insert(name.to_owned(), SymbolFlags::COMPREHENSION_ASSIGNMENT);
                Ok(())
            }
            ScopeKind::Function | ScopeKind::Lambda => {
                self.tree
                    .scope_mut(sid)
                    .symbols
                    .insert(name.to_owned(), SymbolFlags::COMPREHENSION_ASSIGNMENT);
                let target = self.tree.scope_mut(outer);
                match target.flags(name) {
                    Some(SymbolFlags::REFERENCED_GLOBAL) => {
                        target.symbols.insert(name.to_owned(), SymbolFlags::LOCAL);
                    }
                    Some(SymbolFlags::FREE) => {
                        target.captures.shift_remove(name);
                        target.symbols.insert(name.to_owned(), SymbolFlags::LOCAL);
                    }
                    Some(_) => {}
                    None => {
                        target.symbols.insert(name.to_owned(), SymbolFlags::LOCAL);
                    }
                }
                Ok(())
            }
            ScopeKind::Class => Err(self.scope_error(
                "assignment expression within a comprehension cannot be used in a class body".to_owned(),
                range,
            )),
            ScopeKind::Comprehension => {
                Err(ConvertError::internal("comprehension escape landed in a comprehension"))
            }
        }
    }

    fn reference_symbol(&mut self, sid: ScopeId, name: &str, range: TextRange) -> Result<(), ConvertError> {
        self.note_name(name);
        match self.tree.scope(sid).kind {
            ScopeKind::Module => {
                let scope = self.tree.scope_mut(sid);
                if !scope.symbols.contains_key(name) {
                    scope.symbols.insert(name.to_owned(), SymbolFlags::REFERENCED_GLOBAL);
                }
                Ok(())
            }
            ScopeKind::Function | ScopeKind::Class | ScopeKind::Lambda => {
                self.reference_symbol_local(sid, name);
                Ok(())
            }
            ScopeKind::Comprehension => {
                self.reference_symbol_comp(sid, name);
                Ok(())
            }
        }
    }

    fn reference_symbol_local(&mut self, sid: ScopeId, name: &str) {
        if self.tree.scope(sid).kind.is_function_like() && (name == "super" || name == "__class__") {
            self.tree.scope_mut(sid).uses_class_cell = true;
        }
        if self.tree.scope(sid).symbols.contains_key(name) {
            return;
        }

        let mut outer = self.tree.scope(sid).parent;
        while let Some(oid) = outer {
            let scope = self.tree.scope(oid);
            match scope.kind {
                ScopeKind::Module => {
                    self.tree
                        .scope_mut(sid)
                        .symbols
                        .insert(name.to_owned(), SymbolFlags::REFERENCED_GLOBAL);
                    return;
                }
                // Class scopes are invisible to nested-function capture.
                ScopeKind::Class => outer = scope.parent,
                ScopeKind::Comprehension => {
                    // A comprehension target captured by a nested closure is a
                    // real runtime binding; the edge keeps the name bare.
                    if scope
                        .flags(name)
                        .is_some_and(|flags| flags.contains(SymbolFlags::COMPREHENSION_TARGET))
                    {
                        self.tree
                            .scope_mut(sid)
                            .symbols
                            .insert(name.to_owned(), SymbolFlags::FREE);
                        self.tree.scope_mut(sid).captures.insert(name.to_owned(), oid);
                        return;
                    }
                    outer = scope.parent;
                }
                ScopeKind::Function | ScopeKind::Lambda => {
                    if let Some(flags) = scope.flags(name) {
                        if !flags.intersects(
                            SymbolFlags::REFERENCED_GLOBAL
                                | SymbolFlags::GLOBAL
                                | SymbolFlags::FREE
                                | SymbolFlags::NONLOCAL_DST,
                        ) {
                            self.tree
                                .scope_mut(sid)
                                .symbols
                                .insert(name.to_owned(), SymbolFlags::FREE);
                            self.tree.scope_mut(sid).captures.insert(name.to_owned(), oid);
                            return;
                        }
                    }
                    outer = scope.parent;
                }
            }
        }
    }

    fn reference_symbol_comp(&mut self, sid: ScopeId, name: &str) {
        if self.tree.scope(sid).symbols.contains_key(name) {
            return;
        }
        // The lookup escapes the comprehension; the transformer resolves it
        // by falling through the overlay stack to the scope that binds it.
        self.tree
            .scope_mut(sid)
            .symbols
            .insert(name.to_owned(), SymbolFlags::COMPREHENSION_REFERENCE);
    }

    fn bind_global(&mut self, sid: ScopeId, name: &str, range: TextRange) -> Result<(), ConvertError> {
        self.note_name(name);
        match self.tree.scope(sid).kind {
            ScopeKind::Module => Ok(()),
            ScopeKind::Function | ScopeKind::Class => {
                let Some(flags) = self.tree.scope(sid).flags(name) else {
                    self.tree
                        .scope_mut(sid)
                        .symbols
                        .insert(name.to_owned(), SymbolFlags::GLOBAL);
                    return Ok(());
                };
                if flags.contains(SymbolFlags::GLOBAL) {
                    Ok(())
                } else if flags.contains(SymbolFlags::PARAMETER) {
                    Err(self.scope_error(format!("name '{name}' is parameter and global"), range))
                } else if flags.contains(SymbolFlags::NONLOCAL_DST) {
                    Err(self.scope_error(format!("name '{name}' is nonlocal and global"), range))
                } else if flags.contains(SymbolFlags::LOCAL) {
                    Err(self.scope_error(
                        format!("name '{name}' is assigned to before global declaration"),
                        range,
                    ))
                } else if flags.intersects(SymbolFlags::REFERENCED_GLOBAL | SymbolFlags::FREE) {
                    Err(self.scope_error(format!("name '{name}' is used prior to global declaration"), range))
                } else {
                    Err(ConvertError::internal(format!(
                        "unable to declare '{name}' global, flags are {flags:?}"
                    )))
                }
            }
            ScopeKind::Lambda | ScopeKind::Comprehension => {
                Err(ConvertError::internal("global declaration inside an expression scope"))
            }
        }
    }

    fn bind_nonlocal(&mut self, sid: ScopeId, name: &str, range: TextRange) -> Result<(), ConvertError> {
        self.note_name(name);
        match self.tree.scope(sid).kind {
            ScopeKind::Module => {
                Err(self.scope_error("nonlocal declaration not allowed at module level".to_owned(), range))
            }
            ScopeKind::Function | ScopeKind::Class => {
                if let Some(flags) = self.tree.scope(sid).flags(name) {
                    return if flags.contains(SymbolFlags::NONLOCAL_DST) {
                        Ok(())
                    } else if flags.contains(SymbolFlags::GLOBAL) {
                        Err(self.scope_error(format!("name '{name}' is nonlocal and global"), range))
                    } else if flags.contains(SymbolFlags::PARAMETER) {
                        Err(self.scope_error(format!("name '{name}' is parameter and nonlocal"), range))
                    } else if flags.contains(SymbolFlags::LOCAL) {
                        Err(self.scope_error(
                            format!("name '{name}' is assigned prior to nonlocal declaration"),
                            range,
                        ))
                    } else if flags.intersects(SymbolFlags::REFERENCED_GLOBAL | SymbolFlags::FREE) {
                        Err(self.scope_error(
                            format!("name '{name}' is used prior to nonlocal declaration"),
                            range,
                        ))
                    } else {
                        Err(ConvertError::internal(format!(
                            "unable to declare '{name}' nonlocal, flags are {flags:?}"
                        )))
                    };
                }

                let mut outer = self.tree.scope(sid).parent;
                while let Some(oid) = outer {
                    let scope = self.tree.scope(oid);
                    match scope.kind {
                        ScopeKind::Module => break,
                        ScopeKind::Class | ScopeKind::Comprehension | ScopeKind::Lambda => outer = scope.parent,
                        ScopeKind::Function => {
                            if let Some(flags) = scope.flags(name) {
                                if !flags.intersects(
                                    SymbolFlags::REFERENCED_GLOBAL
                                        | SymbolFlags::GLOBAL
                                        | SymbolFlags::FREE
                                        | SymbolFlags::NONLOCAL_DST,
                                ) {
                                    self.tree
                                        .scope_mut(sid)
                                        .symbols
                                        .insert(name.to_owned(), SymbolFlags::NONLOCAL_DST);
                                    self.tree.scope_mut(sid).captures.insert(name.to_owned(), oid);
                                    return Ok(());
                                }
                            }
                            outer = scope.parent;
                        }
                    }
                }
                Err(self.scope_error(format!("no binding for nonlocal '{name}' found"), range))
            }
            ScopeKind::Lambda | ScopeKind::Comprehension => {
                Err(ConvertError::internal("nonlocal declaration inside an expression scope"))
            }
        }
    }
}

fn stmt_keyword(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Try(_) => "try",
        Stmt::With(with) => {
            if with.is_async {
                "async with"
            } else {
                "with"
            }
        }
        Stmt::Raise(_) => "raise",
        Stmt::Assert(_) => "assert",
        Stmt::Delete(_) => "del",
        Stmt::Match(_) => "match",
        Stmt::TypeAlias(_) => "type",
        Stmt::IpyEscapeCommand(_) => "ipython escape",
        _ => "this",
    }
}
