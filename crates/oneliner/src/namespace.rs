//! Per-scope codegen strategies.
//!
//! One namespace per module/function/class scope, all created up front in a
//! pre-order walk of the scope tree so synthetic names come out in a stable
//! order. A namespace translates a binding kind into the concrete load/store
//! expression, and carries the mutable per-function lowering state (return
//! count, pending return bodies, loop stack).
//!
//! Lambda and comprehension scopes never get a namespace; the expression
//! transformer resolves their names through a scope overlay instead.

use ahash::AHashMap;

use crate::{
    error::ConvertError,
    expressions::{Expr, InterruptId},
    lower::LoopId,
    names::{NameGenerator, SynthName},
    scope::{ScopeId, ScopeKind, ScopeTree, SymbolFlags},
};

/// Arena handle for a [`Namespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceId(u32);

impl NamespaceId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lowering state specific to one function scope.
#[derive(Debug)]
pub struct FunctionState {
    /// Return-value slot, initialized to `None` at body entry.
    pub retv_name: String,
    /// "a return has fired" flag; initialized only when some guard used it.
    pub ret_flag_name: String,
    pub ret_flag_used: bool,
    pub return_cnt: usize,
    /// Pending return bodies awaiting the flag-set side effect.
    pub return_bodies: Vec<InterruptId>,
    /// Boxed mapping for bindings captured by descendant scopes. The name is
    /// reserved for every function; the mapping is only emitted when the
    /// scope boxes at least one binding.
    pub box_name: String,
    /// Parameters that are boxed, seeded into the box initializer.
    pub boxed_params: Vec<String>,
    pub is_method: bool,
    /// The body references `super`/`__class__`, so the class object must be
    /// pulled in as a captured free variable.
    pub uses_class_cell: bool,
}

#[derive(Debug)]
pub enum NamespaceKind {
    Module,
    Function(FunctionState),
    Class {
        /// Ordered mapping collecting class members during body evaluation.
        member_dict_name: String,
    },
}

#[derive(Debug)]
pub struct Namespace {
    pub scope: ScopeId,
    pub kind: NamespaceKind,
    /// Innermost-last stack of loops currently being lowered in this scope.
    pub loop_stack: Vec<LoopId>,
}

impl Namespace {
    pub fn function_state(&self) -> Result<&FunctionState, ConvertError> {
        match &self.kind {
            NamespaceKind::Function(state) => Ok(state),
            _ => Err(ConvertError::internal("expected a function namespace")),
        }
    }

    pub fn function_state_mut(&mut self) -> Result<&mut FunctionState, ConvertError> {
        match &mut self.kind {
            NamespaceKind::Function(state) => Ok(state),
            _ => Err(ConvertError::internal("expected a function namespace")),
        }
    }
}

/// Arena of namespaces, indexed by [`NamespaceId`] and by scope.
#[derive(Debug)]
pub struct Namespaces {
    arena: Vec<Namespace>,
    by_scope: AHashMap<ScopeId, NamespaceId>,
}

impl Namespaces {
    /// Builds the namespace for every module/function/class scope.
    #[must_use]
    pub fn build(tree: &ScopeTree, names: &mut NameGenerator) -> Self {
        let mut namespaces = Self {
            arena: vec![],
            by_scope: AHashMap::new(),
        };
        // (scope, enclosing namespace kind is class)
        let mut stack: Vec<(ScopeId, bool)> = vec![(tree.root(), false)];
        while let Some((sid, parent_is_class)) = stack.pop() {
            let scope = tree.scope(sid);
            let created = match scope.kind {
                ScopeKind::Module => {
                    namespaces.push(sid, NamespaceKind::Module);
                    Some(false)
                }
                ScopeKind::Function => {
                    let is_method = parent_is_class;
                    let boxed_params: Vec<String> = scope
                        .symbols
                        .iter()
                        .filter(|(_, flags)| {
                            flags.contains(SymbolFlags::PARAMETER | SymbolFlags::NONLOCAL_SRC)
                        })
                        .map(|(name, _)| name.clone())
                        .collect();
                    let state = FunctionState {
                        retv_name: names.fresh(SynthName::ReturnValue),
                        ret_flag_name: names.fresh(SynthName::ReturnFlag),
                        ret_flag_used: false,
                        return_cnt: 0,
                        return_bodies: vec![],
                        box_name: names.fresh(SynthName::NonlocalBox),
                        boxed_params,
                        is_method,
                        uses_class_cell: is_method && scope.uses_class_cell,
                    };
                    namespaces.push(sid, NamespaceKind::Function(state));
                    Some(false)
                }
                ScopeKind::Class => {
                    let kind = NamespaceKind::Class {
                        member_dict_name: names.fresh(SynthName::ClassDict),
                    };
                    namespaces.push(sid, kind);
                    Some(true)
                }
                // Lambdas and comprehensions survive lowering as real scopes
                // and cannot contain statements, so nothing to prepare.
                ScopeKind::Lambda | ScopeKind::Comprehension => None,
            };
            if let Some(is_class) = created {
                // Reverse keeps pre-order numbering on the explicit stack.
                for &child in scope.children.iter().rev() {
                    stack.push((child, is_class));
                }
            }
        }
        namespaces
    }

    fn push(&mut self, scope: ScopeId, kind: NamespaceKind) -> NamespaceId {
        let id = NamespaceId(u32::try_from(self.arena.len()).unwrap_or(u32::MAX));
        self.arena.push(Namespace {
            scope,
            kind,
            loop_stack: vec![],
        });
        self.by_scope.insert(scope, id);
        id
    }

    #[must_use]
    pub fn module(&self) -> NamespaceId {
        NamespaceId(0)
    }

    #[must_use]
    pub fn get(&self, id: NamespaceId) -> &Namespace {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: NamespaceId) -> &mut Namespace {
        &mut self.arena[id.index()]
    }

    #[must_use]
    pub fn for_scope(&self, scope: ScopeId) -> Option<NamespaceId> {
        self.by_scope.get(&scope).copied()
    }

    /// The boxed mapping of the scope that owns a captured binding, when the
    /// owner actually boxes it. Comprehension and lambda owners never box;
    /// plain closure capture of the bare name handles those.
    pub(crate) fn owner_box(
        &self,
        tree: &ScopeTree,
        owner: ScopeId,
        name: &str,
    ) -> Result<Option<Expr>, ConvertError> {
        if !tree
            .scope(owner)
            .flags(name)
            .is_some_and(|flags| flags.contains(SymbolFlags::NONLOCAL_SRC))
        {
            return Ok(None);
        }
        let owner_ns = self
            .for_scope(owner)
            .ok_or_else(|| ConvertError::internal("boxed capture edge points at a scope with no namespace"))?;
        let state = self.get(owner_ns).function_state()?;
        Ok(Some(Expr::name(state.box_name.clone())))
    }

    /// The expression that reads `name` in this namespace.
    pub fn load(&self, tree: &ScopeTree, id: NamespaceId, name: &str) -> Result<Expr, ConvertError> {
        let ns = self.get(id);
        let scope = tree.scope(ns.scope);
        let flags = scope.flags(name);
        match &ns.kind {
            NamespaceKind::Module => Ok(Expr::name(name)),
            NamespaceKind::Function(state) => {
                if flags.is_some_and(|flags| flags.contains(SymbolFlags::NONLOCAL_SRC)) {
                    return Ok(Expr::subscript(
                        Expr::name(state.box_name.clone()),
                        Expr::str_literal(name),
                    ));
                }
                if let Some(owner) = scope.captures.get(name) {
                    if let Some(owner_box) = self.owner_box(tree, *owner, name)? {
                        return Ok(Expr::subscript(owner_box, Expr::str_literal(name)));
                    }
                }
                Ok(Expr::name(name))
            }
            NamespaceKind::Class { member_dict_name } => {
                if let Some(owner) = scope.captures.get(name) {
                    if let Some(owner_box) = self.owner_box(tree, *owner, name)? {
                        return Ok(Expr::subscript(owner_box, Expr::str_literal(name)));
                    }
                    return Ok(Expr::name(name));
                }
                match flags {
                    Some(flags)
                        if flags.intersects(SymbolFlags::GLOBAL | SymbolFlags::REFERENCED_GLOBAL) =>
                    {
                        Ok(Expr::name(name))
                    }
                    Some(_) => Ok(Expr::subscript(
                        Expr::name(member_dict_name.clone()),
                        Expr::str_literal(name),
                    )),
                    None => Ok(Expr::name(name)),
                }
            }
        }
    }

    /// The expression that binds `name` to `value` in this namespace.
    pub fn store(
        &self,
        tree: &ScopeTree,
        id: NamespaceId,
        name: &str,
        value: Expr,
    ) -> Result<Expr, ConvertError> {
        let ns = self.get(id);
        let scope = tree.scope(ns.scope);
        let flags = scope.flags(name);
        match &ns.kind {
            NamespaceKind::Module => Ok(Expr::named(name, value)),
            NamespaceKind::Function(state) => {
                if flags.is_some_and(|flags| flags.contains(SymbolFlags::GLOBAL)) {
                    return Ok(globals_setitem(name, value));
                }
                if let Some(owner) = scope.captures.get(name) {
                    let owner_box = self.owner_box(tree, *owner, name)?.ok_or_else(|| {
                        ConvertError::internal("store through a capture edge with no boxed owner")
                    })?;
                    return Ok(Expr::setitem(owner_box, Expr::str_literal(name), value));
                }
                if flags.is_some_and(|flags| flags.contains(SymbolFlags::NONLOCAL_SRC)) {
                    return Ok(Expr::setitem(
                        Expr::name(state.box_name.clone()),
                        Expr::str_literal(name),
                        value,
                    ));
                }
                Ok(Expr::named(name, value))
            }
            NamespaceKind::Class { member_dict_name } => {
                if flags.is_some_and(|flags| flags.contains(SymbolFlags::GLOBAL)) {
                    return Ok(globals_setitem(name, value));
                }
                if let Some(owner) = scope.captures.get(name) {
                    let owner_box = self.owner_box(tree, *owner, name)?.ok_or_else(|| {
                        ConvertError::internal("store through a capture edge with no boxed owner")
                    })?;
                    return Ok(Expr::setitem(owner_box, Expr::str_literal(name), value));
                }
                Ok(Expr::setitem(
                    Expr::name(member_dict_name.clone()),
                    Expr::str_literal(name),
                    value,
                ))
            }
        }
    }
}

/// `globals().__setitem__('name', value)` -- assignment-expression syntax
/// only binds the nearest function scope, so explicit globals go through
/// the runtime mapping.
fn globals_setitem(name: &str, value: Expr) -> Expr {
    Expr::setitem(
        Expr::call(Expr::name("globals"), vec![]),
        Expr::str_literal(name),
        value,
    )
}
