use crate::language::{
    ast::{ClassDef, FunctionDef, Item, Program, QualifiedName, VarDecl, Visibility},
    span::Span,
};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Value,
};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Index of a namespace or class node. Parent links are ids, so the tree
/// owns every node exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Namespace,
    Class,
}

#[derive(Clone, Debug)]
pub struct BaseClassInfo {
    pub visibility: Visibility,
    pub name: QualifiedName,
}

#[derive(Debug)]
pub struct ScopeNode {
    pub name: String,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: BTreeMap<String, ScopeId>,
    pub functions: BTreeMap<String, Rc<FunctionDef>>,
    pub variables: BTreeMap<String, Rc<VarDecl>>,
    pub values: BTreeMap<String, Value>,
    /// `true` while the variable's initializer is running.
    pub initializing: BTreeMap<String, bool>,
    pub bases: Vec<BaseClassInfo>,
    pub constructors: Vec<Rc<FunctionDef>>,
    definition: Option<Rc<ClassDef>>,
}

impl ScopeNode {
    fn new(kind: ScopeKind, name: &str, parent: Option<ScopeId>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent,
            children: BTreeMap::new(),
            functions: BTreeMap::new(),
            variables: BTreeMap::new(),
            values: BTreeMap::new(),
            initializing: BTreeMap::new(),
            bases: Vec::new(),
            constructors: Vec::new(),
            definition: None,
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == ScopeKind::Class
    }
}

#[derive(Debug)]
pub struct SymbolTable {
    nodes: Vec<ScopeNode>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table holding only the unnamed root namespace.
    pub fn new() -> Self {
        Self {
            nodes: vec![ScopeNode::new(ScopeKind::Namespace, "", None)],
        }
    }

    pub fn from_program(program: &Program) -> RuntimeResult<Self> {
        let mut table = Self::new();
        table.register_items(ScopeId::ROOT, &program.items)?;
        Ok(table)
    }

    pub fn register_items(&mut self, scope: ScopeId, items: &[Item]) -> RuntimeResult<()> {
        for item in items {
            match item {
                Item::Namespace(def) => {
                    let id = self.declare_namespace(scope, &def.name.name, def.name.span)?;
                    self.register_items(id, &def.items)?;
                }
                Item::Class(def) => {
                    self.declare_class(scope, def)?;
                }
                Item::Function(def) => self.declare_function(scope, def)?,
                Item::Variable(decl) => self.declare_variable(scope, decl)?,
            }
        }
        Ok(())
    }

    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.nodes[id.0]
    }

    /// Opens `name` under `parent`, reusing an existing namespace of that name.
    pub fn declare_namespace(
        &mut self,
        parent: ScopeId,
        name: &str,
        span: Span,
    ) -> RuntimeResult<ScopeId> {
        if self.node(parent).is_class() {
            return Err(RuntimeError::IncompatibleScope {
                name: name.to_string(),
                reason: "namespaces cannot be declared inside a class",
                span,
            });
        }
        if let Some(&existing) = self.node(parent).children.get(name) {
            if self.node(existing).is_class() {
                return Err(RuntimeError::IncompatibleScope {
                    name: name.to_string(),
                    reason: "a class with this name already exists",
                    span,
                });
            }
            return Ok(existing);
        }
        let id = self.push_node(ScopeKind::Namespace, name, parent);
        tracing::debug!(namespace = %self.qualified_name(id), "declared namespace");
        Ok(id)
    }

    /// Registers a class with its members. Registering the same definition
    /// twice returns the existing node.
    pub fn declare_class(&mut self, parent: ScopeId, def: &Rc<ClassDef>) -> RuntimeResult<ScopeId> {
        let name = &def.name.name;
        if let Some(&existing) = self.node(parent).children.get(name) {
            if let Some(known) = &self.node(existing).definition {
                if Rc::ptr_eq(known, def) {
                    return Ok(existing);
                }
            }
            return Err(RuntimeError::DuplicateDeclaration {
                kind: "class",
                name: name.clone(),
                span: def.name.span,
            });
        }

        let id = self.push_node(ScopeKind::Class, name, parent);
        {
            let node = self.node_mut(id);
            node.definition = Some(Rc::clone(def));
            node.bases = def
                .bases
                .iter()
                .map(|base| BaseClassInfo {
                    visibility: base.visibility,
                    name: base.name.clone(),
                })
                .collect();
            node.constructors = def.constructors.clone();
        }
        for decl in &def.variables {
            self.declare_variable(id, decl)?;
        }
        for function in &def.functions {
            self.declare_function(id, function)?;
        }
        tracing::debug!(class = %self.qualified_name(id), "declared class");
        Ok(id)
    }

    /// Registering the same definition node again is a no-op.
    pub fn declare_function(&mut self, scope: ScopeId, def: &Rc<FunctionDef>) -> RuntimeResult<()> {
        let node = self.node_mut(scope);
        if let Some(existing) = node.functions.get(&def.name.name) {
            if Rc::ptr_eq(existing, def) {
                return Ok(());
            }
            return Err(RuntimeError::DuplicateDeclaration {
                kind: "function",
                name: def.name.name.clone(),
                span: def.name.span,
            });
        }
        node.functions.insert(def.name.name.clone(), Rc::clone(def));
        Ok(())
    }

    pub fn declare_variable(&mut self, scope: ScopeId, decl: &Rc<VarDecl>) -> RuntimeResult<()> {
        let node = self.node_mut(scope);
        if node.variables.contains_key(&decl.name.name) {
            return Err(RuntimeError::DuplicateDeclaration {
                kind: "variable",
                name: decl.name.name.clone(),
                span: decl.name.span,
            });
        }
        node.variables.insert(decl.name.name.clone(), Rc::clone(decl));
        node.initializing.insert(decl.name.name.clone(), false);
        Ok(())
    }

    /// The root reached by following parent links from `from`.
    pub fn top(&self, from: ScopeId) -> ScopeId {
        let mut current = from;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current
    }

    /// Descends `path` from `from`, or from the root when the first segment
    /// is empty. An empty path names `from` itself.
    pub fn lookup_qualified(&self, from: ScopeId, path: &[String]) -> Option<ScopeId> {
        let mut segments = path.iter().peekable();
        let mut current = from;
        if segments.peek().is_some_and(|segment| segment.is_empty()) {
            segments.next();
            current = self.top(from);
        }
        for segment in segments {
            current = *self.node(current).children.get(segment)?;
        }
        Some(current)
    }

    /// Looks in the scope `path` names relative to `from`; failing that,
    /// repeats the search with the same path anchored at the root.
    fn resolve<T>(
        &self,
        from: ScopeId,
        path: &[String],
        find: impl Fn(ScopeId, &ScopeNode) -> Option<T>,
    ) -> Option<T> {
        if let Some(scope) = self.lookup_qualified(from, path) {
            if let Some(found) = find(scope, self.node(scope)) {
                return Some(found);
            }
        }
        let top = self.top(from);
        let scope = self.lookup_qualified(top, path)?;
        find(scope, self.node(scope))
    }

    pub fn resolve_function(
        &self,
        from: ScopeId,
        name: &str,
        path: &[String],
    ) -> Option<(ScopeId, Rc<FunctionDef>)> {
        self.resolve(from, path, |id, node| {
            node.functions.get(name).map(|def| (id, Rc::clone(def)))
        })
    }

    pub fn resolve_variable(
        &self,
        from: ScopeId,
        name: &str,
        path: &[String],
    ) -> Option<(ScopeId, Rc<VarDecl>)> {
        self.resolve(from, path, |id, node| {
            node.variables.get(name).map(|decl| (id, Rc::clone(decl)))
        })
    }

    pub fn resolve_scope(&self, from: ScopeId, name: &str, path: &[String]) -> Option<ScopeId> {
        self.resolve(from, path, |_, node| node.children.get(name).copied())
    }

    pub fn set_value(&mut self, scope: ScopeId, name: &str, value: Value) {
        self.node_mut(scope).values.insert(name.to_string(), value);
    }

    pub fn is_initializing(&self, scope: ScopeId, name: &str) -> bool {
        self.node(scope)
            .initializing
            .get(name)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_initializing(&mut self, scope: ScopeId, name: &str, running: bool) {
        self.node_mut(scope)
            .initializing
            .insert(name.to_string(), running);
    }

    /// Every node, each namespace before its children.
    pub fn depth_first(&self) -> Vec<ScopeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![ScopeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.values().rev().copied());
        }
        order
    }

    pub fn qualified_name(&self, id: ScopeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(scope) = current {
            let node = self.node(scope);
            if node.parent.is_some() {
                segments.push(node.name.as_str());
            }
            current = node.parent;
        }
        segments.reverse();
        format!("::{}", segments.join("::"))
    }

    fn push_node(&mut self, kind: ScopeKind, name: &str, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.nodes.len());
        self.nodes.push(ScopeNode::new(kind, name, Some(parent)));
        self.node_mut(parent).children.insert(name.to_string(), id);
        id
    }
}
