use crate::language::{
    ast::{FunctionDef, VarDecl},
    span::Span,
};
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    symbols::{BaseClassInfo, ScopeId, SymbolTable},
    value::Value,
};
use std::rc::Rc;

/// Read-only view of a registered class handed to a [`ClassRuntime`].
pub struct ClassView<'a> {
    symbols: &'a SymbolTable,
    id: ScopeId,
}

impl<'a> ClassView<'a> {
    pub fn new(symbols: &'a SymbolTable, id: ScopeId) -> Self {
        Self { symbols, id }
    }

    pub fn name(&self) -> &'a str {
        &self.symbols.node(self.id).name
    }

    pub fn qualified_name(&self) -> String {
        self.symbols.qualified_name(self.id)
    }

    pub fn bases(&self) -> &'a [BaseClassInfo] {
        &self.symbols.node(self.id).bases
    }

    pub fn constructors(&self) -> &'a [Rc<FunctionDef>] {
        &self.symbols.node(self.id).constructors
    }

    pub fn variables(&self) -> impl Iterator<Item = &'a Rc<VarDecl>> {
        self.symbols.node(self.id).variables.values()
    }
}

/// Constructs instances when a call resolves to a class instead of a function.
pub trait ClassRuntime {
    fn instantiate(
        &mut self,
        class: ClassView<'_>,
        args: Vec<Value>,
        span: Span,
    ) -> RuntimeResult<Value>;
}

/// Refuses every instantiation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoClassRuntime;

impl ClassRuntime for NoClassRuntime {
    fn instantiate(
        &mut self,
        class: ClassView<'_>,
        _args: Vec<Value>,
        span: Span,
    ) -> RuntimeResult<Value> {
        Err(RuntimeError::ClassInstantiation {
            class: class.qualified_name(),
            reason: "class runtime not installed".into(),
            span,
        })
    }
}
