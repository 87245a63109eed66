//! Name resolution over the instance tree.
//!
//! Every instance-tree node is a scope. Lookup follows the Modelica
//! composite rules: scan the scope's own elements in declaration order with
//! extends expanding in place, consult qualified then unqualified imports,
//! climb to the parent unless the lookup is encapsulated, and fall back to
//! the predefined types at the very end of the walk.

use crate::errors::{Error, Result};
use crate::eval::{Environment, Value, evaluate};
use crate::instance::{
    ClassVariant, EnumerationLiteral, InstanceId, InstanceKind, InstanceState,
};
use crate::library::Library;
use crate::syntax::ast;
use crate::syntax::visitor::ComponentRefCollector;

/// Owned snapshot of the parts of a scope the scanner needs; lets the scan
/// recurse without holding arena borrows.
enum ScopeProbe {
    Entity {
        class: Option<InstanceId>,
        children: Vec<InstanceId>,
    },
    Class,
    Delegate(Option<InstanceId>),
}

enum ClassProbe {
    EnumerationLiteral(EnumerationLiteral),
    Delegate(InstanceId),
    Plain,
}

enum ElementProbe {
    Named(String),
    Extends(Option<InstanceId>),
    Other,
}

impl Library {
    /// Modelica §5 simple-name lookup starting at `scope`.
    pub fn resolve_simple_name(
        &mut self,
        scope: InstanceId,
        name: &str,
        global: bool,
        encapsulated: bool,
    ) -> Result<Option<InstanceId>> {
        self.resolve_simple_name_inner(scope, name, global, encapsulated, true)
    }

    fn resolve_simple_name_inner(
        &mut self,
        scope: InstanceId,
        name: &str,
        global: bool,
        encapsulated: bool,
        fallback: bool,
    ) -> Result<Option<InstanceId>> {
        let mut current = if global { self.root() } else { Some(scope) };
        while let Some(s) = current {
            if let Some(found) = self.scan_scope(s, name)? {
                return Ok(Some(found));
            }
            if self.arena.class(s).is_some() {
                if let Some(found) = self.scan_imports(s, name)? {
                    return Ok(Some(found));
                }
            }
            if encapsulated {
                break;
            }
            current = self.arena.parent(s);
        }
        if fallback {
            return Ok(self.predefined(name));
        }
        Ok(None)
    }

    /// Composite-name lookup: the first component by simple lookup, every
    /// further component by an encapsulated lookup on the previous result.
    pub fn resolve_name(
        &mut self,
        scope: InstanceId,
        name: &ast::Name,
        global: bool,
    ) -> Result<Option<InstanceId>> {
        let mut parts = name.parts.iter();
        let Some(first) = parts.next() else {
            return Ok(None);
        };
        let Some(mut current) = self.resolve_simple_name(scope, &first.text, global, false)?
        else {
            return Ok(None);
        };
        for part in parts {
            let Some(next) = self.resolve_simple_name(current, &part.text, false, true)? else {
                return Ok(None);
            };
            current = next;
        }
        Ok(Some(current))
    }

    /// Like [`Library::resolve_name`] but auto-instantiates components along
    /// the path and continues resolution through their class instances.
    pub fn resolve_component_reference(
        &mut self,
        scope: InstanceId,
        cref: &ast::ComponentReference,
    ) -> Result<Option<InstanceId>> {
        let mut parts = cref.parts.iter();
        let Some(first) = parts.next() else {
            return Ok(None);
        };
        let Some(mut current) =
            self.resolve_simple_name(scope, &first.ident.text, cref.global, false)?
        else {
            return Ok(None);
        };
        for part in parts {
            let next_scope = if self.arena.component(current).is_some() {
                self.instantiate_node(current)?;
                match self.arena.component(current).and_then(|c| c.class) {
                    Some(class) => class,
                    None => return Ok(None),
                }
            } else {
                current
            };
            let Some(next) =
                self.resolve_simple_name(next_scope, &part.ident.text, false, true)?
            else {
                return Ok(None);
            };
            current = next;
        }
        Ok(Some(current))
    }

    /// Resolves a type specifier, raising [`Error::NameNotFound`] on a miss.
    pub fn resolve_type_specifier(
        &mut self,
        scope: InstanceId,
        type_specifier: &ast::TypeSpecifier,
    ) -> Result<InstanceId> {
        match self.resolve_name(scope, &type_specifier.name, type_specifier.global)? {
            Some(id) => Ok(id),
            None => Err(Error::NameNotFound {
                name: type_specifier.name.as_dotted(),
                scope: self.arena.display_name(scope),
            }),
        }
    }

    /// Resolves a dotted name from the library root.
    pub fn find(&mut self, dotted: &str) -> Result<Option<InstanceId>> {
        let Some(root) = self.root() else {
            return Ok(None);
        };
        self.resolve_name(root, &ast::Name::from_parts(dotted.split('.')), true)
    }

    //-------------------------------------------------------------------------
    // scope scanning
    //-------------------------------------------------------------------------

    fn scan_scope(&mut self, scope: InstanceId, name: &str) -> Result<Option<InstanceId>> {
        let probe = match &self.arena.get(scope).kind {
            InstanceKind::Entity(entity) => ScopeProbe::Entity {
                class: entity.class,
                children: entity.children.clone(),
            },
            InstanceKind::Class(_) => ScopeProbe::Class,
            InstanceKind::Extends(extends) => ScopeProbe::Delegate(extends.class),
            InstanceKind::Component(component) => ScopeProbe::Delegate(component.class),
        };
        match probe {
            ScopeProbe::Entity { class, children } => {
                if let Some(class) = class {
                    if self.arena.class(class).is_some_and(|c| c.name == name) {
                        return Ok(Some(class));
                    }
                    return self.scan_class(class, name);
                }
                Ok(self.scan_entity_children(&children, name))
            }
            ScopeProbe::Class => self.scan_class(scope, name),
            ScopeProbe::Delegate(Some(class)) => self.scan_class(class, name),
            ScopeProbe::Delegate(None) => Ok(None),
        }
    }

    fn scan_entity_children(&self, children: &[InstanceId], name: &str) -> Option<InstanceId> {
        for child in children {
            let entity = self.arena.entity(*child)?;
            if entity.name == name {
                // prefer the entity's class content when it has one
                return Some(entity.class.unwrap_or(*child));
            }
        }
        None
    }

    fn scan_class(&mut self, class_id: InstanceId, name: &str) -> Result<Option<InstanceId>> {
        // populate lazily; a scope already mid-instantiation is scanned as-is
        if self
            .arena
            .class(class_id)
            .is_some_and(|c| c.state == InstanceState::Fresh)
        {
            self.instantiate_node(class_id)?;
        }

        let probe = {
            let Some(class) = self.arena.class(class_id) else {
                return Ok(None);
            };
            match &class.variant {
                ClassVariant::Enumeration { literals, .. } => {
                    match literals.iter().find(|l| l.name == name) {
                        Some(literal) => ClassProbe::EnumerationLiteral(literal.clone()),
                        None => ClassProbe::Plain,
                    }
                }
                ClassVariant::Short {
                    target: Some(target),
                } => ClassProbe::Delegate(*target),
                ClassVariant::Array {
                    element: Some(element),
                    ..
                } => ClassProbe::Delegate(*element),
                _ => ClassProbe::Plain,
            }
        };
        match probe {
            ClassProbe::EnumerationLiteral(literal) => {
                let clone = self.enumeration_literal_clone(class_id, literal)?;
                return Ok(Some(clone));
            }
            ClassProbe::Delegate(target) => return self.scan_class(target, name),
            ClassProbe::Plain => {}
        }

        // sub-entities shadow class content for entity-backed classes
        if let Some(parent) = self.arena.parent(class_id) {
            let children = match self.arena.entity(parent) {
                Some(entity) if entity.class == Some(class_id) => entity.children.clone(),
                _ => Vec::new(),
            };
            if let Some(found) = self.scan_entity_children(&children, name) {
                return Ok(Some(found));
            }
        }

        let declared = self
            .arena
            .class(class_id)
            .map(|c| c.declared.clone())
            .unwrap_or_default();
        for id in declared {
            let probe = match &self.arena.get(id).kind {
                InstanceKind::Class(class) => ElementProbe::Named(class.name.clone()),
                InstanceKind::Component(component) => {
                    ElementProbe::Named(component.name.clone())
                }
                InstanceKind::Extends(extends) => ElementProbe::Extends(extends.class),
                InstanceKind::Entity(_) => ElementProbe::Other,
            };
            match probe {
                ElementProbe::Named(n) if n == name => return Ok(Some(id)),
                ElementProbe::Extends(Some(base)) => {
                    // an extends instance expands in place
                    if let Some(found) = self.scan_class(base, name)? {
                        return Ok(Some(found));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn scan_imports(&mut self, class_id: InstanceId, name: &str) -> Result<Option<InstanceId>> {
        let (qualified, unqualified) = match self.arena.class(class_id) {
            Some(class) => (
                class.qualified_imports.get(name).copied(),
                class.unqualified_imports.clone(),
            ),
            None => (None, Vec::new()),
        };
        if qualified.is_some() {
            return Ok(qualified);
        }
        for import in unqualified {
            if let Some(found) =
                self.resolve_simple_name_inner(import, name, false, true, false)?
            {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    //-------------------------------------------------------------------------
    // element iteration and evaluation support
    //-------------------------------------------------------------------------

    /// Declared elements of a class with every extends instance expanded in
    /// place to its own element sequence.
    pub fn elements(&self, class_id: InstanceId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        self.collect_elements(class_id, &mut out);
        out
    }

    fn collect_elements(&self, class_id: InstanceId, out: &mut Vec<InstanceId>) {
        let Some(class) = self.arena.class(class_id) else {
            return;
        };
        for id in &class.declared {
            match &self.arena.get(*id).kind {
                InstanceKind::Extends(extends) => {
                    if let Some(base) = extends.class {
                        self.collect_elements(base, out);
                    }
                }
                _ => out.push(*id),
            }
        }
    }

    /// The scope a node's applied modification is evaluated in: the use site
    /// of the owning component or extends clause, else the enclosing class.
    pub fn evaluation_scope(&self, id: InstanceId) -> Option<InstanceId> {
        let mut current = id;
        loop {
            let owner = self.arena.owner(current)?;
            match &self.arena.get(owner).kind {
                InstanceKind::Component(_) | InstanceKind::Extends(_) => {
                    return self.arena.parent(owner).or(Some(owner));
                }
                InstanceKind::Class(class) => {
                    if matches!(class.variant, ClassVariant::Array { .. }) {
                        // arrays are synthetic wrappers; keep climbing
                        current = owner;
                        continue;
                    }
                    return Some(owner);
                }
                InstanceKind::Entity(_) => return Some(owner),
            }
        }
    }

    /// Evaluates `expression` with component references resolved through
    /// `scope`. References that do not resolve to a constant value are left
    /// unbound and only fail if the evaluation reaches them.
    pub fn evaluate_expression(
        &mut self,
        scope: Option<InstanceId>,
        expression: &ast::Expression,
    ) -> Result<Value> {
        if self.eval_depth > 64 {
            return Err(Error::TypeMismatch {
                name: "expression".to_string(),
                expected: "a finite value dependency chain",
                found: "a recursive value dependency".to_string(),
            });
        }
        self.eval_depth += 1;
        let result = self.evaluate_expression_inner(scope, expression);
        self.eval_depth -= 1;
        result
    }

    fn evaluate_expression_inner(
        &mut self,
        scope: Option<InstanceId>,
        expression: &ast::Expression,
    ) -> Result<Value> {
        let crefs: Vec<ast::ComponentReference> = ComponentRefCollector::collect(expression)
            .into_iter()
            .cloned()
            .collect();
        let scope_name = scope
            .map(|s| self.arena.display_name(s))
            .unwrap_or_else(|| "<top>".to_string());
        let mut env = Environment::new(scope_name);
        if let Some(scope) = scope {
            for cref in crefs {
                if let Some(value) = self.resolve_reference_value(scope, &cref)? {
                    env.bind(cref, value);
                }
            }
        }
        evaluate(expression, &env)
    }

    /// The constant value a reference resolves to in `scope`, if any.
    fn resolve_reference_value(
        &mut self,
        scope: InstanceId,
        cref: &ast::ComponentReference,
    ) -> Result<Option<Value>> {
        let resolved = match self.resolve_component_reference(scope, cref) {
            Ok(resolved) => resolved,
            // an unresolvable reference is simply left unbound
            Err(Error::NameNotFound { .. }) => None,
            Err(other) => return Err(other),
        };
        let Some(target) = resolved else {
            return Ok(None);
        };
        let class_id = match &self.arena.get(target).kind {
            InstanceKind::Component(component) => match component.class {
                Some(class) => class,
                None => return Ok(None),
            },
            InstanceKind::Class(_) => target,
            _ => return Ok(None),
        };
        self.class_value(class_id)
    }

    fn class_value(&mut self, class_id: InstanceId) -> Result<Option<Value>> {
        enum Shape {
            Predefined,
            Enumeration(String, Option<EnumerationLiteral>),
            Short(Option<InstanceId>),
            Array(Vec<InstanceId>),
            Other,
        }
        let shape = match self.arena.class(class_id) {
            Some(class) => match &class.variant {
                ClassVariant::Predefined { .. } => Shape::Predefined,
                ClassVariant::Enumeration { value, .. } => {
                    Shape::Enumeration(class.name.clone(), value.clone())
                }
                ClassVariant::Short { target } => Shape::Short(*target),
                ClassVariant::Array { elements, .. } => Shape::Array(elements.clone()),
                ClassVariant::Normal => Shape::Other,
            },
            None => Shape::Other,
        };
        match shape {
            Shape::Predefined => self.value_of(class_id),
            Shape::Enumeration(type_name, value) => Ok(value.map(|literal| {
                Value::Enumeration {
                    type_name,
                    name: literal.name,
                    ordinal: literal.ordinal,
                }
            })),
            Shape::Short(Some(target)) => self.class_value(target),
            Shape::Short(None) => Ok(None),
            Shape::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    match self.class_value(element)? {
                        Some(value) => values.push(value),
                        None => return Ok(None),
                    }
                }
                if values.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Value::Array(values)))
            }
            Shape::Other => Ok(None),
        }
    }
}
