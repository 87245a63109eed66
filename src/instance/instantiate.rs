//! The instantiation engine: turns class definitions into instance trees
//! with resolved modifications.
//!
//! Every instantiable node moves through `Fresh -> Instantiating ->
//! Instantiated`. Re-entering `instantiate` on an `Instantiating` node raises
//! [`Error::CyclicInstantiation`]; before cloning an extends or component
//! target the engine instantiates the target itself, so cycles through
//! `extends` clauses and component types hit that check. A node left
//! `Instantiating` after a failure is not reused.
//!
//! Class instantiation runs in phases, in this order: reset, collect AST
//! elements, extends, nested classes, imports, components, annotations.

use crate::errors::{Error, Result};
use crate::instance::{
    ClassInstance, ClassVariant, ComponentInstance, EnumerationLiteral, ExtendsInstance,
    InstanceId, InstanceKind, InstanceState,
};
use crate::library::Library;
use crate::modification::Modification;
use crate::syntax::ast;
use std::rc::Rc;

impl Library {
    /// Instantiates the loaded library: the root entity, then every
    /// sub-entity. Monotonic; a second call finds everything instantiated.
    pub fn instantiate(&mut self) -> Result<()> {
        let Some(root) = self.root() else {
            return Err(Error::FileSystem {
                path: "<unloaded>".to_string(),
                message: "the library has not been loaded".to_string(),
            });
        };
        self.instantiate_node(root)
    }

    /// Loads and instantiates in one step.
    pub fn instantiate_path(&mut self, path: &str) -> Result<InstanceId> {
        let root = self.load(path)?;
        self.instantiate_node(root)?;
        Ok(root)
    }

    /// Instantiates any instance-tree node.
    pub(crate) fn instantiate_node(&mut self, id: InstanceId) -> Result<()> {
        enum Kind {
            Entity,
            Class,
            Extends,
            Component,
        }
        let kind = match &self.arena.get(id).kind {
            InstanceKind::Entity(_) => Kind::Entity,
            InstanceKind::Class(_) => Kind::Class,
            InstanceKind::Extends(_) => Kind::Extends,
            InstanceKind::Component(_) => Kind::Component,
        };
        match kind {
            Kind::Entity => self.instantiate_entity(id),
            Kind::Class => self.instantiate_class(id),
            Kind::Extends => self.instantiate_extends(id),
            Kind::Component => self.instantiate_component(id),
        }
    }

    fn instantiate_entity(&mut self, id: InstanceId) -> Result<()> {
        let (class, children) = {
            let entity = self.arena.entity(id).expect("entity node");
            (entity.class, entity.children.clone())
        };
        log::debug!("instantiating entity {}", self.arena.display_name(id));
        if let Some(class) = class {
            self.instantiate_node(class)?;
        }
        for child in children {
            self.instantiate_node(child)?;
        }
        Ok(())
    }

    //-------------------------------------------------------------------------
    // classes
    //-------------------------------------------------------------------------

    /// Creates an unresolved class instance for an AST class definition.
    pub(crate) fn create_class_instance(
        &mut self,
        ast: Rc<ast::ClassDefinition>,
        parent: Option<InstanceId>,
        modification: Modification,
    ) -> Result<InstanceId> {
        let variant = match &ast.specifier {
            ast::ClassSpecifier::Long { .. } => ClassVariant::Normal,
            ast::ClassSpecifier::Short { .. } | ast::ClassSpecifier::Der { .. } => {
                ClassVariant::Short { target: None }
            }
            ast::ClassSpecifier::Enumeration { .. } => ClassVariant::Enumeration {
                literals: Vec::new(),
                value: None,
            },
        };
        let class = ClassInstance {
            name: ast.name().to_string(),
            classification: ast.kind,
            is_encapsulated: ast.is_encapsulated,
            modification,
            ast: Some(ast),
            state: InstanceState::Fresh,
            variant,
            ..Default::default()
        };
        Ok(self.arena.alloc(parent, InstanceKind::Class(class)))
    }

    fn instantiate_class(&mut self, id: InstanceId) -> Result<()> {
        let (state, name) = {
            let class = self.arena.class(id).expect("class node");
            (class.state, class.name.clone())
        };
        match state {
            InstanceState::Instantiated => return Ok(()),
            InstanceState::Instantiating => {
                return Err(Error::CyclicInstantiation { name });
            }
            InstanceState::Fresh => {}
        }
        log::debug!("instantiating class {}", name);
        self.arena.class_mut(id).expect("class node").state = InstanceState::Instantiating;

        let variant_is = |class: &ClassInstance| match class.variant {
            ClassVariant::Normal => 0u8,
            ClassVariant::Short { .. } => 1,
            ClassVariant::Enumeration { .. } => 2,
            _ => 3,
        };
        let discriminant = variant_is(self.arena.class(id).expect("class node"));
        match discriminant {
            0 => self.instantiate_normal_class(id)?,
            1 => self.instantiate_short_class(id)?,
            2 => self.instantiate_enumeration_class(id)?,
            // predefined and array instances carry no AST body
            _ => {}
        }

        self.arena.class_mut(id).expect("class node").state = InstanceState::Instantiated;
        Ok(())
    }

    fn instantiate_normal_class(&mut self, id: InstanceId) -> Result<()> {
        // phase 1: reset
        {
            let class = self.arena.class_mut(id).expect("class node");
            class.declared.clear();
            class.qualified_imports.clear();
            class.unqualified_imports.clear();
            class.annotations.clear();
        }
        let (ast, modification) = {
            let class = self.arena.class(id).expect("class node");
            (class.ast.clone(), class.modification.clone())
        };
        let Some(ast) = ast else {
            return Ok(());
        };

        // phase 2: collect AST elements
        let mut declared = Vec::new();
        let mut imports = Vec::new();
        for element in ast.elements() {
            match element {
                ast::Element::ClassDefinition(definition) => {
                    let extracted = modification.extract(definition.name());
                    let child = self.create_class_instance(
                        Rc::new(definition.clone()),
                        Some(id),
                        extracted,
                    )?;
                    declared.push(child);
                }
                ast::Element::ComponentClause(clause) => {
                    for declaration in &clause.declarations {
                        let applied = merge_component_modification(&modification, declaration);
                        let component = ComponentInstance {
                            name: declaration.ident.text.clone(),
                            declaration: Rc::new(declaration.clone()),
                            type_specifier: clause.type_specifier.clone(),
                            clause_subscripts: clause.subscripts.clone(),
                            flow: clause.flow,
                            variability: clause.variability,
                            causality: clause.causality,
                            modification: applied,
                            class: None,
                            state: InstanceState::Fresh,
                        };
                        declared.push(
                            self.arena
                                .alloc(Some(id), InstanceKind::Component(component)),
                        );
                    }
                }
                ast::Element::ExtendsClause(clause) => {
                    let extends = ExtendsInstance {
                        type_specifier: clause.type_specifier.clone(),
                        modification: clause
                            .modification
                            .as_ref()
                            .map(Modification::from_class_modification)
                            .unwrap_or_default(),
                        annotation_ast: clause.annotation.clone(),
                        class: None,
                        annotations: Vec::new(),
                        state: InstanceState::Fresh,
                    };
                    declared
                        .push(self.arena.alloc(Some(id), InstanceKind::Extends(extends)));
                }
                ast::Element::ImportClause(_)
                | ast::Element::CompoundImportClause(_)
                | ast::Element::UnqualifiedImportClause(_) => {
                    imports.push(element.clone());
                }
            }
        }
        self.arena.class_mut(id).expect("class node").declared = declared.clone();

        // phase 3: extends first
        for element in &declared {
            if self.arena.extends(*element).is_some() {
                self.instantiate_node(*element)?;
            }
        }
        // phase 4: nested class definitions
        for element in &declared {
            if self.arena.class(*element).is_some() {
                self.instantiate_node(*element)?;
            }
        }
        // phase 5: imports
        for import in &imports {
            self.resolve_import(id, import)?;
        }
        // phase 6: components
        for element in &declared {
            if self.arena.component(*element).is_some() {
                self.instantiate_node(*element)?;
            }
        }
        // phase 7: annotations
        if let Some(annotation) = ast.annotation().cloned() {
            let annotations = self.build_annotations(id, &annotation)?;
            self.arena.class_mut(id).expect("class node").annotations = annotations;
        }
        Ok(())
    }

    fn resolve_import(&mut self, scope: InstanceId, import: &ast::Element) -> Result<()> {
        match import {
            ast::Element::ImportClause(clause) => {
                let target = self
                    .resolve_name(scope, &clause.name, true)?
                    .ok_or_else(|| Error::NameNotFound {
                        name: clause.name.as_dotted(),
                        scope: self.arena.display_name(scope),
                    })?;
                let key = clause
                    .alias
                    .as_ref()
                    .map(|t| t.text.clone())
                    .or_else(|| clause.name.last().map(str::to_string))
                    .unwrap_or_default();
                self.arena
                    .class_mut(scope)
                    .expect("class node")
                    .qualified_imports
                    .insert(key, target);
            }
            ast::Element::CompoundImportClause(clause) => {
                let package = self
                    .resolve_name(scope, &clause.name, true)?
                    .ok_or_else(|| Error::NameNotFound {
                        name: clause.name.as_dotted(),
                        scope: self.arena.display_name(scope),
                    })?;
                for short in &clause.imports {
                    let target = self
                        .resolve_simple_name(package, &short.text, false, true)?
                        .ok_or_else(|| Error::NameNotFound {
                            name: format!("{}.{}", clause.name.as_dotted(), short.text),
                            scope: self.arena.display_name(scope),
                        })?;
                    self.arena
                        .class_mut(scope)
                        .expect("class node")
                        .qualified_imports
                        .insert(short.text.clone(), target);
                }
            }
            ast::Element::UnqualifiedImportClause(clause) => {
                let package = self
                    .resolve_name(scope, &clause.name, true)?
                    .ok_or_else(|| Error::NameNotFound {
                        name: clause.name.as_dotted(),
                        scope: self.arena.display_name(scope),
                    })?;
                self.arena
                    .class_mut(scope)
                    .expect("class node")
                    .unqualified_imports
                    .push(package);
            }
            _ => {}
        }
        Ok(())
    }

    fn instantiate_short_class(&mut self, id: InstanceId) -> Result<()> {
        let (ast, applied) = {
            let class = self.arena.class(id).expect("class node");
            (class.ast.clone(), class.modification.clone())
        };
        let Some(ast) = ast else {
            return Ok(());
        };
        let (type_specifier, subscripts, own) = match &ast.specifier {
            ast::ClassSpecifier::Short {
                type_specifier,
                subscripts,
                modification,
                ..
            } => (
                type_specifier.clone(),
                subscripts.clone(),
                modification
                    .as_ref()
                    .map(Modification::from_class_modification)
                    .unwrap_or_default(),
            ),
            ast::ClassSpecifier::Der { type_specifier, .. } => {
                (type_specifier.clone(), Vec::new(), Modification::default())
            }
            _ => return Ok(()),
        };

        let scope = self.arena.parent(id).unwrap_or(id);
        let target = self.resolve_type_specifier(scope, &type_specifier)?;
        if self.arena.class(target).is_none() {
            return Err(Error::TypeMismatch {
                name: type_specifier.name.as_dotted(),
                expected: "a class instance",
                found: self.arena.display_name(target),
            });
        }
        self.instantiate_node(target)?;

        let merged = Modification::merge(&own, &applied);
        let inner = if subscripts.is_empty() {
            self.clone_class(target, merged, Some(id))?
        } else {
            self.specialize_array(target, &subscripts, scope, &merged, Some(id))?
        };
        if let Some(class) = self.arena.class_mut(id) {
            class.variant = ClassVariant::Short {
                target: Some(inner),
            };
        }
        Ok(())
    }

    fn instantiate_enumeration_class(&mut self, id: InstanceId) -> Result<()> {
        let (ast, modification, name) = {
            let class = self.arena.class(id).expect("class node");
            (
                class.ast.clone(),
                class.modification.clone(),
                class.name.clone(),
            )
        };
        let Some(ast) = ast else {
            return Ok(());
        };
        let ast::ClassSpecifier::Enumeration { literals, .. } = &ast.specifier else {
            return Ok(());
        };
        let literals: Vec<EnumerationLiteral> = literals
            .iter()
            .enumerate()
            .map(|(i, l)| EnumerationLiteral {
                name: l.ident.text.clone(),
                ordinal: i as i64 + 1,
            })
            .collect();

        // a modification expression that is a literal of this type selects it
        let value = modification.expression.as_ref().and_then(|expression| {
            let ast::Expression::Ref(cref) = expression else {
                return None;
            };
            let last = cref.last()?;
            let literal = literals.iter().find(|l| l.name == last)?;
            if cref.parts.len() > 1 {
                let qualifier = &cref.parts[cref.parts.len() - 2].ident.text;
                if *qualifier != name {
                    return None;
                }
            }
            Some(literal.clone())
        });

        if let Some(class) = self.arena.class_mut(id) {
            class.variant = ClassVariant::Enumeration { literals, value };
        }
        Ok(())
    }

    /// A clone of an enumeration class carrying `literal` as its value; used
    /// when resolution hits a literal name inside the enumeration.
    pub(crate) fn enumeration_literal_clone(
        &mut self,
        class_id: InstanceId,
        literal: EnumerationLiteral,
    ) -> Result<InstanceId> {
        let clone = self.clone_class(class_id, Modification::default(), Some(class_id))?;
        if let Some(class) = self.arena.class_mut(clone) {
            if let ClassVariant::Enumeration { value, .. } = &mut class.variant {
                *value = Some(literal);
            }
        }
        Ok(clone)
    }

    //-------------------------------------------------------------------------
    // extends and components
    //-------------------------------------------------------------------------

    fn instantiate_extends(&mut self, id: InstanceId) -> Result<()> {
        let (state, type_specifier, clause_modification, annotation_ast) = {
            let extends = self.arena.extends(id).expect("extends node");
            (
                extends.state,
                extends.type_specifier.clone(),
                extends.modification.clone(),
                extends.annotation_ast.clone(),
            )
        };
        match state {
            InstanceState::Instantiated => return Ok(()),
            InstanceState::Instantiating => {
                return Err(Error::CyclicInstantiation {
                    name: self.arena.display_name(id),
                });
            }
            InstanceState::Fresh => {}
        }
        self.arena.extends_mut(id).expect("extends node").state =
            InstanceState::Instantiating;

        let parent = self.arena.parent(id).expect("extends parent");
        let parent_modification = self
            .arena
            .class(parent)
            .map(|c| c.modification.clone())
            .unwrap_or_default();

        let target = self.resolve_type_specifier(parent, &type_specifier)?;
        if self.arena.class(target).is_none() {
            return Err(Error::TypeMismatch {
                name: type_specifier.name.as_dotted(),
                expected: "a class instance",
                found: self.arena.display_name(target),
            });
        }
        // instantiating the target first is what makes `extends` cycles trip
        // the re-entry check
        self.instantiate_node(target)?;

        let merged = Modification::merge(&parent_modification, &clause_modification);
        let clone = self.clone_class(target, merged, Some(id))?;
        self.arena.extends_mut(id).expect("extends node").class = Some(clone);

        if let Some(annotation) = annotation_ast {
            let annotations = self.build_annotations(parent, &annotation)?;
            self.arena.extends_mut(id).expect("extends node").annotations = annotations;
        }
        self.arena.extends_mut(id).expect("extends node").state =
            InstanceState::Instantiated;
        Ok(())
    }

    fn instantiate_component(&mut self, id: InstanceId) -> Result<()> {
        let (state, name, type_specifier, modification, subscripts) = {
            let component = self.arena.component(id).expect("component node");
            (
                component.state,
                component.name.clone(),
                component.type_specifier.clone(),
                component.modification.clone(),
                component.subscripts(),
            )
        };
        match state {
            InstanceState::Instantiated => return Ok(()),
            InstanceState::Instantiating => {
                return Err(Error::CyclicInstantiation { name });
            }
            InstanceState::Fresh => {}
        }
        log::debug!("instantiating component {}", name);
        self.arena.component_mut(id).expect("component node").state =
            InstanceState::Instantiating;

        let scope = self.arena.parent(id).expect("component parent");
        let target = self.resolve_type_specifier(scope, &type_specifier)?;
        if self.arena.class(target).is_none() {
            return Err(Error::TypeMismatch {
                name: format!("{} ({})", name, type_specifier.name.as_dotted()),
                expected: "a class instance",
                found: self.arena.display_name(target),
            });
        }
        self.instantiate_node(target)?;

        let class = if subscripts.is_empty() {
            self.clone_class(target, modification, Some(id))?
        } else {
            self.specialize_array(target, &subscripts, scope, &modification, Some(id))?
        };
        self.arena.component_mut(id).expect("component node").class = Some(class);
        self.arena.component_mut(id).expect("component node").state =
            InstanceState::Instantiated;
        Ok(())
    }

    //-------------------------------------------------------------------------
    // cloning
    //-------------------------------------------------------------------------

    /// Builds a fresh instance of `src` specialised by
    /// `merge(src.modification, modification)` and instantiates it.
    ///
    /// The clone keeps the lexical parent of `src`; `owner` records the
    /// ownership edge (the extends, component, or array node holding it).
    pub(crate) fn clone_class(
        &mut self,
        src: InstanceId,
        modification: Modification,
        owner: Option<InstanceId>,
    ) -> Result<InstanceId> {
        enum CloneShape {
            Plain(ClassVariant),
            Predefined(crate::instance::PredefinedType),
            Array {
                element: Option<InstanceId>,
                shape: Vec<i64>,
                elements: Vec<InstanceId>,
            },
        }
        let (name, ast, src_modification, classification, is_encapsulated, parent, shape) = {
            let Some(class) = self.arena.class(src) else {
                return Err(Error::TypeMismatch {
                    name: self.arena.display_name(src),
                    expected: "a class instance",
                    found: self.arena.display_name(src),
                });
            };
            let shape = match &class.variant {
                ClassVariant::Normal => CloneShape::Plain(ClassVariant::Normal),
                ClassVariant::Short { .. } => {
                    CloneShape::Plain(ClassVariant::Short { target: None })
                }
                ClassVariant::Enumeration { .. } => {
                    CloneShape::Plain(ClassVariant::Enumeration {
                        literals: Vec::new(),
                        value: None,
                    })
                }
                ClassVariant::Predefined { kind } => CloneShape::Predefined(*kind),
                ClassVariant::Array {
                    element,
                    shape,
                    elements,
                } => CloneShape::Array {
                    element: *element,
                    shape: shape.clone(),
                    elements: elements.clone(),
                },
            };
            (
                class.name.clone(),
                class.ast.clone(),
                class.modification.clone(),
                class.classification,
                class.is_encapsulated,
                self.arena.parent(src),
                shape,
            )
        };
        let merged = Modification::merge(&src_modification, &modification);

        match shape {
            CloneShape::Predefined(kind) => {
                let id = self.arena.alloc(
                    parent,
                    InstanceKind::Class(ClassInstance {
                        name,
                        modification: merged,
                        classification,
                        state: InstanceState::Instantiated,
                        variant: ClassVariant::Predefined { kind },
                        ..Default::default()
                    }),
                );
                self.arena.set_owner(id, owner);
                Ok(id)
            }
            CloneShape::Plain(variant) => {
                let id = self.arena.alloc(
                    parent,
                    InstanceKind::Class(ClassInstance {
                        name,
                        ast,
                        modification: merged,
                        classification,
                        is_encapsulated,
                        state: InstanceState::Fresh,
                        variant,
                        ..Default::default()
                    }),
                );
                self.arena.set_owner(id, owner);
                self.instantiate_node(id)?;
                Ok(id)
            }
            CloneShape::Array {
                element,
                shape,
                elements,
            } => {
                let id = self.arena.alloc(
                    parent,
                    InstanceKind::Class(ClassInstance {
                        name,
                        modification: merged,
                        classification,
                        state: InstanceState::Instantiated,
                        variant: ClassVariant::Array {
                            element,
                            shape,
                            elements: Vec::new(),
                        },
                        ..Default::default()
                    }),
                );
                self.arena.set_owner(id, owner);
                let n = elements.len();
                let mut cloned = Vec::with_capacity(n);
                for (i, element) in elements.into_iter().enumerate() {
                    let slice = modification.split_slice(n.max(1), i);
                    cloned.push(self.clone_class(element, slice, Some(id))?);
                }
                if let Some(class) = self.arena.class_mut(id) {
                    if let ClassVariant::Array { elements, .. } = &mut class.variant {
                        *elements = cloned;
                    }
                }
                Ok(id)
            }
        }
    }
}

/// The applied modification of one component declaration: the enclosing
/// class's argument for this component leads, the declaration's own
/// element modifications follow, and on a name clash the outer side wins.
/// The modification expression falls back from outer to the declaration.
fn merge_component_modification(
    enclosing: &Modification,
    declaration: &ast::ComponentDeclaration,
) -> Modification {
    let outer = enclosing.extract(&declaration.ident.text);
    let own = declaration
        .modification
        .as_ref()
        .map(Modification::from_ast)
        .unwrap_or_default();
    let mut arguments = outer.arguments.clone();
    for argument in &own.arguments {
        if !arguments
            .iter()
            .any(|a| a.head_name() == argument.head_name())
        {
            arguments.push(argument.clone());
        }
    }
    Modification {
        arguments,
        expression: outer.expression.clone().or(own.expression),
        description: outer.description.clone().or(own.description),
        value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_stored_definition;

    fn declaration(source: &str) -> ast::ComponentDeclaration {
        let def = parse_stored_definition(source, "t.mo").unwrap();
        let ast::Element::ComponentClause(clause) = def.classes[0].elements().next().unwrap()
        else {
            panic!("expected a component clause");
        };
        clause.declarations[0].clone()
    }

    #[test]
    fn test_merge_component_modification_outer_wins() {
        let decl = declaration("model M\n  Real x(start = 1, min = 0);\nend M;");
        let enclosing =
            Modification::from_ast(&declaration("model M\n  A a(x(start = 2));\nend M;")
                .modification
                .unwrap());
        let applied = merge_component_modification(&enclosing, &decl);
        let heads: Vec<_> = applied.arguments.iter().map(|a| a.head_name()).collect();
        assert_eq!(heads, vec!["start", "min"]);
        assert_eq!(
            applied
                .argument("start")
                .unwrap()
                .expression()
                .unwrap()
                .integer_value(),
            Some(2)
        );
    }

    #[test]
    fn test_merge_component_modification_expression_fallback() {
        let decl = declaration("model M\n  Real x = 5;\nend M;");
        let applied = merge_component_modification(&Modification::default(), &decl);
        assert_eq!(applied.expression.as_ref().unwrap().integer_value(), Some(5));

        let enclosing =
            Modification::from_ast(&declaration("model M\n  A a(x = 7);\nend M;")
                .modification
                .unwrap());
        let applied = merge_component_modification(&enclosing, &decl);
        assert_eq!(applied.expression.as_ref().unwrap().integer_value(), Some(7));
    }
}
