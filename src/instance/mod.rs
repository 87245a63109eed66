//! The instance tree: entities, class instances, components, and the arena
//! that owns them.
//!
//! Every node lives in an [`InstanceArena`] and is addressed by a copyable
//! [`InstanceId`]. Ownership edges (entity children, declared elements, the
//! class owned by a component or extends node, array element clones) form a
//! tree; `parent` links are non-owning back-references used for scope
//! walking. A clone keeps the *lexical* parent of the class it was cloned
//! from, so names in its body resolve where the class was written, not where
//! it is used.

pub mod annotation;
pub mod array;
pub mod instantiate;
pub mod predefined;
pub mod printer;
pub mod scope;

use crate::modification::Modification;
use crate::syntax::ast;
use std::fmt;
use std::rc::Rc;

pub use predefined::PredefinedType;

/// Stable handle of one instance-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub(crate) u32);

impl InstanceId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an instantiable node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    #[default]
    Fresh,
    Instantiating,
    Instantiated,
}

/// One annotation resolved against the annotation schema.
#[derive(Debug, Clone)]
pub struct NamedAnnotation {
    pub name: String,
    pub instance: InstanceId,
}

/// A literal of an instantiated enumeration class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationLiteral {
    pub name: String,
    /// 1-based ordinal in declaration order.
    pub ordinal: i64,
}

impl EnumerationLiteral {
    pub fn string_value(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> i64 {
        self.ordinal
    }
}

/// Variant-specific payload of a class instance.
#[derive(Debug, Default, Clone)]
pub enum ClassVariant {
    #[default]
    Normal,
    /// A one-liner alias class; delegates to its specialised target.
    Short { target: Option<InstanceId> },
    Enumeration {
        literals: Vec<EnumerationLiteral>,
        value: Option<EnumerationLiteral>,
    },
    /// An array specialisation of an element class.
    Array {
        element: Option<InstanceId>,
        /// Per-dimension extents; `-1` marks a flexible or unknown dimension.
        shape: Vec<i64>,
        elements: Vec<InstanceId>,
    },
    Predefined { kind: PredefinedType },
}

/// A specialised class: the central instance-tree node.
#[derive(Debug, Default, Clone)]
pub struct ClassInstance {
    pub name: String,
    /// Cached originating AST; clones share it.
    pub ast: Option<Rc<ast::ClassDefinition>>,
    /// The applied (merged) modification.
    pub modification: Modification,
    pub classification: ast::ClassKind,
    pub is_encapsulated: bool,
    pub declared: Vec<InstanceId>,
    pub qualified_imports: indexmap::IndexMap<String, InstanceId>,
    pub unqualified_imports: Vec<InstanceId>,
    pub annotations: Vec<NamedAnnotation>,
    pub state: InstanceState,
    pub variant: ClassVariant,
}

/// An inherited sub-class; owns a clone of its target specialised by the
/// merged modification.
#[derive(Debug, Clone)]
pub struct ExtendsInstance {
    pub type_specifier: ast::TypeSpecifier,
    /// The clause's own modification, before merging.
    pub modification: Modification,
    pub annotation_ast: Option<ast::ClassModification>,
    pub class: Option<InstanceId>,
    pub annotations: Vec<NamedAnnotation>,
    pub state: InstanceState,
}

/// A named component; owns its specialised class instance.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    pub name: String,
    /// Cached declaration AST.
    pub declaration: Rc<ast::ComponentDeclaration>,
    pub type_specifier: ast::TypeSpecifier,
    /// Clause-level array dimensions shared by the whole clause.
    pub clause_subscripts: Vec<ast::Subscript>,
    pub flow: ast::Flow,
    pub variability: ast::Variability,
    pub causality: ast::Causality,
    /// The applied (merged) modification.
    pub modification: Modification,
    pub class: Option<InstanceId>,
    pub state: InstanceState,
}

impl ComponentInstance {
    /// Clause subscripts followed by declaration subscripts.
    pub fn subscripts(&self) -> Vec<ast::Subscript> {
        let mut subscripts = self.clause_subscripts.clone();
        subscripts.extend(self.declaration.subscripts.iter().cloned());
        subscripts
    }
}

/// A package or file on disk.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    /// Absolute, filesystem-normalised path.
    pub path: String,
    /// True for the single-file form, false for the directory form.
    pub unstructured: bool,
    pub class: Option<InstanceId>,
    pub children: Vec<InstanceId>,
}

#[derive(Debug, Clone)]
pub enum InstanceKind {
    Entity(Entity),
    Class(ClassInstance),
    Extends(ExtendsInstance),
    Component(ComponentInstance),
}

/// One arena slot.
///
/// `parent` is the lexical scope used for name resolution; `owner` points to
/// the node holding the ownership edge. The two differ for clones, which keep
/// the lexical parent of their source class but are owned at the use site.
#[derive(Debug, Clone)]
pub struct Instance {
    pub parent: Option<InstanceId>,
    pub owner: Option<InstanceId>,
    pub kind: InstanceKind,
}

/// Owning store of every instance-tree node of one library.
#[derive(Debug, Default)]
pub struct InstanceArena {
    nodes: Vec<Instance>,
}

impl InstanceArena {
    pub fn new() -> Self {
        InstanceArena::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, parent: Option<InstanceId>, kind: InstanceKind) -> InstanceId {
        let id = InstanceId(self.nodes.len() as u32);
        self.nodes.push(Instance {
            parent,
            owner: parent,
            kind,
        });
        id
    }

    pub fn get(&self, id: InstanceId) -> &Instance {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.nodes[id.index()]
    }

    pub fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.get(id).parent
    }

    pub fn owner(&self, id: InstanceId) -> Option<InstanceId> {
        self.get(id).owner
    }

    pub fn set_owner(&mut self, id: InstanceId, owner: Option<InstanceId>) {
        self.get_mut(id).owner = owner;
    }

    pub fn class(&self, id: InstanceId) -> Option<&ClassInstance> {
        match &self.get(id).kind {
            InstanceKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, id: InstanceId) -> Option<&mut ClassInstance> {
        match &mut self.get_mut(id).kind {
            InstanceKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn component(&self, id: InstanceId) -> Option<&ComponentInstance> {
        match &self.get(id).kind {
            InstanceKind::Component(component) => Some(component),
            _ => None,
        }
    }

    pub fn component_mut(&mut self, id: InstanceId) -> Option<&mut ComponentInstance> {
        match &mut self.get_mut(id).kind {
            InstanceKind::Component(component) => Some(component),
            _ => None,
        }
    }

    pub fn extends(&self, id: InstanceId) -> Option<&ExtendsInstance> {
        match &self.get(id).kind {
            InstanceKind::Extends(extends) => Some(extends),
            _ => None,
        }
    }

    pub fn extends_mut(&mut self, id: InstanceId) -> Option<&mut ExtendsInstance> {
        match &mut self.get_mut(id).kind {
            InstanceKind::Extends(extends) => Some(extends),
            _ => None,
        }
    }

    pub fn entity(&self, id: InstanceId) -> Option<&Entity> {
        match &self.get(id).kind {
            InstanceKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self, id: InstanceId) -> Option<&mut Entity> {
        match &mut self.get_mut(id).kind {
            InstanceKind::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Human-readable name of a node, for diagnostics.
    pub fn display_name(&self, id: InstanceId) -> String {
        match &self.get(id).kind {
            InstanceKind::Entity(entity) => entity.name.clone(),
            InstanceKind::Class(class) => class.name.clone(),
            InstanceKind::Component(component) => component.name.clone(),
            InstanceKind::Extends(extends) => {
                format!("extends {}", extends.type_specifier)
            }
        }
    }

    /// Ownership children of a node, in declaration order.
    pub fn owned_children(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut children = Vec::new();
        match &self.get(id).kind {
            InstanceKind::Entity(entity) => {
                children.extend(entity.class);
                children.extend(entity.children.iter().copied());
            }
            InstanceKind::Class(class) => {
                children.extend(class.declared.iter().copied());
                children.extend(class.annotations.iter().map(|a| a.instance));
                match &class.variant {
                    ClassVariant::Short { target } => children.extend(*target),
                    ClassVariant::Array { elements, .. } => {
                        children.extend(elements.iter().copied())
                    }
                    _ => {}
                }
            }
            InstanceKind::Extends(extends) => {
                children.extend(extends.class);
                children.extend(extends.annotations.iter().map(|a| a.instance));
            }
            InstanceKind::Component(component) => children.extend(component.class),
        }
        children
    }

    /// All nodes reachable from `root` over ownership edges, preorder.
    pub fn walk(&self, root: InstanceId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut children = self.owned_children(id);
            children.reverse();
            stack.extend(children);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_alloc_and_walk() {
        let mut arena = InstanceArena::new();
        let root = arena.alloc(
            None,
            InstanceKind::Entity(Entity {
                name: "P".to_string(),
                path: "/P".to_string(),
                unstructured: false,
                class: None,
                children: Vec::new(),
            }),
        );
        let class = arena.alloc(
            Some(root),
            InstanceKind::Class(ClassInstance {
                name: "P".to_string(),
                ..Default::default()
            }),
        );
        arena.entity_mut(root).unwrap().class = Some(class);

        assert_eq!(arena.parent(class), Some(root));
        assert_eq!(arena.walk(root), vec![root, class]);
        assert_eq!(arena.display_name(class), "P");
        assert!(arena.class(root).is_none());
        assert!(arena.entity(root).is_some());
    }

    #[test]
    fn test_enumeration_literal_accessors() {
        let literal = EnumerationLiteral {
            name: "Green".to_string(),
            ordinal: 2,
        };
        assert_eq!(literal.string_value(), "Green");
        assert_eq!(literal.ordinal(), 2);
    }
}
