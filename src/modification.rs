//! The modification algebra: normalised modification values with
//! merge, lookup, extract, and split operations.
//!
//! A [`Modification`] has four slots: the argument list, the `= expr`
//! modification-expression syntax node, an optional description, and a cached
//! evaluated value that the engine fills lazily on first access. Merging is
//! associative but not commutative; `merge(m, empty) == merge(empty, m) == m`.

use crate::eval::Value;
use crate::syntax::ast;
use crate::syntax::printer::format_expression;
use std::fmt::{self, Display};

/// A single identifier bound to an expression, with no nested arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterModification {
    pub name: String,
    pub expression: ast::Expression,
}

/// A dotted name with nested arguments and an optional bound expression.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ElementModification {
    pub name: ast::Name,
    pub each: bool,
    pub is_final: bool,
    pub arguments: Vec<ModificationArgument>,
    pub expression: Option<ast::Expression>,
    pub description: Option<ast::Description>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModificationArgument {
    Element(ElementModification),
    Parameter(ParameterModification),
}

impl ModificationArgument {
    /// First component of the argument's name.
    pub fn head_name(&self) -> &str {
        match self {
            ModificationArgument::Element(em) => em.name.head().unwrap_or(""),
            ModificationArgument::Parameter(pm) => pm.name.as_str(),
        }
    }

    pub fn expression(&self) -> Option<&ast::Expression> {
        match self {
            ModificationArgument::Element(em) => em.expression.as_ref(),
            ModificationArgument::Parameter(pm) => Some(&pm.expression),
        }
    }

    /// Peels the head off the argument's name.
    ///
    /// A name of depth > 1 yields a single element modification keyed on the
    /// tail; a name of depth 1 yields the nested arguments directly.
    pub fn extract(&self) -> Vec<ModificationArgument> {
        match self {
            ModificationArgument::Element(em) => {
                if em.name.len() > 1 {
                    vec![ModificationArgument::Element(ElementModification {
                        name: em.name.tail(),
                        each: em.each,
                        is_final: em.is_final,
                        arguments: em.arguments.clone(),
                        expression: em.expression.clone(),
                        description: em.description.clone(),
                    })]
                } else {
                    em.arguments.clone()
                }
            }
            ModificationArgument::Parameter(_) => Vec::new(),
        }
    }

    /// The `i`-th of `n` slices for array-element specialisation.
    ///
    /// Arguments flagged `each` apply to every element verbatim.
    pub fn split(&self, n: usize, i: usize) -> ModificationArgument {
        match self {
            ModificationArgument::Element(em) => {
                if em.each {
                    return self.clone();
                }
                ModificationArgument::Element(ElementModification {
                    name: em.name.clone(),
                    each: false,
                    is_final: em.is_final,
                    arguments: em.arguments.iter().map(|a| a.split(n, i)).collect(),
                    expression: em.expression.as_ref().map(|e| e.split(n, i)),
                    description: em.description.clone(),
                })
            }
            ModificationArgument::Parameter(pm) => {
                ModificationArgument::Parameter(ParameterModification {
                    name: pm.name.clone(),
                    expression: pm.expression.split(n, i),
                })
            }
        }
    }

    fn from_ast(argument: &ast::ModificationArgument) -> Option<ModificationArgument> {
        match argument {
            ast::ModificationArgument::ElementModification {
                each,
                is_final,
                name,
                modification,
                description,
            } => {
                let (arguments, expression) = match modification {
                    Some(m) => (
                        m.class_modification
                            .as_ref()
                            .map(|cm| {
                                cm.arguments
                                    .iter()
                                    .filter_map(ModificationArgument::from_ast)
                                    .collect()
                            })
                            .unwrap_or_default(),
                        m.expression.clone(),
                    ),
                    None => (Vec::new(), None),
                };
                Some(ModificationArgument::Element(ElementModification {
                    name: name.clone(),
                    each: *each,
                    is_final: *is_final,
                    arguments,
                    expression,
                    description: if description.is_empty() {
                        None
                    } else {
                        Some(description.clone())
                    },
                }))
            }
            ast::ModificationArgument::ElementRedeclaration { .. } => {
                // redeclarations carry no modification value
                log::debug!("dropping element redeclaration from modification");
                None
            }
        }
    }
}

impl Display for ModificationArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationArgument::Element(em) => {
                if em.each {
                    write!(f, "each ")?;
                }
                if em.is_final {
                    write!(f, "final ")?;
                }
                write!(f, "{}", em.name)?;
                if !em.arguments.is_empty() {
                    let inner: Vec<_> = em.arguments.iter().map(|a| a.to_string()).collect();
                    write!(f, "({})", inner.join(", "))?;
                }
                if let Some(expression) = &em.expression {
                    write!(f, " = {}", format_expression(expression))?;
                }
                Ok(())
            }
            ModificationArgument::Parameter(pm) => {
                write!(f, "{} = {}", pm.name, format_expression(&pm.expression))
            }
        }
    }
}

/// A normalised modification.
#[derive(Debug, Default, Clone)]
pub struct Modification {
    pub arguments: Vec<ModificationArgument>,
    /// The `= expr` (or `:= expr`) syntax node.
    pub expression: Option<ast::Expression>,
    pub description: Option<ast::Description>,
    /// Evaluated form of `expression`, filled lazily by the engine.
    pub value: Option<Value>,
}

// the cached value is derived state and does not take part in equality
impl PartialEq for Modification {
    fn eq(&self, other: &Self) -> bool {
        self.arguments == other.arguments
            && self.expression == other.expression
            && self.description == other.description
    }
}

impl Modification {
    pub fn new(arguments: Vec<ModificationArgument>, expression: Option<ast::Expression>) -> Self {
        Modification {
            arguments,
            expression,
            description: None,
            value: None,
        }
    }

    /// A modification binding just `= expression`.
    pub fn from_expression(expression: ast::Expression) -> Self {
        Modification::new(Vec::new(), Some(expression))
    }

    /// A single-argument modification `name = expression`.
    pub fn parameter(name: impl Into<String>, expression: ast::Expression) -> Self {
        Modification::new(
            vec![ModificationArgument::Parameter(ParameterModification {
                name: name.into(),
                expression,
            })],
            None,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty() && self.expression.is_none()
    }

    /// Normalises an AST modification.
    pub fn from_ast(modification: &ast::Modification) -> Self {
        let arguments = modification
            .class_modification
            .as_ref()
            .map(|cm| {
                cm.arguments
                    .iter()
                    .filter_map(ModificationArgument::from_ast)
                    .collect()
            })
            .unwrap_or_default();
        Modification::new(arguments, modification.expression.clone())
    }

    /// Normalises a bare class modification (also used for annotations).
    pub fn from_class_modification(class_modification: &ast::ClassModification) -> Self {
        Modification::new(
            class_modification
                .arguments
                .iter()
                .filter_map(ModificationArgument::from_ast)
                .collect(),
            None,
        )
    }

    /// First argument whose head name equals `name`.
    pub fn argument(&self, name: &str) -> Option<&ModificationArgument> {
        self.arguments.iter().find(|a| a.head_name() == name)
    }

    /// The sub-modification that applies to the element `name`.
    ///
    /// Returns the empty modification when no argument matches.
    pub fn extract(&self, name: &str) -> Modification {
        match self.argument(name) {
            Some(argument) => {
                let deep = matches!(
                    argument,
                    ModificationArgument::Element(em) if em.name.len() > 1
                );
                let arguments = argument.extract();
                let expression = if deep {
                    None
                } else {
                    argument.expression().cloned()
                };
                let description = match argument {
                    ModificationArgument::Element(em) if !deep => em.description.clone(),
                    _ => None,
                };
                Modification {
                    arguments,
                    expression,
                    description,
                    value: None,
                }
            }
            None => Modification::default(),
        }
    }

    /// Merges `outer` with `overriding`.
    ///
    /// The result starts with the overriding arguments; every outer argument
    /// whose name is absent from the overriding side is prepended, preserving
    /// outer-before-inner order. Description and expression fall back from
    /// overriding to outer.
    pub fn merge(outer: &Modification, overriding: &Modification) -> Modification {
        let mut arguments: Vec<ModificationArgument> = outer
            .arguments
            .iter()
            .filter(|a| {
                !overriding
                    .arguments
                    .iter()
                    .any(|o| o.head_name() == a.head_name())
            })
            .cloned()
            .collect();
        arguments.extend(overriding.arguments.iter().cloned());
        Modification {
            arguments,
            expression: overriding
                .expression
                .clone()
                .or_else(|| outer.expression.clone()),
            description: overriding
                .description
                .clone()
                .or_else(|| outer.description.clone()),
            value: None,
        }
    }

    /// All `n` slices for array-element specialisation.
    pub fn split(&self, n: usize) -> Vec<Modification> {
        (0..n).map(|i| self.split_slice(n, i)).collect()
    }

    /// The `i`-th of `n` slices.
    pub fn split_slice(&self, n: usize, i: usize) -> Modification {
        Modification {
            arguments: self.arguments.iter().map(|a| a.split(n, i)).collect(),
            expression: self.expression.as_ref().map(|e| e.split(n, i)),
            description: self.description.clone(),
            value: None,
        }
    }
}

impl Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.arguments.is_empty() {
            let inner: Vec<_> = self.arguments.iter().map(|a| a.to_string()).collect();
            write!(f, "({})", inner.join(", "))?;
        }
        if let Some(expression) = &self.expression {
            write!(f, " = {}", format_expression(expression))?;
        }
        Ok(())
    }
}

/// Builds the normalised form of an AST modification argument, for callers
/// that hold one outside a class modification.
pub fn argument_from_ast(argument: &ast::ModificationArgument) -> Option<ModificationArgument> {
    ModificationArgument::from_ast(argument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_stored_definition;
    use crate::syntax::ast::{Element, Expression};

    /// The normalised modification of the first declaration in `source`.
    fn first_modification(source: &str) -> Modification {
        let def = parse_stored_definition(source, "t.mo").unwrap();
        let Element::ComponentClause(clause) = def.classes[0].elements().next().unwrap() else {
            panic!("expected a component clause");
        };
        Modification::from_ast(clause.declarations[0].modification.as_ref().unwrap())
    }

    #[test]
    fn test_from_ast() {
        let m = first_modification("model M\n  Real x(start = 1, fixed = true) = 2;\nend M;");
        assert_eq!(m.arguments.len(), 2);
        assert_eq!(m.arguments[0].head_name(), "start");
        assert_eq!(m.expression.as_ref().unwrap().integer_value(), Some(2));
    }

    #[test]
    fn test_lookup_first_wins() {
        let m = first_modification("model M\n  Real x(start = 1, start = 2);\nend M;");
        let argument = m.argument("start").unwrap();
        assert_eq!(argument.expression().unwrap().integer_value(), Some(1));
    }

    #[test]
    fn test_extract_shallow() {
        let m = first_modification("model M\n  A a(x(start = 1) = 5);\nend M;");
        let x = m.extract("x");
        assert_eq!(x.arguments.len(), 1);
        assert_eq!(x.arguments[0].head_name(), "start");
        assert_eq!(x.expression.as_ref().unwrap().integer_value(), Some(5));
        assert!(m.extract("missing").is_empty());
    }

    #[test]
    fn test_extract_deep_name() {
        let m = first_modification("model M\n  A a(x.start = 2);\nend M;");
        let x = m.extract("x");
        assert_eq!(x.arguments.len(), 1);
        assert_eq!(x.arguments[0].head_name(), "start");
        assert!(x.expression.is_none());
        let start = x.extract("start");
        assert_eq!(start.expression.as_ref().unwrap().integer_value(), Some(2));
    }

    #[test]
    fn test_merge_identity() {
        let m = first_modification("model M\n  Real x(start = 1) = 2;\nend M;");
        let empty = Modification::default();
        assert_eq!(Modification::merge(&m, &empty), m);
        assert_eq!(Modification::merge(&empty, &m), m);
    }

    #[test]
    fn test_merge_overriding_wins() {
        let outer = first_modification("model M\n  Real x(start = 1, min = 0);\nend M;");
        let overriding = first_modification("model M\n  Real x(start = 2);\nend M;");
        let merged = Modification::merge(&outer, &overriding);
        // outer-only `min` is prepended, overriding `start` survives
        let heads: Vec<_> = merged.arguments.iter().map(|a| a.head_name()).collect();
        assert_eq!(heads, vec!["min", "start"]);
        assert_eq!(
            merged.argument("start").unwrap().expression().unwrap().integer_value(),
            Some(2)
        );
    }

    #[test]
    fn test_merge_associative() {
        let a = first_modification("model M\n  Real x(p = 1, q = 2);\nend M;");
        let b = first_modification("model M\n  Real x(q = 3, r = 4) = 7;\nend M;");
        let c = first_modification("model M\n  Real x(r = 5);\nend M;");
        let left = Modification::merge(&Modification::merge(&a, &b), &c);
        let right = Modification::merge(&a, &Modification::merge(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn test_split_scalar_distributes() {
        let m = first_modification("model M\n  Real x(start = 1) = 3;\nend M;");
        let slices = m.split(3);
        assert_eq!(slices.len(), 3);
        for slice in &slices {
            assert_eq!(slice.expression.as_ref().unwrap().integer_value(), Some(3));
            assert_eq!(
                slice.argument("start").unwrap().expression().unwrap().integer_value(),
                Some(1)
            );
        }
    }

    #[test]
    fn test_split_array_expression() {
        let m = first_modification("model M\n  Real v(start = {4, 5, 6}) = {1, 2, 3};\nend M;");
        for i in 0..3 {
            let slice = m.split_slice(3, i);
            assert_eq!(
                slice.expression.as_ref().unwrap().integer_value(),
                Some(i as i64 + 1)
            );
            assert_eq!(
                slice.argument("start").unwrap().expression().unwrap().integer_value(),
                Some(i as i64 + 4)
            );
        }
    }

    #[test]
    fn test_split_each_is_verbatim() {
        let m = first_modification("model M\n  Real v(each start = {1, 2});\nend M;");
        let slice = m.split_slice(2, 1);
        let start = slice.argument("start").unwrap();
        // the whole array expression survives under `each`
        assert!(matches!(
            start.expression().unwrap(),
            Expression::Array { .. }
        ));
    }

    #[test]
    fn test_display() {
        let m = first_modification("model M\n  Real x(start = 1) = 2;\nend M;");
        assert_eq!(m.to_string(), "(start = 1) = 2");
    }
}
