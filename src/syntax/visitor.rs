//! Visitor traits for traversing the abstract syntax tree.
//!
//! `Visitor` provides no-op `enter_*`/`exit_*` hooks that concrete visitors
//! override; `Visitable::accept` drives the recursion, entering a node,
//! visiting its children, and exiting it.

use crate::syntax::ast;

#[allow(unused)]
pub trait Visitor<'a> {
    fn enter_stored_definition(&mut self, _node: &'a ast::StoredDefinition) {}
    fn exit_stored_definition(&mut self, _node: &'a ast::StoredDefinition) {}

    fn enter_class_definition(&mut self, _node: &'a ast::ClassDefinition) {}
    fn exit_class_definition(&mut self, _node: &'a ast::ClassDefinition) {}

    fn enter_element(&mut self, _node: &'a ast::Element) {}
    fn exit_element(&mut self, _node: &'a ast::Element) {}

    fn enter_equation(&mut self, _node: &'a ast::Equation) {}
    fn exit_equation(&mut self, _node: &'a ast::Equation) {}

    fn enter_statement(&mut self, _node: &'a ast::Statement) {}
    fn exit_statement(&mut self, _node: &'a ast::Statement) {}

    fn enter_expression(&mut self, _node: &'a ast::Expression) {}
    fn exit_expression(&mut self, _node: &'a ast::Expression) {}

    fn enter_component_reference(&mut self, _node: &'a ast::ComponentReference) {}
    fn exit_component_reference(&mut self, _node: &'a ast::ComponentReference) {}
}

pub trait Visitable {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V);
}

impl Visitable for ast::StoredDefinition {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_stored_definition(self);
        for class in &self.classes {
            class.accept(visitor);
        }
        visitor.exit_stored_definition(self);
    }
}

impl Visitable for ast::ClassDefinition {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_class_definition(self);
        for section in self.sections() {
            match section {
                ast::Section::Element { elements, .. } => {
                    for element in elements {
                        element.accept(visitor);
                    }
                }
                ast::Section::Equation { equations, .. } => {
                    for equation in equations {
                        equation.accept(visitor);
                    }
                }
                ast::Section::Algorithm { statements, .. } => {
                    for statement in statements {
                        statement.accept(visitor);
                    }
                }
            }
        }
        visitor.exit_class_definition(self);
    }
}

impl Visitable for ast::Element {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_element(self);
        match self {
            ast::Element::ClassDefinition(class) => class.accept(visitor),
            ast::Element::ComponentClause(clause) => {
                for declaration in &clause.declarations {
                    if let Some(modification) = &declaration.modification {
                        if let Some(expression) = &modification.expression {
                            expression.accept(visitor);
                        }
                    }
                    if let Some(condition) = &declaration.condition {
                        condition.accept(visitor);
                    }
                }
            }
            ast::Element::ExtendsClause(_)
            | ast::Element::ImportClause(_)
            | ast::Element::CompoundImportClause(_)
            | ast::Element::UnqualifiedImportClause(_) => {}
        }
        visitor.exit_element(self);
    }
}

impl Visitable for ast::Equation {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_equation(self);
        match self {
            ast::Equation::Simple { lhs, rhs } => {
                lhs.accept(visitor);
                rhs.accept(visitor);
            }
            ast::Equation::Connect { lhs, rhs } => {
                lhs.accept(visitor);
                rhs.accept(visitor);
            }
            ast::Equation::For { indices, equations } => {
                for index in indices {
                    if let Some(range) = &index.range {
                        range.accept(visitor);
                    }
                }
                for equation in equations {
                    equation.accept(visitor);
                }
            }
            ast::Equation::If {
                branches,
                else_equations,
            } => {
                for branch in branches {
                    branch.condition.accept(visitor);
                    for equation in &branch.equations {
                        equation.accept(visitor);
                    }
                }
                for equation in else_equations {
                    equation.accept(visitor);
                }
            }
            ast::Equation::When { branches } => {
                for branch in branches {
                    branch.condition.accept(visitor);
                    for equation in &branch.equations {
                        equation.accept(visitor);
                    }
                }
            }
            ast::Equation::Call { callee, args } => {
                callee.accept(visitor);
                for arg in args {
                    arg.value.accept(visitor);
                }
            }
        }
        visitor.exit_equation(self);
    }
}

impl Visitable for ast::Statement {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_statement(self);
        match self {
            ast::Statement::Assignment { target, value } => {
                target.accept(visitor);
                value.accept(visitor);
            }
            ast::Statement::Call { callee, args } => {
                callee.accept(visitor);
                for arg in args {
                    arg.value.accept(visitor);
                }
            }
            ast::Statement::If {
                branches,
                else_statements,
            } => {
                for branch in branches {
                    branch.condition.accept(visitor);
                    for statement in &branch.statements {
                        statement.accept(visitor);
                    }
                }
                for statement in else_statements {
                    statement.accept(visitor);
                }
            }
            ast::Statement::For {
                indices,
                statements,
            } => {
                for index in indices {
                    if let Some(range) = &index.range {
                        range.accept(visitor);
                    }
                }
                for statement in statements {
                    statement.accept(visitor);
                }
            }
            ast::Statement::While {
                condition,
                statements,
            } => {
                condition.accept(visitor);
                for statement in statements {
                    statement.accept(visitor);
                }
            }
            ast::Statement::When { branches } => {
                for branch in branches {
                    branch.condition.accept(visitor);
                    for statement in &branch.statements {
                        statement.accept(visitor);
                    }
                }
            }
            ast::Statement::Return | ast::Statement::Break => {}
        }
        visitor.exit_statement(self);
    }
}

impl Visitable for ast::Expression {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_expression(self);
        match self {
            ast::Expression::Binary { lhs, rhs, .. } => {
                lhs.accept(visitor);
                rhs.accept(visitor);
            }
            ast::Expression::Unary { operand, .. } => operand.accept(visitor),
            ast::Expression::Range { start, step, end } => {
                start.accept(visitor);
                if let Some(step) = step {
                    step.accept(visitor);
                }
                end.accept(visitor);
            }
            ast::Expression::If {
                branches,
                else_expression,
            } => {
                for branch in branches {
                    branch.condition.accept(visitor);
                    branch.then.accept(visitor);
                }
                else_expression.accept(visitor);
            }
            ast::Expression::Call { callee, args } => {
                callee.accept(visitor);
                for arg in args {
                    arg.value.accept(visitor);
                }
            }
            ast::Expression::Array { elements } => {
                for element in elements {
                    element.accept(visitor);
                }
            }
            ast::Expression::Matrix { rows } => {
                for row in rows {
                    for element in row {
                        element.accept(visitor);
                    }
                }
            }
            ast::Expression::Ref(cref) => cref.accept(visitor),
            ast::Expression::Integer { .. }
            | ast::Expression::Real { .. }
            | ast::Expression::Str { .. }
            | ast::Expression::Boolean { .. }
            | ast::Expression::End => {}
        }
        visitor.exit_expression(self);
    }
}

impl Visitable for ast::ComponentReference {
    fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) {
        visitor.enter_component_reference(self);
        for part in &self.parts {
            for subscript in &part.subscripts {
                if let ast::Subscript::Expression { expression } = subscript {
                    expression.accept(visitor);
                }
            }
        }
        visitor.exit_component_reference(self);
    }
}

/// Collects every component reference in an expression tree, outermost first.
#[derive(Debug, Default)]
pub struct ComponentRefCollector<'a> {
    pub refs: Vec<&'a ast::ComponentReference>,
}

impl<'a> ComponentRefCollector<'a> {
    pub fn collect(expression: &'a ast::Expression) -> Vec<&'a ast::ComponentReference> {
        let mut collector = ComponentRefCollector::default();
        expression.accept(&mut collector);
        collector.refs
    }
}

impl<'a> Visitor<'a> for ComponentRefCollector<'a> {
    fn enter_component_reference(&mut self, node: &'a ast::ComponentReference) {
        self.refs.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression_text;

    #[derive(Default)]
    struct ExpressionCounter {
        count: usize,
    }

    impl<'a> Visitor<'a> for ExpressionCounter {
        fn enter_expression(&mut self, _node: &'a ast::Expression) {
            self.count += 1;
        }
    }

    #[test]
    fn test_expression_counter() {
        let expr = parse_expression_text("1 + 2 * x", "t.mo").unwrap();
        let mut counter = ExpressionCounter::default();
        expr.accept(&mut counter);
        // +, *, 1, 2, x
        assert_eq!(counter.count, 5);
    }

    #[test]
    fn test_cref_collector() {
        let expr = parse_expression_text("a + f(b.c) + v[i]", "t.mo").unwrap();
        let refs = ComponentRefCollector::collect(&expr);
        let names: Vec<_> = refs.iter().map(|r| r.as_dotted()).collect();
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"b.c".to_string()));
        assert!(names.contains(&"v".to_string()));
        assert!(names.contains(&"i".to_string()));
        // the callee f is a reference too
        assert!(names.contains(&"f".to_string()));
    }
}
