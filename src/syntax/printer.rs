//! Modelica source text from AST nodes.
//!
//! Printing is precedence-aware: a child expression is parenthesised exactly
//! when re-parsing the output would otherwise regroup it, so
//! `parse(format_expression(e))` reproduces `e`.

use crate::syntax::ast::*;
use std::fmt::Write;

/// Binding strength used to decide parenthesisation.
fn precedence(expr: &Expression) -> u8 {
    match expr {
        Expression::If { .. } => 1,
        Expression::Range { .. } => 2,
        Expression::Binary { op, .. } => match op {
            BinaryOp::Or => 3,
            BinaryOp::And => 4,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => 6,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::ElemAdd | BinaryOp::ElemSub => 7,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::ElemMul | BinaryOp::ElemDiv => 8,
            BinaryOp::Pow | BinaryOp::ElemPow => 9,
        },
        Expression::Unary { op, .. } => match op {
            UnaryOp::Not => 5,
            _ => 7,
        },
        _ => 10,
    }
}

fn format_child(expr: &Expression, needed: u8) -> String {
    if precedence(expr) < needed {
        format!("({})", format_expression(expr))
    } else {
        format_expression(expr)
    }
}

/// A quoted, re-escaped Modelica string literal.
pub fn format_string_literal(text: &str) -> String {
    format!("\"{}\"", escape_string(text))
}

/// Re-escapes a string literal body.
fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub fn format_expression(expr: &Expression) -> String {
    match expr {
        Expression::Binary { op, lhs, rhs } => {
            let my = precedence(expr);
            let (needed_l, needed_r) = match op {
                // relations and exponentiation do not chain
                BinaryOp::Pow | BinaryOp::ElemPow => (10, 10),
                BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne => (7, 7),
                _ => (my, my + 1),
            };
            format!(
                "{} {} {}",
                format_child(lhs, needed_l),
                op,
                format_child(rhs, needed_r)
            )
        }
        Expression::Unary { op, operand } => match op {
            UnaryOp::Not => format!("not {}", format_child(operand, 6)),
            _ => format!("{}{}", op, format_child(operand, 8)),
        },
        Expression::Range { start, step, end } => match step {
            Some(step) => format!(
                "{}:{}:{}",
                format_child(start, 3),
                format_child(step, 3),
                format_child(end, 3)
            ),
            None => format!("{}:{}", format_child(start, 3), format_child(end, 3)),
        },
        Expression::If {
            branches,
            else_expression,
        } => {
            let mut out = String::new();
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elseif" };
                write!(
                    out,
                    "{} {} then {} ",
                    keyword,
                    format_expression(&branch.condition),
                    format_expression(&branch.then)
                )
                .unwrap();
            }
            write!(out, "else {}", format_expression(else_expression)).unwrap();
            out
        }
        Expression::Call { callee, args } => {
            format!("{}({})", format_component_reference(callee), format_args(args))
        }
        Expression::Array { elements } => {
            let inner: Vec<_> = elements.iter().map(format_expression).collect();
            format!("{{{}}}", inner.join(", "))
        }
        Expression::Matrix { rows } => {
            let formatted: Vec<_> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(format_expression)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            format!("[{}]", formatted.join("; "))
        }
        Expression::Ref(cref) => format_component_reference(cref),
        Expression::Integer { token } | Expression::Real { token } => token.text.clone(),
        Expression::Str { token } => format!("\"{}\"", escape_string(&token.text)),
        Expression::Boolean { token } => token.text.clone(),
        Expression::End => "end".to_string(),
    }
}

pub fn format_args(args: &[FunctionArgument]) -> String {
    args.iter()
        .map(|arg| match &arg.name {
            Some(name) => format!("{} = {}", name.text, format_expression(&arg.value)),
            None => format_expression(&arg.value),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_subscript(subscript: &Subscript) -> String {
    match subscript {
        Subscript::Colon => ":".to_string(),
        Subscript::Expression { expression } => format_expression(expression),
    }
}

pub fn format_subscripts(subscripts: &[Subscript]) -> String {
    if subscripts.is_empty() {
        return String::new();
    }
    let inner: Vec<_> = subscripts.iter().map(format_subscript).collect();
    format!("[{}]", inner.join(", "))
}

pub fn format_component_reference(cref: &ComponentReference) -> String {
    let mut out = String::new();
    if cref.global {
        out.push('.');
    }
    let parts: Vec<_> = cref
        .parts
        .iter()
        .map(|part| format!("{}{}", part.ident.text, format_subscripts(&part.subscripts)))
        .collect();
    out.push_str(&parts.join("."));
    out
}

pub fn format_class_modification(modification: &ClassModification) -> String {
    let inner: Vec<_> = modification
        .arguments
        .iter()
        .map(format_modification_argument)
        .collect();
    format!("({})", inner.join(", "))
}

pub fn format_modification_argument(argument: &ModificationArgument) -> String {
    match argument {
        ModificationArgument::ElementModification {
            each,
            is_final,
            name,
            modification,
            ..
        } => {
            let mut out = String::new();
            if *each {
                out.push_str("each ");
            }
            if *is_final {
                out.push_str("final ");
            }
            out.push_str(&name.as_dotted());
            if let Some(modification) = modification {
                out.push_str(&format_modification(modification));
            }
            out
        }
        ModificationArgument::ElementRedeclaration { element, .. } => {
            format!("redeclare {}", format_element_inline(element))
        }
    }
}

/// The suffix form of a modification: `(args) = expr`, `(args)`, `= expr`, ...
pub fn format_modification(modification: &Modification) -> String {
    let mut out = String::new();
    if let Some(class_modification) = &modification.class_modification {
        out.push_str(&format_class_modification(class_modification));
    }
    if let Some(expression) = &modification.expression {
        let eq = if modification.assign { " := " } else { " = " };
        out.push_str(eq);
        out.push_str(&format_expression(expression));
    }
    out
}

fn format_description_suffix(description: &Description) -> String {
    let mut out = String::new();
    if !description.strings.is_empty() {
        let strings: Vec<_> = description
            .strings
            .iter()
            .map(|s| format!("\"{}\"", escape_string(&s.text)))
            .collect();
        out.push(' ');
        out.push_str(&strings.join(" + "));
    }
    if let Some(annotation) = &description.annotation {
        out.push_str(" annotation ");
        out.push_str(&format_class_modification(annotation));
    }
    out
}

fn format_type_prefix(clause: &ComponentClause) -> String {
    let mut parts = Vec::new();
    if clause.is_redeclare {
        parts.push("redeclare");
    }
    if clause.is_final {
        parts.push("final");
    }
    if clause.is_inner {
        parts.push("inner");
    }
    if clause.is_outer {
        parts.push("outer");
    }
    if clause.is_replaceable {
        parts.push("replaceable");
    }
    match clause.flow {
        Flow::Empty => {}
        Flow::Flow => parts.push("flow"),
        Flow::Stream => parts.push("stream"),
    }
    match clause.variability {
        Variability::Empty => {}
        Variability::Constant => parts.push("constant"),
        Variability::Discrete => parts.push("discrete"),
        Variability::Parameter => parts.push("parameter"),
    }
    match clause.causality {
        Causality::Empty => {}
        Causality::Input => parts.push("input"),
        Causality::Output => parts.push("output"),
    }
    let mut out = parts.join(" ");
    if !out.is_empty() {
        out.push(' ');
    }
    out
}

pub fn format_component_clause(clause: &ComponentClause) -> String {
    let declarations: Vec<_> = clause
        .declarations
        .iter()
        .map(|decl| {
            let mut out = format!("{}{}", decl.ident.text, format_subscripts(&decl.subscripts));
            if let Some(modification) = &decl.modification {
                out.push_str(&format_modification(modification));
            }
            if let Some(condition) = &decl.condition {
                write!(out, " if {}", format_expression(condition)).unwrap();
            }
            out.push_str(&format_description_suffix(&decl.description));
            out
        })
        .collect();
    format!(
        "{}{}{} {}",
        format_type_prefix(clause),
        clause.type_specifier,
        format_subscripts(&clause.subscripts),
        declarations.join(", ")
    )
}

/// One element on a single line, without the trailing `;`.
pub fn format_element_inline(element: &Element) -> String {
    match element {
        Element::ClassDefinition(class) => format_class_definition(class, 0),
        Element::ComponentClause(clause) => format_component_clause(clause),
        Element::ExtendsClause(extends) => {
            let mut out = format!("extends {}", extends.type_specifier);
            if let Some(modification) = &extends.modification {
                out.push_str(&format_class_modification(modification));
            }
            if let Some(annotation) = &extends.annotation {
                out.push_str(" annotation ");
                out.push_str(&format_class_modification(annotation));
            }
            out
        }
        Element::ImportClause(import) => match &import.alias {
            Some(alias) => format!("import {} = {}", alias.text, import.name),
            None => format!("import {}", import.name),
        },
        Element::CompoundImportClause(import) => {
            let names: Vec<_> = import.imports.iter().map(|t| t.text.as_str()).collect();
            format!("import {}.{{{}}}", import.name, names.join(", "))
        }
        Element::UnqualifiedImportClause(import) => format!("import {}.*", import.name),
    }
}

pub fn format_equation(equation: &Equation, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match equation {
        Equation::Simple { lhs, rhs } => format!(
            "{}{} = {}",
            pad,
            format_expression(lhs),
            format_expression(rhs)
        ),
        Equation::Connect { lhs, rhs } => format!(
            "{}connect({}, {})",
            pad,
            format_component_reference(lhs),
            format_component_reference(rhs)
        ),
        Equation::Call { callee, args } => format!(
            "{}{}({})",
            pad,
            format_component_reference(callee),
            format_args(args)
        ),
        Equation::For { indices, equations } => {
            let mut out = format!("{}for {} loop\n", pad, format_for_indices(indices));
            for equation in equations {
                out.push_str(&format_equation(equation, indent + 1));
                out.push_str(";\n");
            }
            write!(out, "{}end for", pad).unwrap();
            out
        }
        Equation::If {
            branches,
            else_equations,
        } => {
            let mut out = String::new();
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elseif" };
                writeln!(
                    out,
                    "{}{} {} then",
                    pad,
                    keyword,
                    format_expression(&branch.condition)
                )
                .unwrap();
                for equation in &branch.equations {
                    out.push_str(&format_equation(equation, indent + 1));
                    out.push_str(";\n");
                }
            }
            if !else_equations.is_empty() {
                writeln!(out, "{}else", pad).unwrap();
                for equation in else_equations {
                    out.push_str(&format_equation(equation, indent + 1));
                    out.push_str(";\n");
                }
            }
            write!(out, "{}end if", pad).unwrap();
            out
        }
        Equation::When { branches } => {
            let mut out = String::new();
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "when" } else { "elsewhen" };
                writeln!(
                    out,
                    "{}{} {} then",
                    pad,
                    keyword,
                    format_expression(&branch.condition)
                )
                .unwrap();
                for equation in &branch.equations {
                    out.push_str(&format_equation(equation, indent + 1));
                    out.push_str(";\n");
                }
            }
            write!(out, "{}end when", pad).unwrap();
            out
        }
    }
}

pub fn format_statement(statement: &Statement, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match statement {
        Statement::Assignment { target, value } => format!(
            "{}{} := {}",
            pad,
            format_component_reference(target),
            format_expression(value)
        ),
        Statement::Call { callee, args } => format!(
            "{}{}({})",
            pad,
            format_component_reference(callee),
            format_args(args)
        ),
        Statement::Return => format!("{}return", pad),
        Statement::Break => format!("{}break", pad),
        Statement::For {
            indices,
            statements,
        } => {
            let mut out = format!("{}for {} loop\n", pad, format_for_indices(indices));
            for statement in statements {
                out.push_str(&format_statement(statement, indent + 1));
                out.push_str(";\n");
            }
            write!(out, "{}end for", pad).unwrap();
            out
        }
        Statement::While {
            condition,
            statements,
        } => {
            let mut out = format!("{}while {} loop\n", pad, format_expression(condition));
            for statement in statements {
                out.push_str(&format_statement(statement, indent + 1));
                out.push_str(";\n");
            }
            write!(out, "{}end while", pad).unwrap();
            out
        }
        Statement::If {
            branches,
            else_statements,
        } => {
            let mut out = String::new();
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elseif" };
                writeln!(
                    out,
                    "{}{} {} then",
                    pad,
                    keyword,
                    format_expression(&branch.condition)
                )
                .unwrap();
                for statement in &branch.statements {
                    out.push_str(&format_statement(statement, indent + 1));
                    out.push_str(";\n");
                }
            }
            if !else_statements.is_empty() {
                writeln!(out, "{}else", pad).unwrap();
                for statement in else_statements {
                    out.push_str(&format_statement(statement, indent + 1));
                    out.push_str(";\n");
                }
            }
            write!(out, "{}end if", pad).unwrap();
            out
        }
        Statement::When { branches } => {
            let mut out = String::new();
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "when" } else { "elsewhen" };
                writeln!(
                    out,
                    "{}{} {} then",
                    pad,
                    keyword,
                    format_expression(&branch.condition)
                )
                .unwrap();
                for statement in &branch.statements {
                    out.push_str(&format_statement(statement, indent + 1));
                    out.push_str(";\n");
                }
            }
            write!(out, "{}end when", pad).unwrap();
            out
        }
    }
}

fn format_for_indices(indices: &[ForIndex]) -> String {
    indices
        .iter()
        .map(|index| match &index.range {
            Some(range) => format!("{} in {}", index.ident.text, format_expression(range)),
            None => index.ident.text.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_class_prefixes(class: &ClassDefinition) -> String {
    let mut parts = Vec::new();
    if class.is_redeclare {
        parts.push("redeclare");
    }
    if class.is_final {
        parts.push("final");
    }
    if class.is_encapsulated {
        parts.push("encapsulated");
    }
    if class.is_inner {
        parts.push("inner");
    }
    if class.is_outer {
        parts.push("outer");
    }
    if class.is_replaceable {
        parts.push("replaceable");
    }
    if class.is_partial {
        parts.push("partial");
    }
    match class.purity {
        Purity::Empty => {}
        Purity::Pure => parts.push("pure"),
        Purity::Impure => parts.push("impure"),
    }
    let mut out = parts.join(" ");
    if !out.is_empty() {
        out.push(' ');
    }
    out
}

pub fn format_class_definition(class: &ClassDefinition, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let head = format!("{}{}{} ", pad, format_class_prefixes(class), class.kind);
    match &class.specifier {
        ClassSpecifier::Long {
            ident,
            description,
            sections,
            annotation,
            end_ident,
        } => {
            let mut out = head;
            out.push_str(&ident.text);
            if !description.strings.is_empty() {
                out.push_str(&format_description_suffix(description));
            }
            out.push('\n');
            for section in sections {
                match section {
                    Section::Element {
                        visibility,
                        elements,
                    } => {
                        if *visibility == Visibility::Protected {
                            writeln!(out, "{}protected", pad).unwrap();
                        }
                        for element in elements {
                            writeln!(
                                out,
                                "{}  {};",
                                pad,
                                format_element_at(element, indent + 1)
                            )
                            .unwrap();
                        }
                    }
                    Section::Equation { initial, equations } => {
                        let keyword = if *initial {
                            "initial equation"
                        } else {
                            "equation"
                        };
                        writeln!(out, "{}{}", pad, keyword).unwrap();
                        for equation in equations {
                            out.push_str(&format_equation(equation, indent + 1));
                            out.push_str(";\n");
                        }
                    }
                    Section::Algorithm {
                        initial,
                        statements,
                    } => {
                        let keyword = if *initial {
                            "initial algorithm"
                        } else {
                            "algorithm"
                        };
                        writeln!(out, "{}{}", pad, keyword).unwrap();
                        for statement in statements {
                            out.push_str(&format_statement(statement, indent + 1));
                            out.push_str(";\n");
                        }
                    }
                }
            }
            if let Some(annotation) = annotation {
                writeln!(
                    out,
                    "{}  annotation {};",
                    pad,
                    format_class_modification(annotation)
                )
                .unwrap();
            }
            write!(out, "{}end {}", pad, end_ident.text).unwrap();
            out
        }
        ClassSpecifier::Short {
            ident,
            type_specifier,
            subscripts,
            modification,
            description,
        } => {
            let mut out = format!("{}{} = {}", head, ident.text, type_specifier);
            out.push_str(&format_subscripts(subscripts));
            if let Some(modification) = modification {
                out.push_str(&format_class_modification(modification));
            }
            out.push_str(&format_description_suffix(description));
            out
        }
        ClassSpecifier::Enumeration {
            ident,
            literals,
            unspecified,
            description,
        } => {
            let inner = if *unspecified {
                ":".to_string()
            } else {
                literals
                    .iter()
                    .map(|l| {
                        format!("{}{}", l.ident.text, format_description_suffix(&l.description))
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let mut out = format!("{}{} = enumeration({})", head, ident.text, inner);
            out.push_str(&format_description_suffix(description));
            out
        }
        ClassSpecifier::Der {
            ident,
            type_specifier,
            idents,
            description,
        } => {
            let names: Vec<_> = idents.iter().map(|t| t.text.as_str()).collect();
            let mut out = format!(
                "{}{} = der({}, {})",
                head,
                ident.text,
                type_specifier,
                names.join(", ")
            );
            out.push_str(&format_description_suffix(description));
            out
        }
    }
}

/// An element rendered for inclusion inside a class body.
fn format_element_at(element: &Element, indent: usize) -> String {
    match element {
        Element::ClassDefinition(class) => {
            // nested definitions re-indent themselves, strip the outer pad
            format_class_definition(class, indent)
                .trim_start()
                .to_string()
        }
        _ => format_element_inline(element),
    }
}

pub fn format_stored_definition(def: &StoredDefinition) -> String {
    let mut out = String::new();
    if let Some(within) = &def.within {
        if within.is_empty() {
            out.push_str("within;\n");
        } else {
            writeln!(out, "within {};", within).unwrap();
        }
    }
    for class in &def.classes {
        out.push_str(&format_class_definition(class, 0));
        out.push_str(";\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression_text, parse_stored_definition};

    fn roundtrip_expression(text: &str) {
        let expr = parse_expression_text(text, "t.mo").unwrap();
        let printed = format_expression(&expr);
        let reparsed = parse_expression_text(&printed, "t.mo").unwrap();
        assert_eq!(
            format_expression(&reparsed),
            printed,
            "printing is not a fixed point for {text}"
        );
    }

    #[test]
    fn test_expression_printing() {
        let expr = parse_expression_text("1 + 2 * 3", "t.mo").unwrap();
        assert_eq!(format_expression(&expr), "1 + 2 * 3");
        let expr = parse_expression_text("(1 + 2) * 3", "t.mo").unwrap();
        assert_eq!(format_expression(&expr), "(1 + 2) * 3");
    }

    #[test]
    fn test_expression_fixed_points() {
        for text in [
            "a - (b - c)",
            "-k * x",
            "not a and b",
            "if a then 1 elseif b then 2 else 3",
            "1:2:10",
            "{1, 2, 3}",
            "[1, 2; 3, 4]",
            "f(x, y = 2)",
            "a.b[1, :].c",
            "x ^ 2",
            "\"a\\nb\"",
        ] {
            roundtrip_expression(text);
        }
    }

    #[test]
    fn test_class_printing_reparses() {
        let source = "model M\n  parameter Real k = 2 \"gain\";\nequation\n  der(x) = -k * x;\nend M;\n";
        let def = parse_stored_definition(source, "t.mo").unwrap();
        let printed = format_stored_definition(&def);
        let reparsed = parse_stored_definition(&printed, "t.mo").unwrap();
        assert_eq!(format_stored_definition(&reparsed), printed);
    }

    #[test]
    fn test_enumeration_printing() {
        let source = "type Color = enumeration(Red, Green, Blue);\n";
        let def = parse_stored_definition(source, "t.mo").unwrap();
        assert_eq!(format_stored_definition(&def), source);
    }
}
