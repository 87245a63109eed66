//! Flat Modelica text from an instantiated library.
//!
//! Extends instances expand in place, components show their applied
//! (merged) modifications, and enumeration/short classes are re-sugared, so
//! the output is ordinary re-parseable Modelica. For a self-contained
//! library, printing is a fixed point: re-parsing and re-instantiating the
//! output prints the same text again.

use crate::instance::{ClassVariant, InstanceId, InstanceKind};
use crate::library::Library;
use crate::syntax::ast;
use crate::syntax::printer::{
    format_equation, format_statement, format_string_literal, format_subscripts,
};
use std::fmt::Write;

impl Library {
    /// Prints the whole instantiated library.
    pub fn print(&self) -> String {
        match self.root() {
            Some(root) => self.print_instance(root),
            None => String::new(),
        }
    }

    /// Prints the subtree rooted at `id` as a stored definition.
    pub fn print_instance(&self, id: InstanceId) -> String {
        let mut out = String::new();
        self.write_node(id, 0, &mut out);
        out.push_str(";\n");
        out
    }

    fn write_node(&self, id: InstanceId, indent: usize, out: &mut String) {
        match &self.arena.get(id).kind {
            InstanceKind::Entity(_) => self.write_entity(id, indent, out),
            InstanceKind::Class(_) => self.write_class(id, indent, &[], out),
            InstanceKind::Component(_) => self.write_component(id, indent, out),
            InstanceKind::Extends(extends) => {
                if let Some(base) = extends.class {
                    self.write_class(base, indent, &[], out);
                }
            }
        }
    }

    fn write_entity(&self, id: InstanceId, indent: usize, out: &mut String) {
        let Some(entity) = self.arena.entity(id) else {
            return;
        };
        match entity.class {
            Some(class) => self.write_class(class, indent, &entity.children, out),
            None => {
                let pad = "  ".repeat(indent);
                let _ = writeln!(out, "{}package {}", pad, entity.name);
                for child in &entity.children {
                    self.write_entity(*child, indent + 1, out);
                    out.push_str(";\n");
                }
                let _ = write!(out, "{}end {}", pad, entity.name);
            }
        }
    }

    fn write_class(
        &self,
        class_id: InstanceId,
        indent: usize,
        sub_entities: &[InstanceId],
        out: &mut String,
    ) {
        let Some(class) = self.arena.class(class_id) else {
            return;
        };
        let pad = "  ".repeat(indent);
        match &class.variant {
            ClassVariant::Short { .. } => {
                let target_text = self.short_target_text(class_id);
                let _ = write!(
                    out,
                    "{}{} {} = {}",
                    pad, class.classification, class.name, target_text
                );
            }
            ClassVariant::Enumeration { literals, .. } => {
                let names: Vec<&str> = literals.iter().map(|l| l.name.as_str()).collect();
                let _ = write!(
                    out,
                    "{}{} {} = enumeration({})",
                    pad,
                    class.classification,
                    class.name,
                    names.join(", ")
                );
            }
            ClassVariant::Predefined { kind } => {
                let _ = write!(
                    out,
                    "{}type {} = {}{}",
                    pad,
                    class.name,
                    kind.name(),
                    class.modification
                );
            }
            ClassVariant::Array { .. } => {
                // arrays print through their owning component
                let _ = write!(out, "{}// array class {}", pad, class.name);
            }
            ClassVariant::Normal => {
                let _ = writeln!(out, "{}{} {}", pad, class.classification, class.name);
                for child in sub_entities {
                    self.write_entity(*child, indent + 1, out);
                    out.push_str(";\n");
                }
                for element in self.elements(class_id) {
                    match &self.arena.get(element).kind {
                        InstanceKind::Component(_) => {
                            self.write_component(element, indent + 1, out);
                            out.push_str(";\n");
                        }
                        InstanceKind::Class(_) => {
                            self.write_class(element, indent + 1, &[], out);
                            out.push_str(";\n");
                        }
                        _ => {}
                    }
                }
                let mut sections = Vec::new();
                self.collect_behavior_sections(class_id, &mut sections);
                for section in &sections {
                    match section {
                        ast::Section::Equation { initial, equations } => {
                            let keyword = if *initial {
                                "initial equation"
                            } else {
                                "equation"
                            };
                            let _ = writeln!(out, "{}{}", pad, keyword);
                            for equation in equations {
                                out.push_str(&format_equation(equation, indent + 1));
                                out.push_str(";\n");
                            }
                        }
                        ast::Section::Algorithm {
                            initial,
                            statements,
                        } => {
                            let keyword = if *initial {
                                "initial algorithm"
                            } else {
                                "algorithm"
                            };
                            let _ = writeln!(out, "{}{}", pad, keyword);
                            for statement in statements {
                                out.push_str(&format_statement(statement, indent + 1));
                                out.push_str(";\n");
                            }
                        }
                        ast::Section::Element { .. } => {}
                    }
                }
                let _ = write!(out, "{}end {}", pad, class.name);
            }
        }
    }

    /// Inherited behaviour sections first, then the class's own, matching
    /// the in-place expansion of extends instances.
    fn collect_behavior_sections(&self, class_id: InstanceId, out: &mut Vec<ast::Section>) {
        let Some(class) = self.arena.class(class_id) else {
            return;
        };
        for id in &class.declared {
            if let InstanceKind::Extends(extends) = &self.arena.get(*id).kind {
                if let Some(base) = extends.class {
                    self.collect_behavior_sections(base, out);
                }
            }
        }
        if let Some(ast) = &class.ast {
            for section in ast.sections() {
                if !matches!(section, ast::Section::Element { .. }) {
                    out.push(section.clone());
                }
            }
        }
    }

    fn short_target_text(&self, class_id: InstanceId) -> String {
        let Some(class) = self.arena.class(class_id) else {
            return String::new();
        };
        let (ts_text, subscripts) = match class.ast.as_deref().map(|a| &a.specifier) {
            Some(ast::ClassSpecifier::Short {
                type_specifier,
                subscripts,
                ..
            }) => (type_specifier.to_string(), format_subscripts(subscripts)),
            Some(ast::ClassSpecifier::Der { type_specifier, .. }) => {
                (type_specifier.to_string(), String::new())
            }
            _ => (String::new(), String::new()),
        };
        let modification = match &class.variant {
            ClassVariant::Short {
                target: Some(target),
            } => self
                .arena
                .class(*target)
                .map(|t| t.modification.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        format!("{}{}{}", ts_text, subscripts, modification)
    }

    fn write_component(&self, id: InstanceId, indent: usize, out: &mut String) {
        let Some(component) = self.arena.component(id) else {
            return;
        };
        let pad = "  ".repeat(indent);
        let mut prefixes = Vec::new();
        match component.flow {
            ast::Flow::Empty => {}
            ast::Flow::Flow => prefixes.push("flow"),
            ast::Flow::Stream => prefixes.push("stream"),
        }
        match component.variability {
            ast::Variability::Empty => {}
            ast::Variability::Constant => prefixes.push("constant"),
            ast::Variability::Discrete => prefixes.push("discrete"),
            ast::Variability::Parameter => prefixes.push("parameter"),
        }
        match component.causality {
            ast::Causality::Empty => {}
            ast::Causality::Input => prefixes.push("input"),
            ast::Causality::Output => prefixes.push("output"),
        }
        let mut prefix = prefixes.join(" ");
        if !prefix.is_empty() {
            prefix.push(' ');
        }
        let _ = write!(
            out,
            "{}{}{} {}{}{}",
            pad,
            prefix,
            component.type_specifier,
            component.name,
            format_subscripts(&component.subscripts()),
            component.modification
        );
        let description = &component.declaration.description;
        if !description.strings.is_empty() {
            let strings: Vec<String> = description
                .strings
                .iter()
                .map(|s| format_string_literal(&s.text))
                .collect();
            let _ = write!(out, " {}", strings.join(" + "));
        }
    }
}
