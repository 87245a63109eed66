//! The parser collaborator: turns Modelica source text into [`crate::syntax::ast`] trees.
//!
//! The lexer is generated with [`logos`]; the grammar is a hand-written
//! recursive descent over the token stream. Parsers are selected by file
//! extension through [`for_extension`], which is the seam the library loader
//! uses, so a different front-end can be swapped in per extension.

pub mod grammar;
pub mod lexer;

use crate::errors::Result;
use crate::syntax::ast::{Expression, StoredDefinition};

/// A source-text parser for one file format.
pub trait Parser {
    /// Parses the complete content of one file.
    fn parse(&self, text: &str, file_name: &str) -> Result<StoredDefinition>;

    /// Parses a single expression, with optional trailing `;`.
    fn parse_expression(&self, text: &str, file_name: &str) -> Result<Expression>;
}

/// The built-in Modelica parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelicaParser;

impl ModelicaParser {
    pub fn new() -> Self {
        ModelicaParser
    }
}

impl Parser for ModelicaParser {
    fn parse(&self, text: &str, file_name: &str) -> Result<StoredDefinition> {
        let mut cursor = grammar::Cursor::new(text, file_name)?;
        cursor.parse_stored_definition()
    }

    fn parse_expression(&self, text: &str, file_name: &str) -> Result<Expression> {
        let mut cursor = grammar::Cursor::new(text, file_name)?;
        let expression = cursor.parse_expression()?;
        cursor.expect_eof()?;
        Ok(expression)
    }
}

static MODELICA_PARSER: ModelicaParser = ModelicaParser;

/// The parser registered for a file extension, if any.
///
/// Accepts the extension with or without its leading dot.
pub fn for_extension(extension: &str) -> Option<&'static dyn Parser> {
    match extension.trim_start_matches('.') {
        "mo" => Some(&MODELICA_PARSER),
        _ => None,
    }
}

/// Parses `text` as a stored definition with the built-in Modelica parser.
pub fn parse_stored_definition(text: &str, file_name: &str) -> Result<StoredDefinition> {
    MODELICA_PARSER.parse(text, file_name)
}

/// Parses `text` as one expression with the built-in Modelica parser.
pub fn parse_expression_text(text: &str, file_name: &str) -> Result<Expression> {
    MODELICA_PARSER.parse_expression(text, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::*;

    fn parse(text: &str) -> StoredDefinition {
        parse_stored_definition(text, "test.mo").expect("parse failed")
    }

    #[test]
    fn test_empty_package() {
        let def = parse("package P end P;");
        assert_eq!(def.classes.len(), 1);
        let class = &def.classes[0];
        assert_eq!(class.name(), "P");
        assert_eq!(class.kind, ClassKind::Package);
        assert_eq!(class.elements().count(), 0);
    }

    #[test]
    fn test_within_clause() {
        let def = parse("within Modelica.Blocks;\nmodel M end M;");
        assert_eq!(def.within.as_ref().unwrap().as_dotted(), "Modelica.Blocks");
    }

    #[test]
    fn test_component_clause() {
        let def = parse(
            "model M\n  parameter Real k(start = 1, fixed = true) = 2.0 \"gain\";\n  flow Real i;\nend M;",
        );
        let class = &def.classes[0];
        let elements: Vec<_> = class.elements().collect();
        assert_eq!(elements.len(), 2);
        let Element::ComponentClause(clause) = &elements[0] else {
            panic!("expected a component clause");
        };
        assert_eq!(clause.variability, Variability::Parameter);
        assert_eq!(clause.type_specifier.name.as_dotted(), "Real");
        let decl = &clause.declarations[0];
        assert_eq!(decl.ident.text, "k");
        let modification = decl.modification.as_ref().unwrap();
        assert_eq!(
            modification.class_modification.as_ref().unwrap().arguments.len(),
            2
        );
        assert_eq!(
            modification.expression.as_ref().unwrap().real_value(),
            Some(2.0)
        );
        assert_eq!(decl.description.text(), "gain");
        let Element::ComponentClause(flow_clause) = &elements[1] else {
            panic!("expected a component clause");
        };
        assert_eq!(flow_clause.flow, Flow::Flow);
    }

    #[test]
    fn test_extends_and_imports() {
        let def = parse(
            "model M\n  extends A.B(x(start = 2));\n  import P.Q;\n  import R = P.S;\n  import P.U.*;\n  import P.V.{X, Y};\nend M;",
        );
        let class = &def.classes[0];
        let elements: Vec<_> = class.elements().collect();
        assert!(matches!(elements[0], Element::ExtendsClause(_)));
        let Element::ImportClause(simple) = &elements[1] else {
            panic!("expected a simple import");
        };
        assert!(simple.alias.is_none());
        assert_eq!(simple.name.as_dotted(), "P.Q");
        let Element::ImportClause(aliased) = &elements[2] else {
            panic!("expected an aliased import");
        };
        assert_eq!(aliased.alias.as_ref().unwrap().text, "R");
        assert!(matches!(elements[3], Element::UnqualifiedImportClause(_)));
        let Element::CompoundImportClause(compound) = &elements[4] else {
            panic!("expected a compound import");
        };
        assert_eq!(compound.imports.len(), 2);
    }

    #[test]
    fn test_enumeration_specifier() {
        let def = parse("type Color = enumeration(Red \"warm\", Green, Blue);");
        let class = &def.classes[0];
        let ClassSpecifier::Enumeration { literals, .. } = &class.specifier else {
            panic!("expected an enumeration specifier");
        };
        let names: Vec<_> = literals.iter().map(|l| l.ident.text.as_str()).collect();
        assert_eq!(names, vec!["Red", "Green", "Blue"]);
        assert_eq!(literals[0].description.text(), "warm");
    }

    #[test]
    fn test_short_class_specifier() {
        let def = parse("type Voltage = Real(unit = \"V\", min = 0);");
        let ClassSpecifier::Short {
            type_specifier,
            modification,
            ..
        } = &def.classes[0].specifier
        else {
            panic!("expected a short specifier");
        };
        assert_eq!(type_specifier.name.as_dotted(), "Real");
        assert_eq!(modification.as_ref().unwrap().arguments.len(), 2);
    }

    #[test]
    fn test_short_class_with_subscripts() {
        let def = parse("type V3 = Real[3];");
        let ClassSpecifier::Short { subscripts, .. } = &def.classes[0].specifier else {
            panic!("expected a short specifier");
        };
        assert_eq!(subscripts.len(), 1);
    }

    #[test]
    fn test_equations() {
        let def = parse(
            "model M\nequation\n  der(x) = -k * x;\n  connect(a.p, b.n);\n  when x > 1 then\n    y = 0;\n  end when;\n  if c then\n    z = 1;\n  else\n    z = 2;\n  end if;\n  for i in 1:3 loop\n    w = i;\n  end for;\nend M;",
        );
        let equations: Vec<_> = def.classes[0].equations().collect();
        assert_eq!(equations.len(), 5);
        assert!(matches!(equations[0], Equation::Simple { .. }));
        assert!(matches!(equations[1], Equation::Connect { .. }));
        assert!(matches!(equations[2], Equation::When { .. }));
        assert!(matches!(equations[3], Equation::If { .. }));
        assert!(matches!(equations[4], Equation::For { .. }));
    }

    #[test]
    fn test_algorithm_section() {
        let def = parse(
            "function F\n  input Real u;\n  output Real y;\nalgorithm\n  y := 2 * u;\n  while y > 10 loop\n    y := y / 2;\n  end while;\nend F;",
        );
        let class = &def.classes[0];
        assert_eq!(class.kind, ClassKind::Function);
        let Some(Section::Algorithm { statements, .. }) = class
            .sections()
            .iter()
            .find(|s| matches!(s, Section::Algorithm { .. }))
        else {
            panic!("expected an algorithm section");
        };
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Statement::Assignment { .. }));
        assert!(matches!(statements[1], Statement::While { .. }));
    }

    #[test]
    fn test_expression_precedence() {
        let expr = parse_expression_text("1 + 2 * 3 ^ 2", "test.mo").unwrap();
        // + ( 1, * ( 2, ^ (3, 2) ) )
        let Expression::Binary { op, rhs, .. } = &expr else {
            panic!("expected a binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        let Expression::Binary { op: mul, rhs: pow, .. } = rhs.as_ref() else {
            panic!("expected a multiplication");
        };
        assert_eq!(*mul, BinaryOp::Mul);
        assert!(matches!(
            pow.as_ref(),
            Expression::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn test_expression_range_and_if() {
        let range = parse_expression_text("1:2:10", "t.mo").unwrap();
        assert!(matches!(range, Expression::Range { step: Some(_), .. }));
        let cond = parse_expression_text("if a then 1 else 2", "t.mo").unwrap();
        assert!(matches!(cond, Expression::If { .. }));
    }

    #[test]
    fn test_expression_calls_and_arrays() {
        let expr = parse_expression_text("f(1, x = 2)", "t.mo").unwrap();
        let Expression::Call { args, .. } = &expr else {
            panic!("expected a call");
        };
        assert!(args[0].name.is_none());
        assert_eq!(args[1].name.as_ref().unwrap().text, "x");

        let array = parse_expression_text("{1.0, 2.0, 3.0}", "t.mo").unwrap();
        let Expression::Array { elements } = &array else {
            panic!("expected an array");
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn test_component_reference_subscripts() {
        let expr = parse_expression_text("a.b[1, :].c", "t.mo").unwrap();
        let Expression::Ref(cref) = &expr else {
            panic!("expected a reference");
        };
        assert_eq!(cref.parts.len(), 3);
        assert_eq!(cref.parts[1].subscripts.len(), 2);
        assert!(matches!(cref.parts[1].subscripts[1], Subscript::Colon));
    }

    #[test]
    fn test_nested_classes() {
        let def = parse(
            "package P\n  model A\n    Real x;\n  end A;\n  package Q\n    model B end B;\n  end Q;\nend P;",
        );
        let class = &def.classes[0];
        let nested: Vec<_> = class
            .elements()
            .filter_map(|e| match e {
                Element::ClassDefinition(c) => Some(c.name().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(nested, vec!["A", "Q"]);
    }

    #[test]
    fn test_class_annotation() {
        let def = parse("model M\n  annotation (Documentation(info = \"doc\"));\nend M;");
        assert!(def.classes[0].annotation().is_some());
    }

    #[test]
    fn test_parse_error_reports_location() {
        let err = parse_stored_definition("model M\n  Real ;\nend M;", "bad.mo").unwrap_err();
        assert!(matches!(err, crate::errors::Error::Parse { .. }));
    }

    #[test]
    fn test_redeclare_in_modification() {
        let def = parse("model M\n  extends A(redeclare Real x = 2);\nend M;");
        let Element::ExtendsClause(extends) = def.classes[0].elements().next().unwrap() else {
            panic!("expected extends");
        };
        let args = &extends.modification.as_ref().unwrap().arguments;
        assert!(matches!(
            args[0],
            ModificationArgument::ElementRedeclaration { .. }
        ));
    }

    #[test]
    fn test_for_extension() {
        assert!(for_extension(".mo").is_some());
        assert!(for_extension("mo").is_some());
        assert!(for_extension(".txt").is_none());
    }
}
