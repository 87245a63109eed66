mod common;

use common::instantiate_source;
use ruminate::parser::parse_stored_definition;
use ruminate::syntax::ast::{Element, Expression, StoredDefinition, from_tagged_value};

const MODEL: &str = "package Lib\n  type Color = enumeration(Red, Green, Blue);\n  type Voltage = Real(unit = \"V\");\n  class A\n    Real x(start = 1) \"state\";\n  end A;\n  class B\n    extends A(x(start = 2));\n    parameter Integer n = 3;\n    Real v[3] = {1.0, 2.0, 3.0};\n    Color c = Color.Green;\n  equation\n    der(x) = -x;\n  end B;\nend Lib;\n";

#[test]
fn test_ast_serde_roundtrip() {
    let def = parse_stored_definition(MODEL, "lib.mo").unwrap();
    let value = serde_json::to_value(&def).unwrap();
    let back: StoredDefinition = serde_json::from_value(value).unwrap();
    assert_eq!(back, def);
}

#[test]
fn test_element_tagged_shape() {
    let def = parse_stored_definition(MODEL, "lib.mo").unwrap();
    for element in def.classes[0].elements() {
        let value = serde_json::to_value(element).unwrap();
        assert!(
            value.get("@type").is_some(),
            "every element serialises with a tag: {value}"
        );
        let back: Element = from_tagged_value(value).unwrap();
        assert_eq!(&back, element);
    }
}

#[test]
fn test_expression_tag_names_are_stable() {
    let expr = ruminate::parser::parse_expression_text("1 + 2.5", "t.mo").unwrap();
    let value = serde_json::to_value(&expr).unwrap();
    assert_eq!(value["@type"], "BinaryExpression");
    assert_eq!(value["lhs"]["@type"], "UNSIGNED_INTEGER");
    assert_eq!(value["rhs"]["@type"], "UNSIGNED_REAL");
    assert_eq!(value["lhs"]["token"]["@type"], "IDENT");
    let back: Expression = from_tagged_value(value).unwrap();
    assert_eq!(back, expr);
}

#[test]
fn test_instance_print_is_a_fixed_point() {
    let first = instantiate_source(MODEL).print();
    let reparsed = instantiate_source(&first).print();
    assert_eq!(
        reparsed, first,
        "printing an instantiated library must be stable under re-instantiation"
    );
}

#[test]
fn test_print_flattens_extends() {
    let printed = instantiate_source(
        "package Lib\n  class A\n    Real x(start = 1);\n  end A;\n  class B\n    extends A(x(start = 2));\n  end B;\nend Lib;\n",
    )
    .print();
    assert!(
        !printed.contains("extends"),
        "extends should expand in place:\n{printed}"
    );
    assert!(
        printed.contains("Real x(start = 2)"),
        "the merged modification should be visible:\n{printed}"
    );
}

#[test]
fn test_print_structured_library() {
    use ruminate::filesystem::MemoryFileSystem;
    use ruminate::library::{Context, Library};

    let mut filesystem = MemoryFileSystem::new();
    filesystem.add_file("/lib/P/package.mo", "package P\nend P;\n".as_bytes().to_vec());
    filesystem.add_file(
        "/lib/P/A.mo",
        "model A\n  Real x;\nend A;\n".as_bytes().to_vec(),
    );
    let mut library = Library::new(Context::with_filesystem(Box::new(filesystem)));
    library.load("/lib/P").unwrap();
    library.instantiate().unwrap();
    let printed = library.print();

    // the directory tree prints as one nested package
    let reparsed = instantiate_source(&printed).print();
    assert_eq!(reparsed, printed);
    assert!(printed.contains("model A"));
}
