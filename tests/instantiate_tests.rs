mod common;

use common::{find, instantiate_source};
use ruminate::errors::Error;
use ruminate::eval::Value;
use ruminate::filesystem::MemoryFileSystem;
use ruminate::instance::{ClassVariant, InstanceKind, InstanceState};
use ruminate::library::{Context, Library};
use ruminate::syntax::ast::ClassKind;

fn memory_library(files: &[(&str, &str)]) -> Library {
    let mut filesystem = MemoryFileSystem::new();
    for (path, content) in files {
        filesystem.add_file(path, content.as_bytes().to_vec());
    }
    Library::new(Context::with_filesystem(Box::new(filesystem)))
}

#[test]
fn test_trivial_package() {
    let mut library = memory_library(&[("/lib/P/package.mo", "package P\nend P;\n")]);
    let root = library.load("/lib/P").unwrap();
    library.instantiate().unwrap();

    let resolved = library
        .resolve_simple_name(root, "P", false, false)
        .unwrap()
        .expect("P should resolve");
    let class = library.arena().class(resolved).expect("P is a class");
    assert_eq!(class.name, "P");
    assert_eq!(class.classification, ClassKind::Package);
    assert!(library.elements(resolved).is_empty());
    assert!(class.qualified_imports.is_empty());
    assert!(class.unqualified_imports.is_empty());
}

#[test]
fn test_extends_with_modification_override() {
    let mut library = instantiate_source(
        "package Lib\n  class A\n    Real x(start = 1);\n  end A;\n  class B\n    extends A(x(start = 2));\n  end B;\nend Lib;\n",
    );
    let b = find(&mut library, "Lib.B");

    let elements = library.elements(b);
    assert_eq!(elements.len(), 1, "B should expand to one component");
    let component = library
        .arena()
        .component(elements[0])
        .expect("the element is a component");
    assert_eq!(component.name, "x");

    let class = component.class.expect("x has a class instance");
    let start = library
        .attribute_expression(class, "start")
        .expect("x carries a start attribute");
    assert_eq!(start.integer_value(), Some(2), "the override wins");
    assert_eq!(
        library.start_value(class).unwrap(),
        Some(Value::Integer(2))
    );
}

#[test]
fn test_extends_applied_modification_is_merged() {
    let mut library = instantiate_source(
        "package Lib\n  class A\n    Real x(start = 1);\n  end A;\n  class B\n    extends A(x(start = 2));\n  end B;\nend Lib;\n",
    );
    let b = find(&mut library, "Lib.B");

    let declared = library.arena().class(b).unwrap().declared.clone();
    let extends = declared
        .iter()
        .find_map(|id| library.arena().extends(*id))
        .expect("B declares an extends instance");
    let base = extends.class.expect("the extends target resolved");
    let base_class = library.arena().class(base).unwrap();
    assert_eq!(base_class.state, InstanceState::Instantiated);

    let parent_modification = library.arena().class(b).unwrap().modification.clone();
    let expected = ruminate::modification::Modification::merge(
        &parent_modification,
        &extends.modification,
    );
    assert_eq!(base_class.modification, expected);
}

#[test]
fn test_import_resolution() {
    let mut library = instantiate_source(
        "package Lib\n  package P\n    package Q\n      model T\n        Real u;\n      end T;\n    end Q;\n  end P;\n  model M\n    import P.Q;\n    Q.T t;\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");

    let cref = ruminate::syntax::ast::ComponentReference::from_parts(["t"]);
    let t = library
        .resolve_component_reference(m, &cref)
        .unwrap()
        .expect("t should resolve");
    let component = library.arena().component(t).expect("t is a component");
    let class = component.class.expect("t has a class");
    let class = library.arena().class(class).unwrap();
    assert_eq!(class.name, "T");
    assert_eq!(
        class.ast.as_ref().map(|a| a.name().to_string()),
        Some("T".to_string()),
        "t's class comes from the T inside P.Q"
    );
}

#[test]
fn test_array_specialisation() {
    let mut library = instantiate_source(
        "package Lib\n  model M\n    Real v[3] = {1.0, 2.0, 3.0};\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");

    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    assert_eq!(component.name, "v");
    let class = component.class.unwrap();
    assert_eq!(library.array_shape(class), Some(&[3][..]));

    let element_ids: Vec<_> = library.array_elements(class).unwrap().to_vec();
    assert_eq!(element_ids.len(), 3);
    for (i, element) in element_ids.iter().enumerate() {
        let value = library
            .value_expression(*element)
            .expect("each element clone binds its slice");
        assert_eq!(value.real_value(), Some(i as f64 + 1.0));
        assert_eq!(
            library.value_of(*element).unwrap(),
            Some(Value::Real(i as f64 + 1.0))
        );
    }
}

#[test]
fn test_matrix_shape_matches_subscript_count() {
    let mut library = instantiate_source(
        "package Lib\n  model M\n    Real m[2, 2];\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    assert_eq!(component.subscripts().len(), 2);
    let class = component.class.unwrap();
    assert_eq!(library.array_shape(class), Some(&[2, 2][..]));
    // element clones are specialised along the flattened axis
    assert_eq!(library.array_elements(class).unwrap().len(), 4);
}

#[test]
fn test_enumeration_literal_lookup() {
    let mut library = instantiate_source(
        "package Lib\n  type Color = enumeration(Red, Green, Blue);\n  model M\n    Color c = Color.Green;\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");

    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    let class = library.arena().class(component.class.unwrap()).unwrap();
    let ClassVariant::Enumeration { literals, value } = &class.variant else {
        panic!("c's class should be an enumeration instance");
    };
    let ordinals: Vec<_> = literals.iter().map(|l| l.ordinal()).collect();
    assert_eq!(ordinals, vec![1, 2, 3]);

    let value = value.as_ref().expect("c has a selected value");
    assert_eq!(value.string_value(), "Green");
    assert_eq!(value.ordinal(), 2);
}

#[test]
fn test_enumeration_non_literal_modification_leaves_no_value() {
    let mut library = instantiate_source(
        "package Lib\n  type Color = enumeration(Red, Green, Blue);\n  model M\n    Color c = 5;\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    let class = library.arena().class(component.class.unwrap()).unwrap();
    let ClassVariant::Enumeration { value, .. } = &class.variant else {
        panic!("c's class should be an enumeration instance");
    };
    assert!(value.is_none());
}

#[test]
fn test_cycle_detection_extends() {
    let mut library = Library::from_source("class A\n  extends A;\nend A;\n").unwrap();
    let error = library.instantiate().unwrap_err();
    let Error::CyclicInstantiation { name } = error else {
        panic!("expected a cyclic instantiation error, got {error:?}");
    };
    assert_eq!(name, "A");
}

#[test]
fn test_cycle_detection_component_type() {
    let mut library = Library::from_source("class A\n  A a;\nend A;\n").unwrap();
    let error = library.instantiate().unwrap_err();
    assert!(matches!(error, Error::CyclicInstantiation { name } if name == "A"));
}

#[test]
fn test_unknown_type_is_name_not_found() {
    let mut library = Library::from_source("model M\n  Missing x;\nend M;\n").unwrap();
    let error = library.instantiate().unwrap_err();
    assert!(matches!(error, Error::NameNotFound { name, .. } if name == "Missing"));
}

#[test]
fn test_extending_a_component_is_a_type_mismatch() {
    let mut library = Library::from_source(
        "model M\n  Real x;\n  model Inner\n    extends x;\n  end Inner;\nend M;\n",
    )
    .unwrap();
    let error = library.instantiate().unwrap_err();
    assert!(matches!(error, Error::TypeMismatch { .. }));
}

#[test]
fn test_unqualified_import_falls_through_to_parent() {
    let mut library = instantiate_source(
        "package Lib\n  package P\n    model Y\n      Real u;\n    end Y;\n  end P;\n  model X\n    Real w;\n  end X;\n  model M\n    import P.*;\n    Y y;\n    X x;\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    assert_eq!(elements.len(), 2);

    // y's type came through the unqualified import
    let y = library.arena().component(elements[0]).unwrap();
    let y_class = library.arena().class(y.class.unwrap()).unwrap();
    assert_eq!(y_class.name, "Y");

    // x's type fell through the import to the enclosing package
    let x = library.arena().component(elements[1]).unwrap();
    let x_class = library.arena().class(x.class.unwrap()).unwrap();
    assert_eq!(x_class.name, "X");
}

#[test]
fn test_flexible_subscript_suppresses_expansion() {
    let mut library =
        instantiate_source("package Lib\n  model M\n    Real v[:];\n  end M;\nend Lib;\n");
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    let class = component.class.unwrap();
    assert_eq!(library.array_shape(class), Some(&[-1][..]));
    assert_eq!(library.array_elements(class), Some(&[][..]));
    let class = library.arena().class(class).unwrap();
    assert_eq!(class.state, InstanceState::Instantiated);
}

#[test]
fn test_parameterised_array_extent() {
    let mut library = instantiate_source(
        "package Lib\n  model M\n    parameter Integer n = 2;\n    Real v[n];\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    let v = library
        .arena()
        .component(elements[1])
        .expect("v is the second element");
    assert_eq!(library.array_shape(v.class.unwrap()), Some(&[2][..]));
}

#[test]
fn test_short_class_alias() {
    let mut library = instantiate_source(
        "package Lib\n  type Voltage = Real(unit = \"V\", min = 0);\n  model M\n    Voltage u(min = -1);\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    let class = component.class.unwrap();
    // u's class is a clone of the alias; attributes flow through the target
    let ClassVariant::Short { target } = &library.arena().class(class).unwrap().variant
    else {
        panic!("u's class should be a short class instance");
    };
    let target = target.expect("the alias resolved");
    assert_eq!(
        library.unit_value(target).unwrap(),
        Some(Value::String("V".to_string()))
    );
    assert_eq!(
        library.min_value(target).unwrap(),
        Some(Value::Integer(-1)),
        "the use-site modification overrides the alias"
    );
}

#[test]
fn test_every_reachable_class_is_instantiated() {
    let library = instantiate_source(
        "package Lib\n  type Color = enumeration(Red, Green);\n  class A\n    Real x(start = 1);\n  end A;\n  class B\n    extends A;\n    Real v[2] = {1.0, 2.0};\n    Color c;\n  end B;\nend Lib;\n",
    );
    let root = library.root().unwrap();
    for id in library.arena().walk(root) {
        if let InstanceKind::Class(class) = &library.arena().get(id).kind {
            assert_eq!(
                class.state,
                InstanceState::Instantiated,
                "class {} left in state {:?}",
                class.name,
                class.state
            );
        }
    }
}

#[test]
fn test_instantiation_is_deterministic() {
    let source = "package Lib\n  class A\n    Real x(start = 1);\n  end A;\n  class B\n    extends A(x(start = 2));\n    Real v[2] = {1.0, 2.0};\n  end B;\nend Lib;\n";
    let first = instantiate_source(source).print();
    let second = instantiate_source(source).print();
    assert_eq!(first, second);
}

#[test]
fn test_class_annotation_resolves_against_schema() {
    let mut library = instantiate_source(
        "package Lib\n  model M\n    Real x;\n    annotation (Documentation(info = \"doc\"), NotInSchema(q = 1));\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let annotations = library.annotations(m);
    // the unknown name is skipped, the known one resolves
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].name, "Documentation");
    let doc = annotations[0].instance;
    let doc_class = library.arena().class(doc).unwrap();
    assert!(doc_class.modification.argument("info").is_some());
}

#[test]
fn test_condition_and_description_are_cached() {
    let mut library = instantiate_source(
        "package Lib\n  model M\n    Real x if false \"state\";\n  end M;\nend Lib;\n",
    );
    let m = find(&mut library, "Lib.M");
    let elements = library.elements(m);
    let component = library.arena().component(elements[0]).unwrap();
    assert!(component.declaration.condition.is_some());
    assert_eq!(component.declaration.description.text(), "state");
}
