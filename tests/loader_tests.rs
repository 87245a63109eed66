mod common;

use ruminate::library::{Context, Library};
use ruminate::syntax::ast::ClassKind;
use std::fs;

/// Builds a real package tree on disk and loads it through the std
/// filesystem collaborator.
fn write_tree(dir: &std::path::Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
}

#[test]
fn test_load_package_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("P/package.mo", "package P\nend P;\n"),
            ("P/A.mo", "model A\n  Real x;\nend A;\n"),
            ("P/Sub/package.mo", "package Sub\nend Sub;\n"),
            ("P/Sub/B.mo", "model B\nend B;\n"),
            ("P/README.md", "not modelica"),
        ],
    );

    let mut library = Library::new(Context::new());
    let root = library
        .load(dir.path().join("P").to_str().unwrap())
        .unwrap();
    library.instantiate().unwrap();

    let entity = library.arena().entity(root).unwrap();
    assert_eq!(entity.name, "P");
    assert!(!entity.unstructured);
    assert!(
        entity.path.ends_with("P"),
        "path should be absolute and normalised: {}",
        entity.path
    );
    let children: Vec<_> = entity
        .children
        .iter()
        .map(|c| library.arena().entity(*c).unwrap().name.clone())
        .collect();
    assert_eq!(children, vec!["A", "Sub"]);

    let a = library.find("P.A").unwrap().expect("P.A resolves");
    assert_eq!(library.arena().class(a).unwrap().classification, ClassKind::Model);
    let b = library.find("P.Sub.B").unwrap().expect("P.Sub.B resolves");
    assert_eq!(library.arena().class(b).unwrap().name, "B");
}

#[test]
fn test_load_single_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("Ball.mo", "model Ball\n  Real h;\nend Ball;\n")]);

    let mut library = Library::new(Context::new());
    let root = library
        .load(dir.path().join("Ball.mo").to_str().unwrap())
        .unwrap();
    library.instantiate().unwrap();

    let entity = library.arena().entity(root).unwrap();
    assert!(entity.unstructured);
    assert!(entity.children.is_empty());
    let ball = library.find("Ball").unwrap().expect("Ball resolves");
    assert_eq!(library.elements(ball).len(), 1);
}

#[test]
fn test_package_order_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("P/package.mo", "package P\nend P;\n"),
            ("P/package.order", "Second\nFirst\n"),
            ("P/First.mo", "model First\nend First;\n"),
            ("P/Second.mo", "model Second\nend Second;\n"),
        ],
    );

    let mut library = Library::new(Context::new());
    let root = library
        .load(dir.path().join("P").to_str().unwrap())
        .unwrap();
    let children: Vec<_> = library
        .arena()
        .entity(root)
        .unwrap()
        .children
        .iter()
        .map(|c| library.arena().entity(*c).unwrap().name.clone())
        .collect();
    assert_eq!(children, vec!["Second", "First"]);
}

#[test]
fn test_directory_without_package_mo() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("Lib/A.mo", "model A\nend A;\n")]);

    let mut library = Library::new(Context::new());
    let root = library
        .load(dir.path().join("Lib").to_str().unwrap())
        .unwrap();
    library.instantiate().unwrap();
    let entity = library.arena().entity(root).unwrap();
    assert!(entity.class.is_none());
    assert_eq!(entity.children.len(), 1);
}
