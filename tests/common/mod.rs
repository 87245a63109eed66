use ruminate::Library;
use ruminate::instance::InstanceId;

/// Builds and instantiates an in-memory, single-file library.
#[allow(dead_code)]
pub fn instantiate_source(source: &str) -> Library {
    let mut library = Library::from_source(source).expect("library should load");
    library.instantiate().expect("library should instantiate");
    library
}

/// Resolves a dotted name from the root, panicking on a miss.
#[allow(dead_code)]
pub fn find(library: &mut Library, dotted: &str) -> InstanceId {
    library
        .find(dotted)
        .expect("resolution should not error")
        .unwrap_or_else(|| panic!("{dotted} should resolve"))
}
