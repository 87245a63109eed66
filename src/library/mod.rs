//! The library loader: maps a filesystem path to an entity tree of class
//! definitions and owns the instance arena everything else works in.
//!
//! A [`Library`] is created on demand, loaded once, and instantiated once;
//! both operations are monotonic. File entities (`Model.mo`) are
//! *unstructured*; directory entities mirror the Modelica 13.4 structured
//! form: an optional `package.mo` carries the package class, a
//! `package.order` file fixes child ordering, and every other `.mo` file or
//! sub-directory becomes a child entity.

use crate::errors::{Error, Result};
use crate::filesystem::{FileSystem, MemoryFileSystem, StdFileSystem};
use crate::instance::{
    ClassInstance, ClassVariant, Entity, InstanceArena, InstanceId, InstanceKind, InstanceState,
};
use crate::modification::Modification;
use crate::parser::{self, Parser};
use crate::syntax::ast;
use std::rc::Rc;

/// Shared collaborators: the filesystem and the parser registry.
pub struct Context {
    filesystem: Box<dyn FileSystem>,
}

impl Context {
    /// A context over the real filesystem.
    pub fn new() -> Self {
        Context {
            filesystem: Box::new(StdFileSystem::new()),
        }
    }

    pub fn with_filesystem(filesystem: Box<dyn FileSystem>) -> Self {
        Context { filesystem }
    }

    pub fn filesystem(&self) -> &dyn FileSystem {
        self.filesystem.as_ref()
    }

    /// The parser registered for a file extension.
    pub fn parser_for(&self, extension: &str) -> Option<&'static dyn Parser> {
        parser::for_extension(extension)
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

/// A loaded Modelica library: one root entity plus the arena of instances.
pub struct Library {
    pub(crate) arena: InstanceArena,
    context: Context,
    root: Option<InstanceId>,
    predefined: Vec<InstanceId>,
    pub(crate) annotation_schema: Option<InstanceId>,
    pub(crate) eval_depth: u32,
}

impl Library {
    pub fn new(context: Context) -> Self {
        let mut library = Library {
            arena: InstanceArena::new(),
            context,
            root: None,
            predefined: Vec::new(),
            annotation_schema: None,
            eval_depth: 0,
        };
        for kind in crate::instance::PredefinedType::all() {
            let id = library.arena.alloc(
                None,
                InstanceKind::Class(ClassInstance {
                    name: kind.name().to_string(),
                    classification: ast::ClassKind::Type,
                    state: InstanceState::Instantiated,
                    variant: ClassVariant::Predefined { kind },
                    ..Default::default()
                }),
            );
            library.predefined.push(id);
        }
        library
    }

    /// An in-memory, single-file library.
    pub fn from_source(source: &str) -> Result<Library> {
        let mut filesystem = MemoryFileSystem::new();
        filesystem.add_file("/main.mo", source.as_bytes().to_vec());
        let mut library = Library::new(Context::with_filesystem(Box::new(filesystem)));
        library.load("/main.mo")?;
        Ok(library)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn root(&self) -> Option<InstanceId> {
        self.root
    }

    pub fn arena(&self) -> &InstanceArena {
        &self.arena
    }

    /// The predefined class with `name`, if `name` is one of
    /// `Boolean`/`Integer`/`Real`/`String`.
    pub fn predefined(&self, name: &str) -> Option<InstanceId> {
        self.predefined
            .iter()
            .copied()
            .find(|id| self.arena.class(*id).is_some_and(|c| c.name == name))
    }

    /// Loads the entity tree rooted at `path`. Loading is monotonic: a second
    /// call returns the already-loaded root.
    pub fn load(&mut self, path: &str) -> Result<InstanceId> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        log::debug!("loading library from {}", path);
        let root = self.load_entity(path, None)?;
        self.root = Some(root);
        Ok(root)
    }

    fn parse_file(&self, path: &str) -> Result<ast::StoredDefinition> {
        let extension = self.context.filesystem().extname(path);
        let parser = self.context.parser_for(&extension).ok_or_else(|| {
            Error::file_system(path, format!("no parser for extension {:?}", extension))
        })?;
        let bytes = self.context.filesystem().read(path)?;
        let text =
            String::from_utf8(bytes).map_err(|e| Error::file_system(path, e))?;
        parser.parse(&text, path)
    }

    fn load_entity(&mut self, path: &str, parent: Option<InstanceId>) -> Result<InstanceId> {
        let resolved = self.context.filesystem().resolve(path)?;
        let stat = self.context.filesystem().stat(&resolved)?;

        if stat.is_file {
            let extension = self.context.filesystem().extname(&resolved);
            if extension != ".mo" {
                return Err(Error::file_system(&resolved, "not a Modelica file"));
            }
            let def = self.parse_file(&resolved)?;
            let class_ast = def.classes.into_iter().next();
            let name = class_ast
                .as_ref()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| stem(&resolved));
            let entity = self.arena.alloc(
                parent,
                InstanceKind::Entity(Entity {
                    name,
                    path: resolved.clone(),
                    unstructured: true,
                    class: None,
                    children: Vec::new(),
                }),
            );
            if let Some(class_ast) = class_ast {
                let class = self.create_class_instance(
                    Rc::new(class_ast),
                    Some(entity),
                    Modification::default(),
                )?;
                self.arena.entity_mut(entity).expect("entity node").class = Some(class);
            }
            return Ok(entity);
        }

        if !stat.is_directory {
            return Err(Error::file_system(&resolved, "unknown directory entry"));
        }

        let entity = self.arena.alloc(
            parent,
            InstanceKind::Entity(Entity {
                name: stem(&resolved),
                path: resolved.clone(),
                unstructured: false,
                class: None,
                children: Vec::new(),
            }),
        );

        let package_mo = self.context.filesystem().join(&resolved, "package.mo");
        let has_package = self
            .context
            .filesystem()
            .stat(&package_mo)
            .map(|s| s.is_file)
            .unwrap_or(false);
        if has_package {
            let def = self.parse_file(&package_mo)?;
            if let Some(class_ast) = def.classes.into_iter().next() {
                let name = class_ast.name().to_string();
                let class = self.create_class_instance(
                    Rc::new(class_ast),
                    Some(entity),
                    Modification::default(),
                )?;
                let node = self.arena.entity_mut(entity).expect("entity node");
                node.class = Some(class);
                node.name = name;
            }
        }

        let mut entries = self.context.filesystem().readdir(&resolved)?;
        if let Some(order) = self.read_package_order(&resolved) {
            entries = apply_package_order(entries, &order);
        }

        let mut children = Vec::new();
        for entry in entries {
            if entry.name == "package.mo" || entry.name == "package.order" {
                continue;
            }
            let child_path = self.context.filesystem().join(&resolved, &entry.name);
            if entry.is_directory {
                children.push(self.load_entity(&child_path, Some(entity))?);
            } else if entry.is_file
                && self.context.filesystem().extname(&entry.name) == ".mo"
            {
                children.push(self.load_entity(&child_path, Some(entity))?);
            }
            // anything else is ignored
        }
        self.arena.entity_mut(entity).expect("entity node").children = children;
        Ok(entity)
    }

    fn read_package_order(&self, directory: &str) -> Option<Vec<String>> {
        let path = self.context.filesystem().join(directory, "package.order");
        let bytes = self.context.filesystem().read(&path).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

fn stem(path: &str) -> String {
    let base = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);
    match base.rfind('.') {
        Some(0) | None => base.to_string(),
        Some(pos) => base[..pos].to_string(),
    }
}

/// Reorders directory entries to honour a `package.order` file; entries not
/// named in the order file keep their listing order at the end.
fn apply_package_order(
    entries: Vec<crate::filesystem::DirEntry>,
    order: &[String],
) -> Vec<crate::filesystem::DirEntry> {
    let mut remaining = entries;
    let mut ordered = Vec::with_capacity(remaining.len());
    for name in order {
        let file_name = format!("{}.mo", name);
        if let Some(pos) = remaining
            .iter()
            .position(|e| e.name == *name || e.name == file_name)
        {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_context(files: &[(&str, &str)]) -> Context {
        let mut filesystem = MemoryFileSystem::new();
        for (path, content) in files {
            filesystem.add_file(path, content.as_bytes().to_vec());
        }
        Context::with_filesystem(Box::new(filesystem))
    }

    #[test]
    fn test_load_unstructured_file() {
        let context = memory_context(&[("/lib/Ball.mo", "model Ball end Ball;")]);
        let mut library = Library::new(context);
        let root = library.load("/lib/Ball.mo").unwrap();
        let entity = library.arena.entity(root).unwrap();
        assert!(entity.unstructured);
        assert_eq!(entity.name, "Ball");
        assert_eq!(entity.path, "/lib/Ball.mo");
        assert!(entity.class.is_some());
        assert!(entity.children.is_empty());
    }

    #[test]
    fn test_load_directory_package() {
        let context = memory_context(&[
            ("/lib/P/package.mo", "package P end P;"),
            ("/lib/P/A.mo", "model A end A;"),
            ("/lib/P/Q/package.mo", "package Q end Q;"),
            ("/lib/P/Q/B.mo", "model B end B;"),
            ("/lib/P/notes.txt", "ignored"),
        ]);
        let mut library = Library::new(context);
        let root = library.load("/lib/P").unwrap();
        let entity = library.arena.entity(root).unwrap();
        assert!(!entity.unstructured);
        assert_eq!(entity.name, "P");
        assert!(entity.class.is_some());
        let names: Vec<_> = entity
            .children
            .iter()
            .map(|c| library.arena.entity(*c).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["A", "Q"]);
    }

    #[test]
    fn test_package_order() {
        let context = memory_context(&[
            ("/lib/P/package.mo", "package P end P;"),
            ("/lib/P/package.order", "B\nA\n"),
            ("/lib/P/A.mo", "model A end A;"),
            ("/lib/P/B.mo", "model B end B;"),
        ]);
        let mut library = Library::new(context);
        let root = library.load("/lib/P").unwrap();
        let names: Vec<_> = library
            .arena
            .entity(root)
            .unwrap()
            .children
            .iter()
            .map(|c| library.arena.entity(*c).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_load_is_monotonic() {
        let context = memory_context(&[("/m.mo", "model M end M;")]);
        let mut library = Library::new(context);
        let first = library.load("/m.mo").unwrap();
        let second = library.load("/ignored.mo").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_path_is_a_filesystem_error() {
        let context = memory_context(&[]);
        let mut library = Library::new(context);
        assert!(matches!(
            library.load("/nope"),
            Err(Error::FileSystem { .. })
        ));
    }

    #[test]
    fn test_predefined_lookup() {
        let library = Library::new(memory_context(&[]));
        assert!(library.predefined("Real").is_some());
        assert!(library.predefined("Bogus").is_none());
    }
}
