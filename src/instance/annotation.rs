//! Annotation handling.
//!
//! Annotations are ordinary class modifications resolved against a fixed
//! schema class. The schema source is embedded in the binary, parsed once
//! per process, and instantiated lazily per library on first use; the parsed
//! form is never invalidated.

use crate::errors::{Error, Result};
use crate::instance::{InstanceId, InstanceKind, NamedAnnotation};
use crate::library::Library;
use crate::modification::Modification;
use crate::parser::parse_stored_definition;
use crate::syntax::ast;
use std::rc::Rc;
use std::sync::OnceLock;

/// The vocabulary the engine understands; unknown annotation names are
/// logged and skipped.
const SCHEMA_SOURCE: &str = r#"
package AnnotationSchema
  record Documentation
    String info = "";
    String revisions = "";
  end Documentation;

  record Experiment
    Real StartTime = 0;
    Real StopTime = 1;
    Real Interval = 0.002;
    Real Tolerance = 1e-6;
  end Experiment;

  record Transformation
    Real origin[2] = {0, 0};
    Real extent[4];
    Real rotation = 0;
  end Transformation;

  record Placement
    Boolean visible = true;
    Transformation transformation;
  end Placement;

  record CoordinateSystem
    Real extent[4];
    Boolean preserveAspectRatio = true;
  end CoordinateSystem;

  record Icon
    CoordinateSystem coordinateSystem;
  end Icon;

  record Diagram
    CoordinateSystem coordinateSystem;
  end Diagram;

  record Line
    Real points[:, 2];
    Real color[3] = {0, 0, 0};
    Real thickness = 0.25;
  end Line;

  record Text
    Real extent[4];
    String textString = "";
  end Text;

  record Dialog
    String tab = "General";
    String group = "Parameters";
    Boolean enable = true;
  end Dialog;

  Boolean Evaluate = false;
  Boolean HideResult = false;
  Boolean choicesAllMatching = false;
  String preferredView = "info";
  String version = "";
end AnnotationSchema;
"#;

static SCHEMA_AST: OnceLock<ast::ClassDefinition> = OnceLock::new();

fn schema_ast() -> Result<ast::ClassDefinition> {
    if let Some(class) = SCHEMA_AST.get() {
        return Ok(class.clone());
    }
    let def = parse_stored_definition(SCHEMA_SOURCE, "<annotation-schema>")?;
    let class = def
        .classes
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidNode {
            tag: "AnnotationSchema".to_string(),
            message: "the embedded annotation schema is empty".to_string(),
        })?;
    // a racing initialisation produces the same value
    let _ = SCHEMA_AST.set(class.clone());
    Ok(class)
}

impl Library {
    /// The schema class instantiated into this library, built on first use.
    pub(crate) fn annotation_schema_class(&mut self) -> Result<InstanceId> {
        if let Some(id) = self.annotation_schema {
            return Ok(id);
        }
        let ast = schema_ast()?;
        let id = self.create_class_instance(Rc::new(ast), None, Modification::default())?;
        self.instantiate_node(id)?;
        self.annotation_schema = Some(id);
        Ok(id)
    }

    /// Resolves an annotation's arguments against the schema class.
    ///
    /// Every argument whose short name matches a schema class or component
    /// produces a clone of the schema element specialised by the argument's
    /// nested modification, with the argument's expression carried in the
    /// `= expr` slot. Unknown names are skipped.
    pub(crate) fn build_annotations(
        &mut self,
        scope: InstanceId,
        annotation: &ast::ClassModification,
    ) -> Result<Vec<NamedAnnotation>> {
        let schema = self.annotation_schema_class()?;
        let normalized = Modification::from_class_modification(annotation);
        let mut out = Vec::new();
        for argument in &normalized.arguments {
            let name = argument.head_name().to_string();
            let Some(found) = self.resolve_simple_name(schema, &name, false, true)? else {
                log::debug!("skipping unknown annotation {}", name);
                continue;
            };
            let target = match &self.arena.get(found).kind {
                InstanceKind::Component(component) => component.class,
                InstanceKind::Class(_) => Some(found),
                _ => None,
            };
            let Some(target) = target else {
                continue;
            };
            let modification =
                Modification::new(argument.extract(), argument.expression().cloned());
            let instance = self.clone_class(target, modification, Some(scope))?;
            out.push(NamedAnnotation { name, instance });
        }
        Ok(out)
    }

    /// The resolved annotations of a class instance.
    pub fn annotations(&self, class: InstanceId) -> &[NamedAnnotation] {
        self.arena
            .class(class)
            .map(|c| c.annotations.as_slice())
            .unwrap_or(&[])
    }
}
