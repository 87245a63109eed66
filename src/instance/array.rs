//! Array class specialisation: shape evaluation, per-element cloning, and
//! modification splitting.

use crate::errors::Result;
use crate::eval::Value;
use crate::instance::{ClassInstance, ClassVariant, InstanceId, InstanceKind, InstanceState};
use crate::library::Library;
use crate::modification::Modification;
use crate::syntax::ast;

impl Library {
    /// Builds an array class over `element` for the subscript list
    /// `subscripts`.
    ///
    /// Subscript expressions are evaluated in `scope`; a flexible subscript
    /// (`:`), a missing expression, or a non-integer result contributes `-1`
    /// to the shape. When every dimension is known and positive, the
    /// enclosing `modification` is split into `product(shape)` slices and
    /// each element clone receives its slice; otherwise the element list
    /// stays empty and downstream code handles the flexible case.
    pub(crate) fn specialize_array(
        &mut self,
        element: InstanceId,
        subscripts: &[ast::Subscript],
        scope: InstanceId,
        modification: &Modification,
        owner: Option<InstanceId>,
    ) -> Result<InstanceId> {
        let mut shape = Vec::with_capacity(subscripts.len());
        for subscript in subscripts {
            match subscript {
                ast::Subscript::Colon => shape.push(-1),
                ast::Subscript::Expression { expression } => {
                    match self.evaluate_expression(Some(scope), expression) {
                        Ok(Value::Integer(extent)) => shape.push(extent),
                        _ => shape.push(-1),
                    }
                }
            }
        }

        // unwrap alias and array element classes to the innermost element
        let mut element = element;
        loop {
            let next = match self.arena.class(element).map(|c| &c.variant) {
                Some(ClassVariant::Short {
                    target: Some(target),
                }) => Some(*target),
                Some(ClassVariant::Array {
                    element: Some(inner),
                    shape: inner_shape,
                    ..
                }) => {
                    shape.extend(inner_shape.iter().copied());
                    Some(*inner)
                }
                _ => None,
            };
            match next {
                Some(next) => element = next,
                None => break,
            }
        }

        let element_name = self
            .arena
            .class(element)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let classification = self
            .arena
            .class(element)
            .map(|c| c.classification)
            .unwrap_or_default();
        let dims: Vec<String> = shape
            .iter()
            .map(|d| {
                if *d < 0 {
                    ":".to_string()
                } else {
                    d.to_string()
                }
            })
            .collect();
        let name = format!("{}[{}]", element_name, dims.join(", "));

        let id = self.arena.alloc(
            Some(scope),
            InstanceKind::Class(ClassInstance {
                name,
                modification: modification.clone(),
                classification,
                state: InstanceState::Instantiated,
                variant: ClassVariant::Array {
                    element: Some(element),
                    shape: shape.clone(),
                    elements: Vec::new(),
                },
                ..Default::default()
            }),
        );
        self.arena.set_owner(id, owner);

        if !shape.is_empty() && shape.iter().all(|d| *d > 0) {
            let size = shape.iter().product::<i64>() as usize;
            let slices = modification.split(size);
            let mut elements = Vec::with_capacity(size);
            for slice in slices {
                elements.push(self.clone_class(element, slice, Some(id))?);
            }
            if let Some(class) = self.arena.class_mut(id) {
                if let ClassVariant::Array { elements: slot, .. } = &mut class.variant {
                    *slot = elements;
                }
            }
        }
        Ok(id)
    }

    /// The shape of an array class instance, if `id` is one.
    pub fn array_shape(&self, id: InstanceId) -> Option<&[i64]> {
        match &self.arena.class(id)?.variant {
            ClassVariant::Array { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// The element clones of an array class instance, if `id` is one.
    pub fn array_elements(&self, id: InstanceId) -> Option<&[InstanceId]> {
        match &self.arena.class(id)?.variant {
            ClassVariant::Array { elements, .. } => Some(elements),
            _ => None,
        }
    }
}
