//! Predefined type handles: `Boolean`, `Integer`, `Real`, `String`.
//!
//! The resolver falls back to these singleton classes when no user-defined
//! name matches. A clone specialises one of them with a merged modification
//! and is always returned already instantiated; the attribute accessors read
//! the named arguments of the applied modification.

use crate::errors::Result;
use crate::eval::Value;
use crate::instance::InstanceId;
use crate::library::Library;
use crate::syntax::ast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedType {
    Boolean,
    Integer,
    Real,
    String,
}

impl PredefinedType {
    pub fn all() -> [PredefinedType; 4] {
        [
            PredefinedType::Boolean,
            PredefinedType::Integer,
            PredefinedType::Real,
            PredefinedType::String,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            PredefinedType::Boolean => "Boolean",
            PredefinedType::Integer => "Integer",
            PredefinedType::Real => "Real",
            PredefinedType::String => "String",
        }
    }

    pub fn from_name(name: &str) -> Option<PredefinedType> {
        match name {
            "Boolean" => Some(PredefinedType::Boolean),
            "Integer" => Some(PredefinedType::Integer),
            "Real" => Some(PredefinedType::Real),
            "String" => Some(PredefinedType::String),
            _ => None,
        }
    }
}

impl Library {
    /// The expression bound to attribute `name` in the class's applied
    /// modification, e.g. `start` of `Real x(start = 1)`.
    pub fn attribute_expression(
        &self,
        class: InstanceId,
        name: &str,
    ) -> Option<ast::Expression> {
        let class = self.arena.class(class)?;
        class
            .modification
            .argument(name)
            .and_then(|a| a.expression())
            .cloned()
    }

    /// Evaluates attribute `name` in the class's owning scope.
    pub fn attribute_value(
        &mut self,
        class: InstanceId,
        name: &str,
    ) -> Result<Option<Value>> {
        let Some(expression) = self.attribute_expression(class, name) else {
            return Ok(None);
        };
        let scope = self.evaluation_scope(class);
        self.evaluate_expression(scope, &expression).map(Some)
    }

    /// The `= expr` slot of the class's applied modification.
    pub fn value_expression(&self, class: InstanceId) -> Option<ast::Expression> {
        self.arena.class(class)?.modification.expression.clone()
    }

    /// Evaluated form of the `= expr` slot, cached on first access.
    pub fn value_of(&mut self, class: InstanceId) -> Result<Option<Value>> {
        if let Some(node) = self.arena.class(class) {
            if let Some(value) = &node.modification.value {
                return Ok(Some(value.clone()));
            }
        }
        let Some(expression) = self.value_expression(class) else {
            return Ok(None);
        };
        let scope = self.evaluation_scope(class);
        let value = self.evaluate_expression(scope, &expression)?;
        if let Some(node) = self.arena.class_mut(class) {
            node.modification.value = Some(value.clone());
        }
        Ok(Some(value))
    }

    pub fn start_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "start")
    }

    pub fn fixed_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "fixed")
    }

    pub fn min_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "min")
    }

    pub fn max_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "max")
    }

    pub fn nominal_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "nominal")
    }

    pub fn unit_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "unit")
    }

    pub fn display_unit_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "displayUnit")
    }

    pub fn quantity_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "quantity")
    }

    pub fn state_select_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "stateSelect")
    }

    pub fn unbounded_value(&mut self, class: InstanceId) -> Result<Option<Value>> {
        self.attribute_value(class, "unbounded")
    }
}
