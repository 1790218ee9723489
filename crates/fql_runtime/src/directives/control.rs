//! Directives that decide whether and how long fields are served.

use crate::context::IdsDataFields;
use crate::directive::{DirectiveInstance, DirectiveResolver, PipelinePosition, StageContext};
use crate::interpreter::SchemaArgs;
use crate::pipeline::SucceedingStages;
use crate::schema::{ArgDefinition, ScalarType, TypeRef};
use serde_json::Value;

/// Message key holding the smallest `maxAge` requested.
pub const MAX_AGE_MESSAGE: &str = "cacheControl.maxAge";

/// `skip(if:)` and `include(if:)`.
///
/// The condition may be a nested field, in which case it is evaluated for
/// each object.
#[derive(Debug, Clone, Copy)]
pub struct ConditionDirective {
    name: &'static str,
    /// The condition value that removes the field.
    removes_when: bool,
}

impl ConditionDirective {
    #[must_use]
    pub const fn skip() -> Self {
        Self {
            name: "skip",
            removes_when: true,
        }
    }

    #[must_use]
    pub const fn include() -> Self {
        Self {
            name: "include",
            removes_when: false,
        }
    }
}

impl DirectiveResolver for ConditionDirective {
    fn name(&self) -> &str {
        self.name
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Front
    }

    fn is_repeatable(&self) -> bool {
        false
    }

    fn args(&self) -> Vec<ArgDefinition> {
        vec![ArgDefinition::new("if", TypeRef::scalar(ScalarType::Bool)).mandatory()]
    }

    fn execute(
        &self,
        instance: &DirectiveInstance,
        fields: &IdsDataFields,
        succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        if let Some(condition) = instance.args.ready("if") {
            if condition.as_bool() == Some(self.removes_when) {
                for (id, data_fields) in fields {
                    for field in &data_fields.direct {
                        succeeding.remove_field(id, field);
                    }
                }
            }
            return;
        }

        for (id, data_fields) in fields {
            let evaluated = cx.directive_args(instance, id);
            let removes = if evaluated.errors.is_empty() {
                evaluated.args.get("if").and_then(Value::as_bool) == Some(self.removes_when)
            } else {
                for field in &data_fields.direct {
                    for error in &evaluated.errors {
                        cx.item_error(id, field, error.clone());
                    }
                }
                true
            };
            for warning in evaluated.warnings {
                for field in &data_fields.direct {
                    cx.item_warning(id, field, warning.clone());
                }
            }
            if removes {
                for field in &data_fields.direct {
                    succeeding.remove_field(id, field);
                }
            }
        }
    }
}

/// `cacheControl(maxAge:)`: records the smallest max age requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheControlDirective;

impl DirectiveResolver for CacheControlDirective {
    fn name(&self) -> &str {
        "cacheControl"
    }

    fn position(&self) -> PipelinePosition {
        PipelinePosition::Front
    }

    fn args(&self) -> Vec<ArgDefinition> {
        vec![ArgDefinition::new("maxAge", TypeRef::scalar(ScalarType::Int))
            .mandatory()
            .with_description("Seconds the response may be cached")]
    }

    fn validate(&self, args: &SchemaArgs, _fields: &[String]) -> Vec<String> {
        match args.ready("maxAge").and_then(Value::as_i64) {
            Some(max_age) if max_age < 0 => {
                vec![format!("Argument 'maxAge' must not be negative, but is {max_age}")]
            }
            _ => Vec::new(),
        }
    }

    fn execute(
        &self,
        instance: &DirectiveInstance,
        _fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        let Some(max_age) = instance.args.ready("maxAge").and_then(Value::as_i64) else {
            return;
        };
        let current = cx
            .state
            .messages
            .get(MAX_AGE_MESSAGE)
            .and_then(Value::as_i64);
        if current.map_or(true, |current| max_age < current) {
            cx.state
                .messages
                .insert(MAX_AGE_MESSAGE.to_string(), Value::from(max_age));
        }
    }
}
