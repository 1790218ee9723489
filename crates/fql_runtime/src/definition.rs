//! Schema definitions.
//!
//! The definition of a class lists its fields, with relational fields
//! expanded into the definition of their target class. A class met a
//! second time within one build is not expanded again: it becomes a stub
//! carrying only its resolver ID and the recursion flag.

use crate::directive::PipelinePosition;
use crate::engine::{ClassKind, Engine};
use crate::registry::GLOBAL_CLASS;
use crate::schema::{ArgDefinition, TypeRef};
use fql_core::{FqlError, FqlResult};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::PoisonError;
use tracing::{debug, warn};

/// Cache kind under which definitions are stored.
pub const SCHEMA_CACHE_KIND: &str = "schema-definition";

/// Length of a resolver ID, in hex digits.
const RESOLVER_ID_LEN: usize = 16;

fn is_false(flag: &bool) -> bool {
    !flag
}

/// The definition of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub resolver_id: String,
    pub class: String,
    /// Set on the stub that stands for a class already being defined.
    #[serde(default, skip_serializing_if = "is_false")]
    pub recursion: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, FieldSchema>,
    /// Member definitions of a union.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<SchemaDefinition>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub directives: IndexMap<String, DirectiveSchema>,
}

impl SchemaDefinition {
    fn stub(resolver_id: String, class: &str) -> Self {
        Self {
            resolver_id,
            class: class.to_string(),
            recursion: true,
            parents: Vec::new(),
            interfaces: Vec::new(),
            fields: IndexMap::new(),
            members: Vec::new(),
            directives: IndexMap::new(),
        }
    }
}

/// One field of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<String>,
    /// The definition of the target class, for relational fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relational: Option<Box<SchemaDefinition>>,
}

/// A directive available to a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveSchema {
    pub name: String,
    pub position: PipelinePosition,
    pub repeatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<String>,
}

impl Engine {
    /// Returns the definition of `class`.
    ///
    /// Memoized per class, and kept in the cache store when caching is
    /// enabled.
    pub fn schema_definition(&self, class: &str) -> FqlResult<SchemaDefinition> {
        if let Some(definition) = self
            .definitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
        {
            return Ok(definition.clone());
        }

        let cache = self.cache.as_ref().filter(|_| self.config.use_cache);
        if let Some(cached) = cache.and_then(|cache| cache.get(class, SCHEMA_CACHE_KIND)) {
            match serde_json::from_value::<SchemaDefinition>(cached) {
                Ok(definition) => {
                    debug!(class, "schema definition served from cache");
                    self.remember_definition(class, &definition);
                    return Ok(definition);
                }
                Err(error) => warn!(class, %error, "discarding unreadable cached schema definition"),
            }
        }

        let mut processed = FxHashSet::default();
        let definition = self.build_definition(class, &mut processed)?;
        if let Some(cache) = cache {
            match serde_json::to_value(&definition) {
                Ok(value) => cache.set(class, SCHEMA_CACHE_KIND, value, self.config.cache_ttl()),
                Err(error) => warn!(class, %error, "schema definition could not be cached"),
            }
        }
        self.remember_definition(class, &definition);
        Ok(definition)
    }

    fn remember_definition(&self, class: &str, definition: &SchemaDefinition) {
        self.definitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.to_string(), definition.clone());
    }

    fn build_definition(
        &self,
        class: &str,
        processed: &mut FxHashSet<String>,
    ) -> FqlResult<SchemaDefinition> {
        if !self.kinds.contains_key(class) && !self.classes.contains(class) {
            return Err(FqlError::UnknownResolver(class.to_string()));
        }
        let resolver_id = self.resolver_id(class);
        if !processed.insert(class.to_string()) {
            debug!(class, "recursive schema reference");
            return Ok(SchemaDefinition::stub(resolver_id, class));
        }

        let chain = self.classes.chain(class);
        let mut parents = Vec::new();
        let mut parent = self.classes.get(class).and_then(|d| d.extends.clone());
        while let Some(name) = parent {
            if parents.contains(&name) {
                break;
            }
            parent = self.classes.get(&name).and_then(|d| d.extends.clone());
            parents.push(name);
        }
        let interfaces = chain
            .iter()
            .filter(|c| *c != class && *c != GLOBAL_CLASS && !parents.contains(c))
            .cloned()
            .collect();

        let mut definition = SchemaDefinition {
            resolver_id,
            class: class.to_string(),
            recursion: false,
            parents,
            interfaces,
            fields: IndexMap::new(),
            members: Vec::new(),
            directives: IndexMap::new(),
        };

        if matches!(self.kinds.get(class), Some(ClassKind::Union)) {
            for (_, picker) in self.pickers.attached(class) {
                let member = self.build_definition(picker.target_class(), processed)?;
                definition.members.push(member);
            }
        } else {
            for (_, resolver) in self.field_resolvers.candidates(&chain) {
                for name in resolver.field_names() {
                    let key = name.to_ascii_lowercase();
                    if definition.fields.contains_key(&key) {
                        continue;
                    }
                    let Some(ty) = resolver.field_type(&name) else {
                        continue;
                    };
                    let relational = match ty.target_class() {
                        Some(target) => Some(Box::new(self.build_definition(target, processed)?)),
                        None => None,
                    };
                    definition.fields.insert(
                        key,
                        FieldSchema {
                            description: resolver.field_description(&name),
                            args: resolver.field_args(&name),
                            deprecation: resolver.field_deprecation(&name),
                            name,
                            ty,
                            relational,
                        },
                    );
                }
            }
        }

        for (_, directive) in self.directives.candidates(&chain) {
            let key = directive.name().to_ascii_lowercase();
            if definition.directives.contains_key(&key) {
                continue;
            }
            definition.directives.insert(
                key,
                DirectiveSchema {
                    name: directive.name().to_string(),
                    position: directive.position(),
                    repeatable: directive.is_repeatable(),
                    description: directive.description(),
                    args: directive.args(),
                    deprecation: directive.deprecation(),
                },
            );
        }
        Ok(definition)
    }

    /// Returns the stable ID of a class: a prefix of the BLAKE3 hash of its
    /// name. Each ID is logged once, when first assigned.
    pub fn resolver_id(&self, class: &str) -> String {
        let mut ids = self
            .resolver_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = ids.get(class) {
            return id.clone();
        }
        let hash = blake3::hash(class.as_bytes()).to_hex();
        let id = hash.as_str()[..RESOLVER_ID_LEN].to_string();
        debug!(class, resolver_id = %id, "assigned resolver ID");
        ids.insert(class.to_string(), id.clone());
        id
    }

    /// Every resolver ID assigned so far, by class.
    pub fn resolver_ids(&self) -> IndexMap<String, String> {
        self.resolver_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
