//! Class hierarchy and extension registry.
//!
//! Resolvers, directives and pickers are attached to classes by explicit
//! registration. Lookup walks the class's declared chain from the most
//! derived class to the root, so a subclass can override what its
//! ancestors provide.

use fql_core::{FqlError, FqlResult};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// The implicit ancestor of every class. Built-in directives live here.
pub const GLOBAL_CLASS: &str = "*";

/// A class as declared at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDeclaration {
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
}

impl ClassDeclaration {
    /// Creates a declaration without ancestors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            implements: Vec::new(),
        }
    }

    /// Sets the parent class.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }
}

/// All declared classes.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: IndexMap<String, ClassDeclaration>,
}

impl ClassHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a class.
    pub fn declare(&mut self, declaration: ClassDeclaration) -> FqlResult<()> {
        if declaration.name == GLOBAL_CLASS || self.classes.contains_key(&declaration.name) {
            return Err(FqlError::DuplicateClass(declaration.name));
        }
        self.classes.insert(declaration.name.clone(), declaration);
        Ok(())
    }

    /// Checks that every parent and interface has been declared.
    pub fn validate(&self) -> FqlResult<()> {
        for declaration in self.classes.values() {
            let ancestors = declaration.extends.iter().chain(&declaration.implements);
            for parent in ancestors {
                if !self.classes.contains_key(parent) {
                    return Err(FqlError::UndeclaredClass {
                        class: declaration.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns true if `class` has been declared.
    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Returns the declaration of `class`.
    #[must_use]
    pub fn get(&self, class: &str) -> Option<&ClassDeclaration> {
        self.classes.get(class)
    }

    /// Iterates over the declarations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDeclaration> {
        self.classes.values()
    }

    /// Returns the lookup chain of `class`: the class, its parents from
    /// nearest to farthest, then every interface met along the way, and
    /// finally [`GLOBAL_CLASS`].
    #[must_use]
    pub fn chain(&self, class: &str) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut chain = Vec::new();
        let mut interfaces = Vec::new();

        let mut current = Some(class);
        while let Some(name) = current {
            if !seen.insert(name.to_string()) {
                break;
            }
            chain.push(name.to_string());
            let declaration = self.classes.get(name);
            if let Some(declaration) = declaration {
                interfaces.extend(declaration.implements.iter().cloned());
            }
            current = declaration.and_then(|d| d.extends.as_deref());
        }

        while !interfaces.is_empty() {
            let interface = interfaces.remove(0);
            if !seen.insert(interface.clone()) {
                continue;
            }
            if let Some(declaration) = self.classes.get(&interface) {
                interfaces.extend(declaration.extends.iter().cloned());
                interfaces.extend(declaration.implements.iter().cloned());
            }
            chain.push(interface);
        }

        chain.push(GLOBAL_CLASS.to_string());
        chain
    }
}

/// Identifies one attachment in an [`ExtensionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionId(u32);

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Attachment<T: ?Sized> {
    id: ExtensionId,
    handler: Arc<T>,
    priority: i32,
}

impl<T: ?Sized> Clone for Attachment<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
            priority: self.priority,
        }
    }
}

/// Handlers attached to classes with a priority.
pub struct ExtensionRegistry<T: ?Sized> {
    attachments: IndexMap<String, Vec<Attachment<T>>>,
    next_id: u32,
}

impl<T: ?Sized> Default for ExtensionRegistry<T> {
    fn default() -> Self {
        Self {
            attachments: IndexMap::new(),
            next_id: 0,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("classes", &self.attachments.keys().collect::<Vec<_>>())
            .field("attachment_count", &self.next_id)
            .finish()
    }
}

impl<T: ?Sized> ExtensionRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `handler` to `class`.
    pub fn attach(&mut self, class: impl Into<String>, handler: Arc<T>, priority: i32) -> ExtensionId {
        let id = ExtensionId(self.next_id);
        self.next_id += 1;
        self.attachments
            .entry(class.into())
            .or_default()
            .push(Attachment {
                id,
                handler,
                priority,
            });
        id
    }

    /// Iterates over the classes that have attachments.
    pub fn classes(&self) -> impl Iterator<Item = &String> {
        self.attachments.keys()
    }

    /// Returns the handlers of a single class in lookup order.
    #[must_use]
    pub fn attached(&self, class: &str) -> Vec<(ExtensionId, Arc<T>)> {
        let Some(attachments) = self.attachments.get(class) else {
            return Vec::new();
        };
        // Later registrations win ties.
        let mut ordered: Vec<Attachment<T>> = attachments.iter().rev().cloned().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered
            .into_iter()
            .map(|attachment| (attachment.id, attachment.handler))
            .collect()
    }

    /// Returns the candidates for a lookup chain, most specific first.
    #[must_use]
    pub fn candidates(&self, chain: &[String]) -> Vec<(ExtensionId, Arc<T>)> {
        chain.iter().flat_map(|class| self.attached(class)).collect()
    }
}
