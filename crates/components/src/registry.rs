//! Component registry
//!
//! Maps stable component ids (and the Rust type paths the code generator
//! emits) to factories. Components are added by explicit registration;
//! nothing is discovered by scanning.

use etlflow_runtime::{Component, ComponentKind, DependencySpec, Error, ParameterSet, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Static metadata every registrable component type provides
pub trait ComponentDefinition: Component + Default + 'static {
    /// Stable id used in pipeline sheets, e.g. `"file-source"`
    const ID: &'static str;
    const LABEL: &'static str;
    const DESCRIPTION: &'static str;
    const KIND: ComponentKind;
    /// Public path of the type, as emitted into generated source
    const TYPE_PATH: &'static str;
    const DEPENDENCIES: &'static [DependencySpec] = &[];
    const SUPPORTS_CONTROL_FLOW: bool = false;
}

/// Factory for a fresh, unparameterized component instance
pub type ComponentFactory = fn() -> Box<dyn Component>;

/// Registry entry for one component type
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub kind: ComponentKind,
    pub type_path: &'static str,
    pub dependencies: &'static [DependencySpec],
    pub supports_control_flow: bool,
    factory: ComponentFactory,
}

impl ComponentDescriptor {
    /// Describe a [`ComponentDefinition`] type
    pub fn of<T: ComponentDefinition>() -> Self {
        fn build<T: ComponentDefinition>() -> Box<dyn Component> {
            Box::new(T::default())
        }
        Self {
            id: T::ID,
            label: T::LABEL,
            description: T::DESCRIPTION,
            kind: T::KIND,
            type_path: T::TYPE_PATH,
            dependencies: T::DEPENDENCIES,
            supports_control_flow: T::SUPPORTS_CONTROL_FLOW,
            factory: build::<T>,
        }
    }

    /// Describe a component that is not a [`ComponentDefinition`]
    pub fn custom(
        id: &'static str,
        kind: ComponentKind,
        type_path: &'static str,
        factory: ComponentFactory,
    ) -> Self {
        Self {
            id,
            label: id,
            description: "",
            kind,
            type_path,
            dependencies: &[],
            supports_control_flow: false,
            factory,
        }
    }

    pub fn create(&self) -> Box<dyn Component> {
        (self.factory)()
    }

    /// Declared parameters, with nothing bound
    pub fn parameters(&self) -> ParameterSet {
        self.create().parameters().clone()
    }

    /// Serializable summary for listings
    pub fn info(&self) -> ComponentInfo {
        ComponentInfo {
            id: self.id.to_string(),
            label: self.label.to_string(),
            description: self.description.to_string(),
            kind: self.kind,
            type_path: self.type_path.to_string(),
            supports_control_flow: self.supports_control_flow,
            dependencies: self.dependencies.iter().map(|d| d.to_string()).collect(),
            parameters: self.parameters().definitions().to_vec(),
        }
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("type_path", &self.type_path)
            .finish()
    }
}

/// Listing entry produced by [`ComponentDescriptor::info`]
#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    pub id: String,
    pub label: String,
    pub description: String,
    pub kind: ComponentKind,
    pub type_path: String,
    pub supports_control_flow: bool,
    pub dependencies: Vec<String>,
    pub parameters: Vec<etlflow_runtime::ParameterDef>,
}

/// Registry of component types by id
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    components: HashMap<String, ComponentDescriptor>,
}

impl ComponentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in palette
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::register_builtin_components(&mut registry);
        registry
    }

    /// Add or replace a component type
    pub fn register(&mut self, descriptor: ComponentDescriptor) {
        tracing::trace!("Registering component {} ({})", descriptor.id, descriptor.type_path);
        self.components.insert(descriptor.id.to_string(), descriptor);
    }

    pub fn register_type<T: ComponentDefinition>(&mut self) {
        self.register(ComponentDescriptor::of::<T>());
    }

    pub fn get(&self, id: &str) -> Option<&ComponentDescriptor> {
        self.components.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// Resolve an implementation reference: a component id or a type path
    pub fn resolve(&self, implementation_ref: &str) -> Option<&ComponentDescriptor> {
        let reference = implementation_ref.trim();
        self.components.get(reference).or_else(|| {
            self.components
                .values()
                .find(|d| d.type_path == reference)
        })
    }

    /// Instantiate a component by id or type path
    pub fn create(&self, implementation_ref: &str) -> Result<Box<dyn Component>> {
        self.resolve(implementation_ref)
            .map(ComponentDescriptor::create)
            .ok_or_else(|| {
                Error::Component(format!(
                    "no component registered for '{implementation_ref}'"
                ))
            })
    }

    /// All descriptors sorted by id
    pub fn list(&self) -> Vec<&ComponentDescriptor> {
        let mut all: Vec<&ComponentDescriptor> = self.components.values().collect();
        all.sort_by_key(|d| d.id);
        all
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        self.list().into_iter().map(|d| d.id).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Register one or more [`ComponentDefinition`] types
///
/// ```ignore
/// let mut registry = ComponentRegistry::new();
/// register_components!(registry, FilterComponent, CsvDestinationComponent);
/// ```
#[macro_export]
macro_rules! register_components {
    ($registry:expr, $($component:ty),+ $(,)?) => {{
        $(
            $registry.register($crate::registry::ComponentDescriptor::of::<$component>());
        )+
    }};
}
