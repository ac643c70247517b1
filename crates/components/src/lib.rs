//! Built-in etlflow components and the component registry
//!
//! Every component is a plain type implementing
//! [`etlflow_runtime::Component`] plus [`ComponentDefinition`], and is
//! re-exported here under the path listed in its `TYPE_PATH` so generated
//! flows can name it directly.

pub mod registry;

mod csv_destination;
mod database_source;
mod file_source;
mod filter;
mod log_destination;
mod map_transform;
mod sequence_source;

pub use csv_destination::CsvDestinationComponent;
pub use database_source::DatabaseSourceComponent;
pub use file_source::FileSourceComponent;
pub use filter::FilterComponent;
pub use log_destination::LogDestinationComponent;
pub use map_transform::MapTransformComponent;
pub use registry::{ComponentDefinition, ComponentDescriptor, ComponentInfo, ComponentRegistry};
pub use sequence_source::SequenceSourceComponent;

/// Register the built-in palette
pub fn register_builtin_components(registry: &mut ComponentRegistry) {
    crate::register_components!(
        registry,
        FileSourceComponent,
        SequenceSourceComponent,
        DatabaseSourceComponent,
        FilterComponent,
        MapTransformComponent,
        CsvDestinationComponent,
        LogDestinationComponent,
    );
    tracing::debug!("Registered {} built-in components", registry.len());
}
