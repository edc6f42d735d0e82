pub mod component_system;
pub mod model_system;
