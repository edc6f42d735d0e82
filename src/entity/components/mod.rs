pub mod model;
pub mod scene;
