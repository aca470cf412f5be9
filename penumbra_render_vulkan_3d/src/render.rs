pub mod drawable;
pub mod frame;
pub mod light;
pub mod push_constants;
pub mod scene;
pub mod vertex;
