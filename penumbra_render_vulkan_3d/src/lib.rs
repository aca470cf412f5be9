pub mod camera;
pub mod passes;
pub mod render;
pub mod shader;
