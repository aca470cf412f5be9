pub mod command;
pub mod context;
pub mod gpu;
pub mod handle;
pub mod renderer;
pub mod sync;
pub mod texture;
pub mod vulkan;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
