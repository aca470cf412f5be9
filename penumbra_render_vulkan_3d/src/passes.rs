pub mod lightning_pass;
pub mod shadow_map;
