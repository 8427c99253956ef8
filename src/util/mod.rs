pub mod basis;
pub mod vec3;
