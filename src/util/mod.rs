pub mod file;
pub mod html;
