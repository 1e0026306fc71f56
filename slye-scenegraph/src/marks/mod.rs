pub mod image;
pub mod mark;
pub mod text;
pub mod video;
