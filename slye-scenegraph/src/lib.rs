pub mod document;
pub mod encode;
pub mod error;
pub mod marks;
pub mod props;
pub mod scene_graph;
