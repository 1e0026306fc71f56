pub mod action_stack;
pub mod actions;
pub mod asset;
pub mod builtin;
pub mod cache;
pub mod decode;
pub mod error;
pub mod module;
pub mod serializer;
pub mod session;
pub mod sync;
pub mod update;
