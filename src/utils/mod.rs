//! Small shared helpers: ids, hashing, role/status mappings, tool payloads.

pub mod hashing;
pub mod ids;
pub mod json_path;
pub mod roles;
pub mod status;
pub mod tools;
