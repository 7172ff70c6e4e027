pub mod file_ops;
pub mod modifier;
