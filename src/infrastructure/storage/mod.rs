pub mod r2_storage_service;
pub mod traits;
