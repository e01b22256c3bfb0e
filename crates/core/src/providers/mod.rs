pub mod registry;
pub mod traits;

// External collaborator interfaces
pub mod identity;

// API provider implementations
pub mod frankfurter;
pub mod yahoo;
