pub mod loader;
pub mod model;
pub mod validation;

pub use loader::ConfigLoader;
pub use model::MigratorConfig;
pub use validation::IdentifierValidator;
