pub mod builder;
pub mod context;
pub mod defaults;
pub mod runtime;
pub mod traits;
