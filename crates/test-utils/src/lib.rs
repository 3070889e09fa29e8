pub mod builders;
pub mod fake_driver;

pub use builders::{ContainerBuilder, GraphBuilder};
pub use fake_driver::FakeEngineDriver;
