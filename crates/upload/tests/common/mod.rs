pub mod mocks;
pub mod readers;
