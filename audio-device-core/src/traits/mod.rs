pub mod backend;
pub mod backend_factory;
pub mod config_store;
pub mod device_delegate;
pub mod sample_provider;
