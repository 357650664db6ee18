mod definition;
pub mod controller;
pub mod repository;

pub use controller::ModelController;
pub use definition::{ContainerImages, ContainerSpec, Model, ModelStatus, Platform};
pub use repository::ModelRepository;
