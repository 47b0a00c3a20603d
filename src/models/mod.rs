pub mod enums;
pub mod filters;

mod appointment;
mod consultation;
mod doctor;
mod patient;
mod prescription;
mod review;
mod user;

pub use appointment::*;
pub use consultation::*;
pub use doctor::*;
pub use filters::*;
pub use patient::*;
pub use prescription::*;
pub use review::*;
pub use user::*;
