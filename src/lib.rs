pub mod config;
pub mod controller;
pub mod media;
pub mod player;
pub mod station;
pub mod status;
pub mod ui;

pub use controller::Controller;
pub use media::{MediaElement, MediaError, MediaEvent};
pub use player::RodioMedia;
pub use station::{StationClient, StationError, StationInfo, StationSource};
