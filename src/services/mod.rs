pub mod auth;
pub mod search;
pub mod upload;
pub mod video_service;

pub use video_service::VideoService;
