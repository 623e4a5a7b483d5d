pub mod chat_area;
pub mod settings;
pub mod verification_center;
