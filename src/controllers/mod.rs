pub mod chat_session;
pub mod observable;
pub mod verification;
