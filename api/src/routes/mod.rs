pub mod ask;
pub mod chat;
pub mod root_route;
pub mod sources;
