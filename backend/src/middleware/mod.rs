pub mod activity;
pub mod request_id;
