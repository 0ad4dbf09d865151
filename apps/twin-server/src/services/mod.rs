pub mod digital_twin;
pub mod latest_store;
pub mod session_sweeper;
