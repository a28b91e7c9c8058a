pub mod process;
pub mod response;
