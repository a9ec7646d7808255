pub mod client;
pub mod filter;
pub mod http;
pub mod protocol;
pub mod stdio;
pub mod supervisor;
