mod bytes;
mod credential;
mod error;
mod event;
mod filter;
mod interface;
mod solidity_types;
pub use bytes::*;
pub use credential::*;
pub use error::*;
pub use event::*;
pub use filter::*;
pub use interface::*;
pub use solidity_types::*;
