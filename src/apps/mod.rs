//! Application handlers run by the binary.
//!
//! - `echo`: server side, sends every received chunk back out
//! - `prompt`: client side, forwards lines typed on stdin and prints replies

mod echo;
mod prompt;

pub use echo::Echo;
pub use prompt::Prompt;
