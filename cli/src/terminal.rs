//! Everything that talks to the user's terminal: log formatting, the run
//! progress bar, styled summary output and the interactive key listener.

pub mod colors;
pub mod input;
pub mod logging;
pub mod print;
pub mod progress;
